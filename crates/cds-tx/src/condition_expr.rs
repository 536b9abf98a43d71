use cds_core::Condition;
use serde_json::Value;

/// Parses and evaluates the tiny condition-expression grammar:
///
/// ```text
/// expr    := orTerm ("," orTerm)*
/// orTerm  := andTerm ("+" andTerm)*
/// andTerm := "(" expr ")" | atom
/// ```
///
/// `,` is OR, `+` is AND, parentheses override precedence. Every atom is dispatched to the same
/// named `condition` plugin along with the row value `v`; when `condition_name` is `None` or
/// empty the whole expression evaluates to `true`.
pub fn evaluate(condition_name: Option<&str>, expr: &str, value: &Value, condition: Option<&dyn Condition>) -> bool {
    let name_is_empty = condition_name.map(str::is_empty).unwrap_or(true);
    if name_is_empty || condition_name == Some("None") {
        return true;
    }
    let Some(condition) = condition else {
        return true;
    };

    let stripped: String = expr.chars().filter(|c| !c.is_whitespace()).collect();
    let mut parser = Parser {
        chars: stripped.chars().collect(),
        pos: 0,
        condition,
        value,
    };
    parser.parse_expr()
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    condition: &'a dyn Condition,
    value: &'a Value,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn parse_expr(&mut self) -> bool {
        let mut result = self.parse_or_term();
        while self.peek() == Some(',') {
            self.pos += 1;
            let rhs = self.parse_or_term();
            result = result || rhs;
        }
        result
    }

    fn parse_or_term(&mut self) -> bool {
        let mut result = self.parse_and_term();
        while self.peek() == Some('+') {
            self.pos += 1;
            let rhs = self.parse_and_term();
            result = result && rhs;
        }
        result
    }

    fn parse_and_term(&mut self) -> bool {
        if self.peek() == Some('(') {
            self.pos += 1;
            let inner = self.parse_expr();
            if self.peek() == Some(')') {
                self.pos += 1;
            }
            return inner;
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> bool {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '+' || c == ',' || c == '(' || c == ')' {
                break;
            }
            self.pos += 1;
        }
        let atom: String = self.chars[start..self.pos].iter().collect();
        self.condition.evaluate(&atom, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RangeCondition;
    impl Condition for RangeCondition {
        fn name(&self) -> &str {
            "range"
        }
        fn evaluate(&self, condition_param: &str, row_value: &Value) -> bool {
            match (condition_param, row_value.as_str()) {
                ("low", Some("mid")) => false,
                ("high", Some("mid")) => true,
                ("alt", Some("mid")) => true,
                _ => false,
            }
        }
    }

    #[test]
    fn s4_condition_expression_scenario() {
        let condition = RangeCondition;
        let value = Value::String("mid".to_string());
        let result = evaluate(Some("range"), "(low+high),alt", &value, Some(&condition));
        // (low AND high) = (false AND true) = false; OR alt(true) = true
        assert!(result);
    }

    #[test]
    fn empty_condition_name_is_always_true() {
        let value = Value::String("anything".to_string());
        assert!(evaluate(None, "whatever", &value, None));
        assert!(evaluate(Some(""), "whatever", &value, None));
        assert!(evaluate(Some("None"), "whatever", &value, None));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let condition = RangeCondition;
        let value = Value::String("mid".to_string());
        // low+high -> false, alone (no OR) -> false
        let result = evaluate(Some("range"), "low+high", &value, Some(&condition));
        assert!(!result);
    }
}
