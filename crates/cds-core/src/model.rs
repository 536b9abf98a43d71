use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The sentinel used by table loaders and the mapping engine to mark an absent cell.
pub const SENTINEL: &str = "none";

/// True for null, empty/whitespace-only, and the case-insensitive tokens `none`/`nan` — the
/// single predicate every omission rule in the mapping engine and extraction engine is built on.
pub fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return true;
            }
            let lower = trimmed.to_ascii_lowercase();
            lower == "none" || lower == "nan"
        }
        _ => false,
    }
}

/// One row of a loaded or joined table.
///
/// Carries both the table-prefixed view (`"table.column"`, written by the join planner) and an
/// unprefixed view so the mapping engine can resolve `%column%` references without knowing which
/// table a column originated from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Row {
    pub prefixed: IndexMap<String, Value>,
    pub unprefixed: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value under both its prefixed and unprefixed keys.
    pub fn insert(&mut self, prefixed_key: impl Into<String>, unprefixed_key: impl Into<String>, value: Value) {
        let unprefixed_key = unprefixed_key.into();
        self.prefixed.insert(prefixed_key.into(), value.clone());
        self.unprefixed.insert(unprefixed_key, value);
    }

    /// Resolves a `%column%` reference: unprefixed lookup first, then prefixed (for callers that
    /// already know the `table.column` form).
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.unprefixed.get(column).or_else(|| self.prefixed.get(column))
    }

    /// Convenience accessor returning the cell as a display string, `"none"` if absent.
    pub fn get_string(&self, column: &str) -> String {
        match self.get(column) {
            Some(Value::String(s)) => s.clone(),
            Some(v) if !is_absent(v) => v.to_string(),
            _ => SENTINEL.to_string(),
        }
    }
}

/// A named table of rows, as produced by a table loader or the join planner.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }
}

/// The four supported join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Outer,
}

/// One entry of a resource mapping's `joinOn` list.
///
/// The source format describes this as a free-form dict keyed by table name
/// (`{"A": "k", "B": "k", "join_type": "inner"}`); this workspace uses an explicit struct shape
/// instead, carrying the same two-tables-plus-kind information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left_table: String,
    pub left_key: String,
    pub right_table: String,
    pub right_key: String,
    #[serde(default = "default_join_kind")]
    pub join_type: JoinKind,
}

fn default_join_kind() -> JoinKind {
    JoinKind::Inner
}
