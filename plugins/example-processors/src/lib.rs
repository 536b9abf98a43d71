//! Example dynamically-loaded plugin: a handful of processors and one modifier, grounded in
//! `omfs_data_processors.py` and `plugins/modifiers/firstnchars.py`. Built as a `cdylib` so
//! `cds_tx::plugins::PluginHost::load_dir` can load it at runtime.

use cds_core::error::CdsError;
use cds_core::{Modifier, Processor, Registrar};
use chrono::NaiveDate;
use serde_json::Value;

/// Concatenates its arguments with a single space, e.g. `process_name(family, given)`.
struct JoinText;
impl Processor for JoinText {
    fn name(&self) -> &str {
        "process_join_text"
    }
    fn call(&self, args: &[Value]) -> Result<Value, CdsError> {
        let joined = args
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        Ok(Value::String(joined))
    }
}

/// Converts a `dd-mm-yyyy` date string to `yyyy-mm-dd`.
struct BirthDate;
impl Processor for BirthDate {
    fn name(&self) -> &str {
        "process_birth_date"
    }
    fn call(&self, args: &[Value]) -> Result<Value, CdsError> {
        let raw = args
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| CdsError::Other(anyhow::anyhow!("process_birth_date expects one string argument")))?;
        let parsed = NaiveDate::parse_from_str(raw, "%d-%m-%Y")
            .map_err(|e| CdsError::Other(anyhow::anyhow!("invalid birth date {raw:?}: {e}")))?;
        Ok(Value::String(parsed.format("%Y-%m-%d").to_string()))
    }
}

/// Takes the first `param` characters of the row value, used for truncating classification codes
/// to a coarser granularity. Grounded in `FirstNCharModifier`.
struct FirstNChars;
impl Modifier for FirstNChars {
    fn name(&self) -> &str {
        "firstnchars"
    }
    fn modify(&self, param: &str, row_value: &Value) -> Value {
        let n: usize = param.trim().parse().unwrap_or(0);
        let text = match row_value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        Value::String(text.chars().take(n).collect())
    }
}

/// Entry point every plugin cdylib exports under this exact symbol name.
#[no_mangle]
pub unsafe extern "C" fn cds_register(registrar: &mut dyn Registrar) {
    registrar.register_processor(Box::new(JoinText));
    registrar.register_processor(Box::new(BirthDate));
    registrar.register_modifier(Box::new(FirstNChars));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_text_concatenates_with_spaces() {
        let processor = JoinText;
        let result = processor.call(&[Value::String("Jane".to_string()), Value::String("Doe".to_string())]).unwrap();
        assert_eq!(result, Value::String("Jane Doe".to_string()));
    }

    #[test]
    fn birth_date_reformats_to_iso() {
        let processor = BirthDate;
        let result = processor.call(&[Value::String("05-01-1990".to_string())]).unwrap();
        assert_eq!(result, Value::String("1990-01-05".to_string()));
    }

    #[test]
    fn firstnchars_truncates() {
        let modifier = FirstNChars;
        let result = modifier.modify("3", &Value::String("A00.12".to_string()));
        assert_eq!(result, Value::String("A00".to_string()));
    }
}
