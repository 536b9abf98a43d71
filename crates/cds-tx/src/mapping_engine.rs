use cds_core::error::CdsError;
use cds_core::is_absent;
use cds_core::model::Row;
use serde_json::Value;

use crate::plugins::PluginHost;
use crate::resource::{Resource, ResourceConstructor};

/// Walks a mapping template over one joined row, resolving literal, column, and processor-call
/// references and constructing the resulting resource.
pub struct MappingEngine<'a> {
    registry: &'a PluginHost,
    constructor: &'a dyn ResourceConstructor,
}

impl<'a> MappingEngine<'a> {
    pub fn new(registry: &'a PluginHost, constructor: &'a dyn ResourceConstructor) -> Self {
        Self { registry, constructor }
    }

    pub fn apply(
        &self,
        resource_type: &str,
        fields: &Value,
        row: &Row,
        row_index: usize,
    ) -> Result<Resource, CdsError> {
        let resolved = self.resolve(fields, row, row_index, resource_type)?;
        let map = match resolved {
            Some(Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        Ok(self.constructor.construct(resource_type, map))
    }

    /// Resolves one node of the mapping template. `Ok(None)` means the enclosing key (or list
    /// position) should be omitted.
    fn resolve(
        &self,
        value: &Value,
        row: &Row,
        row_index: usize,
        resource_type: &str,
    ) -> Result<Option<Value>, CdsError> {
        match value {
            Value::String(s) => self.resolve_string(s, row, row_index, resource_type),
            Value::Array(items) => self.resolve_array(items, row, row_index, resource_type),
            Value::Object(map) => {
                let mut out = serde_json::Map::new();
                for (key, v) in map {
                    if let Some(resolved) = self.resolve(v, row, row_index, resource_type)? {
                        out.insert(key.clone(), resolved);
                    }
                }
                Ok(Some(Value::Object(out)))
            }
            other => Ok(Some(other.clone())),
        }
    }

    fn resolve_string(
        &self,
        s: &str,
        row: &Row,
        row_index: usize,
        resource_type: &str,
    ) -> Result<Option<Value>, CdsError> {
        if let Some(column) = strip_wrapper(s, '%') {
            return match row.get(column) {
                None => Err(CdsError::MissingColumn {
                    resource_type: resource_type.to_string(),
                    row_index,
                    column: column.to_string(),
                }),
                Some(value) if is_absent(value) => Ok(None),
                Some(value) => Ok(Some(value.clone())),
            };
        }

        if s.eq_ignore_ascii_case("none") {
            return Ok(None);
        }
        Ok(Some(Value::String(s.to_string())))
    }

    fn resolve_array(
        &self,
        items: &[Value],
        row: &Row,
        row_index: usize,
        resource_type: &str,
    ) -> Result<Option<Value>, CdsError> {
        if let Some(Value::String(first)) = items.first() {
            if let Some(processor_name) = strip_wrapper(first, '$') {
                let processor = self
                    .registry
                    .processor(processor_name)
                    .ok_or_else(|| CdsError::UnknownProcessor(processor_name.to_string()))?;

                let mut args = Vec::with_capacity(items.len().saturating_sub(1));
                for item in &items[1..] {
                    let resolved = self.resolve(item, row, row_index, resource_type)?;
                    args.push(resolved.unwrap_or(Value::Null));
                }

                let result = processor.call(&args).map_err(|source| CdsError::ProcessorFailure {
                    processor: processor_name.to_string(),
                    row_index,
                    source: source.into(),
                })?;
                return Ok(Some(result));
            }
        }

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let Some(resolved) = self.resolve(item, row, row_index, resource_type)? {
                out.push(resolved);
            }
        }
        Ok(Some(Value::Array(out)))
    }
}

/// `"%col%"` / `"$name$"` both share the shape `<wrapper><body><wrapper>`; strips the wrapper
/// character from both ends and returns the body if both are present.
fn strip_wrapper(s: &str, wrapper: char) -> Option<&str> {
    let mut chars = s.chars();
    if chars.next() != Some(wrapper) {
        return None;
    }
    let body = &s[wrapper.len_utf8()..];
    body.strip_suffix(wrapper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::DefaultResourceConstructor;
    use cds_core::{CdsError as Err, Processor, Registrar};

    struct JoinNames;
    impl Processor for JoinNames {
        fn name(&self) -> &str {
            "process_name"
        }
        fn call(&self, args: &[Value]) -> Result<Value, Err> {
            let family = args.first().and_then(Value::as_str).unwrap_or_default();
            let given = args.get(1).and_then(Value::as_str).unwrap_or_default();
            Ok(Value::String(format!("{given} {family}")))
        }
    }

    fn row_with(pairs: &[(&str, &str)]) -> Row {
        let mut row = Row::new();
        for (k, v) in pairs {
            row.insert(k.to_string(), k.to_string(), Value::String(v.to_string()));
        }
        row
    }

    #[test]
    fn s1_literal_column_processor_scenario() {
        let mut registry = PluginHost::new();
        registry.register_processor(Box::new(JoinNames));
        let constructor = DefaultResourceConstructor;
        let engine = MappingEngine::new(&registry, &constructor);

        let row = row_with(&[("pid", "7"), ("family", "Doe"), ("given", "Jane")]);
        let fields = serde_json::json!({
            "id": "%pid%",
            "name": ["$process_name$", "%family%", "%given%"],
            "gender": "unknown"
        });

        let resource = engine.apply("Patient", &fields, &row, 0).unwrap();
        let value = resource.into_value();
        assert_eq!(value["resourceType"], "Patient");
        assert_eq!(value["id"], "7");
        assert_eq!(value["name"], "Jane Doe");
        assert_eq!(value["gender"], "unknown");
    }

    #[test]
    fn s2_sentinel_drop_scenario() {
        let registry = PluginHost::new();
        let constructor = DefaultResourceConstructor;
        let engine = MappingEngine::new(&registry, &constructor);

        let row = row_with(&[("pid", "none")]);
        let fields = serde_json::json!({ "id": "%pid%" });
        let resource = engine.apply("Patient", &fields, &row, 0).unwrap();
        let value = resource.into_value();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn unknown_column_is_missing_column_error() {
        let registry = PluginHost::new();
        let constructor = DefaultResourceConstructor;
        let engine = MappingEngine::new(&registry, &constructor);

        let row = row_with(&[("pid", "7")]);
        let fields = serde_json::json!({ "id": "%ghost%" });
        let result = engine.apply("Patient", &fields, &row, 3);
        assert!(matches!(result, Err(CdsError::MissingColumn { row_index: 3, .. })));
    }
}
