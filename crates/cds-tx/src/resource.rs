use serde_json::{Map, Value};

/// A constructed resource: a tree of scalars/lists/mappings. Identity is the root's `id` field,
/// if present.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource(pub Value);

impl Resource {
    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(Value::as_str)
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Factors resource construction behind an interface so the mapping engine stays independent of
/// any particular clinical-interchange library. The default constructor simply stamps
/// `resourceType` onto the mapping engine's resolved field map, performing no schema validation —
/// that happens downstream at the sink, if at all.
pub trait ResourceConstructor: Send + Sync {
    fn construct(&self, resource_type: &str, fields: Map<String, Value>) -> Resource;
}

pub struct DefaultResourceConstructor;

impl ResourceConstructor for DefaultResourceConstructor {
    fn construct(&self, resource_type: &str, mut fields: Map<String, Value>) -> Resource {
        fields.insert("resourceType".to_string(), Value::String(resource_type.to_string()));
        Resource(Value::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamps_resource_type_and_exposes_id() {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String("7".to_string()));
        let resource = DefaultResourceConstructor.construct("Patient", fields);
        assert_eq!(resource.resource_type(), Some("Patient"));
        assert_eq!(resource.id(), Some("7"));
    }
}
