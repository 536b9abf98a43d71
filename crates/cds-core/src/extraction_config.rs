use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CdsError;

/// One attribute of an object or event definition: which column to pull, whether to include it,
/// and the condition/modifier that gate and transform it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub column: String,
    #[serde(default = "default_true")]
    pub include: bool,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub condition_value: Option<String>,
    #[serde(default)]
    pub modifier: Option<String>,
    #[serde(default)]
    pub modifier_value: Option<String>,
    /// If set, a non-empty resolved value appends `_{value}` to the owning event's activity name.
    #[serde(default)]
    pub add_to_event_name: bool,
}

fn default_true() -> bool {
    true
}

/// One declared object type sourced from a given resource type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub attributes: Vec<AttributeSpec>,
}

/// One event-to-object relation emitted alongside an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSpec {
    pub reference_column: String,
    #[serde(default)]
    pub qualifier: Option<String>,
    pub related_object: String,
    #[serde(default)]
    pub target_field: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub condition_param: Option<String>,
}

/// One declared event type sourced from a given resource type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDefinition {
    pub event_name: String,
    pub timestamp_column: String,
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    #[serde(default)]
    pub relations: Vec<RelationSpec>,
}

/// One object-to-object relation declared for a source resource type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct O2ORelationSpec {
    pub source_object: String,
    pub target_field: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub condition_param: Option<String>,
    pub reference_column: String,
    #[serde(default)]
    pub qualifier: Option<String>,
    pub related_object: String,
}

/// Round-trippable extraction-side configuration: `{ defined_objects, defined_events,
/// defined_o2o_relations, fhir_query }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// resourceType -> objectName -> definition
    pub defined_objects: HashMap<String, HashMap<String, ObjectDefinition>>,
    /// resourceType -> eventName -> definition
    pub defined_events: HashMap<String, HashMap<String, EventDefinition>>,
    /// resourceType -> list of o2o relation specs
    pub defined_o2o_relations: HashMap<String, Vec<O2ORelationSpec>>,
    pub fhir_query: String,
}

impl ExtractionConfig {
    pub fn load(path: &Path) -> Result<Self, CdsError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("reading {:?}: {e}", path)))?;
        serde_json::from_str(&raw)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("parsing {:?}: {e}", path)))
    }

    pub fn save(&self, path: &Path) -> Result<(), CdsError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("serializing extraction config: {e}")))?;
        fs::write(path, raw)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("writing {:?}: {e}", path)))
    }

    /// Parses from an already-loaded `Value`, used by tests and by callers that already hold the
    /// document in memory.
    pub fn from_value(value: Value) -> Result<Self, CdsError> {
        serde_json::from_value(value)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("parsing extraction config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn sample() -> ExtractionConfig {
        let mut objects = Map::new();
        let mut patient_objects = Map::new();
        patient_objects.insert(
            "Patient".to_string(),
            ObjectDefinition {
                attributes: vec![AttributeSpec {
                    column: "name".to_string(),
                    include: true,
                    condition: None,
                    condition_value: None,
                    modifier: None,
                    modifier_value: None,
                    add_to_event_name: false,
                }],
            },
        );
        objects.insert("Patient".to_string(), patient_objects);

        ExtractionConfig {
            defined_objects: objects,
            defined_events: Map::new(),
            defined_o2o_relations: Map::new(),
            fhir_query: "Encounter?status=finished".to_string(),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let config = sample();
        let json = serde_json::to_value(&config).unwrap();
        let restored = ExtractionConfig::from_value(json.clone()).unwrap();
        let rejson = serde_json::to_value(&restored).unwrap();
        assert_eq!(json, rejson);
        assert_eq!(restored.fhir_query, "Encounter?status=finished");
    }
}
