use std::collections::HashMap;
use std::path::Path;

use cds_core::error::CdsError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One extracted object record, produced by the object scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcelObject {
    pub oid: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub attrs: HashMap<String, Value>,
}

/// One extracted event record, produced by the event scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcelEvent {
    pub eid: String,
    pub activity: String,
    pub timestamp: String,
    pub attrs: HashMap<String, Value>,
}

/// One event-object relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventObjectRelation {
    pub eid: String,
    pub oid: String,
    pub qualifier: Option<String>,
}

/// One object-to-object relation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectObjectRelation {
    pub source_oid: String,
    pub target_oid: String,
    pub qualifier: Option<String>,
}

/// The four result streams the extraction engine produces: objects, events, and the relations
/// linking them. Serializes directly to JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcelLog {
    pub objects: Vec<OcelObject>,
    pub events: Vec<OcelEvent>,
    pub event_object_relations: Vec<EventObjectRelation>,
    pub object_object_relations: Vec<ObjectObjectRelation>,
}

impl OcelLog {
    pub fn write_json(&self, path: &Path) -> Result<(), CdsError> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("serializing OCEL log: {e}")))?;
        std::fs::write(path, raw).map_err(|e| CdsError::Other(anyhow::anyhow!("writing {:?}: {e}", path)))
    }
}
