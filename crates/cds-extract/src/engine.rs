use std::collections::{HashMap, HashSet};

use cds_core::extraction_config::{AttributeSpec, ExtractionConfig};
use cds_core::is_absent;
use cds_core::model::Table;
use cds_core::CdsError;
use cds_tx::condition_expr;
use cds_tx::PluginHost;
use serde_json::Value;
use tracing::{debug, warn};

use crate::ocel::{EventObjectRelation, OcelEvent, OcelLog, OcelObject, ObjectObjectRelation};

/// Runs the three sequential scans over a `resourceType -> table` dictionary. Object scan
/// completes before event scan (relations depend on the known-object set produced by it), which
/// completes before the object-to-object scan.
pub struct ExtractionEngine<'a> {
    config: &'a ExtractionConfig,
    registry: &'a PluginHost,
}

impl<'a> ExtractionEngine<'a> {
    pub fn new(config: &'a ExtractionConfig, registry: &'a PluginHost) -> Self {
        Self { config, registry }
    }

    pub fn run(&self, tables: &HashMap<String, Table>) -> OcelLog {
        let mut known_objects = HashSet::new();
        let objects = self.scan_objects(tables, &mut known_objects);
        let (events, event_object_relations) = self.scan_events(tables, &known_objects);
        let object_object_relations = self.scan_o2o(tables, &known_objects);

        OcelLog {
            objects,
            events,
            event_object_relations,
            object_object_relations,
        }
    }

    fn scan_objects(&self, tables: &HashMap<String, Table>, known_objects: &mut HashSet<String>) -> Vec<OcelObject> {
        let mut objects = Vec::new();
        for (resource_type, defs) in &self.config.defined_objects {
            let Some(table) = tables.get(resource_type) else {
                continue;
            };
            for (object_name, def) in defs {
                for row in &table.rows {
                    let row_id = row_id(row);
                    let mut attrs = HashMap::new();
                    let mut accepted = true;

                    for attr in &def.attributes {
                        if !attr.include {
                            continue;
                        }
                        let value = row.get(&attr.column).cloned().unwrap_or(Value::Null);
                        if !evaluate_attribute_condition(attr, &value, self.registry) {
                            accepted = false;
                            break;
                        }
                        attrs.insert(attr.column.clone(), apply_attribute_modifier(attr, &value, self.registry));
                    }

                    if !accepted {
                        continue;
                    }
                    let oid = format!("{object_name}-{row_id}");
                    known_objects.insert(oid.clone());
                    objects.push(OcelObject {
                        oid,
                        object_type: resource_type.clone(),
                        attrs,
                    });
                }
            }
        }
        objects
    }

    fn scan_events(
        &self,
        tables: &HashMap<String, Table>,
        known_objects: &HashSet<String>,
    ) -> (Vec<OcelEvent>, Vec<EventObjectRelation>) {
        let mut events = Vec::new();
        let mut relations = Vec::new();

        for (resource_type, defs) in &self.config.defined_events {
            let Some(table) = tables.get(resource_type) else {
                continue;
            };
            for (_, def) in defs {
                for (row_index, row) in table.rows.iter().enumerate() {
                    let timestamp = row.get(&def.timestamp_column).cloned();
                    let Some(timestamp) = timestamp.filter(|v| !is_absent(v)) else {
                        debug!(resource_type, event = %def.event_name, "dropping event with missing timestamp");
                        continue;
                    };
                    let timestamp = timestamp.as_str().map(str::to_string).unwrap_or_else(|| timestamp.to_string());
                    if !is_parseable_timestamp(&timestamp) {
                        let err = CdsError::BadTimestamp {
                            column: def.timestamp_column.clone(),
                            row_index,
                        };
                        warn!(resource_type, event = %def.event_name, error = %err, "skipping row");
                        continue;
                    }

                    let row_id = row_id(row);
                    let eid = format!("{}-{row_id}", def.event_name);
                    let mut activity = def.event_name.clone();
                    let mut attrs = HashMap::new();

                    for attr in &def.attributes {
                        if !attr.include {
                            continue;
                        }
                        let value = row.get(&attr.column).cloned().unwrap_or(Value::Null);
                        if !evaluate_attribute_condition(attr, &value, self.registry) {
                            continue;
                        }
                        let resolved = apply_attribute_modifier(attr, &value, self.registry);
                        if attr.add_to_event_name {
                            if let Some(s) = resolved.as_str() {
                                if !s.trim().is_empty() {
                                    activity.push('_');
                                    activity.push_str(s.trim());
                                }
                            }
                        }
                        attrs.insert(attr.column.clone(), resolved);
                    }

                    events.push(OcelEvent {
                        eid: eid.clone(),
                        activity,
                        timestamp,
                        attrs,
                    });

                    for relation in &def.relations {
                        let target_value = relation
                            .target_field
                            .as_ref()
                            .and_then(|field| row.get(field))
                            .cloned()
                            .unwrap_or(Value::Null);
                        let condition = relation.condition.as_deref().and_then(|name| self.registry.condition(name));
                        if !condition_expr::evaluate(
                            relation.condition.as_deref(),
                            relation.condition_param.as_deref().unwrap_or(""),
                            &target_value,
                            condition,
                        ) {
                            continue;
                        }

                        if relation.related_object == *resource_type {
                            let oid = format!("{resource_type}-{row_id}");
                            relations.push(EventObjectRelation {
                                eid: eid.clone(),
                                oid,
                                qualifier: None,
                            });
                            debug!(
                                eid = %eid,
                                "took the object-aware same-resource-type relation path; the alternative \
                                 reference-column path was not evaluated for this relation"
                            );
                            continue;
                        }

                        let Some(reference) = row.get(&relation.reference_column).and_then(Value::as_str) else {
                            continue;
                        };
                        let Some((_, id_part)) = reference.split_once('/') else {
                            debug!(reference, "event relation reference missing '/', dropping");
                            continue;
                        };

                        let mut related_oid = format!("{}-{id_part}", relation.related_object);
                        if !known_objects.contains(&related_oid) {
                            match id_part.strip_suffix(".0") {
                                Some(stripped) => {
                                    let alt = format!("{}-{stripped}", relation.related_object);
                                    if known_objects.contains(&alt) {
                                        related_oid = alt;
                                    } else {
                                        debug!(related_oid, "event relation target object unknown, dropping");
                                        continue;
                                    }
                                }
                                None => {
                                    debug!(related_oid, "event relation target object unknown, dropping");
                                    continue;
                                }
                            }
                        }

                        relations.push(EventObjectRelation {
                            eid: eid.clone(),
                            oid: related_oid,
                            qualifier: relation.qualifier.clone(),
                        });
                    }
                }
            }
        }

        (events, relations)
    }

    fn scan_o2o(&self, tables: &HashMap<String, Table>, known_objects: &HashSet<String>) -> Vec<ObjectObjectRelation> {
        let mut relations = Vec::new();
        for (resource_type, entries) in &self.config.defined_o2o_relations {
            let Some(table) = tables.get(resource_type) else {
                continue;
            };
            for entry in entries {
                for row in &table.rows {
                    let target_value = row.get(&entry.target_field).cloned().unwrap_or(Value::Null);
                    let condition = entry.condition.as_deref().and_then(|name| self.registry.condition(name));
                    if !condition_expr::evaluate(
                        entry.condition.as_deref(),
                        entry.condition_param.as_deref().unwrap_or(""),
                        &target_value,
                        condition,
                    ) {
                        continue;
                    }

                    let Some(reference) = row.get(&entry.reference_column).and_then(Value::as_str) else {
                        continue;
                    };
                    let id_part = reference.rsplit('/').next().unwrap_or(reference);
                    let target_oid = format!("{}-{id_part}", entry.related_object);
                    let source_oid = format!("{}-{}", entry.source_object, row_id(row));

                    if known_objects.contains(&source_oid) && known_objects.contains(&target_oid) {
                        relations.push(ObjectObjectRelation {
                            source_oid,
                            target_oid,
                            qualifier: entry.qualifier.clone(),
                        });
                    }
                }
            }
        }
        relations
    }
}

/// Accepts RFC 3339 datetimes and bare `yyyy-mm-dd` dates; anything else is unparseable.
fn is_parseable_timestamp(raw: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(raw).is_ok() || chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

fn row_id(row: &cds_core::model::Row) -> String {
    match row.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn evaluate_attribute_condition(attr: &AttributeSpec, value: &Value, registry: &PluginHost) -> bool {
    let condition = attr.condition.as_deref().and_then(|name| registry.condition(name));
    condition_expr::evaluate(attr.condition.as_deref(), attr.condition_value.as_deref().unwrap_or(""), value, condition)
}

fn apply_attribute_modifier(attr: &AttributeSpec, value: &Value, registry: &PluginHost) -> Value {
    match &attr.modifier {
        Some(name) => match registry.modifier(name) {
            Some(modifier) => modifier.modify(attr.modifier_value.as_deref().unwrap_or(""), value),
            None => value.clone(),
        },
        None => value.clone(),
    }
}
