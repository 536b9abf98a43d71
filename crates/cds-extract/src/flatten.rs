use std::collections::HashMap;

use cds_core::model::{Row, Table};
use serde_json::Value;
use tracing::info;
use tokio::task::JoinSet;

const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Flattens a nested resource JSON tree into `column -> value` pairs, `.`-joining nested keys.
/// Empty arrays flatten to an explicit empty-array leaf; non-empty arrays flatten by index.
pub fn flatten_json_value(value: &Value, prefix: &str, result: &mut HashMap<String, Value>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let field_name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_json_value(val, &field_name, result);
            }
        }
        Value::Array(items) => {
            if items.is_empty() {
                result.insert(prefix.to_string(), Value::Array(vec![]));
            } else {
                for (i, item) in items.iter().enumerate() {
                    flatten_json_value(item, &format!("{prefix}.{i}"), result);
                }
            }
        }
        other => {
            result.insert(prefix.to_string(), other.clone());
        }
    }
}

/// Flattens a batch of resources of the same `resourceType` into a `Table`, fanning the work out
/// over a bounded worker pool (default size 4). Ordering between resources is not preserved;
/// ordering of one resource's own fields is, via the row's column insertion order.
pub async fn flatten_resources(resource_type: &str, resources: Vec<Value>, pool_size: Option<usize>) -> Table {
    let pool_size = pool_size.unwrap_or(DEFAULT_WORKER_POOL_SIZE).max(1);
    let mut rows = Vec::with_capacity(resources.len());
    let mut columns_seen = indexmap::IndexSet::new();

    let mut pending = resources.into_iter();
    let mut in_flight = JoinSet::new();

    loop {
        while in_flight.len() < pool_size {
            let Some(resource) = pending.next() else { break };
            in_flight.spawn(async move {
                let mut flat = HashMap::new();
                flatten_json_value(&resource, "", &mut flat);
                flat
            });
        }
        if in_flight.is_empty() {
            break;
        }
        if let Some(result) = in_flight.join_next().await {
            match result {
                Ok(flat) => {
                    let mut row = Row::new();
                    for (column, value) in &flat {
                        columns_seen.insert(column.clone());
                        row.insert(column.clone(), column.clone(), value.clone());
                    }
                    rows.push(row);
                }
                Err(e) => {
                    info!(resource_type, error = %e, "flattening task panicked, dropping resource");
                }
            }
        }
    }

    Table {
        name: resource_type.to_string(),
        columns: columns_seen.into_iter().collect(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flattens_nested_objects_with_dotted_keys() {
        let mut out = HashMap::new();
        let resource = json!({
            "resourceType": "Patient",
            "id": "7",
            "name": { "family": "Doe", "given": "Jane" }
        });
        flatten_json_value(&resource, "", &mut out);
        assert_eq!(out.get("name.family").unwrap(), "Doe");
        assert_eq!(out.get("id").unwrap(), "7");
    }

    #[tokio::test]
    async fn flattens_a_batch_of_resources_into_a_table() {
        let resources = vec![
            json!({"resourceType": "Patient", "id": "1"}),
            json!({"resourceType": "Patient", "id": "2"}),
        ];
        let table = flatten_resources("Patient", resources, Some(2)).await;
        assert_eq!(table.rows.len(), 2);
        assert!(table.columns.contains(&"id".to_string()));
    }
}
