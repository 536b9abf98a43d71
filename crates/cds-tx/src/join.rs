use std::collections::{HashMap, HashSet};

use cds_core::error::CdsError;
use cds_core::model::{JoinKind, JoinSpec, Row, Table};
use indexmap::IndexMap;
use serde_json::Value;

/// Executes the ordered list of join specs over the loaded tables, producing the single wide
/// table the mapping engine walks.
///
/// Columns are prefixed `<table>.<column>` except join keys, which keep their bare name so later
/// specs in the chain can match on them. The set of bare join keys is collected from every spec
/// up front — not just the spec currently being applied — since a column can be a join key for a
/// later spec in a 3+ table chain while also appearing in an earlier table. Column collisions
/// surviving a merge are resolved `_x`/`_y`-style, preferring the left (first-seen) value; this
/// policy is fixed, not configurable.
pub fn plan_joins(
    loaded: &HashMap<String, Table>,
    used_tables: &[String],
    specs: &[JoinSpec],
) -> Result<Table, CdsError> {
    let mut join_keys = HashSet::new();
    for spec in specs {
        join_keys.insert(spec.left_key.clone());
        join_keys.insert(spec.right_key.clone());
    }

    if specs.is_empty() {
        let first = used_tables
            .first()
            .ok_or_else(|| CdsError::Other(anyhow::anyhow!("resource mapping has no used tables")))?;
        let table = loaded
            .get(first)
            .ok_or_else(|| CdsError::UnknownTable(first.clone()))?;
        let projected = project(table, &join_keys);
        return Ok(rows_to_table(first, projected));
    }

    let mut accumulated: Option<Vec<IndexMap<String, Value>>> = None;

    for spec in specs {
        let right = loaded
            .get(&spec.right_table)
            .ok_or_else(|| CdsError::UnknownTable(spec.right_table.clone()))?;
        let right_rows = project(right, &join_keys);

        accumulated = Some(match accumulated.take() {
            None => {
                let left = loaded
                    .get(&spec.left_table)
                    .ok_or_else(|| CdsError::UnknownTable(spec.left_table.clone()))?;
                let left_rows = project(left, &join_keys);
                do_join(&left_rows, &spec.left_key, &right_rows, &spec.right_key, spec.join_type)
            }
            Some(accumulated_rows) => {
                do_join(&accumulated_rows, &spec.left_key, &right_rows, &spec.right_key, spec.join_type)
            }
        });
    }

    Ok(rows_to_table("joined", accumulated.unwrap_or_default()))
}

fn project(table: &Table, bare_keys: &HashSet<String>) -> Vec<IndexMap<String, Value>> {
    table
        .rows
        .iter()
        .map(|row| {
            let mut projected = IndexMap::new();
            for column in &table.columns {
                let value = row.get(column).cloned().unwrap_or(Value::Null);
                if bare_keys.contains(column) {
                    projected.insert(column.clone(), value);
                } else {
                    projected.insert(format!("{}.{}", table.name, column), value);
                }
            }
            projected
        })
        .collect()
}

fn do_join(
    left: &[IndexMap<String, Value>],
    left_key: &str,
    right: &[IndexMap<String, Value>],
    right_key: &str,
    kind: JoinKind,
) -> Vec<IndexMap<String, Value>> {
    let mut output = Vec::new();
    let mut matched_right = HashSet::new();

    for lrow in left {
        let lval = lrow.get(left_key);
        let mut any_match = false;
        for (ri, rrow) in right.iter().enumerate() {
            let rval = rrow.get(right_key);
            if let (Some(l), Some(r)) = (lval, rval) {
                if l == r && !l.is_null() {
                    any_match = true;
                    matched_right.insert(ri);
                    output.push(merge_rows(lrow, rrow));
                }
            }
        }
        if !any_match && matches!(kind, JoinKind::Left | JoinKind::Outer) {
            output.push(lrow.clone());
        }
    }

    if matches!(kind, JoinKind::Right | JoinKind::Outer) {
        for (ri, rrow) in right.iter().enumerate() {
            if !matched_right.contains(&ri) {
                output.push(rrow.clone());
            }
        }
    }

    output
}

/// Merges two projected rows, suffixing any colliding column name `_x`/`_y` and then immediately
/// collapsing that pair back down to the bare name with the left (`_x`) value.
fn merge_rows(left: &IndexMap<String, Value>, right: &IndexMap<String, Value>) -> IndexMap<String, Value> {
    let mut merged = left.clone();
    for (key, value) in right {
        if let Some(existing) = merged.shift_remove(key) {
            merged.insert(format!("{key}_x"), existing);
            merged.insert(format!("{key}_y"), value.clone());
        } else {
            merged.insert(key.clone(), value.clone());
        }
    }

    let suffixed_keys: Vec<String> = merged
        .keys()
        .filter_map(|k| k.strip_suffix("_x").map(str::to_string))
        .collect();
    for base in suffixed_keys {
        let x_key = format!("{base}_x");
        let y_key = format!("{base}_y");
        if merged.contains_key(&y_key) {
            if let Some(value) = merged.shift_remove(&x_key) {
                merged.shift_remove(&y_key);
                merged.insert(base, value);
            }
        }
    }
    merged
}

fn rows_to_table(name: &str, rows: Vec<IndexMap<String, Value>>) -> Table {
    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    for row in &rows {
        for key in row.keys() {
            if seen.insert(key.clone()) {
                columns.push(key.clone());
            }
        }
    }

    let rows = rows
        .into_iter()
        .map(|projected| {
            let mut row = Row::new();
            for (key, value) in projected {
                let unprefixed = key.rsplit_once('.').map(|(_, c)| c.to_string()).unwrap_or_else(|| key.clone());
                row.insert(key, unprefixed, value);
            }
            row
        })
        .collect();

    Table {
        name: name.to_string(),
        columns,
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cds_core::model::Row as CdsRow;

    fn table_a() -> Table {
        let mut row = CdsRow::new();
        row.insert("A.k", "k", Value::Number(1.into()));
        row.insert("A.a", "a", Value::String("x".to_string()));
        Table {
            name: "A".to_string(),
            columns: vec!["k".to_string(), "a".to_string()],
            rows: vec![row],
        }
    }

    fn table_b() -> Table {
        let mut row1 = CdsRow::new();
        row1.insert("B.k", "k", Value::Number(1.into()));
        row1.insert("B.b", "b", Value::String("y".to_string()));
        let mut row2 = CdsRow::new();
        row2.insert("B.k", "k", Value::Number(2.into()));
        row2.insert("B.b", "b", Value::String("z".to_string()));
        Table {
            name: "B".to_string(),
            columns: vec!["k".to_string(), "b".to_string()],
            rows: vec![row1, row2],
        }
    }

    #[test]
    fn s3_inner_join_scenario() {
        let mut loaded = HashMap::new();
        loaded.insert("A".to_string(), table_a());
        loaded.insert("B".to_string(), table_b());

        let spec = JoinSpec {
            left_table: "A".to_string(),
            left_key: "k".to_string(),
            right_table: "B".to_string(),
            right_key: "k".to_string(),
            join_type: JoinKind::Inner,
        };

        let joined = plan_joins(&loaded, &["A".to_string(), "B".to_string()], std::slice::from_ref(&spec)).unwrap();
        assert_eq!(joined.rows.len(), 1);
        assert_eq!(joined.rows[0].get("A.a").unwrap(), "x");
        assert_eq!(joined.rows[0].get("B.b").unwrap(), "y");
    }

    #[test]
    fn three_table_chain_keeps_later_join_key_bare() {
        let mut row_a = CdsRow::new();
        row_a.insert("A.k", "k", Value::Number(1.into()));
        row_a.insert("A.a", "a", Value::String("x".to_string()));
        let table_a = Table {
            name: "A".to_string(),
            columns: vec!["k".to_string(), "a".to_string()],
            rows: vec![row_a],
        };

        let mut row_b = CdsRow::new();
        row_b.insert("B.k", "k", Value::Number(1.into()));
        row_b.insert("B.b", "b", Value::String("y".to_string()));
        row_b.insert("B.c", "c", Value::Number(9.into()));
        let table_b = Table {
            name: "B".to_string(),
            columns: vec!["k".to_string(), "b".to_string(), "c".to_string()],
            rows: vec![row_b],
        };

        let mut row_c = CdsRow::new();
        row_c.insert("C.c", "c", Value::Number(9.into()));
        row_c.insert("C.d", "d", Value::String("z".to_string()));
        let table_c = Table {
            name: "C".to_string(),
            columns: vec!["c".to_string(), "d".to_string()],
            rows: vec![row_c],
        };

        let mut loaded = HashMap::new();
        loaded.insert("A".to_string(), table_a);
        loaded.insert("B".to_string(), table_b);
        loaded.insert("C".to_string(), table_c);

        let specs = vec![
            JoinSpec {
                left_table: "A".to_string(),
                left_key: "k".to_string(),
                right_table: "B".to_string(),
                right_key: "k".to_string(),
                join_type: JoinKind::Inner,
            },
            JoinSpec {
                left_table: "B".to_string(),
                left_key: "c".to_string(),
                right_table: "C".to_string(),
                right_key: "c".to_string(),
                join_type: JoinKind::Inner,
            },
        ];

        let joined = plan_joins(
            &loaded,
            &["A".to_string(), "B".to_string(), "C".to_string()],
            &specs,
        )
        .unwrap();

        // B.c must have stayed bare through the A-B join so the B-C join can still match on it.
        assert_eq!(joined.rows.len(), 1);
        assert_eq!(joined.rows[0].get("A.a").unwrap(), "x");
        assert_eq!(joined.rows[0].get("B.b").unwrap(), "y");
        assert_eq!(joined.rows[0].get("C.d").unwrap(), "z");
    }

    #[test]
    fn missing_table_is_fatal_for_the_mapping() {
        let loaded = HashMap::new();
        let spec = JoinSpec {
            left_table: "A".to_string(),
            left_key: "k".to_string(),
            right_table: "B".to_string(),
            right_key: "k".to_string(),
            join_type: JoinKind::Inner,
        };
        let result = plan_joins(&loaded, &["A".to_string()], std::slice::from_ref(&spec));
        assert!(matches!(result, Err(CdsError::UnknownTable(_))));
    }

    #[test]
    fn colliding_columns_prefer_left_value() {
        let mut left = IndexMap::new();
        left.insert("shared".to_string(), Value::String("left-value".to_string()));
        let mut right = IndexMap::new();
        right.insert("shared".to_string(), Value::String("right-value".to_string()));
        let merged = merge_rows(&left, &right);
        assert_eq!(merged.get("shared").unwrap(), "left-value");
        assert!(!merged.contains_key("shared_x"));
        assert!(!merged.contains_key("shared_y"));
    }
}
