use std::collections::HashMap;
use std::path::Path;

use cds_core::error::CdsError;
use cds_core::{Condition, Modifier, Processor, RegisterFn, Registrar};
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{info, warn};

/// Prepends `param` to the row value, used for building composite identifiers.
struct PrefixModifier;
impl Modifier for PrefixModifier {
    fn name(&self) -> &str {
        "Prefix"
    }
    fn modify(&self, param: &str, row_value: &Value) -> Value {
        Value::String(format!("{param}{}", stringify(row_value)))
    }
}

/// Appends `param` to the row value.
struct SuffixModifier;
impl Modifier for SuffixModifier {
    fn name(&self) -> &str {
        "Suffix"
    }
    fn modify(&self, param: &str, row_value: &Value) -> Value {
        Value::String(format!("{}{param}", stringify(row_value)))
    }
}

/// Passes the row value through unchanged.
struct IdentityModifier;
impl Modifier for IdentityModifier {
    fn name(&self) -> &str {
        "None"
    }
    fn modify(&self, _param: &str, row_value: &Value) -> Value {
        row_value.clone()
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// True iff `row_value` equals `condition_param`, compared as strings.
struct EqualsCondition;
impl Condition for EqualsCondition {
    fn name(&self) -> &str {
        "equals"
    }
    fn evaluate(&self, condition_param: &str, row_value: &Value) -> bool {
        stringify(row_value) == condition_param
    }
}

struct NotEqualsCondition;
impl Condition for NotEqualsCondition {
    fn name(&self) -> &str {
        "notequals"
    }
    fn evaluate(&self, condition_param: &str, row_value: &Value) -> bool {
        stringify(row_value) != condition_param
    }
}

/// True iff `row_value`, parsed as a `%Y-%m-%d` date, falls within the inclusive range
/// `"start..end"` (also `%Y-%m-%d`). Grounded in `plugins/conditions/daterange.py`; this
/// workspace uses `..` rather than the original's single `-` as the range separator, since a
/// single dash collides with the dashes inside an ISO date.
struct DateRangeCondition;
impl Condition for DateRangeCondition {
    fn name(&self) -> &str {
        "daterange"
    }
    fn evaluate(&self, condition_param: &str, row_value: &Value) -> bool {
        let Some((start_str, end_str)) = condition_param.split_once("..") else {
            warn!(condition_param, "daterange condition expects a 'start..end' range");
            return false;
        };
        let Some(value_str) = row_value.as_str() else {
            return false;
        };
        let parse = |s: &str| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok();
        match (parse(start_str), parse(end_str), parse(value_str)) {
            (Some(start), Some(end), Some(value)) => start <= value && value <= end,
            _ => false,
        }
    }
}

/// Scans a directory of plugin dynamic libraries and holds every registered
/// processor/condition/modifier, alongside a small built-in set always available before any
/// directory scan.
pub struct PluginHost {
    processors: HashMap<String, Box<dyn Processor>>,
    conditions: HashMap<String, Box<dyn Condition>>,
    modifiers: HashMap<String, Box<dyn Modifier>>,
    libraries: Vec<libloading::Library>,
}

impl Registrar for PluginHost {
    fn register_processor(&mut self, processor: Box<dyn Processor>) {
        self.processors.insert(processor.name().to_string(), processor);
    }

    fn register_condition(&mut self, condition: Box<dyn Condition>) {
        self.conditions.insert(condition.name().to_string(), condition);
    }

    fn register_modifier(&mut self, modifier: Box<dyn Modifier>) {
        self.modifiers.insert(modifier.name().to_string(), modifier);
    }
}

impl PluginHost {
    /// Builds a host with the built-in modifiers and conditions already registered, mirroring the
    /// Python `apply_modifier`'s hard-coded `Prefix`/`Suffix` fast path.
    pub fn new() -> Self {
        let mut host = Self {
            processors: HashMap::new(),
            conditions: HashMap::new(),
            modifiers: HashMap::new(),
            libraries: Vec::new(),
        };
        host.register_modifier(Box::new(PrefixModifier));
        host.register_modifier(Box::new(SuffixModifier));
        host.register_modifier(Box::new(IdentityModifier));
        host.register_condition(Box::new(EqualsCondition));
        host.register_condition(Box::new(NotEqualsCondition));
        host.register_condition(Box::new(DateRangeCondition));
        host
    }

    /// Scans `dir` for `.so`/`.dylib`/`.dll` files, loads each, and invokes its exported
    /// `cds_register` symbol so it can hand back its processors/conditions/modifiers.
    ///
    /// # Safety
    /// Loading and calling into an arbitrary dynamic library is inherently unsafe: the plugin
    /// must export a `cds_register` symbol matching [`cds_core::RegisterFn`] exactly.
    pub unsafe fn load_dir(&mut self, dir: &Path) -> Result<(), CdsError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CdsError::Other(anyhow::anyhow!("reading plugin dir {:?}: {e}", dir)))?;

        for entry in entries {
            let entry = entry.map_err(|e| CdsError::Other(anyhow::anyhow!("listing {:?}: {e}", dir)))?;
            let path = entry.path();
            let is_plugin = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("so") | Some("dylib") | Some("dll")
            );
            if !is_plugin {
                continue;
            }

            let library = libloading::Library::new(&path)
                .map_err(|e| CdsError::Other(anyhow::anyhow!("loading plugin {:?}: {e}", path)))?;
            let register: libloading::Symbol<RegisterFn> = library
                .get(b"cds_register")
                .map_err(|e| CdsError::Other(anyhow::anyhow!("plugin {:?} missing cds_register: {e}", path)))?;
            register(self);
            info!(plugin = %path.display(), "loaded plugin");
            self.libraries.push(library);
        }
        Ok(())
    }

    pub fn processor(&self, name: &str) -> Option<&dyn Processor> {
        self.processors.get(name).map(|p| p.as_ref())
    }

    pub fn condition(&self, name: &str) -> Option<&dyn Condition> {
        self.conditions.get(name).map(|c| c.as_ref())
    }

    pub fn modifier(&self, name: &str) -> Option<&dyn Modifier> {
        self.modifiers.get(name).map(|m| m.as_ref())
    }
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_and_suffix_builtins_are_registered() {
        let host = PluginHost::new();
        let value = Value::String("42".to_string());
        assert_eq!(host.modifier("Prefix").unwrap().modify("pat-", &value), Value::String("pat-42".to_string()));
        assert_eq!(host.modifier("Suffix").unwrap().modify("-v1", &value), Value::String("42-v1".to_string()));
        assert_eq!(host.modifier("None").unwrap().modify("", &value), value);
    }

    #[test]
    fn daterange_condition_checks_inclusive_bounds() {
        let host = PluginHost::new();
        let condition = host.condition("daterange").unwrap();
        let in_range = Value::String("2023-05-01".to_string());
        let out_of_range = Value::String("2023-06-01".to_string());
        assert!(condition.evaluate("2023-01-01..2023-05-31", &in_range));
        assert!(!condition.evaluate("2023-01-01..2023-05-31", &out_of_range));
    }

    #[test]
    fn equals_and_notequals_builtins() {
        let host = PluginHost::new();
        let value = Value::String("active".to_string());
        assert!(host.condition("equals").unwrap().evaluate("active", &value));
        assert!(host.condition("notequals").unwrap().evaluate("inactive", &value));
    }
}
