use serde_json::Value;

use crate::error::CdsError;

/// A pure, variadic transformation applied to one or more mapping-resolved argument values.
///
/// Mirrors the Python `process_*`-prefixed functions discovered by the original processor
/// registry: a processor takes whatever arguments the mapping reference supplied and returns one
/// value to splice into the resource tree.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;
    fn call(&self, args: &[Value]) -> Result<Value, CdsError>;
}

/// Evaluates a single condition-expression atom against one row field.
///
/// `condition_param` is the text following the condition name in the atom (e.g. the `"18"` in
/// `["greaterthan", "18", "%age%"]`); `row_value` is the resolved column value the atom tests.
pub trait Condition: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, condition_param: &str, row_value: &Value) -> bool;
}

/// Rewrites a single row field before it is placed into a resource.
pub trait Modifier: Send + Sync {
    fn name(&self) -> &str;
    fn modify(&self, param: &str, row_value: &Value) -> Value;
}

/// Handed to a plugin's `cds_register` entry point so it can register its implementations with
/// the host without the host knowing the plugin's concrete types.
pub trait Registrar {
    fn register_processor(&mut self, processor: Box<dyn Processor>);
    fn register_condition(&mut self, condition: Box<dyn Condition>);
    fn register_modifier(&mut self, modifier: Box<dyn Modifier>);
}

/// Signature every plugin cdylib must export under the symbol name `cds_register`.
pub type RegisterFn = unsafe extern "C" fn(&mut dyn Registrar);
