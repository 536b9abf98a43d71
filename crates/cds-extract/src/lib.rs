//! Resource flattener and OCEL extraction engine.

pub mod engine;
pub mod flatten;
pub mod ocel;

pub use engine::ExtractionEngine;
pub use flatten::{flatten_json_value, flatten_resources};
pub use ocel::OcelLog;
