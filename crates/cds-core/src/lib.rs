//! Shared config, row model, error taxonomy and plugin traits for the CDS mapping and
//! extraction pipelines.

pub mod config;
pub mod error;
pub mod extraction_config;
pub mod model;
pub mod plugin;

pub use error::CdsError;
pub use model::{is_absent, JoinKind, JoinSpec, Row, Table, SENTINEL};
pub use plugin::{Condition, Modifier, Processor, RegisterFn, Registrar};
