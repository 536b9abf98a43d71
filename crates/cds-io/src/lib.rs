//! Table loader strategies and the resource sink.

pub mod csv_loader;
pub mod loader_registry;
pub mod sink;
pub mod strategies;

pub use loader_registry::LoaderRegistry;
pub use sink::{ResourceSink, SinkOutcome};
pub use strategies::TableLoadStrategy;
