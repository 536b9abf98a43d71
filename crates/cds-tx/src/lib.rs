//! Plugin host, condition evaluator, join planner, and mapping engine.

pub mod condition_expr;
pub mod join;
pub mod mapping_engine;
pub mod plugins;
pub mod resource;

pub use join::plan_joins;
pub use mapping_engine::MappingEngine;
pub use plugins::PluginHost;
pub use resource::{DefaultResourceConstructor, Resource, ResourceConstructor};
