//! Formula engine with dependency tracking and targeted recalculation

pub mod cache;
pub mod engine;
pub mod formula;
pub mod graph;
pub mod provider;
pub mod resolver;

pub use cache::{CacheStats, FieldState};
pub use engine::{display_value, FormulaEngine, RecomputeResults};
pub use graph::DependencyGraph;
pub use provider::DocumentProvider;
