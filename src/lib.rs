//! FieldForge - reactive formula engine for document fields
//!
//! Formula fields hold expressions that reference other fields. The engine
//! parses them, tracks which fields depend on which, and after an edit
//! recomputes only the affected formulas, in dependency order.
//!
//! # Features
//!
//! - Expression language with operators, field references (`{field}`,
//!   `{table.0.column}`, `{table.column}`), built-in functions and lambdas
//!   for array functions (`map({items}, (x) -> x * 2)`)
//! - Dependency graph with cycle detection
//! - Per-field cache with targeted invalidation
//! - Host documents plug in through the `DocumentProvider` trait
//!
//! # Example
//!
//! ```no_run
//! use fieldforge::core::FormulaEngine;
//! use fieldforge::document::Document;
//! use fieldforge::types::Value;
//! use std::path::Path;
//!
//! let document = Document::load(Path::new("form.yaml"))?;
//! let mut engine = FormulaEngine::new(document);
//! engine.evaluate_all();
//!
//! let changed = engine.update_value("age", Value::from(18.0));
//! for (field, result) in &changed {
//!     println!("{} = {:?}", field, result);
//! }
//! # Ok::<(), fieldforge::error::DocumentError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod document;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{EngineConfig, RecomputePolicy};
pub use core::{DocumentProvider, FormulaEngine};
pub use error::{DocumentError, DocumentResult, FormulaError, FormulaResult};
pub use types::{FieldKind, Value};
