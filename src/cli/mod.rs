//! CLI command handlers

pub mod commands;

pub use commands::{eval, evaluate, graph, OutputFormat};
