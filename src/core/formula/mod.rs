//! Formula language: tokenizer, parser and tree-walking evaluator
//!
//! Built-in functions are grouped by family, each family adding its methods
//! to `Evaluator` from its own module.

mod arrays;
mod dates;
pub mod evaluator;
mod logical;
mod math;
pub mod parser;
mod text;
pub mod tokenizer;

pub use dates::extract_date;
pub use evaluator::{Evaluator, FieldResolver, Scope};
pub use parser::{parse, parse_with_depth, Expr, InfixOp, PathSegment, PrefixOp, ReferencePath};
