//! Per-field memoization
//!
//! `FormulaCache` holds the last computed result of each formula field. A field
//! with an entry is `Clean`; evicting it makes it `Dirty`. `ExpressionCache`
//! keeps parsed ASTs so a formula is parsed once per distinct expression text.

use super::formula::{parse_with_depth, Expr};
use crate::error::FormulaResult;
use crate::types::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Cache validity of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldState {
    /// The cached value is current
    Clean,
    /// Needs recomputation before it can be read
    Dirty,
}

/// Counters for cache behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    /// AST evaluations of formula fields
    pub evaluations: usize,
}

#[derive(Debug, Default)]
pub struct FormulaCache {
    entries: HashMap<String, FormulaResult<Value>>,
    stats: CacheStats,
}

impl FormulaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached result for `id`, counting the hit or miss
    pub fn get(&mut self, id: &str) -> Option<FormulaResult<Value>> {
        match self.entries.get(id) {
            Some(result) => {
                self.stats.hits += 1;
                Some(result.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn store(&mut self, id: &str, result: FormulaResult<Value>) {
        self.entries.insert(id.to_string(), result);
    }

    pub fn record_evaluation(&mut self) {
        self.stats.evaluations += 1;
    }

    /// Drop the entry for `id`. Returns whether one existed.
    pub fn evict(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn state(&self, id: &str) -> FieldState {
        if self.entries.contains_key(id) {
            FieldState::Clean
        } else {
            FieldState::Dirty
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

/// Parsed formula of one field, tagged with the text it came from
#[derive(Debug)]
struct ParsedFormula {
    source: String,
    expr: FormulaResult<Rc<Expr>>,
}

/// Parse results keyed by field id
#[derive(Debug, Default)]
pub struct ExpressionCache {
    parsed: HashMap<String, ParsedFormula>,
}

impl ExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parsed AST for a field's formula. Re-parses when the text changed.
    /// Parse failures are cached too.
    pub fn get_or_parse(
        &mut self,
        id: &str,
        formula: &str,
        max_depth: usize,
    ) -> FormulaResult<Rc<Expr>> {
        if let Some(entry) = self.parsed.get(id) {
            if entry.source == formula {
                return entry.expr.clone();
            }
        }
        let expr = parse_with_depth(formula, max_depth).map(Rc::new);
        self.parsed.insert(
            id.to_string(),
            ParsedFormula {
                source: formula.to_string(),
                expr: expr.clone(),
            },
        );
        expr
    }

    pub fn remove(&mut self, id: &str) {
        self.parsed.remove(id);
    }
}
