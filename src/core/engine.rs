//! Formula engine: dependency tracking, invalidation and recalculation
//!
//! The engine owns the dependency graph and caches for one document and
//! reads field data through a `DocumentProvider`. All operations run to
//! completion on the caller's thread.

use super::cache::{CacheStats, ExpressionCache, FieldState, FormulaCache};
use super::graph::{extract_dependencies, DependencyGraph};
use super::provider::DocumentProvider;
use super::resolver::DocumentResolver;
use crate::config::{EngineConfig, RecomputePolicy};
use crate::error::{FormulaError, FormulaResult};
use crate::types::{FieldKind, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace, warn};

/// Result of each recomputed formula field, keyed by field id
pub type RecomputeResults = BTreeMap<String, FormulaResult<Value>>;

/// What a field shows for a formula result.
///
/// Errors blank the field to its kind's default, except domain errors that
/// carry a user-facing message, which show that message.
pub fn display_value(result: &FormulaResult<Value>, kind: FieldKind) -> Value {
    match result {
        Ok(value) => value.clone(),
        Err(err) => match err.display_message() {
            Some(message) => Value::String(message.to_string()),
            None => kind.default_value(),
        },
    }
}

/// Reactive formula engine over a host document
pub struct FormulaEngine<P: DocumentProvider> {
    provider: P,
    config: EngineConfig,
    graph: DependencyGraph,
    cache: FormulaCache,
    expressions: ExpressionCache,
}

impl<P: DocumentProvider> FormulaEngine<P> {
    pub fn new(provider: P) -> Self {
        Self::with_config(provider, EngineConfig::default())
    }

    /// Build the dependency graph from every formula field in the document
    pub fn with_config(provider: P, config: EngineConfig) -> Self {
        let mut engine = Self {
            provider,
            config,
            graph: DependencyGraph::new(),
            cache: FormulaCache::new(),
            expressions: ExpressionCache::new(),
        };

        let fields = engine.provider.all_formula_field_identifiers();
        for id in &fields {
            engine.index_field(id);
        }
        debug!(formulas = fields.len(), "dependency graph built");
        engine.report_cycles();
        engine
    }

    /// Parse a formula field and record its edges. Unparsable formulas get no
    /// edges; the parse error surfaces when the field is evaluated.
    fn index_field(&mut self, id: &str) {
        let Some(formula) = self.provider.field_formula(id) else {
            self.graph.remove_field(id);
            return;
        };
        match self
            .expressions
            .get_or_parse(id, &formula, self.config.max_depth)
        {
            Ok(expr) => {
                let deps = extract_dependencies(&expr);
                trace!(field = id, ?deps, "indexed");
                self.graph.set_dependencies(id, deps);
            }
            Err(err) => {
                debug!(field = id, error = %err, "formula does not parse");
                self.graph.set_dependencies(id, BTreeSet::new());
            }
        }
    }

    fn report_cycles(&self) {
        for cycle in self.graph.find_cycles() {
            warn!(cycle = %cycle.join(" -> "), "circular reference");
        }
    }

    fn resolver(&mut self) -> DocumentResolver<'_, P> {
        DocumentResolver::new(
            &self.provider,
            &mut self.cache,
            &mut self.expressions,
            &self.config,
        )
    }

    /// Write a raw field value, then invalidate it and everything depending
    /// on it. Under the eager policy the invalidated formulas are recomputed
    /// and their results returned; under the lazy policy the result is empty.
    pub fn update_value(&mut self, id: &str, value: Value) -> RecomputeResults {
        debug!(field = id, value = %value, "update");
        self.provider.set_field_value(id, value);
        let dirty = self.invalidate([id]);
        self.recompute_if_eager(&dirty)
    }

    fn recompute_if_eager(&mut self, dirty: &BTreeSet<String>) -> RecomputeResults {
        match self.config.recompute {
            RecomputePolicy::Eager => self.recompute(dirty),
            RecomputePolicy::Lazy => RecomputeResults::new(),
        }
    }

    /// Mark the given fields and their transitive dependents dirty.
    /// Returns the full set of affected fields, seeds included.
    pub fn invalidate<'s, I>(&mut self, ids: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'s str>,
    {
        let dirty = self.graph.transitive_dependents(ids);
        for id in &dirty {
            self.cache.evict(id);
        }
        debug!(fields = dirty.len(), "invalidated");
        dirty
    }

    /// Evaluate the formula fields of `fields` in dependency order and push
    /// each freshly computed value to the provider.
    ///
    /// Fields that are still cached are returned without re-evaluation.
    /// Fields in a dependency cycle resolve to `CircularReference`.
    pub fn recompute(&mut self, fields: &BTreeSet<String>) -> RecomputeResults {
        let formulas: BTreeSet<String> = fields
            .iter()
            .filter(|id| self.provider.field_formula(id).is_some())
            .cloned()
            .collect();
        let (results, fresh) = self.evaluate_in_order(&formulas);

        for id in fresh {
            if let Some(result) = results.get(&id) {
                let shown = display_value(result, self.provider.field_kind(&id));
                trace!(field = %id, value = %shown, "push");
                self.provider.push_computed_value(&id, shown);
            }
        }

        debug!(fields = results.len(), "recomputed");
        results
    }

    /// Evaluate `targets` after their uncached precedents, one dependency
    /// layer at a time, so a formula only ever reads cached results of the
    /// fields it references and chains never nest evaluations.
    ///
    /// Returns the results of `targets` and those of them that were dirty.
    fn evaluate_in_order(
        &mut self,
        targets: &BTreeSet<String>,
    ) -> (RecomputeResults, Vec<String>) {
        let fields = self.with_uncached_precedents(targets);
        let components = self.graph.components_in_order(&fields);

        let mut results = RecomputeResults::new();
        let mut fresh = Vec::new();

        for component in components {
            let circular = self.graph.is_cyclic(&component).then(|| {
                let mut cycle = component.clone();
                cycle.push(component[0].clone());
                FormulaError::CircularReference { cycle }
            });

            for id in component {
                let was_dirty = self.cache.state(&id) == FieldState::Dirty;
                let result = match &circular {
                    Some(err) => {
                        self.cache.store(&id, Err(err.clone()));
                        Err(err.clone())
                    }
                    None => self.resolver().evaluate_field(&id),
                };
                if targets.contains(&id) {
                    if was_dirty {
                        fresh.push(id.clone());
                    }
                    results.insert(id, result);
                }
            }
        }
        (results, fresh)
    }

    /// `targets` plus every dirty formula field they transitively reference
    fn with_uncached_precedents(&self, targets: &BTreeSet<String>) -> BTreeSet<String> {
        let mut found = targets.clone();
        let mut stack: Vec<&str> = targets.iter().map(String::as_str).collect();

        while let Some(id) = stack.pop() {
            let Some(precedents) = self.graph.precedents(id) else {
                continue;
            };
            for dep in precedents {
                if self.cache.state(dep) == FieldState::Dirty
                    && self.provider.field_formula(dep).is_some()
                    && found.insert(dep.clone())
                {
                    stack.push(dep);
                }
            }
        }
        found
    }

    /// Drop every cached value and recompute all formula fields
    pub fn evaluate_all(&mut self) -> RecomputeResults {
        self.cache.clear();
        let fields = self.graph.formula_fields();
        self.recompute(&fields)
    }

    /// Current result of a field. Formula fields are computed on demand when
    /// dirty; other fields return their stored value.
    pub fn value(&mut self, id: &str) -> FormulaResult<Value> {
        if self.provider.field_formula(id).is_some() {
            let targets = BTreeSet::from([id.to_string()]);
            let (mut results, _) = self.evaluate_in_order(&targets);
            return match results.remove(id) {
                Some(result) => result,
                None => self.resolver().evaluate_field(id),
            };
        }
        self.provider
            .field_value(id)
            .ok_or_else(|| FormulaError::invalid_reference(id))?
            .into_result()
    }

    /// Reindex a field whose formula text was added, changed or removed by
    /// the host, then invalidate it and its dependents.
    pub fn formula_changed(&mut self, id: &str) -> RecomputeResults {
        self.expressions.remove(id);
        self.index_field(id);
        self.report_cycles();
        let dirty = self.invalidate([id]);
        self.recompute_if_eager(&dirty)
    }

    /// Forget a field the host has deleted. Its dependents are invalidated and
    /// will now see an invalid reference.
    pub fn remove_field(&mut self, id: &str) -> RecomputeResults {
        self.graph.remove_field(id);
        self.expressions.remove(id);
        let dirty = self.invalidate([id]);
        self.recompute_if_eager(&dirty)
    }

    /// Evaluate an expression against the document without storing it
    pub fn evaluate_expression(&mut self, expression: &str) -> FormulaResult<Value> {
        self.resolver().evaluate_expression(expression)
    }

    /// Cache state of a formula field; plain fields are always clean
    pub fn field_state(&self, id: &str) -> FieldState {
        if self.provider.field_formula(id).is_some() {
            self.cache.state(id)
        } else {
            FieldState::Clean
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Mutable access for host edits the engine does not drive itself. Call
    /// `formula_changed` or `invalidate` afterwards for anything that changed.
    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn into_provider(self) -> P {
        self.provider
    }
}
