//! Field dependency graph
//!
//! Edges run from a formula field to the fields its expression references
//! (precedents), with the reverse map kept alongside for invalidation.

use super::formula::Expr;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::{BTreeSet, HashMap, VecDeque};

/// Root identifiers of every reference in `expr` that names a document field.
/// Names bound by an enclosing lambda are skipped.
pub fn extract_dependencies(expr: &Expr) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    let mut bound = Vec::new();
    collect_references(expr, &mut bound, &mut deps);
    deps
}

fn collect_references<'e>(expr: &'e Expr, bound: &mut Vec<&'e str>, deps: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Reference(path) => {
            if !bound.contains(&path.root.as_str()) {
                deps.insert(path.root.clone());
            }
        }
        Expr::Prefix { operand, .. } => collect_references(operand, bound, deps),
        Expr::Infix { left, right, .. } => {
            collect_references(left, bound, deps);
            collect_references(right, bound, deps);
        }
        Expr::FunctionCall { args, .. } => {
            for arg in args {
                collect_references(arg, bound, deps);
            }
        }
        Expr::Array(items) => {
            for item in items {
                collect_references(item, bound, deps);
            }
        }
        Expr::Index { target, index } => {
            collect_references(target, bound, deps);
            collect_references(index, bound, deps);
        }
        Expr::Closure { params, body } => {
            let depth = bound.len();
            bound.extend(params.iter().map(String::as_str));
            collect_references(body, bound, deps);
            bound.truncate(depth);
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    /// field -> fields it references
    precedents: HashMap<String, BTreeSet<String>>,
    /// field -> fields whose formulas reference it
    dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the outgoing edges of `field`
    pub fn set_dependencies(&mut self, field: &str, deps: BTreeSet<String>) {
        self.clear_precedents(field);
        for dep in &deps {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(field.to_string());
        }
        self.precedents.insert(field.to_string(), deps);
    }

    /// Drop the outgoing edges of `field`. Fields referencing it keep their edges.
    pub fn remove_field(&mut self, field: &str) {
        self.clear_precedents(field);
        self.precedents.remove(field);
    }

    fn clear_precedents(&mut self, field: &str) {
        if let Some(old) = self.precedents.get(field) {
            for dep in old {
                if let Some(set) = self.dependents.get_mut(dep) {
                    set.remove(field);
                    if set.is_empty() {
                        self.dependents.remove(dep);
                    }
                }
            }
        }
    }

    pub fn precedents(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.precedents.get(field)
    }

    pub fn dependents(&self, field: &str) -> Option<&BTreeSet<String>> {
        self.dependents.get(field)
    }

    /// Formula fields with recorded edges
    pub fn formula_fields(&self) -> BTreeSet<String> {
        self.precedents.keys().cloned().collect()
    }

    /// Seeds plus everything that transitively depends on them
    pub fn transitive_dependents<'s, I>(&self, seeds: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'s str>,
    {
        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        for seed in seeds {
            if visited.insert(seed.to_string()) {
                queue.push_back(seed.to_string());
            }
        }

        while let Some(field) = queue.pop_front() {
            if let Some(deps) = self.dependents.get(&field) {
                for dep in deps {
                    if visited.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
        }
        visited
    }

    /// Depth-first search for back edges. Each cycle is reported as the path
    /// from the repeated field back to itself, e.g. `[a, b, a]`.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut fields: Vec<&String> = self.precedents.keys().collect();
        fields.sort();

        let mut done = BTreeSet::new();
        let mut cycles = Vec::new();
        for field in fields {
            let mut stack = Vec::new();
            self.visit(field, &mut stack, &mut done, &mut cycles);
        }
        cycles
    }

    fn visit<'g>(
        &'g self,
        field: &'g str,
        stack: &mut Vec<&'g str>,
        done: &mut BTreeSet<&'g str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        if let Some(pos) = stack.iter().position(|f| *f == field) {
            let mut cycle: Vec<String> = stack[pos..].iter().map(|f| f.to_string()).collect();
            cycle.push(field.to_string());
            cycles.push(cycle);
            return;
        }
        if done.contains(field) {
            return;
        }

        stack.push(field);
        if let Some(deps) = self.precedents.get(field) {
            for dep in deps {
                self.visit(dep, stack, done, cycles);
            }
        }
        stack.pop();
        done.insert(field);
    }

    /// Strongly connected components of `fields`, restricted to edges inside
    /// the set, ordered so every component follows the ones it depends on.
    pub fn components_in_order(&self, fields: &BTreeSet<String>) -> Vec<Vec<String>> {
        let mut graph = DiGraph::<&str, ()>::new();
        let mut node_indices = HashMap::new();

        for field in fields {
            let idx = graph.add_node(field.as_str());
            node_indices.insert(field.as_str(), idx);
        }

        for field in fields {
            if let Some(deps) = self.precedents.get(field) {
                for dep in deps {
                    if let Some(&dep_idx) = node_indices.get(dep.as_str()) {
                        graph.add_edge(dep_idx, node_indices[field.as_str()], ());
                    }
                }
            }
        }

        // tarjan_scc yields components in reverse topological order
        let mut components: Vec<Vec<String>> = tarjan_scc(&graph)
            .into_iter()
            .map(|component| {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|idx| graph[idx].to_string())
                    .collect();
                names.sort();
                names
            })
            .collect();
        components.reverse();
        components
    }

    /// Whether `component` (from `components_in_order`) is a cycle
    pub fn is_cyclic(&self, component: &[String]) -> bool {
        match component {
            [single] => self
                .precedents
                .get(single)
                .is_some_and(|deps| deps.contains(single)),
            _ => component.len() > 1,
        }
    }
}
