//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph from the `depends` lists of all systems,
//! validates it and resolves dependencies-first orderings.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Control, DfsEvent, depth_first_search};

use crate::error::ManifestFault;

/// A validated, acyclic dependency graph of systems.
///
/// Edges point from a system to each of its dependencies, so the finish
/// order of a depth-first search yields dependencies first.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    order: Vec<String>,
}

impl DependencyGraph {
    /// Builds and validates the graph from `(name, depends)` pairs given in
    /// declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestFault::DependsNotDeclared`] for a dependency on an
    /// unknown system and [`ManifestFault::CircularDependency`] when the
    /// relation has a cycle.
    pub fn build<'a, I, D>(systems: I) -> Result<Self, ManifestFault>
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let systems: Vec<(&str, Vec<&str>)> = systems
            .into_iter()
            .map(|(name, depends)| (name, depends.into_iter().collect()))
            .collect();

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for (name, _) in &systems {
            let _ = index.insert((*name).to_string(), graph.add_node((*name).to_string()));
        }

        let mut this = Self {
            graph,
            index,
            order: Vec::new(),
        };
        this.validate(&systems)?;
        this.order = this.visit(this.graph.node_indices())?;
        tracing::debug!(order = ?this.order, "resolved dependency order");
        Ok(this)
    }

    fn validate(&mut self, systems: &[(&str, Vec<&str>)]) -> Result<(), ManifestFault> {
        for (name, depends) in systems {
            let from = self.index[*name];
            // petgraph yields neighbors newest first: add edges in reverse so
            // traversal follows the declared order.
            for depend in depends.iter().rev() {
                let to = self.index.get(*depend).copied().ok_or_else(|| {
                    ManifestFault::DependsNotDeclared {
                        system: (*name).to_string(),
                        depend: (*depend).to_string(),
                    }
                })?;
                let _ = self.graph.add_edge(from, to, ());
            }
        }
        Ok(())
    }

    /// Three-colour DFS from `roots`; a back edge is a cycle.
    fn visit(
        &self,
        roots: impl IntoIterator<Item = NodeIndex>,
    ) -> Result<Vec<String>, ManifestFault> {
        let mut finished = Vec::new();
        let outcome = depth_first_search(&self.graph, roots, |event| match event {
            DfsEvent::BackEdge(from, to) => Control::Break((from, to)),
            DfsEvent::Finish(node, _) => {
                finished.push(self.graph[node].clone());
                Control::Continue
            }
            _ => Control::Continue,
        });

        match outcome.break_value() {
            Some((from, to)) => Err(ManifestFault::CircularDependency {
                system1: self.graph[to].clone(),
                system2: self.graph[from].clone(),
            }),
            None => Ok(finished),
        }
    }

    /// All systems, dependencies before dependents, ties in declaration
    /// order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// The transitive dependency closure of `requested`, dependencies first.
    /// Requested systems are visited in the order given.
    ///
    /// Returns `Err(name)` with the first requested name that is not part
    /// of the graph.
    pub fn order_for<'a>(
        &self,
        requested: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<String>, String> {
        let roots = requested
            .into_iter()
            .map(|name| self.index.get(name).copied().ok_or_else(|| name.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        // The graph was checked for cycles at build time.
        Ok(self.visit(roots).unwrap_or_default())
    }
}
