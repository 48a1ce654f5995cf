//! Build-order resolution
//!
//! Projects form a directed graph where an edge `A -> B` means A must build
//! before B. The order is a Kahn topological sort whose ready queue prefers
//! library-producing projects, then earlier discovery order, so the output
//! is deterministic for identical input.

use crate::manifest::{KindFamily, ProjectDescriptor};
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use thiserror::Error;
use tracing::{debug, warn};

/// Explicit dependencies form a cycle
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Dependency cycle among projects: {}", .ids.iter().cloned().collect::<Vec<_>>().join(", "))]
pub struct CycleError {
    pub ids: BTreeSet<String>,
}

/// A reference that did not resolve to any project in the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingDependency {
    pub project: String,
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct BuildGraph {
    nodes: Vec<ProjectDescriptor>,
    index: HashMap<String, usize>,
    predecessors: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
    dangling: Vec<DanglingDependency>,
}

impl BuildGraph {
    /// Builds the graph over every project
    pub fn new(projects: Vec<ProjectDescriptor>) -> Self {
        Self::restricted(projects, None)
    }

    /// Builds the graph over the projects of one kind family only
    pub fn restricted(projects: Vec<ProjectDescriptor>, family: Option<KindFamily>) -> Self {
        let mut nodes: Vec<ProjectDescriptor> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for project in projects {
            if family.map_or(false, |f| project.kind.family() != f) {
                continue;
            }
            if index.contains_key(&project.id) {
                warn!(project = %project.id, "Duplicate project id, keeping the first one");
                continue;
            }
            index.insert(project.id.clone(), nodes.len());
            nodes.push(project);
        }

        let mut predecessors = vec![Vec::new(); nodes.len()];
        let mut successors = vec![Vec::new(); nodes.len()];
        let mut dangling = Vec::new();

        for (to, node) in nodes.iter().enumerate() {
            for dep in &node.explicit_deps {
                match index.get(dep) {
                    Some(&from) if from == to => {
                        debug!(project = %node.id, "Ignoring self-reference");
                    }
                    Some(&from) => {
                        predecessors[to].push(from);
                        successors[from].push(to);
                    }
                    None => {
                        warn!(project = %node.id, reference = %dep, "Dropping dangling project reference");
                        dangling.push(DanglingDependency {
                            project: node.id.clone(),
                            reference: dep.clone(),
                        });
                    }
                }
            }
        }

        Self {
            nodes,
            index,
            predecessors,
            successors,
            dangling,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn project(&self, id: &str) -> Option<&ProjectDescriptor> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn dangling(&self) -> &[DanglingDependency] {
        &self.dangling
    }

    /// Ids of the projects that must be terminal before `id` may start
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| {
                self.predecessors[i]
                    .iter()
                    .map(|&p| self.nodes[p].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of the projects that directly depend on `id`
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.index
            .get(id)
            .map(|&i| {
                self.successors[i]
                    .iter()
                    .map(|&s| self.nodes[s].id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stable topological order with libraries first among ready projects
    pub fn build_order(&self) -> Result<Vec<&ProjectDescriptor>, CycleError> {
        let mut remaining: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready = BinaryHeap::new();
        for (i, &count) in remaining.iter().enumerate() {
            if count == 0 {
                ready.push(Reverse(self.priority(i)));
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, _, i))) = ready.pop() {
            order.push(&self.nodes[i]);
            for &next in &self.successors[i] {
                remaining[next] -= 1;
                if remaining[next] == 0 {
                    ready.push(Reverse(self.priority(next)));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let ids = self.cyclic_ids();
            warn!(projects = ?ids, "Dependency cycle detected");
            return Err(CycleError { ids });
        }

        Ok(order)
    }

    /// Owned variant of [`BuildGraph::build_order`]
    pub fn resolve(&self) -> Result<Vec<ProjectDescriptor>, CycleError> {
        Ok(self.build_order()?.into_iter().cloned().collect())
    }

    /// Ready-queue key: libraries first, then discovery order, then position
    fn priority(&self, i: usize) -> (bool, usize, usize) {
        let node = &self.nodes[i];
        (!node.produces_library, node.discovery_index, i)
    }

    /// Projects on some cycle (strongly connected components larger than one)
    fn cyclic_ids(&self) -> BTreeSet<String> {
        let mut tarjan = Tarjan::new(self.nodes.len());
        for v in 0..self.nodes.len() {
            if tarjan.index[v].is_none() {
                tarjan.visit(v, &self.successors);
            }
        }

        tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1)
            .flatten()
            .map(|i| self.nodes[i].id.clone())
            .collect()
    }
}

struct Tarjan {
    next: usize,
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan {
    fn new(n: usize) -> Self {
        Self {
            next: 0,
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, v: usize, successors: &[Vec<usize>]) {
        self.index[v] = Some(self.next);
        self.lowlink[v] = self.next;
        self.next += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        for &w in &successors[v] {
            match self.index[w] {
                None => {
                    self.visit(w, successors);
                    self.lowlink[v] = self.lowlink[v].min(self.lowlink[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.lowlink[v] = self.lowlink[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlink[v]) == self.index[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Resolves a build order for `projects`, optionally limited to one family
pub fn resolve_order(
    projects: &[ProjectDescriptor],
    family: Option<KindFamily>,
) -> Result<Vec<ProjectDescriptor>, CycleError> {
    BuildGraph::restricted(projects.to_vec(), family).resolve()
}
