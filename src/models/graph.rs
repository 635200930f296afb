//! Graph algorithms for task dependency analysis.
//!
//! This module provides an index-based dependency graph used by diagnostics
//! (cycle detection and transitive reachability) together with the adjacency
//! maps embedded in every snapshot.
//!
//! All walks use an explicit stack. Each node is expanded at most once per
//! walk, so termination does not depend on the graph being acyclic.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::{Message, Task};

/// Directed dependency graph over a fixed task set.
///
/// Nodes are addressed by index into an arena. An edge `a -> b` means task `a`
/// depends on task `b`. Dependencies on ids outside the task set are not nodes.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    /// Node index -> task id
    ids: Vec<String>,

    /// Task id -> node index
    index: HashMap<String, usize>,

    /// Outgoing edges per node, in dependency order
    edges: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build a graph from `(task_id, dependency_ids)` pairs.
    ///
    /// Later duplicates of a task id are ignored. Dangling dependency ids are
    /// dropped from the edge lists; callers that need them keep the raw lists.
    pub fn new<'a, I, D>(tasks: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, D)>,
        D: IntoIterator<Item = &'a str>,
    {
        let mut ids = Vec::new();
        let mut index = HashMap::new();
        let mut raw_edges: Vec<Vec<&'a str>> = Vec::new();

        for (id, deps) in tasks {
            if index.contains_key(id) {
                continue;
            }
            index.insert(id.to_string(), ids.len());
            ids.push(id.to_string());
            raw_edges.push(deps.into_iter().collect());
        }

        let edges = raw_edges
            .into_iter()
            .map(|deps| {
                let mut out: Vec<usize> = Vec::with_capacity(deps.len());
                for dep in deps {
                    if let Some(&target) = index.get(dep) {
                        if !out.contains(&target) {
                            out.push(target);
                        }
                    }
                }
                out
            })
            .collect();

        Self { ids, index, edges }
    }

    /// Build a graph from denormalized tasks.
    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self::new(
            tasks
                .iter()
                .map(|t| (t.id.as_str(), t.dependency_ids.iter().map(String::as_str))),
        )
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn id(&self, node: usize) -> &str {
        &self.ids[node]
    }

    /// Find dependency cycles.
    ///
    /// Runs a depth-first search from every not-yet-visited node in insertion
    /// order, tracking which nodes are on the active path. The first edge back
    /// into the active path ends that search and yields the cycle as
    /// `[start, ..., start]`. Cycles over the same node set are reported once.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = vec![false; self.len()];
        let mut on_path = vec![false; self.len()];
        let mut seen: HashSet<Vec<usize>> = HashSet::new();
        let mut cycles = Vec::new();

        for root in 0..self.len() {
            if visited[root] {
                continue;
            }
            if let Some(cycle) = self.first_cycle_from(root, &mut visited, &mut on_path) {
                let mut key = cycle.clone();
                key.sort_unstable();
                key.dedup();
                if seen.insert(key) {
                    cycles.push(cycle.into_iter().map(|n| self.ids[n].clone()).collect());
                }
            }
        }

        cycles
    }

    fn first_cycle_from(
        &self,
        root: usize,
        visited: &mut [bool],
        on_path: &mut [bool],
    ) -> Option<Vec<usize>> {
        // Parallel stacks: the active path and the next edge to try at each depth
        let mut path = vec![root];
        let mut cursor = vec![0usize];
        visited[root] = true;
        on_path[root] = true;

        let mut found = None;
        while let Some(&node) = path.last() {
            let depth = path.len() - 1;
            match self.edges[node].get(cursor[depth]) {
                Some(&next) => {
                    cursor[depth] += 1;
                    if on_path[next] {
                        if let Some(start) = path.iter().position(|&n| n == next) {
                            let mut cycle = path[start..].to_vec();
                            cycle.push(next);
                            found = Some(cycle);
                        }
                        break;
                    }
                    if !visited[next] {
                        visited[next] = true;
                        on_path[next] = true;
                        path.push(next);
                        cursor.push(0);
                    }
                }
                None => {
                    on_path[node] = false;
                    path.pop();
                    cursor.pop();
                }
            }
        }

        for node in path {
            on_path[node] = false;
        }
        found
    }

    /// Nodes reachable from `start` by following one or more edges.
    ///
    /// `start` itself is only included when it lies on a cycle.
    pub fn reachable_from(&self, start: usize) -> HashSet<usize> {
        let mut reached = HashSet::new();
        let mut expanded = vec![false; self.len()];
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if expanded[node] {
                continue;
            }
            expanded[node] = true;
            for &next in &self.edges[node] {
                reached.insert(next);
                stack.push(next);
            }
        }

        reached
    }

    /// Direct dependencies of `node` that are also reachable through another path.
    ///
    /// Returned in the node's dependency order.
    pub fn redundant_dependencies(&self, node: usize) -> Vec<usize> {
        let direct = &self.edges[node];
        let mut transitive = HashSet::new();
        for &dep in direct {
            transitive.extend(self.reachable_from(dep));
        }
        direct
            .iter()
            .copied()
            .filter(|dep| transitive.contains(dep))
            .collect()
    }
}

/// Task id -> dependency ids for every task in the set.
///
/// Dependency ids are not validated; dangling references are kept.
pub fn dependency_graph(tasks: &[Task]) -> BTreeMap<String, Vec<String>> {
    tasks
        .iter()
        .map(|t| (t.id.clone(), t.dependency_ids.clone()))
        .collect()
}

/// Sender id -> distinct recipient ids observed across messages.
pub fn communication_graph(messages: &[Message]) -> BTreeMap<String, Vec<String>> {
    let mut graph: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for message in messages {
        graph
            .entry(message.from_agent_id.clone())
            .or_default()
            .insert(message.to_agent_id.clone());
    }
    graph
        .into_iter()
        .map(|(from, to)| (from, to.into_iter().collect()))
        .collect()
}
