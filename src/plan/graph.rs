//! Dependency graph over plan steps.
//!
//! The graph stores both directions (dependencies and dependents) as
//! index-based adjacency lists; steps are referenced by index into one
//! owning slice, never by back-pointer.

use crate::error::{EngineError, EngineResult};
use crate::plan::Step;
use smol_str::SmolStr;
use std::collections::HashMap;

/// Dependency graph derived purely from a step list.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    ids: Vec<SmolStr>,
    costs: Vec<f64>,
    deps: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    roots: Vec<usize>,
    leaves: Vec<usize>,
}

impl DependencyGraph {
    /// Builds a graph from steps. Rejects duplicate ids and dependencies on
    /// unknown steps.
    pub fn build(steps: &[Step]) -> EngineResult<Self> {
        let mut index_of: HashMap<&str, usize> = HashMap::with_capacity(steps.len());
        for (index, step) in steps.iter().enumerate() {
            if index_of.insert(step.id.as_str(), index).is_some() {
                return Err(
                    EngineError::validation(format!("duplicate step id '{}'", step.id))
                        .with_context("step", &step.id),
                );
            }
        }

        let mut deps = vec![Vec::new(); steps.len()];
        let mut dependents = vec![Vec::new(); steps.len()];
        for (index, step) in steps.iter().enumerate() {
            for dep_id in &step.dependencies {
                let Some(&dep_index) = index_of.get(dep_id.as_str()) else {
                    return Err(EngineError::validation(format!(
                        "step '{}' depends on unknown step '{dep_id}'",
                        step.id
                    ))
                    .with_context("step", &step.id));
                };
                deps[index].push(dep_index);
                dependents[dep_index].push(index);
            }
        }

        let roots = (0..steps.len())
            .filter(|&index| deps[index].is_empty())
            .collect();
        let leaves = (0..steps.len())
            .filter(|&index| dependents[index].is_empty())
            .collect();

        Ok(Self {
            ids: steps.iter().map(|step| step.id.clone()).collect(),
            costs: steps.iter().map(|step| step.estimated_cost).collect(),
            deps,
            dependents,
            roots,
            leaves,
        })
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Root step ids (no dependencies).
    pub fn roots(&self) -> Vec<SmolStr> {
        self.roots.iter().map(|&i| self.ids[i].clone()).collect()
    }

    /// Leaf step ids (no dependents).
    pub fn leaves(&self) -> Vec<SmolStr> {
        self.leaves.iter().map(|&i| self.ids[i].clone()).collect()
    }

    /// Depth-first topological sort. Fails on a cycle, naming a step on it.
    pub fn topological_order(&self) -> EngineResult<Vec<SmolStr>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        fn visit(
            node: usize,
            graph: &DependencyGraph,
            marks: &mut [Mark],
            order: &mut Vec<usize>,
        ) -> EngineResult<()> {
            match marks[node] {
                Mark::Done => return Ok(()),
                Mark::Visiting => {
                    return Err(EngineError::validation(format!(
                        "dependency cycle through step '{}'",
                        graph.ids[node]
                    ))
                    .with_context("step", &graph.ids[node]));
                }
                Mark::Unvisited => {}
            }
            marks[node] = Mark::Visiting;
            for &dep in &graph.deps[node] {
                visit(dep, graph, marks, order)?;
            }
            marks[node] = Mark::Done;
            order.push(node);
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut order = Vec::with_capacity(self.len());
        for node in 0..self.len() {
            visit(node, self, &mut marks, &mut order)?;
        }
        Ok(order.into_iter().map(|i| self.ids[i].clone()).collect())
    }

    /// Level-by-level breadth-first grouping: a step lands in level k+1 when
    /// all of its dependencies sit at level k or earlier. Only levels with
    /// more than one step are reported.
    pub fn parallel_groups(&self) -> Vec<Vec<SmolStr>> {
        let mut level = vec![usize::MAX; self.len()];
        let mut frontier: Vec<usize> = self.roots.clone();
        let mut current = 0usize;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &node in &frontier {
                level[node] = current;
            }
            for &node in &frontier {
                for &dependent in &self.dependents[node] {
                    if level[dependent] != usize::MAX {
                        continue;
                    }
                    let ready = self.deps[dependent]
                        .iter()
                        .all(|&dep| level[dep] != usize::MAX && level[dep] <= current);
                    if ready && !next.contains(&dependent) {
                        next.push(dependent);
                    }
                }
            }
            frontier = next;
            current += 1;
        }

        let mut groups: Vec<Vec<SmolStr>> = Vec::new();
        for wave in 0..current {
            let members: Vec<SmolStr> = (0..self.len())
                .filter(|&node| level[node] == wave)
                .map(|node| self.ids[node].clone())
                .collect();
            if members.len() > 1 {
                groups.push(members);
            }
        }
        groups
    }

    /// Longest cost-weighted chain, computed by memoized DFS from leaves.
    /// Returns the path (root to leaf) and its accumulated cost.
    pub fn critical_path(&self) -> (Vec<SmolStr>, f64) {
        // best[i] = (cost of heaviest chain ending at i, predecessor on it)
        let mut best: Vec<Option<(f64, Option<usize>)>> = vec![None; self.len()];

        fn chain_cost(
            node: usize,
            graph: &DependencyGraph,
            best: &mut Vec<Option<(f64, Option<usize>)>>,
        ) -> f64 {
            if let Some((cost, _)) = best[node] {
                return cost;
            }
            let mut max_dep = 0.0f64;
            let mut predecessor = None;
            for &dep in &graph.deps[node] {
                let cost = chain_cost(dep, graph, best);
                if cost > max_dep {
                    max_dep = cost;
                    predecessor = Some(dep);
                }
            }
            let total = max_dep + graph.costs[node];
            best[node] = Some((total, predecessor));
            total
        }

        let mut end = None;
        let mut end_cost = 0.0f64;
        for node in 0..self.len() {
            let cost = chain_cost(node, self, &mut best);
            if cost > end_cost || end.is_none() {
                end_cost = cost;
                end = Some(node);
            }
        }

        let mut path = Vec::new();
        let mut cursor = end;
        while let Some(node) = cursor {
            path.push(self.ids[node].clone());
            cursor = best[node].and_then(|(_, predecessor)| predecessor);
        }
        path.reverse();
        (path, if self.is_empty() { 0.0 } else { end_cost })
    }

    /// Estimated wall time under unconstrained parallelism: each node starts
    /// when its slowest dependency finishes.
    pub fn parallel_execution_time(&self) -> f64 {
        let mut finish: Vec<Option<f64>> = vec![None; self.len()];

        fn finish_time(
            node: usize,
            graph: &DependencyGraph,
            finish: &mut Vec<Option<f64>>,
        ) -> f64 {
            if let Some(time) = finish[node] {
                return time;
            }
            let start = graph.deps[node]
                .iter()
                .map(|&dep| finish_time(dep, graph, finish))
                .fold(0.0f64, f64::max);
            let time = start + graph.costs[node];
            finish[node] = Some(time);
            time
        }

        (0..self.len())
            .map(|node| finish_time(node, self, &mut finish))
            .fold(0.0, f64::max)
    }
}
