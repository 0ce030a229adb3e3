//! Dependency structure over stages.
//!
//! Stages are wired with explicit `add_dependency(successor, predecessor)`
//! calls (or an adjacency list) and validated once in `build()`, which loads
//! them into a `petgraph` digraph: unknown ids,
//! duplicate stages, self-dependencies and cycles are all rejected there.
//! A built graph is immutable and carries its topological layers; stages in
//! the same layer have no dependency path between them.

use crate::error::{PipelineError, Result};
use crate::stage::Stage;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct PipelineGraphBuilder {
    stages: Vec<Arc<dyn Stage>>,
    edges: Vec<(String, String)>,
}

impl PipelineGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    /// `successor` runs only after `predecessor` has succeeded
    pub fn add_dependency(&mut self, successor: &str, predecessor: &str) -> &mut Self {
        self.edges
            .push((successor.to_string(), predecessor.to_string()));
        self
    }

    /// Wire stages in the given order, each depending on the one before
    pub fn chain(&mut self, ids: &[&str]) -> &mut Self {
        for pair in ids.windows(2) {
            self.add_dependency(pair[1], pair[0]);
        }
        self
    }

    pub fn build(self) -> Result<PipelineGraph> {
        // Node weights are positions in `stages`, so NodeIndex::new(i) is stage i
        let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(self.stages.len(), self.edges.len());
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for (i, stage) in self.stages.iter().enumerate() {
            let node = graph.add_node(i);
            if index.insert(stage.stage_id(), node).is_some() {
                return Err(PipelineError::Graph(format!(
                    "stage '{}' declared twice",
                    stage.stage_id()
                )));
            }
        }

        let lookup = |id: &str| {
            index
                .get(id)
                .copied()
                .ok_or_else(|| PipelineError::Graph(format!("unknown stage '{id}'")))
        };

        for (succ, pred) in &self.edges {
            let s = lookup(succ)?;
            let p = lookup(pred)?;
            if s == p {
                return Err(PipelineError::Graph(format!(
                    "stage '{succ}' cannot depend on itself"
                )));
            }
            graph.update_edge(p, s, ());
        }

        let order = toposort(&graph, None).map_err(|_| {
            let mut names: Vec<&str> = tarjan_scc(&graph)
                .into_iter()
                .filter(|component| component.len() > 1)
                .flatten()
                .map(|n| self.stages[graph[n]].stage_id())
                .collect();
            names.sort_unstable();
            PipelineError::Graph(format!("dependency cycle among: {}", names.join(", ")))
        })?;

        let predecessors: Vec<Vec<usize>> = graph
            .node_indices()
            .map(|n| {
                let mut preds: Vec<usize> = graph
                    .neighbors_directed(n, Direction::Incoming)
                    .map(|p| graph[p])
                    .collect();
                preds.sort_unstable();
                preds
            })
            .collect();

        let layers = layers_from_order(&graph, &order);

        Ok(PipelineGraph {
            stages: self.stages,
            predecessors,
            layers,
        })
    }
}

/// Groups a topological order by depth: a stage sits one layer below its
/// deepest predecessor. Within a layer stages keep their declaration order.
fn layers_from_order(graph: &DiGraph<usize, ()>, order: &[NodeIndex]) -> Vec<Vec<usize>> {
    let mut depth = vec![0usize; graph.node_count()];
    for &n in order {
        let d = graph
            .neighbors_directed(n, Direction::Incoming)
            .map(|p| depth[p.index()] + 1)
            .max()
            .unwrap_or(0);
        depth[n.index()] = d;
    }

    let mut layers: Vec<Vec<usize>> = Vec::new();
    for n in graph.node_indices() {
        let d = depth[n.index()];
        if layers.len() <= d {
            layers.resize_with(d + 1, Vec::new);
        }
        layers[d].push(graph[n]);
    }
    layers
}

pub struct PipelineGraph {
    stages: Vec<Arc<dyn Stage>>,
    predecessors: Vec<Vec<usize>>,
    layers: Vec<Vec<usize>>,
}

impl PipelineGraph {
    pub fn builder() -> PipelineGraphBuilder {
        PipelineGraphBuilder::new()
    }

    /// Declarative construction: each entry names a stage and the stages it
    /// depends on. Every stage must appear in `stages`.
    pub fn from_adjacency(
        stages: Vec<Arc<dyn Stage>>,
        adjacency: &[(&str, &[&str])],
    ) -> Result<Self> {
        let mut builder = PipelineGraphBuilder::new();
        for stage in stages {
            builder.add_stage(stage);
        }
        for (successor, preds) in adjacency {
            for pred in preds.iter() {
                builder.add_dependency(successor, pred);
            }
        }
        builder.build()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub(crate) fn stage(&self, index: usize) -> &Arc<dyn Stage> {
        &self.stages[index]
    }

    pub(crate) fn predecessor_indices(&self, index: usize) -> &[usize] {
        &self.predecessors[index]
    }

    pub(crate) fn layer_indices(&self) -> &[Vec<usize>] {
        &self.layers
    }

    /// Stage ids grouped by execution layer
    pub fn layers(&self) -> Vec<Vec<&str>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|&i| self.stages[i].stage_id()).collect())
            .collect()
    }

    /// A flattened topological order
    pub fn execution_order(&self) -> Vec<&str> {
        self.layers.iter().flatten().map(|&i| self.stages[i].stage_id()).collect()
    }

    pub fn predecessors(&self, stage_id: &str) -> Option<Vec<&str>> {
        let i = self.stages.iter().position(|s| s.stage_id() == stage_id)?;
        Some(
            self.predecessors[i]
                .iter()
                .map(|&p| self.stages[p].stage_id())
                .collect(),
        )
    }
}
