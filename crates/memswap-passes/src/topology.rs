//! Topological ranks, cached per graph identity.
//!
//! A rank is a node's position in one topological ordering of the whole
//! graph (data and control edges). Callers only ever compare rank
//! differences, so two computations need not agree on absolute values.
//!
//! The cache is keyed on [`GraphId`], not on content. It is owned by one
//! pass invocation (see [`crate::rule::PassContext`]) and refreshed
//! explicitly at the start of every pass, never mid-pass. Mutations made
//! during a pass are visible through [`TopologyIndexer::is_stale`].

use std::collections::HashMap;

use memswap_core::graph::TrainingGraph;
use memswap_core::id::{GraphId, NodeId};

use crate::error::PassError;

#[derive(Debug)]
struct RankSnapshot {
    graph: GraphId,
    revision: u64,
    ranks: HashMap<NodeId, usize>,
}

/// Computes and caches node ranks for one graph at a time.
#[derive(Debug, Default)]
pub struct TopologyIndexer {
    snapshot: Option<RankSnapshot>,
    computations: usize,
}

impl TopologyIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rank of `node` in `graph`.
    ///
    /// Recomputes when nothing is cached, when the cache belongs to a
    /// different graph, or when `node` was added after the cached ordering.
    /// The lazy path serves standalone callers such as `memswap inspect`.
    /// Inside [`run_rule`](crate::driver::run_rule) every queried node is
    /// already ranked by the eager recompute at pass start, so a pass never
    /// recomputes midway.
    pub fn rank_of(&mut self, graph: &TrainingGraph, node: NodeId) -> Result<usize, PassError> {
        let hit = self
            .snapshot
            .as_ref()
            .filter(|s| s.graph == graph.id())
            .and_then(|s| s.ranks.get(&node).copied());
        if let Some(rank) = hit {
            return Ok(rank);
        }

        self.recompute(graph)?;
        self.snapshot
            .as_ref()
            .and_then(|s| s.ranks.get(&node).copied())
            .ok_or(PassError::RankUnavailable { node })
    }

    /// Recomputes ranks for every node of `graph` in O(V + E).
    pub fn recompute(&mut self, graph: &TrainingGraph) -> Result<(), PassError> {
        let order = graph.topological_order()?;
        let ranks = order
            .into_iter()
            .enumerate()
            .map(|(rank, node)| (node, rank))
            .collect();
        self.snapshot = Some(RankSnapshot {
            graph: graph.id(),
            revision: graph.revision(),
            ranks,
        });
        self.computations += 1;
        tracing::debug!(graph = %graph.id(), revision = graph.revision(), "recomputed topological ranks");
        Ok(())
    }

    /// Drops the cached ordering.
    pub fn invalidate(&mut self) {
        self.snapshot = None;
    }

    /// Returns `true` unless the cache matches both the identity and the
    /// current revision of `graph`.
    pub fn is_stale(&self, graph: &TrainingGraph) -> bool {
        match &self.snapshot {
            Some(s) => s.graph != graph.id() || s.revision != graph.revision(),
            None => true,
        }
    }

    /// Number of full recomputations performed so far.
    pub fn computations(&self) -> usize {
        self.computations
    }
}
