//! Scheduling constraints for swap-out nodes.
//!
//! A swap-out should start as soon as its tensor exists, not whenever the
//! scheduler gets around to it. [`add_ordering`] pins a forward node ahead
//! of its earliest *sibling*: another consumer of a tensor the node itself
//! reads. Only control edges are added; no data dependency changes.

use indexmap::IndexSet;
use petgraph::algo::has_path_connecting;

use memswap_core::graph::TrainingGraph;
use memswap_core::id::NodeId;

use crate::error::PassError;
use crate::rule::{PassContext, RewriteEffect, RewriteRule};
use crate::topology::TopologyIndexer;

/// Distinct consumers, other than `node`, of every tensor `node` reads
/// from a producer. Ordered by first encounter.
pub fn siblings(graph: &TrainingGraph, node: NodeId) -> IndexSet<NodeId> {
    let mut found = IndexSet::new();
    for input in graph.data_in_edges(node) {
        for edge in graph.data_out_edges(input.source) {
            if edge.source_port == input.source_port && edge.target != node {
                found.insert(edge.target);
            }
        }
    }
    found
}

/// The node with the smallest rank; the first one wins a tie.
pub fn earliest<I>(ranked: I) -> Option<NodeId>
where
    I: IntoIterator<Item = (NodeId, usize)>,
{
    let mut best: Option<(NodeId, usize)> = None;
    for (node, rank) in ranked {
        if best.map_or(true, |(_, r)| rank < r) {
            best = Some((node, rank));
        }
    }
    best.map(|(node, _)| node)
}

/// Adds a control edge from forward node `node` to its earliest sibling.
///
/// Returns `false` without touching the graph when `node` is backward, has
/// no siblings, is already connected to that sibling, or when the sibling
/// already depends on `node` transitively in the other direction (the edge
/// would close a cycle).
pub fn add_ordering(
    graph: &mut TrainingGraph,
    node: NodeId,
    ranks: &mut TopologyIndexer,
) -> Result<bool, PassError> {
    match graph.node(node) {
        Some(n) if !n.is_backward() => {}
        _ => return Ok(false),
    }

    let mut ranked = Vec::new();
    for sibling in siblings(graph, node) {
        ranked.push((sibling, ranks.rank_of(graph, sibling)?));
    }
    let Some(target) = earliest(ranked) else {
        return Ok(false);
    };

    if graph.has_edge(node, target) {
        return Ok(false);
    }
    if has_path_connecting(graph.petgraph(), target.into(), node.into(), None) {
        tracing::debug!(node = node.0, sibling = target.0, "ordering edge would close a cycle");
        return Ok(false);
    }

    graph.add_control_edge(node, target)?;
    tracing::debug!(node = node.0, sibling = target.0, "added ordering edge");
    Ok(true)
}

/// Pass 2: schedule every forward swap-out ahead of its siblings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SwapOrderingRule;

impl RewriteRule for SwapOrderingRule {
    fn name(&self) -> &str {
        "MemorySwapOrdering"
    }

    fn satisfies(
        &self,
        graph: &TrainingGraph,
        node: NodeId,
        _ctx: &mut PassContext,
    ) -> Result<bool, PassError> {
        Ok(graph
            .node(node)
            .map_or(false, |n| n.is_swap() && !n.is_backward()))
    }

    fn apply(
        &self,
        graph: &mut TrainingGraph,
        node: NodeId,
        ctx: &mut PassContext,
    ) -> Result<RewriteEffect, PassError> {
        if add_ordering(graph, node, &mut ctx.ranks)? {
            ctx.report.control_edges_added += 1;
            Ok(RewriteEffect::TOPOLOGY_CHANGED)
        } else {
            Ok(RewriteEffect::NONE)
        }
    }
}
