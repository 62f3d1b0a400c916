//! Swap candidate selection.
//!
//! A forward node is a candidate when one of its outputs is read by a
//! backward node that runs long after it: the rank gap between producer and
//! consumer exceeds the configured threshold. The first qualifying edge
//! decides; gaps are never aggregated across outputs or consumers.

use memswap_core::edge::DataEdge;
use memswap_core::graph::TrainingGraph;
use memswap_core::id::NodeId;

use crate::error::PassError;
use crate::topology::TopologyIndexer;

/// Returns the first outgoing data edge of `node` into the backward region
/// whose rank gap exceeds `threshold`, with that gap.
///
/// Backward nodes and swap nodes never qualify.
pub fn first_long_lived_edge(
    graph: &TrainingGraph,
    node: NodeId,
    threshold: usize,
    ranks: &mut TopologyIndexer,
) -> Result<Option<(DataEdge, usize)>, PassError> {
    let Some(n) = graph.node(node) else {
        return Ok(None);
    };
    if n.is_backward() || n.is_swap() {
        return Ok(None);
    }

    let mut own_rank = None;
    for edge in graph.data_out_edges(node) {
        let backward = graph
            .node(edge.target)
            .map_or(false, |dst| dst.is_backward());
        if !backward {
            continue;
        }
        let from = match own_rank {
            Some(rank) => rank,
            None => {
                let rank = ranks.rank_of(graph, node)?;
                own_rank = Some(rank);
                rank
            }
        };
        let gap = ranks.rank_of(graph, edge.target)?.saturating_sub(from);
        if gap > threshold {
            return Ok(Some((edge, gap)));
        }
    }
    Ok(None)
}

/// Returns `true` if `node` should get swap pairs inserted.
pub fn is_candidate(
    graph: &TrainingGraph,
    node: NodeId,
    threshold: usize,
    ranks: &mut TopologyIndexer,
) -> Result<bool, PassError> {
    let found = first_long_lived_edge(graph, node, threshold, ranks)?;
    if let Some((edge, gap)) = found {
        tracing::debug!(
            node = node.0,
            consumer = edge.target.0,
            gap,
            threshold,
            "swap candidate"
        );
    }
    Ok(found.is_some())
}
