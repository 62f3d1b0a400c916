//! Sequential pass driver.
//!
//! [`run_memory_swap`] runs two passes over the graph:
//!
//! 1. [`MemorySwapRule`]: insert swap pairs after long-lived forward outputs.
//! 2. [`SwapOrderingRule`]: pin each swap-out ahead of its siblings.
//!
//! Each pass visits the nodes present when it starts, in node-index order,
//! and applies its rule at most once per node. Ranks are computed once at
//! the start of each pass and are not refreshed while it mutates the graph.
//! Nodes inserted by a pass are not visited by that same pass.

use serde::Serialize;

use memswap_core::graph::TrainingGraph;

use crate::config::MemorySwapConfig;
use crate::error::PassError;
use crate::ordering::SwapOrderingRule;
use crate::rule::{PassContext, RewriteEffect, RewriteRule};
use crate::swap::MemorySwapRule;

/// Counters collected over one [`run_memory_swap`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwapReport {
    /// Forward nodes that got at least one swap pair.
    pub nodes_swapped: usize,
    pub pairs_inserted: usize,
    /// Backward input slots now reading a swap-in output.
    pub consumers_redirected: usize,
    pub control_edges_added: usize,
    pub effect: RewriteEffect,
}

/// Applies `rule` once to every node present at the start of the pass.
///
/// Nodes removed during the pass are skipped. When the rule names target op
/// types, nodes of other types are skipped without evaluating the predicate.
pub fn run_rule(
    graph: &mut TrainingGraph,
    rule: &dyn RewriteRule,
    ctx: &mut PassContext,
) -> Result<RewriteEffect, PassError> {
    ctx.begin_pass(graph)?;

    let targets = rule.target_op_types();
    let mut effect = RewriteEffect::NONE;
    let mut applied = 0usize;

    for node in graph.node_ids() {
        let Some(n) = graph.node(node) else {
            continue;
        };
        if !targets.is_empty() && !targets.iter().any(|t| *t == n.op.op_type) {
            continue;
        }
        if !rule.satisfies(graph, node, ctx)? {
            continue;
        }
        let changed = rule.apply(graph, node, ctx)?;
        if !changed.is_none() {
            applied += 1;
        }
        effect = effect.merge(changed);
    }

    if effect.types_stale {
        tracing::debug!(rule = rule.name(), "graph needs a full resolve before execution");
    }
    tracing::debug!(
        rule = rule.name(),
        applied,
        topology_changed = effect.topology_changed,
        "pass finished"
    );
    Ok(effect)
}

/// Runs the swap-insertion pass, then the ordering pass.
pub fn run_memory_swap(
    graph: &mut TrainingGraph,
    config: &MemorySwapConfig,
) -> Result<SwapReport, PassError> {
    let mut ctx = PassContext::new(config.clone());

    let swap = MemorySwapRule::new(config.target_op_types.clone());
    let mut effect = run_rule(graph, &swap, &mut ctx)?;
    effect = effect.merge(run_rule(graph, &SwapOrderingRule, &mut ctx)?);

    ctx.report.effect = effect;
    tracing::info!(
        nodes_swapped = ctx.report.nodes_swapped,
        pairs_inserted = ctx.report.pairs_inserted,
        consumers_redirected = ctx.report.consumers_redirected,
        control_edges_added = ctx.report.control_edges_added,
        min_topo_distance = config.min_topo_distance,
        "memory swap finished"
    );
    Ok(ctx.report)
}
