//! The rewrite-rule contract and the per-invocation pass context.
//!
//! A [`RewriteRule`] is a (predicate, mutation) pair applied node by node.
//! The driver calls [`RewriteRule::satisfies`] first and
//! [`RewriteRule::apply`] only when it returns `true`.
//!
//! # Effects
//!
//! [`RewriteEffect`] reports two orthogonal facts about an applied rewrite:
//!
//! - `topology_changed`: nodes or edges were added or removed, so cached
//!   structural analyses (ranks, orderings) are out of date.
//! - `types_stale`: shape/type information may be stale and the graph needs
//!   a full resolve before execution.
//!
//! A full resolve may rebuild edges from tensor names and drop control-only
//! edges, so rules that insert control edges report `topology_changed`
//! without `types_stale`.

use serde::Serialize;

use memswap_core::graph::TrainingGraph;
use memswap_core::id::NodeId;

use crate::config::MemorySwapConfig;
use crate::driver::SwapReport;
use crate::error::PassError;
use crate::topology::TopologyIndexer;

/// What an applied rewrite changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RewriteEffect {
    pub topology_changed: bool,
    pub types_stale: bool,
}

impl RewriteEffect {
    /// Nothing changed.
    pub const NONE: RewriteEffect = RewriteEffect {
        topology_changed: false,
        types_stale: false,
    };

    /// Data-flow topology changed; types remain valid.
    pub const TOPOLOGY_CHANGED: RewriteEffect = RewriteEffect {
        topology_changed: true,
        types_stale: false,
    };

    /// Union of two effects.
    pub fn merge(self, other: RewriteEffect) -> RewriteEffect {
        RewriteEffect {
            topology_changed: self.topology_changed || other.topology_changed,
            types_stale: self.types_stale || other.types_stale,
        }
    }

    /// Returns `true` if nothing changed.
    pub fn is_none(&self) -> bool {
        !self.topology_changed && !self.types_stale
    }
}

/// State owned by one optimization run over one graph.
///
/// Threaded by `&mut` into every predicate and mutation. Never shared
/// between runs or graphs.
#[derive(Debug)]
pub struct PassContext {
    pub config: MemorySwapConfig,
    pub ranks: TopologyIndexer,
    pub report: SwapReport,
}

impl PassContext {
    pub fn new(config: MemorySwapConfig) -> Self {
        PassContext {
            config,
            ranks: TopologyIndexer::new(),
            report: SwapReport::default(),
        }
    }

    /// Recomputes ranks for `graph`. Called before every pass.
    pub fn begin_pass(&mut self, graph: &TrainingGraph) -> Result<(), PassError> {
        self.ranks.invalidate();
        self.ranks.recompute(graph)
    }
}

/// A graph rewrite applied node by node by a driver.
pub trait RewriteRule {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Op types this rule looks at. Empty means every node.
    fn target_op_types(&self) -> &[String] {
        &[]
    }

    /// Returns `true` if [`apply`](Self::apply) should run on `node`.
    fn satisfies(
        &self,
        graph: &TrainingGraph,
        node: NodeId,
        ctx: &mut PassContext,
    ) -> Result<bool, PassError>;

    /// Rewrites the graph around `node`.
    fn apply(
        &self,
        graph: &mut TrainingGraph,
        node: NodeId,
        ctx: &mut PassContext,
    ) -> Result<RewriteEffect, PassError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_a_union() {
        let stale = RewriteEffect {
            topology_changed: false,
            types_stale: true,
        };
        let merged = RewriteEffect::TOPOLOGY_CHANGED.merge(stale);
        assert!(merged.topology_changed);
        assert!(merged.types_stale);
        assert_eq!(RewriteEffect::NONE.merge(RewriteEffect::NONE), RewriteEffect::NONE);
    }

    #[test]
    fn topology_change_does_not_imply_stale_types() {
        assert!(!RewriteEffect::TOPOLOGY_CHANGED.types_stale);
        assert!(!RewriteEffect::TOPOLOGY_CHANGED.is_none());
        assert!(RewriteEffect::default().is_none());
    }

    #[test]
    fn begin_pass_recomputes_every_time() {
        let graph = TrainingGraph::new();
        let mut ctx = PassContext::new(MemorySwapConfig::default());
        ctx.begin_pass(&graph).unwrap();
        ctx.begin_pass(&graph).unwrap();
        assert_eq!(ctx.ranks.computations(), 2);
    }
}
