//! Edge types for the training graph.
//!
//! [`FlowEdge`] is the petgraph edge weight: either a data edge carrying one
//! tensor from an output slot to an input slot, or a control edge that only
//! orders execution. [`DataEdge`] is a detached snapshot of one data edge,
//! used by rewrites that must collect edges before mutating the graph.

use serde::{Deserialize, Serialize};

use crate::id::{EdgeId, NodeId};

/// Edge types in the training graph.
///
/// Both kinds constrain execution order. Only data edges carry a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowEdge {
    /// Tensor dependency. The target reads the tensor in the source's
    /// `source_port` output slot through its `target_port` input slot.
    Data {
        /// Which output slot of the source node.
        source_port: u16,
        /// Which input slot of the target node.
        target_port: u16,
    },

    /// Ordering-only dependency. Target must not execute before source.
    Control,
}

impl FlowEdge {
    /// Returns `true` if this is a data edge.
    pub fn is_data(&self) -> bool {
        matches!(self, FlowEdge::Data { .. })
    }

    /// Returns `true` if this is a control edge.
    pub fn is_control(&self) -> bool {
        matches!(self, FlowEdge::Control)
    }

    /// Returns `(source_port, target_port)` for data edges.
    pub fn ports(&self) -> Option<(u16, u16)> {
        match self {
            FlowEdge::Data {
                source_port,
                target_port,
            } => Some((*source_port, *target_port)),
            FlowEdge::Control => None,
        }
    }
}

/// Snapshot of a data edge, detached from the graph's borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub source_port: u16,
    pub target: NodeId,
    pub target_port: u16,
}
