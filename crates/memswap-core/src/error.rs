//! Core error types for memswap-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! the failure modes of the training graph data model.

use crate::id::{EdgeId, NodeId};
use crate::tensor::ElementType;
use thiserror::Error;

/// Core errors produced by the memswap-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node index was not found in the graph.
    #[error("node not found: NodeId({id})", id = id.0)]
    NodeNotFound { id: NodeId },

    /// An edge index was not found in the graph.
    #[error("edge not found: EdgeId({id})", id = id.0)]
    EdgeNotFound { id: EdgeId },

    /// A tensor name has no registered descriptor.
    #[error("tensor not found: '{name}'")]
    TensorNotFound { name: String },

    /// Attempting to register a tensor name that already exists.
    #[error("duplicate tensor name: '{name}'")]
    DuplicateTensor { name: String },

    /// Attempting to add a node whose name is already taken.
    #[error("duplicate node name: '{name}'")]
    DuplicateNode { name: String },

    /// A tensor is already produced by another node.
    #[error("tensor '{name}' already produced by NodeId({producer})", producer = producer.0)]
    DuplicateProducer { name: String, producer: NodeId },

    /// An input or output slot index is outside the node's slot list.
    #[error("slot {slot} out of range on NodeId({id}) ({len} slots)", id = node.0)]
    SlotOutOfRange { node: NodeId, slot: u16, len: usize },

    /// An edge failed validation.
    #[error("invalid edge: {reason}")]
    InvalidEdge { reason: String },

    /// A kernel's type constraint rejects the element type of an input.
    #[error("kernel {op} does not accept {ty:?} on input '{tensor}'")]
    UnsupportedElementType {
        op: String,
        tensor: String,
        ty: ElementType,
    },

    /// The data + control edges form a cycle, so no topological order exists.
    #[error("cycle detected: {ordered} of {total} nodes could be ordered")]
    CycleDetected { ordered: usize, total: usize },
}
