//! Pass error types.

use memswap_core::error::CoreError;
use memswap_core::id::NodeId;

/// Errors that abort a memory-swap run.
///
/// There is no partial recovery: any error abandons the whole optimization
/// step.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// A graph operation failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A node has no rank in the current topological ordering.
    #[error("no topological rank for NodeId({})", node.0)]
    RankUnavailable { node: NodeId },

    /// An output slot names a tensor without a descriptor.
    #[error("output slot {slot} of '{node}' names tensor '{tensor}' with no descriptor")]
    MissingDescriptor {
        node: String,
        slot: u16,
        tensor: String,
    },

    /// A configuration value could not be parsed.
    #[error("invalid configuration value for {key}: '{value}'")]
    InvalidConfig { key: String, value: String },
}
