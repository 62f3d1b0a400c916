//! Pass configuration.
//!
//! The only tuning knob of the swap decision is the minimum topological
//! distance between a forward producer and a backward consumer. Larger
//! values swap only very long-lived tensors.

use serde::{Deserialize, Serialize};

use crate::error::PassError;

/// Environment variable overriding [`MemorySwapConfig::min_topo_distance`].
pub const ENV_MIN_TOPO_DISTANCE: &str = "MEMSWAP_MIN_TOPO_DISTANCE";

/// Environment variable overriding [`MemorySwapConfig::target_op_types`],
/// comma-separated.
pub const ENV_TARGET_OPS: &str = "MEMSWAP_TARGET_OPS";

/// Options controlling the memory-swap passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySwapConfig {
    /// A forward output is swapped when some backward consumer is more than
    /// this many ranks after its producer.
    pub min_topo_distance: usize,

    /// Op types eligible as swap origins. Empty means every op type.
    pub target_op_types: Vec<String>,
}

impl Default for MemorySwapConfig {
    fn default() -> Self {
        MemorySwapConfig {
            min_topo_distance: 10,
            target_op_types: Vec::new(),
        }
    }
}

impl MemorySwapConfig {
    /// Defaults overlaid with the `MEMSWAP_*` environment variables.
    pub fn from_env() -> Result<Self, PassError> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlays values returned by `lookup` for the `MEMSWAP_*` keys.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self, PassError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MIN_TOPO_DISTANCE) {
            self.min_topo_distance = raw.trim().parse().map_err(|_| PassError::InvalidConfig {
                key: ENV_MIN_TOPO_DISTANCE.to_string(),
                value: raw.clone(),
            })?;
        }
        if let Some(raw) = lookup(ENV_TARGET_OPS) {
            self.target_op_types = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(self)
    }

    /// Returns `true` if nodes of `op_type` may be swap origins.
    pub fn targets(&self, op_type: &str) -> bool {
        self.target_op_types.is_empty() || self.target_op_types.iter().any(|t| t == op_type)
    }
}
