//! Operator identity for graph nodes.
//!
//! An [`OpKind`] is an `(domain, op_type)` pair. Ordinary model operators
//! live in the default (empty) domain; operators synthesized by graph
//! rewrites live in [`PRIVATE_DOMAIN`] so they can never collide with a
//! model's own operators.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Domain of ordinary model operators.
pub const DEFAULT_DOMAIN: &str = "";

/// Private domain for rewrite-synthesized operators.
pub const PRIVATE_DOMAIN: &str = "memswap.private";

/// Op type of the tier-relocation operator used by swap-out and swap-in nodes.
pub const SWAP_TO_HOST: &str = "SwapToHost";

/// The operator a node performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpKind {
    #[serde(default)]
    pub domain: String,
    pub op_type: String,
}

impl OpKind {
    /// An operator in the default domain.
    pub fn new(op_type: impl Into<String>) -> Self {
        OpKind {
            domain: DEFAULT_DOMAIN.to_string(),
            op_type: op_type.into(),
        }
    }

    /// An operator in an explicit domain.
    pub fn with_domain(domain: impl Into<String>, op_type: impl Into<String>) -> Self {
        OpKind {
            domain: domain.into(),
            op_type: op_type.into(),
        }
    }

    /// The operator realizing both halves of a swap pair.
    pub fn swap_to_host() -> Self {
        OpKind::with_domain(PRIVATE_DOMAIN, SWAP_TO_HOST)
    }

    /// Returns `true` for the swap relocation operator.
    pub fn is_swap(&self) -> bool {
        self.domain == PRIVATE_DOMAIN && self.op_type == SWAP_TO_HOST
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.domain.is_empty() {
            write!(f, "{}", self.op_type)
        } else {
            write!(f, "{}::{}", self.domain, self.op_type)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_op_is_private() {
        let op = OpKind::swap_to_host();
        assert!(op.is_swap());
        assert_eq!(op.domain, PRIVATE_DOMAIN);
        assert_eq!(op.to_string(), "memswap.private::SwapToHost");
    }

    #[test]
    fn same_name_in_default_domain_is_not_swap() {
        let op = OpKind::new(SWAP_TO_HOST);
        assert!(!op.is_swap());
        assert_eq!(op.to_string(), "SwapToHost");
    }

    #[test]
    fn domain_defaults_when_absent_in_json() {
        let op: OpKind = serde_json::from_str(r#"{"op_type":"MatMul"}"#).unwrap();
        assert_eq!(op, OpKind::new("MatMul"));
    }
}
