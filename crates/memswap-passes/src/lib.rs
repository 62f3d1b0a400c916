//! Memory-swap rewrite passes for training graphs.
//!
//! Moves long-lived forward activations to host memory after they are
//! produced and back right before their late backward consumers.
//!
//! # Modules
//!
//! - [`topology`] -- Cached topological ranks per graph identity
//! - [`candidate`] -- Which forward nodes have long-lived outputs
//! - [`swap`] -- Swap-out / swap-in pair insertion and consumer rewiring
//! - [`ordering`] -- Control edges that schedule swap-outs early
//! - [`rule`] -- The rewrite-rule contract and pass context
//! - [`driver`] -- Sequential two-pass runner
//! - [`config`] -- Pass configuration

pub mod candidate;
pub mod config;
pub mod driver;
pub mod error;
pub mod ordering;
pub mod rule;
pub mod swap;
pub mod topology;

pub use config::MemorySwapConfig;
pub use driver::{run_memory_swap, run_rule, SwapReport};
pub use error::PassError;
pub use rule::{PassContext, RewriteEffect, RewriteRule};
