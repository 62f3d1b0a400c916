//! Graph nodes.
//!
//! A [`Node`] is the petgraph node weight: an operator plus its ordered
//! input and output tensor slots, the training [`Region`] it belongs to, and
//! the [`Placement`] tag that decides where it runs and where its tensors
//! reside.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ops::OpKind;

/// Which half of a training graph a node belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Region {
    /// Original model computation.
    #[default]
    Forward,
    /// Gradient computation.
    Backward,
}

/// Device / memory-tier assignment of a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Placement {
    /// Left to the placement layer.
    #[default]
    Unassigned,
    /// A named accelerator device, e.g. `"cuda:0"`.
    Device(String),
    /// Host memory: the slow, large tier.
    Host,
}

impl Placement {
    /// Returns `true` for the slow/large memory tier.
    pub fn is_slow_tier(&self) -> bool {
        matches!(self, Placement::Host)
    }
}

/// A node in the training graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique, human-readable name.
    pub name: String,
    pub op: OpKind,
    #[serde(default)]
    pub region: Region,
    /// Input tensor names, by slot.
    pub inputs: SmallVec<[String; 4]>,
    /// Output tensor names, by slot.
    pub outputs: SmallVec<[String; 2]>,
    #[serde(default)]
    pub placement: Placement,
}

impl Node {
    /// Creates a forward-region node with no slots and no placement.
    pub fn new(name: impl Into<String>, op: OpKind) -> Self {
        Node {
            name: name.into(),
            op,
            region: Region::Forward,
            inputs: SmallVec::new(),
            outputs: SmallVec::new(),
            placement: Placement::Unassigned,
        }
    }

    /// Sets the region.
    pub fn in_region(mut self, region: Region) -> Self {
        self.region = region;
        self
    }

    /// Sets the input tensor names.
    pub fn with_inputs<S: AsRef<str>>(mut self, inputs: &[S]) -> Self {
        self.inputs = inputs.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Sets the output tensor names.
    pub fn with_outputs<S: AsRef<str>>(mut self, outputs: &[S]) -> Self {
        self.outputs = outputs.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Sets the placement tag.
    pub fn placed_on(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// Returns `true` if this node computes gradients.
    pub fn is_backward(&self) -> bool {
        self.region == Region::Backward
    }

    /// Returns `true` if this node is half of a swap pair.
    pub fn is_swap(&self) -> bool {
        self.op.is_swap()
    }
}
