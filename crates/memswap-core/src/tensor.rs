//! Tensor descriptors.
//!
//! A [`TensorDesc`] names one value in the graph and records its element
//! type and shape. Rewrites that relocate a tensor clone the descriptor
//! under a new name without touching type or shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Tensor element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float16,
    BFloat16,
    Float32,
    Float64,
    String,
}

impl ElementType {
    /// Every element type, in declaration order.
    pub const ALL: &'static [ElementType] = &[
        ElementType::Bool,
        ElementType::Int8,
        ElementType::Int16,
        ElementType::Int32,
        ElementType::Int64,
        ElementType::Uint8,
        ElementType::Uint16,
        ElementType::Uint32,
        ElementType::Uint64,
        ElementType::Float16,
        ElementType::BFloat16,
        ElementType::Float32,
        ElementType::Float64,
        ElementType::String,
    ];
}

/// One tensor dimension: a fixed extent or a symbolic name bound at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    Fixed(i64),
    Symbolic(String),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Symbolic(s) => write!(f, "{}", s),
        }
    }
}

/// Name, element type and shape of a tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorDesc {
    pub name: String,
    pub elem_type: ElementType,
    pub shape: SmallVec<[Dim; 4]>,
}

impl TensorDesc {
    /// Creates a descriptor with a fully fixed shape.
    pub fn new(name: impl Into<String>, elem_type: ElementType, dims: &[i64]) -> Self {
        TensorDesc {
            name: name.into(),
            elem_type,
            shape: dims.iter().map(|&d| Dim::Fixed(d)).collect(),
        }
    }

    /// Returns a copy of this descriptor under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        TensorDesc {
            name: name.into(),
            elem_type: self.elem_type,
            shape: self.shape.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renamed_keeps_type_and_shape() {
        let mut desc = TensorDesc::new("act", ElementType::Float16, &[8, 128]);
        desc.shape.push(Dim::Symbolic("seq".into()));

        let moved = desc.renamed("act_out");
        assert_eq!(moved.name, "act_out");
        assert_eq!(moved.elem_type, ElementType::Float16);
        assert_eq!(moved.shape, desc.shape);
        assert_eq!(moved.shape.len(), 3);
    }

    #[test]
    fn all_lists_each_type_once() {
        let unique: std::collections::HashSet<_> = ElementType::ALL.iter().collect();
        assert_eq!(unique.len(), ElementType::ALL.len());
        assert!(ElementType::ALL.contains(&ElementType::String));
    }

    #[test]
    fn dim_display() {
        assert_eq!(Dim::Fixed(4).to_string(), "4");
        assert_eq!(Dim::Symbolic("batch".into()).to_string(), "batch");
    }
}
