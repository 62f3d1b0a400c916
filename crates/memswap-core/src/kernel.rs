//! Runtime operator declarations.
//!
//! The execution layer looks up a [`KernelDef`] for every node by its
//! `(domain, op_type)`. A kernel declares which element types it accepts,
//! which outputs alias which inputs, and where it runs by default.
//!
//! The swap operator is an identity: its output buffer aliases its input.
//! Moving data between memory tiers is done entirely by the placement layer
//! honoring the node's [`Placement`], never by the kernel itself.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::graph::TrainingGraph;
use crate::id::NodeId;
use crate::node::Placement;
use crate::ops::{OpKind, PRIVATE_DOMAIN, SWAP_TO_HOST};
use crate::tensor::ElementType;

/// Declaration of one runtime kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelDef {
    pub op: OpKind,
    pub since_version: u32,
    /// Element types accepted on every input.
    pub type_constraint: Vec<ElementType>,
    /// `(input slot, output slot)` pairs sharing one buffer.
    pub aliases: Vec<(usize, usize)>,
    pub placement: Placement,
}

impl KernelDef {
    /// The identity kernel behind swap-out and swap-in nodes.
    pub fn swap_to_host() -> Self {
        KernelDef {
            op: OpKind::with_domain(PRIVATE_DOMAIN, SWAP_TO_HOST),
            since_version: 1,
            type_constraint: ElementType::ALL.to_vec(),
            aliases: vec![(0, 0)],
            placement: Placement::Host,
        }
    }

    /// Returns `true` if the kernel accepts `ty` on its inputs.
    pub fn accepts(&self, ty: ElementType) -> bool {
        self.type_constraint.contains(&ty)
    }
}

/// Kernel lookup table keyed by operator.
#[derive(Debug, Clone, Default)]
pub struct KernelRegistry {
    kernels: HashMap<OpKind, KernelDef>,
}

impl KernelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the kernels this crate synthesizes nodes for.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(KernelDef::swap_to_host());
        registry
    }

    /// Registers a kernel, replacing any previous one for the same operator.
    pub fn register(&mut self, def: KernelDef) -> Option<KernelDef> {
        self.kernels.insert(def.op.clone(), def)
    }

    /// Looks up the kernel for an operator.
    pub fn lookup(&self, op: &OpKind) -> Option<&KernelDef> {
        self.kernels.get(op)
    }

    /// Resolves the kernel for `node` and checks its input element types.
    ///
    /// Returns `Ok(None)` when no kernel is registered for the node's op.
    pub fn resolve(
        &self,
        graph: &TrainingGraph,
        node: NodeId,
    ) -> Result<Option<&KernelDef>, CoreError> {
        let n = graph.node(node).ok_or(CoreError::NodeNotFound { id: node })?;
        let Some(def) = self.lookup(&n.op) else {
            return Ok(None);
        };
        for input in &n.inputs {
            let desc = graph
                .tensor(input)
                .ok_or_else(|| CoreError::TensorNotFound {
                    name: input.clone(),
                })?;
            if !def.accepts(desc.elem_type) {
                return Err(CoreError::UnsupportedElementType {
                    op: def.op.to_string(),
                    tensor: input.clone(),
                    ty: desc.elem_type,
                });
            }
        }
        Ok(Some(def))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::tensor::TensorDesc;

    #[test]
    fn swap_kernel_accepts_every_type_and_aliases() {
        let def = KernelDef::swap_to_host();
        for &ty in ElementType::ALL {
            assert!(def.accepts(ty), "{:?} rejected", ty);
        }
        assert_eq!(def.aliases, vec![(0, 0)]);
        assert!(def.placement.is_slow_tier());
    }

    #[test]
    fn resolve_finds_swap_kernel_for_string_tensor() {
        let mut graph = TrainingGraph::new();
        graph
            .add_tensor(TensorDesc::new("tokens", ElementType::String, &[4]))
            .unwrap();
        graph
            .add_tensor(TensorDesc::new("tokens_out", ElementType::String, &[4]))
            .unwrap();
        let swap = graph
            .add_node(
                Node::new("memswap_out_0", OpKind::swap_to_host())
                    .with_inputs(&["tokens"])
                    .with_outputs(&["tokens_out"]),
            )
            .unwrap();

        let registry = KernelRegistry::with_builtins();
        let def = registry.resolve(&graph, swap).unwrap().unwrap();
        assert_eq!(def.op, OpKind::swap_to_host());
    }

    #[test]
    fn resolve_reports_rejected_element_type() {
        let mut registry = KernelRegistry::new();
        registry.register(KernelDef {
            op: OpKind::new("Relu"),
            since_version: 1,
            type_constraint: vec![ElementType::Float32],
            aliases: vec![],
            placement: Placement::Unassigned,
        });

        let mut graph = TrainingGraph::new();
        graph
            .add_tensor(TensorDesc::new("x", ElementType::Int64, &[2]))
            .unwrap();
        graph
            .add_tensor(TensorDesc::new("y", ElementType::Int64, &[2]))
            .unwrap();
        let relu = graph
            .add_node(
                Node::new("relu", OpKind::new("Relu"))
                    .with_inputs(&["x"])
                    .with_outputs(&["y"]),
            )
            .unwrap();

        match registry.resolve(&graph, relu) {
            Err(CoreError::UnsupportedElementType { op, tensor, ty }) => {
                assert_eq!(op, "Relu");
                assert_eq!(tensor, "x");
                assert_eq!(ty, ElementType::Int64);
            }
            other => panic!("expected UnsupportedElementType, got {:?}", other),
        }
    }

    #[test]
    fn resolve_unregistered_op_is_none() {
        let mut graph = TrainingGraph::new();
        let n = graph.add_node(Node::new("noop", OpKind::new("NoOp"))).unwrap();
        assert!(KernelRegistry::with_builtins()
            .resolve(&graph, n)
            .unwrap()
            .is_none());
    }
}
