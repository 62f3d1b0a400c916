//! Swap-out / swap-in pair insertion.
//!
//! For every output slot of a selected node that has backward consumers,
//! [`apply_swap`] inserts
//!
//! ```text
//! node --slot i--> swap-out (forward, host) --> swap-in (backward, host) --> backward consumers
//!      \--slot i--> forward consumers (untouched)
//! ```
//!
//! Both synthetic nodes run the identity [`SwapToHost`](memswap_core::ops::SWAP_TO_HOST)
//! operator pinned to host placement; the placement layer does the actual
//! tier movement. The rewrite is planned in full before the first mutation,
//! so a missing descriptor leaves the graph untouched.
//!
//! Nothing here prevents a second application on the same node from adding
//! a redundant pair. The driver applies a rule at most once per node per
//! pass, and [`crate::candidate`] rejects a node once its backward edges
//! are gone.

use memswap_core::edge::DataEdge;
use memswap_core::error::CoreError;
use memswap_core::graph::TrainingGraph;
use memswap_core::id::NodeId;
use memswap_core::node::{Node, Placement, Region};
use memswap_core::ops::OpKind;
use memswap_core::tensor::TensorDesc;

use crate::candidate::is_candidate;
use crate::error::PassError;
use crate::rule::{PassContext, RewriteEffect, RewriteRule};

/// Name prefix for swap-out nodes and their output tensors.
pub const SWAP_OUT_NAME_BASE: &str = "memswap_out_";

/// Name prefix for swap-in nodes and their output tensors.
pub const SWAP_IN_NAME_BASE: &str = "memswap_in_";

/// One inserted swap pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPair {
    pub producer: NodeId,
    pub slot: u16,
    pub swap_out: NodeId,
    pub swap_in: NodeId,
    /// Backward consumer edges now reading from `swap_in`.
    pub redirected: usize,
}

/// Planned rewrite of one output slot.
struct SlotPlan {
    slot: u16,
    /// Tensor name bound to the slot, as consumers refer to it.
    tensor: String,
    desc: TensorDesc,
    backward_edges: Vec<DataEdge>,
}

/// Inserts a swap pair for each output slot of `node` read by the backward
/// region, and redirects those backward reads to the swap-in output.
///
/// Edges from the slot to forward consumers are left alone. Slots without
/// backward consumers get no pair.
pub fn apply_swap(graph: &mut TrainingGraph, node: NodeId) -> Result<Vec<SwapPair>, PassError> {
    let plans = plan_slots(graph, node)?;

    let mut pairs = Vec::with_capacity(plans.len());
    for plan in plans {
        pairs.push(insert_pair(graph, node, plan)?);
    }
    Ok(pairs)
}

fn plan_slots(graph: &TrainingGraph, node: NodeId) -> Result<Vec<SlotPlan>, PassError> {
    let n = graph
        .node(node)
        .ok_or(CoreError::NodeNotFound { id: node })?;
    let out_edges = graph.data_out_edges(node);

    let mut plans = Vec::new();
    for (slot, tensor) in n.outputs.iter().enumerate() {
        let slot = slot as u16;
        let backward_edges: Vec<DataEdge> = out_edges
            .iter()
            .filter(|e| e.source_port == slot)
            .filter(|e| graph.node(e.target).map_or(false, |dst| dst.is_backward()))
            .copied()
            .collect();
        if backward_edges.is_empty() {
            continue;
        }
        let desc = graph
            .tensor(tensor)
            .cloned()
            .ok_or_else(|| PassError::MissingDescriptor {
                node: n.name.clone(),
                slot,
                tensor: tensor.clone(),
            })?;
        plans.push(SlotPlan {
            slot,
            tensor: tensor.clone(),
            desc,
            backward_edges,
        });
    }
    Ok(plans)
}

fn insert_pair(
    graph: &mut TrainingGraph,
    producer: NodeId,
    plan: SlotPlan,
) -> Result<SwapPair, PassError> {
    let out_name = graph.generate_name(SWAP_OUT_NAME_BASE);
    let in_name = graph.generate_name(SWAP_IN_NAME_BASE);
    graph.add_tensor(plan.desc.renamed(out_name.as_str()))?;
    graph.add_tensor(plan.desc.renamed(in_name.as_str()))?;

    // add_node wires producer -> swap-out and swap-out -> swap-in.
    let swap_out = graph.add_node(
        Node::new(out_name.as_str(), OpKind::swap_to_host())
            .in_region(Region::Forward)
            .with_inputs(&[plan.tensor.as_str()])
            .with_outputs(&[out_name.as_str()])
            .placed_on(Placement::Host),
    )?;
    let swap_in = graph.add_node(
        Node::new(in_name.as_str(), OpKind::swap_to_host())
            .in_region(Region::Backward)
            .with_inputs(&[out_name.as_str()])
            .with_outputs(&[in_name.as_str()])
            .placed_on(Placement::Host),
    )?;

    for edge in &plan.backward_edges {
        graph.remove_edge(edge.id)?;
        graph.rebind_input(edge.target, edge.target_port, &in_name)?;
        graph.add_data_edge(swap_in, 0, edge.target, edge.target_port)?;
    }

    tracing::debug!(
        producer = producer.0,
        slot = plan.slot,
        tensor = %plan.tensor,
        swap_out = swap_out.0,
        swap_in = swap_in.0,
        redirected = plan.backward_edges.len(),
        "inserted swap pair"
    );

    Ok(SwapPair {
        producer,
        slot: plan.slot,
        swap_out,
        swap_in,
        redirected: plan.backward_edges.len(),
    })
}

/// Pass 1: swap long-lived forward outputs to host memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySwapRule {
    target_op_types: Vec<String>,
}

impl MemorySwapRule {
    pub fn new(target_op_types: Vec<String>) -> Self {
        MemorySwapRule { target_op_types }
    }
}

impl RewriteRule for MemorySwapRule {
    fn name(&self) -> &str {
        "MemorySwap"
    }

    fn target_op_types(&self) -> &[String] {
        &self.target_op_types
    }

    fn satisfies(
        &self,
        graph: &TrainingGraph,
        node: NodeId,
        ctx: &mut PassContext,
    ) -> Result<bool, PassError> {
        is_candidate(graph, node, ctx.config.min_topo_distance, &mut ctx.ranks)
    }

    fn apply(
        &self,
        graph: &mut TrainingGraph,
        node: NodeId,
        ctx: &mut PassContext,
    ) -> Result<RewriteEffect, PassError> {
        let pairs = apply_swap(graph, node)?;
        if pairs.is_empty() {
            return Ok(RewriteEffect::NONE);
        }
        ctx.report.nodes_swapped += 1;
        ctx.report.pairs_inserted += pairs.len();
        ctx.report.consumers_redirected += pairs.iter().map(|p| p.redirected).sum::<usize>();
        Ok(RewriteEffect::TOPOLOGY_CHANGED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memswap_core::tensor::{Dim, ElementType};

    /// `split` (forward) has two outputs:
    /// - `a` read by forward `use_a` and backward `grad` (twice)
    /// - `b` read by forward `use_b` only
    struct Fixture {
        graph: TrainingGraph,
        split: NodeId,
        use_a: NodeId,
        use_b: NodeId,
        grad: NodeId,
    }

    fn fixture() -> Fixture {
        let mut graph = TrainingGraph::new();
        let mut a = TensorDesc::new("a", ElementType::BFloat16, &[4]);
        a.shape.push(Dim::Symbolic("seq".into()));
        graph.add_tensor(a).unwrap();
        for t in ["b", "ua", "ub", "g"] {
            graph
                .add_tensor(TensorDesc::new(t, ElementType::Float32, &[4]))
                .unwrap();
        }
        let split = graph
            .add_node(Node::new("split", OpKind::new("Split")).with_outputs(&["a", "b"]))
            .unwrap();
        let use_a = graph
            .add_node(
                Node::new("use_a", OpKind::new("Relu"))
                    .with_inputs(&["a"])
                    .with_outputs(&["ua"]),
            )
            .unwrap();
        let use_b = graph
            .add_node(
                Node::new("use_b", OpKind::new("Relu"))
                    .with_inputs(&["b"])
                    .with_outputs(&["ub"]),
            )
            .unwrap();
        let grad = graph
            .add_node(
                Node::new("grad", OpKind::new("MulGrad"))
                    .in_region(Region::Backward)
                    .with_inputs(&["a", "ua", "a"])
                    .with_outputs(&["g"]),
            )
            .unwrap();
        Fixture {
            graph,
            split,
            use_a,
            use_b,
            grad,
        }
    }

    #[test]
    fn pair_inserted_only_for_slot_with_backward_reads() {
        let Fixture {
            mut graph,
            split,
            use_a,
            use_b,
            grad,
        } = fixture();
        let nodes_before = graph.node_count();

        let pairs = apply_swap(&mut graph, split).unwrap();
        assert_eq!(pairs.len(), 1);
        let pair = &pairs[0];
        assert_eq!(pair.slot, 0);
        assert_eq!(pair.redirected, 2);
        assert_eq!(graph.node_count(), nodes_before + 2);

        // split now feeds use_a, use_b and swap-out; nothing backward.
        let targets: Vec<NodeId> = graph.data_out_edges(split).iter().map(|e| e.target).collect();
        assert!(targets.contains(&use_a));
        assert!(targets.contains(&use_b));
        assert!(targets.contains(&pair.swap_out));
        assert!(!targets.contains(&grad));

        // Both grad reads of `a` now come from swap-in.
        let grad_in = graph.data_in_edges(grad);
        let from_swap: Vec<u16> = grad_in
            .iter()
            .filter(|e| e.source == pair.swap_in)
            .map(|e| e.target_port)
            .collect();
        assert_eq!(from_swap, vec![0, 2]);
        let grad_node = graph.node(grad).unwrap();
        let in_tensor = &graph.node(pair.swap_in).unwrap().outputs[0];
        assert_eq!(&grad_node.inputs[0], in_tensor);
        assert_eq!(&grad_node.inputs[2], in_tensor);
        assert_eq!(grad_node.inputs[1], "ua");
    }

    #[test]
    fn swap_nodes_are_tagged_and_chained() {
        let Fixture {
            mut graph, split, ..
        } = fixture();
        let pair = apply_swap(&mut graph, split).unwrap().remove(0);

        let out = graph.node(pair.swap_out).unwrap();
        let inn = graph.node(pair.swap_in).unwrap();
        assert!(out.is_swap() && inn.is_swap());
        assert_eq!(out.region, Region::Forward);
        assert_eq!(inn.region, Region::Backward);
        assert_eq!(out.placement, Placement::Host);
        assert_eq!(inn.placement, Placement::Host);
        assert!(out.name.starts_with(SWAP_OUT_NAME_BASE));
        assert!(inn.name.starts_with(SWAP_IN_NAME_BASE));

        assert_eq!(out.inputs[0], "a");
        assert_eq!(inn.inputs[0], out.outputs[0]);
        let chain = graph.data_out_edges(pair.swap_out);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].target, pair.swap_in);
    }

    #[test]
    fn relocated_tensors_copy_type_and_shape() {
        let Fixture {
            mut graph, split, ..
        } = fixture();
        let pair = apply_swap(&mut graph, split).unwrap().remove(0);
        let original = graph.tensor("a").unwrap().clone();

        for node in [pair.swap_out, pair.swap_in] {
            let name = &graph.node(node).unwrap().outputs[0];
            let desc = graph.tensor(name).unwrap();
            assert_ne!(desc.name, original.name);
            assert_eq!(desc.elem_type, original.elem_type);
            assert_eq!(desc.shape, original.shape);
        }
    }

    #[test]
    fn missing_descriptor_leaves_graph_untouched() {
        let Fixture {
            graph, split, ..
        } = fixture();
        // Rebuild the graph without the descriptor of `a`.
        let tensors = graph
            .tensors()
            .filter(|t| t.name != "a")
            .map(|t| (t.name.clone(), t.clone()))
            .collect();
        let mut broken = TrainingGraph::from_parts(graph.petgraph().clone(), tensors);
        let (nodes, edges) = (broken.node_count(), broken.edge_count());

        match apply_swap(&mut broken, split) {
            Err(PassError::MissingDescriptor { tensor, slot, .. }) => {
                assert_eq!(tensor, "a");
                assert_eq!(slot, 0);
            }
            other => panic!("expected MissingDescriptor, got {:?}", other),
        }
        assert_eq!(broken.node_count(), nodes);
        assert_eq!(broken.edge_count(), edges);
    }

    #[test]
    fn every_backward_read_slot_gets_its_own_pair_in_slot_order() {
        let mut graph = TrainingGraph::new();
        for t in ["a", "b", "q_out", "r_out"] {
            graph
                .add_tensor(TensorDesc::new(t, ElementType::Float32, &[4]))
                .unwrap();
        }
        let p = graph
            .add_node(Node::new("p", OpKind::new("Split")).with_outputs(&["a", "b"]))
            .unwrap();
        let q = graph
            .add_node(
                Node::new("q", OpKind::new("Grad"))
                    .in_region(Region::Backward)
                    .with_inputs(&["b", "a", "b"])
                    .with_outputs(&["q_out"]),
            )
            .unwrap();
        let r = graph
            .add_node(
                Node::new("r", OpKind::new("Grad"))
                    .in_region(Region::Backward)
                    .with_inputs(&["a"])
                    .with_outputs(&["r_out"]),
            )
            .unwrap();

        let pairs = apply_swap(&mut graph, p).unwrap();
        let slots: Vec<(u16, usize)> = pairs.iter().map(|p| (p.slot, p.redirected)).collect();
        assert_eq!(slots, vec![(0, 2), (1, 2)]);

        let swap_in_out = |pair: &SwapPair| graph.node(pair.swap_in).unwrap().outputs[0].clone();
        let (in_a, in_b) = (swap_in_out(&pairs[0]), swap_in_out(&pairs[1]));
        assert_ne!(in_a, in_b);
        assert_eq!(graph.node(pairs[0].swap_out).unwrap().inputs[0], "a");
        assert_eq!(graph.node(pairs[1].swap_out).unwrap().inputs[0], "b");

        let q_inputs: Vec<String> = graph.node(q).unwrap().inputs.to_vec();
        assert_eq!(q_inputs, vec![in_b.clone(), in_a.clone(), in_b]);
        assert_eq!(graph.node(r).unwrap().inputs.to_vec(), vec![in_a]);

        for id in graph.node_ids() {
            let n = graph.node(id).unwrap();
            assert_eq!(graph.data_in_edges(id).len(), n.inputs.len(), "{}", n.name);
        }
        assert!(graph.topological_order().is_ok());
    }

    #[test]
    fn swap_out_reads_slot_tensor_even_if_descriptor_name_differs() {
        let Fixture {
            graph, split, grad, ..
        } = fixture();
        // Table key `a` holds a descriptor named `a_saved`.
        let tensors = graph
            .tensors()
            .map(|t| {
                let desc = if t.name == "a" {
                    t.renamed("a_saved")
                } else {
                    t.clone()
                };
                (t.name.clone(), desc)
            })
            .collect();
        let mut loaded = TrainingGraph::from_parts(graph.petgraph().clone(), tensors);

        let pairs = apply_swap(&mut loaded, split).unwrap();
        assert_eq!(pairs.len(), 1);
        let out = loaded.node(pairs[0].swap_out).unwrap();
        assert_eq!(out.inputs[0], "a");
        assert!(loaded.has_edge(split, pairs[0].swap_out));
        assert!(loaded.has_edge(pairs[0].swap_in, grad));
    }

    #[test]
    fn forward_only_node_gets_no_pairs() {
        let Fixture {
            mut graph, use_b, ..
        } = fixture();
        let before = (graph.node_count(), graph.edge_count());
        assert!(apply_swap(&mut graph, use_b).unwrap().is_empty());
        assert_eq!((graph.node_count(), graph.edge_count()), before);
    }

    #[test]
    fn second_application_is_a_no_op_once_backward_reads_are_gone() {
        let Fixture {
            mut graph, split, ..
        } = fixture();
        apply_swap(&mut graph, split).unwrap();
        let before = graph.node_count();
        assert!(apply_swap(&mut graph, split).unwrap().is_empty());
        assert_eq!(graph.node_count(), before);
    }
}
