//! TrainingGraph: the mutable dataflow graph rewritten by memory passes.
//!
//! [`TrainingGraph`] wraps a petgraph `StableGraph<Node, FlowEdge>` together
//! with the tensor table that the nodes' slots refer to by name. Node and
//! edge indices stay valid across removals, so rewrites can hold on to
//! [`NodeId`]s while they mutate the graph.
//!
//! # Identity and revisions
//!
//! Every graph object carries a [`GraphId`] minted at construction; clones
//! and deserialized copies get a new one. Independently, `revision` counts
//! structural mutations. Analyses cached against a graph can compare either
//! to decide whether they are still valid.
//!
//! # Wiring
//!
//! Data edges mirror tensor names: an edge `(a, i) -> (b, j)` is only valid
//! when `a.outputs[i] == b.inputs[j]`. [`TrainingGraph::add_node`] wires the
//! edges for a new node's inputs from their existing producers.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::{Deserialize, Serialize};

use crate::edge::{DataEdge, FlowEdge};
use crate::error::CoreError;
use crate::id::{EdgeId, GraphId, NodeId};
use crate::node::Node;
use crate::tensor::TensorDesc;

/// The training dataflow graph.
#[derive(Debug, Serialize, Deserialize)]
#[serde(from = "GraphParts")]
pub struct TrainingGraph {
    #[serde(skip)]
    id: GraphId,
    #[serde(skip)]
    revision: u64,
    graph: StableGraph<Node, FlowEdge, Directed, u32>,
    tensors: IndexMap<String, TensorDesc>,
    /// Tensor name -> (producing node, output slot). Derived from `graph`.
    #[serde(skip)]
    producers: HashMap<String, (NodeId, u16)>,
    /// Derived from `graph`.
    #[serde(skip)]
    node_names: HashSet<String>,
    #[serde(skip)]
    next_name_id: u32,
}

/// Serialized form of a [`TrainingGraph`]; derived tables are rebuilt on load.
#[derive(Deserialize)]
struct GraphParts {
    graph: StableGraph<Node, FlowEdge, Directed, u32>,
    tensors: IndexMap<String, TensorDesc>,
}

impl From<GraphParts> for TrainingGraph {
    fn from(parts: GraphParts) -> Self {
        TrainingGraph::from_parts(parts.graph, parts.tensors)
    }
}

impl Clone for TrainingGraph {
    /// Clones the structure under a fresh [`GraphId`].
    fn clone(&self) -> Self {
        TrainingGraph {
            id: GraphId::fresh(),
            revision: self.revision,
            graph: self.graph.clone(),
            tensors: self.tensors.clone(),
            producers: self.producers.clone(),
            node_names: self.node_names.clone(),
            next_name_id: self.next_name_id,
        }
    }
}

impl Default for TrainingGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TrainingGraph {
    /// Creates an empty graph with a fresh identity.
    pub fn new() -> Self {
        TrainingGraph {
            id: GraphId::fresh(),
            revision: 0,
            graph: StableGraph::new(),
            tensors: IndexMap::new(),
            producers: HashMap::new(),
            node_names: HashSet::new(),
            next_name_id: 0,
        }
    }

    /// Constructs a graph from stored parts, rebuilding the producer and
    /// name tables from the node weights.
    pub fn from_parts(
        graph: StableGraph<Node, FlowEdge, Directed, u32>,
        tensors: IndexMap<String, TensorDesc>,
    ) -> Self {
        let mut producers = HashMap::new();
        let mut node_names = HashSet::new();
        for idx in graph.node_indices() {
            let node = &graph[idx];
            node_names.insert(node.name.clone());
            for (slot, out) in node.outputs.iter().enumerate() {
                producers.insert(out.clone(), (NodeId::from(idx), slot as u16));
            }
        }
        TrainingGraph {
            id: GraphId::fresh(),
            revision: 0,
            graph,
            tensors,
            producers,
            node_names,
            next_name_id: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Identity and read-only accessors
    // -----------------------------------------------------------------------

    /// Identity of this graph object.
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Number of structural mutations applied since construction.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Read-only view of the underlying petgraph.
    pub fn petgraph(&self) -> &StableGraph<Node, FlowEdge, Directed, u32> {
        &self.graph
    }

    /// Looks up a node by ID.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node_weight(NodeIndex::from(id))
    }

    /// Returns all node IDs in index order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_indices().map(NodeId::from).collect()
    }

    /// Finds a node by name.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].name == name)
            .map(NodeId::from)
    }

    /// Looks up a tensor descriptor by name.
    pub fn tensor(&self, name: &str) -> Option<&TensorDesc> {
        self.tensors.get(name)
    }

    /// Iterates tensor descriptors in registration order.
    pub fn tensors(&self) -> impl Iterator<Item = &TensorDesc> {
        self.tensors.values()
    }

    /// Returns the node and output slot producing `tensor`, if any.
    pub fn producer_of(&self, tensor: &str) -> Option<(NodeId, u16)> {
        self.producers.get(tensor).copied()
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges of both kinds.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns the number of control edges.
    pub fn control_edge_count(&self) -> usize {
        self.graph
            .edge_indices()
            .filter(|&e| self.graph[e].is_control())
            .count()
    }

    // -----------------------------------------------------------------------
    // Tensor and node methods
    // -----------------------------------------------------------------------

    /// Registers a tensor descriptor.
    pub fn add_tensor(&mut self, desc: TensorDesc) -> Result<(), CoreError> {
        if self.tensors.contains_key(&desc.name) {
            return Err(CoreError::DuplicateTensor { name: desc.name });
        }
        self.tensors.insert(desc.name.clone(), desc);
        Ok(())
    }

    /// Adds a node and wires data edges from the producers of its inputs.
    ///
    /// All input and output tensors must be registered. Each output must not
    /// already have a producer. Inputs without a producer are graph inputs
    /// and get no edge.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, CoreError> {
        if self.node_names.contains(&node.name) {
            return Err(CoreError::DuplicateNode { name: node.name });
        }
        for name in node.inputs.iter().chain(node.outputs.iter()) {
            if !self.tensors.contains_key(name) {
                return Err(CoreError::TensorNotFound { name: name.clone() });
            }
        }
        for out in &node.outputs {
            if let Some(&(producer, _)) = self.producers.get(out) {
                return Err(CoreError::DuplicateProducer {
                    name: out.clone(),
                    producer,
                });
            }
        }

        let wiring: Vec<(NodeId, u16, u16)> = node
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(slot, input)| {
                self.producers
                    .get(input)
                    .map(|&(src, src_slot)| (src, src_slot, slot as u16))
            })
            .collect();

        let name = node.name.clone();
        let outputs = node.outputs.clone();
        let id = NodeId::from(self.graph.add_node(node));
        self.node_names.insert(name);
        for (slot, out) in outputs.into_iter().enumerate() {
            self.producers.insert(out, (id, slot as u16));
        }
        for (src, src_slot, dst_slot) in wiring {
            self.graph.add_edge(
                src.into(),
                id.into(),
                FlowEdge::Data {
                    source_port: src_slot,
                    target_port: dst_slot,
                },
            );
        }
        self.revision += 1;
        Ok(id)
    }

    /// Rebinds input slot `slot` of `node` to `tensor`, returning the
    /// previously bound tensor name.
    ///
    /// Does not touch edges; callers rewiring a consumer remove the old data
    /// edge and add the new one around this call.
    pub fn rebind_input(
        &mut self,
        node: NodeId,
        slot: u16,
        tensor: &str,
    ) -> Result<String, CoreError> {
        if !self.tensors.contains_key(tensor) {
            return Err(CoreError::TensorNotFound {
                name: tensor.to_string(),
            });
        }
        let weight = self
            .graph
            .node_weight_mut(node.into())
            .ok_or(CoreError::NodeNotFound { id: node })?;
        let len = weight.inputs.len();
        let entry = weight
            .inputs
            .get_mut(slot as usize)
            .ok_or(CoreError::SlotOutOfRange { node, slot, len })?;
        let old = std::mem::replace(entry, tensor.to_string());
        self.revision += 1;
        Ok(old)
    }

    /// Returns a name starting with `base` that no node or tensor uses.
    pub fn generate_name(&mut self, base: &str) -> String {
        loop {
            let candidate = format!("{}{}", base, self.next_name_id);
            self.next_name_id += 1;
            if !self.node_names.contains(&candidate) && !self.tensors.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Edge methods
    // -----------------------------------------------------------------------

    /// Adds a data edge from output slot `source_port` of `from` to input
    /// slot `target_port` of `to`.
    ///
    /// Both slots must exist and name the same tensor.
    pub fn add_data_edge(
        &mut self,
        from: NodeId,
        source_port: u16,
        to: NodeId,
        target_port: u16,
    ) -> Result<EdgeId, CoreError> {
        let src = self.node(from).ok_or(CoreError::NodeNotFound { id: from })?;
        let dst = self.node(to).ok_or(CoreError::NodeNotFound { id: to })?;

        let produced = src
            .outputs
            .get(source_port as usize)
            .ok_or(CoreError::SlotOutOfRange {
                node: from,
                slot: source_port,
                len: src.outputs.len(),
            })?;
        let consumed = dst
            .inputs
            .get(target_port as usize)
            .ok_or(CoreError::SlotOutOfRange {
                node: to,
                slot: target_port,
                len: dst.inputs.len(),
            })?;
        if produced != consumed {
            return Err(CoreError::InvalidEdge {
                reason: format!(
                    "'{}' output {} is '{}' but '{}' input {} is '{}'",
                    src.name, source_port, produced, dst.name, target_port, consumed
                ),
            });
        }

        let edge = FlowEdge::Data {
            source_port,
            target_port,
        };
        let idx = self.graph.add_edge(from.into(), to.into(), edge);
        self.revision += 1;
        Ok(EdgeId::from(idx))
    }

    /// Adds a control edge: `to` must not execute before `from`.
    pub fn add_control_edge(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, CoreError> {
        if self.node(from).is_none() {
            return Err(CoreError::NodeNotFound { id: from });
        }
        if self.node(to).is_none() {
            return Err(CoreError::NodeNotFound { id: to });
        }
        if from == to {
            return Err(CoreError::InvalidEdge {
                reason: format!("control edge from NodeId({}) to itself", from.0),
            });
        }

        let idx = self.graph.add_edge(from.into(), to.into(), FlowEdge::Control);
        self.revision += 1;
        Ok(EdgeId::from(idx))
    }

    /// Removes an edge, returning its weight.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<FlowEdge, CoreError> {
        match self.graph.remove_edge(EdgeIndex::from(id)) {
            Some(edge) => {
                self.revision += 1;
                Ok(edge)
            }
            None => Err(CoreError::EdgeNotFound { id }),
        }
    }

    /// Returns `true` if any edge, data or control, runs from `from` to `to`.
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.graph.find_edge(from.into(), to.into()).is_some()
    }

    // -----------------------------------------------------------------------
    // Query methods
    // -----------------------------------------------------------------------

    /// Snapshot of the outgoing data edges of `node`, in edge-index order.
    pub fn data_out_edges(&self, node: NodeId) -> Vec<DataEdge> {
        self.data_edges(node, Direction::Outgoing)
    }

    /// Snapshot of the incoming data edges of `node`, in edge-index order.
    pub fn data_in_edges(&self, node: NodeId) -> Vec<DataEdge> {
        self.data_edges(node, Direction::Incoming)
    }

    fn data_edges(&self, node: NodeId, dir: Direction) -> Vec<DataEdge> {
        if self.node(node).is_none() {
            return Vec::new();
        }
        let mut edges: Vec<DataEdge> = self
            .graph
            .edges_directed(node.into(), dir)
            .filter_map(|e| {
                e.weight().ports().map(|(source_port, target_port)| DataEdge {
                    id: EdgeId::from(e.id()),
                    source: NodeId::from(e.source()),
                    source_port,
                    target: NodeId::from(e.target()),
                    target_port,
                })
            })
            .collect();
        edges.sort_by_key(|e| e.id.0);
        edges
    }

    /// Returns a total order of all nodes consistent with every data and
    /// control edge, using Kahn's algorithm.
    ///
    /// Sources are seeded in node-index order, so the result is
    /// deterministic for a given graph state.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, CoreError> {
        let mut in_degree: HashMap<NodeIndex<u32>, usize> = self
            .graph
            .node_indices()
            .map(|idx| (idx, 0))
            .collect();
        for edge in self.graph.edge_indices() {
            if let Some((_, target)) = self.graph.edge_endpoints(edge) {
                *in_degree.entry(target).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<NodeIndex<u32>> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx] == 0)
            .collect();

        let mut sorted = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = queue.pop_front() {
            sorted.push(NodeId::from(idx));
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                if let Some(deg) = in_degree.get_mut(&edge.target()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(edge.target());
                    }
                }
            }
        }

        if sorted.len() != self.graph.node_count() {
            return Err(CoreError::CycleDetected {
                ordered: sorted.len(),
                total: self.graph.node_count(),
            });
        }
        Ok(sorted)
    }
}
