pub mod edge;
pub mod error;
pub mod graph;
pub mod id;
pub mod kernel;
pub mod node;
pub mod ops;
pub mod tensor;

// Re-export commonly used types
pub use edge::{DataEdge, FlowEdge};
pub use error::CoreError;
pub use graph::TrainingGraph;
pub use id::{EdgeId, GraphId, NodeId};
pub use kernel::{KernelDef, KernelRegistry};
pub use node::{Node, Placement, Region};
pub use ops::OpKind;
pub use tensor::{Dim, ElementType, TensorDesc};
