//! Domain layer: nodes, the node store and its events
//!
//! This layer is independent of external concerns (no I/O, no async, no config loading).

pub mod error;
pub mod event;
pub mod node;
pub mod store;
pub mod traverse;

pub use error::{DomainError, DomainResult};
pub use event::{CommandKind, EventName, TreeEvent};
pub use node::{Node, NodeData, NodeDatum, NodeId, NodeState};
pub use store::NodeStore;
