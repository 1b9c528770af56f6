//! treemodel: the data layer of a hierarchical tree component.
//!
//! - [`domain`]: node store, node records, tree events
//! - [`application`]: event bus, shared tree handle, command sync, features
//! - [`infrastructure`]: the remote transport boundary
//! - [`cli`]: the `treemodel` binary's arguments and commands

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod render;
pub mod util;

pub use application::{CommandSync, EventBus, Tree};
pub use domain::{NodeDatum, NodeId, NodeState, NodeStore};
