//! Application layer: event publishing, the shared tree handle and command sync
//!
//! This layer orchestrates domain logic and depends on the transport boundary trait.

pub mod command;
pub mod error;
pub mod event_bus;
pub mod features;
pub mod sync;
pub mod tree;

pub use command::{CommandConfig, CorrelationToken, PendingCommand, RequestOptions, Resolvable};
pub use error::{ApplicationError, ApplicationResult, SyncError, SyncResult};
pub use event_bus::{BusEvent, ContextId, EventBus, HandlerId, Unsubscribe};
pub use features::{Feature, FeatureRegistry};
pub use sync::CommandSync;
pub use tree::{Tree, WeakTree};
