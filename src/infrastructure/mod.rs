//! Infrastructure layer: the remote boundary behind gated commands

pub mod error;
pub mod traits;

pub use error::{TransportError, TransportResult};
pub use traits::{Method, RemoteRequest, RemoteResponse, Transport};
