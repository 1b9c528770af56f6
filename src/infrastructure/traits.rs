//! Remote boundary trait for testability
//!
//! The sync layer only needs "send this request, get back a status and a parsed
//! body". URL building and serialization happen before the request reaches a
//! [`Transport`]; headers and sockets are the implementation's business.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::CommandKind;
use crate::infrastructure::error::TransportResult;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    #[serde(alias = "get")]
    Get,
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
    #[serde(alias = "patch")]
    Patch,
    #[serde(alias = "delete")]
    Delete,
}

impl Method {
    /// Query-style methods carry their params in the URL.
    pub fn is_query(&self) -> bool {
        matches!(self, Method::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "PATCH" => Ok(Method::Patch),
            "DELETE" => Ok(Method::Delete),
            _ => Err(format!("unsupported method: {}", s)),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved request for one gated command.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub command: CommandKind,
    pub method: Method,
    /// Includes the query string for query-style methods
    pub url: String,
    pub content_type: String,
    /// JSON body for non-query methods
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// A body of exactly `false` rejects the command even with a 2xx status.
    pub fn body_signals_failure(&self) -> bool {
        matches!(self.body, Value::Bool(false))
    }
}

/// Carries a request to the remote authority and returns its reply.
///
/// Futures are not `Send`: the tree is single-threaded and requests are
/// awaited on the same logical thread that mutates it.
#[async_trait(?Send)]
pub trait Transport {
    async fn send(&self, request: RemoteRequest) -> TransportResult<RemoteResponse>;
}
