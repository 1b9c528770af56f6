//! Command descriptors and request resolution.
//!
//! A command maps a tree operation to a remote call. Each request field is
//! resolved at call time, highest precedence first:
//!
//! 1. explicit per-call [`RequestOptions`]
//! 2. the registered [`CommandConfig`] (static, or a function of the acting node's data)
//! 3. defaults: `GET`, `application/json`
//!
//! Params are merged key by key, per-call keys winning.

use std::fmt;
use std::rc::Rc;

use itertools::Itertools;
use serde_json::Value;
use uuid::Uuid;

use crate::application::error::{SyncError, SyncResult};
use crate::domain::{CommandKind, NodeData, NodeId};
use crate::infrastructure::{Method, RemoteRequest};

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// Function of the acting node's data; `None` when there is no acting node.
pub type NodeFn<T> = Rc<dyn Fn(Option<&NodeData>) -> T>;

/// A configured value: fixed, or computed from the acting node at call time.
#[derive(Clone)]
pub enum Resolvable<T> {
    Static(T),
    Dynamic(NodeFn<T>),
}

impl<T: Clone> Resolvable<T> {
    pub fn resolve(&self, data: Option<&NodeData>) -> T {
        match self {
            Resolvable::Static(value) => value.clone(),
            Resolvable::Dynamic(f) => f(data),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolvable::Static(value) => f.debug_tuple("Static").field(value).finish(),
            Resolvable::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Remote call descriptor registered for one command kind.
#[derive(Debug, Clone, Default)]
pub struct CommandConfig {
    pub url: Option<Resolvable<String>>,
    pub params: Option<Resolvable<NodeData>>,
    pub method: Option<Method>,
    pub content_type: Option<String>,
}

impl CommandConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(Resolvable::Static(url.into())),
            ..Self::default()
        }
    }

    pub fn url_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&NodeData>) -> String + 'static,
    {
        self.url = Some(Resolvable::Dynamic(Rc::new(f)));
        self
    }

    pub fn params(mut self, params: NodeData) -> Self {
        self.params = Some(Resolvable::Static(params));
        self
    }

    pub fn params_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&NodeData>) -> NodeData + 'static,
    {
        self.params = Some(Resolvable::Dynamic(Rc::new(f)));
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The command's own options with defaults filled in, before any per-call
    /// override.
    pub fn resolve(&self, data: Option<&NodeData>) -> RequestOptions {
        RequestOptions {
            url: Some(
                self.url
                    .as_ref()
                    .map(|url| url.resolve(data))
                    .unwrap_or_default(),
            ),
            params: Some(
                self.params
                    .as_ref()
                    .map(|params| params.resolve(data))
                    .unwrap_or_default(),
            ),
            method: Some(self.method.unwrap_or_default()),
            content_type: Some(
                self.content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            ),
        }
    }
}

/// Per-call overrides; `None` fields fall through to the command config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub url: Option<String>,
    pub params: Option<NodeData>,
    pub method: Option<Method>,
    pub content_type: Option<String>,
}

impl RequestOptions {
    pub fn with_params(params: NodeData) -> Self {
        Self {
            params: Some(params),
            ..Self::default()
        }
    }
}

/// Resolves `call` over `config` into the request handed to the transport.
pub fn build_request(
    command: CommandKind,
    config: &CommandConfig,
    acting: Option<&NodeData>,
    call: RequestOptions,
) -> SyncResult<RemoteRequest> {
    let configured = config.resolve(acting);

    let url = call.url.or(configured.url).unwrap_or_default();
    if url.is_empty() {
        return Err(SyncError::MissingUrl(command));
    }
    let method = call.method.or(configured.method).unwrap_or_default();
    let content_type = call
        .content_type
        .or(configured.content_type)
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

    let mut params = configured.params.unwrap_or_default();
    if let Some(overrides) = call.params {
        params.extend(overrides);
    }

    let (url, body) = if method.is_query() {
        (append_query(&url, &params), None)
    } else {
        (url, Some(Value::Object(params).to_string()))
    };

    Ok(RemoteRequest {
        command,
        method,
        url,
        content_type,
        body,
    })
}

fn append_query(url: &str, params: &NodeData) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let query = params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&query_value(value))
            )
        })
        .join("&");
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, query)
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Correlates a pending record with its log lines and resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One issued, not yet resolved command.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCommand {
    pub token: CorrelationToken,
    pub command: CommandKind,
    pub targets: Vec<NodeId>,
    pub request: RemoteRequest,
}
