//! Change notifications published by the tree.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::node::NodeId;

/// Tree operations that can be gated behind a remote command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Create,
    Read,
    Update,
    Remove,
    RemoveAllChildren,
    Move,
}

impl CommandKind {
    pub const ALL: [CommandKind; 6] = [
        CommandKind::Create,
        CommandKind::Read,
        CommandKind::Update,
        CommandKind::Remove,
        CommandKind::RemoveAllChildren,
        CommandKind::Move,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Create => "create",
            CommandKind::Read => "read",
            CommandKind::Update => "update",
            CommandKind::Remove => "remove",
            CommandKind::RemoveAllChildren => "remove_all_children",
            CommandKind::Move => "move",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Names observers subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    Update,
    Move,
    SuccessResponse,
    ErrorResponse,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Update => "update",
            EventName::Move => "move",
            EventName::SuccessResponse => "successAjaxResponse",
            EventName::ErrorResponse => "errorAjaxResponse",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    /// Children or data of `node` changed.
    Update { node: NodeId },
    /// `node` was re-parented.
    Move {
        node: NodeId,
        original_parent: NodeId,
        new_parent: NodeId,
    },
    /// A gated command was confirmed and applied.
    SuccessResponse {
        command: CommandKind,
        ids: Vec<NodeId>,
        body: Value,
    },
    /// A gated command failed; nothing was applied.
    ErrorResponse { command: CommandKind, error: String },
}

impl TreeEvent {
    pub fn name(&self) -> EventName {
        match self {
            TreeEvent::Update { .. } => EventName::Update,
            TreeEvent::Move { .. } => EventName::Move,
            TreeEvent::SuccessResponse { .. } => EventName::SuccessResponse,
            TreeEvent::ErrorResponse { .. } => EventName::ErrorResponse,
        }
    }
}
