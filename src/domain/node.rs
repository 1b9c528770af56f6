//! Node records and the datums they are created from.

use std::fmt;

use generational_arena::Index;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Application payload of a node.
pub type NodeData = Map<String, Value>;

/// Stable identity of a node inside one store.
///
/// Backed by a generational arena index: a freed slot is only handed out again
/// with a bumped generation, so an id never aliases a removed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) Index);

impl NodeId {
    pub fn into_raw_parts(self) -> (usize, u64) {
        self.0.into_raw_parts()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (slot, generation) = self.0.into_raw_parts();
        write!(f, "node-{}-{}", slot, generation)
    }
}

impl Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::String(id.to_string())
    }
}

/// Display/interaction state of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[serde(alias = "opened")]
    Expanded,
    #[default]
    #[serde(alias = "closed")]
    Collapsed,
    Leaf,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            NodeState::Expanded => "expanded",
            NodeState::Collapsed => "collapsed",
            NodeState::Leaf => "leaf",
        };
        f.write_str(label)
    }
}

/// Input for `add`: payload plus optional nested children.
///
/// `children`, `state` and `hasChild` are lifted out of the payload; every
/// other key lands in the node's data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDatum {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeDatum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<NodeState>,
    #[serde(default, rename = "hasChild", skip_serializing_if = "std::ops::Not::not")]
    pub has_child: bool,
    #[serde(flatten)]
    pub data: NodeData,
}

impl NodeDatum {
    pub fn new(data: NodeData) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Datum with a single string property, e.g. `NodeDatum::text("text", "A")`.
    pub fn text(key: &str, value: &str) -> Self {
        let mut data = NodeData::new();
        data.insert(key.to_string(), Value::String(value.to_string()));
        Self::new(data)
    }

    pub fn with_children(mut self, children: Vec<NodeDatum>) -> Self {
        self.children = children;
        self
    }

    pub fn with_state(mut self, state: NodeState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_has_child(mut self, has_child: bool) -> Self {
        self.has_child = has_child;
        self
    }

    /// Parses a JSON value holding either one datum or an array of datums.
    pub fn list_from_value(value: Value) -> Result<Vec<NodeDatum>, serde_json::Error> {
        match value {
            Value::Array(_) => serde_json::from_value(value),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![serde_json::from_value(other)?]),
        }
    }
}

/// Tree node stored in the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) parent_id: Option<NodeId>,
    pub(crate) child_ids: Vec<NodeId>,
    pub(crate) data: NodeData,
    /// Open/closed toggle; never `Leaf`, leaf-ness is derived
    pub(crate) open_state: NodeState,
    pub(crate) has_child: bool,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn child_ids(&self) -> &[NodeId] {
        &self.child_ids
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_root() && self.child_ids.is_empty() && !self.has_child
    }

    pub fn state(&self) -> NodeState {
        if self.is_root() {
            NodeState::Expanded
        } else if self.is_leaf() {
            NodeState::Leaf
        } else {
            self.open_state
        }
    }

    /// Label used by renderers: the value under `key`, or the id.
    pub fn label(&self, key: &str) -> String {
        match self.data.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self.id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn given_json_datum_when_deserializing_then_lifts_topology_keys() {
        let datum: NodeDatum = serde_json::from_value(json!({
            "text": "A",
            "state": "opened",
            "hasChild": true,
            "children": [{"text": "aa"}]
        }))
        .unwrap();

        assert_eq!(datum.state, Some(NodeState::Expanded));
        assert!(datum.has_child);
        assert_eq!(datum.children.len(), 1);
        assert_eq!(datum.data.len(), 1);
        assert_eq!(datum.data.get("text"), Some(&json!("A")));
    }

    #[test]
    fn given_single_object_when_parsing_list_then_wraps_it() {
        let list = NodeDatum::list_from_value(json!({"text": "A"})).unwrap();
        assert_eq!(list.len(), 1);

        let list = NodeDatum::list_from_value(json!([{"text": "A"}, {"text": "B"}])).unwrap();
        assert_eq!(list.len(), 2);

        assert!(NodeDatum::list_from_value(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn given_closed_alias_when_deserializing_state_then_maps_to_collapsed() {
        let state: NodeState = serde_json::from_value(json!("closed")).unwrap();
        assert_eq!(state, NodeState::Collapsed);
    }
}
