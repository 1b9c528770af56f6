//! Hash-indexed node store.
//!
//! Owns every node of one tree in a generational arena plus a fixed root node.
//! All topology changes go through the methods here; each public mutation
//! leaves the tree consistent and records at most one [`TreeEvent`], which the
//! owner drains with [`NodeStore::take_events`] and publishes.

use std::cmp::Ordering;
use std::collections::HashSet;

use generational_arena::Arena;
use serde_json::Map;
use tracing::{debug, instrument, trace};

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::event::TreeEvent;
use crate::domain::node::{Node, NodeData, NodeDatum, NodeId, NodeState};
use crate::domain::traverse::{PostOrderIterator, PreOrderIterator};

#[derive(Debug)]
pub struct NodeStore {
    arena: Arena<Node>,
    root: NodeId,
    /// Open/closed state given to new non-leaf nodes
    default_state: NodeState,
    events: Vec<TreeEvent>,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new(NodeState::default())
    }
}

impl NodeStore {
    pub fn new(default_state: NodeState) -> Self {
        let default_state = match default_state {
            NodeState::Leaf => NodeState::Collapsed,
            other => other,
        };
        let mut arena = Arena::new();
        let root = NodeId(arena.insert_with(|idx| Node {
            id: NodeId(idx),
            parent_id: None,
            child_ids: Vec::new(),
            data: Map::new(),
            open_state: NodeState::Expanded,
            has_child: true,
        }));
        Self {
            arena,
            root,
            default_state,
            events: Vec::new(),
        }
    }

    /// Store pre-populated with `data` under the root; no event is recorded.
    pub fn with_data<I>(data: I, default_state: NodeState) -> Self
    where
        I: IntoIterator<Item = NodeDatum>,
    {
        let mut store = Self::new(default_state);
        store.add(data, None);
        store.events.clear();
        store
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn default_state(&self) -> NodeState {
        self.default_state
    }

    /// Events recorded since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<TreeEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: TreeEvent) {
        trace!(?event, "recording event");
        self.events.push(event);
    }

    fn resolve_parent(&self, parent: Option<NodeId>) -> NodeId {
        parent.filter(|id| self.contains(*id)).unwrap_or(self.root)
    }

    // ============================================================
    // MUTATIONS
    // ============================================================

    /// Adds one or more datums (recursively with their nested children) under
    /// `parent`, or under the root when `parent` is absent or unknown.
    ///
    /// Returns the ids of the new top-level nodes in input order and records
    /// one `Update` for the parent.
    #[instrument(level = "debug", skip(self, data))]
    pub fn add<I>(&mut self, data: I, parent: Option<NodeId>) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeDatum>,
    {
        let parent = self.resolve_parent(parent);
        let created = self.make_subtrees(data, parent);
        if let Some(node) = self.arena.get_mut(parent.0) {
            if !node.is_root() {
                // loaded now: from here on leaf-ness follows the real children
                node.has_child = false;
            }
        }
        debug!(count = created.len(), %parent, "added nodes");
        self.emit(TreeEvent::Update { node: parent });
        created
    }

    /// Pre-order creation: a parent always exists before its children.
    fn make_subtrees<I>(&mut self, data: I, parent: NodeId) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeDatum>,
    {
        let mut created = Vec::new();
        for datum in data {
            let NodeDatum {
                children,
                state,
                has_child,
                data,
            } = datum;
            let open_state = match state {
                Some(NodeState::Expanded) => NodeState::Expanded,
                Some(NodeState::Collapsed) => NodeState::Collapsed,
                _ => self.default_state,
            };
            let id = NodeId(self.arena.insert_with(|idx| Node {
                id: NodeId(idx),
                parent_id: Some(parent),
                child_ids: Vec::new(),
                data,
                open_state,
                has_child,
            }));
            if let Some(parent_node) = self.arena.get_mut(parent.0) {
                parent_node.child_ids.push(id);
            }
            created.push(id);
            self.make_subtrees(children, id);
        }
        created
    }

    /// Removes `id` and its whole subtree, recording one `Update` for the parent.
    pub fn remove(&mut self, id: NodeId) {
        self.remove_subtree(id, false);
    }

    /// Like [`remove`](Self::remove) but records no event.
    pub fn remove_silent(&mut self, id: NodeId) {
        self.remove_subtree(id, true);
    }

    #[instrument(level = "debug", skip(self))]
    fn remove_subtree(&mut self, id: NodeId, silent: bool) {
        let parent = match self.check_remove(id) {
            Ok(parent) => parent,
            Err(e) => {
                debug!(%e, "remove ignored");
                return;
            }
        };

        // children before parents
        let doomed: Vec<NodeId> = self.descendants_post_order(id).map(Node::id).collect();
        for node_id in &doomed {
            self.arena.remove(node_id.0);
        }
        if let Some(parent_node) = self.arena.get_mut(parent.0) {
            parent_node.child_ids.retain(|child| *child != id);
        }

        debug!(removed = doomed.len(), %parent, "removed subtree");
        if !silent {
            self.emit(TreeEvent::Update { node: parent });
        }
    }

    /// Removes every child subtree of `id`, recording one `Update` for `id`.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_all_children(&mut self, id: NodeId) {
        let child_ids = match self.check_remove_all_children(id) {
            Ok(child_ids) => child_ids,
            Err(e) => {
                debug!(%e, "remove_all_children ignored");
                return;
            }
        };
        for child in child_ids {
            self.remove_subtree(child, true);
        }
        self.emit(TreeEvent::Update { node: id });
    }

    /// Shallow-merges `properties` into the node's data.
    #[instrument(level = "debug", skip(self, properties))]
    pub fn set(&mut self, id: NodeId, properties: NodeData) {
        if let Err(e) = self.check_set(id, &properties) {
            debug!(%e, "set ignored");
            return;
        }
        if let Some(node) = self.arena.get_mut(id.0) {
            node.data.extend(properties);
        }
        self.emit(TreeEvent::Update { node: id });
    }

    /// Deletes `keys` from the node's data.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_data(&mut self, id: NodeId, keys: &[String]) {
        if let Err(e) = self.check_remove_data(id, keys) {
            debug!(%e, "remove_data ignored");
            return;
        }
        if let Some(node) = self.arena.get_mut(id.0) {
            for key in keys {
                node.data.remove(key);
            }
        }
        self.emit(TreeEvent::Update { node: id });
    }

    /// Re-parents `id` (with its subtree) as the last child of `new_parent`,
    /// or of the root when `new_parent` is absent or unknown.
    #[instrument(level = "debug", skip(self))]
    pub fn move_node(&mut self, id: NodeId, new_parent: Option<NodeId>) {
        let (original_parent, new_parent) = match self.check_move(id, new_parent) {
            Ok(parents) => parents,
            Err(e) => {
                debug!(%e, "move ignored");
                return;
            }
        };
        if original_parent == new_parent {
            debug!(%id, "already under target parent");
            return;
        }

        if let Some(parent) = self.arena.get_mut(original_parent.0) {
            parent.child_ids.retain(|child| *child != id);
        }
        if let Some(parent) = self.arena.get_mut(new_parent.0) {
            parent.child_ids.push(id);
        }
        if let Some(node) = self.arena.get_mut(id.0) {
            node.parent_id = Some(new_parent);
        }

        self.emit(TreeEvent::Move {
            node: id,
            original_parent,
            new_parent,
        });
    }

    /// Opens or closes a non-leaf node. `Leaf` is derived, never set.
    #[instrument(level = "debug", skip(self))]
    pub fn set_state(&mut self, id: NodeId, state: NodeState) {
        if state == NodeState::Leaf {
            return;
        }
        let changed = match self.arena.get_mut(id.0) {
            Some(node) if !node.is_root() && !node.is_leaf() => {
                let changed = node.open_state != state;
                node.open_state = state;
                changed
            }
            _ => false,
        };
        if changed {
            self.emit(TreeEvent::Update { node: id });
        }
    }

    /// Reorders the children of every node with more than one child.
    ///
    /// Records no event: callers re-render themselves.
    #[instrument(level = "debug", skip(self, compare))]
    pub fn sort<F>(&mut self, mut compare: F)
    where
        F: FnMut(&Node, &Node) -> Ordering,
    {
        let parents: Vec<NodeId> = self
            .arena
            .iter()
            .filter(|(_, node)| node.child_ids.len() > 1)
            .map(|(idx, _)| NodeId(idx))
            .collect();

        for parent in parents {
            let Some(node) = self.arena.get(parent.0) else {
                continue;
            };
            let mut child_ids = node.child_ids.clone();
            child_ids.sort_by(|a, b| match (self.arena.get(a.0), self.arena.get(b.0)) {
                (Some(a), Some(b)) => compare(a, b),
                _ => Ordering::Equal,
            });
            if let Some(node) = self.arena.get_mut(parent.0) {
                node.child_ids = child_ids;
            }
        }
    }

    // ============================================================
    // PRECONDITIONS
    // ============================================================

    /// Parent of `id` if it may be removed.
    pub fn check_remove(&self, id: NodeId) -> DomainResult<NodeId> {
        let node = self.get_node(id).ok_or(DomainError::UnknownNode(id))?;
        node.parent_id.ok_or(DomainError::RootImmutable)
    }

    /// Children that `remove_all_children(id)` would drop.
    pub fn check_remove_all_children(&self, id: NodeId) -> DomainResult<Vec<NodeId>> {
        let node = self.get_node(id).ok_or(DomainError::UnknownNode(id))?;
        if node.child_ids.is_empty() {
            return Err(DomainError::EmptyPayload(id));
        }
        Ok(node.child_ids.clone())
    }

    pub fn check_set(&self, id: NodeId, properties: &NodeData) -> DomainResult<()> {
        if !self.contains(id) {
            return Err(DomainError::UnknownNode(id));
        }
        if properties.is_empty() {
            return Err(DomainError::EmptyPayload(id));
        }
        Ok(())
    }

    pub fn check_remove_data(&self, id: NodeId, keys: &[String]) -> DomainResult<()> {
        if !self.contains(id) {
            return Err(DomainError::UnknownNode(id));
        }
        if keys.is_empty() {
            return Err(DomainError::EmptyPayload(id));
        }
        Ok(())
    }

    /// `(original_parent, resolved_new_parent)` if `id` may move there.
    pub fn check_move(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
    ) -> DomainResult<(NodeId, NodeId)> {
        let node = self.get_node(id).ok_or(DomainError::UnknownNode(id))?;
        let original_parent = node.parent_id.ok_or(DomainError::RootImmutable)?;
        let target = self.resolve_parent(new_parent);
        if self.is_ancestor_or_self(id, target) {
            return Err(DomainError::CycleDetected { node: id, target });
        }
        Ok((original_parent, target))
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.get_node(id).and_then(Node::parent_id);
        }
        false
    }

    // ============================================================
    // QUERIES
    // ============================================================

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.contains(id.0)
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.arena.get(id.0)
    }

    pub fn get_node_data(&self, id: NodeId) -> Option<&NodeData> {
        self.get_node(id).map(Node::data)
    }

    pub fn get_parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id).and_then(Node::parent_id)
    }

    /// Child ids in display order; empty for unknown ids.
    pub fn get_child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.get_node(id)
            .map(|node| node.child_ids.clone())
            .unwrap_or_default()
    }

    pub fn get_children(&self, id: NodeId) -> Vec<&Node> {
        self.get_node(id)
            .map(|node| {
                node.child_ids
                    .iter()
                    .filter_map(|child| self.get_node(*child))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_state(&self, id: NodeId) -> Option<NodeState> {
        self.get_node(id).map(Node::state)
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.get_node(id).is_some_and(Node::is_leaf)
    }

    /// Number of parent links between `id` and the root (root = 0).
    ///
    /// Walks the chain on every call; nothing is cached, so moves never leave
    /// a stale depth behind.
    pub fn get_depth(&self, id: NodeId) -> Option<usize> {
        let mut node = self.get_node(id)?;
        let mut depth = 0;
        while let Some(parent) = node.parent_id.and_then(|p| self.get_node(p)) {
            depth += 1;
            node = parent;
        }
        Some(depth)
    }

    /// Total number of nodes, root included.
    pub fn get_count(&self) -> usize {
        self.arena.len()
    }

    /// Deepest depth over all nodes.
    pub fn get_last_depth(&self) -> usize {
        self.arena
            .iter()
            .filter_map(|(idx, _)| self.get_depth(NodeId(idx)))
            .max()
            .unwrap_or(0)
    }

    /// Visits every node in arena order. Callers must not rely on that order.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&Node),
    {
        for (_, node) in self.arena.iter() {
            f(node);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> + '_ {
        self.arena.iter().map(|(_, node)| node)
    }

    /// `id` and its subtree in pre-order.
    pub fn descendants(&self, id: NodeId) -> PreOrderIterator<'_> {
        PreOrderIterator::new(&self.arena, id)
    }

    /// `id` and its subtree in post-order.
    pub fn descendants_post_order(&self, id: NodeId) -> PostOrderIterator<'_> {
        PostOrderIterator::new(&self.arena, id)
    }

    /// Checks every structural invariant; reports the first violation.
    pub fn verify(&self) -> DomainResult<()> {
        let root = self
            .get_node(self.root)
            .ok_or_else(|| DomainError::Inconsistent("root missing".into()))?;
        if root.parent_id.is_some() {
            return Err(DomainError::Inconsistent("root has a parent".into()));
        }

        for (idx, node) in self.arena.iter() {
            let id = NodeId(idx);
            if node.id != id {
                return Err(DomainError::Inconsistent(format!(
                    "{} stored under {}",
                    node.id, id
                )));
            }

            let mut seen = HashSet::new();
            for child in &node.child_ids {
                if !seen.insert(*child) {
                    return Err(DomainError::Inconsistent(format!(
                        "{} listed twice under {}",
                        child, id
                    )));
                }
                match self.get_node(*child) {
                    Some(child_node) if child_node.parent_id == Some(id) => {}
                    Some(_) => {
                        return Err(DomainError::Inconsistent(format!(
                            "{} lists {} which points elsewhere",
                            id, child
                        )))
                    }
                    None => {
                        return Err(DomainError::Inconsistent(format!(
                            "{} lists missing child {}",
                            id, child
                        )))
                    }
                }
            }

            if let Some(parent) = node.parent_id {
                let listed = self
                    .get_node(parent)
                    .is_some_and(|p| p.child_ids.contains(&id));
                if !listed {
                    return Err(DomainError::Inconsistent(format!(
                        "{} not listed by its parent {}",
                        id, parent
                    )));
                }
            }
        }

        // bounded walk so a cycle cannot spin forever
        let total = self.arena.len();
        let reachable = self.descendants(self.root).take(total + 1).count();
        if reachable != total {
            return Err(DomainError::Inconsistent(format!(
                "{} of {} nodes reachable from root",
                reachable, total
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_nested_datum_when_adding_then_returns_only_top_level_ids() {
        let mut store = NodeStore::default();
        let ids = store.add(
            [NodeDatum::text("text", "A").with_children(vec![NodeDatum::text("text", "aa")])],
            None,
        );

        assert_eq!(ids.len(), 1);
        let a = store.get_node(ids[0]).unwrap();
        let aa = store.get_node(a.child_ids()[0]).unwrap();
        assert_eq!(aa.parent_id(), Some(ids[0]));
        assert_eq!(store.get_depth(aa.id()), Some(2));
        assert!(store.verify().is_ok());
    }

    #[test]
    fn given_cycle_target_when_checking_move_then_reports_cycle() {
        let mut store = NodeStore::default();
        let a = store.add([NodeDatum::default()], None)[0];
        let b = store.add([NodeDatum::default()], Some(a))[0];

        assert_eq!(
            store.check_move(a, Some(b)),
            Err(DomainError::CycleDetected { node: a, target: b })
        );
        assert_eq!(
            store.check_move(a, Some(a)),
            Err(DomainError::CycleDetected { node: a, target: a })
        );
    }
}
