//! Shared tree handle: one node store plus the bus its events are published on.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::{Rc, Weak};

use tracing::instrument;

use crate::application::event_bus::EventBus;
use crate::domain::{Node, NodeData, NodeDatum, NodeId, NodeState, NodeStore, TreeEvent};

struct TreeInner {
    store: RefCell<NodeStore>,
    events: EventBus<TreeEvent>,
}

/// Cloneable, single-threaded handle to a tree.
///
/// Every mutation runs against the store first; the store borrow is released
/// before the recorded events are fired, so handlers may read or mutate the
/// tree again. Calling a mutation from inside a `read` closure panics.
#[derive(Clone)]
pub struct Tree {
    inner: Rc<TreeInner>,
}

/// Non-owning handle for subscribers that must not keep the tree alive.
#[derive(Clone)]
pub struct WeakTree {
    inner: Weak<TreeInner>,
}

impl WeakTree {
    pub fn upgrade(&self) -> Option<Tree> {
        self.inner.upgrade().map(|inner| Tree { inner })
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new(NodeStore::default())
    }
}

impl std::fmt::Debug for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("count", &self.get_count())
            .field("events", &self.inner.events)
            .finish()
    }
}

impl Tree {
    pub fn new(store: NodeStore) -> Self {
        Self {
            inner: Rc::new(TreeInner {
                store: RefCell::new(store),
                events: EventBus::new(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakTree {
        WeakTree {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn events(&self) -> &EventBus<TreeEvent> {
        &self.inner.events
    }

    pub fn read<R>(&self, f: impl FnOnce(&NodeStore) -> R) -> R {
        f(&self.inner.store.borrow())
    }

    /// Runs `f` against the store, then publishes whatever it recorded.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut NodeStore) -> R) -> R {
        let (result, events) = {
            let mut store = self.inner.store.borrow_mut();
            let result = f(&mut store);
            (result, store.take_events())
        };
        for event in &events {
            self.inner.events.fire(event);
        }
        result
    }

    /// Publishes an event that did not originate in the store.
    pub fn notify(&self, event: TreeEvent) {
        self.inner.events.fire(&event);
    }

    // ============================================================
    // MUTATIONS
    // ============================================================

    #[instrument(level = "trace", skip(self, data))]
    pub fn add<I>(&self, data: I, parent: Option<NodeId>) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeDatum>,
    {
        self.mutate(|store| store.add(data, parent))
    }

    pub fn remove(&self, id: NodeId) {
        self.mutate(|store| store.remove(id))
    }

    pub fn remove_silent(&self, id: NodeId) {
        self.mutate(|store| store.remove_silent(id))
    }

    pub fn remove_all_children(&self, id: NodeId) {
        self.mutate(|store| store.remove_all_children(id))
    }

    pub fn set(&self, id: NodeId, properties: NodeData) {
        self.mutate(|store| store.set(id, properties))
    }

    pub fn remove_data(&self, id: NodeId, keys: &[String]) {
        self.mutate(|store| store.remove_data(id, keys))
    }

    pub fn move_node(&self, id: NodeId, new_parent: Option<NodeId>) {
        self.mutate(|store| store.move_node(id, new_parent))
    }

    pub fn set_state(&self, id: NodeId, state: NodeState) {
        self.mutate(|store| store.set_state(id, state))
    }

    pub fn sort<F>(&self, compare: F)
    where
        F: FnMut(&Node, &Node) -> Ordering,
    {
        self.mutate(|store| store.sort(compare))
    }

    // ============================================================
    // QUERIES (owned copies, so no borrow outlives the call)
    // ============================================================

    pub fn root_id(&self) -> NodeId {
        self.read(NodeStore::root_id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.read(|store| store.contains(id))
    }

    pub fn get_node(&self, id: NodeId) -> Option<Node> {
        self.read(|store| store.get_node(id).cloned())
    }

    pub fn get_node_data(&self, id: NodeId) -> Option<NodeData> {
        self.read(|store| store.get_node_data(id).cloned())
    }

    pub fn get_parent_id(&self, id: NodeId) -> Option<NodeId> {
        self.read(|store| store.get_parent_id(id))
    }

    pub fn get_child_ids(&self, id: NodeId) -> Vec<NodeId> {
        self.read(|store| store.get_child_ids(id))
    }

    pub fn get_children(&self, id: NodeId) -> Vec<Node> {
        self.read(|store| store.get_children(id).into_iter().cloned().collect())
    }

    pub fn get_state(&self, id: NodeId) -> Option<NodeState> {
        self.read(|store| store.get_state(id))
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.read(|store| store.is_leaf(id))
    }

    pub fn get_depth(&self, id: NodeId) -> Option<usize> {
        self.read(|store| store.get_depth(id))
    }

    pub fn get_count(&self) -> usize {
        self.read(NodeStore::get_count)
    }

    pub fn get_last_depth(&self) -> usize {
        self.read(NodeStore::get_last_depth)
    }

    /// Visits a snapshot of every node; `f` may call back into the tree.
    pub fn each<F>(&self, mut f: F)
    where
        F: FnMut(&Node),
    {
        let nodes: Vec<Node> = self.read(|store| store.iter().cloned().collect());
        for node in &nodes {
            f(node);
        }
    }
}
