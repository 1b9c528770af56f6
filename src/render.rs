//! Text rendering of a node store via `termtree`.

use termtree::Tree;
use tracing::instrument;

use crate::domain::{Node, NodeId, NodeState, NodeStore};

pub trait TreeRender {
    /// Renders the subtree under the root; each node shows the value under
    /// `label_key`, or its id when absent.
    fn to_tree_string(&self, label_key: &str) -> Tree<String>;
}

impl TreeRender for NodeStore {
    #[instrument(level = "debug", skip(self))]
    fn to_tree_string(&self, label_key: &str) -> Tree<String> {
        let root = self.root_id();
        let mut tree = Tree::new("/".to_string());
        build_tree(self, root, label_key, &mut tree);
        tree
    }
}

fn build_tree(store: &NodeStore, id: NodeId, label_key: &str, parent_tree: &mut Tree<String>) {
    for child in store.get_children(id) {
        let mut child_tree = Tree::new(node_label(child, label_key));
        build_tree(store, child.id(), label_key, &mut child_tree);
        parent_tree.push(child_tree);
    }
}

fn node_label(node: &Node, label_key: &str) -> String {
    let label = node.label(label_key);
    match node.state() {
        NodeState::Leaf => label,
        NodeState::Expanded => format!("{} [-]", label),
        // collapsed nodes still print their loaded children
        NodeState::Collapsed => format!("{} [+]", label),
    }
}
