//! Subtree iterators over the node arena.

use generational_arena::Arena;
use tracing::instrument;

use crate::domain::node::{Node, NodeId};

/// Pre-order walk: a node is yielded before its children, children left to right.
pub struct PreOrderIterator<'a> {
    arena: &'a Arena<Node>,
    stack: Vec<NodeId>,
}

impl<'a> PreOrderIterator<'a> {
    #[instrument(level = "trace", skip(arena))]
    pub(crate) fn new(arena: &'a Arena<Node>, start: NodeId) -> Self {
        let mut stack = Vec::new();
        if arena.contains(start.0) {
            stack.push(start);
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PreOrderIterator<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.arena.get(current.0) {
                // Push children in reverse order for left-to-right traversal
                for &child in node.child_ids.iter().rev() {
                    self.stack.push(child);
                }
                return Some(node);
            }
        }
        None
    }
}

/// Post-order walk: every child subtree is yielded before its parent.
pub struct PostOrderIterator<'a> {
    arena: &'a Arena<Node>,
    stack: Vec<(NodeId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    #[instrument(level = "trace", skip(arena))]
    pub(crate) fn new(arena: &'a Arena<Node>, start: NodeId) -> Self {
        let mut stack = Vec::new();
        if arena.contains(start.0) {
            stack.push((start, false));
        }
        Self { arena, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(node) = self.arena.get(current.0) {
                if !visited {
                    self.stack.push((current, true));
                    for &child in node.child_ids.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some(node);
                }
            }
        }
        None
    }
}
