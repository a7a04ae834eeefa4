//! Structural edits of a message tree.
//!
//! Attach operations only accept a *root* (a node with neither parent nor previous
//! sibling); `insert` and `replace` additionally require it to stand alone (no
//! next sibling). A refused edit returns `false` and leaves the tree untouched.
//! Detaching hands the node back to the caller as a detached root that stays in
//! the arena until it is attached again or deleted.

use crate::tree::{Body, MessageTree, NodeId};
use log::trace;

impl MessageTree {
    /// True if `node` may be attached somewhere in the tree of `anchor`.
    fn can_attach(&self, anchor: NodeId, node: NodeId, alone: bool) -> bool {
        let (Some(a), Some(n)) = (self.get(anchor), self.get(node)) else {
            return false;
        };
        if anchor == node || !n.is_root() || (alone && n.has_next()) {
            trace!("refusing to attach {} at {}: not a detached root", node, anchor);
            return false;
        }
        if a.root().head().id() == node {
            trace!("refusing to attach {} at {}: would create a cycle", node, anchor);
            return false;
        }
        true
    }

    fn set_parent_of_chain(&mut self, first: NodeId, parent: Option<NodeId>) {
        let mut cursor = Some(first);
        while let Some(id) = cursor {
            match self.node_mut(id) {
                Some(node) => {
                    node.parent = parent;
                    cursor = node.next;
                }
                None => break,
            }
        }
    }

    /// Redirect the link that points at `id` from its previous sibling (or, for
    /// a first child, from its parent) to `to`.
    fn relink_incoming(&mut self, id: NodeId, to: Option<NodeId>) {
        let Some((previous, parent)) = self.node(id).map(|n| (n.previous, n.parent)) else {
            return;
        };
        if let Some(previous) = previous {
            if let Some(p) = self.node_mut(previous) {
                p.next = to;
            }
        } else if let Some(parent) = parent {
            if let Some(p) = self.node_mut(parent) {
                p.child = to;
            }
        }
    }

    /// Splice the chain headed by `next` after the tail of `id`'s chain. Every
    /// node of the spliced chain takes `id`'s parent.
    pub fn append_next(&mut self, id: NodeId, next: NodeId) -> bool {
        if !self.can_attach(id, next, false) {
            return false;
        }
        let Some((tail, parent)) = self.get(id).map(|n| (n.tail().id(), n.raw().parent)) else {
            return false;
        };
        if let Some(t) = self.node_mut(tail) {
            t.next = Some(next);
        }
        if let Some(n) = self.node_mut(next) {
            n.previous = Some(tail);
        }
        self.set_parent_of_chain(next, parent);
        true
    }

    /// Append the chain headed by `child` to the children of container `id`.
    pub fn append_child(&mut self, id: NodeId, child: NodeId) -> bool {
        let first = match self.node(id) {
            Some(node) if matches!(node.body, Body::Container(_)) => node.child,
            _ => {
                trace!("refusing to append {} to {}: not a container", child, id);
                return false;
            }
        };
        if let Some(first) = first {
            return self.append_next(first, child);
        }
        if !self.can_attach(id, child, false) {
            return false;
        }
        if let Some(node) = self.node_mut(id) {
            node.child = Some(child);
        }
        self.set_parent_of_chain(child, Some(id));
        true
    }

    pub fn append_child_renamed(&mut self, id: NodeId, child: NodeId, name: &str) -> bool {
        self.append_child(id, child) && self.set_name(child, name)
    }

    /// Place the single root `insertion` immediately before `id`.
    pub fn insert(&mut self, id: NodeId, insertion: NodeId) -> bool {
        if !self.can_attach(id, insertion, true) {
            return false;
        }
        let Some((previous, parent)) = self.node(id).map(|n| (n.previous, n.parent)) else {
            return false;
        };
        self.relink_incoming(id, Some(insertion));
        if let Some(x) = self.node_mut(insertion) {
            x.next = Some(id);
            x.previous = previous;
            x.parent = parent;
        }
        if let Some(node) = self.node_mut(id) {
            node.previous = Some(insertion);
        }
        true
    }

    /// Put the single root `replacement` where `id` is. `id` is left detached (with
    /// its children) for the caller to reuse or delete.
    pub fn replace(&mut self, id: NodeId, replacement: NodeId) -> bool {
        if !self.can_attach(id, replacement, true) {
            return false;
        }
        let Some((previous, next, parent)) = self.node(id).map(|n| (n.previous, n.next, n.parent))
        else {
            return false;
        };
        self.relink_incoming(id, Some(replacement));
        if let Some(n) = next.and_then(|next| self.node_mut(next)) {
            n.previous = Some(replacement);
        }
        if let Some(x) = self.node_mut(replacement) {
            x.previous = previous;
            x.next = next;
            x.parent = parent;
        }
        self.disconnect(id);
        true
    }

    /// Unlink `id` from its parent and siblings. The node keeps its children and is
    /// returned as a detached root.
    pub fn remove(&mut self, id: NodeId) -> Option<NodeId> {
        let (previous, next) = self.node(id).map(|n| (n.previous, n.next))?;
        self.relink_incoming(id, next);
        if let Some(n) = next.and_then(|next| self.node_mut(next)) {
            n.previous = previous;
        }
        self.disconnect(id);
        Some(id)
    }

    fn disconnect(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.previous = None;
            node.next = None;
            node.parent = None;
        }
    }

    /// Cut the chain after `id` and delete everything that followed. Returns the
    /// number of chain nodes deleted.
    pub fn delete_following(&mut self, id: NodeId) -> usize {
        let Some(mut cursor) = self.node_mut(id).map(|n| n.next.take()) else {
            return 0;
        };
        let mut n = 0;
        while let Some(unit) = cursor {
            cursor = self.node(unit).and_then(|u| u.next);
            self.destroy(unit);
            n += 1;
        }
        n
    }

    /// Delete the children of `id` from index `from` on. Returns the number deleted.
    pub fn delete_children(&mut self, id: NodeId, from: usize) -> usize {
        let Some(node) = self.get(id) else {
            return 0;
        };
        if from > 0 {
            return match node.child(from - 1) {
                Some(last_kept) => {
                    let last_kept = last_kept.id();
                    self.delete_following(last_kept)
                }
                None => 0,
            };
        }
        let Some(first) = node.first_child().map(|c| c.id()) else {
            return 0;
        };
        let n = self.delete_following(first) + 1;
        if let Some(node) = self.node_mut(id) {
            node.child = None;
        }
        self.destroy(first);
        n
    }

    /// Detach `id` and delete it together with its descendants.
    pub fn delete(&mut self, id: NodeId) -> bool {
        if self.remove(id).is_none() {
            return false;
        }
        self.destroy(id);
        true
    }

    /// Free `id`, its descendants and any nodes owned by their layouts, without
    /// touching the links around `id`. Returns the number of freed nodes.
    pub(crate) fn destroy(&mut self, id: NodeId) -> usize {
        let mut freed = 0;
        let mut pending = vec![(id, false)];
        while let Some((id, with_next)) = pending.pop() {
            let Some(node) = self.release(id) else {
                continue;
            };
            freed += 1;
            if with_next {
                if let Some(next) = node.next {
                    pending.push((next, true));
                }
            }
            if let Some(child) = node.child {
                pending.push((child, true));
            }
            if let Body::Container(c) = &node.body {
                if let Some(layout) = &c.layout {
                    pending.extend(layout.owned_nodes().into_iter().map(|n| (n, false)));
                }
            }
        }
        freed
    }
}
