//! Filter-aware navigation cursor over one subtree.
//!
//! A cursor never leaves the subtree of the root it was created for: every
//! candidate position must be that root or one of its descendants, and must pass
//! the cursor's own filter plus any filter given to the individual call. Moves that
//! cannot be completed leave the position unchanged.

use crate::filter::NodeFilter;
use crate::tree::{MessageTree, NodeId, NodeRef, TreeError};
use std::fmt::Write as _;

pub struct Cursor {
    root: NodeId,
    position: Option<NodeId>,
    filter: Option<Box<dyn NodeFilter>>,
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("root", &self.root)
            .field("position", &self.position)
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl Cursor {
    /// Cursor over the subtree of `root`, placed on the first node passing `filter`.
    pub fn new(tree: &MessageTree, root: NodeId, filter: Option<Box<dyn NodeFilter>>) -> Self {
        let mut cursor = Cursor {
            root,
            position: None,
            filter,
        };
        cursor.seek_by_index(tree, 0, None);
        cursor
    }

    /// Cursor placed on `position` (unset if `position` is not admissible).
    pub fn at(
        tree: &MessageTree,
        root: NodeId,
        position: NodeId,
        filter: Option<Box<dyn NodeFilter>>,
    ) -> Self {
        let mut cursor = Cursor {
            root,
            position: None,
            filter,
        };
        cursor.move_to(tree, position);
        cursor
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn position(&self) -> Option<NodeId> {
        self.position
    }

    /// Node at the cursor, if the position is set and still exists.
    pub fn current<'a>(&self, tree: &'a MessageTree) -> Option<NodeRef<'a>> {
        self.position.and_then(|id| tree.get(id))
    }

    pub fn is_valid(&self, tree: &MessageTree) -> bool {
        self.current(tree).is_some()
    }

    /// True if `node` is an admissible position.
    pub fn apply_filter(&self, node: &NodeRef<'_>, filter: Option<&dyn NodeFilter>) -> bool {
        self.filter.as_ref().map_or(true, |f| f.apply(node))
            && filter.map_or(true, |f| f.apply(node))
            && (node.id() == self.root || node.is_descendant_of(self.root))
    }

    /// Place the cursor on `position` if it is admissible.
    pub fn move_to(&mut self, tree: &MessageTree, position: NodeId) -> bool {
        match tree.get(position) {
            Some(node) if self.apply_filter(&node, None) => {
                self.position = Some(position);
                true
            }
            _ => false,
        }
    }

    /// Like [`Cursor::move_to`], but unsets the position on failure.
    pub fn set_to(&mut self, tree: &MessageTree, position: Option<NodeId>) -> bool {
        let accepted = position.map_or(false, |p| self.move_to(tree, p));
        if !accepted {
            self.position = None;
        }
        accepted
    }

    /// Nodes of the subtree in traversal order, starting with the root.
    fn subtree<'a>(&self, tree: &'a MessageTree) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let root = self.root;
        std::iter::successors(tree.get(root), |n| n.successor())
            .take_while(move |n| n.id() == root || n.is_descendant_of(root))
    }

    /// Move to the `n`-th admissible node (0-based) in traversal order.
    pub fn seek_by_index(&mut self, tree: &MessageTree, n: usize, filter: Option<&dyn NodeFilter>) -> bool {
        let found = self
            .subtree(tree)
            .filter(|node| self.apply_filter(node, filter))
            .nth(n)
            .map(|node| node.id());
        match found {
            Some(id) => self.move_to(tree, id),
            None => false,
        }
    }

    /// Every admissible node in traversal order, root included.
    pub fn scan<'a>(&self, tree: &'a MessageTree, filter: Option<&dyn NodeFilter>) -> Vec<NodeRef<'a>> {
        self.subtree(tree)
            .filter(|node| self.apply_filter(node, filter))
            .collect()
    }

    /// Move to the last node of the tree in traversal order.
    pub fn move_to_end(&mut self, tree: &MessageTree) -> bool {
        let Some(current) = self.current(tree) else {
            return false;
        };
        let mut last = current;
        while let Some(next) = last.successor() {
            last = next;
        }
        self.move_to(tree, last.id())
    }

    fn walk<'a>(
        &mut self,
        tree: &'a MessageTree,
        mut steps: usize,
        filter: Option<&dyn NodeFilter>,
        step: impl Fn(&NodeRef<'a>) -> Option<NodeRef<'a>>,
    ) -> bool {
        let Some(mut node) = self.current(tree) else {
            return false;
        };
        while steps > 0 {
            let Some(next) = step(&node) else {
                return false;
            };
            node = next;
            if self.apply_filter(&node, filter) {
                steps -= 1;
            }
        }
        self.move_to(tree, node.id())
    }

    pub fn move_right(&mut self, tree: &MessageTree, steps: usize, filter: Option<&dyn NodeFilter>) -> bool {
        self.walk(tree, steps, filter, |n| n.next())
    }

    pub fn move_left(&mut self, tree: &MessageTree, steps: usize, filter: Option<&dyn NodeFilter>) -> bool {
        self.walk(tree, steps, filter, |n| n.previous())
    }

    pub fn move_up(&mut self, tree: &MessageTree, steps: usize, filter: Option<&dyn NodeFilter>) -> bool {
        self.walk(tree, steps, filter, |n| n.parent())
    }

    pub fn move_down(&mut self, tree: &MessageTree, steps: usize, filter: Option<&dyn NodeFilter>) -> bool {
        self.walk(tree, steps, filter, |n| n.first_child())
    }

    pub fn move_forward(&mut self, tree: &MessageTree, steps: usize, filter: Option<&dyn NodeFilter>) -> bool {
        self.walk(tree, steps, filter, |n| n.successor())
    }

    pub fn move_backward(&mut self, tree: &MessageTree, steps: usize, filter: Option<&dyn NodeFilter>) -> bool {
        self.walk(tree, steps, filter, |n| n.predecessor())
    }

    /// Position that edits may touch: set, existing and not the root.
    fn editable(&self, tree: &MessageTree) -> Option<NodeId> {
        self.position
            .filter(|&id| id != self.root && tree.contains(id))
    }

    /// Insert `insertion` before the current node and move onto it.
    pub fn do_insert(&mut self, tree: &mut MessageTree, insertion: NodeId) -> bool {
        let Some(current) = self.editable(tree) else {
            return false;
        };
        if !tree.insert(current, insertion) {
            return false;
        }
        self.set_to(tree, Some(insertion));
        true
    }

    /// Replace the current node by `replacement`, delete the old node and move onto
    /// the replacement.
    pub fn do_replace(&mut self, tree: &mut MessageTree, replacement: NodeId) -> bool {
        let Some(current) = self.editable(tree) else {
            return false;
        };
        if !tree.replace(current, replacement) {
            return false;
        }
        tree.delete(current);
        self.set_to(tree, Some(replacement));
        true
    }

    /// Truncate the current node to `len` bytes.
    pub fn do_truncate(&mut self, tree: &mut MessageTree, len: usize) -> Result<bool, TreeError> {
        let Some(current) = self.position.filter(|&id| tree.contains(id)) else {
            return Ok(false);
        };
        tree.truncate(current, len)?;
        Ok(true)
    }

    /// Detach the current node and move to its former parent. The detached node is
    /// handed back to the caller.
    pub fn do_remove(&mut self, tree: &mut MessageTree) -> Option<NodeId> {
        let current = self.editable(tree)?;
        let parent = tree.get(current).and_then(|n| n.parent()).map(|p| p.id());
        let removed = tree.remove(current)?;
        self.set_to(tree, parent);
        Some(removed)
    }

    /// Detach and delete the current node, moving to its former parent.
    pub fn do_delete(&mut self, tree: &mut MessageTree) -> bool {
        match self.do_remove(tree) {
            Some(removed) => tree.delete(removed),
            None => false,
        }
    }

    /// One line per scanned node: index, cursor mark and path. With `print_all`,
    /// nodes rejected by `filter` are listed too and the accepted ones are starred.
    pub fn render_scan(&self, tree: &MessageTree, filter: Option<&dyn NodeFilter>, print_all: bool) -> String {
        let nodes = self.scan(tree, None);
        let width = nodes.len().saturating_sub(1).to_string().len();
        let mut out = String::new();
        for (i, node) in nodes.iter().enumerate() {
            let passes = filter.map_or(true, |f| f.apply(node));
            if !print_all && !passes {
                continue;
            }
            let _ = write!(out, "{:>width$}: ", i, width = width);
            if self.position.is_some() {
                out.push_str(if self.position == Some(node.id()) { "=> " } else { "   " });
            }
            out.push_str(&node.path());
            if print_all && passes {
                out.push_str(" *");
            }
            out.push('\n');
        }
        out
    }
}
