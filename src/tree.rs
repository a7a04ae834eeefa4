//! The message tree arena, node handles and the navigation algebra.
//!
//! Every node of one document lives in a [`MessageTree`] and is addressed by a
//! generational [`NodeId`]. Links are plain handles: `next` and `child` own the
//! node they point to (deleting a node deletes its children and, for chains, the
//! nodes following it when asked to), while `parent` and `previous` are
//! back-references used for navigation only.
//!
//! Read access goes through [`NodeRef`], a cheap `Copy` view borrowed from the tree.
//! Mutation goes through `&mut MessageTree` methods (see `surgery.rs` and
//! `dissect.rs`).

use crate::body::{Field, Layout};
use crate::filter::{Anchor, Filter, Index, IndexedFilter, NodeFilter, NodePath, Segment, SyntaxError};
use crate::types::TypeDescriptor;
use std::fmt;

/// Handle of a node inside a [`MessageTree`]. Stale handles (of deleted nodes) are
/// never resolved again, even after the slot has been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Fatal errors of tree operations. Ordinary misses and refused surgery are not
/// errors: they come back as `None` / `false`.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),
    #[error("Layout of node {0} is already in use")]
    Busy(NodeId),
    #[error("Unsupported: {operation} on {kind} node")]
    Unsupported {
        operation: &'static str,
        kind: &'static str,
    },
    #[error("Inconsistency: {0}")]
    Inconsistency(String),
}

pub(crate) struct ContainerState {
    pub(crate) descriptor: &'static TypeDescriptor,
    /// Taken out while one of its hooks runs.
    pub(crate) layout: Option<Box<dyn Layout>>,
    pub(crate) expanded: bool,
    pub(crate) stalled: bool,
    pub(crate) auto_extend: bool,
    /// Index of the child currently receiving bytes.
    pub(crate) head: usize,
}

pub(crate) struct TerminalState {
    pub(crate) field: Box<dyn Field>,
    pub(crate) buffer: Vec<u8>,
}

pub(crate) enum Body {
    Container(ContainerState),
    Terminal(TerminalState),
}

pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) previous: Option<NodeId>,
    pub(crate) next: Option<NodeId>,
    pub(crate) child: Option<NodeId>,
    /// Declared size in bytes, `None` if not bounded.
    pub(crate) size: Option<usize>,
    /// Set when the node refused bytes that were offered inside its size window.
    pub(crate) overflow: bool,
    pub(crate) body: Body,
}

impl Node {
    fn new(name: &str, body: Body) -> Self {
        Node {
            name: name.to_string(),
            parent: None,
            previous: None,
            next: None,
            child: None,
            size: None,
            overflow: false,
            body,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self.body {
            Body::Container(_) => "container",
            Body::Terminal(_) => "terminal",
        }
    }
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena holding the nodes of one or more message trees.
#[derive(Default)]
pub struct MessageTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl fmt::Debug for MessageTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTree")
            .field("nodes", &self.live)
            .field("slots", &self.slots.len())
            .finish()
    }
}

impl MessageTree {
    pub fn new() -> Self {
        MessageTree::default()
    }

    /// Number of live nodes (all trees and detached nodes together).
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.node(id).map(|node| NodeRef {
            tree: self,
            id,
            node,
        })
    }

    /// Like [`MessageTree::get`], with a stale handle reported as an error.
    pub fn try_get(&self, id: NodeId) -> Result<NodeRef<'_>, TreeError> {
        self.get(id).ok_or(TreeError::UnknownNode(id))
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn try_node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.node_mut(id).ok_or(TreeError::UnknownNode(id))
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Free the slot of `id` without touching any links.
    pub(crate) fn release(&mut self, id: NodeId) -> Option<Node> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(node)
    }

    /// Create a detached terminal node.
    pub fn new_terminal(&mut self, name: &str, field: Box<dyn Field>) -> NodeId {
        self.alloc(Node::new(
            name,
            Body::Terminal(TerminalState {
                field,
                buffer: Vec::new(),
            }),
        ))
    }

    /// Create a detached, empty container node.
    pub fn new_container(&mut self, name: &str, layout: Box<dyn Layout>) -> NodeId {
        self.alloc(Node::new(
            name,
            Body::Container(ContainerState {
                descriptor: layout.descriptor(),
                layout: Some(layout),
                expanded: false,
                stalled: false,
                auto_extend: false,
                head: 0,
            }),
        ))
    }

    /// Fresh, undecoded node of the same kind as `id`, carrying its name and
    /// dissector settings but none of its content.
    pub fn new_instance(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let (name, size) = {
            let node = self.node(id).ok_or(TreeError::UnknownNode(id))?;
            (node.name.clone(), node.size)
        };
        let created = match &self.node(id).ok_or(TreeError::UnknownNode(id))?.body {
            Body::Terminal(t) => {
                let field = t.field.new_instance();
                self.new_terminal(&name, field)
            }
            Body::Container(c) => {
                let auto_extend = c.auto_extend;
                let layout = self.with_layout(id, |layout, tree| layout.new_instance(tree))?;
                let created = self.new_container(&name, layout);
                if let Some(Node {
                    body: Body::Container(c),
                    ..
                }) = self.node_mut(created)
                {
                    c.auto_extend = auto_extend;
                }
                created
            }
        };
        if let Some(node) = self.node_mut(created) {
            node.size = size;
        }
        Ok(created)
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.name = name.to_string();
                true
            }
            None => false,
        }
    }

    /// Downcast the field of a terminal node.
    pub fn field<T: Field>(&self, id: NodeId) -> Option<&T> {
        match &self.node(id)?.body {
            Body::Terminal(t) => t.field.as_any().downcast_ref::<T>(),
            Body::Container(_) => None,
        }
    }

    pub fn field_mut<T: Field>(&mut self, id: NodeId) -> Option<&mut T> {
        match &mut self.node_mut(id)?.body {
            Body::Terminal(t) => t.field.as_any_mut().downcast_mut::<T>(),
            Body::Container(_) => None,
        }
    }

    /// Downcast the layout of a container node (`None` while one of its hooks runs).
    pub fn layout<T: Layout>(&self, id: NodeId) -> Option<&T> {
        match &self.node(id)?.body {
            Body::Container(c) => c.layout.as_ref()?.as_any().downcast_ref::<T>(),
            Body::Terminal(_) => None,
        }
    }

    pub fn layout_mut<T: Layout>(&mut self, id: NodeId) -> Option<&mut T> {
        match &mut self.node_mut(id)?.body {
            Body::Container(c) => c.layout.as_mut()?.as_any_mut().downcast_mut::<T>(),
            Body::Terminal(_) => None,
        }
    }

    /// Run `f` with the layout of container `id` taken out of the tree, so that the
    /// hook can restructure the tree. Re-entering the same node is reported as
    /// [`TreeError::Busy`].
    pub(crate) fn with_layout<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn Layout, &mut MessageTree) -> Result<R, TreeError>,
    ) -> Result<R, TreeError> {
        let mut layout = match &mut self.try_node_mut(id)?.body {
            Body::Container(c) => c.layout.take().ok_or(TreeError::Busy(id))?,
            Body::Terminal(_) => {
                return Err(TreeError::Unsupported {
                    operation: "layout hook",
                    kind: "terminal",
                })
            }
        };
        let result = f(layout.as_mut(), self);
        match self.node_mut(id) {
            Some(Node {
                body: Body::Container(c),
                ..
            }) => c.layout = Some(layout),
            _ => {
                // The container went away while its hook ran.
                for owned in layout.owned_nodes() {
                    self.destroy(owned);
                }
            }
        }
        result
    }
}

/// Borrowed view on one node.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a MessageTree,
    id: NodeId,
    node: &'a Node,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.tree, other.tree)
    }
}

impl Eq for NodeRef<'_> {}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("name", &self.node.name)
            .field("type", &self.full_type())
            .finish()
    }
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'a MessageTree {
        self.tree
    }

    pub(crate) fn raw(&self) -> &'a Node {
        self.node
    }

    fn at(&self, id: Option<NodeId>) -> Option<NodeRef<'a>> {
        id.and_then(|id| self.tree.get(id))
    }

    // ---- identity ----

    pub fn name(&self) -> &'a str {
        &self.node.name
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        match &self.node.body {
            Body::Container(c) => c.descriptor,
            Body::Terminal(t) => t.field.descriptor(),
        }
    }

    pub fn static_type(&self) -> &'static str {
        self.descriptor().name()
    }

    /// Type refinement computed from the node's content; empty if there is none.
    pub fn dynamic_type(&self) -> String {
        match &self.node.body {
            Body::Container(c) => c
                .layout
                .as_ref()
                .map(|l| l.dynamic_type(self.tree, self.id))
                .unwrap_or_default(),
            Body::Terminal(t) => t.field.dynamic_type(),
        }
    }

    /// `static[:dynamic]`
    pub fn full_type(&self) -> String {
        let dynamic = self.dynamic_type();
        if dynamic.is_empty() {
            self.static_type().to_string()
        } else {
            format!("{}:{}", self.static_type(), dynamic)
        }
    }

    /// Human-readable summary of the node's decoded value.
    pub fn info(&self) -> String {
        match &self.node.body {
            Body::Container(c) => c
                .layout
                .as_ref()
                .map(|l| l.info(self.tree, self.id))
                .unwrap_or_default(),
            Body::Terminal(t) => t.field.info(&t.buffer),
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self.node.body, Body::Container(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.node.body, Body::Terminal(_))
    }

    pub fn field(&self) -> Option<&'a dyn Field> {
        match &self.node.body {
            Body::Terminal(t) => Some(t.field.as_ref()),
            Body::Container(_) => None,
        }
    }

    pub fn layout(&self) -> Option<&'a dyn Layout> {
        match &self.node.body {
            Body::Container(c) => c.layout.as_deref(),
            Body::Terminal(_) => None,
        }
    }

    /// Filter expression naming this node: `static[:dynamic]%name`.
    pub fn identifier(&self) -> String {
        self.identifier_with(true, true, true)
    }

    /// Filter expression built from the selected components only.
    pub fn identifier_with(&self, name: bool, static_type: bool, dynamic_type: bool) -> String {
        let mut identifier = String::new();
        let mut typed = static_type;
        if static_type {
            identifier.push_str(self.static_type());
        }
        if dynamic_type {
            let dynamic = self.dynamic_type();
            if !dynamic.is_empty() {
                identifier.push(':');
                identifier.push_str(&dynamic);
                typed = true;
            }
        }
        if typed {
            identifier.push('%');
        }
        if name {
            identifier.push_str(self.name());
        }
        identifier
    }

    /// Name plus `~k`, where `k` counts the previous siblings of the same name.
    /// Nameless nodes are always indexed (among all previous siblings).
    pub fn ref_name(&self) -> String {
        let name = self.name();
        let filter = Filter::by_name(name);
        let k = self.previous_siblings().filter(|n| filter.matches(n)).count();
        if k > 0 || name.is_empty() {
            format!("{}~{}", name, k)
        } else {
            name.to_string()
        }
    }

    /// Shortest identifier telling this node apart from the previous siblings.
    pub fn unique_identifier(&self) -> String {
        let name = self.name();
        let static_type = self.static_type();
        let dynamic_type = self.dynamic_type();

        let by_name_filter = Filter::by_name(name);
        let by_type_filter = Filter::new("", static_type, "");
        let by_full_type_filter = Filter::new("", static_type, &dynamic_type);
        let by_all_filter = Filter::new(name, static_type, &dynamic_type);

        let mut by_name = 0;
        let mut by_type = 0;
        let mut by_full_type = 0;
        let mut by_full_type_and_name = 0;
        for node in self.previous_siblings() {
            by_name += by_name_filter.matches(&node) as usize;
            by_type += by_type_filter.matches(&node) as usize;
            by_full_type += by_full_type_filter.matches(&node) as usize;
            by_full_type_and_name += by_all_filter.matches(&node) as usize;
        }

        let (mut id, index) = if by_full_type_and_name == 0 && by_full_type > 0 {
            (self.identifier_with(true, true, true), by_full_type_and_name)
        } else if by_full_type == 0 && by_type > 0 {
            (self.identifier_with(false, true, true), by_full_type)
        } else if by_type == 0 && by_name > 0 {
            (self.identifier_with(false, true, false), by_type)
        } else {
            (name.to_string(), by_name)
        };
        if index > 0 {
            id.push_str(&format!("~{}", index));
        }
        id
    }

    fn chained(&self, separator: &str, part: impl Fn(&NodeRef<'a>) -> String) -> String {
        let mut parts = vec![part(self)];
        let mut node = self.parent();
        while let Some(n) = node {
            parts.push(part(&n));
            node = n.parent();
        }
        parts.reverse();
        parts.join(separator)
    }

    /// Names from the root down to this node.
    pub fn chained_name(&self, separator: &str) -> String {
        self.chained(separator, |n| n.name().to_string())
    }

    pub fn chained_ref_name(&self, separator: &str) -> String {
        self.chained(separator, |n| n.ref_name())
    }

    pub fn chained_index(&self, separator: &str) -> String {
        self.chained(separator, |n| n.index_offset().to_string())
    }

    /// Absolute path (`//root/child~1/leaf`) that resolves back to this node.
    pub fn path(&self) -> String {
        format!("//{}", self.chained_ref_name("/"))
    }

    // ---- links ----

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.at(self.node.parent)
    }

    pub fn previous(&self) -> Option<NodeRef<'a>> {
        self.at(self.node.previous)
    }

    pub fn next(&self) -> Option<NodeRef<'a>> {
        self.at(self.node.next)
    }

    pub fn first_child(&self) -> Option<NodeRef<'a>> {
        self.at(self.node.child)
    }

    pub fn last_child(&self) -> Option<NodeRef<'a>> {
        self.first_child().map(|c| c.tail())
    }

    /// Child at `index` (0-based).
    pub fn child(&self, index: usize) -> Option<NodeRef<'a>> {
        self.children().nth(index)
    }

    pub fn has_parent(&self) -> bool {
        self.node.parent.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.node.previous.is_some()
    }

    pub fn has_next(&self) -> bool {
        self.node.next.is_some()
    }

    pub fn has_children(&self) -> bool {
        self.node.child.is_some()
    }

    /// Neither a parent nor a previous sibling.
    pub fn is_root(&self) -> bool {
        self.node.parent.is_none() && self.node.previous.is_none()
    }

    /// Top-most ancestor.
    pub fn root(&self) -> NodeRef<'a> {
        let mut root = *self;
        while let Some(parent) = root.parent() {
            root = parent;
        }
        root
    }

    /// First node of this node's sibling chain.
    pub fn head(&self) -> NodeRef<'a> {
        let mut head = *self;
        while let Some(previous) = head.previous() {
            head = previous;
        }
        head
    }

    /// Last node of this node's sibling chain.
    pub fn tail(&self) -> NodeRef<'a> {
        let mut tail = *self;
        while let Some(next) = tail.next() {
            tail = next;
        }
        tail
    }

    pub fn children(&self) -> Siblings<'a> {
        Siblings {
            node: self.first_child(),
        }
    }

    /// This node and the nodes following it in its chain.
    pub fn following(&self) -> Siblings<'a> {
        Siblings { node: Some(*self) }
    }

    fn previous_siblings(&self) -> impl Iterator<Item = NodeRef<'a>> {
        std::iter::successors(self.previous(), |n| n.previous())
    }

    // ---- traversal order ----

    /// Node emitted just before this one: the deepest last descendant of the
    /// previous sibling, else the previous sibling, else the parent.
    pub fn predecessor(&self) -> Option<NodeRef<'a>> {
        match self.previous() {
            Some(previous) => {
                let mut node = previous;
                while let Some(last) = node.last_child() {
                    node = last;
                }
                Some(node)
            }
            None => self.parent(),
        }
    }

    /// Node emitted just after this one: the first child, else the next sibling,
    /// else the next sibling of the nearest ancestor that has one.
    pub fn successor(&self) -> Option<NodeRef<'a>> {
        if let Some(child) = self.first_child() {
            return Some(child);
        }
        let mut node = *self;
        loop {
            if let Some(next) = node.next() {
                return Some(next);
            }
            node = node.parent()?;
        }
    }

    // ---- lookups ----

    /// Resolve an indexed filter expression against this node's sibling chain.
    /// Malformed expressions resolve to nothing.
    pub fn sibling(&self, expr: &str) -> Option<NodeRef<'a>> {
        self.try_sibling(expr).ok().flatten()
    }

    pub fn try_sibling(&self, expr: &str) -> Result<Option<NodeRef<'a>>, SyntaxError> {
        let expr = IndexedFilter::parse(expr)?;
        Ok(self.sibling_by(&expr))
    }

    pub fn sibling_by(&self, expr: &IndexedFilter) -> Option<NodeRef<'a>> {
        let filter = &expr.filter;
        match expr.index {
            Index::Unique => {
                let mut found = None;
                for node in self.head().following() {
                    if filter.matches(&node) {
                        if found.is_some() {
                            return None;
                        }
                        found = Some(node);
                    }
                }
                found
            }
            Index::Absolute {
                position,
                backwards: false,
            } => hop(Some(self.head()), position.checked_add(1)?, filter, false),
            Index::Absolute {
                position,
                backwards: true,
            } => hop(Some(self.tail()), position, filter, true),
            Index::Relative { offset, backwards } => {
                hop(Some(*self), offset.checked_add(1)?, filter, backwards)
            }
        }
    }

    /// Resolve an indexed filter expression among the children.
    pub fn child_by_name(&self, expr: &str) -> Option<NodeRef<'a>> {
        self.first_child()?.sibling(expr)
    }

    /// Closest previous sibling passing `filter`.
    pub fn previous_matching(&self, filter: &dyn NodeFilter) -> Option<NodeRef<'a>> {
        self.previous_siblings().find(|n| filter.apply(n))
    }

    /// Closest next sibling passing `filter`.
    pub fn next_matching(&self, filter: &dyn NodeFilter) -> Option<NodeRef<'a>> {
        std::iter::successors(self.next(), |n| n.next()).find(|n| filter.apply(n))
    }

    /// Sibling `index` hops away (negative: backwards). `neighbor(0)` is `None`.
    pub fn neighbor(&self, index: isize) -> Option<NodeRef<'a>> {
        if index == 0 {
            return None;
        }
        let mut node = *self;
        for _ in 0..index.unsigned_abs() {
            node = if index > 0 { node.next()? } else { node.previous()? };
        }
        Some(node)
    }

    /// Resolve a path. Malformed paths resolve to nothing.
    ///
    /// A lone `/` resolves to the root of this node's tree. A lone `//` names the
    /// virtual root above it, which is never a result, so it resolves to nothing.
    pub fn by_path(&self, path: &str) -> Option<NodeRef<'a>> {
        self.try_by_path(path).ok().flatten()
    }

    pub fn try_by_path(&self, path: &str) -> Result<Option<NodeRef<'a>>, SyntaxError> {
        let path = NodePath::parse(path)?;
        Ok(self.by_node_path(&path))
    }

    pub fn by_node_path(&self, path: &NodePath) -> Option<NodeRef<'a>> {
        let start = match path.anchor {
            Anchor::Relative => Location::Node(*self),
            Anchor::Root => Location::Node(self.root()),
            Anchor::VirtualRoot => Location::VirtualRoot(self.root()),
        };
        resolve(start, &path.segments)
    }

    // ---- counts and positions ----

    /// Number of nodes in this node's sibling chain.
    pub fn n_elements(&self) -> usize {
        self.index_offset() + self.following().count()
    }

    pub fn n_children(&self) -> usize {
        self.children().count()
    }

    /// Nodes in the subtree rooted here, this node included.
    pub fn n_nodes(&self) -> usize {
        1 + self.children().map(|c| c.n_nodes()).sum::<usize>()
    }

    /// Position in the sibling chain (0 for the head).
    pub fn index_offset(&self) -> usize {
        self.previous_siblings().count()
    }

    pub fn distance_to_root(&self) -> usize {
        std::iter::successors(self.parent(), |n| n.parent()).count()
    }

    /// Strict descendant test.
    pub fn is_descendant_of(&self, ancestor: NodeId) -> bool {
        std::iter::successors(self.parent(), |n| n.parent()).any(|n| n.id == ancestor)
    }

    /// Verify the link invariants over this node, the nodes following it and all
    /// their descendants.
    pub fn check_consistency(&self, print_errors: bool) -> bool {
        let mut consistent = true;
        for node in self.following() {
            if let Some(id) = node.node.next {
                match self.tree.node(id) {
                    Some(next) if next.previous != Some(node.id) => {
                        consistent = false;
                        report(print_errors, format!("Broken right back-reference of '{}'", node.chained_ref_name("/")));
                    }
                    Some(next) if next.parent != node.node.parent => {
                        consistent = false;
                        report(print_errors, format!("Mismatching parents in '{}'", node.chained_ref_name("/")));
                    }
                    Some(_) => {}
                    None => {
                        consistent = false;
                        report(print_errors, format!("Dangling next link of '{}'", node.chained_ref_name("/")));
                    }
                }
            }
            if let Some(id) = node.node.child {
                match self.tree.get(id) {
                    Some(child) => {
                        if child.node.previous.is_some() {
                            consistent = false;
                            report(print_errors, format!("Backward reference of child of '{}'", node.chained_ref_name("/")));
                        } else if child.node.parent != Some(node.id) {
                            consistent = false;
                            report(
                                print_errors,
                                format!(
                                    "Broken parent reference from '{}' to '{}'",
                                    child.chained_ref_name("/"),
                                    node.chained_ref_name("/")
                                ),
                            );
                        } else {
                            consistent &= child.check_consistency(print_errors);
                        }
                    }
                    None => {
                        consistent = false;
                        report(print_errors, format!("Dangling child link of '{}'", node.chained_ref_name("/")));
                    }
                }
            }
            if !consistent {
                break;
            }
        }
        consistent
    }
}

fn report(print_errors: bool, message: String) {
    if print_errors {
        log::error!("{}", message);
    }
}

/// Hop along a chain until `counter` matches have been seen.
fn hop<'a>(
    start: Option<NodeRef<'a>>,
    mut counter: usize,
    filter: &Filter,
    backwards: bool,
) -> Option<NodeRef<'a>> {
    if counter == 0 {
        return None;
    }
    let mut node = start;
    while let Some(n) = node {
        if filter.matches(&n) {
            counter -= 1;
            if counter == 0 {
                return Some(n);
            }
        }
        node = if backwards { n.previous() } else { n.next() };
    }
    None
}

/// Where path resolution currently stands.
#[derive(Clone, Copy)]
enum Location<'a> {
    Node(NodeRef<'a>),
    /// One level above the given root; never a result by itself.
    VirtualRoot(NodeRef<'a>),
}

fn resolve<'a>(at: Location<'a>, segments: &[Segment]) -> Option<NodeRef<'a>> {
    let Some((segment, rest)) = segments.split_first() else {
        return match at {
            Location::Node(node) => Some(node),
            Location::VirtualRoot(_) => None,
        };
    };
    match (segment, at) {
        (Segment::Current, _) => resolve(at, rest),
        (Segment::Parent, Location::Node(node)) => match node.parent() {
            Some(parent) => resolve(Location::Node(parent), rest),
            None => resolve(Location::VirtualRoot(node.root()), rest),
        },
        (Segment::Parent, Location::VirtualRoot(_)) => None,
        (Segment::Any | Segment::Deep | Segment::TypedWildcard(_), Location::Node(node)) => {
            for child in node.children() {
                if let Segment::TypedWildcard(filter) = segment {
                    if !filter.matches(&child) {
                        continue;
                    }
                }
                if rest.is_empty() {
                    return Some(child);
                }
                if let Some(found) = resolve(Location::Node(child), rest) {
                    return Some(found);
                }
            }
            if *segment == Segment::Deep {
                // Keep "**" and retry one level down.
                return node
                    .children()
                    .find_map(|child| resolve(Location::Node(child), segments));
            }
            None
        }
        (Segment::Deep, Location::VirtualRoot(root)) if !rest.is_empty() => {
            resolve(Location::Node(root), rest).or_else(|| resolve(Location::Node(root), segments))
        }
        (Segment::TypedWildcard(filter), Location::VirtualRoot(_)) if !filter.is_wildcard() => None,
        (Segment::Any | Segment::Deep | Segment::TypedWildcard(_), Location::VirtualRoot(root)) => {
            resolve(Location::Node(root), rest)
        }
        (Segment::Lookup(expr), Location::Node(node)) => {
            let child = node.first_child()?.sibling_by(expr)?;
            resolve(Location::Node(child), rest)
        }
        (Segment::Lookup(expr), Location::VirtualRoot(root)) => {
            let found = root
                .sibling_by(expr)
                .or_else(|| root.first_child().and_then(|c| c.sibling_by(expr)))?;
            resolve(Location::Node(found), rest)
        }
    }
}

/// Iterator over a sibling chain.
#[derive(Clone)]
pub struct Siblings<'a> {
    node: Option<NodeRef<'a>>,
}

impl<'a> Iterator for Siblings<'a> {
    type Item = NodeRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.node?;
        self.node = node.next();
        Some(node)
    }
}
