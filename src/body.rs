//! Hooks implemented by node kinds.
//!
//! A terminal node carries a [`Field`]: it owns the decoded view of the node's raw
//! buffer. A container node carries a [`Layout`]: it decides which children to
//! materialise while bytes stream in, and how to recompute derived members when
//! the tree has been edited. Default methods give the plain behaviour, so a kind
//! only overrides what it needs.

use crate::tree::{MessageTree, NodeId, TreeError};
use crate::types::TypeDescriptor;
use std::any::Any;
use std::fmt;

/// Decode/encode hooks of a terminal node.
pub trait Field: fmt::Debug + Any {
    /// Static type of the node.
    fn descriptor(&self) -> &'static TypeDescriptor;

    /// Declared buffer capacity in bytes; `None` means unbounded.
    fn capacity(&self) -> Option<usize>;

    /// Called once, when the raw buffer has just been filled to its capacity.
    fn decode(&mut self, raw: &[u8]) -> bool;

    /// Write the field's value back into its raw buffer.
    fn encode(&self, _raw: &mut [u8]) -> bool {
        true
    }

    /// Whether the buffer content has been decoded.
    fn is_decoded(&self, raw: &[u8], accepting: bool) -> bool;

    fn dynamic_type(&self) -> String {
        String::new()
    }

    /// Human-readable summary of the decoded value.
    fn info(&self, _raw: &[u8]) -> String {
        String::new()
    }

    /// Forget any decoded state (the buffer itself is cleared by the tree).
    fn reset(&mut self) {}

    /// Fresh, undecoded field of the same kind and capacity.
    fn new_instance(&self) -> Box<dyn Field>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Decode progress handed to [`Layout::expand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expansion {
    /// Children currently materialised.
    pub children: usize,
    /// Leading children that are fully decoded.
    pub decoded: usize,
    /// True when the byte source has run dry for now.
    pub dry: bool,
    /// True when the dissection head still points at an existing child.
    pub ahead: bool,
    /// Bytes the container may still take, `None` if unbounded.
    pub acceptance: Option<usize>,
}

/// Structural hooks of a container node.
pub trait Layout: fmt::Debug + Any {
    fn descriptor(&self) -> &'static TypeDescriptor;

    /// Materialise further children of `node`. Returns true once no more children
    /// will ever be added.
    fn expand(
        &mut self,
        _tree: &mut MessageTree,
        _node: NodeId,
        _progress: Expansion,
    ) -> Result<bool, TreeError> {
        Ok(true)
    }

    /// Recompute whatever member `index` derives from the current children
    /// (lengths, counts). Returns false if that is impossible.
    fn update_member(
        &mut self,
        _tree: &mut MessageTree,
        _node: NodeId,
        _index: usize,
    ) -> Result<bool, TreeError> {
        Ok(true)
    }

    fn dynamic_type(&self, _tree: &MessageTree, _node: NodeId) -> String {
        String::new()
    }

    fn info(&self, _tree: &MessageTree, _node: NodeId) -> String {
        String::new()
    }

    /// Forget layout state; children are deleted by the tree.
    fn reset(&mut self) {}

    /// Fresh layout of the same kind, with copies of any templates it owns.
    fn new_instance(&self, tree: &mut MessageTree) -> Result<Box<dyn Layout>, TreeError>;

    /// Detached nodes owned by the layout (templates), destroyed with the container.
    fn owned_nodes(&self) -> Vec<NodeId> {
        Vec::new()
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}
