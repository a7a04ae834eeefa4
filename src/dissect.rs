//! Streaming decode and byte-level access.
//!
//! A node is fed with [`MessageTree::dissect`] from any [`ByteSource`]. The call
//! consumes what the node can take right now and returns; a later call with the
//! continuation of the stream resumes where the previous one stopped. Containers
//! materialise their children on demand through [`Layout::expand`] and forward the
//! bytes to the child at their dissection head.
//!
//! [`Layout::expand`]: crate::body::Layout::expand

use crate::body::Expansion;
use crate::fields::Opaque;
use crate::stream::{ByteSource, SliceReader, Window};
use crate::tree::{Body, MessageTree, NodeId, NodeRef, TreeError};
use log::{debug, trace, warn};
use std::io::Write;

/// Name given to the child that absorbs trailing bytes of an auto-extending container.
pub const OVERFLOW_NAME: &str = "__overflow";

impl<'a> NodeRef<'a> {
    /// Number of raw bytes held by this node (children included).
    pub fn len(&self) -> usize {
        match &self.raw().body {
            Body::Terminal(t) => t.buffer.len(),
            Body::Container(_) => self.children().map(|c| c.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Declared size, `None` when unbounded.
    pub fn size(&self) -> Option<usize> {
        self.raw().size
    }

    /// Bytes the node may still take according to its size.
    pub fn acceptance(&self) -> Option<usize> {
        self.size().map(|size| size.saturating_sub(self.len()))
    }

    fn body_accepting(&self) -> bool {
        match &self.raw().body {
            Body::Terminal(t) => match t.field.capacity() {
                Some(capacity) => t.buffer.len() < capacity,
                None => true,
            },
            Body::Container(c) => {
                if c.expanded {
                    self.children().any(|child| child.is_accepting())
                } else {
                    !c.stalled
                }
            }
        }
    }

    /// True while the node wants more bytes.
    pub fn is_accepting(&self) -> bool {
        self.acceptance() != Some(0) && self.body_accepting()
    }

    /// Number of leading children that are decoded.
    pub fn n_decoded(&self) -> usize {
        self.children().take_while(|c| c.is_decoded()).count()
    }

    pub fn is_decoded(&self) -> bool {
        if self.size() == Some(0) {
            return true;
        }
        match &self.raw().body {
            Body::Terminal(t) => t.field.is_decoded(&t.buffer, self.is_accepting()),
            Body::Container(c) => c.expanded && self.n_children() == self.n_decoded(),
        }
    }

    pub fn is_expanded(&self) -> bool {
        match &self.raw().body {
            Body::Container(c) => c.expanded,
            Body::Terminal(_) => true,
        }
    }

    pub fn is_stalled(&self) -> bool {
        matches!(&self.raw().body, Body::Container(c) if c.stalled)
    }

    pub fn auto_extend(&self) -> bool {
        matches!(&self.raw().body, Body::Container(c) if c.auto_extend)
    }

    /// Index of the child currently receiving bytes.
    pub fn dissection_head(&self) -> usize {
        match &self.raw().body {
            Body::Container(c) => c.head,
            Body::Terminal(_) => 0,
        }
    }

    /// The node refused bytes offered inside its size window, or it captured
    /// trailing bytes in an overflow child.
    pub fn has_overflow(&self) -> bool {
        self.raw().overflow
            || self
                .last_child()
                .map_or(false, |c| c.name() == OVERFLOW_NAME && !c.is_empty())
    }

    /// The node is done but holds fewer bytes than its size.
    pub fn has_underflow(&self) -> bool {
        match self.size() {
            Some(size) => !self.body_accepting() && self.len() < size,
            None => false,
        }
    }

    /// Bytes before this node in its sibling chain.
    pub fn data_offset(&self) -> usize {
        std::iter::successors(self.previous(), |n| n.previous())
            .map(|n| n.len())
            .sum()
    }

    /// Child holding byte `offset` of this node, with the offset inside that child.
    pub fn child_at_offset(&self, mut offset: usize) -> Option<(NodeRef<'a>, usize)> {
        for child in self.children() {
            let len = child.len();
            if offset < len {
                return Some((child, offset));
            }
            offset -= len;
        }
        None
    }

    pub fn byte_at(&self, offset: usize) -> Option<u8> {
        match &self.raw().body {
            Body::Terminal(t) => t.buffer.get(offset).copied(),
            Body::Container(_) => {
                let (child, offset) = self.child_at_offset(offset)?;
                child.byte_at(offset)
            }
        }
    }

    /// Raw bytes in serialisation order.
    pub fn raw_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        self.collect_bytes(&mut out);
        out
    }

    fn collect_bytes(&self, out: &mut Vec<u8>) {
        match &self.raw().body {
            Body::Terminal(t) => out.extend_from_slice(&t.buffer),
            Body::Container(_) => {
                for child in self.children() {
                    child.collect_bytes(out);
                }
            }
        }
    }

    /// Write the raw bytes to `writer`; returns the number written.
    pub fn copy_to(&self, writer: &mut dyn Write) -> Result<usize, TreeError> {
        match &self.raw().body {
            Body::Terminal(t) => {
                writer.write_all(&t.buffer)?;
                Ok(t.buffer.len())
            }
            Body::Container(_) => {
                let mut n = 0;
                for child in self.children() {
                    n += child.copy_to(writer)?;
                }
                Ok(n)
            }
        }
    }
}

impl MessageTree {
    /// Feed `id` from `reader`. Returns the number of bytes consumed.
    pub fn dissect(&mut self, id: NodeId, reader: &mut dyn ByteSource) -> Result<usize, TreeError> {
        let acceptance = self.try_get(id)?.acceptance();
        let mut window = Window::new(reader, acceptance);
        let consumed = if self.try_get(id)?.is_terminal() {
            self.dissect_terminal(id, &mut window)?
        } else {
            self.dissect_container(id, &mut window)?
        };
        if acceptance.is_some() && matches!(window.remaining(), Some(r) if r > 0) {
            let stopped = !self.try_get(id)?.body_accepting();
            if stopped {
                debug!("{} refused bytes inside its size window", id);
                self.try_node_mut(id)?.overflow = true;
            }
        }
        Ok(consumed)
    }

    /// Dissect a complete byte slice.
    pub fn dissect_bytes(&mut self, id: NodeId, data: &[u8]) -> Result<usize, TreeError> {
        let mut reader = SliceReader::new(data);
        self.dissect(id, &mut reader)
    }

    fn dissect_terminal(&mut self, id: NodeId, reader: &mut dyn ByteSource) -> Result<usize, TreeError> {
        let Body::Terminal(t) = &mut self.try_node_mut(id)?.body else {
            return Ok(0);
        };
        let capacity = t.field.capacity();
        let room = capacity.map_or(usize::MAX, |c| c.saturating_sub(t.buffer.len()));
        let n = reader.consume(room, &mut t.buffer);
        if n > 0 && capacity == Some(t.buffer.len()) {
            if t.field.decode(&t.buffer) {
                trace!("{} filled with {} bytes and decoded", id, t.buffer.len());
            } else {
                debug!("{} filled with {} bytes but failed to decode", id, t.buffer.len());
            }
        }
        Ok(n)
    }

    fn dissect_container(&mut self, id: NodeId, reader: &mut dyn ByteSource) -> Result<usize, TreeError> {
        self.expand(id, reader.is_empty())?;

        let mut consumed = 0;
        let mut unit = {
            let node = self.try_get(id)?;
            node.child(node.dissection_head()).map(|c| c.id())
        };

        while !reader.is_empty() {
            let Some(current) = unit else {
                break;
            };
            let mut n = 0;
            if self.try_get(current)?.is_accepting() {
                n = self.dissect(current, reader)?;
                consumed += n;
            }
            let goto_next = !self.try_get(current)?.is_accepting();
            if goto_next {
                if let Body::Container(c) = &mut self.try_node_mut(id)?.body {
                    c.head += 1;
                }
            }
            self.expand(id, reader.is_empty())?;
            if goto_next {
                unit = self.node(current).and_then(|c| c.next);
            } else if n == 0 {
                // Nothing more to take right now.
                break;
            }
        }

        let node = self.try_get(id)?;
        let acceptance = node.acceptance();
        if unit.is_none() && node.auto_extend() && acceptance.map_or(false, |a| a > 0) {
            let remaining = reader.remaining();
            if remaining != Some(0) {
                let capacity = remaining.or(acceptance);
                let overflow = self.new_terminal(OVERFLOW_NAME, Box::new(Opaque::new(capacity)));
                let n = self.dissect(overflow, reader)?;
                debug!("{} captured {} trailing bytes in {}", id, n, OVERFLOW_NAME);
                consumed += n;
                if !self.append_child(id, overflow) {
                    self.destroy(overflow);
                    return Err(TreeError::Inconsistency(format!(
                        "cannot attach overflow child to {}",
                        id
                    )));
                }
            }
        }

        Ok(consumed)
    }

    /// Let the layout of container `id` materialise further children. Returns true
    /// once the container is fully expanded; terminals are always expanded.
    pub fn expand(&mut self, id: NodeId, dry: bool) -> Result<bool, TreeError> {
        let node = self.try_get(id)?;
        let head = match &node.raw().body {
            Body::Container(c) if c.expanded => return Ok(true),
            Body::Container(c) => c.head,
            Body::Terminal(_) => return Ok(true),
        };
        let children = node.n_children();
        let decoded = node.n_decoded();
        let progress = Expansion {
            children,
            decoded,
            dry,
            ahead: head < children,
            acceptance: node.acceptance(),
        };
        let expanded = self.with_layout(id, |layout, tree| layout.expand(tree, id, progress))?;
        if let Body::Container(c) = &mut self.try_node_mut(id)?.body {
            c.expanded = expanded;
            c.stalled = head > decoded;
        }
        Ok(expanded)
    }

    pub fn set_size(&mut self, id: NodeId, size: Option<usize>) -> bool {
        match self.node_mut(id) {
            Some(node) => {
                node.size = size;
                true
            }
            None => false,
        }
    }

    /// Capture trailing bytes inside the size window in an overflow child.
    pub fn set_auto_extend(&mut self, id: NodeId, auto_extend: bool) -> bool {
        match self.node_mut(id).map(|n| &mut n.body) {
            Some(Body::Container(c)) => {
                c.auto_extend = auto_extend;
                true
            }
            _ => false,
        }
    }

    /// Forget all decoded content: terminals drop their bytes, containers their
    /// children. Declared sizes are kept.
    pub fn reset(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.try_node_mut(id)?;
        node.overflow = false;
        let container = match &mut node.body {
            Body::Terminal(t) => {
                t.buffer.clear();
                t.field.reset();
                false
            }
            Body::Container(c) => {
                c.expanded = false;
                c.stalled = false;
                c.head = 0;
                if let Some(layout) = c.layout.as_mut() {
                    layout.reset();
                }
                true
            }
        };
        if container {
            self.delete_children(id, 0);
        }
        Ok(())
    }

    /// Dissect the node again from a copy of its own raw bytes.
    pub fn redissect(&mut self, id: NodeId) -> Result<usize, TreeError> {
        let raw = self.try_get(id)?.raw_bytes();
        self.reset(id)?;
        self.dissect_bytes(id, &raw)
    }

    /// New detached node of the same kind, dissected from a copy of `id`'s bytes.
    pub fn clone_node(&mut self, id: NodeId) -> Result<NodeId, TreeError> {
        let raw = self.try_get(id)?.raw_bytes();
        let copy = self.new_instance(id)?;
        self.dissect_bytes(copy, &raw)?;
        Ok(copy)
    }

    /// Recompute derived members (lengths, counts) from the children, tail to head.
    /// Returns false as soon as one member cannot be repaired.
    pub fn repair(&mut self, id: NodeId, recursive: bool) -> Result<bool, TreeError> {
        let node = self.try_get(id)?;
        if node.is_terminal() {
            return Ok(true);
        }
        let mut index = node.n_children();
        let mut child = node.last_child().map(|c| c.id());
        while let Some(current) = child {
            if index == 0 {
                return Err(TreeError::Inconsistency(format!(
                    "{} has more children than counted",
                    id
                )));
            }
            index -= 1;
            if recursive && !self.repair(current, true)? {
                return Ok(false);
            }
            if !self.with_layout(id, |layout, tree| layout.update_member(tree, id, index))? {
                warn!("{}: cannot repair member {}", id, index);
                return Ok(false);
            }
            child = self.node(current).and_then(|c| c.previous);
        }
        if index != 0 {
            return Err(TreeError::Inconsistency(format!(
                "{} lost {} children while repairing",
                id, index
            )));
        }
        Ok(true)
    }

    /// Overwrite one byte of a terminal. False if `offset` is out of range.
    pub fn set_byte(&mut self, id: NodeId, offset: usize, byte: u8) -> Result<bool, TreeError> {
        let t = self.terminal_mut(id, "set_byte")?;
        match t.buffer.get_mut(offset) {
            Some(b) => {
                *b = byte;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Append one byte to a terminal. False if it is full.
    pub fn append_byte(&mut self, id: NodeId, byte: u8) -> Result<bool, TreeError> {
        let t = self.terminal_mut(id, "append_byte")?;
        if t.field.capacity().map_or(false, |c| t.buffer.len() >= c) {
            return Ok(false);
        }
        t.buffer.push(byte);
        Ok(true)
    }

    /// Drop the bytes of a terminal.
    pub fn clear(&mut self, id: NodeId) -> Result<(), TreeError> {
        self.terminal_mut(id, "clear")?.buffer.clear();
        Ok(())
    }

    /// Zero every byte below `id`.
    pub fn zero(&mut self, id: NodeId) -> Result<(), TreeError> {
        let children: Vec<NodeId> = self.try_get(id)?.children().map(|c| c.id()).collect();
        if let Body::Terminal(t) = &mut self.try_node_mut(id)?.body {
            t.buffer.iter_mut().for_each(|b| *b = 0);
        }
        for child in children {
            self.zero(child)?;
        }
        Ok(())
    }

    /// Cut the node down to `len` bytes. Containers truncate the child holding the
    /// cut and delete the children after it.
    pub fn truncate(&mut self, id: NodeId, len: usize) -> Result<(), TreeError> {
        let node = self.try_get(id)?;
        if node.is_terminal() {
            if let Body::Terminal(t) = &mut self.try_node_mut(id)?.body {
                t.buffer.truncate(len);
                if t.field.capacity().map_or(false, |c| t.buffer.len() < c) {
                    t.field.reset();
                }
            }
            return Ok(());
        }
        let Some((unit, offset)) = node.child_at_offset(len).map(|(c, o)| (c.id(), o)) else {
            return Ok(());
        };
        let mut index = self.try_get(unit)?.index_offset();
        if offset != 0 {
            self.truncate(unit, offset)?;
            index += 1;
        }
        self.delete_children(id, index);
        Ok(())
    }

    /// Write decoded values back into the raw bytes. False if any field refuses or
    /// a terminal holds fewer bytes than its capacity.
    pub fn encode(&mut self, id: NodeId) -> Result<bool, TreeError> {
        let children: Vec<NodeId> = self.try_get(id)?.children().map(|c| c.id()).collect();
        if let Body::Terminal(t) = &mut self.try_node_mut(id)?.body {
            if t.field.capacity().map_or(false, |c| t.buffer.len() < c) {
                return Ok(false);
            }
            return Ok(t.field.encode(&mut t.buffer));
        }
        let mut encoded = true;
        for child in children {
            encoded &= self.encode(child)?;
        }
        Ok(encoded)
    }

    pub(crate) fn terminal_mut(
        &mut self,
        id: NodeId,
        operation: &'static str,
    ) -> Result<&mut crate::tree::TerminalState, TreeError> {
        let node = self.try_node_mut(id)?;
        let kind = node.kind();
        match &mut node.body {
            Body::Terminal(t) => Ok(t),
            Body::Container(_) => Err(TreeError::Unsupported { operation, kind }),
        }
    }
}
