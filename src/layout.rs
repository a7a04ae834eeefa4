//! Container node kinds.
//!
//! Member and element templates are detached nodes kept in the same arena as the
//! container; the layout owns them and they are deleted with it.

use crate::body::{Expansion, Layout};
use crate::fields::{Endianness, Opaque};
use crate::tree::{MessageTree, NodeId, TreeError};
use crate::types::{TypeDescriptor, CONTAINER, LENGTH_PREFIXED, RECORD, SEQUENCE};
use log::{trace, warn};
use std::any::Any;

fn attach(tree: &mut MessageTree, node: NodeId, child: NodeId) -> Result<(), TreeError> {
    if tree.append_child(node, child) {
        Ok(())
    } else {
        tree.destroy(child);
        Err(TreeError::Inconsistency(format!(
            "cannot append child {} to {}",
            child, node
        )))
    }
}

/// Plain container: children are appended explicitly, nothing is materialised.
#[derive(Debug, Clone, Default)]
pub struct Container;

impl Layout for Container {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &CONTAINER
    }

    fn new_instance(&self, _tree: &mut MessageTree) -> Result<Box<dyn Layout>, TreeError> {
        Ok(Box::new(Container))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Homogeneous vector grown by cloning an element template, one element at a time,
/// while bytes keep coming. Bounded by an optional element count and by the size of
/// the node.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    template: Option<NodeId>,
    count: Option<usize>,
}

impl Sequence {
    pub fn new(template: Option<NodeId>, count: Option<usize>) -> Self {
        Sequence { template, count }
    }

    pub fn template(&self) -> Option<NodeId> {
        self.template
    }

    pub fn count(&self) -> Option<usize> {
        self.count
    }
}

impl Layout for Sequence {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &SEQUENCE
    }

    fn expand(
        &mut self,
        tree: &mut MessageTree,
        node: NodeId,
        progress: Expansion,
    ) -> Result<bool, TreeError> {
        if self.count.map_or(false, |count| progress.children >= count) {
            return Ok(true);
        }
        if progress.acceptance == Some(0) && !progress.ahead {
            return Ok(true);
        }
        if progress.ahead || progress.dry {
            return Ok(false);
        }
        let Some(template) = self.template else {
            return Ok(true);
        };
        let element = tree.clone_node(template)?;
        attach(tree, node, element)?;
        trace!("{} grew element {}", node, progress.children);
        Ok(false)
    }

    fn info(&self, tree: &MessageTree, node: NodeId) -> String {
        let n = tree.get(node).map_or(0, |n| n.n_children());
        match self.count {
            Some(count) => format!("{} of {} elements", n, count),
            None => format!("{} elements", n),
        }
    }

    fn new_instance(&self, tree: &mut MessageTree) -> Result<Box<dyn Layout>, TreeError> {
        let template = match self.template {
            Some(t) => Some(tree.clone_node(t)?),
            None => None,
        };
        Ok(Box::new(Sequence::new(template, self.count)))
    }

    fn owned_nodes(&self) -> Vec<NodeId> {
        self.template.into_iter().collect()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Member whose `UInt` value selects the dynamic type of a [`Record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discriminant {
    pub member: usize,
    pub types: Vec<(u64, String)>,
}

/// Fixed list of members, all materialised at once from their templates.
#[derive(Debug, Clone, Default)]
pub struct Record {
    members: Vec<NodeId>,
    discriminant: Option<Discriminant>,
}

impl Record {
    pub fn new(members: Vec<NodeId>) -> Self {
        Record {
            members,
            discriminant: None,
        }
    }

    pub fn with_discriminant(mut self, discriminant: Discriminant) -> Self {
        self.discriminant = Some(discriminant);
        self
    }

    pub fn members(&self) -> &[NodeId] {
        &self.members
    }
}

impl Layout for Record {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &RECORD
    }

    fn expand(
        &mut self,
        tree: &mut MessageTree,
        node: NodeId,
        progress: Expansion,
    ) -> Result<bool, TreeError> {
        if progress.children == 0 {
            for &member in &self.members {
                let child = tree.clone_node(member)?;
                attach(tree, node, child)?;
            }
        }
        Ok(true)
    }

    fn dynamic_type(&self, tree: &MessageTree, node: NodeId) -> String {
        let Some(discriminant) = &self.discriminant else {
            return String::new();
        };
        let value = tree
            .get(node)
            .and_then(|n| n.child(discriminant.member))
            .and_then(|member| tree.uint_value(member.id()));
        value
            .and_then(|v| discriminant.types.iter().find(|(k, _)| *k == v))
            .map(|(_, name)| name.clone())
            .unwrap_or_default()
    }

    fn new_instance(&self, tree: &mut MessageTree) -> Result<Box<dyn Layout>, TreeError> {
        let mut members = Vec::with_capacity(self.members.len());
        for &member in &self.members {
            members.push(tree.clone_node(member)?);
        }
        Ok(Box::new(Record {
            members,
            discriminant: self.discriminant.clone(),
        }))
    }

    fn owned_nodes(&self) -> Vec<NodeId> {
        self.members.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A `UInt` member named `length` followed by an `Opaque` member named `body`
/// holding that many bytes.
#[derive(Debug, Clone)]
pub struct LengthPrefixed {
    width: usize,
    endianness: Endianness,
}

impl LengthPrefixed {
    pub const LENGTH: &'static str = "length";
    pub const BODY: &'static str = "body";

    pub fn new(width: usize, endianness: Endianness) -> Self {
        LengthPrefixed { width, endianness }
    }
}

impl Layout for LengthPrefixed {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &LENGTH_PREFIXED
    }

    fn expand(
        &mut self,
        tree: &mut MessageTree,
        node: NodeId,
        progress: Expansion,
    ) -> Result<bool, TreeError> {
        match progress.children {
            0 => {
                let length = tree.new_uint(Self::LENGTH, self.width, self.endianness);
                attach(tree, node, length)?;
                Ok(false)
            }
            1 => {
                let value = tree
                    .get(node)
                    .and_then(|n| n.first_child())
                    .and_then(|length| tree.uint_value(length.id()));
                match value {
                    Some(value) => {
                        let capacity = usize::try_from(value).map_err(|_| {
                            TreeError::Inconsistency(format!("length {} out of range", value))
                        })?;
                        let body = tree.new_opaque(Self::BODY, Some(capacity));
                        attach(tree, node, body)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            _ => Ok(true),
        }
    }

    fn update_member(
        &mut self,
        tree: &mut MessageTree,
        node: NodeId,
        index: usize,
    ) -> Result<bool, TreeError> {
        if index != 0 {
            return Ok(true);
        }
        let Some((length, body, len)) = tree.get(node).and_then(|n| {
            let length = n.child(0)?;
            let body = length.next()?;
            Some((length.id(), body.id(), body.len()))
        }) else {
            return Ok(true);
        };
        if !tree.set_uint_value(length, len as u64) {
            return Ok(false);
        }
        if let Some(opaque) = tree.field_mut::<Opaque>(body) {
            opaque.set_capacity(Some(len));
        }
        Ok(true)
    }

    fn info(&self, tree: &MessageTree, node: NodeId) -> String {
        tree.get(node)
            .and_then(|n| n.first_child())
            .and_then(|length| tree.uint_value(length.id()))
            .map(|v| format!("length={}", v))
            .unwrap_or_default()
    }

    fn new_instance(&self, _tree: &mut MessageTree) -> Result<Box<dyn Layout>, TreeError> {
        Ok(Box::new(self.clone()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl MessageTree {
    /// Plain container without materialisation rules.
    pub fn new_group(&mut self, name: &str) -> NodeId {
        self.new_container(name, Box::new(Container))
    }

    /// True if `id` may be handed over to a layout: a detached root standing alone.
    fn is_free_template(&self, id: NodeId) -> bool {
        let free = self.get(id).map_or(false, |n| n.is_root() && !n.has_next());
        if !free {
            warn!("refusing template {}: not a detached root", id);
        }
        free
    }

    /// Sequence growing clones of `template`, which becomes owned by the sequence.
    /// A template that is not a detached root is left alone and the sequence
    /// starts without one.
    pub fn new_sequence(&mut self, name: &str, template: Option<NodeId>, count: Option<usize>) -> NodeId {
        let template = template.filter(|&t| self.is_free_template(t));
        self.new_container(name, Box::new(Sequence::new(template, count)))
    }

    /// Record built from member templates, which become owned by the record.
    /// Members that are not detached roots are skipped.
    pub fn new_record(&mut self, name: &str, members: Vec<NodeId>) -> NodeId {
        let members = members
            .into_iter()
            .filter(|&m| self.is_free_template(m))
            .collect();
        self.new_container(name, Box::new(Record::new(members)))
    }

    pub fn new_length_prefixed(&mut self, name: &str, width: usize, endianness: Endianness) -> NodeId {
        self.new_container(name, Box::new(LengthPrefixed::new(width, endianness)))
    }

    /// Swap the element template of sequence `id`; the previous template is deleted.
    /// False if `id` is not a sequence or `template` is not a detached root.
    pub fn set_element_template(&mut self, id: NodeId, template: Option<NodeId>) -> Result<bool, TreeError> {
        if let Some(t) = template {
            if t == id || !self.is_free_template(t) {
                return Ok(false);
            }
        }
        let previous = match self.layout_mut::<Sequence>(id) {
            Some(sequence) => std::mem::replace(&mut sequence.template, template),
            None => return Ok(false),
        };
        if let Some(previous) = previous {
            self.destroy(previous);
        }
        Ok(true)
    }

    /// Value of the `length` member of a length-prefixed node.
    pub fn length_of(&self, id: NodeId) -> Option<u64> {
        let length = self.get(id)?.child_by_name(LengthPrefixed::LENGTH)?;
        self.uint_value(length.id())
    }
}
