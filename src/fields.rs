//! Terminal node kinds: raw bytes and fixed-width unsigned integers.

use crate::body::Field;
use crate::tree::{MessageTree, NodeId};
use crate::types::{TypeDescriptor, OPAQUE, UINT};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::any::Any;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Uninterpreted bytes, decoded once the node stops accepting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opaque {
    capacity: Option<usize>,
}

impl Opaque {
    pub fn new(capacity: Option<usize>) -> Self {
        Opaque { capacity }
    }

    pub fn set_capacity(&mut self, capacity: Option<usize>) {
        self.capacity = capacity;
    }
}

impl Field for Opaque {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &OPAQUE
    }

    fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    fn decode(&mut self, _raw: &[u8]) -> bool {
        true
    }

    fn is_decoded(&self, _raw: &[u8], accepting: bool) -> bool {
        !accepting
    }

    fn new_instance(&self) -> Box<dyn Field> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Unsigned integer of 1 to 8 bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UInt {
    width: usize,
    endianness: Endianness,
    value: Option<u64>,
}

impl UInt {
    /// `width` is clamped to 1..=8 bytes.
    pub fn new(width: usize, endianness: Endianness) -> Self {
        UInt {
            width: width.clamp(1, 8),
            endianness,
            value: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Decoded (or assigned) value.
    pub fn value(&self) -> Option<u64> {
        self.value
    }

    /// Largest value the width can hold.
    pub fn max_value(&self) -> u64 {
        if self.width >= 8 {
            u64::MAX
        } else {
            (1u64 << (8 * self.width)) - 1
        }
    }

    /// Assign a value; false if it does not fit the width. Call
    /// [`MessageTree::encode`] to write it to the raw bytes.
    pub fn set_value(&mut self, value: u64) -> bool {
        if value > self.max_value() {
            return false;
        }
        self.value = Some(value);
        true
    }
}

impl Field for UInt {
    fn descriptor(&self) -> &'static TypeDescriptor {
        &UINT
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.width)
    }

    fn decode(&mut self, raw: &[u8]) -> bool {
        if raw.len() != self.width {
            return false;
        }
        self.value = Some(match self.endianness {
            Endianness::Big => BigEndian::read_uint(raw, self.width),
            Endianness::Little => LittleEndian::read_uint(raw, self.width),
        });
        true
    }

    fn encode(&self, raw: &mut [u8]) -> bool {
        let Some(value) = self.value else {
            return false;
        };
        if raw.len() != self.width || value > self.max_value() {
            return false;
        }
        match self.endianness {
            Endianness::Big => BigEndian::write_uint(raw, value, self.width),
            Endianness::Little => LittleEndian::write_uint(raw, value, self.width),
        }
        true
    }

    fn is_decoded(&self, _raw: &[u8], _accepting: bool) -> bool {
        self.value.is_some()
    }

    fn info(&self, _raw: &[u8]) -> String {
        self.value
            .map(|v| format!("{} (0x{:X})", v, v))
            .unwrap_or_default()
    }

    fn reset(&mut self) {
        self.value = None;
    }

    fn new_instance(&self) -> Box<dyn Field> {
        Box::new(UInt::new(self.width, self.endianness))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl MessageTree {
    pub fn new_opaque(&mut self, name: &str, capacity: Option<usize>) -> NodeId {
        self.new_terminal(name, Box::new(Opaque::new(capacity)))
    }

    pub fn new_uint(&mut self, name: &str, width: usize, endianness: Endianness) -> NodeId {
        self.new_terminal(name, Box::new(UInt::new(width, endianness)))
    }

    /// Value of a decoded `UInt` node.
    pub fn uint_value(&self, id: NodeId) -> Option<u64> {
        self.field::<UInt>(id)?.value()
    }

    /// Assign and encode the value of a `UInt` node. False if `id` is not a `UInt`
    /// or the value does not fit.
    pub fn set_uint_value(&mut self, id: NodeId, value: u64) -> bool {
        if !self.field_mut::<UInt>(id).map_or(false, |f| f.set_value(value)) {
            return false;
        }
        // an assigned value covers the full width
        let Ok(t) = self.terminal_mut(id, "set_uint_value") else {
            return false;
        };
        if let Some(capacity) = t.field.capacity() {
            t.buffer.resize(capacity, 0);
        }
        self.encode(id).unwrap_or(false)
    }
}
