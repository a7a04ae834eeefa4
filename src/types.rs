//! Runtime type descriptors for node classes and the registry that resolves them.
//!
//! Every node kind publishes one `'static` [`TypeDescriptor`]. Descriptors form a
//! single-inheritance chain through their `base` link and compare by identity, so
//! two descriptors with the same name are still different types.
//!
//! The [`TypeRegistry`] is an explicit value: build it once at startup (usually via
//! [`TypeRegistry::with_builtins`]), register protocol-specific descriptors, then
//! share it by reference.

use std::fmt;

/// Static description of a node class.
#[derive(Debug)]
pub struct TypeDescriptor {
    id: usize,
    name: &'static str,
    base: Option<&'static TypeDescriptor>,
}

impl TypeDescriptor {
    /// Descriptor without a base type.
    pub const fn new(id: usize, name: &'static str) -> Self {
        TypeDescriptor { id, name, base: None }
    }

    /// Descriptor deriving from `base`.
    pub const fn derived(base: &'static TypeDescriptor, id: usize, name: &'static str) -> Self {
        TypeDescriptor {
            id,
            name,
            base: Some(base),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn base(&self) -> Option<&'static TypeDescriptor> {
        self.base
    }

    /// True if `other` appears somewhere on this descriptor's base chain (not counting itself).
    pub fn inherits_from(&self, other: &TypeDescriptor) -> bool {
        let mut ty = self.base;
        while let Some(t) = ty {
            if t == other {
                return true;
            }
            ty = t.base;
        }
        false
    }

    /// True if this descriptor is `other` or inherits from it.
    pub fn contains(&self, other: &TypeDescriptor) -> bool {
        self == other || self.inherits_from(other)
    }

    /// Base chain from the top-most ancestor down to this type, `/`-separated.
    pub fn type_inheritance(&self) -> String {
        let mut chain = vec![self.name];
        let mut ty = self.base;
        while let Some(t) = ty {
            chain.push(t.name);
            ty = t.base;
        }
        chain.reverse();
        chain.join("/")
    }

    /// Register this descriptor in `registry`. Returns false on a duplicate id or name.
    pub fn register(&'static self, registry: &mut TypeRegistry) -> bool {
        registry.add(self)
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub static NODE: TypeDescriptor = TypeDescriptor::new(0, "Node");
pub static CONTAINER: TypeDescriptor = TypeDescriptor::derived(&NODE, 1, "Container");
pub static TERMINAL: TypeDescriptor = TypeDescriptor::derived(&NODE, 2, "Terminal");
pub static OPAQUE: TypeDescriptor = TypeDescriptor::derived(&TERMINAL, 3, "Opaque");
pub static UINT: TypeDescriptor = TypeDescriptor::derived(&TERMINAL, 4, "UInt");
pub static SEQUENCE: TypeDescriptor = TypeDescriptor::derived(&CONTAINER, 5, "Sequence");
pub static RECORD: TypeDescriptor = TypeDescriptor::derived(&CONTAINER, 6, "Record");
pub static LENGTH_PREFIXED: TypeDescriptor =
    TypeDescriptor::derived(&CONTAINER, 7, "LengthPrefixed");

/// Append-only collection of descriptors, unique by id and by name.
#[derive(Debug, Default, Clone)]
pub struct TypeRegistry {
    registry: Vec<&'static TypeDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry::default()
    }

    /// Registry holding the descriptors of all node kinds shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = TypeRegistry::new();
        for desc in [
            &NODE,
            &CONTAINER,
            &TERMINAL,
            &OPAQUE,
            &UINT,
            &SEQUENCE,
            &RECORD,
            &LENGTH_PREFIXED,
        ] {
            registry.add(desc);
        }
        registry
    }

    /// Add a descriptor. Rejects (returns false) a duplicate id or a duplicate name.
    pub fn add(&mut self, desc: &'static TypeDescriptor) -> bool {
        if self.find_by_id(desc.id()).is_some() || self.find_by_name(desc.name()).is_some() {
            return false;
        }
        self.registry.push(desc);
        true
    }

    pub fn find_by_name(&self, name: &str) -> Option<&'static TypeDescriptor> {
        self.registry.iter().copied().find(|d| d.name() == name)
    }

    pub fn find_by_id(&self, id: usize) -> Option<&'static TypeDescriptor> {
        self.registry.iter().copied().find(|d| d.id() == id)
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static TypeDescriptor> + '_ {
        self.registry.iter().copied()
    }
}

impl fmt::Display for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for desc in &self.registry {
            write!(f, "[{:5}] {}", desc.id(), desc.name())?;
            if let Some(base) = desc.base() {
                write!(f, " ==> {}", base.name())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
