//! # msgtree: navigable, editable message trees for binary protocols
//!
//! A framework for dissecting binary protocol messages field by field while bytes
//! stream in, navigating the resulting tree with filter and path expressions, and
//! restructuring it (insert, replace, remove, truncate) before serialising it again.
//! The typical users are protocol fuzzers and interactive protocol editors.
//!
//! ## Building blocks
//!
//! - **Arena**: [`MessageTree`] owns every node; nodes are addressed by [`NodeId`]
//!   handles and read through [`NodeRef`] views
//! - **Node kinds**: terminals carry a [`Field`] over a raw byte buffer ([`Opaque`],
//!   [`UInt`]); containers carry a [`Layout`] that materialises children on demand
//!   ([`Container`], [`Sequence`], [`Record`], [`LengthPrefixed`])
//! - **Streaming decode**: [`MessageTree::dissect`] feeds any [`ByteSource`] and may be
//!   resumed with the continuation of the stream
//! - **Navigation**: filter expressions `[[static][:dynamic]%][name]`, indexed filter
//!   expressions `filter~N`, `filter~-N`, `filter~rN`, `filter~!` and paths such as
//!   `/record/length`, `//**/body` or `../UInt%~1`
//! - **Cursor**: [`Cursor`] moves through one subtree under a filter and edits it
//! - **Sampling**: [`DecisionReader`] draws uniform, geometric and custom-distributed
//!   integers from an [`EntropySource`]
//!
//! ## Example
//!
//! ```
//! use msgtree::{Endianness, MessageTree};
//!
//! let mut tree = MessageTree::new();
//! let record = tree.new_length_prefixed("record", 1, Endianness::Big);
//! tree.dissect_bytes(record, &[3, b'a', b'b', b'c']).unwrap();
//!
//! let node = tree.get(record).unwrap();
//! assert!(node.is_decoded());
//! let body = node.by_path("body").unwrap();
//! assert_eq!(body.raw_bytes(), b"abc");
//! assert_eq!(body.path(), "//record/body");
//! ```

pub mod body;
pub mod cursor;
pub mod dissect;
pub mod dump;
pub mod fields;
pub mod filter;
pub mod layout;
pub mod sampler;
pub mod stream;
pub mod surgery;
pub mod tree;
pub mod types;

pub use body::{Expansion, Field, Layout};
pub use cursor::Cursor;
pub use dissect::OVERFLOW_NAME;
pub use fields::{Endianness, Opaque, UInt};
pub use filter::{Anchor, Filter, Index, IndexedFilter, NodeFilter, NodePath, Segment, SyntaxError};
pub use layout::{Container, Discriminant, LengthPrefixed, Record, Sequence};
pub use sampler::{BitReader, DecisionReader, EntropySource, IoEntropy, SamplerError};
pub use stream::{ByteSource, SliceReader, Window};
pub use tree::{MessageTree, NodeId, NodeRef, Siblings, TreeError};
pub use types::{TypeDescriptor, TypeRegistry};
