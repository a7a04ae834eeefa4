//! Filter expressions, indexed filter expressions and paths, parsed with PEST.
//!
//! ## Syntax
//!
//! - **Filter**: `[[static_type][:dynamic_type]%][name]`. Omitted parts match anything:
//!   `length` selects nodes named `length`, `UInt%` selects nodes of static type `UInt`,
//!   `Extension:heartbeat%` selects `Extension` nodes whose dynamic type is `heartbeat`.
//! - **Indexed filter**: a filter followed by `~N` (N-th match from the head of the
//!   sibling chain, 0-based), `~-N` (N-th match counting back from the tail, `~-1` is
//!   the last one), `~rN` / `~r-N` (relative to the node the lookup starts from),
//!   `~!` (the one and only match) or a bare `~` (same as `~0`).
//! - **Path**: `/`-separated segments. One leading `/` anchors at the tree root, two or
//!   more anchor at a virtual root one level above it. Segments are `.`, `..`, `*`
//!   (one node), `**` (one or more nodes), `filter~*` (first child matching the
//!   filter) or an indexed filter selecting a child.

use crate::tree::NodeRef;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::fmt;
use std::str::FromStr;

#[derive(PestParser)]
#[grammar = "path.pest"]
struct SelectorParser;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyntaxError {
    #[error("Empty expression")]
    Empty,
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Index out of range: {0}")]
    Index(String),
}

/// Anything that can accept or reject a node.
pub trait NodeFilter {
    fn apply(&self, node: &NodeRef<'_>) -> bool;
}

impl<F> NodeFilter for F
where
    F: Fn(&NodeRef<'_>) -> bool,
{
    fn apply(&self, node: &NodeRef<'_>) -> bool {
        self(node)
    }
}

/// Parsed filter expression. Empty components act as wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub name: String,
    pub static_type: String,
    pub dynamic_type: String,
}

impl Filter {
    pub fn parse(expr: &str) -> Result<Filter, SyntaxError> {
        let pair = parse_rule(Rule::filter_expr, expr)?;
        Ok(pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::filter)
            .map(build_filter)
            .unwrap_or_default())
    }

    /// Filter on the name only. The name is taken literally, it is not parsed.
    pub fn by_name(name: &str) -> Self {
        Filter {
            name: name.to_string(),
            ..Filter::default()
        }
    }

    pub fn new(name: &str, static_type: &str, dynamic_type: &str) -> Self {
        Filter {
            name: name.to_string(),
            static_type: static_type.to_string(),
            dynamic_type: dynamic_type.to_string(),
        }
    }

    /// True if the filter selects every node.
    pub fn is_wildcard(&self) -> bool {
        self.name.is_empty() && self.static_type.is_empty() && self.dynamic_type.is_empty()
    }

    pub fn matches(&self, node: &NodeRef<'_>) -> bool {
        (self.name.is_empty() || self.name == node.name())
            && (self.static_type.is_empty() || self.static_type == node.static_type())
            && (self.dynamic_type.is_empty() || self.dynamic_type == node.dynamic_type())
    }
}

impl NodeFilter for Filter {
    fn apply(&self, node: &NodeRef<'_>) -> bool {
        self.matches(node)
    }
}

impl FromStr for Filter {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.static_type.is_empty() || !self.dynamic_type.is_empty() {
            f.write_str(&self.static_type)?;
            if !self.dynamic_type.is_empty() {
                write!(f, ":{}", self.dynamic_type)?;
            }
            f.write_str("%")?;
        }
        f.write_str(&self.name)
    }
}

/// Position selector of an indexed filter expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Index {
    /// The only matching sibling (`~!`).
    Unique,
    /// Counted from the head (or, backwards, from the tail) of the sibling chain.
    Absolute { position: usize, backwards: bool },
    /// Counted from the node the lookup starts at (`~r0` is that node if it matches).
    Relative { offset: usize, backwards: bool },
}

impl Default for Index {
    fn default() -> Self {
        Index::Absolute {
            position: 0,
            backwards: false,
        }
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Index::Unique => f.write_str("~!"),
            Index::Absolute {
                position,
                backwards,
            } => write!(f, "~{}{}", if *backwards { "-" } else { "" }, position),
            Index::Relative { offset, backwards } => {
                write!(f, "~r{}{}", if *backwards { "-" } else { "" }, offset)
            }
        }
    }
}

/// Filter plus position among the matching siblings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexedFilter {
    pub filter: Filter,
    pub index: Index,
}

impl IndexedFilter {
    /// Parse an indexed filter expression. The empty string is rejected.
    pub fn parse(expr: &str) -> Result<IndexedFilter, SyntaxError> {
        if expr.is_empty() {
            return Err(SyntaxError::Empty);
        }
        let pair = parse_rule(Rule::sibling_expr, expr)?;
        let inner = pair
            .into_inner()
            .find(|p| p.as_rule() == Rule::indexed_filter)
            .ok_or(SyntaxError::Empty)?;
        build_indexed_filter(inner)
    }

    pub fn new(filter: Filter, index: Index) -> Self {
        IndexedFilter { filter, index }
    }
}

impl FromStr for IndexedFilter {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexedFilter::parse(s)
    }
}

impl fmt::Display for IndexedFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.filter)?;
        if self.index != Index::default() {
            write!(f, "{}", self.index)?;
        }
        Ok(())
    }
}

/// Where a path starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// No leading slash: start at the node the lookup is called on.
    Relative,
    /// One leading slash: the tree root.
    Root,
    /// Two or more leading slashes: one level above the root.
    VirtualRoot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.`
    Current,
    /// `..`
    Parent,
    /// `*`
    Any,
    /// `**`
    Deep,
    /// `filter~*`
    TypedWildcard(Filter),
    /// Indexed filter resolved among the children.
    Lookup(IndexedFilter),
}

/// Parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    pub anchor: Anchor,
    pub segments: Vec<Segment>,
}

impl NodePath {
    pub fn parse(expr: &str) -> Result<NodePath, SyntaxError> {
        let pair = parse_rule(Rule::path, expr)?;
        let mut anchor = Anchor::Relative;
        let mut segments = Vec::new();
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::anchor => {
                    anchor = if inner.as_str().len() > 1 {
                        Anchor::VirtualRoot
                    } else {
                        Anchor::Root
                    };
                }
                Rule::segment => segments.push(build_segment(inner)?),
                _ => {}
            }
        }
        Ok(NodePath { anchor, segments })
    }
}

impl FromStr for NodePath {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodePath::parse(s)
    }
}

fn parse_rule(rule: Rule, input: &str) -> Result<Pair<'_, Rule>, SyntaxError> {
    let mut pairs =
        SelectorParser::parse(rule, input).map_err(|e| SyntaxError::Parse(e.to_string()))?;
    pairs.next().ok_or(SyntaxError::Empty)
}

fn build_filter(pair: Pair<Rule>) -> Filter {
    let mut filter = Filter::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::type_spec => {
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::static_type => filter.static_type = part.as_str().to_string(),
                        Rule::dynamic_type => filter.dynamic_type = part.as_str().to_string(),
                        _ => {}
                    }
                }
            }
            Rule::name => filter.name = inner.as_str().to_string(),
            _ => {}
        }
    }
    filter
}

fn build_index(pair: Pair<Rule>) -> Result<Index, SyntaxError> {
    let mut index = Index::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::unique => index = Index::Unique,
            Rule::position => {
                let mut relative = false;
                let mut backwards = false;
                let mut n = 0usize;
                for part in inner.into_inner() {
                    match part.as_rule() {
                        Rule::relative => relative = true,
                        Rule::backward => backwards = true,
                        Rule::digits => {
                            n = part
                                .as_str()
                                .parse()
                                .map_err(|_| SyntaxError::Index(part.as_str().to_string()))?;
                        }
                        _ => {}
                    }
                }
                index = if relative {
                    Index::Relative {
                        offset: n,
                        backwards,
                    }
                } else {
                    Index::Absolute {
                        position: n,
                        backwards,
                    }
                };
            }
            _ => {}
        }
    }
    Ok(index)
}

fn build_indexed_filter(pair: Pair<Rule>) -> Result<IndexedFilter, SyntaxError> {
    let mut indexed = IndexedFilter::default();
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::filter => indexed.filter = build_filter(inner),
            Rule::index => indexed.index = build_index(inner)?,
            _ => {}
        }
    }
    Ok(indexed)
}

fn build_segment(pair: Pair<Rule>) -> Result<Segment, SyntaxError> {
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| SyntaxError::Parse("empty segment".to_string()))?;
    match inner.as_rule() {
        Rule::parent => Ok(Segment::Parent),
        Rule::current => Ok(Segment::Current),
        Rule::deep => Ok(Segment::Deep),
        Rule::any => Ok(Segment::Any),
        Rule::typed_wildcard => {
            let filter = inner
                .into_inner()
                .find(|p| p.as_rule() == Rule::filter)
                .map(build_filter)
                .unwrap_or_default();
            Ok(Segment::TypedWildcard(filter))
        }
        Rule::indexed_filter => Ok(Segment::Lookup(build_indexed_filter(inner)?)),
        other => Err(SyntaxError::Parse(format!("unexpected segment rule: {:?}", other))),
    }
}
