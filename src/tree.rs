//! Immutable document tree for workflow YAML files.
//!
//! The tree is an arena of nodes addressed by [`NodeId`]. Every node knows
//! its parent, its ordered children and its byte span in the source text.
//! A tree is immutable for a given revision; the revision stamp is the
//! cache key for everything derived from the tree.

use std::collections::BTreeSet;

use serde::Serialize;

/// Monotonically increasing per-document revision stamp.
pub type Revision = u64;

/// Stable identity of a node within its tree. Valid only for the tree that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// Byte range in the source text, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Span { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Syntactic kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Mapping,
    KeyValue,
    Sequence,
    SequenceItem,
    Scalar,
    Comment,
}

#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) span: Span,
    /// Key text for `KeyValue` nodes.
    pub(crate) key: Option<String>,
    /// Span of the key token for `KeyValue` nodes.
    pub(crate) key_span: Option<Span>,
    /// Effective text for `Scalar` (unquoted value) and `Comment` (full line).
    pub(crate) text: Option<String>,
}

/// An immutable-per-revision workflow document.
#[derive(Debug)]
pub struct DocumentTree {
    pub(crate) nodes: Vec<Node>,
    source: String,
    revision: Revision,
    root: NodeId,
}

impl DocumentTree {
    pub(crate) fn from_parts(nodes: Vec<Node>, source: String, root: NodeId) -> Self {
        DocumentTree {
            nodes,
            source,
            revision: 0,
            root,
        }
    }

    /// The `Document` node.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Bump the revision stamp, invalidating everything derived from the tree.
    pub fn set_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.node(id).span
    }

    /// Raw source slice covered by the node.
    pub fn text(&self, id: NodeId) -> &str {
        let span = self.node(id).span;
        &self.source[span.start..span.end.min(self.source.len())]
    }

    /// Effective text of a scalar (quotes stripped) or a comment line.
    pub fn scalar_text(&self, id: NodeId) -> Option<&str> {
        self.node(id).text.as_deref()
    }

    /// Key text of a `KeyValue` node.
    pub fn key_text(&self, id: NodeId) -> Option<&str> {
        self.node(id).key.as_deref()
    }

    pub fn key_span(&self, id: NodeId) -> Option<Span> {
        self.node(id).key_span
    }

    /// The value node of a `KeyValue`, if any.
    pub fn value_of(&self, kv: NodeId) -> Option<NodeId> {
        debug_assert_eq!(self.kind(kv), NodeKind::KeyValue);
        self.node(kv).children.first().copied()
    }

    /// The value node of a `SequenceItem`, if any.
    pub fn item_value(&self, item: NodeId) -> Option<NodeId> {
        debug_assert_eq!(self.kind(item), NodeKind::SequenceItem);
        self.node(item).children.first().copied()
    }

    /// Iterate the `KeyValue` entries of a mapping, skipping comments.
    pub fn entries(&self, mapping: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(mapping)
            .iter()
            .copied()
            .filter(|&c| self.kind(c) == NodeKind::KeyValue)
    }

    /// Look up an entry of a mapping by key.
    pub fn key_value(&self, mapping: NodeId, key: &str) -> Option<NodeId> {
        self.entries(mapping)
            .find(|&kv| self.key_text(kv) == Some(key))
    }

    /// The set of keys present in a mapping.
    pub fn keys(&self, mapping: NodeId) -> BTreeSet<String> {
        self.entries(mapping)
            .filter_map(|kv| self.key_text(kv).map(str::to_owned))
            .collect()
    }

    /// Nearest ancestor (or the node itself) matching the predicate.
    pub fn ancestor_or_self<F>(&self, id: NodeId, pred: F) -> Option<NodeId>
    where
        F: Fn(NodeKind) -> bool,
    {
        let mut current = Some(id);
        while let Some(node) = current {
            if pred(self.kind(node)) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    /// Position of a node within its parent's child list.
    fn child_index(&self, id: NodeId) -> Option<(NodeId, usize)> {
        let parent = self.parent(id)?;
        let idx = self.children(parent).iter().position(|&c| c == id)?;
        Some((parent, idx))
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let (parent, idx) = self.child_index(id)?;
        idx.checked_sub(1).map(|i| self.children(parent)[i])
    }

    /// Whether a line break separates the key token from the value node.
    /// Incomplete documents can attach a scalar from the next line to the
    /// previous key; resolution treats that value as object contents.
    pub fn has_line_break_between_key_and_value(&self, kv: NodeId) -> bool {
        let Some(key_span) = self.key_span(kv) else {
            return false;
        };
        let Some(value) = self.value_of(kv) else {
            return false;
        };
        let value_start = self.span(value).start;
        if value_start <= key_span.end {
            return false;
        }
        self.source[key_span.end..value_start].contains('\n')
    }

    /// 1-based line and column of a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let before = &self.source[..offset];
        let line = before.matches('\n').count() + 1;
        let col = offset - before.rfind('\n').map(|p| p + 1).unwrap_or(0) + 1;
        (line, col)
    }
}
