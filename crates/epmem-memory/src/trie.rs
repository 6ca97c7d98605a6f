//! Fact Trie – the shared structural index.
//!
//! Every distinct `(attribute, value)` edge ever observed under a given
//! parent edge becomes exactly one [`TrieNode`].  Nodes are shared by every
//! episode that saw the same edge, so an episode is little more than a list
//! of node handles.
//!
//! Nodes live in an arena owned by [`FactTrie`] and are addressed by
//! [`NodeId`].  Episodes and reference lists hold indices, never borrows, so
//! evicting a node's reference list cannot leave anything dangling.  Nodes
//! are never removed; the arena is dropped with the engine.
//!
//! # Identity
//!
//! | Edge value   | Key stored in the parent's index          |
//! |--------------|-------------------------------------------|
//! | identifier   | [`EdgeValue::Structural`] (wildcard)      |
//! | string       | [`EdgeValue::Str`]                        |
//! | integer      | [`EdgeValue::Int`]                        |
//! | float        | [`EdgeValue::Float`] (bit pattern)        |
//!
//! Identifier-valued facts are identified purely by position: every
//! `(^item <some-id>)` under the same parent collapses onto one node.  Only
//! constant-valued nodes are *leaves* and take part in matching.
//!
//! # Example
//!
//! ```rust
//! use epmem_memory::trie::FactTrie;
//! use epmem_types::{SymbolId, Value};
//!
//! let mut trie = FactTrie::new();
//! let a = trie.find_or_create(trie.root(), "item", &Value::Identifier(SymbolId(4)));
//! let b = trie.find_or_create(trie.root(), "item", &Value::Identifier(SymbolId(9)));
//! assert_eq!(a, b); // identifiers are wildcards
//!
//! let leaf = trie.find_or_create(a, "color", &Value::Str("red".into()));
//! assert!(trie.node(leaf).is_leaf());
//! assert_eq!(trie.node(leaf).depth(), 1);
//! assert_eq!(trie.len(), 3); // root + two edges
//! ```

use std::collections::HashMap;

use epmem_types::{FactId, SymbolId, Value};

use crate::episode::EpisodeId;
use crate::grow_list::GrowList;

// ─────────────────────────────────────────────────────────────────────────────
// Handles and keys
// ─────────────────────────────────────────────────────────────────────────────

/// Index of a node in the trie arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// The value half of an edge, owned by the trie.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeValue {
    /// Identifier-valued edge; the identity is the position alone.
    Structural,
    Str(String),
    Int(i64),
    /// Stored as the IEEE-754 bit pattern so the key is hashable.
    Float(u64),
}

impl EdgeValue {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Identifier(_) => EdgeValue::Structural,
            Value::Str(s) => EdgeValue::Str(s.clone()),
            Value::Int(i) => EdgeValue::Int(*i),
            Value::Float(x) => EdgeValue::Float(x.to_bits()),
        }
    }

    /// The stored constant, or `None` for structural edges.
    pub fn constant(&self) -> Option<Value> {
        match self {
            EdgeValue::Structural => None,
            EdgeValue::Str(s) => Some(Value::Str(s.clone())),
            EdgeValue::Int(i) => Some(Value::Int(*i)),
            EdgeValue::Float(bits) => Some(Value::Float(f64::from_bits(*bits))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EdgeKey {
    attr: String,
    value: EdgeValue,
}

impl EdgeKey {
    fn new(attr: &str, value: &Value) -> Self {
        Self {
            attr: attr.to_string(),
            value: EdgeValue::from_value(value),
        }
    }
}

/// The live fact currently reconstructing a node, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mirror {
    pub fact: FactId,
    /// Identifier fabricated for a structural node; children attach here.
    pub symbol: Option<SymbolId>,
}

/// When a node's references make it too common to be worth matching on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UbiquityPolicy {
    /// Reference fraction that must be exceeded.
    pub fraction: f64,
    /// Store size that must be exceeded first.
    pub floor: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// TrieNode
// ─────────────────────────────────────────────────────────────────────────────

/// One canonical `(attribute, value)` edge.
#[derive(Debug)]
pub struct TrieNode {
    attr: String,
    value: EdgeValue,
    parent: Option<NodeId>,
    depth: u32,
    children: HashMap<EdgeKey, NodeId>,
    mirror: Option<Mirror>,
    episodes: GrowList<EpisodeId>,
    ref_count: usize,
    query_count: u64,
    ubiquitous: bool,
}

impl TrieNode {
    fn new(attr: String, value: EdgeValue, parent: Option<NodeId>, depth: u32) -> Self {
        Self {
            attr,
            value,
            parent,
            depth,
            children: HashMap::new(),
            mirror: None,
            episodes: GrowList::new(),
            ref_count: 0,
            query_count: 0,
            ubiquitous: false,
        }
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn value(&self) -> &EdgeValue {
        &self.value
    }

    /// `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Distance from the root.  The root and the edges hanging directly off
    /// it share depth 0, so top-level facts sort first in an episode; every
    /// deeper edge is its parent's depth plus one.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// A leaf carries a constant and is the only kind of node stored for
    /// matching.
    pub fn is_leaf(&self) -> bool {
        !matches!(self.value, EdgeValue::Structural)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn is_mirrored(&self) -> bool {
        self.mirror.is_some()
    }

    pub fn mirror(&self) -> Option<Mirror> {
        self.mirror
    }

    /// Episodes referencing this node, oldest first.  Empty once ubiquitous.
    pub fn episodes(&self) -> &[EpisodeId] {
        self.episodes.as_slice()
    }

    /// Total references ever made, including those discarded by ubiquity.
    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    /// How many queries have touched this node.
    pub fn query_count(&self) -> u64 {
        self.query_count
    }

    pub fn is_ubiquitous(&self) -> bool {
        self.ubiquitous
    }

    pub(crate) fn set_mirror(&mut self, mirror: Mirror) {
        self.mirror = Some(mirror);
    }

    pub(crate) fn take_mirror(&mut self) -> Option<Mirror> {
        self.mirror.take()
    }

    pub(crate) fn touch_query(&mut self) {
        self.query_count += 1;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FactTrie
// ─────────────────────────────────────────────────────────────────────────────

/// Arena of every edge ever observed, rooted at an anonymous node.
#[derive(Debug)]
pub struct FactTrie {
    nodes: Vec<TrieNode>,
}

impl Default for FactTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl FactTrie {
    /// Create a trie holding only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::new(String::new(), EdgeValue::Structural, None, 0)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: the root is never removed.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &TrieNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TrieNode {
        &mut self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TrieNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    pub fn ubiquitous_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.ubiquitous).count()
    }

    /// Look up the child of `parent` for `(attr, value)` without creating it.
    pub fn find(&self, parent: NodeId, attr: &str, value: &Value) -> Option<NodeId> {
        self.node(parent).children.get(&EdgeKey::new(attr, value)).copied()
    }

    /// Return the child of `parent` for `(attr, value)`, creating it on first
    /// sight.
    pub fn find_or_create(&mut self, parent: NodeId, attr: &str, value: &Value) -> NodeId {
        let key = EdgeKey::new(attr, value);
        if let Some(&child) = self.node(parent).children.get(&key) {
            return child;
        }
        let depth = if parent == self.root() {
            0
        } else {
            self.node(parent).depth + 1
        };
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(TrieNode::new(
            key.attr.clone(),
            key.value.clone(),
            Some(parent),
            depth,
        ));
        self.node_mut(parent).children.insert(key, id);
        id
    }

    /// Record that `episode` references `node`.
    ///
    /// `store_len` is the number of episodes already stored.  Once it exceeds
    /// `policy.floor` and the node's reference fraction exceeds
    /// `policy.fraction` the node turns ubiquitous, its reference list is
    /// discarded and `true` is returned.  Ubiquitous nodes ignore further
    /// references.
    pub fn add_reference(
        &mut self,
        node: NodeId,
        episode: EpisodeId,
        store_len: usize,
        policy: UbiquityPolicy,
    ) -> bool {
        let n = self.node_mut(node);
        if n.ubiquitous {
            return false;
        }
        n.ref_count += 1;
        n.episodes.push(episode);
        if store_len > policy.floor
            && (n.ref_count as f64 / store_len as f64) > policy.fraction
        {
            n.ubiquitous = true;
            n.episodes.discard();
            return true;
        }
        false
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Str(v.to_string())
    }

    const POLICY: UbiquityPolicy = UbiquityPolicy {
        fraction: 0.5,
        floor: 3,
    };

    #[test]
    fn repeated_edges_do_not_grow_the_trie() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let a = trie.find_or_create(root, "a", &s("x"));
        let len = trie.len();
        assert_eq!(trie.find_or_create(root, "a", &s("x")), a);
        assert_eq!(trie.len(), len);
    }

    #[test]
    fn same_edge_under_different_parents_is_distinct() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let p = trie.find_or_create(root, "p", &Value::Identifier(SymbolId(1)));
        let q = trie.find_or_create(root, "q", &Value::Identifier(SymbolId(1)));
        let under_p = trie.find_or_create(p, "a", &s("x"));
        let under_q = trie.find_or_create(q, "a", &s("x"));
        assert_ne!(under_p, under_q);
        assert_eq!(trie.node(under_p).parent(), Some(p));
    }

    #[test]
    fn constant_types_are_not_conflated() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let int = trie.find_or_create(root, "n", &Value::Int(1));
        let text = trie.find_or_create(root, "n", &s("1"));
        let float = trie.find_or_create(root, "n", &Value::Float(1.0));
        assert_ne!(int, text);
        assert_ne!(int, float);
        assert_ne!(text, float);
        assert_eq!(trie.node(float).value().constant(), Some(Value::Float(1.0)));
    }

    #[test]
    fn identifier_edges_match_any_identifier() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let a = trie.find_or_create(root, "item", &Value::Identifier(SymbolId(2)));
        assert_eq!(trie.find(root, "item", &Value::Identifier(SymbolId(77))), Some(a));
        assert!(!trie.node(a).is_leaf());
        assert_eq!(trie.find(root, "item", &s("x")), None);
    }

    #[test]
    fn depth_counts_from_the_root_edges() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let a = trie.find_or_create(root, "a", &Value::Identifier(SymbolId(1)));
        let b = trie.find_or_create(a, "b", &Value::Identifier(SymbolId(2)));
        let c = trie.find_or_create(b, "c", &Value::Int(3));
        assert_eq!(trie.node(a).depth(), 0);
        assert_eq!(trie.node(b).depth(), 1);
        assert_eq!(trie.node(c).depth(), 2);
    }

    #[test]
    fn references_accumulate_below_the_floor() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let a = trie.find_or_create(root, "a", &s("x"));
        for i in 0..3 {
            assert!(!trie.add_reference(a, EpisodeId(i), i, POLICY));
        }
        assert_eq!(trie.node(a).episodes().len(), 3);
        assert!(!trie.node(a).is_ubiquitous());
    }

    #[test]
    fn ubiquity_discards_references_permanently() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let a = trie.find_or_create(root, "a", &s("x"));
        for i in 0..4 {
            trie.add_reference(a, EpisodeId(i), i, POLICY);
        }
        // Store of 4 exceeds the floor of 3; 5 refs / 4 episodes > 0.5.
        assert!(trie.add_reference(a, EpisodeId(4), 4, POLICY));
        assert!(trie.node(a).is_ubiquitous());
        assert!(trie.node(a).episodes().is_empty());
        assert!(!trie.add_reference(a, EpisodeId(5), 5, POLICY));
        assert!(trie.node(a).episodes().is_empty());
        assert_eq!(trie.ubiquitous_count(), 1);
    }

    #[test]
    fn rare_nodes_stay_matchable_above_the_floor() {
        let mut trie = FactTrie::new();
        let root = trie.root();
        let a = trie.find_or_create(root, "a", &s("rare"));
        assert!(!trie.add_reference(a, EpisodeId(10), 10, POLICY));
        assert_eq!(trie.node(a).episodes(), &[EpisodeId(10)]);
    }
}
