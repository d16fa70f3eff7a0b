//! Filepath: src/node.rs
//!
//! Tagged node model for the adaptive radix tree.
//!
//! A [`Node`] is either a leaf or one of four inner shapes. The inner
//! shapes share an [`InnerHeader`] carrying the node identifier, the
//! compressed path prefix, the child count, and the inner-leaf slot; each
//! shape adds its own indexing structure and children array. Callers never
//! branch on the concrete shape: every operation dispatches through the
//! uniform contract below, and `add_child`/`remove_child` may hand back a
//! different shape that the caller must adopt.
//!
//! # Compressed prefixes
//!
//! An inner node's prefix covers the bytes shared by all keys beneath it,
//! relative to the depth at which the node sits. Only the first
//! [`MAX_PREFIX_LEN`] bytes are stored inline; when the logical length
//! exceeds the buffer, the full prefix is recovered by following the
//! minimum leaf below the node and slicing its key by
//! `depth..depth + prefix_len`.

use std::sync::Arc;

use crate::key::longest_common_prefix;
use crate::txn::Txn;

mod leaf;
mod node16;
mod node256;
mod node4;
mod node48;

pub(crate) use leaf::LeafNode;
pub(crate) use node16::Node16;
pub(crate) use node256::Node256;
pub(crate) use node4::Node4;
pub(crate) use node48::Node48;

/// Identifier of a node within a tree lineage.
///
/// Identifiers are minted monotonically by transactions and never reused;
/// a node whose identifier is at most the transaction's snapshot watermark
/// belongs to a committed snapshot and is never mutated in place.
pub type NodeId = u64;

/// Number of prefix bytes stored inline in an inner node header.
pub const MAX_PREFIX_LEN: usize = 10;

// ============================================================================
//  InnerHeader
// ============================================================================

/// State shared by the four inner node shapes.
pub(crate) struct InnerHeader<V> {
    /// Node identifier, unique within the tree lineage.
    pub(crate) id: NodeId,

    /// Logical length of the compressed prefix.
    pub(crate) prefix_len: u16,

    /// First `min(prefix_len, MAX_PREFIX_LEN)` bytes of the prefix.
    pub(crate) prefix: [u8; MAX_PREFIX_LEN],

    /// Number of occupied child slots.
    pub(crate) n_children: u16,

    /// Leaf whose key terminates exactly at this node's path (the path
    /// includes this node's own prefix). Always the `Leaf` variant.
    pub(crate) leaf: Option<Arc<Node<V>>>,
}

impl<V> InnerHeader<V> {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            id,
            prefix_len: 0,
            prefix: [0; MAX_PREFIX_LEN],
            n_children: 0,
            leaf: None,
        }
    }

    /// The inline portion of the compressed prefix.
    #[inline]
    pub(crate) fn inline_prefix(&self) -> &[u8] {
        let stored = (self.prefix_len as usize).min(MAX_PREFIX_LEN);
        &self.prefix[..stored]
    }

    /// Assign the prefix from its fully resolved bytes. Only the first
    /// [`MAX_PREFIX_LEN`] bytes are stored; the length records the full
    /// logical length.
    pub(crate) fn set_prefix(&mut self, full: &[u8]) {
        debug_assert!(full.len() <= u16::MAX as usize);
        let head = &full[..full.len().min(MAX_PREFIX_LEN)];
        self.set_prefix_head(head, full.len() as u16);
    }

    /// Assign the prefix from its first bytes plus the full logical length.
    pub(crate) fn set_prefix_head(&mut self, head: &[u8], len: u16) {
        debug_assert!(head.len() <= MAX_PREFIX_LEN);
        debug_assert!(head.len() == (len as usize).min(MAX_PREFIX_LEN));
        self.prefix = [0; MAX_PREFIX_LEN];
        self.prefix[..head.len()].copy_from_slice(head);
        self.prefix_len = len;
    }

    /// Remove the first `trim` bytes of the prefix. `full` is the resolved
    /// prefix before the trim, supplied by the caller because the inline
    /// buffer alone cannot reconstruct the tail of an overflowing prefix.
    pub(crate) fn left_trim_prefix(&mut self, full: &[u8], trim: usize) {
        debug_assert_eq!(full.len(), self.prefix_len as usize);
        self.set_prefix(&full[trim..]);
    }

    /// The inner leaf, if this node's exact path is a stored key.
    #[expect(clippy::expect_used, reason = "the slot only ever holds leaves")]
    pub(crate) fn inner_leaf(&self) -> Option<&LeafNode<V>> {
        self.leaf
            .as_deref()
            .map(|n| n.as_leaf().expect("inner-leaf slot holds a leaf"))
    }

    /// Copy with a fresh identifier; children of the holder and the inner
    /// leaf are shared, not deep-copied.
    pub(crate) fn copy_with_id(&self, id: NodeId) -> Self {
        Self {
            id,
            prefix_len: self.prefix_len,
            prefix: self.prefix,
            n_children: self.n_children,
            leaf: self.leaf.clone(),
        }
    }

    /// Move the prefix and inner leaf out of `src` during a shape change.
    /// The child count is left for the transition code to set.
    pub(crate) fn inherit(&mut self, src: &mut InnerHeader<V>) {
        self.prefix_len = src.prefix_len;
        self.prefix = src.prefix;
        self.leaf = src.leaf.take();
    }
}

// ============================================================================
//  Node
// ============================================================================

/// A node of the tree: a leaf or one of the four adaptive inner shapes.
pub(crate) enum Node<V> {
    Leaf(LeafNode<V>),
    Node4(Node4<V>),
    Node16(Node16<V>),
    Node48(Node48<V>),
    Node256(Node256<V>),
}

impl<V> Node<V> {
    /// This node's identifier.
    pub(crate) fn id(&self) -> NodeId {
        match self {
            Self::Leaf(l) => l.id,
            Self::Node4(n) => n.header.id,
            Self::Node16(n) => n.header.id,
            Self::Node48(n) => n.header.id,
            Self::Node256(n) => n.header.id,
        }
    }

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Leaf contents if this node is a leaf.
    #[inline]
    pub(crate) fn as_leaf(&self) -> Option<&LeafNode<V>> {
        match self {
            Self::Leaf(l) => Some(l),
            _ => None,
        }
    }

    /// Shared inner state. `None` for leaves.
    pub(crate) fn header(&self) -> Option<&InnerHeader<V>> {
        match self {
            Self::Leaf(_) => None,
            Self::Node4(n) => Some(&n.header),
            Self::Node16(n) => Some(&n.header),
            Self::Node48(n) => Some(&n.header),
            Self::Node256(n) => Some(&n.header),
        }
    }

    pub(crate) fn header_mut(&mut self) -> Option<&mut InnerHeader<V>> {
        match self {
            Self::Leaf(_) => None,
            Self::Node4(n) => Some(&mut n.header),
            Self::Node16(n) => Some(&mut n.header),
            Self::Node48(n) => Some(&mut n.header),
            Self::Node256(n) => Some(&mut n.header),
        }
    }

    /// Logical length of this node's compressed prefix (0 for leaves).
    #[inline]
    pub(crate) fn prefix_len(&self) -> usize {
        self.header().map_or(0, |h| h.prefix_len as usize)
    }

    /// Inline portion of the compressed prefix (empty for leaves).
    #[inline]
    pub(crate) fn inline_prefix(&self) -> &[u8] {
        self.header().map_or(&[], InnerHeader::inline_prefix)
    }

    /// Number of occupied child slots (0 for leaves).
    #[inline]
    pub(crate) fn child_count(&self) -> usize {
        self.header().map_or(0, |h| h.n_children as usize)
    }

    /// The inner leaf, if this node's exact path is a stored key.
    #[inline]
    pub(crate) fn inner_leaf(&self) -> Option<&LeafNode<V>> {
        self.header().and_then(InnerHeader::inner_leaf)
    }

    /// The inner-leaf slot as a node reference.
    #[inline]
    pub(crate) fn inner_leaf_node(&self) -> Option<&Arc<Node<V>>> {
        self.header().and_then(|h| h.leaf.as_ref())
    }

    #[expect(clippy::expect_used, reason = "callers hold an inner node")]
    pub(crate) fn set_inner_leaf(&mut self, leaf: Arc<Node<V>>) {
        debug_assert!(leaf.is_leaf());
        self.header_mut().expect("inner node").leaf = Some(leaf);
    }

    #[expect(clippy::expect_used, reason = "callers hold an inner node")]
    pub(crate) fn clear_inner_leaf(&mut self) -> Option<Arc<Node<V>>> {
        self.header_mut().expect("inner node").leaf.take()
    }

    #[expect(clippy::expect_used, reason = "callers hold an inner node")]
    pub(crate) fn set_prefix_head(&mut self, head: &[u8], len: u16) {
        self.header_mut()
            .expect("inner node")
            .set_prefix_head(head, len);
    }

    #[expect(clippy::expect_used, reason = "callers hold an inner node")]
    pub(crate) fn left_trim_prefix(&mut self, full: &[u8], trim: usize) {
        self.header_mut()
            .expect("inner node")
            .left_trim_prefix(full, trim);
    }

    // ------------------------------------------------------------------
    //  Shape dispatch
    // ------------------------------------------------------------------

    /// Child under edge byte `c`, if any.
    pub(crate) fn find_child(&self, c: u8) -> Option<&Arc<Node<V>>> {
        match self {
            Self::Leaf(_) => None,
            Self::Node4(n) => n.find_child(c),
            Self::Node16(n) => n.find_child(c),
            Self::Node48(n) => n.find_child(c),
            Self::Node256(n) => n.find_child(c),
        }
    }

    /// Add a child under edge byte `c`. The byte must not already be an
    /// edge of this node. May return a larger shape; the caller must adopt
    /// the returned node.
    pub(crate) fn add_child(self, txn: &mut Txn<V>, c: u8, child: Arc<Node<V>>) -> Self {
        match self {
            Self::Leaf(_) => unreachable!("leaf nodes have no children"),
            Self::Node4(n) => n.add_child(txn, c, child),
            Self::Node16(n) => n.add_child(txn, c, child),
            Self::Node48(n) => n.add_child(txn, c, child),
            Self::Node256(n) => n.add_child(txn, c, child),
        }
    }

    /// Remove the child under edge byte `c`, if present. May return a
    /// smaller shape; the caller must adopt the returned node.
    pub(crate) fn remove_child(self, txn: &mut Txn<V>, c: u8) -> Self {
        match self {
            Self::Leaf(_) => unreachable!("leaf nodes have no children"),
            Self::Node4(n) => n.remove_child(txn, c),
            Self::Node16(n) => n.remove_child(txn, c),
            Self::Node48(n) => n.remove_child(txn, c),
            Self::Node256(n) => n.remove_child(txn, c),
        }
    }

    /// Replace the child under edge byte `c`. The shape never changes.
    pub(crate) fn replace_child(&mut self, c: u8, child: Arc<Node<V>>) {
        match self {
            Self::Leaf(_) => unreachable!("leaf nodes have no children"),
            Self::Node4(n) => n.replace_child(c, child),
            Self::Node16(n) => n.replace_child(c, child),
            Self::Node48(n) => n.replace_child(c, child),
            Self::Node256(n) => n.replace_child(c, child),
        }
    }

    /// Detach the child under edge byte `c`, leaving its slot empty. The
    /// index entry stays in place; the caller restores the slot with
    /// `replace_child` or removes the edge with `remove_child` before the
    /// node becomes reachable again.
    pub(crate) fn take_child(&mut self, c: u8) -> Option<Arc<Node<V>>> {
        match self {
            Self::Leaf(_) => None,
            Self::Node4(n) => n.take_child(c),
            Self::Node16(n) => n.take_child(c),
            Self::Node48(n) => n.take_child(c),
            Self::Node256(n) => n.take_child(c),
        }
    }

    /// Child with the lowest edge byte.
    pub(crate) fn min_child(&self) -> Option<&Arc<Node<V>>> {
        match self {
            Self::Leaf(_) => None,
            Self::Node4(n) => n.min_child(),
            Self::Node16(n) => n.min_child(),
            Self::Node48(n) => n.min_child(),
            Self::Node256(n) => n.min_child(),
        }
    }

    /// Child with the highest edge byte.
    pub(crate) fn max_child(&self) -> Option<&Arc<Node<V>>> {
        match self {
            Self::Leaf(_) => None,
            Self::Node4(n) => n.max_child(),
            Self::Node16(n) => n.max_child(),
            Self::Node48(n) => n.max_child(),
            Self::Node256(n) => n.max_child(),
        }
    }

    /// Child whose edge byte is the smallest at or above `from`.
    ///
    /// `from` ranges over `0..=256` so a cursor can step past edge byte
    /// 255; `next_edge(0)` is the minimum child and repeated calls with
    /// `edge + 1` enumerate children in ascending edge order.
    pub(crate) fn next_edge(&self, from: u16) -> Option<(u8, &Arc<Node<V>>)> {
        match self {
            Self::Leaf(_) => None,
            Self::Node4(n) => n.next_edge(from),
            Self::Node16(n) => n.next_edge(from),
            Self::Node48(n) => n.next_edge(from),
            Self::Node256(n) => n.next_edge(from),
        }
    }

    /// Copy this inner node with a new identifier and the same content.
    /// Children and the inner leaf are shared.
    pub(crate) fn copy(&self, txn: &mut Txn<V>) -> Self {
        match self {
            Self::Leaf(_) => unreachable!("leaf nodes are never copied"),
            Self::Node4(n) => n.copy(txn),
            Self::Node16(n) => n.copy(txn),
            Self::Node48(n) => n.copy(txn),
            Self::Node256(n) => n.copy(txn),
        }
    }

    // ------------------------------------------------------------------
    //  Prefix resolution
    // ------------------------------------------------------------------

    /// The first leaf, in key order, at or below this node. The inner leaf
    /// wins over any child because its path is shorter.
    #[expect(
        clippy::expect_used,
        reason = "an inner node always has a leaf beneath it"
    )]
    pub(crate) fn min_leaf(&self) -> &LeafNode<V> {
        let mut n = self;
        loop {
            if let Some(leaf) = n.as_leaf() {
                return leaf;
            }
            if let Some(leaf) = n.inner_leaf() {
                return leaf;
            }
            n = n.min_child().expect("inner node without descendants").as_ref();
        }
    }

    /// The last leaf, in key order, at or below this node. Children win
    /// over the inner leaf because their paths extend past it.
    #[expect(
        clippy::expect_used,
        reason = "an inner node always has a leaf beneath it"
    )]
    pub(crate) fn max_leaf(&self) -> &LeafNode<V> {
        let mut n = self;
        loop {
            if let Some(leaf) = n.as_leaf() {
                return leaf;
            }
            match n.max_child() {
                Some(child) => n = child.as_ref(),
                None => return n.inner_leaf().expect("inner node without descendants"),
            }
        }
    }

    /// The fully resolved compressed prefix of this inner node, which sits
    /// at `depth` bytes below the root.
    pub(crate) fn full_prefix(&self, depth: usize) -> &[u8] {
        let len = self.prefix_len();
        if len <= MAX_PREFIX_LEN {
            return self.inline_prefix();
        }
        //  INVARIANT: a leaf's key covers the prefixes of every node on
        //  its path, so the slice below is in bounds.
        let leaf = self.min_leaf();
        &leaf.key[depth..depth + len]
    }

    /// Length of the common prefix of `key[depth..]` and this node's
    /// compressed prefix, resolving past the inline buffer only when the
    /// inline bytes all match.
    pub(crate) fn prefix_mismatch(&self, key: &[u8], depth: usize) -> usize {
        let len = self.prefix_len();
        if len == 0 {
            return 0;
        }
        let rem = &key[depth..];
        let inline = self.inline_prefix();
        let matched = longest_common_prefix(inline, rem);
        if matched < inline.len() || len <= MAX_PREFIX_LEN {
            return matched;
        }
        longest_common_prefix(self.full_prefix(depth), rem)
    }
}
