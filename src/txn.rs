//! Filepath: src/txn.rs
//!
//! `Txn` - a copy-on-write transaction over an immutable tree.
//!
//! A transaction walks from the root, descending into children, and builds
//! a replacement root out of private copies of every node it touches. On
//! [`commit`](Txn::commit) the new root, size, and identifier watermark are
//! packaged into a fresh [`Tree`]; old trees remain valid and unchanged.
//!
//! The copy-on-write discriminator is the node identifier: a node whose id
//! is at most `max_snap_id` (the tree's watermark when the transaction
//! began) belongs to the committed snapshot and is copied before the first
//! write, with the original id recorded in the discard set. Nodes minted by
//! the transaction itself are mutated in place.
//!
//! A transaction is not thread safe and should only be used by a single
//! task; every mutating method takes `&mut self`.

use std::collections::HashSet;
use std::mem;
use std::sync::Arc;

use crate::key::{longest_common_prefix, MAX_KEY_LEN};
use crate::node::{LeafNode, Node, Node4, NodeId, MAX_PREFIX_LEN};
use crate::trace::{debug_log, trace_log};
use crate::tree::{Tree, TreeError};
use crate::view::NodeView;

// ============================================================================
//  MutationSet
// ============================================================================

/// Identifiers of snapshot nodes superseded by a transaction.
///
/// Every id in the set was reachable in the pre-transaction snapshot and is
/// unreachable in the committed result. Delivery of change notifications is
/// the embedding host's concern; the set is only collected while
/// [`Txn::track_mutate`] is enabled.
#[derive(Debug, Clone, Default)]
pub struct MutationSet {
    ids: HashSet<NodeId>,
}

impl MutationSet {
    fn insert(&mut self, id: NodeId) {
        self.ids.insert(id);
    }

    /// Whether `id` was superseded.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of superseded identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate over the superseded identifiers, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids.iter().copied()
    }
}

// ============================================================================
//  Txn
// ============================================================================

/// A transaction on the tree, applied atomically by [`commit`](Txn::commit).
pub struct Txn<V> {
    /// Identifier watermark of the snapshot this transaction started from.
    /// Nodes at or below it are copy-on-write.
    max_snap_id: NodeId,

    /// Live counter minting identifiers for nodes created or copied here.
    max_root_id: NodeId,

    /// Working root; `None` while the tree is empty.
    root: Option<Arc<Node<V>>>,

    /// Running element count.
    size: usize,

    /// Collect superseded snapshot identifiers into the mutation set.
    track_mutate: bool,

    mutations: MutationSet,
}

impl<V> Txn<V> {
    pub(crate) fn new(tree: &Tree<V>) -> Self {
        Self {
            max_snap_id: tree.max_id,
            max_root_id: tree.max_id,
            root: tree.root.clone(),
            size: tree.size,
            track_mutate: false,
            mutations: MutationSet::default(),
        }
    }

    /// Toggle mutation tracking. When enabled, the identifiers of snapshot
    /// nodes superseded by this transaction are collected and surfaced by
    /// [`commit_with_mutations`](Txn::commit_with_mutations).
    pub fn track_mutate(&mut self, track: bool) {
        self.track_mutate = track;
    }

    /// The mutation set collected so far.
    #[must_use]
    pub fn mutations(&self) -> &MutationSet {
        &self.mutations
    }

    /// Read-only view of the working root. The view reflects mutations
    /// performed so far within this transaction.
    #[must_use]
    pub fn root(&self) -> NodeView<'_, V> {
        NodeView::new(self.root.as_ref())
    }

    /// Look up a key in the working tree.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&V> {
        self.root().get(key)
    }

    /// Look up a key, also reporting the identifier of the node the lookup
    /// terminated at. The id can be correlated with mutation sets of later
    /// transactions to watch for changes.
    #[must_use]
    pub fn get_watch(&self, key: &[u8]) -> (Option<NodeId>, Option<&V>) {
        self.root().get_watch(key)
    }

    /// Commit, yielding the new snapshot. Old trees are unaffected.
    #[must_use]
    pub fn commit(mut self) -> Tree<V> {
        debug_log!(
            size = self.size,
            max_id = self.max_root_id,
            discarded = self.mutations.len(),
            "commit"
        );
        Tree::from_parts(self.root.take(), self.max_root_id, self.size)
    }

    /// Commit, yielding the new snapshot together with the set of
    /// superseded snapshot identifiers (empty unless
    /// [`track_mutate`](Txn::track_mutate) was enabled).
    #[must_use]
    pub fn commit_with_mutations(mut self) -> (Tree<V>, MutationSet) {
        let mutations = mem::take(&mut self.mutations);
        (self.commit(), mutations)
    }

    // ------------------------------------------------------------------
    //  Identifier and node management
    // ------------------------------------------------------------------

    pub(crate) fn next_id(&mut self) -> NodeId {
        self.max_root_id += 1;
        self.max_root_id
    }

    fn discard(&mut self, id: NodeId) {
        // Nodes minted after the snapshot were never visible to it.
        if !self.track_mutate || id > self.max_snap_id {
            return;
        }
        self.mutations.insert(id);
    }

    fn new_leaf(&mut self, key: &[u8], value: Arc<V>) -> Arc<Node<V>> {
        Arc::new(Node::Leaf(LeafNode::new(self.next_id(), key, value)))
    }

    /// Turn a node reference into a privately owned node this transaction
    /// may mutate. Snapshot nodes are copied under a fresh identifier and
    /// the original is discarded; transaction-local nodes are unwrapped in
    /// place.
    fn writable(&mut self, n: Arc<Node<V>>) -> Node<V> {
        if n.id() <= self.max_snap_id {
            self.discard(n.id());
            return n.copy(self);
        }
        //  INVARIANT: transaction-local nodes are uniquely referenced once
        //  detached from their parent slot.
        match Arc::try_unwrap(n) {
            Ok(node) => node,
            Err(_) => unreachable!("transaction-local node is aliased"),
        }
    }

    // ------------------------------------------------------------------
    //  Insert
    // ------------------------------------------------------------------

    /// Add or update a key. Returns the previous value if the key was
    /// already present.
    ///
    /// # Errors
    ///
    /// [`TreeError::KeyTooLong`] if `key` exceeds
    /// [`MAX_KEY_LEN`](crate::MAX_KEY_LEN); the tree is unchanged.
    pub fn insert(&mut self, key: &[u8], value: V) -> Result<Option<Arc<V>>, TreeError> {
        if key.len() > MAX_KEY_LEN {
            return Err(TreeError::KeyTooLong);
        }
        let root = self.root.take();
        let (new_root, old) = self.insert_rec(root, key, Arc::new(value), 0);
        self.root = Some(new_root);
        if old.is_none() {
            self.size += 1;
        }
        Ok(old)
    }

    fn insert_rec(
        &mut self,
        n: Option<Arc<Node<V>>>,
        key: &[u8],
        value: Arc<V>,
        depth: usize,
    ) -> (Arc<Node<V>>, Option<Arc<V>>) {
        let Some(n) = n else {
            return (self.new_leaf(key, value), None);
        };

        if n.is_leaf() {
            return self.insert_at_leaf(n, key, value, depth);
        }

        let prefix_len = n.prefix_len();
        let lcp = n.prefix_mismatch(key, depth);
        if lcp < prefix_len {
            return self.split_prefix(n, key, value, depth, lcp);
        }

        let depth = depth + prefix_len;
        if depth == key.len() {
            // The key terminates exactly at this node's path: it lives in
            // the inner-leaf slot.
            let mut node = self.writable(n);
            let old = node.inner_leaf().map(|l| (l.id, Arc::clone(&l.value)));
            if let Some((old_id, _)) = &old {
                self.discard(*old_id);
            }
            let leaf = self.new_leaf(key, value);
            node.set_inner_leaf(leaf);
            return (Arc::new(node), old.map(|(_, v)| v));
        }

        let c = key[depth];
        if n.find_child(c).is_some() {
            let mut node = self.writable(n);
            #[expect(clippy::expect_used, reason = "presence checked above")]
            let child = node.take_child(c).expect("child present");
            let (new_child, old) = self.insert_rec(Some(child), key, value, depth + 1);
            node.replace_child(c, new_child);
            (Arc::new(node), old)
        } else {
            let leaf = self.new_leaf(key, value);
            let node = self.writable(n);
            let node = node.add_child(self, c, leaf);
            (Arc::new(node), None)
        }
    }

    /// Insertion arrived at an existing leaf: replace its value on an exact
    /// match, otherwise split into a node4 holding both leaves below their
    /// common prefix. A key exhausted at the split point becomes the split
    /// node's inner leaf.
    fn insert_at_leaf(
        &mut self,
        n: Arc<Node<V>>,
        key: &[u8],
        value: Arc<V>,
        depth: usize,
    ) -> (Arc<Node<V>>, Option<Arc<V>>) {
        let (exact, old_value, split_at, existing_edge) = {
            #[expect(clippy::expect_used, reason = "checked by the caller")]
            let leaf = n.as_leaf().expect("leaf node");
            let exact = *leaf.key == *key;
            let split_at = depth + longest_common_prefix(&leaf.key[depth..], &key[depth..]);
            (
                exact,
                Arc::clone(&leaf.value),
                split_at,
                leaf.key.get(split_at).copied(),
            )
        };

        if exact {
            self.discard(n.id());
            return (self.new_leaf(key, value), Some(old_value));
        }

        let mut split = Node4::new(self.next_id());
        split.header.set_prefix(&key[depth..split_at]);
        let mut node = Node::Node4(split);

        // The existing leaf holds its whole key, so it moves under the
        // split without a copy.
        match existing_edge {
            Some(b) => node = node.add_child(self, b, n),
            None => node.set_inner_leaf(n),
        }

        let leaf = self.new_leaf(key, value);
        match key.get(split_at).copied() {
            Some(b) => node = node.add_child(self, b, leaf),
            None => node.set_inner_leaf(leaf),
        }
        (Arc::new(node), None)
    }

    /// The node's compressed prefix diverges from the key at `lcp`. Split:
    /// a new node4 carries the common portion, the current node is demoted
    /// below it (trimmed past the common portion and the edge byte), and
    /// the new key becomes a sibling leaf or the split node's inner leaf.
    fn split_prefix(
        &mut self,
        n: Arc<Node<V>>,
        key: &[u8],
        value: Arc<V>,
        depth: usize,
        lcp: usize,
    ) -> (Arc<Node<V>>, Option<Arc<V>>) {
        let full: Vec<u8> = n.full_prefix(depth).to_vec();
        trace_log!(id = n.id(), prefix_len = full.len(), lcp, "prefix split");

        let mut split = Node4::new(self.next_id());
        split.header.set_prefix(&key[depth..depth + lcp]);
        let mut node = Node::Node4(split);

        let demoted_edge = full[lcp];
        let mut demoted = self.writable(n);
        demoted.left_trim_prefix(&full, lcp + 1);
        node = node.add_child(self, demoted_edge, Arc::new(demoted));

        let split_at = depth + lcp;
        let leaf = self.new_leaf(key, value);
        match key.get(split_at).copied() {
            Some(b) => node = node.add_child(self, b, leaf),
            None => node.set_inner_leaf(leaf),
        }
        (Arc::new(node), None)
    }

    // ------------------------------------------------------------------
    //  Delete
    // ------------------------------------------------------------------

    /// Delete a key. Returns the removed value if the key was present.
    ///
    /// # Errors
    ///
    /// [`TreeError::KeyTooLong`] if `key` exceeds
    /// [`MAX_KEY_LEN`](crate::MAX_KEY_LEN); the tree is unchanged.
    #[expect(clippy::expect_used, reason = "the probe proved the key present")]
    pub fn delete(&mut self, key: &[u8]) -> Result<Option<Arc<V>>, TreeError> {
        if key.len() > MAX_KEY_LEN {
            return Err(TreeError::KeyTooLong);
        }
        // Probe first so the mutation pass below never copies nodes on a
        // miss.
        if self.get(key).is_none() {
            return Ok(None);
        }
        let root = self.root.take().expect("probe hit");
        let (new_root, old) = self.delete_rec(root, key, 0);
        self.root = new_root;
        self.size -= 1;
        Ok(Some(old))
    }

    /// Remove `key` below `n`, returning the replacement subtree (`None`
    /// when it vanishes) and the removed value. The caller has verified the
    /// key is present, so every descent step hits.
    #[expect(clippy::expect_used, reason = "the probe proved the key present")]
    fn delete_rec(
        &mut self,
        n: Arc<Node<V>>,
        key: &[u8],
        depth: usize,
    ) -> (Option<Arc<Node<V>>>, Arc<V>) {
        if let Some(leaf) = n.as_leaf() {
            let old = Arc::clone(&leaf.value);
            self.discard(n.id());
            return (None, old);
        }

        let depth = depth + n.prefix_len();
        if depth == key.len() {
            // The key terminates here: clear the inner-leaf slot.
            let mut node = self.writable(n);
            let leaf = node.clear_inner_leaf().expect("inner leaf present");
            self.discard(leaf.id());
            let old = Arc::clone(&leaf.as_leaf().expect("inner-leaf slot holds a leaf").value);
            return (self.normalize(node), old);
        }

        let c = key[depth];
        let mut node = self.writable(n);
        let child = node.take_child(c).expect("child present");
        let (new_child, old) = self.delete_rec(child, key, depth + 1);
        match new_child {
            Some(child) => {
                node.replace_child(c, child);
                (Some(Arc::new(node)), old)
            }
            None => {
                let node = node.remove_child(self, c);
                (self.normalize(node), old)
            }
        }
    }

    /// Re-establish structural invariants on a node that just lost a child
    /// or its inner leaf: a node with nothing left vanishes, a node holding
    /// only an inner leaf collapses to that leaf, and a node with a single
    /// edge and no inner leaf merges with its lone child.
    fn normalize(&mut self, mut node: Node<V>) -> Option<Arc<Node<V>>> {
        match (node.child_count(), node.inner_leaf().is_some()) {
            (0, false) => None,
            (0, true) => node.clear_inner_leaf(),
            (1, false) => Some(self.merge_with_child(node)),
            _ => Some(Arc::new(node)),
        }
    }

    /// Merge a single-edge node into its lone child. The merged node keeps
    /// the child's identity (copied first if the child belongs to the
    /// snapshot) and adopts `parent.prefix ++ edge byte ++ child.prefix`.
    /// When the combined length leaves the representable domain the parent
    /// is kept as-is; when the child is a leaf the leaf simply replaces the
    /// parent, its stored key already spelling the whole path.
    #[expect(clippy::expect_used, reason = "caller verified a single child")]
    fn merge_with_child(&mut self, mut node: Node<V>) -> Arc<Node<V>> {
        let (edge, _) = node.next_edge(0).expect("one child present");
        let child = node.take_child(edge).expect("one child present");

        if child.is_leaf() {
            return child;
        }

        let combined = node.prefix_len() + 1 + child.prefix_len();
        if combined > MAX_KEY_LEN {
            node.replace_child(edge, child);
            return Arc::new(node);
        }

        trace_log!(parent = node.id(), child = child.id(), combined, "merge with lone child");
        let mut merged = self.writable(child);
        let mut head = [0u8; MAX_PREFIX_LEN];
        let mut len = 0;
        for &b in node.inline_prefix() {
            if len == MAX_PREFIX_LEN {
                break;
            }
            head[len] = b;
            len += 1;
        }
        if len < MAX_PREFIX_LEN {
            head[len] = edge;
            len += 1;
        }
        for &b in merged.inline_prefix() {
            if len == MAX_PREFIX_LEN {
                break;
            }
            head[len] = b;
            len += 1;
        }
        merged.set_prefix_head(&head[..len], combined as u16);
        Arc::new(merged)
    }

    // ------------------------------------------------------------------
    //  Delete prefix
    // ------------------------------------------------------------------

    /// Delete the entire subtree of keys starting with `prefix`. Returns
    /// whether anything was removed.
    #[expect(clippy::expect_used, reason = "the probe proved a match exists")]
    pub fn delete_prefix(&mut self, prefix: &[u8]) -> bool {
        if !self.prefix_exists(prefix) {
            return false;
        }
        let root = self.root.take().expect("probe hit");
        let (new_root, removed) = self.delete_prefix_rec(root, prefix, 0);
        self.root = new_root;
        self.size -= removed;
        true
    }

    /// Whether any stored key starts with `prefix`.
    fn prefix_exists(&self, prefix: &[u8]) -> bool {
        let Some(root) = self.root.as_deref() else {
            return false;
        };
        let mut n = root;
        let mut depth = 0;
        loop {
            if let Some(leaf) = n.as_leaf() {
                return leaf.key.starts_with(prefix);
            }
            let p = n.full_prefix(depth);
            let rem = &prefix[depth..];
            let common = longest_common_prefix(p, rem);
            if common < p.len().min(rem.len()) {
                return false;
            }
            if rem.len() <= p.len() {
                return true;
            }
            depth += p.len();
            match n.find_child(prefix[depth]) {
                Some(child) => {
                    n = child.as_ref();
                    depth += 1;
                }
                None => return false,
            }
        }
    }

    /// Unlink the subtree under `prefix`, returning the replacement node
    /// and the number of removed keys. The caller has verified a match
    /// exists, so every descent step hits.
    #[expect(clippy::expect_used, reason = "the probe proved a match exists")]
    fn delete_prefix_rec(
        &mut self,
        n: Arc<Node<V>>,
        prefix: &[u8],
        depth: usize,
    ) -> (Option<Arc<Node<V>>>, usize) {
        if n.is_leaf() {
            self.discard(n.id());
            return (None, 1);
        }

        if prefix.len() <= depth + n.prefix_len() {
            // The whole subtree lies under the prefix.
            let removed = self.discard_subtree(&n);
            return (None, removed);
        }

        let depth = depth + n.prefix_len();
        let c = prefix[depth];
        let mut node = self.writable(n);
        let child = node.take_child(c).expect("child present");
        let (new_child, removed) = self.delete_prefix_rec(child, prefix, depth + 1);
        match new_child {
            Some(child) => {
                node.replace_child(c, child);
                (Some(Arc::new(node)), removed)
            }
            None => {
                let node = node.remove_child(self, c);
                (self.normalize(node), removed)
            }
        }
    }

    /// Record every snapshot identifier in the subtree as discarded and
    /// count the keys it held.
    fn discard_subtree(&mut self, n: &Arc<Node<V>>) -> usize {
        self.discard(n.id());
        if n.is_leaf() {
            return 1;
        }
        let mut removed = 0;
        if let Some(leaf) = n.inner_leaf_node() {
            self.discard(leaf.id());
            removed += 1;
        }
        let mut from = 0;
        while let Some((b, child)) = n.next_edge(from) {
            removed += self.discard_subtree(child);
            from = u16::from(b) + 1;
        }
        removed
    }
}

// ============================================================================
//  Test construction helpers
// ============================================================================

#[cfg(test)]
impl<V> Txn<V> {
    /// Mint an empty node4 for shape tests.
    pub(crate) fn test_node4(&mut self) -> Node4<V> {
        Node4::new(self.next_id())
    }

    /// Mint a standalone leaf for shape tests.
    pub(crate) fn test_leaf(&mut self, key: &[u8], value: V) -> Arc<Node<V>> {
        self.new_leaf(key, Arc::new(value))
    }
}
