//! Filepath: src/check.rs
//!
//! Structural invariant checker, compiled for tests only.
//!
//! `check_tree` walks a committed tree and asserts everything the node
//! model promises: per-shape index layout, child counts, prefix bookkeeping
//! against the actual leaf keys, identifier uniqueness, and global key
//! ordering. Tests call it after mutations so a violation fails at the
//! mutation that introduced it rather than at some later lookup.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;

use crate::node::{Node, NodeId, MAX_PREFIX_LEN};
use crate::tree::Tree;

/// Assert every structural invariant of `tree`.
pub(crate) fn check_tree<V>(tree: &Tree<V>) {
    let mut ids: HashSet<NodeId> = HashSet::new();
    let mut path: Vec<u8> = Vec::new();
    if let Some(root) = tree.root.as_ref() {
        check_node(root, &mut path, tree.max_id, &mut ids);
    }

    let keys: Vec<&[u8]> = tree.iter().map(|(k, _)| k).collect();
    assert_eq!(keys.len(), tree.len(), "size matches the number of leaves");
    for pair in keys.windows(2) {
        assert!(pair[0] < pair[1], "iteration is strictly ascending");
    }
}

/// Every identifier reachable from `tree`.
pub(crate) fn collect_ids<V>(tree: &Tree<V>) -> HashSet<NodeId> {
    fn walk<V>(n: &Arc<Node<V>>, ids: &mut HashSet<NodeId>) {
        ids.insert(n.id());
        if let Some(leaf) = n.inner_leaf_node() {
            ids.insert(leaf.id());
        }
        let mut from = 0;
        while let Some((b, child)) = n.next_edge(from) {
            walk(child, ids);
            from = u16::from(b) + 1;
        }
    }

    let mut ids = HashSet::new();
    if let Some(root) = tree.root.as_ref() {
        walk(root, &mut ids);
    }
    ids
}

fn check_node<V>(
    n: &Arc<Node<V>>,
    path: &mut Vec<u8>,
    max_id: NodeId,
    ids: &mut HashSet<NodeId>,
) {
    assert!(n.id() > 0, "identifiers start at one");
    assert!(n.id() <= max_id, "identifier within the minted range");
    assert!(ids.insert(n.id()), "identifier {} appears twice", n.id());

    match n.as_ref() {
        Node::Leaf(leaf) => {
            assert!(
                leaf.key.starts_with(path),
                "leaf key spells the path that reaches it"
            );
        }
        inner => {
            let count = inner.child_count();
            let prefix_len = inner.prefix_len();
            let depth = path.len();

            // The stored prefix must agree with the keys below. Resolving
            // through the minimum leaf also exercises lazy resolution for
            // prefixes longer than the inline buffer.
            let full = inner.full_prefix(depth).to_vec();
            assert_eq!(full.len(), prefix_len, "resolved prefix has the logical length");
            assert_eq!(
                &full[..full.len().min(MAX_PREFIX_LEN)],
                inner.inline_prefix(),
                "inline buffer holds the first prefix bytes"
            );

            check_shape(inner, count);
            assert!(
                count >= 1 || inner.inner_leaf().is_some(),
                "an inner node holds children or an inner leaf"
            );

            path.extend_from_slice(&full);
            if let Some(leaf_node) = inner.inner_leaf_node() {
                let leaf = leaf_node.as_leaf().expect("inner-leaf slot holds a leaf");
                assert!(leaf_node.is_leaf());
                assert_eq!(
                    &*leaf.key, &**path,
                    "inner leaf key equals the node's path"
                );
                assert!(ids.insert(leaf.id), "identifier {} appears twice", leaf.id);
                assert!(leaf.id <= max_id);
            }

            let mut seen = 0;
            let mut from = 0;
            let mut last_edge: Option<u8> = None;
            while let Some((b, child)) = inner.next_edge(from) {
                if let Some(prev) = last_edge {
                    assert!(b > prev, "edges enumerate in ascending order");
                }
                last_edge = Some(b);
                seen += 1;
                path.push(b);
                check_node(child, path, max_id, ids);
                path.pop();
                from = u16::from(b) + 1;
            }
            assert_eq!(seen, count, "child count matches the occupied slots");
            path.truncate(depth);
        }
    }
}

/// Shape-specific layout checks.
fn check_shape<V>(n: &Node<V>, count: usize) {
    match n {
        Node::Leaf(_) => unreachable!("caller dispatches on inner nodes"),
        Node::Node4(n4) => {
            assert!((1..=4).contains(&count) || (count == 0 && n4.header.leaf.is_some()));
            assert_sorted(&n4.index[..count]);
            assert_occupancy(&n4.children, count);
        }
        Node::Node16(n16) => {
            assert!((5..=16).contains(&count), "node16 holds 5-16 children, has {count}");
            assert_sorted(&n16.index[..count]);
            assert_occupancy(&n16.children, count);
        }
        Node::Node48(n48) => {
            assert!((17..=48).contains(&count), "node48 holds 17-48 children, has {count}");
            let mut slots: Vec<u8> = n48.index.iter().copied().filter(|&s| s != 0).collect();
            slots.sort_unstable();
            let expected: Vec<u8> = (1..=count as u8).collect();
            assert_eq!(slots, expected, "non-zero index entries are a permutation of 1..=count");
            assert_occupancy(&n48.children, count);
        }
        Node::Node256(n256) => {
            assert!((49..=256).contains(&count), "node256 holds 49-256 children, has {count}");
            let occupied = n256.children.iter().filter(|c| c.is_some()).count();
            assert_eq!(occupied, count);
        }
    }
}

fn assert_sorted(index: &[u8]) {
    for pair in index.windows(2) {
        assert!(pair[0] < pair[1], "index is sorted and duplicate-free");
    }
}

fn assert_occupancy<V>(children: &[Option<Arc<Node<V>>>], count: usize) {
    for (i, child) in children.iter().enumerate() {
        assert_eq!(
            child.is_some(),
            i < count,
            "slot {i} occupancy disagrees with the child count"
        );
    }
}
