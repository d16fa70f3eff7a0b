//! # Artree
//!
//! An immutable, persistent Adaptive Radix Tree (ART) keyed by byte strings.
//!
//! The tree stores opaque values behind [`Arc`](std::sync::Arc) and supports
//! point lookup, longest-prefix lookup, ordered range iteration, and batched
//! mutation through an ephemeral [`Txn`] that commits to a new immutable
//! snapshot sharing unchanged structure with its predecessor.
//!
//! ## Design
//!
//! - Four inner node shapes (capacities 4, 16, 48, 256) grow and shrink to
//!   trade memory for lookup speed, as in the ART paper
//!   (<https://db.in.tum.de/~leis/papers/ART.pdf>).
//! - Compressed path prefixes store their first ten bytes inline; longer
//!   prefixes are recovered lazily through the minimum leaf below the node.
//! - Keys that are strict prefixes of other keys live in a dedicated
//!   inner-leaf slot, so every byte value (including `0x00`) is legal
//!   anywhere in a key.
//! - A transaction copies a node before the first write if the node belongs
//!   to the committed snapshot (`id <= max_snap_id`) and records the
//!   superseded identifiers, so an embedding host can perform bulk change
//!   notification against the committed snapshot.
//!
//! ## Concurrency
//!
//! Committed [`Tree`] values are immutable and may be read from any number
//! of threads without synchronization. A [`Txn`] mutates private copies and
//! is used by a single task; all mutating methods take `&mut self`.
//!
//! ## Example
//!
//! ```rust
//! use artree::Tree;
//!
//! let tree: Tree<&str> = Tree::new();
//! let (tree, _) = tree.insert(b"foo", "FOO").unwrap();
//! let (tree, _) = tree.insert(b"foobar", "FOOBAR").unwrap();
//!
//! assert_eq!(tree.get(b"foo"), Some(&"FOO"));
//! let (key, value) = tree.root().longest_prefix(b"fooba").unwrap();
//! assert_eq!((key, *value), (&b"foo"[..], "FOO"));
//! ```

pub mod key;

mod iter;
mod node;
mod trace;
mod tree;
mod txn;
mod view;

#[cfg(test)]
mod check;

pub use iter::Iter;
pub use key::MAX_KEY_LEN;
pub use node::{NodeId, MAX_PREFIX_LEN};
pub use tree::{Tree, TreeError};
pub use txn::{MutationSet, Txn};
pub use view::NodeView;
