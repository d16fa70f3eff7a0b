//! Filepath: src/node/node256.rs
//!
//! The largest inner shape: a full 256-entry pointer array, so lookup is a
//! direct index with no separate indexing structure.

use std::sync::Arc;

use crate::node::node48::Node48;
use crate::node::{InnerHeader, Node, NodeId};
use crate::trace::trace_log;
use crate::txn::Txn;

pub(crate) struct Node256<V> {
    pub(crate) header: InnerHeader<V>,
    pub(crate) children: [Option<Arc<Node<V>>>; 256],
}

impl<V> Node256<V> {
    pub(crate) fn new(id: NodeId) -> Self {
        Self {
            header: InnerHeader::new(id),
            children: std::array::from_fn(|_| None),
        }
    }

    #[inline]
    fn count(&self) -> usize {
        self.header.n_children as usize
    }

    pub(crate) fn index_of(&self, c: u8) -> Option<usize> {
        self.children[c as usize].is_some().then_some(c as usize)
    }

    pub(crate) fn find_child(&self, c: u8) -> Option<&Arc<Node<V>>> {
        self.children[c as usize].as_ref()
    }

    /// Constant-time direct slotting; a node256 never grows.
    pub(crate) fn add_child(mut self, _txn: &mut Txn<V>, c: u8, child: Arc<Node<V>>) -> Node<V> {
        debug_assert!(self.children[c as usize].is_none());
        self.children[c as usize] = Some(child);
        self.header.n_children += 1;
        Node::Node256(self)
    }

    /// Remove the child under `c`. A removal made against exactly
    /// forty-nine children shrinks into a node48.
    pub(crate) fn remove_child(mut self, txn: &mut Txn<V>, c: u8) -> Node<V> {
        if self.children[c as usize].is_none() {
            return Node::Node256(self);
        }

        if self.count() == 49 {
            let mut n48 = Node48::new(txn.next_id());
            trace_log!(from = self.header.id, to = n48.header.id, "shrink node256 -> node48");
            n48.header.inherit(&mut self.header);
            let mut slot = 0;
            for b in 0..256 {
                if b == c as usize {
                    continue;
                }
                if let Some(child) = self.children[b].take() {
                    n48.index[b] = (slot + 1) as u8;
                    n48.children[slot] = Some(child);
                    slot += 1;
                }
            }
            n48.header.n_children = 48;
            return Node::Node48(n48);
        }

        self.children[c as usize] = None;
        self.header.n_children -= 1;
        Node::Node256(self)
    }

    pub(crate) fn replace_child(&mut self, c: u8, child: Arc<Node<V>>) {
        self.children[c as usize] = Some(child);
    }

    pub(crate) fn take_child(&mut self, c: u8) -> Option<Arc<Node<V>>> {
        self.children[c as usize].take()
    }

    pub(crate) fn min_child(&self) -> Option<&Arc<Node<V>>> {
        self.children.iter().find_map(Option::as_ref)
    }

    pub(crate) fn max_child(&self) -> Option<&Arc<Node<V>>> {
        self.children.iter().rev().find_map(Option::as_ref)
    }

    pub(crate) fn next_edge(&self, from: u16) -> Option<(u8, &Arc<Node<V>>)> {
        for b in from..256 {
            if let Some(child) = self.children[b as usize].as_ref() {
                return Some((b as u8, child));
            }
        }
        None
    }

    pub(crate) fn copy(&self, txn: &mut Txn<V>) -> Node<V> {
        Node::Node256(Self {
            header: self.header.copy_with_id(txn.next_id()),
            children: std::array::from_fn(|i| self.children[i].clone()),
        })
    }
}
