//! [RFC9420 Appendix C](https://www.rfc-editor.org/rfc/rfc9420.html#appendix-C) Array-based trees.
//!
//! Nodes of a left-balanced binary tree are laid out in an array: leaves at
//! even indices, parents at odd indices, and a node's level is the number of
//! trailing one bits of its index. The leaf count is always a power of two.

#[cfg(test)]
mod tree_math_test;

use bytes::{Buf, BufMut};
use std::fmt::{Display, Formatter};

use crate::mls::utilities::{
    error::Result,
    serde::{deserialize_u32, Deserializer, Serializer},
};

/// Position of a member in the leaf row
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LeafIndex(pub u32);

impl LeafIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Array slot of the leaf. Indices past the largest possible tree
    /// saturate to `u32::MAX`, which is never a valid slot.
    pub fn node_index(self) -> NodeIndex {
        NodeIndex(self.0.saturating_mul(2))
    }
}

impl Display for LeafIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deserializer for LeafIndex {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self(deserialize_u32(buf)?))
    }
}

impl Serializer for LeafIndex {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u32(self.0);
        Ok(())
    }
}

/// Position of a node in the array representation of the tree
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    pub fn is_leaf(self) -> bool {
        self.0 % 2 == 0
    }

    pub fn leaf_index(self) -> Option<LeafIndex> {
        self.is_leaf().then_some(LeafIndex(self.0 >> 1))
    }

    /// Number of trailing one bits, i.e. the height above the leaf row
    pub fn level(self) -> u32 {
        self.0.trailing_ones()
    }

    pub fn left(self) -> Option<NodeIndex> {
        let k = self.level();
        (k > 0).then(|| NodeIndex(self.0 ^ (1 << (k - 1))))
    }

    pub fn right(self) -> Option<NodeIndex> {
        let k = self.level();
        (k > 0).then(|| NodeIndex(self.0 ^ (3 << (k - 1))))
    }

    /// Whether `self` lies in the subtree rooted at `ancestor` (inclusive)
    pub fn is_in_subtree_of(self, ancestor: NodeIndex) -> bool {
        let span = (1u32 << ancestor.level()) - 1;
        self.0 >= ancestor.0 - span && self.0 <= ancestor.0 + span
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Size of the leaf row
#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct NumLeaves(pub u32);

impl NumLeaves {
    /// Recovers the leaf count from an array width of `2n - 1`, if `n` is a
    /// power of two.
    pub fn from_width(width: usize) -> Option<Self> {
        if width % 2 == 0 {
            return None;
        }
        let n = u32::try_from(width / 2 + 1).ok()?;
        n.is_power_of_two().then_some(NumLeaves(n))
    }

    /// Number of array slots, `2n - 1`
    pub fn width(self) -> u32 {
        if self.0 == 0 {
            0
        } else {
            2 * (self.0 - 1) + 1
        }
    }

    pub fn root(self) -> NodeIndex {
        let width = self.width();
        if width == 0 {
            return NodeIndex(0);
        }
        NodeIndex((1 << width.ilog2()) - 1)
    }

    pub fn contains(self, node: NodeIndex) -> bool {
        node.0 < self.width()
    }

    pub fn contains_leaf(self, leaf: LeafIndex) -> bool {
        leaf.0 < self.0
    }

    pub fn parent(self, node: NodeIndex) -> Option<NodeIndex> {
        if node == self.root() || !self.contains(node) {
            return None;
        }
        let k = node.level();
        let b = (node.0 >> (k + 1)) & 0x01;
        Some(NodeIndex((node.0 | (1 << k)) ^ (b << (k + 1))))
    }

    pub fn sibling(self, node: NodeIndex) -> Option<NodeIndex> {
        let p = self.parent(node)?;
        if node.0 < p.0 {
            p.right()
        } else {
            p.left()
        }
    }

    /// Parents of `node` up to and including the root, ordered leaf to root
    pub fn direct_path(self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![];
        let mut x = node;
        while let Some(p) = self.parent(x) {
            path.push(p);
            x = p;
        }
        path
    }

    /// Siblings of `node` and of each of its ancestors below the root
    pub fn copath(self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut path = vec![];
        let mut x = node;
        while let Some(p) = self.parent(x) {
            path.extend(if x.0 < p.0 { p.right() } else { p.left() });
            x = p;
        }
        path
    }

    /// Lowest node whose subtree contains both leaves `a` and `b`
    pub fn common_ancestor(self, a: NodeIndex, b: NodeIndex) -> NodeIndex {
        if a == b {
            return a;
        }
        let (mut xn, mut yn, mut k) = (a.0, b.0, 0u32);
        while xn != yn {
            xn >>= 1;
            yn >>= 1;
            k += 1;
        }
        NodeIndex((xn << k) + (1 << (k - 1)) - 1)
    }
}
