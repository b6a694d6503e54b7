//! [RFC9420 Sec.7](https://www.rfc-editor.org/rfc/rfc9420.html#section-7) Ratchet Tree Operations
//!
//! The tree is stored as an array of optional nodes in the layout of
//! [`crate::mls::utilities::tree_math`]. Only public material lives here; the local member's
//! private keys are kept in a [`PrivateTree`] of the same width.

#[cfg(test)]
mod ratchet_tree_test;

pub mod leaf_node;
pub mod parent_node;
pub(crate) mod path;
pub mod private_tree;
pub mod update_path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub use self::leaf_node::LeafNode;
pub use self::parent_node::ParentNode;
pub use self::private_tree::PrivateTree;
pub use self::update_path::{HPKECiphertext, UpdatePath, UpdatePathNode};
use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, HPKEPublicKey};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_optional, deserialize_u8, deserialize_vector, serialize_opaque_vec,
    serialize_optional, serialize_vector, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex, NumLeaves};

/// Largest leaf row the tree may grow to
const MAX_LEAVES: u32 = 1 << 30;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum NodeType {
    Leaf = 1,
    Parent = 2,
}

impl TryFrom<u8> for NodeType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(NodeType::Leaf),
            2 => Ok(NodeType::Parent),
            _ => Err(Error::InvalidNodeType(v)),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Node {
    Leaf(LeafNode),
    Parent(ParentNode),
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self {
            Node::Leaf(_) => NodeType::Leaf,
            Node::Parent(_) => NodeType::Parent,
        }
    }

    pub fn encryption_key(&self) -> &HPKEPublicKey {
        match self {
            Node::Leaf(leaf_node) => leaf_node.encryption_key(),
            Node::Parent(parent_node) => &parent_node.encryption_key,
        }
    }
}

impl Deserializer for Node {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match NodeType::try_from(deserialize_u8(buf)?)? {
            NodeType::Leaf => Ok(Node::Leaf(LeafNode::deserialize(buf)?)),
            NodeType::Parent => Ok(Node::Parent(ParentNode::deserialize(buf)?)),
        }
    }
}

impl Serializer for Node {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(self.node_type() as u8);
        match self {
            Node::Leaf(leaf_node) => leaf_node.serialize(buf),
            Node::Parent(parent_node) => parent_node.serialize(buf),
        }
    }
}

fn serialize_optional_node<B: BufMut>(node: Option<&Node>, buf: &mut B) -> Result<()> {
    serialize_optional(node.is_some(), buf)?;
    if let Some(node) = node {
        node.serialize(buf)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RatchetTree(pub(crate) Vec<Option<Node>>);

impl RatchetTree {
    /// A one-member tree
    pub fn new(leaf_node: LeafNode) -> Self {
        Self(vec![Some(Node::Leaf(leaf_node))])
    }

    #[allow(clippy::cast_possible_truncation)] // width is bounded by MAX_LEAVES
    pub fn num_leaves(&self) -> NumLeaves {
        NumLeaves(self.0.len().div_ceil(2) as u32)
    }

    /// Number of array slots
    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, node: NodeIndex) -> Option<&Node> {
        self.0.get(node.as_usize()).and_then(Option::as_ref)
    }

    pub fn get_leaf(&self, leaf: LeafIndex) -> Option<&LeafNode> {
        if !self.num_leaves().contains_leaf(leaf) {
            return None;
        }
        match self.get(leaf.node_index()) {
            Some(Node::Leaf(leaf_node)) => Some(leaf_node),
            _ => None,
        }
    }

    /// Non-blank leaves in index order
    pub fn leaves(&self) -> impl Iterator<Item = (LeafIndex, &LeafNode)> {
        (0..self.num_leaves().0)
            .map(LeafIndex)
            .filter_map(|leaf| self.get_leaf(leaf).map(|leaf_node| (leaf, leaf_node)))
    }

    pub fn find_leaf(&self, leaf_node: &LeafNode) -> Option<LeafIndex> {
        self.leaves()
            .find(|(_, candidate)| *candidate == leaf_node)
            .map(|(leaf, _)| leaf)
    }

    fn check_leaf(&self, leaf: LeafIndex) -> Result<()> {
        if !self.num_leaves().contains_leaf(leaf) {
            return Err(Error::InvalidLeafIndex(leaf.0));
        }
        if self.get_leaf(leaf).is_none() {
            return Err(Error::BlankLeaf(leaf.0));
        }
        Ok(())
    }

    /// Places `leaf_node` in the leftmost blank leaf, doubling the leaf row
    /// when there is none, and marks it unmerged along its direct path.
    pub fn add_leaf(&mut self, leaf_node: LeafNode) -> Result<LeafIndex> {
        let num_leaves = self.num_leaves();
        let blank = (0..num_leaves.0)
            .map(LeafIndex)
            .find(|leaf| self.get(leaf.node_index()).is_none());
        let leaf = match blank {
            Some(leaf) => leaf,
            None => {
                if num_leaves.0 >= MAX_LEAVES {
                    return Err(Error::TreeFull);
                }
                let grown = NumLeaves(num_leaves.0 * 2);
                self.0.resize(grown.width() as usize, None);
                LeafIndex(num_leaves.0)
            }
        };

        self.0[leaf.node_index().as_usize()] = Some(Node::Leaf(leaf_node));
        for parent in self.num_leaves().direct_path(leaf.node_index()) {
            if let Some(Node::Parent(parent_node)) = &mut self.0[parent.as_usize()] {
                parent_node.add_unmerged_leaf(leaf);
            }
        }

        Ok(leaf)
    }

    /// Replaces a member's leaf and blanks its direct path
    pub fn update_leaf(&mut self, leaf: LeafIndex, leaf_node: LeafNode) -> Result<()> {
        self.check_leaf(leaf)?;
        self.0[leaf.node_index().as_usize()] = Some(Node::Leaf(leaf_node));
        self.blank_direct_path(leaf);
        Ok(())
    }

    /// Removes a member: blanks the leaf and its direct path, then drops the
    /// right half of the tree while it is empty.
    pub fn blank_leaf(&mut self, leaf: LeafIndex) -> Result<()> {
        self.check_leaf(leaf)?;
        self.0[leaf.node_index().as_usize()] = None;
        self.blank_direct_path(leaf);
        self.truncate();
        Ok(())
    }

    fn blank_direct_path(&mut self, leaf: LeafIndex) {
        for parent in self.num_leaves().direct_path(leaf.node_index()) {
            self.0[parent.as_usize()] = None;
        }
    }

    fn truncate(&mut self) {
        loop {
            let n = self.num_leaves().0;
            if n <= 1 {
                return;
            }
            let right_half_blank =
                (n / 2..n).all(|leaf| self.get(LeafIndex(leaf).node_index()).is_none());
            if !right_half_blank {
                return;
            }
            self.0.truncate(NumLeaves(n / 2).width() as usize);
        }
    }

    /// [RFC9420 Sec.4.1.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-4.1.1) The minimal set
    /// of non-blank nodes covering all leaves below `node`
    pub fn resolution(&self, node: NodeIndex) -> Vec<NodeIndex> {
        match self.get(node) {
            Some(Node::Leaf(_)) => vec![node],
            Some(Node::Parent(parent_node)) => std::iter::once(node)
                .chain(parent_node.unmerged_leaves.iter().map(|l| l.node_index()))
                .collect(),
            None => match (node.left(), node.right()) {
                (Some(left), Some(right)) => {
                    let mut resolution = self.resolution(left);
                    resolution.extend(self.resolution(right));
                    resolution
                }
                _ => vec![],
            },
        }
    }

    /// Direct path of `leaf` paired with the copath child under each node,
    /// skipping nodes whose copath child resolves to nothing. Ordered leaf to
    /// root.
    pub fn filtered_direct_path_with_copath(&self, leaf: LeafIndex) -> Vec<(NodeIndex, NodeIndex)> {
        let num_leaves = self.num_leaves();
        let node = leaf.node_index();
        num_leaves
            .direct_path(node)
            .into_iter()
            .zip(num_leaves.copath(node))
            .filter(|(_, copath_child)| !self.resolution(*copath_child).is_empty())
            .collect()
    }

    pub fn filtered_direct_path(&self, leaf: LeafIndex) -> Vec<NodeIndex> {
        self.filtered_direct_path_with_copath(leaf)
            .into_iter()
            .map(|(parent, _)| parent)
            .collect()
    }

    /// For each node of the filtered direct path of `leaf`, the nodes a path
    /// secret for it must be encrypted to, in resolution order. Leaves listed
    /// in `exclude` (members joining in the same commit) are left out.
    pub fn resolve_copath(
        &self,
        leaf: LeafIndex,
        exclude: &[LeafIndex],
    ) -> Vec<(NodeIndex, Vec<NodeIndex>)> {
        self.filtered_direct_path_with_copath(leaf)
            .into_iter()
            .map(|(parent, copath_child)| {
                let resolution = self
                    .resolution(copath_child)
                    .into_iter()
                    .filter(|node| {
                        node.leaf_index()
                            .map_or(true, |leaf| !exclude.contains(&leaf))
                    })
                    .collect();
                (parent, resolution)
            })
            .collect()
    }

    /// Installs a committer's new leaf and the public keys of its filtered
    /// direct path; the rest of the direct path is blanked.
    pub(crate) fn merge_path(
        &mut self,
        sender: LeafIndex,
        leaf_node: LeafNode,
        path_keys: Vec<HPKEPublicKey>,
    ) -> Result<()> {
        self.check_leaf(sender)?;
        let filtered = self.filtered_direct_path(sender);
        if filtered.len() != path_keys.len() {
            return Err(Error::UpdatePathLengthMismatch {
                expected: filtered.len(),
                actual: path_keys.len(),
            });
        }

        self.blank_direct_path(sender);
        for (parent, encryption_key) in filtered.into_iter().zip(path_keys) {
            self.0[parent.as_usize()] = Some(Node::Parent(ParentNode::new(encryption_key)));
        }
        self.0[sender.node_index().as_usize()] = Some(Node::Leaf(leaf_node));

        Ok(())
    }

    /// [RFC9420 Sec.7.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.8) Tree hash of the
    /// root, recomputed from scratch on every call
    pub fn tree_hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<Bytes> {
        self.node_hash(crypto_provider, cipher_suite, self.num_leaves().root())
    }

    fn node_hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        node: NodeIndex,
    ) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        if let Some(leaf) = node.leaf_index() {
            buf.put_u8(NodeType::Leaf as u8);
            leaf.serialize(&mut buf)?;
            serialize_optional_node(self.get(node), &mut buf)?;
        } else {
            let (Some(left), Some(right)) = (node.left(), node.right()) else {
                return Err(Error::InvalidNodeIndex(node.0));
            };
            let left_hash = self.node_hash(crypto_provider, cipher_suite, left)?;
            let right_hash = self.node_hash(crypto_provider, cipher_suite, right)?;

            buf.put_u8(NodeType::Parent as u8);
            serialize_optional_node(self.get(node), &mut buf)?;
            serialize_opaque_vec(&left_hash, &mut buf)?;
            serialize_opaque_vec(&right_hash, &mut buf)?;
        }
        Ok(crypto_provider.hash(cipher_suite)?.digest(&buf))
    }
}

impl Deserializer for RatchetTree {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut nodes = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            let node = if deserialize_optional(b)? {
                Some(Node::deserialize(b)?)
            } else {
                None
            };
            nodes.push(node);
            Ok(())
        })?;

        let num_leaves = NumLeaves::from_width(nodes.len())
            .filter(|n| n.0 <= MAX_LEAVES)
            .ok_or(Error::InvalidTreeSize(nodes.len()))?;
        for (i, node) in nodes.iter().enumerate() {
            let expected = if i % 2 == 0 {
                NodeType::Leaf
            } else {
                NodeType::Parent
            };
            if node.as_ref().is_some_and(|n| n.node_type() != expected) {
                return Err(Error::NodeTypeMismatch);
            }
            // unmerged leaves must sit below the parent that lists them
            if let Some(Node::Parent(parent_node)) = node {
                let parent = NodeIndex(u32::try_from(i).map_err(|_| Error::InvalidTreeSize(i))?);
                for leaf in &parent_node.unmerged_leaves {
                    if !num_leaves.contains_leaf(*leaf)
                        || !leaf.node_index().is_in_subtree_of(parent)
                    {
                        return Err(Error::InvalidLeafIndex(leaf.0));
                    }
                }
            }
        }

        Ok(Self(nodes))
    }
}

impl Serializer for RatchetTree {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.0.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                serialize_optional_node(self.0[i].as_ref(), b)
            },
        )
    }
}
