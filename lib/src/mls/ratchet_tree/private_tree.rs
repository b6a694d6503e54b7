//! The local member's private keys, one optional slot per tree node.
//!
//! Only the own leaf and nodes on the own direct path are ever populated.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::RatchetTree;
use crate::mls::crypto::HPKEPrivateKey;
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{
    deserialize_optional_value, deserialize_vector, serialize_optional_value, serialize_vector,
    Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::{LeafIndex, NodeIndex};

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct PrivateTree(Vec<Option<HPKEPrivateKey>>);

impl PrivateTree {
    /// A column holding only the own leaf's key
    pub(crate) fn new(width: usize, leaf: LeafIndex, private_key: HPKEPrivateKey) -> Self {
        let mut nodes = vec![None; width];
        if let Some(slot) = nodes.get_mut(leaf.node_index().as_usize()) {
            *slot = Some(private_key);
        }
        Self(nodes)
    }

    pub fn width(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, node: NodeIndex) -> Option<&HPKEPrivateKey> {
        self.0.get(node.as_usize()).and_then(Option::as_ref)
    }

    pub(crate) fn set(&mut self, node: NodeIndex, private_key: HPKEPrivateKey) {
        if node.as_usize() >= self.0.len() {
            self.0.resize(node.as_usize() + 1, None);
        }
        self.0[node.as_usize()] = Some(private_key);
    }

    /// Follows the shape of `tree`: resizes to its width and forgets keys for
    /// nodes that are blank or off the own direct path.
    pub(crate) fn sync(&mut self, tree: &RatchetTree, own_leaf: LeafIndex) {
        self.0.resize(tree.width(), None);
        let own_node = own_leaf.node_index();
        let direct_path = tree.num_leaves().direct_path(own_node);
        for (i, slot) in self.0.iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)] // tree width fits in u32
            let node = NodeIndex(i as u32);
            let on_path = node == own_node || direct_path.contains(&node);
            if !on_path || tree.get(node).is_none() {
                *slot = None;
            }
        }
    }
}

impl Deserializer for PrivateTree {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut nodes = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            nodes.push(deserialize_optional_value(b)?);
            Ok(())
        })?;
        Ok(Self(nodes))
    }
}

impl Serializer for PrivateTree {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.0.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> {
                serialize_optional_value(self.0[i].as_ref(), b)
            },
        )
    }
}
