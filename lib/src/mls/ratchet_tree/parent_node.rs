//! [RFC9420 Sec.7.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.1) Parent Node Contents

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::HPKEPublicKey;
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{deserialize_vector, serialize_vector, Deserializer, Serializer};
use crate::mls::utilities::tree_math::LeafIndex;

/// A parent node's public key, plus the leaves added below it since the key
/// was last set (they do not know its private key yet)
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ParentNode {
    pub(crate) encryption_key: HPKEPublicKey,
    pub(crate) unmerged_leaves: Vec<LeafIndex>,
}

impl ParentNode {
    pub(crate) fn new(encryption_key: HPKEPublicKey) -> Self {
        Self {
            encryption_key,
            unmerged_leaves: vec![],
        }
    }

    pub(crate) fn add_unmerged_leaf(&mut self, leaf: LeafIndex) {
        if let Err(pos) = self.unmerged_leaves.binary_search(&leaf) {
            self.unmerged_leaves.insert(pos, leaf);
        }
    }
}

impl Deserializer for ParentNode {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let encryption_key = HPKEPublicKey::deserialize(buf)?;
        let mut unmerged_leaves = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            unmerged_leaves.push(LeafIndex::deserialize(b)?);
            Ok(())
        })?;
        Ok(Self {
            encryption_key,
            unmerged_leaves,
        })
    }
}

impl Serializer for ParentNode {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.encryption_key.serialize(buf)?;
        serialize_vector(
            self.unmerged_leaves.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.unmerged_leaves[i].serialize(b) },
        )
    }
}
