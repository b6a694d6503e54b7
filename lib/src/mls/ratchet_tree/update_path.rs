//! [RFC9420 Sec.7.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.6) Update Paths

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{path::PathNodeSecret, LeafNode, PrivateTree, RatchetTree};
use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, HPKEPublicKey, Secret};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_vector, serialize_opaque_vec, serialize_vector,
    Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

const UPDATE_PATH_NODE_LABEL: &[u8] = b"UpdatePathNode";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HPKECiphertext {
    pub(crate) kem_output: Bytes,
    pub(crate) ciphertext: Bytes,
}

impl Deserializer for HPKECiphertext {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let kem_output = deserialize_opaque_vec(buf)?;
        let ciphertext = deserialize_opaque_vec(buf)?;
        Ok(Self {
            kem_output,
            ciphertext,
        })
    }
}

impl Serializer for HPKECiphertext {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.kem_output, buf)?;
        serialize_opaque_vec(&self.ciphertext, buf)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UpdatePathNode {
    pub(crate) encryption_key: HPKEPublicKey,
    pub(crate) encrypted_path_secret: Vec<HPKECiphertext>,
}

impl Deserializer for UpdatePathNode {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let encryption_key = HPKEPublicKey::deserialize(buf)?;
        let mut encrypted_path_secret = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            encrypted_path_secret.push(HPKECiphertext::deserialize(b)?);
            Ok(())
        })?;
        Ok(Self {
            encryption_key,
            encrypted_path_secret,
        })
    }
}

impl Serializer for UpdatePathNode {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.encryption_key.serialize(buf)?;
        serialize_vector(
            self.encrypted_path_secret.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.encrypted_path_secret[i].serialize(b) },
        )
    }
}

/// The committer's new leaf plus, for every node of its filtered direct path,
/// the node's new public key and its path secret encrypted to the copath
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UpdatePath {
    pub(crate) leaf_node: LeafNode,
    pub(crate) nodes: Vec<UpdatePathNode>,
}

impl UpdatePath {
    /// `path_secrets` are the secrets of the filtered direct path of `sender`
    /// in `tree`, leaf to root.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        tree: &RatchetTree,
        sender: LeafIndex,
        leaf_node: LeafNode,
        path_secrets: &[PathNodeSecret],
        exclude: &[LeafIndex],
        group_context: &[u8],
    ) -> Result<Self> {
        let copath = tree.resolve_copath(sender, exclude);
        if copath.len() != path_secrets.len() {
            return Err(Error::UpdatePathLengthMismatch {
                expected: copath.len(),
                actual: path_secrets.len(),
            });
        }

        let mut nodes = Vec::with_capacity(path_secrets.len());
        for ((_, resolution), secret) in copath.iter().zip(path_secrets) {
            let mut encrypted_path_secret = Vec::with_capacity(resolution.len());
            for recipient in resolution {
                let public_key = tree
                    .get(*recipient)
                    .ok_or(Error::InvalidNodeIndex(recipient.0))?
                    .encryption_key();
                let (kem_output, ciphertext) = crypto_provider.encrypt_with_label(
                    cipher_suite,
                    public_key,
                    UPDATE_PATH_NODE_LABEL,
                    group_context,
                    &secret.path_secret,
                )?;
                encrypted_path_secret.push(HPKECiphertext {
                    kem_output,
                    ciphertext,
                });
            }
            nodes.push(UpdatePathNode {
                encryption_key: secret.key_pair.public_key.clone(),
                encrypted_path_secret,
            });
        }

        Ok(Self { leaf_node, nodes })
    }

    pub(crate) fn public_keys(&self) -> Vec<HPKEPublicKey> {
        self.nodes
            .iter()
            .map(|n| n.encryption_key.clone())
            .collect()
    }

    /// Finds the path node at the lowest common ancestor of `sender` and
    /// `receiver` and decrypts its path secret with a key the receiver holds.
    /// Returns the position in the filtered direct path and the secret.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn decrypt_path_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        tree: &RatchetTree,
        private_tree: &PrivateTree,
        sender: LeafIndex,
        receiver: LeafIndex,
        exclude: &[LeafIndex],
        group_context: &[u8],
    ) -> Result<(usize, Secret)> {
        let copath = tree.resolve_copath(sender, exclude);
        if copath.len() != self.nodes.len() {
            return Err(Error::UpdatePathLengthMismatch {
                expected: copath.len(),
                actual: self.nodes.len(),
            });
        }

        let receiver_node = receiver.node_index();
        let Some(position) = copath
            .iter()
            .position(|(parent, _)| receiver_node.is_in_subtree_of(*parent))
        else {
            return Err(Error::NoDecryptablePathSecret);
        };

        let (_, resolution) = &copath[position];
        let update_path_node = &self.nodes[position];
        if update_path_node.encrypted_path_secret.len() != resolution.len() {
            return Err(Error::UpdatePathLengthMismatch {
                expected: resolution.len(),
                actual: update_path_node.encrypted_path_secret.len(),
            });
        }

        let (index, private_key) = resolution
            .iter()
            .enumerate()
            .find_map(|(i, node)| private_tree.get(*node).map(|key| (i, key)))
            .ok_or(Error::NoDecryptablePathSecret)?;

        let ciphertext = &update_path_node.encrypted_path_secret[index];
        let path_secret = crypto_provider.decrypt_with_label(
            cipher_suite,
            private_key,
            UPDATE_PATH_NODE_LABEL,
            group_context,
            &ciphertext.kem_output,
            &ciphertext.ciphertext,
        )?;

        Ok((position, Secret::new(Vec::from(path_secret))))
    }
}

impl Deserializer for UpdatePath {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let leaf_node = LeafNode::deserialize(buf)?;
        let mut nodes = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            nodes.push(UpdatePathNode::deserialize(b)?);
            Ok(())
        })?;
        Ok(Self { leaf_node, nodes })
    }
}

impl Serializer for UpdatePath {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.leaf_node.serialize(buf)?;
        serialize_vector(
            self.nodes.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.nodes[i].serialize(b) },
        )
    }
}
