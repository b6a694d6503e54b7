//! Persisted form of a [`Group`].
//!
//! ```text
//! struct {
//!     GroupContext group_context;
//!     optional<Node> ratchet_tree<V>;
//!     opaque interim_transcript_hash<V>;
//!     opaque psk_secret<V>;
//!     opaque epoch_secret<V>;
//!     opaque init_secret<V>;
//!     uint32 own_leaf;
//!     optional<HPKEPrivateKey> private_tree<V>;
//!     opaque signature_private_key<V>;
//!     PendingProposal pending_proposals<V>;
//!     SecretTree secret_tree;
//!     optional<PendingCommit> pending_commit;
//!     optional<PendingUpdate> pending_update;
//! } GroupState;
//! ```
//!
//! Only secrets of the current epoch are part of it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{HPKEPrivateKey, HPKEPublicKey, Secret, SignaturePrivateKey};
use crate::mls::framing::{Proposal, ProposalRef};
use crate::mls::group::{Group, PendingCommit, PendingProposal, PendingUpdate};
use crate::mls::key_schedule::{GroupContext, KeySchedule};
use crate::mls::ratchet_tree::{PrivateTree, RatchetTree};
use crate::mls::secret_tree::SecretTree;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_optional_value, deserialize_vector, serialize_opaque_vec,
    serialize_optional_value, serialize_vector, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

impl Deserializer for PendingProposal {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            proposal_ref: ProposalRef::deserialize(buf)?,
            proposal: Proposal::deserialize(buf)?,
            sender: LeafIndex::deserialize(buf)?,
        })
    }
}

impl Serializer for PendingProposal {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.proposal_ref.serialize(buf)?;
        self.proposal.serialize(buf)?;
        self.sender.serialize(buf)
    }
}

impl Deserializer for PendingCommit {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            content_hash: deserialize_opaque_vec(buf)?,
            leaf_secret: Secret::deserialize(buf)?,
        })
    }
}

impl Serializer for PendingCommit {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.content_hash, buf)?;
        self.leaf_secret.serialize(buf)
    }
}

impl Deserializer for PendingUpdate {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            encryption_key: HPKEPublicKey::deserialize(buf)?,
            private_key: HPKEPrivateKey::deserialize(buf)?,
        })
    }
}

impl Serializer for PendingUpdate {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.encryption_key.serialize(buf)?;
        self.private_key.serialize(buf)
    }
}

impl Deserializer for Group {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let group_context = GroupContext::deserialize(buf)?;
        let ratchet_tree = RatchetTree::deserialize(buf)?;
        let interim_transcript_hash = deserialize_opaque_vec(buf)?;
        let psk_secret = Secret::deserialize(buf)?;
        let epoch_secret = Secret::deserialize(buf)?;
        let init_secret = Secret::deserialize(buf)?;
        let own_leaf = LeafIndex::deserialize(buf)?;
        let private_tree = PrivateTree::deserialize(buf)?;
        let signature_key = SignaturePrivateKey::deserialize(buf)?;

        let mut pending_proposals = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            pending_proposals.push(PendingProposal::deserialize(b)?);
            Ok(())
        })?;

        let secret_tree = SecretTree::deserialize(buf)?;
        let pending_commit = deserialize_optional_value(buf)?;
        let pending_update = deserialize_optional_value(buf)?;

        if private_tree.width() != ratchet_tree.width() {
            return Err(Error::PrivateTreeSizeMismatch {
                expected: ratchet_tree.width(),
                actual: private_tree.width(),
            });
        }
        if ratchet_tree.get_leaf(own_leaf).is_none() {
            return Err(Error::OwnLeafNotFound);
        }
        if secret_tree.num_leaves() != ratchet_tree.num_leaves() {
            return Err(Error::InvalidTreeSize(ratchet_tree.width()));
        }
        if secret_tree.own_leaf() != own_leaf
            || secret_tree.cipher_suite() != group_context.cipher_suite
        {
            return Err(Error::SecretTreeMismatch);
        }

        Ok(Self {
            group_context,
            ratchet_tree,
            interim_transcript_hash,
            key_schedule: KeySchedule {
                init_secret,
                epoch_secret,
                psk_secret,
            },
            own_leaf,
            private_tree,
            signature_key,
            pending_proposals,
            secret_tree,
            pending_commit,
            pending_update,
        })
    }
}

impl Serializer for Group {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.group_context.serialize(buf)?;
        self.ratchet_tree.serialize(buf)?;
        serialize_opaque_vec(&self.interim_transcript_hash, buf)?;
        self.key_schedule.psk_secret.serialize(buf)?;
        self.key_schedule.epoch_secret.serialize(buf)?;
        self.key_schedule.init_secret.serialize(buf)?;
        self.own_leaf.serialize(buf)?;
        self.private_tree.serialize(buf)?;
        self.signature_key.serialize(buf)?;
        serialize_vector(
            self.pending_proposals.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.pending_proposals[i].serialize(b) },
        )?;
        self.secret_tree.serialize(buf)?;
        serialize_optional_value(self.pending_commit.as_ref(), buf)?;
        serialize_optional_value(self.pending_update.as_ref(), buf)
    }
}
