//! [RFC9420 Sec.11](https://www.rfc-editor.org/rfc/rfc9420.html#section-11) Group Creation and
//! [RFC9420 Sec.12](https://www.rfc-editor.org/rfc/rfc9420.html#section-12) Group Evolution
//!
//! A group is always created with a single member, the "creator". Other members are then added to
//! the group using the usual Add/Commit mechanism.
//!
//! Over the lifetime of a group, its membership can change, and existing members might want to
//! change their keys in order to achieve post-compromise security.
//!
//! Every operation that changes the epoch works on a copy of the group and
//! only replaces `self` once the whole commit has been checked, so a failed
//! call leaves the group as it was.

use bytes::Bytes;

use crate::mls::crypto::{
    cipher_suite::CipherSuite, credential::Credential, provider::CryptoProvider, HPKEPrivateKey,
    HPKEPublicKey, Secret, SignaturePrivateKey,
};
use crate::mls::framing::{MlsGroupId, Proposal, ProposalRef};
use crate::mls::key_schedule::{GroupContext, KeySchedule};
use crate::mls::ratchet_tree::{private_tree::PrivateTree, RatchetTree};
use crate::mls::secret_tree::SecretTree;
use crate::mls::utilities::error::Result;
use crate::mls::utilities::tree_math::LeafIndex;


pub mod config;
pub mod creation;
pub mod evolution;
pub mod message;
pub mod state;
pub mod transcript;

/// A proposal received or sent during the current epoch, waiting for a
/// commit to reference it
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingProposal {
    pub proposal_ref: ProposalRef,
    pub proposal: Proposal,
    pub sender: LeafIndex,
}

/// What the local member needs to apply a commit it created itself
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct PendingCommit {
    /// Hash of the framed commit content, to recognise it when it comes back
    pub(crate) content_hash: Bytes,
    pub(crate) leaf_secret: Secret,
}

/// The new leaf key of an Update the local member proposed
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct PendingUpdate {
    pub(crate) encryption_key: HPKEPublicKey,
    pub(crate) private_key: HPKEPrivateKey,
}

/// Outcome of [`Group::process_message`]
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReceivedMessage {
    ApplicationMessage(Bytes),
    /// A proposal was staged under this reference
    Proposal(ProposalRef),
    /// A commit was applied and the group is now at `epoch`
    Commit { epoch: u64 },
    /// A commit removed the local member. The group is left at the epoch the
    /// member was removed from.
    Removed,
}

/// One member's view of an MLS group
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Group {
    group_context: GroupContext,
    ratchet_tree: RatchetTree,
    interim_transcript_hash: Bytes,
    key_schedule: KeySchedule,
    own_leaf: LeafIndex,
    private_tree: PrivateTree,
    signature_key: SignaturePrivateKey,
    pending_proposals: Vec<PendingProposal>,
    secret_tree: SecretTree,
    pending_commit: Option<PendingCommit>,
    pending_update: Option<PendingUpdate>,
}

impl Group {
    pub fn group_id(&self) -> &MlsGroupId {
        &self.group_context.group_id
    }

    pub fn epoch(&self) -> u64 {
        self.group_context.epoch
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.group_context.cipher_suite
    }

    pub fn group_context(&self) -> &GroupContext {
        &self.group_context
    }

    pub fn ratchet_tree(&self) -> &RatchetTree {
        &self.ratchet_tree
    }

    pub fn own_leaf_index(&self) -> LeafIndex {
        self.own_leaf
    }

    /// Current members by leaf index, blank leaves skipped
    pub fn members(&self) -> impl Iterator<Item = (LeafIndex, &Credential)> {
        self.ratchet_tree
            .leaves()
            .map(|(leaf, leaf_node)| (leaf, leaf_node.credential()))
    }

    /// Proposals staged in this epoch, in the order they were received
    pub fn pending_proposals(&self) -> &[PendingProposal] {
        &self.pending_proposals
    }

    /// [RFC9420 Sec.8.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.5) Exporters
    pub fn export_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        label: &[u8],
        context: &[u8],
        length: u16,
    ) -> Result<Secret> {
        self.key_schedule.export(
            crypto_provider,
            self.cipher_suite(),
            label,
            context,
            length,
        )
    }
}
