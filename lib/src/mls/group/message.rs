//! Sealing outgoing content and opening incoming messages. Every message of
//! an epoch, handshake or application, is a [`PrivateMessage`] keyed from the
//! secret tree.

use bytes::Bytes;
use log::{debug, warn};

use crate::mls::crypto::rng::random_bytes;
use crate::mls::crypto::provider::CryptoProvider;
use crate::mls::framing::{
    AuthenticatedContent, Content, ContentType, FramedContent, MlsMessage, PrivateMessage, Sender,
    WireFormat,
};
use crate::mls::group::{Group, PendingProposal, ReceivedMessage};
use crate::mls::ratchet_tree::LeafNode;
use crate::mls::secret_tree::{RatchetLabel, SecretTree};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{Deserializer, Serializer};
use crate::mls::utilities::tree_math::LeafIndex;

fn ratchet_label(content_type: ContentType) -> RatchetLabel {
    match content_type {
        ContentType::Application => RatchetLabel::Application,
        ContentType::Proposal | ContentType::Commit => RatchetLabel::Handshake,
    }
}

impl Group {
    /// Encrypts `plaintext` for every member of the current epoch, the
    /// local member included
    pub fn encrypt_application_message(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        plaintext: &[u8],
    ) -> Result<Bytes> {
        let content = self.framed_content(Content::Application(Bytes::copy_from_slice(plaintext)));
        let auth_content = self.sign_content(crypto_provider, content)?;
        let message = self.seal(crypto_provider, &auth_content)?;
        MlsMessage::PrivateMessage(message).serialize_detached()
    }

    /// Decrypts and applies one message of the current epoch.
    ///
    /// Application data is returned as is, proposals are staged and commits
    /// move the group to the next epoch. On error the group is unchanged.
    pub fn process_message(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        message: &[u8],
    ) -> Result<ReceivedMessage> {
        let MlsMessage::PrivateMessage(message) = MlsMessage::deserialize_exact(message)? else {
            return Err(Error::UnexpectedWireFormat);
        };
        if message.group_id != self.group_context.group_id {
            return Err(Error::GroupIdMismatch);
        }
        if message.epoch != self.epoch() {
            warn!(
                "dropping message for epoch {} at epoch {}",
                message.epoch,
                self.epoch()
            );
            return Err(Error::WrongEpoch {
                expected: self.epoch(),
                actual: message.epoch,
            });
        }

        let mut secret_tree = self.secret_tree.clone();
        let auth_content = self
            .open(crypto_provider, &message, &mut secret_tree)
            .inspect_err(|e| warn!("rejected message: {e}"))?;
        let sender = auth_content.content.sender.leaf_index();

        match &auth_content.content.content {
            Content::Application(data) => {
                self.secret_tree = secret_tree;
                Ok(ReceivedMessage::ApplicationMessage(data.clone()))
            }
            Content::Proposal(proposal) => {
                self.validate_proposal(crypto_provider, proposal, sender)?;
                let proposal_ref = auth_content.proposal_ref(crypto_provider, self.cipher_suite())?;
                self.secret_tree = secret_tree;
                self.stage_proposal(PendingProposal {
                    proposal_ref: proposal_ref.clone(),
                    proposal: proposal.clone(),
                    sender,
                });
                Ok(ReceivedMessage::Proposal(proposal_ref))
            }
            Content::Commit(commit) => self
                .apply_commit(crypto_provider, &auth_content, commit)
                .inspect_err(|e| warn!("rejected commit from leaf {}: {e}", sender.0)),
        }
    }

    /// The leaf of a current member
    pub(crate) fn member_leaf(&self, leaf: LeafIndex) -> Result<&LeafNode> {
        if !self.ratchet_tree.num_leaves().contains_leaf(leaf) {
            return Err(Error::InvalidLeafIndex(leaf.0));
        }
        self.ratchet_tree
            .get_leaf(leaf)
            .ok_or(Error::BlankLeaf(leaf.0))
    }

    pub(crate) fn framed_content(&self, content: Content) -> FramedContent {
        FramedContent {
            group_id: self.group_context.group_id.clone(),
            epoch: self.epoch(),
            sender: Sender::Member(self.own_leaf),
            authenticated_data: Bytes::new(),
            content,
        }
    }

    pub(crate) fn sign_content(
        &self,
        crypto_provider: &impl CryptoProvider,
        content: FramedContent,
    ) -> Result<AuthenticatedContent> {
        AuthenticatedContent::new(
            crypto_provider,
            self.cipher_suite(),
            &self.signature_key,
            WireFormat::PrivateMessage,
            content,
            &self.group_context,
        )
    }

    /// Encrypts signed content under the local member's next generation
    pub(crate) fn seal(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        auth_content: &AuthenticatedContent,
    ) -> Result<PrivateMessage> {
        let cipher_suite = self.cipher_suite();
        let label = ratchet_label(auth_content.content.content.content_type());
        let epoch_secrets = self.key_schedule.epoch_secrets(crypto_provider, cipher_suite)?;
        let secret = self.secret_tree.next_sender_secret(crypto_provider, label)?;

        PrivateMessage::seal(
            crypto_provider,
            cipher_suite,
            auth_content,
            &secret,
            &epoch_secrets.sender_data_secret,
            random_bytes::<4>()?,
        )
    }

    /// Decrypts `message` and checks the sender's signature. Generations are
    /// consumed from `secret_tree`, which the caller only keeps on success.
    pub(crate) fn open(
        &self,
        crypto_provider: &impl CryptoProvider,
        message: &PrivateMessage,
        secret_tree: &mut SecretTree,
    ) -> Result<AuthenticatedContent> {
        let cipher_suite = self.cipher_suite();
        let epoch_secrets = self.key_schedule.epoch_secrets(crypto_provider, cipher_suite)?;
        let sender_data = message.decrypt_sender_data(
            crypto_provider,
            cipher_suite,
            &epoch_secrets.sender_data_secret,
        )?;
        let sender = self.member_leaf(sender_data.leaf_index)?;

        let secret = secret_tree.secret_for_generation(
            crypto_provider,
            sender_data.leaf_index,
            ratchet_label(message.content_type),
            sender_data.generation,
        )?;
        let auth_content =
            message.decrypt_content(crypto_provider, cipher_suite, &secret, &sender_data)?;
        auth_content.verify_signature(
            crypto_provider,
            cipher_suite,
            sender.signature_key(),
            &self.group_context,
        )?;

        Ok(auth_content)
    }

    /// Stages a proposal unless one with the same reference is already held
    pub(crate) fn stage_proposal(&mut self, pending: PendingProposal) {
        if self
            .pending_proposals
            .iter()
            .any(|p| p.proposal_ref == pending.proposal_ref)
        {
            return;
        }
        debug!(
            "staged {:?} proposal from leaf {}",
            pending.proposal.proposal_type(),
            pending.sender.0
        );
        self.pending_proposals.push(pending);
    }
}
