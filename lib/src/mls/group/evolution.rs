use bytes::Bytes;
use log::debug;

use crate::mls::crypto::rng::random_secret;
use crate::mls::crypto::{provider::CryptoProvider, HPKEPublicKey, Secret};
use crate::mls::extensibility::{list::MlsExtension, RatchetTreeExtension};
use crate::mls::framing::proposal::{AddProposal, RemoveProposal, UpdateProposal};
use crate::mls::framing::welcome::WelcomeRecipient;
use crate::mls::framing::{
    AuthenticatedContent, Commit, Content, GroupInfo, MlsMessage, Proposal, ProposalOrRef,
    ProposalRef, Welcome,
};
use crate::mls::group::transcript::Transcript;
use crate::mls::group::{Group, PendingCommit, PendingProposal, PendingUpdate, ReceivedMessage};
use crate::mls::key_package::KeyPackage;
use crate::mls::key_schedule::{GroupContext, KeySchedule};
use crate::mls::ratchet_tree::leaf_node::{
    LeafNode, LeafNodePayload, LeafNodeSource, TreeInfoTBS, TreePosition,
};
use crate::mls::ratchet_tree::path::{derive_path, DerivedPath};
use crate::mls::ratchet_tree::{RatchetTree, UpdatePath};
use crate::mls::secret_tree::SecretTree;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::Serializer;
use crate::mls::utilities::tree_math::LeafIndex;

/// The epoch a commit created locally leads to, before it is installed
struct NextEpoch {
    group_context: GroupContext,
    ratchet_tree: RatchetTree,
    key_schedule: KeySchedule,
    joiner_secret: Secret,
    confirmation_tag: Bytes,
}

/// Applies `proposals` to `tree` in the order given, each on behalf of the
/// leaf it is paired with. Returns the members added, with the leaf they
/// ended up in.
fn apply_proposals(
    tree: &mut RatchetTree,
    committer: LeafIndex,
    proposals: &[(Proposal, LeafIndex)],
) -> Result<Vec<(LeafIndex, KeyPackage)>> {
    let mut added: Vec<(LeafIndex, KeyPackage)> = vec![];
    for (proposal, proposer) in proposals {
        match proposal {
            Proposal::Add(add) => {
                if added
                    .iter()
                    .any(|(_, other)| other.init_key() == add.key_package.init_key())
                {
                    return Err(Error::InvalidProposal("key package added twice"));
                }
                let leaf = tree.add_leaf(add.key_package.leaf_node().clone())?;
                added.push((leaf, add.key_package.clone()));
            }
            Proposal::Update(update) => {
                if *proposer == committer {
                    return Err(Error::InvalidProposal(
                        "committer cannot commit its own update proposal",
                    ));
                }
                tree.update_leaf(*proposer, update.leaf_node.clone())?;
            }
            Proposal::Remove(remove) => {
                if remove.removed == committer {
                    return Err(Error::InvalidProposal("commit removes its own sender"));
                }
                tree.blank_leaf(remove.removed)?;
            }
        }
    }

    // a later Remove may have taken a new member out again
    added.retain(|(leaf, key_package)| tree.get_leaf(*leaf) == Some(key_package.leaf_node()));
    Ok(added)
}

impl Group {
    /// Proposes adding the owner of `key_package`. Returns the proposal
    /// message to send to the group.
    pub fn propose_add(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        key_package: KeyPackage,
    ) -> Result<Bytes> {
        self.propose(crypto_provider, Proposal::Add(AddProposal { key_package }))
    }

    pub fn propose_remove(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        removed: LeafIndex,
    ) -> Result<Bytes> {
        self.propose(crypto_provider, Proposal::Remove(RemoveProposal { removed }))
    }

    /// Proposes a fresh encryption key for the local leaf. The private key
    /// is held until another member commits the proposal.
    pub fn propose_update(&mut self, crypto_provider: &impl CryptoProvider) -> Result<Bytes> {
        let key_pair = crypto_provider.generate_hpke_key_pair(self.cipher_suite())?;
        let leaf_node = self.own_leaf_node(
            crypto_provider,
            key_pair.public_key.clone(),
            LeafNodeSource::Update,
        )?;
        let message = self.propose(crypto_provider, Proposal::Update(UpdateProposal { leaf_node }))?;
        self.pending_update = Some(PendingUpdate {
            encryption_key: key_pair.public_key,
            private_key: key_pair.private_key,
        });
        Ok(message)
    }

    fn propose(&mut self, crypto_provider: &impl CryptoProvider, proposal: Proposal) -> Result<Bytes> {
        self.validate_proposal(crypto_provider, &proposal, self.own_leaf)?;
        let content = self.framed_content(Content::Proposal(proposal.clone()));
        let auth_content = self.sign_content(crypto_provider, content)?;
        let proposal_ref = auth_content.proposal_ref(crypto_provider, self.cipher_suite())?;
        let message = self.seal(crypto_provider, &auth_content)?;

        self.stage_proposal(PendingProposal {
            proposal_ref,
            proposal,
            sender: self.own_leaf,
        });
        MlsMessage::PrivateMessage(message).serialize_detached()
    }

    /// Checks a proposal against the current tree before it is staged or
    /// committed
    pub(crate) fn validate_proposal(
        &self,
        crypto_provider: &impl CryptoProvider,
        proposal: &Proposal,
        proposer: LeafIndex,
    ) -> Result<()> {
        let cipher_suite = self.cipher_suite();
        match proposal {
            Proposal::Add(add) => {
                add.key_package.verify(crypto_provider)?;
                if add.key_package.cipher_suite() != cipher_suite {
                    return Err(Error::CipherSuiteMismatch);
                }
            }
            Proposal::Update(update) => {
                self.member_leaf(proposer)?;
                if update.leaf_node.source() != LeafNodeSource::Update {
                    return Err(Error::InvalidLeafNode("update proposal without an update leaf"));
                }
                update.leaf_node.verify(
                    crypto_provider,
                    cipher_suite,
                    &self.tree_position(proposer),
                )?;
            }
            Proposal::Remove(remove) => {
                self.member_leaf(remove.removed)?;
            }
        }
        Ok(())
    }

    fn tree_position(&self, leaf: LeafIndex) -> TreeInfoTBS {
        TreeInfoTBS::UpdateOrCommit(TreePosition {
            group_id: self.group_context.group_id.clone(),
            leaf_index: leaf,
        })
    }

    /// The local leaf with a new encryption key, re-signed for its position
    fn own_leaf_node(
        &self,
        crypto_provider: &impl CryptoProvider,
        encryption_key: HPKEPublicKey,
        leaf_node_source: LeafNodeSource,
    ) -> Result<LeafNode> {
        let current = self.member_leaf(self.own_leaf)?;
        let payload = LeafNodePayload {
            encryption_key,
            leaf_node_source,
            ..current.payload.clone()
        };
        LeafNode::new(
            crypto_provider,
            self.cipher_suite(),
            &self.signature_key,
            payload,
            &self.tree_position(self.own_leaf),
        )
    }

    /// [RFC9420 Sec.12.4.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.1) Creating a
    /// Commit
    ///
    /// Commits every pending proposal, except the local member's own updates
    /// which the fresh path replaces, followed by `proposals` inline. The
    /// commit always carries an update path, so an empty list is a plain key
    /// refresh. A Welcome is returned when members are added.
    ///
    /// The group stays in the current epoch until the returned commit is
    /// passed back to [`Group::process_message`].
    pub fn create_commit(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        proposals: Vec<Proposal>,
    ) -> Result<(Bytes, Option<Welcome>)> {
        let cipher_suite = self.cipher_suite();

        let mut listed = vec![];
        let mut resolved = vec![];
        for pending in &self.pending_proposals {
            if pending.sender == self.own_leaf && matches!(pending.proposal, Proposal::Update(_)) {
                continue;
            }
            listed.push(ProposalOrRef::Reference(pending.proposal_ref.clone()));
            resolved.push((pending.proposal.clone(), pending.sender));
        }
        for proposal in proposals {
            if matches!(proposal, Proposal::Update(_)) {
                return Err(Error::InvalidProposal(
                    "committer cannot commit its own update proposal",
                ));
            }
            self.validate_proposal(crypto_provider, &proposal, self.own_leaf)?;
            resolved.push((proposal.clone(), self.own_leaf));
            listed.push(ProposalOrRef::Proposal(proposal));
        }

        let mut tree = self.ratchet_tree.clone();
        let added = apply_proposals(&mut tree, self.own_leaf, &resolved)?;
        let joiners: Vec<LeafIndex> = added.iter().map(|(leaf, _)| *leaf).collect();

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-7.4
        let secret_size = usize::from(crypto_provider.hpke(cipher_suite)?.kdf_extract_size());
        let leaf_secret = random_secret(secret_size)?;
        let mut path_nodes = vec![self.own_leaf.node_index()];
        path_nodes.extend(tree.filtered_direct_path(self.own_leaf));
        let derived = derive_path(crypto_provider, cipher_suite, leaf_secret.clone(), &path_nodes)?;
        let Some((leaf, parents)) = derived.nodes.split_first() else {
            return Err(Error::InvalidLeafIndex(self.own_leaf.0));
        };
        let leaf_node = self.own_leaf_node(
            crypto_provider,
            leaf.key_pair.public_key.clone(),
            LeafNodeSource::Commit,
        )?;

        let mut next_tree = tree.clone();
        next_tree.merge_path(
            self.own_leaf,
            leaf_node.clone(),
            parents.iter().map(|n| n.key_pair.public_key.clone()).collect(),
        )?;
        let mut next_context = self.group_context.clone();
        next_context.epoch += 1;
        next_context.tree_hash = next_tree.tree_hash(crypto_provider, cipher_suite)?;

        let update_path = UpdatePath::new(
            crypto_provider,
            cipher_suite,
            &tree,
            self.own_leaf,
            leaf_node,
            parents,
            &joiners,
            &next_context.serialize_detached()?,
        )?;
        let commit = Commit {
            proposals: listed,
            path: Some(update_path),
        };
        let mut auth_content =
            self.sign_content(crypto_provider, self.framed_content(Content::Commit(commit)))?;

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-8.2
        let confirmed_hash = self.next_confirmed_transcript_hash(crypto_provider, &auth_content)?;
        next_context.confirmed_transcript_hash = confirmed_hash.clone();
        let (key_schedule, joiner_secret) =
            self.key_schedule
                .advance(crypto_provider, &derived.commit_secret, &next_context)?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto_provider, cipher_suite)?;
        let transcript = Transcript::confirm(
            crypto_provider,
            cipher_suite,
            confirmed_hash,
            &epoch_secrets.confirmation_key,
        )?;
        auth_content.auth.confirmation_tag = transcript.confirmation_tag.clone();

        let welcome = if added.is_empty() {
            None
        } else {
            let next = NextEpoch {
                group_context: next_context,
                ratchet_tree: next_tree,
                key_schedule,
                joiner_secret,
                confirmation_tag: transcript.confirmation_tag,
            };
            Some(self.build_welcome(crypto_provider, &next, &added, &derived)?)
        };

        let content_hash = crypto_provider
            .hash(cipher_suite)?
            .digest(&auth_content.content.serialize_detached()?);
        let message = self.seal(crypto_provider, &auth_content)?;
        self.pending_commit = Some(PendingCommit {
            content_hash,
            leaf_secret,
        });
        debug!(
            "created commit to epoch {} with {} proposals",
            self.epoch() + 1,
            resolved.len()
        );

        Ok((MlsMessage::PrivateMessage(message).serialize_detached()?, welcome))
    }

    /// Commits an Add for each of `key_packages` along with the pending
    /// proposals. Returns the Welcome for the new members and the commit
    /// for the existing ones, the local member included.
    pub fn create_welcome(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        key_packages: Vec<KeyPackage>,
    ) -> Result<(Welcome, Bytes)> {
        if key_packages.is_empty() {
            return Err(Error::NoRecipients);
        }
        let proposals = key_packages
            .into_iter()
            .map(|key_package| Proposal::Add(AddProposal { key_package }))
            .collect();

        let (commit, welcome) = self.create_commit(crypto_provider, proposals)?;
        let welcome = welcome.ok_or(Error::NoRecipients)?;
        Ok((welcome, commit))
    }

    /// [RFC9420 Sec.12.4.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3) Adding
    /// Members to the Group
    ///
    /// Each new member gets the path secret at the lowest common ancestor of
    /// its leaf and the committer's.
    fn build_welcome(
        &self,
        crypto_provider: &impl CryptoProvider,
        next: &NextEpoch,
        added: &[(LeafIndex, KeyPackage)],
        derived: &DerivedPath,
    ) -> Result<Welcome> {
        let cipher_suite = self.cipher_suite();
        let num_leaves = next.ratchet_tree.num_leaves();

        let mut recipients = Vec::with_capacity(added.len());
        for (leaf, key_package) in added {
            let ancestor = num_leaves.common_ancestor(self.own_leaf.node_index(), leaf.node_index());
            recipients.push(WelcomeRecipient {
                key_package_ref: key_package.reference(crypto_provider)?,
                init_key: key_package.init_key().clone(),
                path_secret: derived.path_secret(ancestor).cloned(),
            });
        }

        let extensions = vec![MlsExtension::RatchetTree(RatchetTreeExtension::new(
            next.ratchet_tree.clone(),
        ))]
        .try_into()?;
        let group_info = GroupInfo::new(
            crypto_provider,
            &self.signature_key,
            next.group_context.clone(),
            extensions,
            next.confirmation_tag.clone(),
            self.own_leaf,
        )?;
        debug!("welcoming {} new members", recipients.len());

        Welcome::seal(
            crypto_provider,
            cipher_suite,
            &next.joiner_secret,
            &next.key_schedule.psk_secret,
            &group_info,
            recipients,
        )
    }

    /// Looks up referenced proposals in the pending list; inline ones are
    /// checked here and attributed to the committer. Each reference may
    /// appear once.
    fn resolve_proposals(
        &self,
        crypto_provider: &impl CryptoProvider,
        commit: &Commit,
        committer: LeafIndex,
    ) -> Result<Vec<(Proposal, LeafIndex)>> {
        let mut referenced: Vec<&ProposalRef> = vec![];
        let mut resolved = Vec::with_capacity(commit.proposals.len());
        for proposal_or_ref in &commit.proposals {
            match proposal_or_ref {
                ProposalOrRef::Reference(proposal_ref) => {
                    if referenced.contains(&proposal_ref) {
                        return Err(Error::InvalidProposal("proposal referenced twice"));
                    }
                    referenced.push(proposal_ref);
                    let pending = self
                        .pending_proposals
                        .iter()
                        .find(|pending| &pending.proposal_ref == proposal_ref)
                        .ok_or(Error::UnknownProposalRef)?;
                    resolved.push((pending.proposal.clone(), pending.sender));
                }
                ProposalOrRef::Proposal(proposal) => {
                    self.validate_proposal(crypto_provider, proposal, committer)?;
                    resolved.push((proposal.clone(), committer));
                }
            }
        }
        Ok(resolved)
    }

    /// [RFC9420 Sec.12.4.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.2) Joining
    /// the new epoch of a received commit.
    ///
    /// Everything is computed on copies and installed at the very end.
    pub(crate) fn apply_commit(
        &mut self,
        crypto_provider: &impl CryptoProvider,
        auth_content: &AuthenticatedContent,
        commit: &Commit,
    ) -> Result<ReceivedMessage> {
        let cipher_suite = self.cipher_suite();
        let committer = auth_content.content.sender.leaf_index();
        let own_leaf = self.own_leaf;

        let proposals = self.resolve_proposals(crypto_provider, commit, committer)?;
        if proposals
            .iter()
            .any(|(p, _)| matches!(p, Proposal::Remove(remove) if remove.removed == own_leaf))
        {
            debug!("removed from the group by leaf {}", committer.0);
            return Ok(ReceivedMessage::Removed);
        }

        let path = commit.path.as_ref().ok_or(Error::MissingUpdatePath)?;
        if path.leaf_node.source() != LeafNodeSource::Commit {
            return Err(Error::InvalidLeafNode("update path leaf must come from a commit"));
        }
        path.leaf_node
            .verify(crypto_provider, cipher_suite, &self.tree_position(committer))?;

        let mut tree = self.ratchet_tree.clone();
        let added = apply_proposals(&mut tree, committer, &proposals)?;
        let joiners: Vec<LeafIndex> = added.iter().map(|(leaf, _)| *leaf).collect();

        let mut private_tree = self.private_tree.clone();
        private_tree.sync(&tree, own_leaf);
        let own_update_committed = proposals
            .iter()
            .any(|(p, proposer)| matches!(p, Proposal::Update(_)) && *proposer == own_leaf);
        if own_update_committed {
            let own_key = tree
                .get_leaf(own_leaf)
                .map(LeafNode::encryption_key)
                .ok_or(Error::OwnLeafNotFound)?;
            let update = self
                .pending_update
                .as_ref()
                .filter(|update| &update.encryption_key == own_key)
                .ok_or(Error::MissingPrivateKey(own_leaf.node_index().0))?;
            private_tree.set(own_leaf.node_index(), update.private_key.clone());
        }

        let mut next_tree = tree.clone();
        next_tree.merge_path(committer, path.leaf_node.clone(), path.public_keys())?;
        let mut next_context = self.group_context.clone();
        next_context.epoch += 1;
        next_context.tree_hash = next_tree.tree_hash(crypto_provider, cipher_suite)?;

        let commit_secret = if committer == own_leaf {
            let pending = self.pending_commit.as_ref().ok_or(Error::NoPendingCommit)?;
            let content_hash = crypto_provider
                .hash(cipher_suite)?
                .digest(&auth_content.content.serialize_detached()?);
            if content_hash != pending.content_hash {
                return Err(Error::PendingCommitMismatch);
            }

            let mut path_nodes = vec![own_leaf.node_index()];
            path_nodes.extend(tree.filtered_direct_path(own_leaf));
            let derived = derive_path(
                crypto_provider,
                cipher_suite,
                pending.leaf_secret.clone(),
                &path_nodes,
            )?;
            let mut advertised = vec![path.leaf_node.encryption_key().clone()];
            advertised.extend(path.public_keys());
            derived.verify_public_keys(&advertised)?;
            derived.install(&mut private_tree);
            derived.commit_secret
        } else {
            let (position, path_secret) = path.decrypt_path_secret(
                crypto_provider,
                cipher_suite,
                &tree,
                &private_tree,
                committer,
                own_leaf,
                &joiners,
                &next_context.serialize_detached()?,
            )?;
            let filtered = tree.filtered_direct_path(committer);
            let derived =
                derive_path(crypto_provider, cipher_suite, path_secret, &filtered[position..])?;
            derived.verify_public_keys(&path.public_keys()[position..])?;
            derived.install(&mut private_tree);
            derived.commit_secret
        };
        private_tree.sync(&next_tree, own_leaf);

        let confirmed_hash = self.next_confirmed_transcript_hash(crypto_provider, auth_content)?;
        next_context.confirmed_transcript_hash = confirmed_hash.clone();
        let (key_schedule, _) =
            self.key_schedule
                .advance(crypto_provider, &commit_secret, &next_context)?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto_provider, cipher_suite)?;
        let transcript = Transcript::verify(
            crypto_provider,
            cipher_suite,
            confirmed_hash,
            &epoch_secrets.confirmation_key,
            &auth_content.auth.confirmation_tag,
        )?;
        let secret_tree = SecretTree::new(
            cipher_suite,
            next_tree.num_leaves(),
            own_leaf,
            &epoch_secrets.encryption_secret,
            *self.secret_tree.configuration(),
        );

        self.group_context = next_context;
        self.ratchet_tree = next_tree;
        self.interim_transcript_hash = transcript.interim_hash;
        self.key_schedule = key_schedule;
        self.private_tree = private_tree;
        self.secret_tree = secret_tree;
        self.pending_proposals.clear();
        self.pending_commit = None;
        self.pending_update = None;
        debug!(
            "moved to epoch {} with {} members",
            self.epoch(),
            self.ratchet_tree.leaves().count()
        );

        Ok(ReceivedMessage::Commit {
            epoch: self.epoch(),
        })
    }
}
