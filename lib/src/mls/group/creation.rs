use bytes::Bytes;
use log::{debug, warn};

use crate::mls::crypto::rng::random_secret;
use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::framing::{MlsGroupId, ProtocolVersion, Welcome};
use crate::mls::group::config::GroupConfig;
use crate::mls::group::transcript::Transcript;
use crate::mls::group::Group;
use crate::mls::key_package::KeyPairPackage;
use crate::mls::key_schedule::{zero_psk_secret, GroupContext, KeySchedule};
use crate::mls::ratchet_tree::leaf_node::{LeafNodeSource, TreeInfoTBS, TreePosition};
use crate::mls::ratchet_tree::path::derive_path;
use crate::mls::ratchet_tree::{PrivateTree, RatchetTree};
use crate::mls::secret_tree::SecretTree;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::tree_math::LeafIndex;

impl Group {
    /// Creates a one-member group at epoch 0 owned by `key_pair_package`.
    /// The init secret the epoch is derived from is drawn at random and
    /// thrown away.
    pub fn new(
        crypto_provider: &impl CryptoProvider,
        group_config: &GroupConfig,
        group_id: MlsGroupId,
        key_pair_package: KeyPairPackage,
    ) -> Result<Self> {
        let cipher_suite = key_pair_package.cipher_suite();
        key_pair_package.public.verify(crypto_provider)?;
        let KeyPairPackage { public, private } = key_pair_package;

        let own_leaf = LeafIndex(0);
        let ratchet_tree = RatchetTree::new(public.leaf_node().clone());
        let group_context = GroupContext {
            version: ProtocolVersion::MLS10,
            cipher_suite,
            group_id,
            epoch: 0,
            tree_hash: ratchet_tree.tree_hash(crypto_provider, cipher_suite)?,
            confirmed_transcript_hash: Bytes::new(),
            extensions: group_config.extensions.clone(),
        };

        let secret_size = usize::from(crypto_provider.hpke(cipher_suite)?.kdf_extract_size());
        let init_secret = random_secret(secret_size)?;
        let commit_secret = Secret::zero(secret_size);
        let joiner_secret =
            group_context.extract_joiner_secret(crypto_provider, &init_secret, &commit_secret)?;
        let key_schedule = KeySchedule::from_joiner_secret(
            crypto_provider,
            &joiner_secret,
            zero_psk_secret(crypto_provider, cipher_suite)?,
            &group_context,
        )?;

        let epoch_secrets = key_schedule.epoch_secrets(crypto_provider, cipher_suite)?;
        let transcript =
            Transcript::initial(crypto_provider, cipher_suite, &epoch_secrets.confirmation_key)?;
        let secret_tree = SecretTree::new(
            cipher_suite,
            ratchet_tree.num_leaves(),
            own_leaf,
            &epoch_secrets.encryption_secret,
            group_config.sender_ratchet_configuration,
        );
        debug!("created group with cipher suite {cipher_suite}");

        Ok(Self {
            group_context,
            private_tree: PrivateTree::new(ratchet_tree.width(), own_leaf, private.encryption_key),
            ratchet_tree,
            interim_transcript_hash: transcript.interim_hash,
            key_schedule,
            own_leaf,
            signature_key: private.signature_key,
            pending_proposals: vec![],
            secret_tree,
            pending_commit: None,
            pending_update: None,
        })
    }

    /// As described in `https://www.rfc-editor.org/rfc/rfc9420.html#name-joining-via-welcome-message`
    ///
    /// `key_pair_package` must be the one the committer added; its init key
    /// opens the group secrets and its leaf locates the new member in the
    /// tree.
    pub fn from_welcome(
        crypto_provider: &impl CryptoProvider,
        group_config: &GroupConfig,
        welcome: &Welcome,
        key_pair_package: KeyPairPackage,
    ) -> Result<Self> {
        let cipher_suite = welcome.cipher_suite();
        if cipher_suite != key_pair_package.cipher_suite() {
            return Err(Error::CipherSuiteMismatch);
        }
        let KeyPairPackage { public, private } = key_pair_package;

        let key_package_ref = public.reference(crypto_provider)?;
        let group_secrets =
            welcome.decrypt_group_secrets(crypto_provider, &key_package_ref, &private.init_key)?;
        let psk_secret = zero_psk_secret(crypto_provider, cipher_suite)?;
        let group_info =
            welcome.decrypt_group_info(crypto_provider, &group_secrets.joiner_secret, &psk_secret)?;
        if group_info.cipher_suite() != cipher_suite {
            return Err(Error::CipherSuiteMismatch);
        }

        // https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1-8.4
        let ratchet_tree = group_info.ratchet_tree()?;
        let signer = group_info.signer();
        let signer_leaf = ratchet_tree
            .get_leaf(signer)
            .ok_or(Error::BlankLeaf(signer.0))?;
        group_info.verify(crypto_provider, signer_leaf.signature_key())?;

        let group_context = group_info.group_context().clone();
        if ratchet_tree.tree_hash(crypto_provider, cipher_suite)? != group_context.tree_hash {
            warn!("welcome tree does not match the group context");
            return Err(Error::TreeHashMismatch);
        }
        verify_leaves(
            crypto_provider,
            cipher_suite,
            &ratchet_tree,
            &group_context.group_id,
        )?;

        let own_leaf = ratchet_tree
            .find_leaf(public.leaf_node())
            .ok_or(Error::OwnLeafNotFound)?;
        let mut private_tree =
            PrivateTree::new(ratchet_tree.width(), own_leaf, private.encryption_key);

        // The path secret belongs to the lowest common ancestor of the new
        // member and the committer; everything above follows from it.
        if let Some(path_secret) = group_secrets.path_secret {
            let ancestor = ratchet_tree
                .num_leaves()
                .common_ancestor(own_leaf.node_index(), signer.node_index());
            let filtered = ratchet_tree.filtered_direct_path(signer);
            let position = filtered
                .iter()
                .position(|node| *node == ancestor)
                .ok_or(Error::NoDecryptablePathSecret)?;

            let derived =
                derive_path(crypto_provider, cipher_suite, path_secret, &filtered[position..])?;
            let advertised = filtered[position..]
                .iter()
                .map(|node| {
                    ratchet_tree
                        .get(*node)
                        .map(|n| n.encryption_key().clone())
                        .ok_or(Error::InvalidNodeIndex(node.0))
                })
                .collect::<Result<Vec<_>>>()?;
            derived.verify_public_keys(&advertised)?;
            derived.install(&mut private_tree);
        }

        let key_schedule = KeySchedule::from_joiner_secret(
            crypto_provider,
            &group_secrets.joiner_secret,
            psk_secret,
            &group_context,
        )?;
        let epoch_secrets = key_schedule.epoch_secrets(crypto_provider, cipher_suite)?;
        let transcript = Transcript::verify(
            crypto_provider,
            cipher_suite,
            group_context.confirmed_transcript_hash.clone(),
            &epoch_secrets.confirmation_key,
            &group_info.confirmation_tag,
        )?;

        let secret_tree = SecretTree::new(
            cipher_suite,
            ratchet_tree.num_leaves(),
            own_leaf,
            &epoch_secrets.encryption_secret,
            group_config.sender_ratchet_configuration,
        );
        debug!(
            "joined group at epoch {} as leaf {}",
            group_context.epoch, own_leaf.0
        );

        Ok(Self {
            group_context,
            ratchet_tree,
            interim_transcript_hash: transcript.interim_hash,
            key_schedule,
            own_leaf,
            private_tree,
            signature_key: private.signature_key,
            pending_proposals: vec![],
            secret_tree,
            pending_commit: None,
            pending_update: None,
        })
    }
}

/// Checks the signature of every leaf against the position it claims
fn verify_leaves(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    ratchet_tree: &RatchetTree,
    group_id: &MlsGroupId,
) -> Result<()> {
    for (leaf, leaf_node) in ratchet_tree.leaves() {
        let tree_info = match leaf_node.source() {
            LeafNodeSource::KeyPackage => TreeInfoTBS::KeyPackage,
            LeafNodeSource::Update | LeafNodeSource::Commit => {
                TreeInfoTBS::UpdateOrCommit(TreePosition {
                    group_id: group_id.clone(),
                    leaf_index: leaf,
                })
            }
        };
        leaf_node.verify(crypto_provider, cipher_suite, &tree_info)?;
    }
    Ok(())
}
