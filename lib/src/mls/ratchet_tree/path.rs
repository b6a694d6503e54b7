//! [RFC9420 Sec.7.4](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.4) Path secrets and the
//! node key pairs derived from them.

use crate::mls::crypto::{
    cipher_suite::CipherSuite, key_pair::HPKEKeyPair, provider::CryptoProvider, HPKEPublicKey,
    Secret,
};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::tree_math::NodeIndex;

use super::private_tree::PrivateTree;

pub(crate) struct PathNodeSecret {
    pub(crate) node: NodeIndex,
    pub(crate) path_secret: Secret,
    pub(crate) key_pair: HPKEKeyPair,
}

/// Secrets for a run of nodes ordered leaf to root, plus the commit secret
/// one step past the last of them
pub(crate) struct DerivedPath {
    pub(crate) nodes: Vec<PathNodeSecret>,
    pub(crate) commit_secret: Secret,
}

pub(crate) fn derive_node_key_pair(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    path_secret: &Secret,
) -> Result<HPKEKeyPair> {
    let node_secret = crypto_provider.derive_secret(cipher_suite, path_secret, b"node")?;
    crypto_provider
        .hpke(cipher_suite)?
        .kem_derive_key_pair(&node_secret)
}

/// `path_secret` belongs to `nodes[0]`; each following node gets
/// `DeriveSecret(previous, "path")`.
pub(crate) fn derive_path(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    path_secret: Secret,
    nodes: &[NodeIndex],
) -> Result<DerivedPath> {
    let mut path_secret = path_secret;
    let mut derived = Vec::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            path_secret = crypto_provider.derive_secret(cipher_suite, &path_secret, b"path")?;
        }
        let key_pair = derive_node_key_pair(crypto_provider, cipher_suite, &path_secret)?;
        derived.push(PathNodeSecret {
            node: *node,
            path_secret: path_secret.clone(),
            key_pair,
        });
    }
    let commit_secret = crypto_provider.derive_secret(cipher_suite, &path_secret, b"path")?;

    Ok(DerivedPath {
        nodes: derived,
        commit_secret,
    })
}

impl DerivedPath {
    pub(crate) fn public_keys(&self) -> Vec<HPKEPublicKey> {
        self.nodes
            .iter()
            .map(|n| n.key_pair.public_key.clone())
            .collect()
    }

    pub(crate) fn path_secret(&self, node: NodeIndex) -> Option<&Secret> {
        self.nodes
            .iter()
            .find(|n| n.node == node)
            .map(|n| &n.path_secret)
    }

    /// Every derived public key must equal the advertised one
    pub(crate) fn verify_public_keys(&self, advertised: &[HPKEPublicKey]) -> Result<()> {
        if self.nodes.len() != advertised.len() {
            return Err(Error::PublicKeyMismatch);
        }
        if self
            .nodes
            .iter()
            .zip(advertised)
            .any(|(n, key)| &n.key_pair.public_key != key)
        {
            return Err(Error::PublicKeyMismatch);
        }
        Ok(())
    }

    pub(crate) fn install(&self, private_tree: &mut PrivateTree) {
        for n in &self.nodes {
            private_tree.set(n.node, n.key_pair.private_key.clone());
        }
    }
}
