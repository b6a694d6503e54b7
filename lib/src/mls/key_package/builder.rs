use log::debug;

use crate::mls::crypto::{
    config::CryptoConfig, credential::Credential, provider::CryptoProvider,
};
use crate::mls::extensibility::Extensions;
use crate::mls::key_package::{KeyPackage, KeyPackagePrivateKeys, KeyPackageTBS, KeyPairPackage};
use crate::mls::ratchet_tree::leaf_node::{
    Capabilities, LeafNode, LeafNodePayload, LeafNodeSource, TreeInfoTBS,
};
use crate::mls::utilities::error::{Error, Result};

#[derive(Default, Debug)]
pub struct KeyPackageBuilder {
    capabilities: Option<Capabilities>,
    key_package_extensions: Extensions,
    leaf_node_extensions: Extensions,
}

impl KeyPackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertised capabilities. Defaults to every suite of the provider.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    #[must_use]
    pub fn with_key_package_extensions(mut self, extensions: Extensions) -> Self {
        self.key_package_extensions = extensions;
        self
    }

    #[must_use]
    pub fn with_leaf_node_extensions(mut self, extensions: Extensions) -> Self {
        self.leaf_node_extensions = extensions;
        self
    }

    /// Generates fresh init, encryption and signature keys and signs the
    /// resulting key package.
    pub fn build(
        self,
        crypto_provider: &impl CryptoProvider,
        crypto_config: CryptoConfig,
        credential: Credential,
    ) -> Result<KeyPairPackage> {
        let cipher_suite = crypto_config.cipher_suite;
        if !crypto_provider.supports(cipher_suite) {
            return Err(Error::UnsupportedCipherSuite(cipher_suite.into()));
        }

        let signature_key_pair = crypto_provider.signature(cipher_suite)?.signature_key_pair()?;
        let init_key_pair = crypto_provider.generate_hpke_key_pair(cipher_suite)?;
        let encryption_key_pair = crypto_provider.generate_hpke_key_pair(cipher_suite)?;

        let capabilities = self
            .capabilities
            .unwrap_or_else(|| Capabilities::new(crypto_provider.supported()));

        let leaf_node = LeafNode::new(
            crypto_provider,
            cipher_suite,
            signature_key_pair.private_key(),
            LeafNodePayload {
                encryption_key: encryption_key_pair.public_key,
                signature_key: signature_key_pair.public_key().clone(),
                credential,
                capabilities,
                leaf_node_source: LeafNodeSource::KeyPackage,
                extensions: self.leaf_node_extensions,
            },
            &TreeInfoTBS::KeyPackage,
        )?;

        let key_package = KeyPackage::new(
            crypto_provider,
            signature_key_pair.private_key(),
            KeyPackageTBS {
                version: crypto_config.version,
                cipher_suite,
                init_key: init_key_pair.public_key,
                leaf_node,
                extensions: self.key_package_extensions,
            },
        )?;
        debug!("generated key package for cipher suite {cipher_suite}");

        Ok(KeyPairPackage {
            public: key_package,
            private: KeyPackagePrivateKeys {
                init_key: init_key_pair.private_key,
                encryption_key: encryption_key_pair.private_key,
                signature_key: signature_key_pair.private_key().clone(),
            },
        })
    }
}
