//! [RFC9420 Sec.10](https://www.rfc-editor.org/rfc/rfc9420.html#section-10) Key Packages
//!
//! A key package is the signed, public half of a prospective member: an HPKE
//! init key for the Welcome plus the leaf node the member will occupy. The
//! matching private keys travel with it in a [`KeyPairPackage`] that never
//! leaves the client.


pub mod builder;

use bytes::{Buf, BufMut, Bytes};
use std::ops::Deref;

pub use self::builder::KeyPackageBuilder;
use crate::mls::crypto::{
    cipher_suite::CipherSuite, config::CryptoConfig, credential::Credential,
    provider::CryptoProvider, HPKEPrivateKey, HPKEPublicKey, SignaturePrivateKey,
};
use crate::mls::extensibility::Extensions;
use crate::mls::framing::ProtocolVersion;
use crate::mls::ratchet_tree::leaf_node::{LeafNode, TreeInfoTBS};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, serialize_opaque_vec, Deserializer, Serializer,
};

const KEY_PACKAGE_TBS_LABEL: &[u8] = b"KeyPackageTBS";
const KEY_PACKAGE_REF_LABEL: &[u8] = b"MLS 1.0 KeyPackage Reference";

/// Hash identifying a key package, used to address Welcome secrets
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct KeyPackageRef(Bytes);

impl Deref for KeyPackageRef {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deserializer for KeyPackageRef {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self(deserialize_opaque_vec(buf)?))
    }
}

impl Serializer for KeyPackageRef {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.0, buf)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeyPackageTBS {
    pub(crate) version: ProtocolVersion,
    pub(crate) cipher_suite: CipherSuite,
    pub(crate) init_key: HPKEPublicKey,
    pub(crate) leaf_node: LeafNode,
    pub(crate) extensions: Extensions,
}

impl Deserializer for KeyPackageTBS {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            version: ProtocolVersion::deserialize(buf)?,
            cipher_suite: CipherSuite::deserialize(buf)?,
            init_key: HPKEPublicKey::deserialize(buf)?,
            leaf_node: LeafNode::deserialize(buf)?,
            extensions: Extensions::deserialize(buf)?,
        })
    }
}

impl Serializer for KeyPackageTBS {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.version.serialize(buf)?;
        self.cipher_suite.serialize(buf)?;
        self.init_key.serialize(buf)?;
        self.leaf_node.serialize(buf)?;
        self.extensions.serialize(buf)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeyPackage {
    pub(crate) payload: KeyPackageTBS,
    pub(crate) signature: Bytes,
}

impl KeyPackage {
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        sign_key: &SignaturePrivateKey,
        payload: KeyPackageTBS,
    ) -> Result<Self> {
        let signature = crypto_provider.sign_with_label(
            payload.cipher_suite,
            sign_key,
            KEY_PACKAGE_TBS_LABEL,
            &payload.serialize_detached()?,
        )?;
        Ok(Self { payload, signature })
    }

    /// [RFC9420 Sec.10.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-10.1) Checks the
    /// version, the suite, the leaf node and the signature under the leaf's
    /// signature key.
    pub fn verify(&self, crypto_provider: &impl CryptoProvider) -> Result<()> {
        let cipher_suite = self.payload.cipher_suite;
        if !crypto_provider.supports(cipher_suite) {
            return Err(Error::UnsupportedCipherSuite(cipher_suite.into()));
        }
        if self.payload.init_key == *self.payload.leaf_node.encryption_key() {
            return Err(Error::InvalidKeyPackage(
                "init key equals the leaf encryption key",
            ));
        }

        self.payload
            .leaf_node
            .verify(crypto_provider, cipher_suite, &TreeInfoTBS::KeyPackage)?;

        crypto_provider.verify_with_label(
            cipher_suite,
            self.payload.leaf_node.signature_key(),
            KEY_PACKAGE_TBS_LABEL,
            &self.payload.serialize_detached()?,
            &self.signature,
        )
    }

    pub fn reference(&self, crypto_provider: &impl CryptoProvider) -> Result<KeyPackageRef> {
        Ok(KeyPackageRef(crypto_provider.ref_hash(
            self.payload.cipher_suite,
            KEY_PACKAGE_REF_LABEL,
            &self.serialize_detached()?,
        )?))
    }

    pub fn version(&self) -> ProtocolVersion {
        self.payload.version
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.payload.cipher_suite
    }

    pub fn init_key(&self) -> &HPKEPublicKey {
        &self.payload.init_key
    }

    pub fn leaf_node(&self) -> &LeafNode {
        &self.payload.leaf_node
    }

    pub fn credential(&self) -> &Credential {
        self.payload.leaf_node.credential()
    }
}

impl Deserializer for KeyPackage {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let payload = KeyPackageTBS::deserialize(buf)?;
        let signature = deserialize_opaque_vec(buf)?;
        Ok(Self { payload, signature })
    }
}

impl Serializer for KeyPackage {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.payload.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}

/// Private keys matching a [`KeyPackage`]
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeyPackagePrivateKeys {
    pub(crate) init_key: HPKEPrivateKey,
    pub(crate) encryption_key: HPKEPrivateKey,
    pub(crate) signature_key: SignaturePrivateKey,
}

/// A key package together with its private keys. Used to create a group or
/// to join one from a Welcome.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeyPairPackage {
    pub(crate) public: KeyPackage,
    pub(crate) private: KeyPackagePrivateKeys,
}

impl KeyPairPackage {
    /// Key package with default capabilities and no extensions
    pub fn generate(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        credential: Credential,
    ) -> Result<Self> {
        KeyPackageBuilder::new().build(
            crypto_provider,
            CryptoConfig::new(cipher_suite),
            credential,
        )
    }

    pub fn key_package(&self) -> &KeyPackage {
        &self.public
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.public.cipher_suite()
    }
}

impl Deserializer for KeyPairPackage {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let public = KeyPackage::deserialize(buf)?;
        let private = KeyPackagePrivateKeys {
            init_key: HPKEPrivateKey::deserialize(buf)?,
            encryption_key: HPKEPrivateKey::deserialize(buf)?,
            signature_key: SignaturePrivateKey::deserialize(buf)?,
        };
        Ok(Self { public, private })
    }
}

impl Serializer for KeyPairPackage {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.public.serialize(buf)?;
        self.private.init_key.serialize(buf)?;
        self.private.encryption_key.serialize(buf)?;
        self.private.signature_key.serialize(buf)
    }
}
