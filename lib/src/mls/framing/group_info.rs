use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{
    cipher_suite::CipherSuite, provider::CryptoProvider, Secret, SignaturePrivateKey,
    SignaturePublicKey,
};
use crate::mls::extensibility::{ExtensionType, Extensions};
use crate::mls::key_schedule::GroupContext;
use crate::mls::ratchet_tree::RatchetTree;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_optional_value, serialize_opaque_vec,
    serialize_optional_value, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

const GROUP_INFO_TBS_LABEL: &[u8] = b"GroupInfoTBS";

/// [RFC9420 Sec.12.4.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3) Snapshot of
/// the new epoch handed to joiners, signed by the committer
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GroupInfo {
    pub(crate) group_context: GroupContext,
    pub(crate) extensions: Extensions,
    pub(crate) confirmation_tag: Bytes,
    pub(crate) signer: LeafIndex,
    pub(crate) signature: Bytes,
}

impl GroupInfo {
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        sign_key: &SignaturePrivateKey,
        group_context: GroupContext,
        extensions: Extensions,
        confirmation_tag: Bytes,
        signer: LeafIndex,
    ) -> Result<Self> {
        let mut group_info = Self {
            group_context,
            extensions,
            confirmation_tag,
            signer,
            signature: Bytes::new(),
        };
        let tbs = group_info.serialize_tbs()?;
        group_info.signature = crypto_provider.sign_with_label(
            group_info.group_context.cipher_suite,
            sign_key,
            GROUP_INFO_TBS_LABEL,
            &tbs,
        )?;
        Ok(group_info)
    }

    pub(crate) fn verify(
        &self,
        crypto_provider: &impl CryptoProvider,
        verify_key: &SignaturePublicKey,
    ) -> Result<()> {
        let tbs = self.serialize_tbs()?;
        crypto_provider.verify_with_label(
            self.cipher_suite(),
            verify_key,
            GROUP_INFO_TBS_LABEL,
            &tbs,
            &self.signature,
        )
    }

    fn serialize_tbs(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        self.group_context.serialize(&mut buf)?;
        self.extensions.serialize(&mut buf)?;
        serialize_opaque_vec(&self.confirmation_tag, &mut buf)?;
        self.signer.serialize(&mut buf)?;
        Ok(buf.freeze())
    }

    pub fn group_context(&self) -> &GroupContext {
        &self.group_context
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.group_context.cipher_suite
    }

    pub fn signer(&self) -> LeafIndex {
        self.signer
    }

    /// The tree carried in the ratchet tree extension
    pub fn ratchet_tree(&self) -> Result<RatchetTree> {
        let data = self
            .extensions
            .find_extension_data(ExtensionType::RatchetTree)
            .ok_or(Error::MissingRatchetTree)?;
        RatchetTree::deserialize_exact(data)
    }
}

impl Deserializer for GroupInfo {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            group_context: GroupContext::deserialize(buf)?,
            extensions: Extensions::deserialize(buf)?,
            confirmation_tag: deserialize_opaque_vec(buf)?,
            signer: LeafIndex::deserialize(buf)?,
            signature: deserialize_opaque_vec(buf)?,
        })
    }
}

impl Serializer for GroupInfo {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.group_context.serialize(buf)?;
        self.extensions.serialize(buf)?;
        serialize_opaque_vec(&self.confirmation_tag, buf)?;
        self.signer.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}

/// [RFC9420 Sec.12.4.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1) What a
/// joiner needs beyond the group info: the joiner secret and, when the
/// committer's path covers the joiner, the path secret at their common
/// ancestor
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GroupSecrets {
    pub(crate) joiner_secret: Secret,
    pub(crate) path_secret: Option<Secret>,
}

impl Deserializer for GroupSecrets {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            joiner_secret: Secret::deserialize(buf)?,
            path_secret: deserialize_optional_value(buf)?,
        })
    }
}

impl Serializer for GroupSecrets {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.joiner_secret.serialize(buf)?;
        serialize_optional_value(self.path_secret.as_ref(), buf)
    }
}
