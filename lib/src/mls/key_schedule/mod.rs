//! [RFC9420 Sec.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-8) Key Schedule
//!
//! ```text
//!                  init_secret_[n-1]
//!                        |
//!                        |
//!                        V
//!  commit_secret --> KDF.Extract
//!                        |
//!                        |
//!                        V
//!                ExpandWithLabel(., "joiner", GroupContext_[n], KDF.Nh)
//!                        |
//!                        |
//!                        V
//!                   joiner_secret
//!                        |
//!                        |
//!                        V
//! psk_secret (or 0) --> KDF.Extract
//!                        |
//!                        |
//!                        +--> DeriveSecret(., "welcome")
//!                        |    = welcome_secret
//!                        |
//!                        V
//!                ExpandWithLabel(., "epoch", GroupContext_[n], KDF.Nh)
//!                        |
//!                        |
//!                        V
//!                   epoch_secret
//!                        |
//!                        |
//!                        +--> DeriveSecret(., <label>)
//!                        |    = <secret>
//!                        |
//!                        V
//!                  DeriveSecret(., "init")
//!                        |
//!                        |
//!                        V
//!                  init_secret_[n]
//! ```

#[cfg(test)]
mod key_schedule_test;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::extensibility::Extensions;
use crate::mls::framing::{FramedContent, MlsGroupId, ProtocolVersion, WireFormat};
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u64, serialize_opaque_vec, Deserializer, Serializer,
};

pub const SECRET_LABEL_JOINER: &[u8] = b"joiner";
pub const SECRET_LABEL_WELCOME: &[u8] = b"welcome";
pub const SECRET_LABEL_EPOCH: &[u8] = b"epoch";
pub const SECRET_LABEL_SENDER_DATA: &[u8] = b"sender data";
pub const SECRET_LABEL_ENCRYPTION: &[u8] = b"encryption";
pub const SECRET_LABEL_EXPORTER: &[u8] = b"exporter";
pub const SECRET_LABEL_CONFIRM: &[u8] = b"confirm";
pub const SECRET_LABEL_MEMBERSHIP: &[u8] = b"membership";
pub const SECRET_LABEL_INIT: &[u8] = b"init";

/// [RFC9420 Sec.8.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.1) Group Context
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GroupContext {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub tree_hash: Bytes,
    pub confirmed_transcript_hash: Bytes,
    pub extensions: Extensions,
}

impl Deserializer for GroupContext {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            version: ProtocolVersion::deserialize(buf)?,
            cipher_suite: CipherSuite::deserialize(buf)?,
            group_id: MlsGroupId::deserialize(buf)?,
            epoch: deserialize_u64(buf)?,
            tree_hash: deserialize_opaque_vec(buf)?,
            confirmed_transcript_hash: deserialize_opaque_vec(buf)?,
            extensions: Extensions::deserialize(buf)?,
        })
    }
}

impl Serializer for GroupContext {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.version.serialize(buf)?;
        self.cipher_suite.serialize(buf)?;
        self.group_id.serialize(buf)?;
        buf.put_u64(self.epoch);
        serialize_opaque_vec(&self.tree_hash, buf)?;
        serialize_opaque_vec(&self.confirmed_transcript_hash, buf)?;
        self.extensions.serialize(buf)
    }
}

impl GroupContext {
    /// `joiner_secret` of the epoch this context describes
    pub(crate) fn extract_joiner_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        prev_init_secret: &[u8],
        commit_secret: &[u8],
    ) -> Result<Secret> {
        let cipher_suite = self.cipher_suite;
        let extracted = crypto_provider
            .hpke(cipher_suite)?
            .kdf_extract(commit_secret, prev_init_secret)?;
        let length = crypto_provider.hpke(cipher_suite)?.kdf_extract_size();

        crypto_provider.expand_with_label(
            cipher_suite,
            &extracted,
            SECRET_LABEL_JOINER,
            &self.serialize_detached()?,
            length,
        )
    }

    pub(crate) fn extract_epoch_secret(
        &self,
        crypto_provider: &impl CryptoProvider,
        joiner_secret: &[u8],
        psk_secret: &[u8],
    ) -> Result<Secret> {
        let cipher_suite = self.cipher_suite;
        let member_secret = crypto_provider
            .hpke(cipher_suite)?
            .kdf_extract(psk_secret, joiner_secret)?;
        let length = crypto_provider.hpke(cipher_suite)?.kdf_extract_size();

        crypto_provider.expand_with_label(
            cipher_suite,
            &member_secret,
            SECRET_LABEL_EPOCH,
            &self.serialize_detached()?,
            length,
        )
    }
}

pub(crate) fn extract_welcome_secret(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    joiner_secret: &[u8],
    psk_secret: &[u8],
) -> Result<Secret> {
    let member_secret = crypto_provider
        .hpke(cipher_suite)?
        .kdf_extract(psk_secret, joiner_secret)?;
    crypto_provider.derive_secret(cipher_suite, &member_secret, SECRET_LABEL_WELCOME)
}

/// `Nh` zero bytes, the PSK secret of an epoch without pre-shared keys
pub(crate) fn zero_psk_secret(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
) -> Result<Secret> {
    let length = crypto_provider.hpke(cipher_suite)?.kdf_extract_size();
    Ok(Secret::zero(usize::from(length)))
}

/// Secrets of one epoch used by framing, derived from its epoch secret.
/// The membership key is not derived: public messages are not supported.
pub(crate) struct EpochSecrets {
    pub(crate) sender_data_secret: Secret,
    pub(crate) encryption_secret: Secret,
    pub(crate) confirmation_key: Secret,
}

/// The key schedule of the current epoch. Holds only the epoch secret, the
/// init secret handed to the next epoch and the PSK input; everything else is
/// derived on demand.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct KeySchedule {
    pub(crate) init_secret: Secret,
    pub(crate) epoch_secret: Secret,
    pub(crate) psk_secret: Secret,
}

impl KeySchedule {
    /// Key schedule for the epoch described by `group_context`, given its
    /// joiner secret
    pub(crate) fn from_joiner_secret(
        crypto_provider: &impl CryptoProvider,
        joiner_secret: &Secret,
        psk_secret: Secret,
        group_context: &GroupContext,
    ) -> Result<Self> {
        let epoch_secret =
            group_context.extract_epoch_secret(crypto_provider, joiner_secret, &psk_secret)?;
        let init_secret = crypto_provider.derive_secret(
            group_context.cipher_suite,
            &epoch_secret,
            SECRET_LABEL_INIT,
        )?;

        Ok(Self {
            init_secret,
            epoch_secret,
            psk_secret,
        })
    }

    /// Moves to the epoch described by `group_context`. Returns the new
    /// schedule and the joiner secret Welcome messages for that epoch need.
    /// `self` is left as is; callers drop it once the new epoch is installed.
    pub(crate) fn advance(
        &self,
        crypto_provider: &impl CryptoProvider,
        commit_secret: &Secret,
        group_context: &GroupContext,
    ) -> Result<(Self, Secret)> {
        let joiner_secret =
            group_context.extract_joiner_secret(crypto_provider, &self.init_secret, commit_secret)?;
        let psk_secret = zero_psk_secret(crypto_provider, group_context.cipher_suite)?;
        let next =
            Self::from_joiner_secret(crypto_provider, &joiner_secret, psk_secret, group_context)?;
        Ok((next, joiner_secret))
    }

    pub(crate) fn epoch_secrets(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<EpochSecrets> {
        let derive = |label: &[u8]| {
            crypto_provider.derive_secret(cipher_suite, &self.epoch_secret, label)
        };

        Ok(EpochSecrets {
            sender_data_secret: derive(SECRET_LABEL_SENDER_DATA)?,
            encryption_secret: derive(SECRET_LABEL_ENCRYPTION)?,
            confirmation_key: derive(SECRET_LABEL_CONFIRM)?,
        })
    }

    /// [RFC9420 Sec.8.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.5) Exporters
    pub(crate) fn export(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        label: &[u8],
        context: &[u8],
        length: u16,
    ) -> Result<Secret> {
        let exporter_secret =
            crypto_provider.derive_secret(cipher_suite, &self.epoch_secret, SECRET_LABEL_EXPORTER)?;
        let secret = crypto_provider.derive_secret(cipher_suite, &exporter_secret, label)?;
        let context_hash = crypto_provider.hash(cipher_suite)?.digest(context);
        crypto_provider.expand_with_label(cipher_suite, &secret, b"exported", &context_hash, length)
    }
}

/// [RFC9420 Sec.8.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-8.2) Input to the
/// confirmed transcript hash: the commit as it was signed
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ConfirmedTranscriptHashInput {
    pub wire_format: WireFormat,
    pub content: FramedContent,
    pub signature: Bytes,
}

impl Serializer for ConfirmedTranscriptHashInput {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.wire_format.serialize(buf)?;
        self.content.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}

impl ConfirmedTranscriptHashInput {
    pub(crate) fn hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        interim_transcript_hash_before: &[u8],
    ) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_slice(interim_transcript_hash_before);
        self.serialize(&mut buf)?;
        Ok(crypto_provider.hash(cipher_suite)?.digest(&buf))
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InterimTranscriptHashInput {
    pub confirmation_tag: Bytes,
}

impl Serializer for InterimTranscriptHashInput {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.confirmation_tag, buf)
    }
}

impl InterimTranscriptHashInput {
    pub(crate) fn hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        confirmed_transcript_hash: &[u8],
    ) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        buf.put_slice(confirmed_transcript_hash);
        self.serialize(&mut buf)?;
        Ok(crypto_provider.hash(cipher_suite)?.digest(&buf))
    }
}
