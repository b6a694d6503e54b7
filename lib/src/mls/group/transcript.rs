use bytes::Bytes;

use crate::mls::{
    crypto::{cipher_suite::CipherSuite, provider::CryptoProvider},
    framing::AuthenticatedContent,
    key_schedule::{ConfirmedTranscriptHashInput, InterimTranscriptHashInput},
    utilities::error::{Error, Result},
};

use super::Group;

/// Transcript hashes and confirmation tag of the epoch a commit leads to
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct Transcript {
    pub(crate) confirmed_hash: Bytes,
    pub(crate) confirmation_tag: Bytes,
    pub(crate) interim_hash: Bytes,
}

impl Transcript {
    /// Transcript of epoch 0: the confirmed hash is empty and the tag is a
    /// MAC over it.
    ///
    /// ```text
    /// confirmed_transcript_hash_[0] = ""; /* zero-length octet string */
    /// ```
    pub(crate) fn initial(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        confirmation_key: &[u8],
    ) -> Result<Self> {
        Self::confirm(crypto_provider, cipher_suite, Bytes::new(), confirmation_key)
    }

    /// Signs `confirmed_hash` with the new epoch's confirmation key and
    /// chains the interim hash onto it
    pub(crate) fn confirm(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        confirmed_hash: Bytes,
        confirmation_key: &[u8],
    ) -> Result<Self> {
        let confirmation_tag =
            crypto_provider.sign_mac(cipher_suite, confirmation_key, &confirmed_hash)?;
        let interim_hash = interim_transcript_hash(
            crypto_provider,
            cipher_suite,
            &confirmed_hash,
            &confirmation_tag,
        )?;

        Ok(Self {
            confirmed_hash,
            confirmation_tag,
            interim_hash,
        })
    }

    /// Same as [`Self::confirm`] for a tag received from someone else. A
    /// wrong tag means the sender did not reach the same epoch.
    pub(crate) fn verify(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        confirmed_hash: Bytes,
        confirmation_key: &[u8],
        confirmation_tag: &Bytes,
    ) -> Result<Self> {
        crypto_provider
            .verify_mac(cipher_suite, confirmation_key, &confirmed_hash, confirmation_tag)
            .map_err(|_| Error::ConfirmationTagMismatch)?;
        let interim_hash = interim_transcript_hash(
            crypto_provider,
            cipher_suite,
            &confirmed_hash,
            confirmation_tag,
        )?;

        Ok(Self {
            confirmed_hash,
            confirmation_tag: confirmation_tag.clone(),
            interim_hash,
        })
    }
}

/// ```text
/// interim_transcript_hash_[epoch] =
///     Hash(confirmed_transcript_hash_[epoch] || InterimTranscriptHashInput_[epoch]);
/// ```
pub(crate) fn interim_transcript_hash(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    confirmed_transcript_hash: &[u8],
    confirmation_tag: &Bytes,
) -> Result<Bytes> {
    InterimTranscriptHashInput {
        confirmation_tag: confirmation_tag.clone(),
    }
    .hash(crypto_provider, cipher_suite, confirmed_transcript_hash)
}

impl Group {
    /// Confirmed transcript hash after `commit`. Does not modify the group.
    ///
    /// ```text
    /// confirmed_transcript_hash_[epoch] =
    ///     Hash(interim_transcript_hash_[epoch - 1] || ConfirmedTranscriptHashInput_[epoch]);
    /// ```
    pub(crate) fn next_confirmed_transcript_hash(
        &self,
        crypto_provider: &impl CryptoProvider,
        commit: &AuthenticatedContent,
    ) -> Result<Bytes> {
        ConfirmedTranscriptHashInput {
            wire_format: commit.wire_format,
            content: commit.content.clone(),
            signature: commit.auth.signature.clone(),
        }
        .hash(
            crypto_provider,
            self.cipher_suite(),
            &self.interim_transcript_hash,
        )
    }
}
