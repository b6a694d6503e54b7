use bytes::{Buf, BufMut, Bytes};

use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider, Secret};
use crate::mls::framing::{
    expand_sender_data_key, expand_sender_data_nonce, AuthenticatedContent, Content, ContentType,
    FramedContent, FramedContentAuthData, MlsGroupId, Sender, SenderData, SenderDataAAD,
    WireFormat,
};
use crate::mls::secret_tree::RatchetSecret;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u64, serialize_opaque_vec, Deserializer, Serializer,
};

/// [RFC9420 Sec.6.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3) Authenticated and
/// encrypted messages are encoded using the `PrivateMessage` structure.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PrivateMessage {
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub content_type: ContentType,
    pub authenticated_data: Bytes,
    pub encrypted_sender_data: Bytes,
    pub ciphertext: Bytes,
}

impl Deserializer for PrivateMessage {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let group_id = MlsGroupId::deserialize(buf)?;
        let epoch = deserialize_u64(buf)?;
        let content_type = ContentType::deserialize(buf)?;
        let authenticated_data = deserialize_opaque_vec(buf)?;
        let encrypted_sender_data = deserialize_opaque_vec(buf)?;
        let ciphertext = deserialize_opaque_vec(buf)?;

        Ok(Self {
            group_id,
            epoch,
            content_type,
            authenticated_data,
            encrypted_sender_data,
            ciphertext,
        })
    }
}

impl Serializer for PrivateMessage {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.group_id.serialize(buf)?;
        buf.put_u64(self.epoch);
        self.content_type.serialize(buf)?;
        serialize_opaque_vec(&self.authenticated_data, buf)?;
        serialize_opaque_vec(&self.encrypted_sender_data, buf)?;
        serialize_opaque_vec(&self.ciphertext, buf)
    }
}

impl PrivateMessage {
    /// Encrypts signed content with the message key of `secret`, then hides
    /// the sender and generation under the sender data secret.
    pub(crate) fn seal(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        auth_content: &AuthenticatedContent,
        secret: &RatchetSecret,
        sender_data_secret: &[u8],
        reuse_guard: [u8; 4],
    ) -> Result<Self> {
        let content = &auth_content.content;
        let content_type = content.content.content_type();

        let priv_content = PrivateMessageContent {
            content: content.content.clone(),
            auth: auth_content.auth.clone(),
        };
        let plaintext = priv_content.serialize_detached()?;

        let (key, nonce) =
            derive_private_message_key_and_nonce(crypto_provider, cipher_suite, secret, &reuse_guard)?;
        let aad = PrivateContentAAD {
            group_id: content.group_id.clone(),
            epoch: content.epoch,
            content_type,
            authenticated_data: content.authenticated_data.clone(),
        };
        let ciphertext = crypto_provider.hpke(cipher_suite)?.aead_seal(
            &key,
            &nonce,
            &plaintext,
            &aad.serialize_detached()?,
        )?;

        let sender_data = SenderData {
            leaf_index: content.sender.leaf_index(),
            generation: secret.generation,
            reuse_guard,
        };
        let sender_data_aad = SenderDataAAD {
            group_id: content.group_id.clone(),
            epoch: content.epoch,
            content_type,
        };
        let sender_data_key = expand_sender_data_key(
            crypto_provider,
            cipher_suite,
            sender_data_secret,
            &ciphertext,
        )?;
        let sender_data_nonce = expand_sender_data_nonce(
            crypto_provider,
            cipher_suite,
            sender_data_secret,
            &ciphertext,
        )?;
        let encrypted_sender_data = crypto_provider.hpke(cipher_suite)?.aead_seal(
            &sender_data_key,
            &sender_data_nonce,
            &sender_data.serialize_detached()?,
            &sender_data_aad.serialize_detached()?,
        )?;

        Ok(Self {
            group_id: content.group_id.clone(),
            epoch: content.epoch,
            content_type,
            authenticated_data: content.authenticated_data.clone(),
            encrypted_sender_data,
            ciphertext,
        })
    }

    pub(crate) fn decrypt_sender_data(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        sender_data_secret: &[u8],
    ) -> Result<SenderData> {
        let key = expand_sender_data_key(
            crypto_provider,
            cipher_suite,
            sender_data_secret,
            &self.ciphertext,
        )?;
        let nonce = expand_sender_data_nonce(
            crypto_provider,
            cipher_suite,
            sender_data_secret,
            &self.ciphertext,
        )?;

        let aad = SenderDataAAD {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
        };
        let raw_aad = aad.serialize_detached()?;

        let raw_sender_data = crypto_provider.hpke(cipher_suite)?.aead_open(
            &key,
            &nonce,
            &self.encrypted_sender_data,
            &raw_aad,
        )?;

        SenderData::deserialize_exact(&raw_sender_data)
    }

    /// Decrypts the content and reassembles it as the sender signed it
    pub(crate) fn decrypt_content(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        secret: &RatchetSecret,
        sender_data: &SenderData,
    ) -> Result<AuthenticatedContent> {
        let (key, nonce) = derive_private_message_key_and_nonce(
            crypto_provider,
            cipher_suite,
            secret,
            &sender_data.reuse_guard,
        )?;

        let aad = PrivateContentAAD {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
            authenticated_data: self.authenticated_data.clone(),
        };

        let raw_aad = aad.serialize_detached()?;
        let raw_content = crypto_provider.hpke(cipher_suite)?.aead_open(
            &key,
            &nonce,
            &self.ciphertext,
            &raw_aad,
        )?;

        let mut buf = raw_content.as_ref();
        let content = PrivateMessageContent::deserialize(&mut buf, self.content_type)?;

        Ok(AuthenticatedContent {
            wire_format: WireFormat::PrivateMessage,
            content: FramedContent {
                group_id: self.group_id.clone(),
                epoch: self.epoch,
                sender: Sender::Member(sender_data.leaf_index),
                authenticated_data: self.authenticated_data.clone(),
                content: content.content,
            },
            auth: content.auth,
        })
    }
}

/// [RFC9420 Sec.6.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3.1) Content to be
/// encrypted is encoded in a `PrivateMessageContent` structure.
#[derive(Debug, Clone, Eq, PartialEq)]
struct PrivateMessageContent {
    content: Content,
    auth: FramedContentAuthData,
}

impl PrivateMessageContent {
    fn deserialize<B>(buf: &mut B, ct: ContentType) -> Result<Self>
    where
        B: Buf,
    {
        let content = Content::deserialize_body(buf, ct)?;
        let auth = FramedContentAuthData::deserialize(buf, ct)?;

        while buf.has_remaining() {
            if buf.get_u8() != 0 {
                return Err(Error::PaddingContainsNonZeroBytes);
            }
        }

        Ok(Self { content, auth })
    }
}

impl Serializer for PrivateMessageContent {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.content.serialize_body(buf)?;
        self.auth.serialize(buf, self.content.content_type())
    }
}

/// [RFC9420 Sec.6.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3.1) The Additional
/// Authenticated Data (AAD) input to the encryption contains an object of the following form,
/// with the values used to identify the key and nonce
#[derive(Debug, Clone, Eq, PartialEq)]
struct PrivateContentAAD {
    group_id: MlsGroupId,
    epoch: u64,
    content_type: ContentType,
    authenticated_data: Bytes,
}

impl Serializer for PrivateContentAAD {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.group_id.serialize(buf)?;
        buf.put_u64(self.epoch);
        self.content_type.serialize(buf)?;
        serialize_opaque_vec(&self.authenticated_data, buf)
    }
}

fn derive_private_message_key_and_nonce(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    secret: &RatchetSecret,
    reuse_guard: &[u8; 4],
) -> Result<(Secret, Secret)> {
    let key = secret.derive_key(crypto_provider, cipher_suite)?;
    let nonce = secret.derive_nonce(crypto_provider, cipher_suite)?;

    let mut nonce = nonce.to_vec();
    for (n, g) in nonce.iter_mut().zip(reuse_guard) {
        *n ^= g;
    }

    Ok((key, Secret::new(nonce)))
}
