use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{
    cipher_suite::CipherSuite, provider::CryptoProvider, HPKEPrivateKey, HPKEPublicKey, Secret,
};
use crate::mls::framing::{GroupInfo, GroupSecrets};
use crate::mls::key_package::KeyPackageRef;
use crate::mls::key_schedule::extract_welcome_secret;
use crate::mls::ratchet_tree::HPKECiphertext;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u16, deserialize_vector, serialize_opaque_vec,
    serialize_vector, Deserializer, Serializer,
};

const WELCOME_LABEL: &[u8] = b"Welcome";

/// One new member of a welcome: where to find them and what to tell them
pub(crate) struct WelcomeRecipient {
    pub(crate) key_package_ref: KeyPackageRef,
    pub(crate) init_key: HPKEPublicKey,
    pub(crate) path_secret: Option<Secret>,
}

/// [RFC9420 Sec.12.4.3.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.1) Joining
/// via Welcome message
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Welcome {
    pub(crate) cipher_suite: CipherSuite,
    pub(crate) secrets: Vec<EncryptedGroupSecrets>,
    pub(crate) encrypted_group_info: Bytes,
}

impl Deserializer for Welcome {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let cipher_suite = deserialize_u16(buf)?.into();

        let mut secrets = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            secrets.push(EncryptedGroupSecrets::deserialize(b)?);
            Ok(())
        })?;

        let encrypted_group_info = deserialize_opaque_vec(buf)?;

        Ok(Self {
            cipher_suite,
            secrets,
            encrypted_group_info,
        })
    }
}

impl Serializer for Welcome {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(self.cipher_suite.into());
        serialize_vector(
            self.secrets.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.secrets[i].serialize(b) },
        )?;
        serialize_opaque_vec(&self.encrypted_group_info, buf)
    }
}

impl Welcome {
    /// Encrypts `group_info` under the welcome secret and the group secrets of
    /// each recipient under their init key.
    pub(crate) fn seal(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        joiner_secret: &Secret,
        psk_secret: &Secret,
        group_info: &GroupInfo,
        recipients: Vec<WelcomeRecipient>,
    ) -> Result<Self> {
        if recipients.is_empty() {
            return Err(Error::NoRecipients);
        }

        let welcome_secret =
            extract_welcome_secret(crypto_provider, cipher_suite, joiner_secret, psk_secret)?;
        let (welcome_key, welcome_nonce) =
            Self::extract_key_and_nonce(&welcome_secret, crypto_provider, cipher_suite)?;
        let encrypted_group_info = crypto_provider.hpke(cipher_suite)?.aead_seal(
            &welcome_key,
            &welcome_nonce,
            &group_info.serialize_detached()?,
            &[],
        )?;

        let mut secrets = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let group_secrets = GroupSecrets {
                joiner_secret: joiner_secret.clone(),
                path_secret: recipient.path_secret,
            };
            let (kem_output, ciphertext) = crypto_provider.encrypt_with_label(
                cipher_suite,
                &recipient.init_key,
                WELCOME_LABEL,
                &encrypted_group_info,
                &group_secrets.serialize_detached()?,
            )?;
            secrets.push(EncryptedGroupSecrets::new(
                recipient.key_package_ref,
                HPKECiphertext {
                    kem_output,
                    ciphertext,
                },
            ));
        }

        Ok(Self {
            cipher_suite,
            secrets,
            encrypted_group_info,
        })
    }

    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// Return the encrypted group secrets in this Welcome message.
    pub fn secrets(&self) -> &[EncryptedGroupSecrets] {
        self.secrets.as_ref()
    }

    /// Find `EncryptedGroupSecrets` based on a `KeyPackageRef`
    pub fn find_secret(&self, r: &KeyPackageRef) -> Option<&EncryptedGroupSecrets> {
        self.secrets.iter().find(|sec| &sec.new_member == r)
    }

    pub(crate) fn decrypt_group_secrets(
        &self,
        crypto_provider: &impl CryptoProvider,
        r: &KeyPackageRef,
        init_key_priv: &HPKEPrivateKey,
    ) -> Result<GroupSecrets> {
        let sec = self.find_secret(r).ok_or(Error::WelcomeNotForThisMember)?;
        let raw_group_secrets = crypto_provider.decrypt_with_label(
            self.cipher_suite,
            init_key_priv,
            WELCOME_LABEL,
            &self.encrypted_group_info,
            &sec.encrypted_group_secrets.kem_output,
            &sec.encrypted_group_secrets.ciphertext,
        )?;

        GroupSecrets::deserialize_exact(&raw_group_secrets)
    }

    fn extract_key_and_nonce(
        welcome_secret: &Secret,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<(Secret, Secret)> {
        let aead_nonce_size = crypto_provider.hpke(cipher_suite)?.aead_nonce_size();
        let welcome_nonce = crypto_provider.expand_with_label(
            cipher_suite,
            welcome_secret,
            b"nonce",
            &[],
            aead_nonce_size,
        )?;

        let aead_key_size = crypto_provider.hpke(cipher_suite)?.aead_key_size();
        let welcome_key = crypto_provider.expand_with_label(
            cipher_suite,
            welcome_secret,
            b"key",
            &[],
            aead_key_size,
        )?;

        Ok((welcome_key, welcome_nonce))
    }

    pub(crate) fn decrypt_group_info(
        &self,
        crypto_provider: &impl CryptoProvider,
        joiner_secret: &Secret,
        psk_secret: &Secret,
    ) -> Result<GroupInfo> {
        let welcome_secret = extract_welcome_secret(
            crypto_provider,
            self.cipher_suite,
            joiner_secret,
            psk_secret,
        )?;

        let (welcome_key, welcome_nonce) =
            Self::extract_key_and_nonce(&welcome_secret, crypto_provider, self.cipher_suite)?;

        let raw_group_info = crypto_provider.hpke(self.cipher_suite)?.aead_open(
            &welcome_key,
            &welcome_nonce,
            &self.encrypted_group_info,
            &[],
        )?;

        GroupInfo::deserialize_exact(&raw_group_info)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct EncryptedGroupSecrets {
    new_member: KeyPackageRef,
    encrypted_group_secrets: HPKECiphertext,
}

impl Deserializer for EncryptedGroupSecrets {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let new_member = KeyPackageRef::deserialize(buf)?;
        let encrypted_group_secrets = HPKECiphertext::deserialize(buf)?;

        Ok(Self {
            new_member,
            encrypted_group_secrets,
        })
    }
}

impl Serializer for EncryptedGroupSecrets {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.new_member.serialize(buf)?;
        self.encrypted_group_secrets.serialize(buf)
    }
}

impl EncryptedGroupSecrets {
    pub(crate) fn new(new_member: KeyPackageRef, encrypted_group_secrets: HPKECiphertext) -> Self {
        Self {
            new_member,
            encrypted_group_secrets,
        }
    }

    /// Return `KeyPackageRef` of encrypted group secrets
    pub fn new_member(&self) -> &KeyPackageRef {
        &self.new_member
    }
}
