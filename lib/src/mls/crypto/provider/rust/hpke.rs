use aes_gcm::Aes128Gcm;
use bytes::Bytes;
use chacha20poly1305::ChaCha20Poly1305;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use hpke::{
    aead::{AesGcm128, ChaCha20Poly1305 as HpkeChaCha20Poly1305},
    kdf::HkdfSha256,
    kem::X25519HkdfSha256,
    Deserializable, Kem, OpModeR, OpModeS, Serializable,
};
use sha2::Sha256;

use crate::mls::crypto::rng::get_rng;
use crate::mls::crypto::key_pair::HPKEKeyPair;
use crate::mls::crypto::provider::HpkeSuite;
use crate::mls::crypto::{provider, Aead, Kdf, Key, Secret};
use crate::mls::utilities::error::{Error, Result};

type X25519PublicKey = <X25519HkdfSha256 as Kem>::PublicKey;
type X25519PrivateKey = <X25519HkdfSha256 as Kem>::PrivateKey;
type X25519EncappedKey = <X25519HkdfSha256 as Kem>::EncappedKey;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct HpkeSuiteWrapper(pub(super) HpkeSuite);

fn hpke_seal<A: hpke::aead::Aead>(
    public_key: &[u8],
    info: &[u8],
    additional_data: &[u8],
    plaintext: &[u8],
) -> Result<(Bytes, Bytes)> {
    let public_key = X25519PublicKey::from_bytes(public_key)?;
    let (encapped_key, ciphertext) = hpke::single_shot_seal::<A, HkdfSha256, X25519HkdfSha256, _>(
        &OpModeS::Base,
        &public_key,
        info,
        plaintext,
        additional_data,
        &mut get_rng(),
    )?;
    Ok((
        Bytes::from(encapped_key.to_bytes().to_vec()),
        Bytes::from(ciphertext),
    ))
}

fn hpke_open<A: hpke::aead::Aead>(
    private_key: &[u8],
    kem_output: &[u8],
    info: &[u8],
    additional_data: &[u8],
    ciphertext: &[u8],
) -> Result<Bytes> {
    let private_key = X25519PrivateKey::from_bytes(private_key)?;
    let encapped_key = X25519EncappedKey::from_bytes(kem_output)?;
    let plaintext = hpke::single_shot_open::<A, HkdfSha256, X25519HkdfSha256>(
        &OpModeR::Base,
        &private_key,
        &encapped_key,
        info,
        ciphertext,
        additional_data,
    )?;
    Ok(Bytes::from(plaintext))
}

fn aead_cipher<C: aead::KeyInit>(key: &[u8]) -> Result<C> {
    C::new_from_slice(key).map_err(|_| Error::InvalidKeyLength)
}

impl provider::Hpke for HpkeSuiteWrapper {
    fn hpke_suite(&self) -> HpkeSuite {
        self.0
    }

    fn kem_derive_key_pair(&self, ikm: &[u8]) -> Result<HPKEKeyPair> {
        match self.0.kem {
            provider::Kem::KEM_X25519_HKDF_SHA256 => {
                let (private_key, public_key) = X25519HkdfSha256::derive_keypair(ikm);
                Ok(HPKEKeyPair {
                    private_key: Secret::new(private_key.to_bytes().to_vec()),
                    public_key: Key::new(public_key.to_bytes().to_vec()),
                })
            }
        }
    }

    fn kdf_expand(&self, secret: &[u8], info: &[u8], length: u16) -> Result<Secret> {
        let mut out = vec![0u8; length as usize];

        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => {
                let hkdf = Hkdf::<Sha256>::from_prk(secret)?;
                hkdf.expand(info, &mut out)?;
            }
        };

        Ok(Secret::new(out))
    }

    fn kdf_extract(&self, secret: &[u8], salt: &[u8]) -> Result<Secret> {
        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => {
                let mut m = Hmac::<Sha256>::new_from_slice(salt)?;
                m.update(secret);
                Ok(Secret::new(m.finalize().into_bytes().to_vec()))
            }
        }
    }

    fn kdf_extract_size(&self) -> u16 {
        match self.0.kdf {
            Kdf::KDF_HKDF_SHA256 => 32,
        }
    }

    // key_size returns the size in bytes of the keys used by the AEAD cipher.
    fn aead_key_size(&self) -> u16 {
        match self.0.aead {
            Aead::AEAD_AES128GCM => 16,
            Aead::AEAD_CHACHA20POLY1305 => 32,
        }
    }

    // nonce_size returns the size in bytes of the nonce used by the AEAD cipher.
    fn aead_nonce_size(&self) -> u16 {
        match self.0.aead {
            Aead::AEAD_AES128GCM | Aead::AEAD_CHACHA20POLY1305 => 12,
        }
    }

    fn aead_open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes> {
        use aead::AeadInPlace;

        if nonce.len() != self.aead_nonce_size() as usize {
            return Err(Error::InvalidKeyLength);
        }
        let nonce = aead::Nonce::<Aes128Gcm>::from_slice(nonce);
        let mut in_out = ciphertext.to_vec();
        match self.0.aead {
            Aead::AEAD_AES128GCM => aead_cipher::<Aes128Gcm>(key)?
                .decrypt_in_place(nonce, additional_data, &mut in_out)
                .map_err(|_| Error::AeadDecryptionFailed)?,
            Aead::AEAD_CHACHA20POLY1305 => aead_cipher::<ChaCha20Poly1305>(key)?
                .decrypt_in_place(nonce, additional_data, &mut in_out)
                .map_err(|_| Error::AeadDecryptionFailed)?,
        }

        Ok(Bytes::from(in_out))
    }

    fn aead_seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes> {
        use aead::AeadInPlace;

        if nonce.len() != self.aead_nonce_size() as usize {
            return Err(Error::InvalidKeyLength);
        }
        let nonce = aead::Nonce::<Aes128Gcm>::from_slice(nonce);
        let mut in_out = plaintext.to_vec();
        match self.0.aead {
            Aead::AEAD_AES128GCM => aead_cipher::<Aes128Gcm>(key)?
                .encrypt_in_place(nonce, additional_data, &mut in_out)
                .map_err(|err| Error::RustCryptoError(err.to_string()))?,
            Aead::AEAD_CHACHA20POLY1305 => aead_cipher::<ChaCha20Poly1305>(key)?
                .encrypt_in_place(nonce, additional_data, &mut in_out)
                .map_err(|err| Error::RustCryptoError(err.to_string()))?,
        }

        Ok(Bytes::from(in_out))
    }

    fn hpke_seal(
        &self,
        public_key: &[u8],
        info: &[u8],
        additional_data: &[u8],
        plaintext: &[u8],
    ) -> Result<(Bytes, Bytes)> {
        match self.0.aead {
            Aead::AEAD_AES128GCM => {
                hpke_seal::<AesGcm128>(public_key, info, additional_data, plaintext)
            }
            Aead::AEAD_CHACHA20POLY1305 => {
                hpke_seal::<HpkeChaCha20Poly1305>(public_key, info, additional_data, plaintext)
            }
        }
    }

    fn hpke_open(
        &self,
        private_key: &[u8],
        kem_output: &[u8],
        info: &[u8],
        additional_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Bytes> {
        match self.0.aead {
            Aead::AEAD_AES128GCM => hpke_open::<AesGcm128>(
                private_key,
                kem_output,
                info,
                additional_data,
                ciphertext,
            ),
            Aead::AEAD_CHACHA20POLY1305 => hpke_open::<HpkeChaCha20Poly1305>(
                private_key,
                kem_output,
                info,
                additional_data,
                ciphertext,
            ),
        }
    }
}
