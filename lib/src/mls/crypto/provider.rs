//! [RFC9420 Sec.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-5) Crypto provider: the
//! primitive suite selected per cipher suite, plus the labelled constructions MLS builds on top.

mod rust;

use bytes::{BufMut, Bytes, BytesMut};

pub use self::rust::RustCryptoProvider;
use crate::mls::crypto::rng::random_secret;
use crate::mls::crypto::{
    cipher_suite::CipherSuite,
    key_pair::{HPKEKeyPair, SignatureKeyPair},
    Aead, Kdf, Kem, Secret,
};
use crate::mls::utilities::{
    error::{Error, Result},
    serde::serialize_opaque_vec,
};

/// Prefix of every label fed into `ExpandWithLabel`, `SignWithLabel` and
/// `EncryptWithLabel`
const MLS_LABEL_PREFIX: &[u8] = b"MLS 1.0 ";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum HashScheme {
    SHA256,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum SignatureScheme {
    /// EdDSA over edwards25519
    ED25519 = 0x0807,
}

/// [RFC9180](https://www.rfc-editor.org/rfc/rfc9180.html) HPKE algorithm identifiers
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct HpkeSuite {
    pub kem: Kem,
    pub kdf: Kdf,
    pub aead: Aead,
}

pub trait Hash: Send + Sync {
    fn size(&self) -> usize;

    fn digest(&self, data: &[u8]) -> Bytes;

    fn mac(&self, key: &[u8], message: &[u8]) -> Result<Bytes>;

    /// Constant-time comparison of `tag` against `MAC(key, message)`
    fn verify_mac(&self, key: &[u8], message: &[u8], tag: &[u8]) -> Result<()>;
}

pub trait Hpke: Send + Sync {
    fn hpke_suite(&self) -> HpkeSuite;

    fn kem_derive_key_pair(&self, ikm: &[u8]) -> Result<HPKEKeyPair>;

    fn kdf_expand(&self, secret: &[u8], info: &[u8], length: u16) -> Result<Secret>;

    fn kdf_extract(&self, secret: &[u8], salt: &[u8]) -> Result<Secret>;

    fn kdf_extract_size(&self) -> u16;

    fn aead_key_size(&self) -> u16;

    fn aead_nonce_size(&self) -> u16;

    fn aead_open(
        &self,
        key: &[u8],
        nonce: &[u8],
        ciphertext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes>;

    fn aead_seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        plaintext: &[u8],
        additional_data: &[u8],
    ) -> Result<Bytes>;

    /// Single-shot HPKE base mode seal, returns `(kem_output, ciphertext)`
    fn hpke_seal(
        &self,
        public_key: &[u8],
        info: &[u8],
        additional_data: &[u8],
        plaintext: &[u8],
    ) -> Result<(Bytes, Bytes)>;

    fn hpke_open(
        &self,
        private_key: &[u8],
        kem_output: &[u8],
        info: &[u8],
        additional_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Bytes>;
}

pub trait Signature: Send + Sync {
    fn signature_key_pair(&self) -> Result<SignatureKeyPair>;

    fn signature_scheme(&self) -> SignatureScheme;

    fn sign(&self, sign_key: &[u8], message: &[u8]) -> Result<Bytes>;

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()>;
}

fn labelled(label: &[u8]) -> Vec<u8> {
    [MLS_LABEL_PREFIX, label].concat()
}

fn serialize_label_and_content(label: &[u8], content: &[u8]) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    serialize_opaque_vec(&labelled(label), &mut buf)?;
    serialize_opaque_vec(content, &mut buf)?;
    Ok(buf.freeze())
}

/// Selects the primitive suite for a cipher suite and derives the labelled
/// operations of [RFC9420 Sec.5](https://www.rfc-editor.org/rfc/rfc9420.html#section-5) from it.
pub trait CryptoProvider {
    fn supports(&self, cipher_suite: CipherSuite) -> bool;

    fn supported(&self) -> Vec<CipherSuite>;

    fn hash(&self, cipher_suite: CipherSuite) -> Result<&dyn Hash>;

    fn hpke(&self, cipher_suite: CipherSuite) -> Result<&dyn Hpke>;

    fn signature(&self, cipher_suite: CipherSuite) -> Result<&dyn Signature>;

    /// Fresh HPKE key pair from `Nh` bytes of OS randomness
    fn generate_hpke_key_pair(&self, cipher_suite: CipherSuite) -> Result<HPKEKeyPair> {
        let hpke = self.hpke(cipher_suite)?;
        let ikm = random_secret(usize::from(hpke.kdf_extract_size()))?;
        hpke.kem_derive_key_pair(&ikm)
    }

    fn sign_mac(&self, cipher_suite: CipherSuite, key: &[u8], message: &[u8]) -> Result<Bytes> {
        self.hash(cipher_suite)?.mac(key, message)
    }

    fn verify_mac(
        &self,
        cipher_suite: CipherSuite,
        key: &[u8],
        message: &[u8],
        tag: &[u8],
    ) -> Result<()> {
        self.hash(cipher_suite)?.verify_mac(key, message, tag)
    }

    /// [RFC9420 Sec.5.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.2) `RefHash`
    fn ref_hash(&self, cipher_suite: CipherSuite, label: &[u8], value: &[u8]) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        serialize_opaque_vec(label, &mut buf)?;
        serialize_opaque_vec(value, &mut buf)?;
        Ok(self.hash(cipher_suite)?.digest(&buf))
    }

    /// [RFC9420 Sec.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-8) `ExpandWithLabel`
    fn expand_with_label(
        &self,
        cipher_suite: CipherSuite,
        secret: &[u8],
        label: &[u8],
        context: &[u8],
        length: u16,
    ) -> Result<Secret> {
        let mut kdf_label = BytesMut::new();
        kdf_label.put_u16(length);
        serialize_opaque_vec(&labelled(label), &mut kdf_label)?;
        serialize_opaque_vec(context, &mut kdf_label)?;

        self.hpke(cipher_suite)?
            .kdf_expand(secret, &kdf_label, length)
    }

    /// [RFC9420 Sec.8](https://www.rfc-editor.org/rfc/rfc9420.html#section-8) `DeriveSecret`
    fn derive_secret(
        &self,
        cipher_suite: CipherSuite,
        secret: &[u8],
        label: &[u8],
    ) -> Result<Secret> {
        let length = self.hpke(cipher_suite)?.kdf_extract_size();
        self.expand_with_label(cipher_suite, secret, label, &[], length)
    }

    /// [RFC9420 Sec.5.1.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.1.2) `SignWithLabel`
    fn sign_with_label(
        &self,
        cipher_suite: CipherSuite,
        sign_key: &[u8],
        label: &[u8],
        content: &[u8],
    ) -> Result<Bytes> {
        let sign_content = serialize_label_and_content(label, content)?;
        self.signature(cipher_suite)?.sign(sign_key, &sign_content)
    }

    fn verify_with_label(
        &self,
        cipher_suite: CipherSuite,
        verify_key: &[u8],
        label: &[u8],
        content: &[u8],
        signature: &[u8],
    ) -> Result<()> {
        let sign_content = serialize_label_and_content(label, content)?;
        self.signature(cipher_suite)?
            .verify(verify_key, &sign_content, signature)
            .map_err(|_| Error::SignatureVerificationFailed)
    }

    /// [RFC9420 Sec.5.1.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.1.3) `EncryptWithLabel`,
    /// returns `(kem_output, ciphertext)`
    fn encrypt_with_label(
        &self,
        cipher_suite: CipherSuite,
        public_key: &[u8],
        label: &[u8],
        context: &[u8],
        plaintext: &[u8],
    ) -> Result<(Bytes, Bytes)> {
        let encrypt_context = serialize_label_and_content(label, context)?;
        self.hpke(cipher_suite)?
            .hpke_seal(public_key, &encrypt_context, &[], plaintext)
    }

    fn decrypt_with_label(
        &self,
        cipher_suite: CipherSuite,
        private_key: &[u8],
        label: &[u8],
        context: &[u8],
        kem_output: &[u8],
        ciphertext: &[u8],
    ) -> Result<Bytes> {
        let encrypt_context = serialize_label_and_content(label, context)?;
        self.hpke(cipher_suite)?
            .hpke_open(private_key, kem_output, &encrypt_context, &[], ciphertext)
    }
}
