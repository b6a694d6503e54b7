use serde::Deserialize;

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::crypto::provider::{CryptoProvider, RustCryptoProvider};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::serde_test::load_test_vector;

#[derive(Debug, Deserialize)]
struct RefHash {
    label: String,
    #[serde(with = "hex")]
    value: Vec<u8>,
    #[serde(with = "hex")]
    out: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct ExpandWithLabel {
    #[serde(with = "hex")]
    secret: Vec<u8>,
    label: String,
    #[serde(with = "hex")]
    context: Vec<u8>,
    length: u16,
    #[serde(with = "hex")]
    out: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct DeriveSecret {
    #[serde(with = "hex")]
    secret: Vec<u8>,
    label: String,
    #[serde(with = "hex")]
    out: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct DeriveTreeSecret {
    #[serde(with = "hex")]
    secret: Vec<u8>,
    label: String,
    generation: u32,
    length: u16,
    #[serde(with = "hex")]
    out: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct SignWithLabel {
    #[serde(with = "hex")]
    r#priv: Vec<u8>,
    #[serde(with = "hex")]
    r#pub: Vec<u8>,
    #[serde(with = "hex")]
    content: Vec<u8>,
    label: String,
    #[serde(with = "hex")]
    signature: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct DeriveKeyPair {
    #[serde(with = "hex")]
    ikm: Vec<u8>,
    #[serde(with = "hex")]
    r#pub: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct CryptoBasicsTest {
    cipher_suite: u16,
    ref_hash: RefHash,
    expand_with_label: ExpandWithLabel,
    derive_secret: DeriveSecret,
    derive_tree_secret: DeriveTreeSecret,
    sign_with_label: SignWithLabel,
    derive_key_pair: DeriveKeyPair,
}

fn crypto_basics_test(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    tc: &CryptoBasicsTest,
) -> Result<()> {
    let out = crypto_provider.ref_hash(
        cipher_suite,
        tc.ref_hash.label.as_bytes(),
        &tc.ref_hash.value,
    )?;
    assert_eq!(out.as_ref(), tc.ref_hash.out.as_slice(), "ref_hash");

    let out = crypto_provider.expand_with_label(
        cipher_suite,
        &tc.expand_with_label.secret,
        tc.expand_with_label.label.as_bytes(),
        &tc.expand_with_label.context,
        tc.expand_with_label.length,
    )?;
    assert_eq!(&*out, tc.expand_with_label.out.as_slice(), "expand_with_label");

    let out = crypto_provider.derive_secret(
        cipher_suite,
        &tc.derive_secret.secret,
        tc.derive_secret.label.as_bytes(),
    )?;
    assert_eq!(&*out, tc.derive_secret.out.as_slice(), "derive_secret");

    let out = crypto_provider.expand_with_label(
        cipher_suite,
        &tc.derive_tree_secret.secret,
        tc.derive_tree_secret.label.as_bytes(),
        &tc.derive_tree_secret.generation.to_be_bytes(),
        tc.derive_tree_secret.length,
    )?;
    assert_eq!(&*out, tc.derive_tree_secret.out.as_slice(), "derive_tree_secret");

    let signature = crypto_provider.sign_with_label(
        cipher_suite,
        &tc.sign_with_label.r#priv,
        tc.sign_with_label.label.as_bytes(),
        &tc.sign_with_label.content,
    )?;
    assert_eq!(
        signature.as_ref(),
        tc.sign_with_label.signature.as_slice(),
        "ed25519 signatures are deterministic"
    );
    crypto_provider.verify_with_label(
        cipher_suite,
        &tc.sign_with_label.r#pub,
        tc.sign_with_label.label.as_bytes(),
        &tc.sign_with_label.content,
        &tc.sign_with_label.signature,
    )?;
    assert_eq!(
        crypto_provider.verify_with_label(
            cipher_suite,
            &tc.sign_with_label.r#pub,
            b"OtherLabel",
            &tc.sign_with_label.content,
            &tc.sign_with_label.signature,
        ),
        Err(Error::SignatureVerificationFailed)
    );

    let key_pair = crypto_provider
        .hpke(cipher_suite)?
        .kem_derive_key_pair(&tc.derive_key_pair.ikm)?;
    assert_eq!(
        key_pair.public_key.as_ref(),
        tc.derive_key_pair.r#pub.as_slice(),
        "derive_key_pair"
    );

    Ok(())
}

#[test]
fn test_crypto_basics() -> Result<()> {
    let tests: Vec<CryptoBasicsTest> = load_test_vector("test-vectors/crypto-basics.json");
    let crypto_provider = RustCryptoProvider;

    for tc in &tests {
        let cipher_suite: CipherSuite = tc.cipher_suite.into();
        assert!(crypto_provider.supports(cipher_suite), "{cipher_suite}");
        crypto_basics_test(&crypto_provider, cipher_suite, tc)?;
    }

    Ok(())
}

#[test]
fn encrypt_with_label_binds_label_and_context() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    for cipher_suite in crypto_provider.supported() {
        let hpke = crypto_provider.hpke(cipher_suite)?;
        let key_pair = hpke.kem_derive_key_pair(&[7u8; 32])?;

        let (kem_output, ciphertext) = crypto_provider.encrypt_with_label(
            cipher_suite,
            &key_pair.public_key,
            b"UpdatePathNode",
            b"context",
            b"path secret",
        )?;

        let plaintext = crypto_provider.decrypt_with_label(
            cipher_suite,
            &key_pair.private_key,
            b"UpdatePathNode",
            b"context",
            &kem_output,
            &ciphertext,
        )?;
        assert_eq!(plaintext.as_ref(), b"path secret");

        let wrong_context = crypto_provider.decrypt_with_label(
            cipher_suite,
            &key_pair.private_key,
            b"UpdatePathNode",
            b"other context",
            &kem_output,
            &ciphertext,
        );
        assert_eq!(wrong_context, Err(Error::HpkeDecryptionFailed));
    }
    Ok(())
}

#[test]
fn aead_rejects_tampering() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    for cipher_suite in crypto_provider.supported() {
        let hpke = crypto_provider.hpke(cipher_suite)?;
        let key = vec![1u8; hpke.aead_key_size() as usize];
        let nonce = vec![2u8; hpke.aead_nonce_size() as usize];

        let sealed = hpke.aead_seal(&key, &nonce, b"hello world", b"aad")?;
        assert_eq!(
            hpke.aead_open(&key, &nonce, &sealed, b"aad")?.as_ref(),
            b"hello world"
        );

        let mut tampered = sealed.to_vec();
        tampered[0] ^= 0x01;
        assert_eq!(
            hpke.aead_open(&key, &nonce, &tampered, b"aad"),
            Err(Error::AeadDecryptionFailed)
        );
        assert_eq!(
            hpke.aead_open(&key[1..], &nonce, &sealed, b"aad"),
            Err(Error::InvalidKeyLength)
        );
    }
    Ok(())
}

#[test]
fn mac_verification_is_strict() -> Result<()> {
    let crypto_provider = RustCryptoProvider;
    let cipher_suite = CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;
    let tag = crypto_provider.sign_mac(cipher_suite, b"confirmation key", b"transcript")?;
    crypto_provider.verify_mac(cipher_suite, b"confirmation key", b"transcript", &tag)?;
    assert_eq!(
        crypto_provider.verify_mac(cipher_suite, b"confirmation key", b"transcript!", &tag),
        Err(Error::MacVerificationFailed)
    );
    Ok(())
}

#[test]
fn unknown_cipher_suite_is_unsupported() {
    let crypto_provider = RustCryptoProvider;
    let cipher_suite = CipherSuite::from(0x0002);
    assert!(!crypto_provider.supports(cipher_suite));
    assert_eq!(
        crypto_provider.hash(cipher_suite).err(),
        Some(Error::UnsupportedCipherSuite(0x0002))
    );
}
