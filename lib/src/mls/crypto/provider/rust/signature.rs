use bytes::Bytes;
use ed25519_dalek::{SigningKey, VerifyingKey};
use signature::{Signer, Verifier};

use crate::mls::crypto::rng::random_bytes;
use crate::mls::crypto::{key_pair::SignatureKeyPair, provider::SignatureScheme, Key, Secret};
use crate::mls::utilities::error::{Error, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(super) struct SignatureSchemeWrapper(pub(super) SignatureScheme);

fn ed25519_signing_key(private_key: &[u8]) -> Result<SigningKey> {
    let bytes = private_key
        .try_into()
        .map_err(|_| Error::InvalidEd25519PrivateKey)?;
    Ok(SigningKey::from_bytes(bytes))
}

fn ed25519_verifying_key(public_key: &[u8]) -> Result<VerifyingKey> {
    let bytes = public_key
        .try_into()
        .map_err(|_| Error::InvalidEd25519PublicKey)?;
    VerifyingKey::from_bytes(bytes).map_err(|_| Error::InvalidEd25519PublicKey)
}

impl crate::mls::crypto::provider::Signature for SignatureSchemeWrapper {
    /// Fresh key pair; the private half is the 32-byte Ed25519 seed
    fn signature_key_pair(&self) -> Result<SignatureKeyPair> {
        let SignatureScheme::ED25519 = self.0;
        let signing_key = SigningKey::from_bytes(&random_bytes::<32>()?);

        Ok(SignatureKeyPair {
            private_key: Secret::from_slice(signing_key.as_bytes()),
            public_key: Key::new(signing_key.verifying_key().to_bytes().to_vec()),
            signature_scheme: self.0,
        })
    }

    fn signature_scheme(&self) -> SignatureScheme {
        self.0
    }

    fn sign(&self, sign_key: &[u8], message: &[u8]) -> Result<Bytes> {
        let SignatureScheme::ED25519 = self.0;
        let signature: ed25519_dalek::Signature = ed25519_signing_key(sign_key)?.sign(message);
        Ok(Bytes::copy_from_slice(&signature.to_bytes()))
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        let SignatureScheme::ED25519 = self.0;
        let signature = ed25519_dalek::Signature::from_slice(signature)?;
        ed25519_verifying_key(public_key)?.verify(message, &signature)?;
        Ok(())
    }
}
