use crate::mls::crypto::{
    provider::SignatureScheme, HPKEPrivateKey, HPKEPublicKey, SignaturePrivateKey,
    SignaturePublicKey,
};

/// HPKE key pair, used for leaf, parent and init keys
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HPKEKeyPair {
    pub private_key: HPKEPrivateKey,
    pub public_key: HPKEPublicKey,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SignatureKeyPair {
    pub(crate) private_key: SignaturePrivateKey,
    pub(crate) public_key: SignaturePublicKey,
    pub(crate) signature_scheme: SignatureScheme,
}

impl SignatureKeyPair {
    pub fn private_key(&self) -> &SignaturePrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &SignaturePublicKey {
        &self.public_key
    }

    pub fn signature_scheme(&self) -> SignatureScheme {
        self.signature_scheme
    }
}
