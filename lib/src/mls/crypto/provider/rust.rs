mod hash;
mod hpke;
mod signature;

use self::hash::HashSchemeWrapper;
use self::hpke::HpkeSuiteWrapper;
use self::signature::SignatureSchemeWrapper;
use super::{
    Aead, CipherSuite, CryptoProvider, Error, Hash, HashScheme, Hpke, HpkeSuite, Kdf, Kem, Result,
    Signature, SignatureScheme,
};

struct CipherSuiteDescription {
    hash: HashSchemeWrapper,
    hpke: HpkeSuiteWrapper,
    signature: SignatureSchemeWrapper,
}

static X25519_AES128GCM_SHA256_ED25519: CipherSuiteDescription = CipherSuiteDescription {
    hash: HashSchemeWrapper(HashScheme::SHA256),
    hpke: HpkeSuiteWrapper(HpkeSuite {
        kem: Kem::KEM_X25519_HKDF_SHA256,
        kdf: Kdf::KDF_HKDF_SHA256,
        aead: Aead::AEAD_AES128GCM,
    }),
    signature: SignatureSchemeWrapper(SignatureScheme::ED25519),
};

static X25519_CHACHA20POLY1305_SHA256_ED25519: CipherSuiteDescription = CipherSuiteDescription {
    hash: HashSchemeWrapper(HashScheme::SHA256),
    hpke: HpkeSuiteWrapper(HpkeSuite {
        kem: Kem::KEM_X25519_HKDF_SHA256,
        kdf: Kdf::KDF_HKDF_SHA256,
        aead: Aead::AEAD_CHACHA20POLY1305,
    }),
    signature: SignatureSchemeWrapper(SignatureScheme::ED25519),
};

/// [RustCrypto](https://github.com/RustCrypto) based crypto provider
#[derive(Default, Debug, Copy, Clone)]
pub struct RustCryptoProvider;

impl RustCryptoProvider {
    fn description(cipher_suite: CipherSuite) -> Result<&'static CipherSuiteDescription> {
        match cipher_suite {
            CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519 => {
                Ok(&X25519_AES128GCM_SHA256_ED25519)
            }
            CipherSuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519 => {
                Ok(&X25519_CHACHA20POLY1305_SHA256_ED25519)
            }
            CipherSuite::Unknown(v) => Err(Error::UnsupportedCipherSuite(v)),
        }
    }
}

impl CryptoProvider for RustCryptoProvider {
    fn supports(&self, cipher_suite: CipherSuite) -> bool {
        Self::description(cipher_suite).is_ok()
    }

    fn supported(&self) -> Vec<CipherSuite> {
        vec![
            CipherSuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519,
            CipherSuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519,
        ]
    }

    fn hash(&self, cipher_suite: CipherSuite) -> Result<&dyn Hash> {
        Ok(&Self::description(cipher_suite)?.hash)
    }

    fn hpke(&self, cipher_suite: CipherSuite) -> Result<&dyn Hpke> {
        Ok(&Self::description(cipher_suite)?.hpke)
    }

    fn signature(&self, cipher_suite: CipherSuite) -> Result<&dyn Signature> {
        Ok(&Self::description(cipher_suite)?.signature)
    }
}
