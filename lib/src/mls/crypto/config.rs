//! Protocol version and cipher suite selection for key packages.

use crate::mls::crypto::cipher_suite::CipherSuite;
use crate::mls::framing::ProtocolVersion;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CryptoConfig {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
}

impl CryptoConfig {
    pub fn new(cipher_suite: CipherSuite) -> Self {
        Self {
            version: ProtocolVersion::MLS10,
            cipher_suite,
        }
    }
}

/// Builds a [`CryptoConfig`]. A cipher suite must be supplied; the version
/// defaults to MLS 1.0.
#[derive(Default, Debug)]
pub struct CryptoConfigBuilder {
    version: Option<ProtocolVersion>,
    cipher_suite: Option<CipherSuite>,
}

impl CryptoConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = Some(version);
        self
    }

    #[must_use]
    pub fn with_cipher_suite(mut self, cipher_suite: CipherSuite) -> Self {
        self.cipher_suite = Some(cipher_suite);
        self
    }

    /// Returns `None` when no cipher suite was chosen.
    pub fn build(self) -> Option<CryptoConfig> {
        Some(CryptoConfig {
            version: self.version.unwrap_or(ProtocolVersion::MLS10),
            cipher_suite: self.cipher_suite?,
        })
    }
}
