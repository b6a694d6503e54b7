//! Crate-wide error type

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by callers to decide whether
/// to drop a message, drop a member, or report a bug.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Truncated or otherwise invalid wire/persisted bytes
    MalformedInput,
    /// Signature, MAC, AEAD tag or derived public key did not verify
    AuthenticationFailure,
    /// Epoch or generation already consumed, or outside the accepted window
    StaleOrReplayed,
    /// Reference to a leaf or node that does not exist
    CapacityOrIndex,
    /// The primitive suite reported a failure
    CryptoPrimitive,
    /// Well-formed input that the group state machine cannot accept
    ProtocolViolation,
}

#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum Error {
    // codec
    #[error("buffer too small")]
    BufferTooSmall,
    #[error("invalid variable length integer prefix")]
    InvalidVariableLengthIntegerPrefix,
    #[error("minimum encoding was not used")]
    MinimumEncodingWasNotUsed,
    #[error("varint exceeds 30 bits")]
    VarintExceeds30Bits,
    #[error("opaque size exceeds maximum value of u32")]
    OpaqueSizeExceedsMaximumValueOfU32,
    #[error("invalid optional value")]
    InvalidOptionalValue,
    #[error("{0} trailing bytes after the last field")]
    TrailingBytes(usize),
    #[error("padding contains non-zero bytes")]
    PaddingContainsNonZeroBytes,
    #[error("invalid protocol version {0}")]
    InvalidProtocolVersion(u16),
    #[error("invalid wire format {0}")]
    InvalidWireFormat(u16),
    #[error("invalid credential type value")]
    InvalidCredentialTypeValue,
    #[error("invalid content type {0}")]
    InvalidContentType(u8),
    #[error("invalid sender type {0}")]
    InvalidSenderType(u8),
    #[error("invalid proposal type {0}")]
    InvalidProposalType(u16),
    #[error("invalid proposal or ref type {0}")]
    InvalidProposalOrRefType(u8),
    #[error("invalid node type {0}")]
    InvalidNodeType(u8),
    #[error("invalid leaf node source {0}")]
    InvalidLeafNodeSource(u8),
    #[error("unsupported extension type {0}")]
    UnsupportedExtension(u16),
    #[error("ratchet tree with {0} nodes is not a complete tree")]
    InvalidTreeSize(usize),
    #[error("node type does not match its position in the tree")]
    NodeTypeMismatch,
    #[error("private key column length {actual} does not match tree width {expected}")]
    PrivateTreeSizeMismatch { expected: usize, actual: usize },
    #[error("secret tree belongs to another leaf or cipher suite")]
    SecretTreeMismatch,

    // primitives
    #[error("cipher suite {0} is not supported")]
    UnsupportedCipherSuite(u16),
    #[error("rust crypto error: {0}")]
    RustCryptoError(String),
    #[error("hpke error: {0}")]
    HpkeError(String),
    #[error("invalid key length")]
    InvalidKeyLength,
    #[error("invalid ed25519 private key")]
    InvalidEd25519PrivateKey,
    #[error("invalid ed25519 public key")]
    InvalidEd25519PublicKey,
    #[error("entropy source failed: {0}")]
    EntropyUnavailable(String),

    // authentication
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("MAC verification failed")]
    MacVerificationFailed,
    #[error("confirmation tag mismatch")]
    ConfirmationTagMismatch,
    #[error("AEAD decryption failed")]
    AeadDecryptionFailed,
    #[error("HPKE decryption failed")]
    HpkeDecryptionFailed,
    #[error("derived public key does not match the advertised key")]
    PublicKeyMismatch,
    #[error("tree hash does not match the group context")]
    TreeHashMismatch,

    // stale or replayed
    #[error("message for epoch {actual}, group is at epoch {expected}")]
    WrongEpoch { expected: u64, actual: u64 },
    #[error("generation {0} was already consumed")]
    GenerationAlreadyConsumed(u32),
    #[error("generation {generation} is too far ahead of {current}")]
    GenerationTooFarAhead { current: u32, generation: u32 },
    #[error("generation counter exhausted")]
    GenerationExhausted,

    // capacity or index
    #[error("leaf index {0} is out of range")]
    InvalidLeafIndex(u32),
    #[error("leaf {0} is blank")]
    BlankLeaf(u32),
    #[error("node index {0} is out of range")]
    InvalidNodeIndex(u32),
    #[error("ratchet tree is full")]
    TreeFull,

    // protocol
    #[error("group id does not match")]
    GroupIdMismatch,
    #[error("cipher suite does not match the group")]
    CipherSuiteMismatch,
    #[error("unexpected wire format")]
    UnexpectedWireFormat,
    #[error("welcome does not contain secrets for this key package")]
    WelcomeNotForThisMember,
    #[error("group info does not carry a ratchet tree")]
    MissingRatchetTree,
    #[error("own leaf was not found in the ratchet tree")]
    OwnLeafNotFound,
    #[error("unknown proposal reference")]
    UnknownProposalRef,
    #[error("invalid proposal: {0}")]
    InvalidProposal(&'static str),
    #[error("invalid leaf node: {0}")]
    InvalidLeafNode(&'static str),
    #[error("invalid key package: {0}")]
    InvalidKeyPackage(&'static str),
    #[error("commit carries no update path")]
    MissingUpdatePath,
    #[error("update path has {actual} nodes, expected {expected}")]
    UpdatePathLengthMismatch { expected: usize, actual: usize },
    #[error("no decryptable path secret in update path")]
    NoDecryptablePathSecret,
    #[error("no pending commit for an own commit")]
    NoPendingCommit,
    #[error("own commit does not match the pending commit")]
    PendingCommitMismatch,
    #[error("no private key held for node {0}")]
    MissingPrivateKey(u32),
    #[error("create_welcome needs at least one recipient")]
    NoRecipients,
    #[error("pre-shared keys are not supported")]
    PskNotSupported,
}

impl Error {
    /// Classifies the error into the [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BufferTooSmall
            | Error::InvalidVariableLengthIntegerPrefix
            | Error::MinimumEncodingWasNotUsed
            | Error::VarintExceeds30Bits
            | Error::OpaqueSizeExceedsMaximumValueOfU32
            | Error::InvalidOptionalValue
            | Error::TrailingBytes(_)
            | Error::PaddingContainsNonZeroBytes
            | Error::InvalidProtocolVersion(_)
            | Error::InvalidWireFormat(_)
            | Error::InvalidCredentialTypeValue
            | Error::InvalidContentType(_)
            | Error::InvalidSenderType(_)
            | Error::InvalidProposalType(_)
            | Error::InvalidProposalOrRefType(_)
            | Error::InvalidNodeType(_)
            | Error::InvalidLeafNodeSource(_)
            | Error::UnsupportedExtension(_)
            | Error::InvalidTreeSize(_)
            | Error::NodeTypeMismatch
            | Error::PrivateTreeSizeMismatch { .. }
            | Error::SecretTreeMismatch
            | Error::UpdatePathLengthMismatch { .. } => ErrorKind::MalformedInput,

            Error::UnsupportedCipherSuite(_)
            | Error::RustCryptoError(_)
            | Error::HpkeError(_)
            | Error::InvalidKeyLength
            | Error::InvalidEd25519PrivateKey
            | Error::InvalidEd25519PublicKey
            | Error::EntropyUnavailable(_) => ErrorKind::CryptoPrimitive,

            Error::SignatureVerificationFailed
            | Error::MacVerificationFailed
            | Error::ConfirmationTagMismatch
            | Error::AeadDecryptionFailed
            | Error::HpkeDecryptionFailed
            | Error::PublicKeyMismatch
            | Error::TreeHashMismatch => ErrorKind::AuthenticationFailure,

            Error::WrongEpoch { .. }
            | Error::GenerationAlreadyConsumed(_)
            | Error::GenerationTooFarAhead { .. }
            | Error::GenerationExhausted => ErrorKind::StaleOrReplayed,

            Error::InvalidLeafIndex(_)
            | Error::BlankLeaf(_)
            | Error::InvalidNodeIndex(_)
            | Error::TreeFull => ErrorKind::CapacityOrIndex,

            Error::GroupIdMismatch
            | Error::CipherSuiteMismatch
            | Error::UnexpectedWireFormat
            | Error::WelcomeNotForThisMember
            | Error::MissingRatchetTree
            | Error::OwnLeafNotFound
            | Error::UnknownProposalRef
            | Error::InvalidProposal(_)
            | Error::InvalidLeafNode(_)
            | Error::InvalidKeyPackage(_)
            | Error::MissingUpdatePath
            | Error::NoDecryptablePathSecret
            | Error::NoPendingCommit
            | Error::PendingCommitMismatch
            | Error::MissingPrivateKey(_)
            | Error::NoRecipients
            | Error::PskNotSupported => ErrorKind::ProtocolViolation,
        }
    }
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        Error::SignatureVerificationFailed
    }
}

impl From<hmac::digest::InvalidLength> for Error {
    fn from(_: hmac::digest::InvalidLength) -> Self {
        Error::InvalidKeyLength
    }
}

impl From<hkdf::InvalidPrkLength> for Error {
    fn from(_: hkdf::InvalidPrkLength) -> Self {
        Error::InvalidKeyLength
    }
}

impl From<hkdf::InvalidLength> for Error {
    fn from(err: hkdf::InvalidLength) -> Self {
        Error::RustCryptoError(err.to_string())
    }
}

impl From<rand_core::Error> for Error {
    fn from(err: rand_core::Error) -> Self {
        Error::EntropyUnavailable(err.to_string())
    }
}

impl From<hpke::HpkeError> for Error {
    fn from(err: hpke::HpkeError) -> Self {
        match err {
            hpke::HpkeError::OpenError => Error::HpkeDecryptionFailed,
            other => Error::HpkeError(format!("{other:?}")),
        }
    }
}
