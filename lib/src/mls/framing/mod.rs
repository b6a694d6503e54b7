//! [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Message Framing
//!
//! Only members send messages here, and every handshake or application
//! message travels as a [`PrivateMessage`]. Welcomes and key packages are
//! carried unencrypted inside [`MlsMessage`].

#[cfg(test)]
mod framing_test;

pub mod commit;
pub mod group_info;
pub mod private_message;
pub mod proposal;
pub mod welcome;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::ops::Deref;

pub use self::commit::Commit;
pub use self::group_info::{GroupInfo, GroupSecrets};
pub use self::private_message::PrivateMessage;
pub use self::proposal::{Proposal, ProposalOrRef, ProposalRef, ProposalType};
pub use self::welcome::{EncryptedGroupSecrets, Welcome};
use crate::mls::crypto::{
    cipher_suite::CipherSuite, provider::CryptoProvider, Secret, SignaturePrivateKey,
    SignaturePublicKey,
};
use crate::mls::key_package::KeyPackage;
use crate::mls::key_schedule::GroupContext;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u16, deserialize_u32, deserialize_u64, deserialize_u8,
    serialize_opaque_vec, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

const FRAMED_CONTENT_TBS_LABEL: &[u8] = b"FramedContentTBS";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum ProtocolVersion {
    MLS10 = 1,
}

impl TryFrom<u16> for ProtocolVersion {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self> {
        match v {
            1 => Ok(ProtocolVersion::MLS10),
            _ => Err(Error::InvalidProtocolVersion(v)),
        }
    }
}

impl From<ProtocolVersion> for u16 {
    fn from(val: ProtocolVersion) -> u16 {
        val as u16
    }
}

impl Deserializer for ProtocolVersion {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        ProtocolVersion::try_from(deserialize_u16(buf)?)
    }
}

impl Serializer for ProtocolVersion {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16((*self).into());
        Ok(())
    }
}

/// Wire formats this crate reads and writes. Public messages and bare group
/// infos are not supported.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u16)]
pub enum WireFormat {
    PrivateMessage = 2,
    Welcome = 3,
    KeyPackage = 5,
}

impl TryFrom<u16> for WireFormat {
    type Error = Error;

    fn try_from(v: u16) -> Result<Self> {
        match v {
            2 => Ok(WireFormat::PrivateMessage),
            3 => Ok(WireFormat::Welcome),
            5 => Ok(WireFormat::KeyPackage),
            _ => Err(Error::InvalidWireFormat(v)),
        }
    }
}

impl Deserializer for WireFormat {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        WireFormat::try_from(deserialize_u16(buf)?)
    }
}

impl Serializer for WireFormat {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(*self as u16);
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum ContentType {
    Application = 1,
    Proposal = 2,
    Commit = 3,
}

impl TryFrom<u8> for ContentType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(ContentType::Application),
            2 => Ok(ContentType::Proposal),
            3 => Ok(ContentType::Commit),
            _ => Err(Error::InvalidContentType(v)),
        }
    }
}

impl Deserializer for ContentType {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        ContentType::try_from(deserialize_u8(buf)?)
    }
}

impl Serializer for ContentType {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u8(*self as u8);
        Ok(())
    }
}

/// Opaque group identifier, fixed for the life of a group
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash)]
pub struct MlsGroupId(Bytes);

impl MlsGroupId {
    pub fn new<T: Into<Bytes>>(group_id: T) -> Self {
        Self(group_id.into())
    }
}

impl Deref for MlsGroupId {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deserializer for MlsGroupId {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self(deserialize_opaque_vec(buf)?))
    }
}

impl Serializer for MlsGroupId {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.0, buf)
    }
}

const SENDER_TYPE_MEMBER: u8 = 1;

/// Only current members send framed content
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sender {
    Member(LeafIndex),
}

impl Sender {
    pub fn leaf_index(&self) -> LeafIndex {
        match self {
            Sender::Member(leaf) => *leaf,
        }
    }
}

impl Deserializer for Sender {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match deserialize_u8(buf)? {
            SENDER_TYPE_MEMBER => Ok(Sender::Member(LeafIndex::deserialize(buf)?)),
            v => Err(Error::InvalidSenderType(v)),
        }
    }
}

impl Serializer for Sender {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        match self {
            Sender::Member(leaf) => {
                buf.put_u8(SENDER_TYPE_MEMBER);
                leaf.serialize(buf)
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Content {
    Application(Bytes),
    Proposal(Proposal),
    Commit(Commit),
}

impl Content {
    pub fn content_type(&self) -> ContentType {
        match self {
            Content::Application(_) => ContentType::Application,
            Content::Proposal(_) => ContentType::Proposal,
            Content::Commit(_) => ContentType::Commit,
        }
    }

    pub(crate) fn deserialize_body<B: Buf>(buf: &mut B, content_type: ContentType) -> Result<Self> {
        Ok(match content_type {
            ContentType::Application => Content::Application(deserialize_opaque_vec(buf)?),
            ContentType::Proposal => Content::Proposal(Proposal::deserialize(buf)?),
            ContentType::Commit => Content::Commit(Commit::deserialize(buf)?),
        })
    }

    pub(crate) fn serialize_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Content::Application(application) => serialize_opaque_vec(application, buf),
            Content::Proposal(proposal) => proposal.serialize(buf),
            Content::Commit(commit) => commit.serialize(buf),
        }
    }
}

/// [RFC9420 Sec.6](https://www.rfc-editor.org/rfc/rfc9420.html#section-6) Content plus the
/// header that binds it to one group, epoch and sender
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FramedContent {
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub sender: Sender,
    pub authenticated_data: Bytes,
    pub content: Content,
}

impl Deserializer for FramedContent {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let group_id = MlsGroupId::deserialize(buf)?;
        let epoch = deserialize_u64(buf)?;
        let sender = Sender::deserialize(buf)?;
        let authenticated_data = deserialize_opaque_vec(buf)?;
        let content_type = ContentType::deserialize(buf)?;
        let content = Content::deserialize_body(buf, content_type)?;

        Ok(Self {
            group_id,
            epoch,
            sender,
            authenticated_data,
            content,
        })
    }
}

impl Serializer for FramedContent {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.group_id.serialize(buf)?;
        buf.put_u64(self.epoch);
        self.sender.serialize(buf)?;
        serialize_opaque_vec(&self.authenticated_data, buf)?;
        self.content.content_type().serialize(buf)?;
        self.content.serialize_body(buf)
    }
}

/// Signature over the content, plus the confirmation tag when the content is
/// a commit. `confirmation_tag` is empty for other content types.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct FramedContentAuthData {
    pub signature: Bytes,
    pub confirmation_tag: Bytes,
}

impl FramedContentAuthData {
    pub(crate) fn deserialize<B: Buf>(buf: &mut B, content_type: ContentType) -> Result<Self> {
        let signature = deserialize_opaque_vec(buf)?;
        let confirmation_tag = if content_type == ContentType::Commit {
            deserialize_opaque_vec(buf)?
        } else {
            Bytes::new()
        };

        Ok(Self {
            signature,
            confirmation_tag,
        })
    }

    pub(crate) fn serialize<B: BufMut>(&self, buf: &mut B, content_type: ContentType) -> Result<()> {
        serialize_opaque_vec(&self.signature, buf)?;
        if content_type == ContentType::Commit {
            serialize_opaque_vec(&self.confirmation_tag, buf)?;
        }
        Ok(())
    }
}

/// Framed content together with its authentication data, as seen by every
/// member after decryption
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuthenticatedContent {
    pub wire_format: WireFormat,
    pub content: FramedContent,
    pub auth: FramedContentAuthData,
}

impl AuthenticatedContent {
    /// Signs `content` as the local member. The confirmation tag of a commit
    /// is filled in later, once the new epoch's keys exist.
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        sign_key: &SignaturePrivateKey,
        wire_format: WireFormat,
        content: FramedContent,
        group_context: &GroupContext,
    ) -> Result<Self> {
        let tbs = framed_content_tbs(wire_format, &content, group_context)?;
        let signature = crypto_provider.sign_with_label(
            cipher_suite,
            sign_key,
            FRAMED_CONTENT_TBS_LABEL,
            &tbs,
        )?;

        Ok(Self {
            wire_format,
            content,
            auth: FramedContentAuthData {
                signature,
                confirmation_tag: Bytes::new(),
            },
        })
    }

    pub(crate) fn verify_signature(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        verify_key: &SignaturePublicKey,
        group_context: &GroupContext,
    ) -> Result<()> {
        let tbs = framed_content_tbs(self.wire_format, &self.content, group_context)?;
        crypto_provider.verify_with_label(
            cipher_suite,
            verify_key,
            FRAMED_CONTENT_TBS_LABEL,
            &tbs,
            &self.auth.signature,
        )
    }

    /// Reference under which a proposal carried by this content is staged
    pub(crate) fn proposal_ref(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
    ) -> Result<ProposalRef> {
        ProposalRef::new(crypto_provider, cipher_suite, &self.serialize_detached()?)
    }
}

impl Deserializer for AuthenticatedContent {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let wire_format = WireFormat::deserialize(buf)?;
        let content = FramedContent::deserialize(buf)?;
        let auth = FramedContentAuthData::deserialize(buf, content.content.content_type())?;

        Ok(Self {
            wire_format,
            content,
            auth,
        })
    }
}

impl Serializer for AuthenticatedContent {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.wire_format.serialize(buf)?;
        self.content.serialize(buf)?;
        self.auth.serialize(buf, self.content.content.content_type())
    }
}

/// `FramedContentTBS` for a member sender: version, wire format, the content
/// and the group context it is bound to
fn framed_content_tbs(
    wire_format: WireFormat,
    content: &FramedContent,
    group_context: &GroupContext,
) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    ProtocolVersion::MLS10.serialize(&mut buf)?;
    wire_format.serialize(&mut buf)?;
    content.serialize(&mut buf)?;
    group_context.serialize(&mut buf)?;
    Ok(buf.freeze())
}

/// [RFC9420 Sec.6.3.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-6.3.2) Identifies the
/// sender and the ratchet generation of a private message
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SenderData {
    pub leaf_index: LeafIndex,
    pub generation: u32,
    pub reuse_guard: [u8; 4],
}

impl Deserializer for SenderData {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let leaf_index = LeafIndex::deserialize(buf)?;
        let generation = deserialize_u32(buf)?;
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall);
        }
        let mut reuse_guard = [0u8; 4];
        buf.copy_to_slice(&mut reuse_guard);

        Ok(Self {
            leaf_index,
            generation,
            reuse_guard,
        })
    }
}

impl Serializer for SenderData {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.leaf_index.serialize(buf)?;
        buf.put_u32(self.generation);
        buf.put_slice(&self.reuse_guard);
        Ok(())
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SenderDataAAD {
    pub group_id: MlsGroupId,
    pub epoch: u64,
    pub content_type: ContentType,
}

impl Serializer for SenderDataAAD {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.group_id.serialize(buf)?;
        buf.put_u64(self.epoch);
        self.content_type.serialize(buf)
    }
}

fn ciphertext_sample<'a>(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    ciphertext: &'a [u8],
) -> Result<&'a [u8]> {
    let sample_size = crypto_provider.hpke(cipher_suite)?.kdf_extract_size() as usize;
    Ok(&ciphertext[..sample_size.min(ciphertext.len())])
}

pub(crate) fn expand_sender_data_key(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    sender_data_secret: &[u8],
    ciphertext: &[u8],
) -> Result<Secret> {
    let sample = ciphertext_sample(crypto_provider, cipher_suite, ciphertext)?;
    let key_size = crypto_provider.hpke(cipher_suite)?.aead_key_size();
    crypto_provider.expand_with_label(cipher_suite, sender_data_secret, b"key", sample, key_size)
}

pub(crate) fn expand_sender_data_nonce(
    crypto_provider: &impl CryptoProvider,
    cipher_suite: CipherSuite,
    sender_data_secret: &[u8],
    ciphertext: &[u8],
) -> Result<Secret> {
    let sample = ciphertext_sample(crypto_provider, cipher_suite, ciphertext)?;
    let nonce_size = crypto_provider.hpke(cipher_suite)?.aead_nonce_size();
    crypto_provider.expand_with_label(
        cipher_suite,
        sender_data_secret,
        b"nonce",
        sample,
        nonce_size,
    )
}

/// Top-level message as exchanged between clients
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum MlsMessage {
    PrivateMessage(PrivateMessage),
    Welcome(Welcome),
    KeyPackage(KeyPackage),
}

impl MlsMessage {
    pub fn wire_format(&self) -> WireFormat {
        match self {
            MlsMessage::PrivateMessage(_) => WireFormat::PrivateMessage,
            MlsMessage::Welcome(_) => WireFormat::Welcome,
            MlsMessage::KeyPackage(_) => WireFormat::KeyPackage,
        }
    }
}

impl Deserializer for MlsMessage {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        ProtocolVersion::deserialize(buf)?;
        match WireFormat::deserialize(buf)? {
            WireFormat::PrivateMessage => {
                Ok(MlsMessage::PrivateMessage(PrivateMessage::deserialize(buf)?))
            }
            WireFormat::Welcome => Ok(MlsMessage::Welcome(Welcome::deserialize(buf)?)),
            WireFormat::KeyPackage => Ok(MlsMessage::KeyPackage(KeyPackage::deserialize(buf)?)),
        }
    }
}

impl Serializer for MlsMessage {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        ProtocolVersion::MLS10.serialize(buf)?;
        self.wire_format().serialize(buf)?;
        match self {
            MlsMessage::PrivateMessage(message) => message.serialize(buf),
            MlsMessage::Welcome(welcome) => welcome.serialize(buf),
            MlsMessage::KeyPackage(key_package) => key_package.serialize(buf),
        }
    }
}
