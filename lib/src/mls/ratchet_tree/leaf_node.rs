//! [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) Leaf Node Contents

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::crypto::{
    cipher_suite::CipherSuite,
    credential::{Credential, CredentialType},
    provider::CryptoProvider,
    HPKEPublicKey, SignaturePrivateKey, SignaturePublicKey,
};
use crate::mls::extensibility::{ExtensionType, Extensions};
use crate::mls::framing::{proposal::ProposalType, MlsGroupId, ProtocolVersion};
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u16, deserialize_u8, deserialize_vector,
    serialize_opaque_vec, serialize_vector, Deserializer, Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

const LEAF_NODE_TBS_LABEL: &[u8] = b"LeafNodeTBS";

fn deserialize_u16_list<B: Buf, T: From<u16>>(buf: &mut B) -> Result<Vec<T>> {
    let mut list = vec![];
    deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
        list.push(deserialize_u16(b)?.into());
        Ok(())
    })?;
    Ok(list)
}

fn serialize_u16_list<B: BufMut, T: Copy + Into<u16>>(list: &[T], buf: &mut B) -> Result<()> {
    serialize_vector(list.len(), buf, |i: usize, b: &mut BytesMut| -> Result<()> {
        b.put_u16(list[i].into());
        Ok(())
    })
}

/// [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) What a client
/// supports, advertised in its leaf
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Capabilities {
    pub versions: Vec<ProtocolVersion>,
    pub cipher_suites: Vec<CipherSuite>,
    pub extensions: Vec<ExtensionType>,
    pub proposals: Vec<ProposalType>,
    pub credentials: Vec<CredentialType>,
}

impl Capabilities {
    pub fn new(cipher_suites: Vec<CipherSuite>) -> Self {
        Self {
            versions: vec![ProtocolVersion::MLS10],
            cipher_suites,
            extensions: vec![],
            proposals: vec![],
            credentials: vec![CredentialType::Basic],
        }
    }
}

impl Deserializer for Capabilities {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut versions = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            versions.push(ProtocolVersion::try_from(deserialize_u16(b)?)?);
            Ok(())
        })?;

        Ok(Self {
            versions,
            cipher_suites: deserialize_u16_list(buf)?,
            extensions: deserialize_u16_list(buf)?,
            proposals: deserialize_u16_list(buf)?,
            credentials: deserialize_u16_list(buf)?,
        })
    }
}

impl Serializer for Capabilities {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_u16_list(&self.versions, buf)?;
        serialize_u16_list(&self.cipher_suites, buf)?;
        serialize_u16_list(&self.extensions, buf)?;
        serialize_u16_list(&self.proposals, buf)?;
        serialize_u16_list(&self.credentials, buf)
    }
}

/// Where a leaf node came from, which decides what its signature covers
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum LeafNodeSource {
    KeyPackage = 1,
    Update = 2,
    Commit = 3,
}

impl TryFrom<u8> for LeafNodeSource {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(LeafNodeSource::KeyPackage),
            2 => Ok(LeafNodeSource::Update),
            3 => Ok(LeafNodeSource::Commit),
            _ => Err(Error::InvalidLeafNodeSource(v)),
        }
    }
}

/// Group and position a leaf node is bound to when it is not part of a key
/// package
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TreePosition {
    pub(crate) group_id: MlsGroupId,
    pub(crate) leaf_index: LeafIndex,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TreeInfoTBS {
    KeyPackage,
    UpdateOrCommit(TreePosition),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LeafNodePayload {
    pub(crate) encryption_key: HPKEPublicKey,
    pub(crate) signature_key: SignaturePublicKey,
    pub(crate) credential: Credential,
    pub(crate) capabilities: Capabilities,
    pub(crate) leaf_node_source: LeafNodeSource,
    pub(crate) extensions: Extensions,
}

impl Deserializer for LeafNodePayload {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self {
            encryption_key: HPKEPublicKey::deserialize(buf)?,
            signature_key: SignaturePublicKey::deserialize(buf)?,
            credential: Credential::deserialize(buf)?,
            capabilities: Capabilities::deserialize(buf)?,
            leaf_node_source: deserialize_u8(buf)?.try_into()?,
            extensions: Extensions::deserialize(buf)?,
        })
    }
}

impl Serializer for LeafNodePayload {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.encryption_key.serialize(buf)?;
        self.signature_key.serialize(buf)?;
        self.credential.serialize(buf)?;
        self.capabilities.serialize(buf)?;
        buf.put_u8(self.leaf_node_source as u8);
        self.extensions.serialize(buf)
    }
}

/// [RFC9420 Sec.7.2](https://www.rfc-editor.org/rfc/rfc9420.html#section-7.2) A member's public
/// material in the tree, signed by the member
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LeafNode {
    pub(crate) payload: LeafNodePayload,
    pub(crate) signature: Bytes,
}

impl LeafNode {
    /// Signs `payload` for the given tree position
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        signature_key: &SignaturePrivateKey,
        payload: LeafNodePayload,
        tree_info: &TreeInfoTBS,
    ) -> Result<Self> {
        let tbs = Self::serialize_tbs(&payload, tree_info)?;
        let signature =
            crypto_provider.sign_with_label(cipher_suite, signature_key, LEAF_NODE_TBS_LABEL, &tbs)?;
        Ok(Self { payload, signature })
    }

    /// Checks the signature and that the source matches where the node is used
    pub(crate) fn verify(
        &self,
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        tree_info: &TreeInfoTBS,
    ) -> Result<()> {
        let source_matches = matches!(
            (self.payload.leaf_node_source, tree_info),
            (LeafNodeSource::KeyPackage, TreeInfoTBS::KeyPackage)
                | (
                    LeafNodeSource::Update | LeafNodeSource::Commit,
                    TreeInfoTBS::UpdateOrCommit(_)
                )
        );
        if !source_matches {
            return Err(Error::InvalidLeafNode("leaf node source does not match its use"));
        }
        if !self.payload.capabilities.cipher_suites.contains(&cipher_suite) {
            return Err(Error::InvalidLeafNode("cipher suite missing from capabilities"));
        }

        let tbs = Self::serialize_tbs(&self.payload, tree_info)?;
        crypto_provider.verify_with_label(
            cipher_suite,
            &self.payload.signature_key,
            LEAF_NODE_TBS_LABEL,
            &tbs,
            &self.signature,
        )
    }

    fn serialize_tbs(payload: &LeafNodePayload, tree_info: &TreeInfoTBS) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        payload.serialize(&mut buf)?;
        if let TreeInfoTBS::UpdateOrCommit(position) = tree_info {
            serialize_opaque_vec(&position.group_id, &mut buf)?;
            position.leaf_index.serialize(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    pub fn encryption_key(&self) -> &HPKEPublicKey {
        &self.payload.encryption_key
    }

    pub fn signature_key(&self) -> &SignaturePublicKey {
        &self.payload.signature_key
    }

    pub fn credential(&self) -> &Credential {
        &self.payload.credential
    }

    pub fn source(&self) -> LeafNodeSource {
        self.payload.leaf_node_source
    }
}

impl Deserializer for LeafNode {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let payload = LeafNodePayload::deserialize(buf)?;
        let signature = deserialize_opaque_vec(buf)?;
        Ok(Self { payload, signature })
    }
}

impl Serializer for LeafNode {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        self.payload.serialize(buf)?;
        serialize_opaque_vec(&self.signature, buf)
    }
}
