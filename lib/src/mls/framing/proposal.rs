//! [RFC9420 Sec.12.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.1) Proposals

use bytes::{Buf, BufMut, Bytes};
use std::ops::Deref;

use crate::mls::crypto::{cipher_suite::CipherSuite, provider::CryptoProvider};
use crate::mls::key_package::KeyPackage;
use crate::mls::ratchet_tree::LeafNode;
use crate::mls::utilities::error::{Error, Result};
use crate::mls::utilities::serde::{
    deserialize_opaque_vec, deserialize_u16, deserialize_u8, serialize_opaque_vec, Deserializer,
    Serializer,
};
use crate::mls::utilities::tree_math::LeafIndex;

const PROPOSAL_REF_LABEL: &[u8] = b"MLS 1.0 Proposal Reference";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ProposalType {
    Add,
    Update,
    Remove,
    PreSharedKey,
    Unknown(u16),
}

impl From<u16> for ProposalType {
    fn from(v: u16) -> Self {
        match v {
            0x0001 => ProposalType::Add,
            0x0002 => ProposalType::Update,
            0x0003 => ProposalType::Remove,
            0x0004 => ProposalType::PreSharedKey,
            _ => ProposalType::Unknown(v),
        }
    }
}

impl From<ProposalType> for u16 {
    fn from(val: ProposalType) -> u16 {
        match val {
            ProposalType::Add => 0x0001,
            ProposalType::Update => 0x0002,
            ProposalType::Remove => 0x0003,
            ProposalType::PreSharedKey => 0x0004,
            ProposalType::Unknown(v) => v,
        }
    }
}

/// Request to add the member described by `key_package`
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AddProposal {
    pub key_package: KeyPackage,
}

/// Request from a member to replace its own leaf
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UpdateProposal {
    pub leaf_node: LeafNode,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RemoveProposal {
    pub removed: LeafIndex,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Proposal {
    Add(AddProposal),
    Update(UpdateProposal),
    Remove(RemoveProposal),
}

impl Proposal {
    pub fn proposal_type(&self) -> ProposalType {
        match self {
            Proposal::Add(_) => ProposalType::Add,
            Proposal::Update(_) => ProposalType::Update,
            Proposal::Remove(_) => ProposalType::Remove,
        }
    }
}

impl Deserializer for Proposal {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let proposal_type = deserialize_u16(buf)?;
        match ProposalType::from(proposal_type) {
            ProposalType::Add => Ok(Proposal::Add(AddProposal {
                key_package: KeyPackage::deserialize(buf)?,
            })),
            ProposalType::Update => Ok(Proposal::Update(UpdateProposal {
                leaf_node: LeafNode::deserialize(buf)?,
            })),
            ProposalType::Remove => Ok(Proposal::Remove(RemoveProposal {
                removed: LeafIndex::deserialize(buf)?,
            })),
            ProposalType::PreSharedKey => Err(Error::PskNotSupported),
            ProposalType::Unknown(v) => Err(Error::InvalidProposalType(v)),
        }
    }
}

impl Serializer for Proposal {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(self.proposal_type().into());
        match self {
            Proposal::Add(add) => add.key_package.serialize(buf),
            Proposal::Update(update) => update.leaf_node.serialize(buf),
            Proposal::Remove(remove) => remove.removed.serialize(buf),
        }
    }
}

/// Hash of the authenticated content that carried a proposal
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ProposalRef(Bytes);

impl ProposalRef {
    pub(crate) fn new(
        crypto_provider: &impl CryptoProvider,
        cipher_suite: CipherSuite,
        authenticated_content: &[u8],
    ) -> Result<Self> {
        Ok(Self(crypto_provider.ref_hash(
            cipher_suite,
            PROPOSAL_REF_LABEL,
            authenticated_content,
        )?))
    }
}

impl Deref for ProposalRef {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Deserializer for ProposalRef {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        Ok(Self(deserialize_opaque_vec(buf)?))
    }
}

impl Serializer for ProposalRef {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_opaque_vec(&self.0, buf)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
enum ProposalOrRefType {
    Proposal = 1,
    Reference = 2,
}

impl TryFrom<u8> for ProposalOrRefType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(ProposalOrRefType::Proposal),
            2 => Ok(ProposalOrRefType::Reference),
            _ => Err(Error::InvalidProposalOrRefType(v)),
        }
    }
}

/// A commit lists proposals either inline or by reference to a proposal
/// message sent earlier in the epoch
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ProposalOrRef {
    Proposal(Proposal),
    Reference(ProposalRef),
}

impl Deserializer for ProposalOrRef {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match ProposalOrRefType::try_from(deserialize_u8(buf)?)? {
            ProposalOrRefType::Proposal => Ok(ProposalOrRef::Proposal(Proposal::deserialize(buf)?)),
            ProposalOrRefType::Reference => {
                Ok(ProposalOrRef::Reference(ProposalRef::deserialize(buf)?))
            }
        }
    }
}

impl Serializer for ProposalOrRef {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        match self {
            ProposalOrRef::Proposal(proposal) => {
                buf.put_u8(ProposalOrRefType::Proposal as u8);
                proposal.serialize(buf)
            }
            ProposalOrRef::Reference(reference) => {
                buf.put_u8(ProposalOrRefType::Reference as u8);
                reference.serialize(buf)
            }
        }
    }
}
