use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::framing::proposal::ProposalOrRef;
use crate::mls::ratchet_tree::UpdatePath;
use crate::mls::utilities::error::Result;
use crate::mls::utilities::serde::{
    deserialize_optional_value, deserialize_vector, serialize_optional_value, serialize_vector,
    Deserializer, Serializer,
};

/// [RFC9420 Sec.12.4](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4) The proposals
/// to apply, in order, and the committer's fresh path
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    pub(crate) proposals: Vec<ProposalOrRef>,
    pub(crate) path: Option<UpdatePath>,
}

impl Commit {
    pub fn proposals(&self) -> &[ProposalOrRef] {
        &self.proposals
    }

    pub fn path(&self) -> Option<&UpdatePath> {
        self.path.as_ref()
    }
}

impl Deserializer for Commit {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut proposals = vec![];
        deserialize_vector(buf, |b: &mut Bytes| -> Result<()> {
            proposals.push(ProposalOrRef::deserialize(b)?);
            Ok(())
        })?;

        Ok(Self {
            proposals,
            path: deserialize_optional_value(buf)?,
        })
    }
}

impl Serializer for Commit {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(
            self.proposals.len(),
            buf,
            |i: usize, b: &mut BytesMut| -> Result<()> { self.proposals[i].serialize(b) },
        )?;
        serialize_optional_value(self.path.as_ref(), buf)
    }
}
