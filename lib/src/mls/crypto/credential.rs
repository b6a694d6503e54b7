//! [RFC9420 Sec.5.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-5.3) Credentials
//!
//! Only basic credentials exist here. Their identity is carried as opaque
//! bytes; whether to trust it is left to the application.

use bytes::{Buf, BufMut, Bytes};
use std::ops::Deref;

use crate::mls::utilities::{
    error::{Error, Result},
    serde::{deserialize_opaque_vec, deserialize_u16, serialize_opaque_vec, Deserializer, Serializer},
};

#[derive(Default, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CredentialType {
    #[default]
    Basic,
    Unknown(u16),
}

impl From<u16> for CredentialType {
    fn from(v: u16) -> Self {
        match v {
            0x0001 => CredentialType::Basic,
            _ => CredentialType::Unknown(v),
        }
    }
}

impl From<CredentialType> for u16 {
    fn from(val: CredentialType) -> u16 {
        match val {
            CredentialType::Basic => 0x0001,
            CredentialType::Unknown(v) => v,
        }
    }
}

/// Application-defined identity bytes
#[derive(Default, Debug, Clone, Eq, PartialEq, Hash)]
pub struct Identity(Bytes);

impl Deref for Identity {
    type Target = Bytes;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Credential {
    Basic(Identity),
}

impl Credential {
    pub fn basic<T: Into<Bytes>>(identity: T) -> Self {
        Self::Basic(Identity(identity.into()))
    }

    pub fn identity(&self) -> &Identity {
        match self {
            Credential::Basic(identity) => identity,
        }
    }

    pub fn credential_type(&self) -> CredentialType {
        match self {
            Credential::Basic(_) => CredentialType::Basic,
        }
    }
}

impl Deserializer for Credential {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        match CredentialType::from(deserialize_u16(buf)?) {
            CredentialType::Basic => Ok(Self::Basic(Identity(deserialize_opaque_vec(buf)?))),
            CredentialType::Unknown(_) => Err(Error::InvalidCredentialTypeValue),
        }
    }
}

impl Serializer for Credential {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(self.credential_type().into());
        serialize_opaque_vec(self.identity(), buf)
    }
}
