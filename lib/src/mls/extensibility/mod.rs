//! [RFC9420 Sec.13](https://www.rfc-editor.org/rfc/rfc9420.html#section-13) Extensibility

use bytes::{Buf, BufMut, Bytes};

use crate::mls::{
    ratchet_tree::RatchetTree,
    utilities::{
        error::Result,
        serde::{
            deserialize_opaque_vec, deserialize_u16, deserialize_vector, serialize_opaque_vec,
            serialize_vector, Deserializer, Serializer,
        },
    },
};

pub mod list;

/// [RFC9420 Sec.17.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-17.3) MLS Extension Types
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum ExtensionType {
    ApplicationId = 0x0001,
    RatchetTree = 0x0002,
    RequiredCapabilities = 0x0003,
    ExternalPub = 0x0004,
    ExternalSenders = 0x0005,
    Unknown(u16),
}

impl From<u16> for ExtensionType {
    fn from(v: u16) -> Self {
        match v {
            0x0001 => ExtensionType::ApplicationId,
            0x0002 => ExtensionType::RatchetTree,
            0x0003 => ExtensionType::RequiredCapabilities,
            0x0004 => ExtensionType::ExternalPub,
            0x0005 => ExtensionType::ExternalSenders,
            _ => ExtensionType::Unknown(v),
        }
    }
}

impl From<ExtensionType> for u16 {
    fn from(val: ExtensionType) -> u16 {
        match val {
            ExtensionType::ApplicationId => 0x0001,
            ExtensionType::RatchetTree => 0x0002,
            ExtensionType::RequiredCapabilities => 0x0003,
            ExtensionType::ExternalPub => 0x0004,
            ExtensionType::ExternalSenders => 0x0005,
            ExtensionType::Unknown(v) => v,
        }
    }
}

/// An extension in its serialized form
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub extension_data: Bytes,
}

impl Deserializer for Extension {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let extension_type = deserialize_u16(buf)?.into();
        let extension_data = deserialize_opaque_vec(buf)?;
        Ok(Self {
            extension_type,
            extension_data,
        })
    }
}

impl Serializer for Extension {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        buf.put_u16(self.extension_type.into());
        serialize_opaque_vec(&self.extension_data, buf)
    }
}

#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct Extensions(pub(crate) Vec<Extension>);

impl Extensions {
    pub fn new(extensions: Vec<Extension>) -> Self {
        Self(extensions)
    }

    pub fn extensions(&self) -> &[Extension] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn find_extension_data(&self, extension_type: ExtensionType) -> Option<&Bytes> {
        self.0
            .iter()
            .find(|ext| ext.extension_type == extension_type)
            .map(|ext| &ext.extension_data)
    }
}

impl Deserializer for Extensions {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        let mut extensions = vec![];
        deserialize_vector(buf, |b| {
            extensions.push(Extension::deserialize(b)?);
            Ok(())
        })?;
        Ok(Self(extensions))
    }
}

impl Serializer for Extensions {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut,
    {
        serialize_vector(self.0.len(), buf, |i, b| self.0[i].serialize(b))
    }
}

/// [RFC9420 Sec.12.1.8.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.1.8.1) Application
/// identifier of a member or group
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ApplicationIdExtension(pub(crate) Bytes);

impl ApplicationIdExtension {
    pub fn new<T: Into<Bytes>>(application_id: T) -> Self {
        Self(application_id.into())
    }

    pub fn application_id(&self) -> &Bytes {
        &self.0
    }
}

/// [RFC9420 Sec.12.4.3.3](https://www.rfc-editor.org/rfc/rfc9420.html#section-12.4.3.3) Full tree
/// snapshot carried in a `GroupInfo` so joiners can bootstrap without history
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RatchetTreeExtension {
    pub(crate) ratchet_tree: RatchetTree,
}

impl RatchetTreeExtension {
    pub fn new(ratchet_tree: RatchetTree) -> Self {
        Self { ratchet_tree }
    }
}
