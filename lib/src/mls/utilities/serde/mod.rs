//! [RFC9420 Sec.2.1](https://www.rfc-editor.org/rfc/rfc9420.html#section-2.1) Presentation language:
//! variable-length integers, opaque vectors, vectors and optional values.


use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::mls::utilities::error::{Error, Result};

#[inline]
pub fn deserialize_varint<B: Buf>(buf: &mut B) -> Result<u32> {
    if !buf.has_remaining() {
        return Err(Error::BufferTooSmall);
    }
    let b = buf.get_u8();

    let prefix = b >> 6;
    if prefix == 3 {
        return Err(Error::InvalidVariableLengthIntegerPrefix);
    }

    let n = 1 << prefix;
    let mut v = u32::from(b & 0x3F);
    for _ in 0..n - 1 {
        if !buf.has_remaining() {
            return Err(Error::BufferTooSmall);
        }
        let b = buf.get_u8();
        v = (v << 8) + u32::from(b);
    }

    if prefix >= 1 && v < 1u32 << (8 * (n / 2) - 2) {
        return Err(Error::MinimumEncodingWasNotUsed);
    }

    Ok(v)
}

#[allow(clippy::cast_possible_truncation)] // truncation is intended here
#[inline]
pub fn serialize_varint<B: BufMut>(n: u32, buf: &mut B) -> Result<()> {
    if n < (1 << 6) {
        buf.put_u8(n as u8);
    } else if n < (1 << 14) {
        buf.put_u16(0b01 << 14 | (n as u16));
    } else if n < (1 << 30) {
        buf.put_u32(0b10 << 30 | n);
    } else {
        return Err(Error::VarintExceeds30Bits);
    }
    Ok(())
}

#[inline]
pub fn deserialize_opaque_vec<B: Buf>(buf: &mut B) -> Result<Bytes> {
    let n = deserialize_varint(buf)? as usize;
    if buf.remaining() < n {
        return Err(Error::BufferTooSmall);
    }

    Ok(buf.copy_to_bytes(n))
}

#[inline]
pub fn serialize_opaque_vec<B: BufMut>(v: &[u8], buf: &mut B) -> Result<()> {
    let len = u32::try_from(v.len()).map_err(|_| Error::OpaqueSizeExceedsMaximumValueOfU32)?;

    serialize_varint(len, buf)?;

    buf.put(v);

    Ok(())
}

#[inline]
pub fn deserialize_vector<B: Buf>(
    buf: &mut B,
    mut f: impl FnMut(&mut Bytes) -> Result<()>,
) -> Result<()> {
    let n = deserialize_varint(buf)? as usize;
    if buf.remaining() < n {
        return Err(Error::BufferTooSmall);
    }

    let mut v = buf.copy_to_bytes(n);
    let ss = &mut v;
    while ss.has_remaining() {
        f(ss)?;
    }
    Ok(())
}

#[inline]
pub fn serialize_vector<B: BufMut>(
    n: usize,
    buf: &mut B,
    mut f: impl FnMut(usize, &mut BytesMut) -> Result<()>,
) -> Result<()> {
    // We don't know the total size in advance, and the vector is prefixed with
    // a varint, so we can't avoid the temporary buffer here
    let mut child = BytesMut::new();
    for i in 0..n {
        f(i, &mut child)?;
    }

    let raw = child.freeze();

    serialize_opaque_vec(&raw, buf)
}

#[inline]
pub fn deserialize_u8<B: Buf>(buf: &mut B) -> Result<u8> {
    if buf.remaining() < 1 {
        return Err(Error::BufferTooSmall);
    }
    Ok(buf.get_u8())
}

#[inline]
pub fn deserialize_u16<B: Buf>(buf: &mut B) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(Error::BufferTooSmall);
    }
    Ok(buf.get_u16())
}

#[inline]
pub fn deserialize_u32<B: Buf>(buf: &mut B) -> Result<u32> {
    if buf.remaining() < 4 {
        return Err(Error::BufferTooSmall);
    }
    Ok(buf.get_u32())
}

#[inline]
pub fn deserialize_u64<B: Buf>(buf: &mut B) -> Result<u64> {
    if buf.remaining() < 8 {
        return Err(Error::BufferTooSmall);
    }
    Ok(buf.get_u64())
}

#[inline]
pub fn deserialize_optional<B: Buf>(buf: &mut B) -> Result<bool> {
    if !buf.has_remaining() {
        return Err(Error::BufferTooSmall);
    }
    let b = buf.get_u8();

    match b {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(Error::InvalidOptionalValue),
    }
}

#[inline]
pub fn serialize_optional<B: BufMut>(present: bool, buf: &mut B) -> Result<()> {
    let n: u8 = u8::from(present);
    buf.put_u8(n);
    Ok(())
}

pub trait Deserializer {
    fn deserialize<B>(buf: &mut B) -> Result<Self>
    where
        Self: Sized,
        B: Buf;

    /// Decodes a value that must span the whole input.
    fn deserialize_exact(buf: impl AsRef<[u8]>) -> Result<Self>
    where
        Self: Sized,
    {
        let mut buf = buf.as_ref();
        let value = Self::deserialize(&mut buf)?;
        if buf.has_remaining() {
            return Err(Error::TrailingBytes(buf.remaining()));
        }
        Ok(value)
    }
}

pub trait Serializer {
    fn serialize<B>(&self, buf: &mut B) -> Result<()>
    where
        Self: Sized,
        B: BufMut;

    fn serialize_detached(&self) -> Result<Bytes>
    where
        Self: Sized,
    {
        let mut buf = BytesMut::new();
        self.serialize(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// `optional<T>`: a presence flag followed by the value
pub fn deserialize_optional_value<B: Buf, T: Deserializer>(buf: &mut B) -> Result<Option<T>> {
    if deserialize_optional(buf)? {
        Ok(Some(T::deserialize(buf)?))
    } else {
        Ok(None)
    }
}

pub fn serialize_optional_value<B: BufMut, T: Serializer>(value: Option<&T>, buf: &mut B) -> Result<()> {
    serialize_optional(value.is_some(), buf)?;
    if let Some(value) = value {
        value.serialize(buf)?;
    }
    Ok(())
}
