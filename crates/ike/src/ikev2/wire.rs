//! Bounds-checked big-endian readers shared by the payload decoders, and
//! the field-width checks their encoders use

use crate::{Error, Result};

fn take<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = offset.checked_add(len).ok_or(Error::BufferTooShort {
        required: usize::MAX,
        available: data.len(),
    })?;
    if end > data.len() {
        return Err(Error::BufferTooShort {
            required: end,
            available: data.len(),
        });
    }
    let bytes = &data[*offset..end];
    *offset = end;
    Ok(bytes)
}

pub(crate) fn read_u8(data: &[u8], offset: &mut usize) -> Result<u8> {
    Ok(take(data, offset, 1)?[0])
}

pub(crate) fn read_u16(data: &[u8], offset: &mut usize) -> Result<u16> {
    let b = take(data, offset, 2)?;
    Ok(u16::from_be_bytes([b[0], b[1]]))
}

pub(crate) fn read_u32(data: &[u8], offset: &mut usize) -> Result<u32> {
    let b = take(data, offset, 4)?;
    Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_u64(data: &[u8], offset: &mut usize) -> Result<u64> {
    let b = take(data, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(u64::from_be_bytes(raw))
}

pub(crate) fn read_bytes<'a>(data: &'a [u8], offset: &mut usize, len: usize) -> Result<&'a [u8]> {
    take(data, offset, len)
}

/// Narrow a count or size to a one-byte wire field
pub(crate) fn u8_field(value: usize, field: &str) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| Error::InvalidParameter(format!("{} {} exceeds {}", field, value, u8::MAX)))
}

/// Narrow a count or length to a two-byte wire field
pub(crate) fn u16_field(value: usize, field: &str) -> Result<u16> {
    u16::try_from(value)
        .map_err(|_| Error::InvalidParameter(format!("{} {} exceeds {}", field, value, u16::MAX)))
}
