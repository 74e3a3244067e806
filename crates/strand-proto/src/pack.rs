//! Packing and unpacking helpers for parameter data.
//!
//! Parameter data is big-endian on the wire. Unpack helpers validate the
//! exact length a field layout requires and convert failures into
//! [`NackReason`] values so handlers can answer with the right status.

use crate::param::NackReason;

/// Maximum length of a textual label.
pub const LABEL_MAX_LEN: usize = 32;

pub fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_be_bytes());
}

pub fn put_i16(buf: &mut Vec<u8>, value: i16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

/// Appends a label truncated to [`LABEL_MAX_LEN`] bytes.
pub fn put_label(buf: &mut Vec<u8>, label: &str) {
    let bytes = label.as_bytes();
    let len = bytes.len().min(LABEL_MAX_LEN);
    buf.extend_from_slice(&bytes[..len]);
}

/// Requires empty parameter data (the common case for GETs).
pub fn expect_empty(data: &[u8]) -> Result<(), NackReason> {
    if data.is_empty() {
        Ok(())
    } else {
        Err(NackReason::FormatError)
    }
}

/// Unpacks parameter data that is exactly one byte.
pub fn take_u8(data: &[u8]) -> Result<u8, NackReason> {
    match data {
        [value] => Ok(*value),
        _ => Err(NackReason::FormatError),
    }
}

/// Unpacks parameter data that is exactly one big-endian u16.
pub fn take_u16(data: &[u8]) -> Result<u16, NackReason> {
    match data {
        [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(NackReason::FormatError),
    }
}

/// Unpacks parameter data that is exactly one big-endian u32.
pub fn take_u32(data: &[u8]) -> Result<u32, NackReason> {
    let bytes: [u8; 4] = data.try_into().map_err(|_| NackReason::FormatError)?;
    Ok(u32::from_be_bytes(bytes))
}

/// Unpacks a boolean: one byte, 0 or 1.
///
/// A wrong length is a format error; any other value is out of range.
pub fn take_bool(data: &[u8]) -> Result<bool, NackReason> {
    match take_u8(data)? {
        0 => Ok(false),
        1 => Ok(true),
        _ => Err(NackReason::DataOutOfRange),
    }
}

/// Unpacks a label of at most [`LABEL_MAX_LEN`] bytes.
///
/// Trailing NUL padding is stripped; non-UTF-8 bytes are replaced.
pub fn take_label(data: &[u8]) -> Result<String, NackReason> {
    if data.len() > LABEL_MAX_LEN {
        return Err(NackReason::FormatError);
    }
    let trimmed = match data.iter().position(|&b| b == 0) {
        Some(end) => &data[..end],
        None => data,
    };
    Ok(String::from_utf8_lossy(trimmed).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_u16_needs_exact_length() {
        assert_eq!(take_u16(&[0x01, 0x02]), Ok(0x0102));
        assert_eq!(take_u16(&[0x01]), Err(NackReason::FormatError));
        assert_eq!(take_u16(&[0, 1, 2]), Err(NackReason::FormatError));
    }

    #[test]
    fn take_bool_distinguishes_format_and_range() {
        assert_eq!(take_bool(&[0]), Ok(false));
        assert_eq!(take_bool(&[1]), Ok(true));
        assert_eq!(take_bool(&[2]), Err(NackReason::DataOutOfRange));
        assert_eq!(take_bool(&[]), Err(NackReason::FormatError));
    }

    #[test]
    fn labels_are_truncated_and_nul_stripped() {
        let mut buf = Vec::new();
        put_label(&mut buf, &"x".repeat(40));
        assert_eq!(buf.len(), LABEL_MAX_LEN);

        assert_eq!(take_label(b"strip\0\0\0").unwrap(), "strip");
        assert!(take_label(&[0u8; 33]).is_err());
    }
}
