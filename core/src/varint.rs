use std::io::Write;

use crate::error::{PbtError, Result};

pub(crate) fn varint_len(mut value: u64) -> usize {
    let mut len = 0;
    while value >= 0x80 {
        len += 1;
        value >>= 7;
    }
    len + 1
}

pub(crate) fn encode_varint(mut value: u64, stream: &mut impl Write) -> Result<usize> {
    let mut bytes_written = 0;
    while value >= 0x80 {
        stream.write_all(&[((value & 0x7F) | 0x80) as u8])?;
        bytes_written += 1;
        value >>= 7;
    }
    stream.write_all(&[value as u8])?;
    bytes_written += 1;
    Ok(bytes_written)
}

/// Decodes a varint from the front of `bytes`, returning `(value, bytes_read)`.
pub(crate) fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;
        value |= ((byte & 0x7F) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok((value, bytes_read));
        }

        shift += 7;
        if shift >= 64 {
            return Err(PbtError::corrupt("varint too large"));
        }
    }
    Err(PbtError::corrupt("varint not terminated"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        for value in [0u64, 1, 127, 128, 300, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buffer = Vec::new();
            let written = encode_varint(value, &mut buffer).unwrap();
            assert_eq!(written, buffer.len());
            assert_eq!(written, varint_len(value));

            let (decoded, read) = decode_varint(&buffer).unwrap();
            assert_eq!(decoded, value);
            assert_eq!(read, written);
        }
    }

    #[test]
    fn test_varint_truncated() {
        let err = decode_varint(&[0x80, 0x80]).unwrap_err();
        assert!(matches!(err, PbtError::CorruptFormat(_)));
        assert!(decode_varint(&[]).is_err());
    }
}
