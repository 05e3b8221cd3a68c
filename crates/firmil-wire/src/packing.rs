//! 7-bit integer and byte packing
//!
//! Every payload byte of a frame must have its high bit clear. Integers are
//! split into 7-bit groups, least significant first:
//!
//! ```text
//! u32   -> 5 bytes   v & 0x7F, (v >> 7) & 0x7F, ... (v >> 28) & 0x7F
//! int14 -> 2 bytes   v & 0x7F, (v >> 7) & 0x7F
//! byte  -> 2 bytes   b & 0x7F, b >> 7
//! bulk  -> 7-bit stream, 8 input bytes per 7 output groups (rounded up)
//! ```
//!
//! The 14-bit packing is a narrowing: the top two bits of a 16-bit value are
//! dropped on encode, so decoding yields `v & 0x3FFF`. Callers that need all
//! sixteen bits must use the 32-bit packing.

use crate::error::{WireError, WireResult};

/// Bytes of a packed u32
pub const U32_LEN: usize = 5;

/// Mask of the bits a 14-bit field preserves
pub const INT14_MASK: u16 = 0x3FFF;

/// Append a packed u32
pub fn put_u32(out: &mut Vec<u8>, value: u32) {
    for i in 0..U32_LEN {
        out.push(((value >> (7 * i)) & 0x7F) as u8);
    }
}

/// Append a packed i32 (two's complement bits)
#[inline]
pub fn put_i32(out: &mut Vec<u8>, value: i32) {
    put_u32(out, value as u32);
}

/// Append the low 14 bits of `value`
pub fn put_int14(out: &mut Vec<u8>, value: u16) {
    out.push((value & 0x7F) as u8);
    out.push(((value >> 7) & 0x7F) as u8);
}

/// Append each byte as two 7-bit bytes
pub fn put_two_7bit(out: &mut Vec<u8>, bytes: &[u8]) {
    for b in bytes {
        out.push(b & 0x7F);
        out.push(b >> 7);
    }
}

/// Bytes produced by [`encode_7bit`] for `len` input bytes
#[inline]
pub const fn encoded_7bit_len(len: usize) -> usize {
    (len * 8).div_ceil(7)
}

/// Pack arbitrary bytes into a 7-bit stream
pub fn encode_7bit(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_7bit_len(data.len()));
    let mut shift = 0u32;
    let mut carry = 0u8;
    for &b in data {
        if shift == 0 {
            out.push(b & 0x7F);
            carry = b >> 7;
            shift = 1;
        } else {
            out.push(((b << shift) & 0x7F) | carry);
            if shift == 6 {
                out.push(b >> 1);
                shift = 0;
            } else {
                carry = b >> (7 - shift);
                shift += 1;
            }
        }
    }
    if shift > 0 {
        out.push(carry);
    }
    out
}

/// Unpack `count` bytes from a 7-bit stream
pub fn decode_7bit(data: &[u8], count: usize) -> WireResult<Vec<u8>> {
    check_7bit(data)?;
    let needed = encoded_7bit_len(count);
    if data.len() < needed {
        return Err(WireError::Truncated {
            needed,
            actual: data.len(),
        });
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let bit = i * 8;
        let pos = bit / 7;
        let shift = (bit % 7) as u32;
        let low = u16::from(data[pos]) >> shift;
        let high = data.get(pos + 1).map_or(0, |b| u16::from(*b) << (7 - shift));
        out.push(((low | high) & 0xFF) as u8);
    }
    Ok(out)
}

/// Read a packed u32 at `at`
pub fn get_u32(data: &[u8], at: usize) -> WireResult<u32> {
    let bytes = slice(data, at, U32_LEN)?;
    check_7bit(bytes).map_err(|e| shift_offset(e, at))?;
    Ok(bytes
        .iter()
        .enumerate()
        .fold(0u32, |acc, (i, b)| acc | (u32::from(*b) << (7 * i))))
}

/// Read a packed i32 at `at`
#[inline]
pub fn get_i32(data: &[u8], at: usize) -> WireResult<i32> {
    get_u32(data, at).map(|v| v as i32)
}

/// Read a 14-bit value at `at`
pub fn get_int14(data: &[u8], at: usize) -> WireResult<u16> {
    let bytes = slice(data, at, 2)?;
    check_7bit(bytes).map_err(|e| shift_offset(e, at))?;
    Ok(u16::from(bytes[0]) | (u16::from(bytes[1]) << 7))
}

/// Reassemble bytes sent as two 7-bit bytes each; a trailing odd byte is ignored
pub fn get_two_7bit(data: &[u8]) -> WireResult<Vec<u8>> {
    check_7bit(data)?;
    Ok(data
        .chunks_exact(2)
        .map(|pair| pair[0] | (pair[1] << 7))
        .collect())
}

/// Reject any byte with the high bit set
pub fn check_7bit(data: &[u8]) -> WireResult<()> {
    match data.iter().position(|b| b & 0x80 != 0) {
        Some(offset) => Err(WireError::HighBitSet {
            offset,
            byte: data[offset],
        }),
        None => Ok(()),
    }
}

fn slice(data: &[u8], at: usize, len: usize) -> WireResult<&[u8]> {
    data.get(at..at + len).ok_or(WireError::Truncated {
        needed: at + len,
        actual: data.len(),
    })
}

fn shift_offset(err: WireError, at: usize) -> WireError {
    match err {
        WireError::HighBitSet { offset, byte } => WireError::HighBitSet {
            offset: offset + at,
            byte,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_u32_groups() {
        let mut out = Vec::new();
        put_u32(&mut out, 0x1234_5678);
        assert_eq!(out, vec![0x78, 0x2C, 0x51, 0x11, 0x01]);
        assert_eq!(get_u32(&out, 0).unwrap(), 0x1234_5678);
    }

    #[test]
    fn test_int14_drops_top_bits() {
        let mut out = Vec::new();
        put_int14(&mut out, 0xFFFF);
        assert_eq!(out, vec![0x7F, 0x7F]);
        assert_eq!(get_int14(&out, 0).unwrap(), 0x3FFF);
    }

    #[test]
    fn test_two_7bit_bytes() {
        let mut out = Vec::new();
        put_two_7bit(&mut out, &[0xFF, 0x01]);
        assert_eq!(out, vec![0x7F, 0x01, 0x01, 0x00]);
        assert_eq!(get_two_7bit(&out).unwrap(), vec![0xFF, 0x01]);
    }

    #[test]
    fn test_7bit_stream_length() {
        assert_eq!(encoded_7bit_len(0), 0);
        assert_eq!(encoded_7bit_len(1), 2);
        assert_eq!(encoded_7bit_len(7), 8);
        assert_eq!(encoded_7bit_len(8), 10);
        assert_eq!(encode_7bit(&[0xAA; 7]).len(), 8);
    }

    #[test]
    fn test_7bit_stream_known_bytes() {
        let encoded = encode_7bit(&[0xFF, 0x00, 0x80]);
        assert!(encoded.iter().all(|b| b & 0x80 == 0));
        assert_eq!(decode_7bit(&encoded, 3).unwrap(), vec![0xFF, 0x00, 0x80]);
    }

    #[test]
    fn test_high_bit_rejected() {
        let err = get_u32(&[0, 0, 0, 0, 0, 0x80, 0, 0, 0, 0], 5).unwrap_err();
        assert!(matches!(err, WireError::HighBitSet { offset: 5, byte: 0x80 }));
    }

    #[test]
    fn test_truncated_read() {
        let err = get_u32(&[1, 2, 3], 0).unwrap_err();
        assert!(matches!(err, WireError::Truncated { needed: 5, actual: 3 }));
    }
}
