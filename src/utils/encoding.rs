//! Binary primitives for bundle fragments.
//!
//! Every binary fragment is framed as:
//!
//! ```text
//! +--------+-------------+------+----------+---------+----------------+
//! | "SFDX" | version u16 | kind | reserved | payload | crc32 u32 (LE) |
//! +--------+-------------+------+----------+---------+----------------+
//! ```
//!
//! The CRC covers header and payload. Payload integers are LEB128 varints,
//! strings are a varint length followed by UTF-8 bytes.

use crate::error::{Result, SitefindError};

/// Magic bytes opening every binary fragment
pub const FRAGMENT_MAGIC: &[u8; 4] = b"SFDX";

/// Current binary format version
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 4;

/// Kind byte stored in a fragment header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FragmentKind {
    Meta = 1,
    Index = 2,
    Filter = 3,
    Sort = 4,
}

impl FragmentKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(FragmentKind::Meta),
            2 => Some(FragmentKind::Index),
            3 => Some(FragmentKind::Filter),
            4 => Some(FragmentKind::Sort),
            _ => None,
        }
    }
}

/// Encode a u32 as a variable-length integer
pub fn encode_varint(mut value: u32, buf: &mut Vec<u8>) {
    loop {
        if value < 0x80 {
            buf.push(value as u8);
            break;
        }
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
}

/// Decode a variable-length integer from a slice
/// Returns (value, bytes_consumed)
pub fn decode_varint(buf: &[u8]) -> Option<(u32, usize)> {
    let mut result: u32 = 0;
    let mut shift = 0;

    for (i, &byte) in buf.iter().enumerate() {
        if shift >= 32 {
            return None; // Overflow
        }

        result |= ((byte & 0x7F) as u32) << shift;

        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }

        shift += 7;
    }

    None // Incomplete
}

/// Delta-encode a sorted list of u32s, prefixed with its length
pub fn delta_encode(values: &[u32], buf: &mut Vec<u8>) {
    encode_varint(values.len() as u32, buf);
    let mut prev = 0u32;
    for &value in values {
        encode_varint(value - prev, buf);
        prev = value;
    }
}

/// Encode a length-prefixed UTF-8 string
pub fn encode_str(value: &str, buf: &mut Vec<u8>) {
    encode_varint(value.len() as u32, buf);
    buf.extend_from_slice(value.as_bytes());
}

/// Wrap a payload in the fragment header and checksum trailer
pub fn seal_fragment(kind: FragmentKind, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + TRAILER_LEN);
    out.extend_from_slice(FRAGMENT_MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(kind as u8);
    out.push(0);
    out.extend_from_slice(payload);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}

/// Validate a fragment's framing and return its payload
pub fn open_fragment(bytes: &[u8], expected: FragmentKind) -> Result<&[u8]> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err(SitefindError::corrupt("fragment is shorter than its header"));
    }
    if &bytes[..4] != FRAGMENT_MAGIC {
        return Err(SitefindError::corrupt("bad fragment magic"));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(SitefindError::corrupt(format!(
            "unsupported format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }
    match FragmentKind::from_byte(bytes[6]) {
        Some(kind) if kind == expected => {}
        other => {
            return Err(SitefindError::corrupt(format!(
                "expected {:?} fragment, found {:?}",
                expected, other
            )));
        }
    }

    let body_end = bytes.len() - TRAILER_LEN;
    let mut stored = [0u8; 4];
    stored.copy_from_slice(&bytes[body_end..]);
    if crc32fast::hash(&bytes[..body_end]) != u32::from_le_bytes(stored) {
        return Err(SitefindError::corrupt("fragment checksum mismatch"));
    }

    Ok(&bytes[HEADER_LEN..body_end])
}

/// Cursor over a fragment payload
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub fn varint(&mut self) -> Result<u32> {
        let (value, consumed) = decode_varint(&self.buf[self.pos..])
            .ok_or_else(|| SitefindError::corrupt("truncated varint"))?;
        self.pos += consumed;
        Ok(value)
    }

    pub fn str(&mut self) -> Result<&'a str> {
        let len = self.varint()? as usize;
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| SitefindError::corrupt("truncated string"))?;
        let value = std::str::from_utf8(&self.buf[self.pos..end])
            .map_err(|_| SitefindError::corrupt("string is not UTF-8"))?;
        self.pos = end;
        Ok(value)
    }

    /// Read a list written by [`delta_encode`]
    pub fn delta_list(&mut self) -> Result<Vec<u32>> {
        let count = self.varint()? as usize;
        let mut values = Vec::with_capacity(count.min(self.buf.len()));
        let mut prev = 0u32;
        for _ in 0..count {
            prev = prev
                .checked_add(self.varint()?)
                .ok_or_else(|| SitefindError::corrupt("delta list overflows"))?;
            values.push(prev);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_boundaries() {
        let values = [0, 1, 127, 128, 16383, 16384, u32::MAX];
        for value in values {
            let mut buf = Vec::new();
            encode_varint(value, &mut buf);
            let (decoded, consumed) = decode_varint(&buf).unwrap();
            assert_eq!(value, decoded);
            assert_eq!(consumed, buf.len());
        }
        assert!(decode_varint(&[0x80, 0x80]).is_none());
    }

    #[test]
    fn test_payload_reader() {
        let mut buf = Vec::new();
        encode_str("team", &mut buf);
        delta_encode(&[1, 5, 10, 1000], &mut buf);
        encode_varint(7, &mut buf);

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.str().unwrap(), "team");
        assert_eq!(reader.delta_list().unwrap(), vec![1, 5, 10, 1000]);
        assert_eq!(reader.varint().unwrap(), 7);
        assert!(reader.is_empty());
        assert!(reader.varint().is_err());
    }

    #[test]
    fn test_fragment_framing() {
        let sealed = seal_fragment(FragmentKind::Filter, b"payload");
        assert_eq!(&sealed[..4], FRAGMENT_MAGIC);
        assert_eq!(open_fragment(&sealed, FragmentKind::Filter).unwrap(), b"payload");

        // Wrong kind
        assert!(open_fragment(&sealed, FragmentKind::Sort).is_err());

        // Flipped payload byte breaks the checksum
        let mut damaged = sealed.clone();
        damaged[9] ^= 0xFF;
        assert!(open_fragment(&damaged, FragmentKind::Filter).is_err());

        // Future version
        let mut future = sealed;
        future[4] = 2;
        assert!(matches!(
            open_fragment(&future, FragmentKind::Filter),
            Err(SitefindError::Corrupt(_))
        ));
    }
}
