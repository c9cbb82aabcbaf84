//! Percent-escape codec
//!
//! Arbitrary bytes travel inside text lines as `%XX` escapes (two upper
//! hex digits). The mandatory escape set is `%`, CR, LF and NUL; callers
//! may extend it with application-reserved bytes.
//!
//! Encoding is total. Decoding is partial: a trailing `%`, or a `%`
//! followed by non-hex digits, fails with the byte offset of the bad
//! escape so the peer's line can be rejected precisely.

use crate::error::{AssuanError, Result};

/// True if `byte` must be escaped given the extra set
#[inline]
pub fn needs_escape(byte: u8, extra: &[u8]) -> bool {
    matches!(byte, b'%' | b'\r' | b'\n' | 0x00) || extra.contains(&byte)
}

/// Append `byte` to `out`, escaping it if required
#[inline]
pub(crate) fn push_escaped(out: &mut Vec<u8>, byte: u8, extra: &[u8]) {
    if needs_escape(byte, extra) {
        const HEX: &[u8; 16] = b"0123456789ABCDEF";
        out.push(b'%');
        out.push(HEX[(byte >> 4) as usize]);
        out.push(HEX[(byte & 0x0F) as usize]);
    } else {
        out.push(byte);
    }
}

/// Percent-encode `data` using the mandatory escape set plus `extra`
pub fn encode(data: &[u8], extra: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &byte in data {
        push_escaped(&mut out, byte, extra);
    }
    out
}

/// Decode all `%XX` escapes in `data`
///
/// Any byte other than `%` passes through untouched, so decoding is
/// independent of the encoder's escape set.
pub fn decode(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let byte = data[i];
        if byte == b'%' {
            // a trailing '%' or '%X' falls through get() as None
            let hi = hex_value(data.get(i + 1).copied()).ok_or(AssuanError::Encoding { offset: i })?;
            let lo = hex_value(data.get(i + 2).copied()).ok_or(AssuanError::Encoding { offset: i })?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(byte);
            i += 1;
        }
    }
    Ok(out)
}

#[inline]
fn hex_value(byte: Option<u8>) -> Option<u8> {
    match byte? {
        b @ b'0'..=b'9' => Some(b - b'0'),
        b @ b'a'..=b'f' => Some(b - b'a' + 10),
        b @ b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
