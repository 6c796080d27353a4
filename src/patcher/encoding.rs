//! Byte-level encoding of task definition files.
//!
//! `schtasks.exe` writes task XML as UTF-16LE with a byte-order mark. The
//! file is decoded to a `String` for editing and re-encoded exactly as it
//! came in (same encoding, BOM kept or omitted).

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf16Le,
    Utf16Be,
    Utf8,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{0:?} text has an odd number of bytes")]
    OddLength(TextEncoding),
    #[error("invalid {0:?} text")]
    Invalid(TextEncoding),
}

/// A decoded file plus what is needed to write it back identically.
#[derive(Debug)]
pub struct DecodedText {
    /// File contents without the byte-order mark.
    pub text: String,
    pub encoding: TextEncoding,
    pub bom: bool,
}

const BOM_UTF16LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16BE: &[u8] = &[0xFE, 0xFF];
const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decodes a task file, detecting the encoding from its BOM.
///
/// Without a BOM the encoding is sniffed from where the NUL bytes of the
/// first (ASCII) character sit; an empty file counts as UTF-16LE.
pub fn decode(bytes: &[u8]) -> Result<DecodedText, DecodeError> {
    let (encoding, bom, body) = if let Some(body) = bytes.strip_prefix(BOM_UTF16LE) {
        (TextEncoding::Utf16Le, true, body)
    } else if let Some(body) = bytes.strip_prefix(BOM_UTF16BE) {
        (TextEncoding::Utf16Be, true, body)
    } else if let Some(body) = bytes.strip_prefix(BOM_UTF8) {
        (TextEncoding::Utf8, true, body)
    } else {
        (sniff(bytes), false, bytes)
    };

    let text = match encoding {
        TextEncoding::Utf8 => String::from_utf8(body.to_vec())
            .map_err(|_| DecodeError::Invalid(encoding))?,
        TextEncoding::Utf16Le | TextEncoding::Utf16Be => {
            if body.len() % 2 != 0 {
                return Err(DecodeError::OddLength(encoding));
            }
            let units: Vec<u16> = body
                .chunks_exact(2)
                .map(|pair| match encoding {
                    TextEncoding::Utf16Be => u16::from_be_bytes([pair[0], pair[1]]),
                    _ => u16::from_le_bytes([pair[0], pair[1]]),
                })
                .collect();
            String::from_utf16(&units).map_err(|_| DecodeError::Invalid(encoding))?
        }
    };

    Ok(DecodedText {
        text,
        encoding,
        bom,
    })
}

/// Encodes `text` for writing, prefixing the BOM when `bom` is set.
pub fn encode(text: &str, encoding: TextEncoding, bom: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() * 2 + 3);
    match encoding {
        TextEncoding::Utf8 => {
            if bom {
                out.extend_from_slice(BOM_UTF8);
            }
            out.extend_from_slice(text.as_bytes());
        }
        TextEncoding::Utf16Le => {
            if bom {
                out.extend_from_slice(BOM_UTF16LE);
            }
            out.extend(text.encode_utf16().flat_map(u16::to_le_bytes));
        }
        TextEncoding::Utf16Be => {
            if bom {
                out.extend_from_slice(BOM_UTF16BE);
            }
            out.extend(text.encode_utf16().flat_map(u16::to_be_bytes));
        }
    }
    out
}

fn sniff(bytes: &[u8]) -> TextEncoding {
    match bytes {
        [] => TextEncoding::Utf16Le,
        [lo, 0, ..] if *lo != 0 => TextEncoding::Utf16Le,
        [0, hi, ..] if *hi != 0 => TextEncoding::Utf16Be,
        _ => TextEncoding::Utf8,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
