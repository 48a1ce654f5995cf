//! UTF-16 and BOM normalization
//!
//! Visual Studio happily saves sources and resource scripts as UTF-16 with a
//! byte-order mark; GCC and windres do not read them. Everything source-like
//! ends up as BOM-less UTF-8 with `\n` line endings.

use super::{Change, TransformError, TransformRule, TreeContext};
use crate::util::paths;
use std::fs;
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const UTF16_LE_BOM: &[u8] = &[0xFF, 0xFE];
const UTF16_BE_BOM: &[u8] = &[0xFE, 0xFF];

pub struct EncodingRule;

impl TransformRule for EncodingRule {
    fn name(&self) -> &'static str {
        "encoding"
    }

    fn matches(&self, path: &Path) -> bool {
        paths::is_source_like(path)
    }

    fn apply(&self, path: &Path, _ctx: &mut TreeContext) -> Result<Change, TransformError> {
        let bytes = fs::read(path).map_err(|e| TransformError::new(self.name(), path, e))?;
        let normalized =
            normalize_encoding(&bytes).map_err(|cause| TransformError::new(self.name(), path, cause))?;

        match normalized {
            Some(out) => {
                fs::write(path, out).map_err(|e| TransformError::new(self.name(), path, e))?;
                Ok(Change::Rewritten)
            }
            None => Ok(Change::Unchanged),
        }
    }
}

/// Returns the normalized bytes, or `None` when the input is already normalized
pub fn normalize_encoding(bytes: &[u8]) -> Result<Option<Vec<u8>>, String> {
    let decoded: Vec<u8> = if let Some(rest) = bytes.strip_prefix(UTF16_LE_BOM) {
        decode_utf16(rest, u16::from_le_bytes)?.into_bytes()
    } else if let Some(rest) = bytes.strip_prefix(UTF16_BE_BOM) {
        decode_utf16(rest, u16::from_be_bytes)?.into_bytes()
    } else if let Some(rest) = bytes.strip_prefix(UTF8_BOM) {
        rest.to_vec()
    } else {
        bytes.to_vec()
    };

    let normalized = normalize_line_endings(&decoded);
    if normalized == bytes {
        Ok(None)
    } else {
        Ok(Some(normalized))
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> Result<String, String> {
    if bytes.len() % 2 != 0 {
        return Err(format!(
            "UTF-16 payload has odd length ({} bytes)",
            bytes.len()
        ));
    }

    let units = bytes.chunks_exact(2).map(|pair| to_unit([pair[0], pair[1]]));
    Ok(char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

fn normalize_line_endings(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' {
            if iter.peek() == Some(&&b'\n') {
                iter.next();
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16le(text: &str) -> Vec<u8> {
        let mut out = UTF16_LE_BOM.to_vec();
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out
    }

    #[test]
    fn test_utf16le_to_utf8() {
        let input = utf16le("#include \"res.h\"\r\nIDI_ICON1 ICON \"app.ico\"\r\n");
        let out = normalize_encoding(&input).unwrap().unwrap();
        assert_eq!(out, b"#include \"res.h\"\nIDI_ICON1 ICON \"app.ico\"\n".to_vec());
    }

    #[test]
    fn test_utf16be_to_utf8() {
        let mut input = UTF16_BE_BOM.to_vec();
        for unit in "int x;".encode_utf16() {
            input.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(normalize_encoding(&input).unwrap().unwrap(), b"int x;".to_vec());
    }

    #[test]
    fn test_strip_utf8_bom() {
        let input = [UTF8_BOM, b"int main() {}\n"].concat();
        assert_eq!(
            normalize_encoding(&input).unwrap().unwrap(),
            b"int main() {}\n".to_vec()
        );
    }

    #[test]
    fn test_lone_carriage_return() {
        assert_eq!(
            normalize_encoding(b"a\rb\r\nc").unwrap().unwrap(),
            b"a\nb\nc".to_vec()
        );
    }

    #[test]
    fn test_already_normalized_is_noop() {
        assert_eq!(normalize_encoding(b"int x;\n").unwrap(), None);
        let once = normalize_encoding(&utf16le("a\r\nb")).unwrap().unwrap();
        assert_eq!(normalize_encoding(&once).unwrap(), None);
    }

    #[test]
    fn test_odd_utf16_payload_is_error() {
        let input = [UTF16_LE_BOM, &[0x41]].concat();
        assert!(normalize_encoding(&input).is_err());
    }

    #[test]
    fn test_latin1_bytes_preserved() {
        assert_eq!(normalize_encoding(b"/* caf\xe9 */\n").unwrap(), None);
    }
}
