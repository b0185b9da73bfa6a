//! Document text decoding.
//!
//! Buffers are always UTF-8 in memory. Files are decoded defensively on
//! open: a UTF-8 BOM is stripped, valid UTF-8 passes through, and anything
//! else is treated as Windows-1252 so legacy files load without mangling.
//! Saving always writes the buffer's UTF-8 bytes verbatim.

use std::path::Path;

/// Decode raw file bytes into editor text.
pub fn decode_document(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Read and decode a document file.
pub fn read_document(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_document(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        assert_eq!(decode_document(b"<rml>ok</rml>"), "<rml>ok</rml>");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        assert_eq!(decode_document(b"\xEF\xBB\xBFhello"), "hello");
    }

    #[test]
    fn test_windows_1252_fallback() {
        // 0xE9 is 'é' in Windows-1252 and invalid as a UTF-8 lead byte.
        assert_eq!(decode_document(b"caf\xE9"), "café");
    }

    #[test]
    fn test_read_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.rml");
        std::fs::write(&path, b"\xEF\xBB\xBF<body/>").unwrap();
        assert_eq!(read_document(&path).unwrap(), "<body/>");
    }
}
