//! Base64 handling for image payloads.
//!
//! Raw image buffers are written as-is. Base64 only reaches the disk on the
//! text fallback tier, and the encoded form is checked there so a bad
//! payload surfaces as [`StoreError::Encoding`] rather than as an
//! unreadable file later.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{StoreError, StoreResult};

/// Rejects an image buffer that cannot be stored.
pub fn check_image(bytes: &[u8]) -> StoreResult<()> {
    if bytes.is_empty() {
        return Err(StoreError::Encoding("image buffer is empty".to_string()));
    }
    Ok(())
}

/// Encodes an image buffer for the text tier and checks the encoded form.
pub fn encode_image(bytes: &[u8]) -> StoreResult<String> {
    check_image(bytes)?;
    let encoded = STANDARD.encode(bytes);
    check_base64_shape(&encoded)?;
    Ok(encoded)
}

/// Checks charset, padding placement and length, then decodes.
pub fn decode_base64(text: &str) -> StoreResult<Vec<u8>> {
    let trimmed = text.trim();
    check_base64_shape(trimmed)?;
    STANDARD
        .decode(trimmed)
        .map_err(|e| StoreError::Encoding(format!("undecodable base64: {e}")))
}

fn check_base64_shape(text: &str) -> StoreResult<()> {
    if text.is_empty() {
        return Err(StoreError::Encoding("base64 payload is empty".to_string()));
    }
    if text.len() % 4 != 0 {
        return Err(StoreError::Encoding(format!(
            "base64 length {} is not a multiple of 4",
            text.len()
        )));
    }

    let body = text.trim_end_matches('=');
    let padding = text.len() - body.len();
    if padding > 2 {
        return Err(StoreError::Encoding("too much base64 padding".to_string()));
    }
    if let Some(bad) = body
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '+' || *c == '/'))
    {
        return Err(StoreError::Encoding(format!(
            "invalid base64 character {bad:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_an_encoding_failure() {
        assert!(matches!(check_image(&[]), Err(StoreError::Encoding(_))));
        assert!(matches!(encode_image(&[]), Err(StoreError::Encoding(_))));
        assert!(check_image(&[1]).is_ok());
    }

    #[test]
    fn rejects_bad_charset_and_length() {
        assert!(decode_base64("abc").is_err());
        assert!(decode_base64("ab$d").is_err());
        assert!(decode_base64("a===").is_err());
        assert_eq!(decode_base64("aGk=").unwrap(), b"hi");
        assert!(matches!(decode_base64("!!!!"), Err(StoreError::Encoding(_))));
    }

    #[test]
    fn decodes_what_it_encodes() {
        let bytes = vec![0u8, 255, 17, 42, 99];
        let text = encode_image(&bytes).unwrap();
        assert_eq!(decode_base64(&text).unwrap(), bytes);
    }
}
