//! Byte window ↔ transport text.
//!
//! The message channel only carries JSON-safe text, so chunk payloads travel
//! as padded standard base64.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::ProtocolError;

/// Encode raw bytes for the wire.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a wire payload back to raw bytes.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidPayload`] if `text` is not valid base64.
pub fn decode(text: &str) -> Result<Vec<u8>, ProtocolError> {
    STANDARD
        .decode(text)
        .map_err(|_| ProtocolError::InvalidPayload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_edge_inputs() {
        let all_bytes: Vec<u8> = (0..=255u8).collect();
        for input in [
            Vec::new(),
            vec![0x00; 1024],
            vec![0xFF; 1023],
            all_bytes,
            b"plain ascii".to_vec(),
        ] {
            assert_eq!(decode(&encode(&input)).unwrap(), input);
        }
    }

    #[test]
    fn test_empty_encodes_to_empty() {
        assert_eq!(encode(&[]), "");
        assert_eq!(decode("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(decode("not base64!"), Err(ProtocolError::InvalidPayload));
        assert_eq!(decode("abc"), Err(ProtocolError::InvalidPayload));
    }
}
