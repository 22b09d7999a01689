//! Payload encodings for the built-in tags.

use base64::{
    alphabet,
    engine::{general_purpose::STANDARD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

use super::cipher::CipherError;

/// Unpadded decoder that tolerates non-zero trailing bits.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// Standard padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Strict base64 decoding used for tag `2` payloads.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, CipherError> {
    STANDARD
        .decode(text)
        .map_err(|e| CipherError::InvalidEncoding(e.to_string()))
}

/// Hex decoding used for tag `1` payloads.
pub fn decode_hex(text: &str) -> Result<Vec<u8>, CipherError> {
    hex::decode(text).map_err(|e| CipherError::InvalidEncoding(e.to_string()))
}

/// Best-effort base64 decoding for `pt` payloads. Never fails.
///
/// Accepts both the standard and URL-safe alphabets, skips characters outside
/// them, stops at the first `=`, and drops a dangling final character.
pub fn decode_base64_lenient(text: &str) -> Vec<u8> {
    let mut cleaned: String = text
        .chars()
        .take_while(|c| *c != '=')
        .filter_map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '+' | '/' => Some(c),
            '-' => Some('+'),
            '_' => Some('/'),
            _ => None,
        })
        .collect();
    if cleaned.len() % 4 == 1 {
        cleaned.pop();
    }
    LENIENT.decode(cleaned.as_bytes()).unwrap_or_default()
}
