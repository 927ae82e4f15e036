use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;

use crate::extract::ExtractError;

const DATA_URI_PREFIX: &[u8] = b"data:";
const BASE64_MARKER: &[u8] = b"base64,";

/// Decode an image payload.
///
/// Accepts encoded image bytes (PNG, JPEG, ...), text carrying a `base64,`
/// marker (data URIs and their truncated forms) whose remainder is Base64,
/// or bare Base64 text. The format is guessed from content.
pub fn decode_payload(payload: &[u8]) -> Result<DynamicImage, ExtractError> {
    if payload.starts_with(DATA_URI_PREFIX) {
        let body = base64_body(payload).ok_or_else(|| {
            ExtractError::InvalidImage("data URI without a base64 body".to_string())
        })?;
        return decode_base64(body);
    }

    match image::load_from_memory(payload) {
        Ok(img) => Ok(img),
        Err(err) => match std::str::from_utf8(payload) {
            Ok(text) => match base64_body(payload) {
                Some(body) => decode_base64(body),
                None if looks_like_base64(text) => decode_base64(payload),
                None => Err(ExtractError::InvalidImage(err.to_string())),
            },
            Err(_) => Err(ExtractError::InvalidImage(err.to_string())),
        },
    }
}

fn base64_body(payload: &[u8]) -> Option<&[u8]> {
    payload
        .windows(BASE64_MARKER.len())
        .position(|w| w == BASE64_MARKER)
        .map(|pos| &payload[pos + BASE64_MARKER.len()..])
}

fn looks_like_base64(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'\r' | b'\n'))
}

fn decode_base64(body: &[u8]) -> Result<DynamicImage, ExtractError> {
    let cleaned: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(&cleaned)
        .map_err(|e| ExtractError::InvalidImage(format!("invalid base64: {e}")))?;
    image::load_from_memory(&bytes).map_err(|e| ExtractError::InvalidImage(e.to_string()))
}
