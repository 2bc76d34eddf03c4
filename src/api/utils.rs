//! API utility functions
//!
//! Pure, stateless helpers for HTTP request and response processing.

use std::fmt::Write;

use crate::api::error::ApiError;

const MAX_FILENAME_CHARS: usize = 200;
const UNSAFE_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\0'];

/// Parses and validates Content-Type header for application/json
///
/// Accepts:
/// - `application/json`
/// - `application/json; charset=utf-8`
///
/// Rejects other media types such as `application/jsonp` or `text/json`.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Replaces path separators and other unsafe characters with `_` and caps the
/// name at 200 characters, keeping the extension.
pub fn sanitize_filename(filename: &str) -> String {
    let mut result: String = filename
        .chars()
        .map(|c| if UNSAFE_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect();

    if result.chars().count() > MAX_FILENAME_CHARS {
        let (stem, ext) = match result.rfind('.') {
            Some(idx) if idx > 0 => result.split_at(idx),
            _ => (result.as_str(), ""),
        };
        let keep = MAX_FILENAME_CHARS.saturating_sub(ext.chars().count());
        result = stem.chars().take(keep).chain(ext.chars()).collect();
    }

    result.trim().to_string()
}

/// `attachment` disposition with an ASCII fallback name and the UTF-8 name
/// encoded per RFC 5987
pub fn content_disposition(filename: &str) -> String {
    let name = sanitize_filename(filename);
    let name = if name.is_empty() { "download".to_string() } else { name };

    let fallback: String = name
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .collect();

    let mut encoded = String::with_capacity(name.len() * 3);
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }

    format!("attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_type_valid() {
        assert!(parse_content_type("application/json").is_ok());
        assert!(parse_content_type("application/json; charset=utf-8").is_ok());
        assert!(parse_content_type("application/json; charset=UTF-8").is_ok());
    }

    #[test]
    fn test_parse_content_type_invalid() {
        assert!(parse_content_type("application/jsonp").is_err());
        assert!(parse_content_type("application/json-patch+json").is_err());
        assert!(parse_content_type("text/json").is_err());
        assert!(parse_content_type("invalid").is_err());
        assert!(parse_content_type("").is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a/b\\c:d*e?.mp4"), "a_b_c_d_e_.mp4");
        assert_eq!(sanitize_filename("  Song \"Live\" | Remix.mp3 "), "Song _Live_ _ Remix.mp3");
        assert_eq!(sanitize_filename("nul\0byte"), "nul_byte");

        let long = format!("{}.webm", "x".repeat(300));
        let sanitized = sanitize_filename(&long);
        assert_eq!(sanitized.chars().count(), 200);
        assert!(sanitized.ends_with(".webm"));
    }

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("clip.mp4"),
            "attachment; filename=\"clip.mp4\"; filename*=UTF-8''clip.mp4"
        );
        assert_eq!(
            content_disposition("Café \"x\".mp3"),
            "attachment; filename=\"Caf_ _x_.mp3\"; filename*=UTF-8''Caf%C3%A9%20_x_.mp3"
        );
        assert!(content_disposition("").contains("filename=\"download\""));
    }
}
