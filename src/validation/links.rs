use base64::{Engine as _, engine::general_purpose};

use crate::error::{AppError, Result};
use crate::models::link::ContentType;

/// Longest accepted link password.
const MAX_PASSWORD_LEN: usize = 128;
/// Longest accepted recovery phrase input.
const MAX_PHRASE_INPUT_LEN: usize = 512;
/// Longest accepted device id.
const MAX_DEVICE_ID_LEN: usize = 256;

/// Decodes the content field of a create request.
///
/// Text is taken as-is; files travel as standard base64.
///
/// # Arguments
///
/// * `content_type` - The kind of link being created.
/// * `content` - The raw field from the request body.
///
/// # Returns
///
/// The plaintext bytes to seal.
pub fn decode_content(content_type: ContentType, content: String) -> Result<Vec<u8>> {
    match content_type {
        ContentType::Text => Ok(content.into_bytes()),
        ContentType::File => general_purpose::STANDARD
            .decode(content.trim())
            .map_err(|_| AppError::validation("File content must be base64")),
    }
}

/// Validates a password supplied to open a link.
pub fn validate_view_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(AppError::validation("Password must not be empty"));
    }

    if password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LEN
        )));
    }

    Ok(())
}

/// Validates the raw recovery phrase before it is normalised.
pub fn validate_phrase_input(phrase: &str) -> Result<()> {
    if phrase.trim().is_empty() {
        return Err(AppError::validation("Recovery phrase is required"));
    }

    if phrase.len() > MAX_PHRASE_INPUT_LEN {
        return Err(AppError::validation("Recovery phrase is too long"));
    }

    Ok(())
}

/// Reads the edge-provided region header. Anything but a two-letter code is
/// treated as unknown.
pub fn parse_region(raw: Option<&str>) -> Option<String> {
    let region = raw?.trim();
    (region.len() == 2 && region.chars().all(|c| c.is_ascii_alphabetic()))
        .then(|| region.to_ascii_uppercase())
}

/// Reads the device id header.
pub fn parse_device_id(raw: Option<&str>) -> Option<String> {
    let device = raw?.trim();
    (!device.is_empty() && device.len() <= MAX_DEVICE_ID_LEN).then(|| device.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_content_must_be_base64() {
        assert_eq!(
            decode_content(ContentType::File, "AAEC/w==".into()).unwrap(),
            vec![0, 1, 2, 255]
        );
        assert!(decode_content(ContentType::File, "not base64!".into()).is_err());
        assert_eq!(
            decode_content(ContentType::Text, "héllo".into()).unwrap(),
            "héllo".as_bytes()
        );
    }

    #[test]
    fn region_header_is_normalised() {
        assert_eq!(parse_region(Some(" us ")).as_deref(), Some("US"));
        assert_eq!(parse_region(Some("USA")), None);
        assert_eq!(parse_region(Some("1x")), None);
        assert_eq!(parse_region(None), None);
    }

    #[test]
    fn device_header_bounds() {
        assert_eq!(parse_device_id(Some("  ")), None);
        assert_eq!(parse_device_id(Some("abc")).as_deref(), Some("abc"));
        assert_eq!(parse_device_id(Some(&"x".repeat(300))), None);
    }

    #[test]
    fn view_password_bounds() {
        assert!(validate_view_password("").is_err());
        assert!(validate_view_password(&"p".repeat(129)).is_err());
        assert!(validate_view_password("hunter2").is_ok());
    }
}
