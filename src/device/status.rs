use crate::device::constants::STATUS_PLACEHOLDER;

/// Decodes a status notification payload. Invalid UTF-8 sequences are replaced, never rejected.
pub fn decode_status(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

/// The text to display for the last decoded status, if any.
pub fn display_status(status: Option<&str>) -> &str {
    match status {
        Some(text) if !text.is_empty() => text,
        _ => STATUS_PLACEHOLDER,
    }
}
