//! Common validation logic.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Machine numbers are short uppercase alphanumeric tags, e.g. "D001",
    /// "CM-2024-17". Assigned at manufacturing; we only validate the shape.
    static ref DEVICE_NO_RE: Regex = Regex::new(r"^[A-Z0-9][A-Z0-9\-]{1,31}$").unwrap();
}

/// Validates a device number.
pub fn is_valid_device_no(device_no: &str) -> bool {
    DEVICE_NO_RE.is_match(device_no)
}

/// Validates a command type tag (lowercase snake_case, firmware-defined).
pub fn is_valid_command_type(command_type: &str) -> bool {
    !command_type.is_empty()
        && command_type.len() <= 64
        && command_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
