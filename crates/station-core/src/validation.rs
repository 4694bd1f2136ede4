//! # Validation Module
//!
//! Input checks applied before the station tree is mutated.
//!
//! ## Usage
//! ```rust
//! use station_core::validation::{validate_name, validate_node_ip};
//!
//! assert!(validate_name("name", "Lobby").is_ok());
//! assert!(validate_node_ip("192.168.1.20").is_ok());
//! assert!(validate_node_ip("192.168.1.20:5000").is_err());
//! ```

use crate::error::ValidationError;
use crate::types::MAX_LIGHT_INTENSITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted name for stations, folders, contents, nodes and tags.
pub const MAX_NAME_LENGTH: usize = 200;

/// Longest accepted media file extension.
pub const MAX_EXTENSION_LENGTH: usize = 10;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name.
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 200 characters
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}

/// Validates a node address.
///
/// A host name or IPv4 address without port or scheme; the port comes
/// from configuration.
pub fn validate_node_ip(ip: &str) -> ValidationResult<()> {
    let ip = ip.trim();

    if ip.is_empty() {
        return Err(ValidationError::Required {
            field: "ip".to_string(),
        });
    }

    if !ip
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field: "ip".to_string(),
            reason: "must be a host name or IPv4 address without port".to_string(),
        });
    }

    Ok(())
}

/// Validates a media file extension (without the dot).
pub fn validate_file_extension(extension: &str) -> ValidationResult<()> {
    if extension.is_empty() {
        return Err(ValidationError::Required {
            field: "extension".to_string(),
        });
    }

    if extension.len() > MAX_EXTENSION_LENGTH {
        return Err(ValidationError::TooLong {
            field: "extension".to_string(),
            max: MAX_EXTENSION_LENGTH,
        });
    }

    if !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "extension".to_string(),
            reason: "must contain only letters and digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a light-intensity preset index.
pub fn validate_light_intensity(level: u8) -> ValidationResult<()> {
    if level > MAX_LIGHT_INTENSITY {
        return Err(ValidationError::OutOfRange {
            field: "light_intensity".to_string(),
            min: 0,
            max: MAX_LIGHT_INTENSITY as i64,
        });
    }
    Ok(())
}

/// Validates a video duration in seconds.
pub fn validate_duration(duration: f64) -> ValidationResult<()> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(ValidationError::InvalidFormat {
            field: "duration".to_string(),
            reason: "must be a non-negative number of seconds".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Lobby").is_ok());
        assert!(matches!(
            validate_name("name", "   "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_name("name", &"x".repeat(201)),
            Err(ValidationError::TooLong { max: 200, .. })
        ));
    }

    #[test]
    fn test_validate_node_ip() {
        assert!(validate_node_ip("10.0.0.4").is_ok());
        assert!(validate_node_ip("player-2.local").is_ok());
        assert!(validate_node_ip("").is_err());
        assert!(validate_node_ip("ws://10.0.0.4").is_err());
        assert!(validate_node_ip("10.0.0.4:5000").is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        assert!(validate_file_extension("mp4").is_ok());
        assert!(validate_file_extension("").is_err());
        assert!(validate_file_extension(".mp4").is_err());
        assert!(validate_file_extension("a/b").is_err());
    }

    #[test]
    fn test_validate_light_intensity() {
        for level in 0..=2 {
            assert!(validate_light_intensity(level).is_ok());
        }
        assert!(validate_light_intensity(3).is_err());
    }

    #[test]
    fn test_validate_duration() {
        assert!(validate_duration(0.0).is_ok());
        assert!(validate_duration(-1.0).is_err());
        assert!(validate_duration(f64::NAN).is_err());
    }
}
