//! Error types for shadow graph core types

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building or parsing core types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// Hex input could not be decoded
    #[error("Invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Decoded input has the wrong length
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidLength {
            expected: 32,
            actual: 3,
        };
        assert!(err.to_string().contains("expected 32"));
    }

    #[test]
    fn test_hex_error_converts() {
        let err: CoreError = hex::decode("zz").unwrap_err().into();
        assert!(matches!(err, CoreError::InvalidHex(_)));
    }
}
