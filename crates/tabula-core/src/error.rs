//! Error types for the tabula runtime.
//!
//! A single error enum covers model decoding, model validation and
//! prediction input problems so that every binding can map it onto its own
//! error surface.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the tabula runtime.
#[derive(Debug, Error)]
pub enum TabulaError {
    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Model file errors
    #[error("Model data is empty")]
    EmptyModelData,

    #[error("Unsupported model format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u8, supported: u8 },

    #[error("Failed to decode model: {message}")]
    Decode { message: String },

    #[error("Failed to encode model: {message}")]
    Encode { message: String },

    // Model validation errors
    #[error("Invalid model: {message}")]
    InvalidModel { message: String },

    #[error("Invalid model id: {0}")]
    InvalidModelId(String),

    // Prediction errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

/// Result type alias for tabula operations.
pub type Result<T> = std::result::Result<T, TabulaError>;

impl From<std::io::Error> for TabulaError {
    fn from(err: std::io::Error) -> Self {
        TabulaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TabulaError {
    fn from(err: serde_json::Error) -> Self {
        TabulaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<bincode::error::DecodeError> for TabulaError {
    fn from(err: bincode::error::DecodeError) -> Self {
        TabulaError::Decode {
            message: err.to_string(),
        }
    }
}

impl From<bincode::error::EncodeError> for TabulaError {
    fn from(err: bincode::error::EncodeError) -> Self {
        TabulaError::Encode {
            message: err.to_string(),
        }
    }
}

impl TabulaError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        TabulaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a validation failure.
    pub fn invalid_model(message: impl Into<String>) -> Self {
        TabulaError::InvalidModel {
            message: message.into(),
        }
    }

    /// Shorthand for a bad prediction input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TabulaError::InvalidInput {
            message: message.into(),
        }
    }

    /// True when the error was caused by the caller's prediction input or
    /// options rather than by the model itself.
    pub fn is_input_error(&self) -> bool {
        matches!(self, TabulaError::Json { .. } | TabulaError::InvalidInput { .. })
    }

    /// True when the error was raised while decoding or validating a model.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            TabulaError::EmptyModelData
                | TabulaError::UnsupportedVersion { .. }
                | TabulaError::Decode { .. }
                | TabulaError::InvalidModel { .. }
                | TabulaError::InvalidModelId(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TabulaError::UnsupportedVersion {
            found: 3,
            supported: 0,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported model format version 3 (supported: 0)"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(TabulaError::invalid_input("row 0 is not an object").is_input_error());
        assert!(!TabulaError::invalid_input("x").is_model_error());
        assert!(TabulaError::EmptyModelData.is_model_error());
        assert!(TabulaError::invalid_model("bad tree").is_model_error());
        let io = TabulaError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(!io.is_input_error());
        assert!(!io.is_model_error());
    }

    #[test]
    fn test_io_with_path() {
        let err = TabulaError::io_with_path(
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            "/tmp/model.tabula",
        );
        match err {
            TabulaError::Io { path, .. } => {
                assert_eq!(path, Some(PathBuf::from("/tmp/model.tabula")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
