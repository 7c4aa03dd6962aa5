//! UniFFI bindings for the tabula model runtime.
//!
//! This crate exposes a loaded model as a reference-counted object, so
//! Python, Kotlin, Swift and Ruby callers never free model handles by hand.
//! Prediction input and output cross the boundary as JSON strings, the same
//! shapes the C ABI uses.
//!
//! # Usage
//!
//! Generate bindings using `--library` mode:
//!
//! ```bash
//! # Build the cdylib
//! cargo build -p tabula-uniffi --release
//!
//! # Generate Python bindings
//! tabula-uniffi-bindgen generate --library --language python \
//!     --out-dir ./bindings/python target/release/libtabula_uniffi.so
//! ```

use std::sync::Arc;
use tabula::{Model, TabulaError, Task};

/// FFI-friendly error type.
///
/// A flattened view of `TabulaError`: sources such as `std::io::Error` do not
/// cross the boundary, only their messages do.
#[derive(Debug, Clone, uniffi::Error, thiserror::Error)]
pub enum FfiError {
    #[error("IO error: {message}")]
    Io { message: String },

    #[error("Invalid model: {message}")]
    InvalidModel { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("{0}")]
    Other(String),
}

impl From<TabulaError> for FfiError {
    fn from(err: TabulaError) -> Self {
        if err.is_model_error() {
            return FfiError::InvalidModel {
                message: err.to_string(),
            };
        }
        if err.is_input_error() {
            return FfiError::InvalidInput {
                message: err.to_string(),
            };
        }
        match err {
            TabulaError::Io { message, path, .. } => FfiError::Io {
                message: match path {
                    Some(p) => format!("{}: {}", p.display(), message),
                    None => message,
                },
            },
            other => FfiError::Other(other.to_string()),
        }
    }
}

/// Result type for FFI operations.
pub type FfiResult<T> = Result<T, FfiError>;

// UniFFI scaffolding - this generates the FFI glue code
uniffi::setup_scaffolding!();

/// Get the version of the tabula runtime.
#[uniffi::export]
pub fn version() -> String {
    tabula::VERSION.to_string()
}

/// What a model predicts.
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum FfiTask {
    Regression,
    BinaryClassification {
        negative_class: String,
        positive_class: String,
    },
    MulticlassClassification {
        classes: Vec<String>,
    },
}

impl From<&Task> for FfiTask {
    fn from(task: &Task) -> Self {
        match task {
            Task::Regression => FfiTask::Regression,
            Task::BinaryClassification {
                negative_class,
                positive_class,
            } => FfiTask::BinaryClassification {
                negative_class: negative_class.clone(),
                positive_class: positive_class.clone(),
            },
            Task::MulticlassClassification { classes } => FfiTask::MulticlassClassification {
                classes: classes.clone(),
            },
        }
    }
}

/// A loaded model.
///
/// # Example (Python)
///
/// ```python
/// model = TabulaModel.from_path("heart_disease.tabula")
/// output = model.predict_json('{"age": 63}', None)
/// ```
#[derive(uniffi::Object)]
pub struct TabulaModel {
    inner: Model,
}

#[uniffi::export]
impl TabulaModel {
    /// Load a model from the bytes of a model file.
    #[uniffi::constructor]
    pub fn from_bytes(bytes: Vec<u8>) -> FfiResult<Arc<Self>> {
        let inner = Model::from_slice(&bytes)?;
        Ok(Arc::new(Self { inner }))
    }

    /// Load a model from a file on disk.
    #[uniffi::constructor]
    pub fn from_path(path: String) -> FfiResult<Arc<Self>> {
        let inner = Model::from_path(path.as_ref())?;
        Ok(Arc::new(Self { inner }))
    }

    /// The model id as 32 lowercase hex digits.
    pub fn id(&self) -> String {
        self.inner.id().to_string()
    }

    pub fn task(&self) -> FfiTask {
        FfiTask::from(self.inner.task())
    }

    /// Predict from a JSON object or array of objects.
    ///
    /// `options` is an optional JSON object with `threshold` and
    /// `computeFeatureContributions`.
    pub fn predict_json(&self, input: String, options: Option<String>) -> FfiResult<String> {
        Ok(self.inner.predict_json(&input, options.as_deref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula::format::{
        ColumnSpec, FeatureGroupSpec, LinearSpec, ModelFile, RegressionModelSpec, TaskSpec,
    };

    fn model_bytes() -> Vec<u8> {
        ModelFile {
            id: "ffffffffffffffffffffffffffffffff".to_string(),
            target_column_name: "y".to_string(),
            columns: vec![ColumnSpec::Number {
                name: "x".to_string(),
            }],
            feature_groups: vec![FeatureGroupSpec::Identity {
                source_column_name: "x".to_string(),
            }],
            task: TaskSpec::Regression(RegressionModelSpec::Linear(LinearSpec {
                bias: 0.5,
                weights: vec![1.0],
                means: vec![0.0],
            })),
        }
        .to_bytes()
        .unwrap()
    }

    #[test]
    fn test_model_object() {
        let model = TabulaModel::from_bytes(model_bytes()).unwrap();
        assert_eq!(model.id(), "ffffffffffffffffffffffffffffffff");
        assert_eq!(model.task(), FfiTask::Regression);
        let output: serde_json::Value =
            serde_json::from_str(&model.predict_json(r#"{"x": 2}"#.to_string(), None).unwrap())
                .unwrap();
        assert_eq!(output["value"], 2.5);
    }

    #[test]
    fn test_ffi_error_conversion() {
        let err = TabulaModel::from_bytes(vec![9, 9, 9]).err().unwrap();
        assert!(matches!(err, FfiError::InvalidModel { .. }));

        let model = TabulaModel::from_bytes(model_bytes()).unwrap();
        let err = model.predict_json("[1]".to_string(), None).unwrap_err();
        assert!(matches!(err, FfiError::InvalidInput { .. }));

        let err = TabulaModel::from_path("/nonexistent/model.tabula".to_string())
            .err()
            .unwrap();
        match err {
            FfiError::Io { message } => assert!(message.contains("/nonexistent/model.tabula")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
