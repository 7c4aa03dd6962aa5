//! Tabula - native inference runtime for tabular machine learning models.
//!
//! This crate loads trained linear and gradient boosted tree models from a
//! compact binary file and scores JSON rows against them, optionally
//! explaining each prediction with per-feature contributions. Training
//! happens elsewhere; this crate only evaluates what was trained.
//!
//! The C ABI (`tabula-capi`), the UniFFI binding (`tabula-uniffi`) and the
//! `tabula` CLI are thin layers over [`Model`].
//!
//! # Example
//!
//! ```rust,ignore
//! use tabula::Model;
//!
//! fn main() -> tabula::Result<()> {
//!     let model = Model::from_path("heart_disease.tabula".as_ref())?;
//!     let output = model.predict_json(r#"{"age": 63, "chest_pain": "typical angina"}"#, None)?;
//!     println!("{output}");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod features;
pub mod format;
pub mod id;
pub mod linear;
pub mod model;
pub mod predict;
pub mod table;
pub mod tree;

// Re-export commonly used types
pub use config::{FormatConfig, PredictConfig, TokenizerConfig};
pub use error::{Result, TabulaError};
pub use format::ModelFile;
pub use id::ModelId;
pub use model::{Model, ModelKind, Task};
pub use predict::{
    BinaryClassificationPredictOutput, ContributionToken, FeatureContributionEntry,
    FeatureContributions, MulticlassClassificationPredictOutput, PredictOptions, PredictOutput,
    RegressionPredictOutput,
};
pub use table::Row;

/// Version of this crate, reported by every binding.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
