//! Centralized configuration for the tabula runtime.
//!
//! Constants for the model file format, prediction defaults and text
//! tokenization live here so bindings and the CLI agree on them.

/// Model file format parameters.
pub struct FormatConfig;

impl FormatConfig {
    /// The first byte of every model file.
    pub const MAJOR_VERSION: u8 = 0;
    /// Conventional file extension for model files.
    pub const FILE_EXTENSION: &'static str = "tabula";
    /// Upper bound on the bytes a model body may claim while decoding.
    /// Length prefixes beyond it are rejected before anything is allocated.
    pub const MAX_BODY_BYTES: usize = 1 << 28;
}

/// Prediction defaults.
pub struct PredictConfig;

impl PredictConfig {
    /// Probability at or above which a binary classifier reports the positive class.
    pub const DEFAULT_THRESHOLD: f32 = 0.5;
    /// Batches with at least this many rows are scored on the rayon pool.
    pub const PARALLEL_MIN_ROWS: usize = 256;
    /// Rows per rayon task when scoring in parallel.
    pub const PARALLEL_CHUNK_ROWS: usize = 64;
}

/// Text tokenization parameters for bag-of-words features.
pub struct TokenizerConfig;

impl TokenizerConfig {
    /// Shortest run of alphanumeric characters that forms a token.
    pub const MIN_TOKEN_CHARS: usize = 2;
}
