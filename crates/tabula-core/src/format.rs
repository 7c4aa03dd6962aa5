//! On-disk model file format.
//!
//! A model file is one version byte followed by a bincode body:
//!
//! ```text
//! +---------+--------------------------------------+
//! | u8 (0)  | bincode(serde, standard) ModelFile   |
//! +---------+--------------------------------------+
//! ```
//!
//! The body codec is not self-describing, so every enum here is externally
//! tagged and no field is skipped during serialization. These types are the
//! raw, unvalidated contents of a file; [`crate::Model`] is the validated
//! runtime form.

use crate::config::FormatConfig;
use crate::error::{Result, TabulaError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// The serialized contents of a model file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub id: String,
    pub target_column_name: String,
    /// Input columns seen during training, in training order.
    pub columns: Vec<ColumnSpec>,
    /// Feature engineering applied to the input columns, in feature order.
    pub feature_groups: Vec<FeatureGroupSpec>,
    pub task: TaskSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnSpec {
    Unknown { name: String },
    Number { name: String },
    Enum { name: String, options: Vec<String> },
    Text { name: String },
}

impl ColumnSpec {
    pub fn name(&self) -> &str {
        match self {
            ColumnSpec::Unknown { name }
            | ColumnSpec::Number { name }
            | ColumnSpec::Enum { name, .. }
            | ColumnSpec::Text { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureGroupSpec {
    Identity {
        source_column_name: String,
    },
    Normalized {
        source_column_name: String,
        mean: f32,
        variance: f32,
    },
    OneHotEncoded {
        source_column_name: String,
        options: Vec<String>,
    },
    BagOfWords {
        source_column_name: String,
        tokenizer: TokenizerSpec,
        tokens: Vec<TokenSpec>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenizerSpec {
    Alphanumeric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSpec {
    pub token: TokenKind,
    pub idf: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TokenKind {
    Unigram(String),
    Bigram(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskSpec {
    Regression(RegressionModelSpec),
    BinaryClassification {
        negative_class: String,
        positive_class: String,
        model: BinaryClassificationModelSpec,
    },
    MulticlassClassification {
        classes: Vec<String>,
        model: MulticlassClassificationModelSpec,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RegressionModelSpec {
    Linear(LinearSpec),
    Tree(TreeEnsembleSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BinaryClassificationModelSpec {
    Linear(LinearSpec),
    Tree(TreeEnsembleSpec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MulticlassClassificationModelSpec {
    Linear(LinearMulticlassSpec),
    Tree(TreeMulticlassSpec),
}

/// Single-output linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearSpec {
    pub bias: f32,
    pub weights: Vec<f32>,
    /// Training-set mean of every feature, used for feature contributions.
    pub means: Vec<f32>,
}

/// Multi-output linear model with one output per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearMulticlassSpec {
    pub biases: Vec<f32>,
    /// Row-major `n_features x n_classes`.
    pub weights: Vec<f32>,
    pub means: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsembleSpec {
    pub bias: f32,
    pub trees: Vec<TreeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeMulticlassSpec {
    pub biases: Vec<f32>,
    /// Round-major: round `r` holds the trees for classes `0..n_classes`.
    pub trees: Vec<TreeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSpec {
    pub nodes: Vec<NodeSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeSpec {
    Branch {
        left_child_index: u64,
        right_child_index: u64,
        split: SplitSpec,
        examples_fraction: f32,
    },
    Leaf {
        value: f32,
        examples_fraction: f32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SplitSpec {
    Continuous {
        feature_index: u64,
        split_value: f32,
        invalid_values_direction: SplitDirection,
    },
    Discrete {
        feature_index: u64,
        directions: Vec<SplitDirection>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitDirection {
    Left,
    Right,
}

impl ModelFile {
    /// Decode a model file from bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<ModelFile> {
        let (&version, body) = bytes.split_first().ok_or(TabulaError::EmptyModelData)?;
        if version != FormatConfig::MAJOR_VERSION {
            return Err(TabulaError::UnsupportedVersion {
                found: version,
                supported: FormatConfig::MAJOR_VERSION,
            });
        }
        let (model, consumed): (ModelFile, usize) =
            bincode::serde::decode_from_slice(
                body,
                bincode::config::standard().with_limit::<{ FormatConfig::MAX_BODY_BYTES }>(),
            )?;
        if consumed != body.len() {
            return Err(TabulaError::Decode {
                message: format!(
                    "{} trailing bytes after model body",
                    body.len() - consumed
                ),
            });
        }
        debug!(
            id = %model.id,
            bytes = bytes.len(),
            feature_groups = model.feature_groups.len(),
            "Decoded model file"
        );
        Ok(model)
    }

    /// Read and decode the model file at `path`.
    pub fn from_path(path: &Path) -> Result<ModelFile> {
        let bytes = std::fs::read(path).map_err(|e| TabulaError::io_with_path(e, path))?;
        Self::from_slice(&bytes)
    }

    /// Encode this model, version byte included.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let body = bincode::serde::encode_to_vec(self, bincode::config::standard())?;
        let mut bytes = Vec::with_capacity(body.len() + 1);
        bytes.push(FormatConfig::MAJOR_VERSION);
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Write this model to `path`, replacing any existing file.
    pub fn write_to_path(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        let mut file =
            std::fs::File::create(path).map_err(|e| TabulaError::io_with_path(e, path))?;
        file.write_all(&bytes)
            .map_err(|e| TabulaError::io_with_path(e, path))?;
        Ok(())
    }
}
