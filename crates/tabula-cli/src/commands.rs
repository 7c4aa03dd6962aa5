//! Subcommand implementations.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tabula::format::ColumnSpec;
use tabula::{Model, ModelKind, PredictConfig, PredictOptions, Task};
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub kind: ModelKind,
    pub task: Task,
    pub target_column_name: String,
    pub n_features: usize,
    pub columns: Vec<ColumnInfo>,
}

#[derive(Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl From<&ColumnSpec> for ColumnInfo {
    fn from(column: &ColumnSpec) -> Self {
        let (column_type, options) = match column {
            ColumnSpec::Unknown { .. } => ("unknown", None),
            ColumnSpec::Number { .. } => ("number", None),
            ColumnSpec::Enum { options, .. } => ("enum", Some(options.clone())),
            ColumnSpec::Text { .. } => ("text", None),
        };
        Self {
            name: column.name().to_owned(),
            column_type,
            options,
        }
    }
}

fn load(path: &Path) -> Result<Model> {
    Model::from_path(path).with_context(|| format!("Failed to load model {}", path.display()))
}

pub fn info(path: &Path) -> Result<ModelInfo> {
    let model = load(path)?;
    Ok(ModelInfo {
        id: model.id().to_string(),
        kind: model.kind(),
        task: model.task().clone(),
        target_column_name: model.target_column_name().to_owned(),
        n_features: model.n_features(),
        columns: model.columns().iter().map(ColumnInfo::from).collect(),
    })
}

#[derive(Debug, Clone)]
pub struct PredictRequest {
    pub model: PathBuf,
    /// `None` reads stdin.
    pub input: Option<PathBuf>,
    /// `None` writes stdout.
    pub output: Option<PathBuf>,
    pub threshold: Option<f32>,
    pub contributions: bool,
    pub pretty: bool,
}

impl PredictRequest {
    fn options(&self) -> PredictOptions {
        PredictOptions {
            threshold: self.threshold.unwrap_or(PredictConfig::DEFAULT_THRESHOLD),
            compute_feature_contributions: self.contributions,
        }
    }
}

/// Run a prediction request and return the JSON that was written.
pub fn predict(request: &PredictRequest) -> Result<String> {
    let model = load(&request.model)?;

    let input = match &request.input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read input {}", path.display()))?,
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read input from stdin")?;
            input
        }
    };

    let options = request.options();
    options.validate().context("Invalid prediction options")?;
    let output = model
        .predict_json_with_options(&input, Some(&options))
        .context("Prediction failed")?;
    let output = if request.pretty {
        let value: serde_json::Value = serde_json::from_str(&output)?;
        serde_json::to_string_pretty(&value)?
    } else {
        output
    };

    match &request.output {
        Some(path) => {
            std::fs::write(path, format!("{output}\n"))
                .with_context(|| format!("Failed to write output {}", path.display()))?;
            info!("Wrote predictions to {}", path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{output}").context("Failed to write output")?;
        }
    }
    Ok(output)
}
