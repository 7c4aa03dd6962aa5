//! The validated, immutable runtime model.

use crate::config::PredictConfig;
use crate::error::{Result, TabulaError};
use crate::features::{self, FeatureGroup};
use crate::format::{
    BinaryClassificationModelSpec, ColumnSpec, ModelFile, MulticlassClassificationModelSpec,
    RegressionModelSpec, TaskSpec,
};
use crate::id::ModelId;
use crate::linear::{Linear, LinearMulticlass};
use crate::predict::{Estimator, PredictOptions, PredictOutput};
use crate::table::{Row, Table};
use crate::tree::{TreeEnsemble, TreeMulticlassEnsemble};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// What a model predicts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    Regression,
    BinaryClassification {
        negative_class: String,
        positive_class: String,
    },
    MulticlassClassification {
        classes: Vec<String>,
    },
}

/// Family of the estimator inside a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Linear,
    Tree,
}

/// A loaded model, ready for inference.
///
/// Models are immutable and `Send + Sync`; one instance can serve
/// predictions from any number of threads.
#[derive(Debug, Clone)]
pub struct Model {
    id: ModelId,
    target_column_name: String,
    columns: Vec<ColumnSpec>,
    feature_groups: Vec<FeatureGroup>,
    n_features: usize,
    task: Task,
    estimator: Estimator,
}

impl TryFrom<ModelFile> for Model {
    type Error = TabulaError;

    fn try_from(file: ModelFile) -> Result<Self> {
        let id: ModelId = file.id.parse()?;

        let mut names = HashSet::new();
        for column in &file.columns {
            if !names.insert(column.name()) {
                return Err(TabulaError::invalid_model(format!(
                    "duplicate column {:?}",
                    column.name()
                )));
            }
        }

        let feature_groups = file
            .feature_groups
            .into_iter()
            .map(|group| FeatureGroup::from_spec(group, &file.columns))
            .collect::<Result<Vec<_>>>()?;
        let n_features = features::n_features(&feature_groups);
        let enum_options = features::enum_feature_options(&feature_groups, &file.columns);

        let (task, estimator) = match file.task {
            TaskSpec::Regression(model) => {
                let estimator = match model {
                    RegressionModelSpec::Linear(spec) => {
                        Estimator::LinearRegressor(Linear::from_spec(spec, n_features)?)
                    }
                    RegressionModelSpec::Tree(spec) => {
                        Estimator::TreeRegressor(TreeEnsemble::from_spec(spec, &enum_options)?)
                    }
                };
                (Task::Regression, estimator)
            }
            TaskSpec::BinaryClassification {
                negative_class,
                positive_class,
                model,
            } => {
                if negative_class == positive_class {
                    return Err(TabulaError::invalid_model(format!(
                        "binary classes must differ, both are {negative_class:?}"
                    )));
                }
                let task = Task::BinaryClassification {
                    negative_class: negative_class.clone(),
                    positive_class: positive_class.clone(),
                };
                let estimator = match model {
                    BinaryClassificationModelSpec::Linear(spec) => Estimator::LinearBinaryClassifier {
                        negative_class,
                        positive_class,
                        model: Linear::from_spec(spec, n_features)?,
                    },
                    BinaryClassificationModelSpec::Tree(spec) => Estimator::TreeBinaryClassifier {
                        negative_class,
                        positive_class,
                        model: TreeEnsemble::from_spec(spec, &enum_options)?,
                    },
                };
                (task, estimator)
            }
            TaskSpec::MulticlassClassification { classes, model } => {
                let distinct: HashSet<&String> = classes.iter().collect();
                if classes.len() < 2 || distinct.len() != classes.len() {
                    return Err(TabulaError::invalid_model(format!(
                        "multiclass model needs at least two distinct classes, got {classes:?}"
                    )));
                }
                let n_classes = classes.len();
                let task = Task::MulticlassClassification {
                    classes: classes.clone(),
                };
                let estimator = match model {
                    MulticlassClassificationModelSpec::Linear(spec) => {
                        Estimator::LinearMulticlassClassifier {
                            classes,
                            model: LinearMulticlass::from_spec(spec, n_features, n_classes)?,
                        }
                    }
                    MulticlassClassificationModelSpec::Tree(spec) => {
                        Estimator::TreeMulticlassClassifier {
                            classes,
                            model: TreeMulticlassEnsemble::from_spec(spec, n_classes, &enum_options)?,
                        }
                    }
                };
                (task, estimator)
            }
        };

        Ok(Model {
            id,
            target_column_name: file.target_column_name,
            columns: file.columns,
            feature_groups,
            n_features,
            task,
            estimator,
        })
    }
}

impl Model {
    /// Decode and validate a model from the bytes of a model file.
    pub fn from_slice(bytes: &[u8]) -> Result<Model> {
        let model = Model::try_from(ModelFile::from_slice(bytes)?)?;
        info!(
            id = %model.id,
            kind = ?model.kind(),
            n_features = model.n_features,
            "Loaded model"
        );
        Ok(model)
    }

    /// Read, decode and validate the model file at `path`.
    pub fn from_path(path: &Path) -> Result<Model> {
        let bytes = std::fs::read(path).map_err(|e| TabulaError::io_with_path(e, path))?;
        Self::from_slice(&bytes)
    }

    pub fn id(&self) -> &ModelId {
        &self.id
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn kind(&self) -> ModelKind {
        match self.estimator {
            Estimator::LinearRegressor(_)
            | Estimator::LinearBinaryClassifier { .. }
            | Estimator::LinearMulticlassClassifier { .. } => ModelKind::Linear,
            Estimator::TreeRegressor(_)
            | Estimator::TreeBinaryClassifier { .. }
            | Estimator::TreeMulticlassClassifier { .. } => ModelKind::Tree,
        }
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn feature_groups(&self) -> &[FeatureGroup] {
        &self.feature_groups
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn target_column_name(&self) -> &str {
        &self.target_column_name
    }

    /// Predict a batch of rows. Outputs are in input order.
    pub fn predict(
        &self,
        rows: &[Row],
        options: Option<&PredictOptions>,
    ) -> Result<Vec<PredictOutput>> {
        let options = options.cloned().unwrap_or_default();
        options.validate()?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        debug!(id = %self.id, rows = rows.len(), "Predicting");
        if rows.len() < PredictConfig::PARALLEL_MIN_ROWS {
            return Ok(self.predict_chunk(rows, &options));
        }
        let chunks: Vec<Vec<PredictOutput>> = rows
            .par_chunks(PredictConfig::PARALLEL_CHUNK_ROWS)
            .map(|chunk| self.predict_chunk(chunk, &options))
            .collect();
        Ok(chunks.into_iter().flatten().collect())
    }

    fn predict_chunk(&self, rows: &[Row], options: &PredictOptions) -> Vec<PredictOutput> {
        let table = Table::from_rows(&self.columns, rows);
        self.estimator.predict(&self.feature_groups, &table, options)
    }

    /// Predict a single row.
    pub fn predict_one(&self, row: &Row, options: Option<&PredictOptions>) -> Result<PredictOutput> {
        self.predict(std::slice::from_ref(row), options)?
            .pop()
            .ok_or_else(|| TabulaError::invalid_input("prediction produced no output"))
    }

    /// JSON in, JSON out.
    ///
    /// `input` is either one object, which yields one output object, or an
    /// array of objects, which yields an array of outputs in the same order.
    /// `options` is a JSON [`PredictOptions`] object.
    pub fn predict_json(&self, input: &str, options: Option<&str>) -> Result<String> {
        let options = options.map(PredictOptions::from_json).transpose()?;
        self.predict_json_with_options(input, options.as_ref())
    }

    /// Like [`Model::predict_json`], with options already parsed.
    pub fn predict_json_with_options(
        &self,
        input: &str,
        options: Option<&PredictOptions>,
    ) -> Result<String> {
        if let Some(options) = options {
            options.validate()?;
        }
        let input: Value = serde_json::from_str(input)?;
        let output = match input {
            Value::Object(row) => serde_json::to_string(&self.predict_one(&row, options)?)?,
            Value::Array(values) => {
                let rows = values
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| match value {
                        Value::Object(row) => Ok(row),
                        other => Err(TabulaError::invalid_input(format!(
                            "row {index} must be a JSON object, got {}",
                            json_type(&other)
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                serde_json::to_string(&self.predict(&rows, options)?)?
            }
            other => {
                return Err(TabulaError::invalid_input(format!(
                    "input must be a JSON object or array, got {}",
                    json_type(&other)
                )))
            }
        };
        Ok(output)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{
        FeatureGroupSpec, LinearSpec, NodeSpec, SplitDirection, SplitSpec, TreeEnsembleSpec,
        TreeSpec,
    };
    use serde_json::json;

    fn regression_file() -> ModelFile {
        ModelFile {
            id: "9d1c6e5f-0a1b-4c2d-8e3f-405162738495".to_string(),
            target_column_name: "y".to_string(),
            columns: vec![ColumnSpec::Number {
                name: "x".to_string(),
            }],
            feature_groups: vec![FeatureGroupSpec::Identity {
                source_column_name: "x".to_string(),
            }],
            task: TaskSpec::Regression(RegressionModelSpec::Linear(LinearSpec {
                bias: 1.0,
                weights: vec![2.0],
                means: vec![0.0],
            })),
        }
    }

    #[test]
    fn test_model_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Model>();
    }

    #[test]
    fn test_id_normalized() {
        let model = Model::try_from(regression_file()).unwrap();
        assert_eq!(model.id().to_string(), "9d1c6e5f0a1b4c2d8e3f405162738495");
        assert_eq!(model.kind(), ModelKind::Linear);
        assert_eq!(model.n_features(), 1);
    }

    #[test]
    fn test_invalid_id() {
        let mut file = regression_file();
        file.id = "model-1".to_string();
        assert!(matches!(
            Model::try_from(file),
            Err(TabulaError::InvalidModelId(_))
        ));
    }

    #[test]
    fn test_duplicate_columns() {
        let mut file = regression_file();
        file.columns.push(ColumnSpec::Text {
            name: "x".to_string(),
        });
        let err = Model::try_from(file).unwrap_err();
        assert!(err.to_string().contains("duplicate column"));
    }

    #[test]
    fn test_binary_classes_must_differ() {
        let mut file = regression_file();
        file.task = TaskSpec::BinaryClassification {
            negative_class: "a".to_string(),
            positive_class: "a".to_string(),
            model: BinaryClassificationModelSpec::Linear(LinearSpec {
                bias: 0.0,
                weights: vec![1.0],
                means: vec![0.0],
            }),
        };
        assert!(Model::try_from(file).is_err());
    }

    #[test]
    fn test_predict_json_object_and_array() {
        let model = Model::try_from(regression_file()).unwrap();
        let single: Value =
            serde_json::from_str(&model.predict_json(r#"{"x": 3}"#, None).unwrap()).unwrap();
        assert_eq!(single, json!({"value": 7.0}));
        let batch: Value = serde_json::from_str(
            &model
                .predict_json(r#"[{"x": 0}, {"x": "1"}, {"other": 5}]"#, Some("{}"))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(batch[0], json!({"value": 1.0}));
        assert_eq!(batch[1], json!({"value": 3.0}));
        // Missing numbers are NaN, which serializes as null.
        assert_eq!(batch[2], json!({"value": null}));
    }

    #[test]
    fn test_predict_json_rejects_bad_input() {
        let model = Model::try_from(regression_file()).unwrap();
        for input in ["42", "[1, 2]", "{", "\"x\""] {
            let err = model.predict_json(input, None).unwrap_err();
            assert!(err.is_input_error(), "{input}: {err}");
        }
        let err = model
            .predict_json("{}", Some(r#"{"threshold": -1}"#))
            .unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_empty_batch() {
        let model = Model::try_from(regression_file()).unwrap();
        assert!(model.predict(&[], None).unwrap().is_empty());
        assert_eq!(model.predict_json("[]", None).unwrap(), "[]");
    }

    #[test]
    fn test_parallel_batch_keeps_order() {
        let mut file = regression_file();
        file.task = TaskSpec::Regression(RegressionModelSpec::Tree(TreeEnsembleSpec {
            bias: 0.0,
            trees: vec![TreeSpec {
                nodes: vec![
                    NodeSpec::Branch {
                        left_child_index: 1,
                        right_child_index: 2,
                        split: SplitSpec::Continuous {
                            feature_index: 0,
                            split_value: 500.0,
                            invalid_values_direction: SplitDirection::Left,
                        },
                        examples_fraction: 1.0,
                    },
                    NodeSpec::Leaf {
                        value: -1.0,
                        examples_fraction: 0.5,
                    },
                    NodeSpec::Leaf {
                        value: 1.0,
                        examples_fraction: 0.5,
                    },
                ],
            }],
        }));
        let model = Model::try_from(file).unwrap();
        let rows: Vec<Row> = (0..1000)
            .map(|i| json!({ "x": i }).as_object().cloned().unwrap())
            .collect();
        let outputs = model.predict(&rows, None).unwrap();
        assert_eq!(outputs.len(), 1000);
        for (i, output) in outputs.iter().enumerate() {
            let expected = if i <= 500 { -1.0 } else { 1.0 };
            match output {
                PredictOutput::Regression(output) => assert_eq!(output.value, expected),
                other => panic!("unexpected output: {other:?}"),
            }
        }
    }
}
