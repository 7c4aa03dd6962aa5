//! Prediction options and outputs.
//!
//! These types define the JSON shapes exchanged with every binding: options
//! come in as camelCase JSON, outputs go out as untagged JSON objects whose
//! fields identify the task.

use crate::config::PredictConfig;
use crate::error::{Result, TabulaError};
use crate::features::{self, FeatureGroup};
use crate::format::TokenKind;
use crate::linear::{self, Linear, LinearMulticlass};
use crate::table::Table;
use crate::tree::{TreeEnsemble, TreeMulticlassEnsemble};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options accepted by `predict`. Every field is optional in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PredictOptions {
    /// Probability at or above which a binary classifier picks the positive class.
    pub threshold: f32,
    pub compute_feature_contributions: bool,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            threshold: PredictConfig::DEFAULT_THRESHOLD,
            compute_feature_contributions: false,
        }
    }
}

impl PredictOptions {
    /// Parse options JSON. `null` yields the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Option<PredictOptions> = serde_json::from_str(json)?;
        let options = options.unwrap_or_default();
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(TabulaError::invalid_input(format!(
                "threshold must be between 0 and 1, got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// The prediction for one input row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictOutput {
    Regression(RegressionPredictOutput),
    BinaryClassification(BinaryClassificationPredictOutput),
    MulticlassClassification(MulticlassClassificationPredictOutput),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionPredictOutput {
    pub value: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_contributions: Option<FeatureContributions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryClassificationPredictOutput {
    pub class_name: String,
    /// Probability of `class_name`.
    pub probability: f32,
    /// Contributions to the positive class logit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_contributions: Option<FeatureContributions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticlassClassificationPredictOutput {
    pub class_name: String,
    pub probability: f32,
    pub probabilities: BTreeMap<String, f32>,
    /// Contributions to each class's logit, keyed by class name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_contributions: Option<BTreeMap<String, FeatureContributions>>,
}

/// Additive explanation of a raw model output.
///
/// `baseline_value` plus every entry's `feature_contribution_value` equals
/// `output_value`, up to floating point error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureContributions {
    pub baseline_value: f32,
    pub output_value: f32,
    pub feature_contributions: Vec<FeatureContributionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "feature_type",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum FeatureContributionEntry {
    Identity {
        column_name: String,
        feature_contribution_value: f32,
    },
    Normalized {
        column_name: String,
        feature_contribution_value: f32,
    },
    OneHotEncoded {
        column_name: String,
        /// `None` for the invalid-value slot.
        option: Option<String>,
        feature_value: bool,
        feature_contribution_value: f32,
    },
    BagOfWords {
        column_name: String,
        token: ContributionToken,
        /// Whether the token occurs in the text.
        feature_value: bool,
        feature_contribution_value: f32,
    },
}

/// A bag-of-words token as it appears in contribution output: a unigram is
/// a string, a bigram a two-element array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ContributionToken {
    Unigram(String),
    Bigram(String, String),
}

impl From<&TokenKind> for ContributionToken {
    fn from(token: &TokenKind) -> Self {
        match token {
            TokenKind::Unigram(token) => ContributionToken::Unigram(token.clone()),
            TokenKind::Bigram(a, b) => ContributionToken::Bigram(a.clone(), b.clone()),
        }
    }
}

/// The validated estimator behind a model.
#[derive(Debug, Clone)]
pub(crate) enum Estimator {
    LinearRegressor(Linear),
    TreeRegressor(TreeEnsemble),
    LinearBinaryClassifier {
        negative_class: String,
        positive_class: String,
        model: Linear,
    },
    TreeBinaryClassifier {
        negative_class: String,
        positive_class: String,
        model: TreeEnsemble,
    },
    LinearMulticlassClassifier {
        classes: Vec<String>,
        model: LinearMulticlass,
    },
    TreeMulticlassClassifier {
        classes: Vec<String>,
        model: TreeMulticlassEnsemble,
    },
}

impl Estimator {
    /// Score every row of `table`.
    pub(crate) fn predict(
        &self,
        groups: &[FeatureGroup],
        table: &Table,
        options: &PredictOptions,
    ) -> Vec<PredictOutput> {
        let explain = options.compute_feature_contributions;
        match self {
            Estimator::LinearRegressor(model) => {
                let features = features::compute_features_f32(groups, table);
                let values = model.predict(features.view());
                values
                    .iter()
                    .zip(features.rows())
                    .map(|(&value, row)| {
                        PredictOutput::Regression(RegressionPredictOutput {
                            value,
                            feature_contributions: explain
                                .then(|| explain_row(groups, row, model.contributions(row), value)),
                        })
                    })
                    .collect()
            }
            Estimator::TreeRegressor(model) => {
                let features = features::compute_features_value(groups, table);
                let values = model.predict(features.view());
                values
                    .iter()
                    .zip(features.rows())
                    .map(|(&value, row)| {
                        PredictOutput::Regression(RegressionPredictOutput {
                            value,
                            feature_contributions: explain.then(|| {
                                let numbers = row.mapv(|v| v.as_f32());
                                explain_row(groups, numbers.view(), model.contributions(row), value)
                            }),
                        })
                    })
                    .collect()
            }
            Estimator::LinearBinaryClassifier {
                negative_class,
                positive_class,
                model,
            } => {
                let features = features::compute_features_f32(groups, table);
                let logits = model.predict(features.view());
                logits
                    .iter()
                    .zip(features.rows())
                    .map(|(&logit, row)| {
                        let contributions = explain
                            .then(|| explain_row(groups, row, model.contributions(row), logit));
                        binary_output(negative_class, positive_class, logit, options, contributions)
                    })
                    .collect()
            }
            Estimator::TreeBinaryClassifier {
                negative_class,
                positive_class,
                model,
            } => {
                let features = features::compute_features_value(groups, table);
                let logits = model.predict(features.view());
                logits
                    .iter()
                    .zip(features.rows())
                    .map(|(&logit, row)| {
                        let contributions = explain.then(|| {
                            let numbers = row.mapv(|v| v.as_f32());
                            explain_row(groups, numbers.view(), model.contributions(row), logit)
                        });
                        binary_output(negative_class, positive_class, logit, options, contributions)
                    })
                    .collect()
            }
            Estimator::LinearMulticlassClassifier { classes, model } => {
                let features = features::compute_features_f32(groups, table);
                let logits = model.predict(features.view());
                let mut probabilities = logits.clone();
                linear::softmax(probabilities.view_mut());
                (0..table.n_rows())
                    .map(|i| {
                        let row = features.row(i);
                        let contributions = explain.then(|| {
                            classes
                                .iter()
                                .enumerate()
                                .map(|(c, class)| {
                                    let values = model.contributions(row, c);
                                    (class.clone(), explain_row(groups, row, values, logits[[i, c]]))
                                })
                                .collect()
                        });
                        multiclass_output(classes, probabilities.row(i), contributions)
                    })
                    .collect()
            }
            Estimator::TreeMulticlassClassifier { classes, model } => {
                let features = features::compute_features_value(groups, table);
                let logits = model.predict(features.view());
                let mut probabilities = logits.clone();
                linear::softmax(probabilities.view_mut());
                (0..table.n_rows())
                    .map(|i| {
                        let row = features.row(i);
                        let contributions = explain.then(|| {
                            let numbers = row.mapv(|v| v.as_f32());
                            classes
                                .iter()
                                .enumerate()
                                .map(|(c, class)| {
                                    let values = model.contributions(row, c);
                                    let explained =
                                        explain_row(groups, numbers.view(), values, logits[[i, c]]);
                                    (class.clone(), explained)
                                })
                                .collect()
                        });
                        multiclass_output(classes, probabilities.row(i), contributions)
                    })
                    .collect()
            }
        }
    }
}

/// `values` holds one contribution per feature followed by the baseline.
fn explain_row(
    groups: &[FeatureGroup],
    features: ArrayView1<f32>,
    mut values: Vec<f32>,
    output_value: f32,
) -> FeatureContributions {
    let baseline_value = values.pop().unwrap_or(0.0);
    FeatureContributions {
        baseline_value,
        output_value,
        feature_contributions: features::describe_contributions(groups, features, &values),
    }
}

fn binary_output(
    negative_class: &str,
    positive_class: &str,
    logit: f32,
    options: &PredictOptions,
    feature_contributions: Option<FeatureContributions>,
) -> PredictOutput {
    let probability = linear::sigmoid(logit);
    let (class_name, probability) = if probability >= options.threshold {
        (positive_class, probability)
    } else {
        (negative_class, 1.0 - probability)
    };
    PredictOutput::BinaryClassification(BinaryClassificationPredictOutput {
        class_name: class_name.to_owned(),
        probability,
        feature_contributions,
    })
}

fn multiclass_output(
    classes: &[String],
    probabilities: ArrayView1<f32>,
    feature_contributions: Option<BTreeMap<String, FeatureContributions>>,
) -> PredictOutput {
    // First class wins ties. NaN logits leave the first class with a NaN
    // probability, which serializes as null.
    let first = probabilities.first().copied().unwrap_or(f32::NAN);
    let (best, probability) = probabilities.iter().enumerate().skip(1).fold(
        (0, first),
        |(best, max), (i, &p)| if p > max { (i, p) } else { (best, max) },
    );
    PredictOutput::MulticlassClassification(MulticlassClassificationPredictOutput {
        class_name: classes[best].clone(),
        probability,
        probabilities: classes
            .iter()
            .cloned()
            .zip(probabilities.iter().copied())
            .collect(),
        feature_contributions,
    })
}
