//! Feature engineering at inference time.
//!
//! A model's feature groups turn the columns of a [`Table`] into a dense
//! feature matrix. Linear models consume plain `f32` features; tree models
//! consume [`FeatureValue`]s so enum columns can be split on directly.

mod bag_of_words;
mod identity;
mod normalized;
mod one_hot_encoded;
pub mod tokenizer;

pub use bag_of_words::BagOfWordsFeatureGroup;
pub use identity::IdentityFeatureGroup;
pub use normalized::NormalizedFeatureGroup;
pub use one_hot_encoded::OneHotEncodedFeatureGroup;

use crate::error::{Result, TabulaError};
use crate::format::{ColumnSpec, FeatureGroupSpec};
use crate::predict::FeatureContributionEntry;
use crate::table::{ColumnData, Table};
use ndarray::prelude::*;
use std::num::NonZeroUsize;

/// A single feature of one row, as seen by tree models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Number(f32),
    /// 1-based enum option index, `None` for an invalid value.
    Enum(Option<NonZeroUsize>),
}

impl FeatureValue {
    /// Numeric view of the value. Enum options map to their index, invalid to 0.
    pub fn as_f32(&self) -> f32 {
        match self {
            FeatureValue::Number(value) => *value,
            FeatureValue::Enum(value) => value.map(|v| v.get() as f32).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone)]
pub enum FeatureGroup {
    Identity(IdentityFeatureGroup),
    Normalized(NormalizedFeatureGroup),
    OneHotEncoded(OneHotEncodedFeatureGroup),
    BagOfWords(BagOfWordsFeatureGroup),
}

impl FeatureGroup {
    /// Validate a serialized feature group against the model's columns.
    pub fn from_spec(spec: FeatureGroupSpec, columns: &[ColumnSpec]) -> Result<FeatureGroup> {
        let find = |name: &str| find_column(columns, name);
        match spec {
            FeatureGroupSpec::Identity { source_column_name } => {
                let (index, column) = find(&source_column_name)?;
                IdentityFeatureGroup::new(source_column_name, index, column)
                    .map(FeatureGroup::Identity)
            }
            FeatureGroupSpec::Normalized {
                source_column_name,
                mean,
                variance,
            } => {
                let (index, column) = find(&source_column_name)?;
                NormalizedFeatureGroup::new(source_column_name, index, column, mean, variance)
                    .map(FeatureGroup::Normalized)
            }
            FeatureGroupSpec::OneHotEncoded {
                source_column_name,
                options,
            } => {
                let (index, column) = find(&source_column_name)?;
                OneHotEncodedFeatureGroup::new(source_column_name, index, column, options)
                    .map(FeatureGroup::OneHotEncoded)
            }
            FeatureGroupSpec::BagOfWords {
                source_column_name,
                tokenizer,
                tokens,
            } => {
                let (index, column) = find(&source_column_name)?;
                BagOfWordsFeatureGroup::new(
                    source_column_name,
                    index,
                    column,
                    tokenizer,
                    tokens,
                )
                .map(FeatureGroup::BagOfWords)
            }
        }
    }

    /// Number of features this group produces.
    pub fn n_features(&self) -> usize {
        match self {
            FeatureGroup::Identity(_) | FeatureGroup::Normalized(_) => 1,
            FeatureGroup::OneHotEncoded(group) => group.n_features(),
            FeatureGroup::BagOfWords(group) => group.n_features(),
        }
    }

    pub fn source_column_name(&self) -> &str {
        match self {
            FeatureGroup::Identity(group) => &group.source_column_name,
            FeatureGroup::Normalized(group) => &group.source_column_name,
            FeatureGroup::OneHotEncoded(group) => &group.source_column_name,
            FeatureGroup::BagOfWords(group) => &group.source_column_name,
        }
    }

    fn source_column_index(&self) -> usize {
        match self {
            FeatureGroup::Identity(group) => group.source_column_index,
            FeatureGroup::Normalized(group) => group.source_column_index,
            FeatureGroup::OneHotEncoded(group) => group.source_column_index,
            FeatureGroup::BagOfWords(group) => group.source_column_index,
        }
    }

    fn compute_f32(&self, column: &ColumnData, features: ArrayViewMut2<f32>) {
        match self {
            FeatureGroup::Identity(group) => group.compute_f32(column, features),
            FeatureGroup::Normalized(group) => group.compute_f32(column, features),
            FeatureGroup::OneHotEncoded(group) => group.compute_f32(column, features),
            FeatureGroup::BagOfWords(group) => group.compute_f32(column, features),
        }
    }

    fn describe(&self, values: ArrayView1<f32>, contributions: &[f32]) -> Vec<FeatureContributionEntry> {
        match self {
            FeatureGroup::Identity(group) => vec![FeatureContributionEntry::Identity {
                column_name: group.source_column_name.clone(),
                feature_contribution_value: contributions[0],
            }],
            FeatureGroup::Normalized(group) => vec![FeatureContributionEntry::Normalized {
                column_name: group.source_column_name.clone(),
                feature_contribution_value: contributions[0],
            }],
            FeatureGroup::OneHotEncoded(group) => group.describe(values, contributions),
            FeatureGroup::BagOfWords(group) => group.describe(values, contributions),
        }
    }
}

fn find_column<'a>(columns: &'a [ColumnSpec], name: &str) -> Result<(usize, &'a ColumnSpec)> {
    columns
        .iter()
        .enumerate()
        .find(|(_, column)| column.name() == name)
        .ok_or_else(|| {
            TabulaError::invalid_model(format!("feature group refers to missing column {name:?}"))
        })
}

/// Total feature count of a list of groups.
pub fn n_features(groups: &[FeatureGroup]) -> usize {
    groups.iter().map(FeatureGroup::n_features).sum()
}

/// Compute the `n_rows x n_features` matrix consumed by linear models.
pub fn compute_features_f32(groups: &[FeatureGroup], table: &Table) -> Array2<f32> {
    let mut features = Array2::zeros((table.n_rows(), n_features(groups)));
    let mut offset = 0;
    for group in groups {
        let width = group.n_features();
        let slice = features.slice_mut(s![.., offset..offset + width]);
        if let Some(column) = table.column(group.source_column_index()) {
            group.compute_f32(&column.data, slice);
        }
        offset += width;
    }
    features
}

/// Compute the `n_rows x n_features` matrix consumed by tree models.
///
/// Identical to [`compute_features_f32`] except that identity features over
/// enum columns keep their option index as [`FeatureValue::Enum`].
pub fn compute_features_value(groups: &[FeatureGroup], table: &Table) -> Array2<FeatureValue> {
    let mut features = compute_features_f32(groups, table).mapv(FeatureValue::Number);
    let mut offset = 0;
    for group in groups {
        if let FeatureGroup::Identity(_) = group {
            if let Some(ColumnData::Enum(values)) =
                table.column(group.source_column_index()).map(|c| &c.data)
            {
                for (feature, value) in features.column_mut(offset).iter_mut().zip(values) {
                    *feature = FeatureValue::Enum(*value);
                }
            }
        }
        offset += group.n_features();
    }
    features
}

/// Pair each group with its slice of a row's feature values and contributions.
pub fn describe_contributions(
    groups: &[FeatureGroup],
    values: ArrayView1<f32>,
    contributions: &[f32],
) -> Vec<FeatureContributionEntry> {
    let mut entries = Vec::new();
    let mut offset = 0;
    for group in groups {
        let width = group.n_features();
        entries.extend(group.describe(
            values.slice(s![offset..offset + width]),
            &contributions[offset..offset + width],
        ));
        offset += width;
    }
    entries
}

/// Per feature, the option count of the enum column behind an identity
/// feature. Only those features can take discrete tree splits.
pub fn enum_feature_options(groups: &[FeatureGroup], columns: &[ColumnSpec]) -> Vec<Option<usize>> {
    let mut result = Vec::with_capacity(n_features(groups));
    for group in groups {
        match group {
            FeatureGroup::Identity(identity) => {
                let options = match columns.get(identity.source_column_index) {
                    Some(ColumnSpec::Enum { options, .. }) => Some(options.len()),
                    _ => None,
                };
                result.push(options);
            }
            other => result.extend(std::iter::repeat(None).take(other.n_features())),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{TokenKind, TokenSpec, TokenizerSpec};
    use crate::predict::ContributionToken;
    use serde_json::json;

    fn columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::Number {
                name: "size".to_string(),
            },
            ColumnSpec::Enum {
                name: "color".to_string(),
                options: vec!["red".to_string(), "blue".to_string()],
            },
            ColumnSpec::Text {
                name: "title".to_string(),
            },
        ]
    }

    fn groups() -> Vec<FeatureGroup> {
        let specs = vec![
            FeatureGroupSpec::Normalized {
                source_column_name: "size".to_string(),
                mean: 10.0,
                variance: 4.0,
            },
            FeatureGroupSpec::Identity {
                source_column_name: "color".to_string(),
            },
            FeatureGroupSpec::OneHotEncoded {
                source_column_name: "color".to_string(),
                options: vec!["red".to_string(), "blue".to_string()],
            },
            FeatureGroupSpec::BagOfWords {
                source_column_name: "title".to_string(),
                tokenizer: TokenizerSpec::Alphanumeric,
                tokens: vec![TokenSpec {
                    token: TokenKind::Unigram("cat".to_string()),
                    idf: 2.0,
                }],
            },
        ];
        specs
            .into_iter()
            .map(|spec| FeatureGroup::from_spec(spec, &columns()).unwrap())
            .collect()
    }

    fn table() -> Table {
        let rows: Vec<_> = [
            json!({"size": 14, "color": "blue", "title": "The Cat"}),
            json!({"size": null, "color": "green", "title": "dog"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        Table::from_rows(&columns(), &rows)
    }

    #[test]
    fn test_feature_count() {
        assert_eq!(n_features(&groups()), 1 + 1 + 3 + 1);
    }

    #[test]
    fn test_compute_features_f32() {
        let features = compute_features_f32(&groups(), &table());
        assert_eq!(features.dim(), (2, 6));
        assert_eq!(features.row(0).to_vec(), vec![2.0, 2.0, 0.0, 0.0, 1.0, 1.0]);
        assert_eq!(features.row(1).to_vec(), vec![0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_compute_features_value_keeps_enums() {
        let features = compute_features_value(&groups(), &table());
        assert_eq!(features[[0, 1]], FeatureValue::Enum(NonZeroUsize::new(2)));
        assert_eq!(features[[1, 1]], FeatureValue::Enum(None));
        assert_eq!(features[[0, 0]], FeatureValue::Number(2.0));
    }

    #[test]
    fn test_missing_column_rejected() {
        let spec = FeatureGroupSpec::Identity {
            source_column_name: "nope".to_string(),
        };
        let err = FeatureGroup::from_spec(spec, &columns()).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_enum_feature_options() {
        let options = enum_feature_options(&groups(), &columns());
        assert_eq!(options, vec![None, Some(2), None, None, None, None]);
    }

    #[test]
    fn test_describe_contributions() {
        let groups = groups();
        let features = compute_features_f32(&groups, &table());
        let contributions = [0.5, -0.25, 0.0, 0.0, 0.125, 1.0];
        let entries = describe_contributions(&groups, features.row(0), &contributions);
        assert_eq!(entries.len(), 6);
        assert_eq!(
            entries[3],
            FeatureContributionEntry::OneHotEncoded {
                column_name: "color".to_string(),
                option: Some("red".to_string()),
                feature_value: false,
                feature_contribution_value: 0.0,
            }
        );
        assert_eq!(
            entries[5],
            FeatureContributionEntry::BagOfWords {
                column_name: "title".to_string(),
                token: ContributionToken::Unigram("cat".to_string()),
                feature_value: true,
                feature_contribution_value: 1.0,
            }
        );
    }
}
