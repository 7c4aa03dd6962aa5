use super::tokenizer;
use crate::error::{Result, TabulaError};
use crate::format::{ColumnSpec, TokenKind, TokenSpec, TokenizerSpec};
use crate::predict::{ContributionToken, FeatureContributionEntry};
use crate::table::ColumnData;
use ndarray::prelude::*;
use std::collections::HashMap;
use std::fmt;

/// Tf-idf features over the unigrams and bigrams of a text column.
///
/// Every occurrence of a known token adds its idf to that token's feature.
/// The row is then scaled to unit L2 norm, unless no token matched.
#[derive(Debug, Clone)]
pub struct BagOfWordsFeatureGroup {
    pub source_column_name: String,
    pub(crate) source_column_index: usize,
    pub tokenizer: TokenizerSpec,
    pub tokens: Vec<TokenSpec>,
    tokens_map: HashMap<TokenKind, usize>,
}

impl BagOfWordsFeatureGroup {
    pub(crate) fn new(
        source_column_name: String,
        source_column_index: usize,
        column: &ColumnSpec,
        tokenizer: TokenizerSpec,
        tokens: Vec<TokenSpec>,
    ) -> Result<Self> {
        if !matches!(column, ColumnSpec::Text { .. }) {
            return Err(TabulaError::invalid_model(format!(
                "bag-of-words feature requires a text column, {source_column_name:?} is not one"
            )));
        }
        let mut tokens_map = HashMap::with_capacity(tokens.len());
        for (index, entry) in tokens.iter().enumerate() {
            if !entry.idf.is_finite() {
                return Err(TabulaError::invalid_model(format!(
                    "token {} of {source_column_name:?} has a non-finite idf",
                    entry.token
                )));
            }
            if tokens_map.insert(entry.token.clone(), index).is_some() {
                return Err(TabulaError::invalid_model(format!(
                    "token {} appears twice in {source_column_name:?}",
                    entry.token
                )));
            }
        }
        Ok(Self {
            source_column_name,
            source_column_index,
            tokenizer,
            tokens,
            tokens_map,
        })
    }

    pub fn n_features(&self) -> usize {
        self.tokens.len()
    }

    pub(crate) fn compute_f32(&self, column: &ColumnData, mut features: ArrayViewMut2<f32>) {
        features.fill(0.0);
        let ColumnData::Text(values) = column else {
            return;
        };
        for (mut row, text) in features.rows_mut().into_iter().zip(values) {
            let mut sum_of_squares = 0.0;
            let matched = match self.tokenizer {
                TokenizerSpec::Alphanumeric => tokenizer::tokens(text),
            };
            for token in matched {
                if let Some(&index) = self.tokens_map.get(&token) {
                    let value = self.tokens[index].idf;
                    sum_of_squares += value * value;
                    row[index] += value;
                }
            }
            if sum_of_squares > 0.0 {
                let norm: f32 = sum_of_squares.sqrt();
                row.mapv_inplace(|v| v / norm);
            }
        }
    }

    pub(crate) fn describe(
        &self,
        values: ArrayView1<f32>,
        contributions: &[f32],
    ) -> Vec<FeatureContributionEntry> {
        self.tokens
            .iter()
            .zip(values.iter().zip(contributions))
            .map(|(entry, (value, contribution))| FeatureContributionEntry::BagOfWords {
                column_name: self.source_column_name.clone(),
                token: ContributionToken::from(&entry.token),
                feature_value: *value > 0.0,
                feature_contribution_value: *contribution,
            })
            .collect()
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Unigram(token) => write!(f, "{token}"),
            TokenKind::Bigram(a, b) => write!(f, "{a} {b}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> BagOfWordsFeatureGroup {
        BagOfWordsFeatureGroup::new(
            "title".to_string(),
            0,
            &ColumnSpec::Text {
                name: "title".to_string(),
            },
            TokenizerSpec::Alphanumeric,
            vec![
                TokenSpec {
                    token: TokenKind::Unigram("little".to_string()),
                    idf: 3.0,
                },
                TokenSpec {
                    token: TokenKind::Bigram("the".to_string(), "little".to_string()),
                    idf: 4.0,
                },
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_unigrams_and_bigrams_are_normalized() {
        let group = group();
        let mut features = Array2::zeros((2, group.n_features()));
        group.compute_f32(
            &ColumnData::Text(vec!["The Little Prince".to_string(), "nothing".to_string()]),
            features.view_mut(),
        );
        assert!((features[[0, 0]] - 0.6).abs() < 1e-6);
        assert!((features[[0, 1]] - 0.8).abs() < 1e-6);
        assert_eq!(features.row(1).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_duplicate_tokens_rejected() {
        let token = TokenSpec {
            token: TokenKind::Unigram("a1".to_string()),
            idf: 1.0,
        };
        let result = BagOfWordsFeatureGroup::new(
            "t".to_string(),
            0,
            &ColumnSpec::Text {
                name: "t".to_string(),
            },
            TokenizerSpec::Alphanumeric,
            vec![token.clone(), token],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(TokenKind::Unigram("cat".to_string()).to_string(), "cat");
        assert_eq!(
            TokenKind::Bigram("the".to_string(), "cat".to_string()).to_string(),
            "the cat"
        );
    }
}
