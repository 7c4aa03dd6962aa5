use crate::error::{Result, TabulaError};
use crate::format::ColumnSpec;
use crate::predict::FeatureContributionEntry;
use crate::table::ColumnData;
use ndarray::prelude::*;

/// One feature per enum option plus a leading slot for invalid values.
#[derive(Debug, Clone)]
pub struct OneHotEncodedFeatureGroup {
    pub source_column_name: String,
    pub(crate) source_column_index: usize,
    pub options: Vec<String>,
}

impl OneHotEncodedFeatureGroup {
    pub(crate) fn new(
        source_column_name: String,
        source_column_index: usize,
        column: &ColumnSpec,
        options: Vec<String>,
    ) -> Result<Self> {
        match column {
            ColumnSpec::Enum {
                options: column_options,
                ..
            } if *column_options == options => Ok(Self {
                source_column_name,
                source_column_index,
                options,
            }),
            ColumnSpec::Enum { .. } => Err(TabulaError::invalid_model(format!(
                "one-hot options for {source_column_name:?} differ from the column's options"
            ))),
            _ => Err(TabulaError::invalid_model(format!(
                "one-hot feature requires an enum column, {source_column_name:?} is not one"
            ))),
        }
    }

    pub fn n_features(&self) -> usize {
        self.options.len() + 1
    }

    pub(crate) fn compute_f32(&self, column: &ColumnData, mut features: ArrayViewMut2<f32>) {
        features.fill(0.0);
        if let ColumnData::Enum(values) = column {
            for (mut row, value) in features.rows_mut().into_iter().zip(values) {
                let slot = value.map(|v| v.get()).unwrap_or(0);
                if let Some(feature) = row.get_mut(slot) {
                    *feature = 1.0;
                }
            }
        }
    }

    pub(crate) fn describe(
        &self,
        values: ArrayView1<f32>,
        contributions: &[f32],
    ) -> Vec<FeatureContributionEntry> {
        let options = std::iter::once(None).chain(self.options.iter().cloned().map(Some));
        options
            .zip(values.iter().zip(contributions))
            .map(|(option, (value, contribution))| FeatureContributionEntry::OneHotEncoded {
                column_name: self.source_column_name.clone(),
                option,
                feature_value: *value > 0.0,
                feature_contribution_value: *contribution,
            })
            .collect()
    }
}
