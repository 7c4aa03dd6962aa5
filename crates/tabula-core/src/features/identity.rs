use crate::error::{Result, TabulaError};
use crate::format::ColumnSpec;
use crate::table::ColumnData;
use ndarray::prelude::*;

/// Passes a number column through unchanged. Over an enum column the
/// feature is the 1-based option index, with 0 for invalid values.
#[derive(Debug, Clone)]
pub struct IdentityFeatureGroup {
    pub source_column_name: String,
    pub(crate) source_column_index: usize,
}

impl IdentityFeatureGroup {
    pub(crate) fn new(
        source_column_name: String,
        source_column_index: usize,
        column: &ColumnSpec,
    ) -> Result<Self> {
        match column {
            ColumnSpec::Number { .. } | ColumnSpec::Enum { .. } => Ok(Self {
                source_column_name,
                source_column_index,
            }),
            _ => Err(TabulaError::invalid_model(format!(
                "identity feature requires a number or enum column, {source_column_name:?} is neither"
            ))),
        }
    }

    pub(crate) fn compute_f32(&self, column: &ColumnData, mut features: ArrayViewMut2<f32>) {
        let mut features = features.column_mut(0);
        match column {
            ColumnData::Number(values) => {
                for (feature, value) in features.iter_mut().zip(values) {
                    *feature = *value;
                }
            }
            ColumnData::Enum(values) => {
                for (feature, value) in features.iter_mut().zip(values) {
                    *feature = value.map(|v| v.get() as f32).unwrap_or(0.0);
                }
            }
            ColumnData::Text(_) | ColumnData::Unknown => features.fill(0.0),
        }
    }
}
