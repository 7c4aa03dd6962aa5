use crate::error::{Result, TabulaError};
use crate::format::ColumnSpec;
use crate::table::ColumnData;
use ndarray::prelude::*;

/// Standardizes a numeric column with the mean and variance seen in training.
///
/// Missing values and zero-variance columns map to 0, the training mean.
#[derive(Debug, Clone)]
pub struct NormalizedFeatureGroup {
    pub source_column_name: String,
    pub(crate) source_column_index: usize,
    pub mean: f32,
    pub variance: f32,
}

impl NormalizedFeatureGroup {
    pub(crate) fn new(
        source_column_name: String,
        source_column_index: usize,
        column: &ColumnSpec,
        mean: f32,
        variance: f32,
    ) -> Result<Self> {
        if !matches!(column, ColumnSpec::Number { .. } | ColumnSpec::Enum { .. }) {
            return Err(TabulaError::invalid_model(format!(
                "normalized feature requires a number or enum column, {source_column_name:?} is neither"
            )));
        }
        if !mean.is_finite() || !variance.is_finite() || variance < 0.0 {
            return Err(TabulaError::invalid_model(format!(
                "normalized feature for {source_column_name:?} has invalid statistics (mean {mean}, variance {variance})"
            )));
        }
        Ok(Self {
            source_column_name,
            source_column_index,
            mean,
            variance,
        })
    }

    fn normalize(&self, value: f32) -> f32 {
        if value.is_nan() || self.variance == 0.0 {
            0.0
        } else {
            (value - self.mean) / self.variance.sqrt()
        }
    }

    pub(crate) fn compute_f32(&self, column: &ColumnData, mut features: ArrayViewMut2<f32>) {
        let mut features = features.column_mut(0);
        match column {
            ColumnData::Number(values) => {
                for (feature, value) in features.iter_mut().zip(values) {
                    *feature = self.normalize(*value);
                }
            }
            ColumnData::Enum(values) => {
                for (feature, value) in features.iter_mut().zip(values) {
                    let value = value.map(|v| v.get() as f32).unwrap_or(f32::NAN);
                    *feature = self.normalize(value);
                }
            }
            ColumnData::Text(_) | ColumnData::Unknown => features.fill(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(variance: f32) -> NormalizedFeatureGroup {
        NormalizedFeatureGroup::new(
            "x".to_string(),
            0,
            &ColumnSpec::Number {
                name: "x".to_string(),
            },
            3.0,
            variance,
        )
        .unwrap()
    }

    #[test]
    fn test_normalize() {
        let mut features = Array2::zeros((3, 1));
        group(9.0).compute_f32(
            &ColumnData::Number(vec![6.0, 0.0, f32::NAN]),
            features.view_mut(),
        );
        assert_eq!(features.column(0).to_vec(), vec![1.0, -1.0, 0.0]);
    }

    #[test]
    fn test_zero_variance() {
        let mut features = Array2::zeros((1, 1));
        group(0.0).compute_f32(&ColumnData::Number(vec![100.0]), features.view_mut());
        assert_eq!(features[[0, 0]], 0.0);
    }

    #[test]
    fn test_rejects_text_column() {
        let result = NormalizedFeatureGroup::new(
            "t".to_string(),
            0,
            &ColumnSpec::Text {
                name: "t".to_string(),
            },
            0.0,
            1.0,
        );
        assert!(result.is_err());
    }
}
