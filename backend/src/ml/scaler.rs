//! Per-feature standardization

use serde::{Deserialize, Serialize};
use smartcore::api::{Transformer, UnsupervisedEstimator};
use smartcore::preprocessing::numerical::{StandardScaler, StandardScalerParameters};

use super::dataset::{dense, rows_of};
use super::error::MlError;

/// Zero-mean, unit-variance scaler over smartcore's [`StandardScaler`].
/// Fit once on the training split and reused unchanged for every later
/// transform. Constant columns map to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    n_features: usize,
    inner: StandardScaler<f64>,
}

impl FeatureScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self, MlError> {
        let x = dense(rows).map_err(|e| match e {
            MlError::InsufficientTrainingData(_) => {
                MlError::InsufficientTrainingData("cannot fit scaler on zero rows".into())
            }
            other => other,
        })?;
        let inner = StandardScaler::fit(&x, StandardScalerParameters::default())?;
        Ok(Self {
            n_features: rows[0].len(),
            inner,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MlError> {
        if let Some(row) = rows.iter().find(|r| r.len() != self.n_features) {
            return Err(MlError::SchemaDrift(format!(
                "row has {} values, scaler expects {}",
                row.len(),
                self.n_features
            )));
        }
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let scaled = self.inner.transform(&dense(rows)?)?;
        // A constant training column has no usable scale.
        Ok(rows_of(&scaled)
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| if v.is_finite() { v } else { 0.0 })
                    .collect()
            })
            .collect())
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>, MlError> {
        let mut rows = self.transform(&[row.to_vec()])?;
        rows.pop()
            .ok_or_else(|| MlError::Estimator("scaler returned no rows".into()))
    }
}
