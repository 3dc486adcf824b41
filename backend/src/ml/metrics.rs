//! Regression metrics and k-fold cross-validation

use smartcore::metrics::{mean_absolute_error, mean_squared_error, r2 as r2_score};
use smartcore::model_selection::{BaseKFold, KFold};

use super::dataset::dense;
use super::error::MlError;
use super::forest::{ForestParams, RandomForestRegressor};

/// Mean absolute error
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    mean_absolute_error(&actual.to_vec(), &predicted.to_vec())
}

/// Mean squared error
pub fn mse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    mean_squared_error(&actual.to_vec(), &predicted.to_vec())
}

/// Root mean squared error
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mse(actual, predicted).sqrt()
}

/// Coefficient of determination. Returns 0.0 when the actual values are constant.
pub fn r2(actual: &[f64], predicted: &[f64]) -> f64 {
    let Some(first) = actual.first() else {
        return 0.0;
    };
    if actual.iter().all(|a| (a - first).abs() <= f64::EPSILON) {
        tracing::warn!("R² undefined for constant targets, reporting 0");
        return 0.0;
    }
    r2_score(&actual.to_vec(), &predicted.to_vec())
}

/// Contiguous, unshuffled k-fold partition of the rows of `x` as
/// `(train, validation)` index pairs
pub fn kfold_splits(x: &[Vec<f64>], k: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>, MlError> {
    if k < 2 || x.len() < k {
        return Err(MlError::InsufficientTrainingData(format!(
            "{} rows cannot be split into {} folds",
            x.len(),
            k
        )));
    }
    let folds = KFold::default().with_n_splits(k).with_shuffle(false);
    Ok(folds.split(&dense(x)?).collect())
}

/// Per-fold scores of a forest configuration, each fold scored with `score`
fn cross_validate<F>(
    x: &[Vec<f64>],
    y: &[f64],
    params: &ForestParams,
    k: usize,
    score: F,
) -> Result<Vec<f64>, MlError>
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    let folds = kfold_splits(x, k)?;
    let mut scores = Vec::with_capacity(folds.len());
    for (train, validation) in folds {
        let x_train: Vec<Vec<f64>> = train.iter().map(|&i| x[i].clone()).collect();
        let y_train: Vec<f64> = train.iter().map(|&i| y[i]).collect();
        let forest = RandomForestRegressor::fit(&x_train, &y_train, params)?;

        let x_validation: Vec<Vec<f64>> = validation.iter().map(|&i| x[i].clone()).collect();
        let actual: Vec<f64> = validation.iter().map(|&i| y[i]).collect();
        let predicted = forest.predict_batch(&x_validation)?;
        scores.push(score(&actual, &predicted));
    }
    Ok(scores)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

/// Mean absolute error averaged over k folds
pub fn cross_val_mae(
    x: &[Vec<f64>],
    y: &[f64],
    params: &ForestParams,
    k: usize,
) -> Result<f64, MlError> {
    Ok(mean(&cross_validate(x, y, params, k, mae)?))
}

/// Negative mean squared error averaged over k folds (higher is better)
pub fn cross_val_neg_mse(
    x: &[Vec<f64>],
    y: &[f64],
    params: &ForestParams,
    k: usize,
) -> Result<f64, MlError> {
    Ok(-mean(&cross_validate(x, y, params, k, mse)?))
}
