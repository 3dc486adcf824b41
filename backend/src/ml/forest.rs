//! Random forest regressor
//!
//! Bagged smartcore CART trees averaged at prediction time. Every tree draws
//! its bootstrap sample from its own generator, seeded from the forest seed
//! and the tree's position, so the fitted forest does not depend on how trees
//! are spread across threads. Trees consider every feature at each split.

use std::num::NonZeroUsize;
use std::thread;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_regressor::{
    DecisionTreeRegressor, DecisionTreeRegressorParameters,
};

use super::dataset::{dense, dense_rows};
use super::error::MlError;
use super::metrics::mse;

type Tree = DecisionTreeRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: Some(15),
            min_samples_split: 5,
            min_samples_leaf: 2,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn tree_params(&self) -> Result<DecisionTreeRegressorParameters, MlError> {
        let mut params = DecisionTreeRegressorParameters::default()
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf);
        if let Some(depth) = self.max_depth {
            let depth = u16::try_from(depth)
                .map_err(|_| MlError::InvalidConfig(format!("max_depth {} is too large", depth)))?;
            params = params.with_max_depth(depth);
        }
        Ok(params)
    }

    fn tree_seed(&self, tree: usize) -> u64 {
        self.seed
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            .wrapping_add(tree as u64)
    }

    pub fn validate(&self) -> Result<(), MlError> {
        if self.n_estimators == 0 {
            return Err(MlError::InvalidConfig("n_estimators must be at least 1".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(MlError::InvalidConfig("min_samples_leaf must be at least 1".into()));
        }
        if self.max_depth == Some(0) {
            return Err(MlError::InvalidConfig("max_depth must be at least 1".into()));
        }
        self.tree_params().map(|_| ())
    }
}

/// A fitted random forest
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<Tree>,
    n_features: usize,
}

impl RandomForestRegressor {
    /// Fit a forest on row-major `x` and targets `y`
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: &ForestParams) -> Result<Self, MlError> {
        params.validate()?;
        if x.is_empty() {
            return Err(MlError::InsufficientTrainingData("no rows to fit".into()));
        }
        if x.len() != y.len() {
            return Err(MlError::Training(format!(
                "{} rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        let n_features = x[0].len();
        if x.iter().any(|r| r.len() != n_features) {
            return Err(MlError::SchemaDrift("rows have inconsistent widths".into()));
        }

        let tree_params = params.tree_params()?;
        let fit_tree = |tree: usize| -> Result<Tree, MlError> {
            let mut rng = ChaCha8Rng::seed_from_u64(params.tree_seed(tree));
            let n = x.len();
            let indices: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let sample_x = dense_rows(x, &indices)?;
            let sample_y: Vec<f64> = indices.iter().map(|&i| y[i]).collect();
            Ok(Tree::fit(&sample_x, &sample_y, tree_params.clone())?)
        };

        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
            .min(params.n_estimators);
        let per_worker = params.n_estimators.div_ceil(workers);

        let chunks = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|w| {
                    let start = w * per_worker;
                    let end = ((w + 1) * per_worker).min(params.n_estimators);
                    let fit_tree = &fit_tree;
                    scope.spawn(move || (start..end).map(fit_tree).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join())
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(|_| MlError::Training("tree fitting thread panicked".into()))?;

        let trees = chunks
            .into_iter()
            .flatten()
            .collect::<Result<Vec<Tree>, MlError>>()?;

        Ok(Self { trees, n_features })
    }

    /// Predictions of every tree for every row, indexed `[tree][row]`
    pub fn tree_predictions(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MlError> {
        if let Some(row) = rows.iter().find(|r| r.len() != self.n_features) {
            return Err(MlError::SchemaDrift(format!(
                "row has {} values, forest expects {}",
                row.len(),
                self.n_features
            )));
        }
        if rows.is_empty() {
            return Ok(vec![Vec::new(); self.trees.len()]);
        }
        let x = dense(rows)?;
        self.trees
            .iter()
            .map(|tree| tree.predict(&x).map_err(MlError::from))
            .collect()
    }

    /// Mean of the tree predictions for each row
    pub fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, MlError> {
        let per_tree = self.tree_predictions(rows)?;
        let n_trees = per_tree.len().max(1) as f64;
        Ok((0..rows.len())
            .map(|i| per_tree.iter().map(|p| p[i]).sum::<f64>() / n_trees)
            .collect())
    }

    pub fn predict(&self, row: &[f64]) -> Result<f64, MlError> {
        Ok(self.predict_with_spread(row)?.0)
    }

    /// Mean and population standard deviation of the tree predictions
    pub fn predict_with_spread(&self, row: &[f64]) -> Result<(f64, f64), MlError> {
        let preds: Vec<f64> = self
            .tree_predictions(&[row.to_vec()])?
            .into_iter()
            .filter_map(|p| p.first().copied())
            .collect();
        let n = preds.len().max(1) as f64;
        let mean = preds.iter().sum::<f64>() / n;
        let variance = preds.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;
        Ok((mean, variance.sqrt()))
    }

    /// Permutation importance on held-out rows.
    ///
    /// Each column is shuffled in turn (seeded) and the rise in mean squared
    /// error recorded. Negative rises count as zero; the result sums to 1
    /// unless no column matters at all.
    pub fn permutation_importance(&self, x: &[Vec<f64>], y: &[f64], seed: u64) -> Result<Vec<f64>, MlError> {
        let baseline = mse(y, &self.predict_batch(x)?);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let mut importance = Vec::with_capacity(self.n_features);
        for feature in 0..self.n_features {
            let mut column: Vec<f64> = x.iter().map(|r| r[feature]).collect();
            column.shuffle(&mut rng);
            let permuted: Vec<Vec<f64>> = x
                .iter()
                .zip(column)
                .map(|(row, value)| {
                    let mut row = row.clone();
                    row[feature] = value;
                    row
                })
                .collect();
            let score = mse(y, &self.predict_batch(&permuted)?);
            importance.push((score - baseline).max(0.0));
        }

        let total: f64 = importance.iter().sum();
        if total > 0.0 {
            importance.iter_mut().for_each(|v| *v /= total);
        }
        Ok(importance)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_data(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![i as f64, ((i * 7) % 13) as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 1000.0 + 50.0 * r[0]).collect();
        (x, y)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 20,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = linear_data(80);
        let a = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        let b = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.predict_batch(&x).unwrap(), b.predict_batch(&x).unwrap());
    }

    #[test]
    fn test_learns_dominant_feature() {
        let (x, y) = linear_data(80);
        let forest = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        assert_eq!(forest.n_trees(), 20);

        let importance = forest.permutation_importance(&x, &y, 7).unwrap();
        assert_eq!(importance.len(), 2);
        assert!(importance[0] > importance[1]);
        assert!((importance.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        let pred = forest.predict(&[40.0, 1.0]).unwrap();
        assert!((pred - 3000.0).abs() < 300.0, "prediction {} too far off", pred);
    }

    #[test]
    fn test_spread_matches_tree_predictions() {
        let (x, y) = linear_data(60);
        let forest = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        let row = [30.0, 2.0];
        let (mean, std) = forest.predict_with_spread(&row).unwrap();
        assert!((mean - forest.predict_batch(&[row.to_vec()]).unwrap()[0]).abs() < 1e-9);
        assert!(std >= 0.0);
        assert_eq!(forest.tree_predictions(&[row.to_vec()]).unwrap().len(), 20);
    }

    #[test]
    fn test_wrong_width_rejected() {
        let (x, y) = linear_data(30);
        let forest = RandomForestRegressor::fit(&x, &y, &small_params()).unwrap();
        assert!(matches!(forest.predict(&[1.0]), Err(MlError::SchemaDrift(_))));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (x, y) = linear_data(10);
        let params = ForestParams {
            n_estimators: 0,
            ..ForestParams::default()
        };
        assert!(matches!(
            RandomForestRegressor::fit(&x, &y, &params),
            Err(MlError::InvalidConfig(_))
        ));
        let params = ForestParams {
            max_depth: Some(100_000),
            ..ForestParams::default()
        };
        assert!(matches!(params.validate(), Err(MlError::InvalidConfig(_))));
    }
}
