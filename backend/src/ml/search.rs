//! Randomized hyperparameter search

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::error::MlError;
use super::forest::ForestParams;
use super::metrics::cross_val_neg_mse;

/// Candidate values for each tuned hyperparameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100, 200, 300],
            max_depth: vec![Some(5), Some(10), Some(15), Some(20), None],
            min_samples_split: vec![2, 5, 10],
            min_samples_leaf: vec![1, 2, 4],
        }
    }
}

impl SearchSpace {
    /// Every combination, applied on top of `base`
    fn combinations(&self, base: &ForestParams) -> Vec<ForestParams> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        out.push(ForestParams {
                            n_estimators,
                            max_depth,
                            min_samples_split,
                            min_samples_leaf,
                            ..*base
                        });
                    }
                }
            }
        }
        out
    }
}

/// One evaluated configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub params: ForestParams,
    /// Mean negative MSE across folds
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best: Candidate,
    pub evaluated: Vec<Candidate>,
}

/// Evaluate `iterations` distinct configurations drawn from `space` with
/// k-fold negative MSE and return the best. Ties keep the earlier draw.
pub fn randomized_search(
    x: &[Vec<f64>],
    y: &[f64],
    base: &ForestParams,
    space: &SearchSpace,
    iterations: usize,
    folds: usize,
) -> Result<SearchOutcome, MlError> {
    let mut combos = space.combinations(base);
    if combos.is_empty() || iterations == 0 {
        return Err(MlError::InvalidConfig(
            "search space and iteration count must be non-empty".into(),
        ));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(base.seed);
    combos.shuffle(&mut rng);
    combos.truncate(iterations);

    let mut evaluated = Vec::with_capacity(combos.len());
    for params in combos {
        let score = cross_val_neg_mse(x, y, &params, folds)?;
        tracing::debug!(
            n_estimators = params.n_estimators,
            max_depth = ?params.max_depth,
            min_samples_split = params.min_samples_split,
            min_samples_leaf = params.min_samples_leaf,
            score,
            "Evaluated search candidate"
        );
        evaluated.push(Candidate { params, score });
    }

    let best = evaluated
        .iter()
        .fold(None::<&Candidate>, |best, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        })
        .cloned()
        .ok_or_else(|| MlError::Training("no search candidates evaluated".into()))?;

    tracing::info!(
        n_estimators = best.params.n_estimators,
        max_depth = ?best.params.max_depth,
        score = best.score,
        "Hyperparameter search complete"
    );
    Ok(SearchOutcome { best, evaluated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_space_size() {
        let combos = SearchSpace::default().combinations(&ForestParams::default());
        assert_eq!(combos.len(), 4 * 5 * 3 * 3);
        assert!(combos.iter().all(|c| c.seed == 42));
    }

    #[test]
    fn test_search_picks_distinct_candidates() {
        let x: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64]).collect();
        let y: Vec<f64> = x.iter().map(|r| 2000.0 + 30.0 * r[0]).collect();
        let space = SearchSpace {
            n_estimators: vec![5, 10],
            max_depth: vec![Some(2), Some(6)],
            min_samples_split: vec![2],
            min_samples_leaf: vec![1],
        };
        let outcome = randomized_search(&x, &y, &ForestParams::default(), &space, 3, 3).unwrap();

        assert_eq!(outcome.evaluated.len(), 3);
        for (i, a) in outcome.evaluated.iter().enumerate() {
            for b in &outcome.evaluated[i + 1..] {
                assert_ne!(a.params, b.params);
            }
        }
        assert!(outcome.evaluated.iter().all(|c| c.score <= outcome.best.score));
    }
}
