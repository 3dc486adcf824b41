//! Training samples, model rows, train/test splits and CSV import

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use shared::{
    validate_yield, CategoricalEncoder, FeatureNormalizer, FeatureVector, RawFeatures,
    SampleContext, SplitStrategy, TemporalContext,
};

use super::error::MlError;

/// CSV columns accepted as the yield label
const LABEL_COLUMNS: [&str; 3] = ["yield_kg_per_ha", "yield", "actual_yield"];

/// One labelled observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub features: FeatureVector,
    #[serde(default)]
    pub context: SampleContext,
    pub yield_kg_per_ha: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl TrainingSample {
    pub fn new(features: FeatureVector, yield_kg_per_ha: f64) -> Self {
        Self {
            features,
            context: SampleContext::default(),
            yield_kg_per_ha,
            observed_at: None,
        }
    }

    pub fn with_context(mut self, context: SampleContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_observed_at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = Some(observed_at);
        self
    }
}

/// Model input row: the numeric features followed by the categorical codes
pub fn model_row(features: &FeatureVector, codes: &[f64; 3]) -> Vec<f64> {
    let mut row = Vec::with_capacity(features.as_slice().len() + codes.len());
    row.extend_from_slice(features.as_slice());
    row.extend_from_slice(codes);
    row
}

/// Encode samples into row-major inputs and targets
pub fn to_matrix(
    samples: &[TrainingSample],
    encoder: &CategoricalEncoder,
) -> Result<(Vec<Vec<f64>>, Vec<f64>), MlError> {
    let mut x = Vec::with_capacity(samples.len());
    let mut y = Vec::with_capacity(samples.len());
    for sample in samples {
        let codes = encoder.encode(&sample.context)?;
        x.push(model_row(&sample.features, &codes));
        y.push(sample.yield_kg_per_ha);
    }
    Ok((x, y))
}

/// Row-major rows as a smartcore matrix
pub fn dense(rows: &[Vec<f64>]) -> Result<DenseMatrix<f64>, MlError> {
    let width = rows
        .first()
        .map(Vec::len)
        .ok_or_else(|| MlError::InsufficientTrainingData("no rows".into()))?;
    let mut values = Vec::with_capacity(rows.len() * width);
    for row in rows {
        if row.len() != width {
            return Err(MlError::SchemaDrift(format!(
                "row has {} values, expected {}",
                row.len(),
                width
            )));
        }
        values.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(rows.len(), width, values, false))
}

/// Selected rows of `x`, repeats allowed
pub fn dense_rows(x: &[Vec<f64>], indices: &[usize]) -> Result<DenseMatrix<f64>, MlError> {
    let rows: Vec<Vec<f64>> = indices.iter().map(|&i| x[i].clone()).collect();
    dense(&rows)
}

/// Back to row-major rows
pub fn rows_of(matrix: &DenseMatrix<f64>) -> Vec<Vec<f64>> {
    let (n_rows, n_cols) = matrix.shape();
    (0..n_rows)
        .map(|i| (0..n_cols).map(|j| *matrix.get((i, j))).collect())
        .collect()
}

/// Number of held-out rows for `n` samples, at least one on each side
fn test_size(n: usize, test_fraction: f64) -> usize {
    let size = (n as f64 * test_fraction).ceil() as usize;
    size.clamp(1, n.saturating_sub(1).max(1))
}

/// Partition sample positions into `(train, test)`.
///
/// `Chronological` holds out the most recent observations; when any sample
/// lacks a timestamp it falls back to input order.
pub fn split_indices(
    samples: &[TrainingSample],
    strategy: SplitStrategy,
    test_fraction: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let n = samples.len();
    let n_test = test_size(n, test_fraction);
    let mut order: Vec<usize> = (0..n).collect();

    match strategy {
        SplitStrategy::Random => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }
        SplitStrategy::Chronological => {
            if samples.iter().all(|s| s.observed_at.is_some()) {
                order.sort_by_key(|&i| samples[i].observed_at);
            } else {
                tracing::warn!("Some samples lack timestamps, chronological split uses input order");
            }
        }
    }

    let test = order.split_off(n - n_test);
    (order, test)
}

// ============================================================================
// CSV Import
// ============================================================================

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Read labelled samples from CSV.
///
/// Feature columns use canonical names or aliases; `district`, `season`,
/// `soil_type`, `observed_at` and `planting_date` are optional. Rows with a
/// missing or invalid label are skipped.
pub fn read_csv<R: Read>(reader: R, normalizer: &FeatureNormalizer) -> Result<Vec<TrainingSample>, MlError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect();

    let label_col = headers
        .iter()
        .position(|h| LABEL_COLUMNS.iter().any(|c| *c == h.as_str()))
        .ok_or_else(|| {
            MlError::InsufficientTrainingData("CSV has no yield_kg_per_ha column".to_string())
        })?;
    let column = |name: &str| headers.iter().position(|h| h == name);
    let (district_col, season_col, soil_col) = (column("district"), column("season"), column("soil_type"));
    let (observed_col, planting_col) = (column("observed_at"), column("planting_date"));

    let mut samples = Vec::new();
    let mut skipped = 0usize;
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let field = |col: Option<usize>| col.and_then(|c| record.get(c));

        let label = record.get(label_col).and_then(|v| v.parse::<f64>().ok());
        let Some(label) = label.filter(|l| validate_yield(*l).is_ok()) else {
            tracing::warn!(line = line + 2, "Skipping row with missing or invalid yield");
            skipped += 1;
            continue;
        };

        let mut raw = RawFeatures::new();
        for (i, value) in record.iter().enumerate() {
            if i != label_col && !value.is_empty() {
                raw.insert_text(headers[i].as_str(), value);
            }
        }

        let observed_at = field(observed_col).and_then(parse_timestamp);
        let temporal = TemporalContext::new(
            field(planting_col)
                .and_then(parse_timestamp)
                .map(|t| t.date_naive()),
            observed_at.map(|t| t.date_naive()),
        );
        let normalized = normalizer.normalize(&raw, &temporal);

        let context = SampleContext {
            district: field(district_col).and_then(non_empty),
            season: field(season_col).and_then(non_empty),
            soil_type: field(soil_col).and_then(non_empty),
        };

        let mut sample = TrainingSample::new(normalized.vector, label).with_context(context);
        sample.observed_at = observed_at;
        samples.push(sample);
    }

    tracing::info!(loaded = samples.len(), skipped, "Read training samples from CSV");
    Ok(samples)
}

/// Read labelled samples from a CSV file
pub fn load_csv(path: &Path, normalizer: &FeatureNormalizer) -> Result<Vec<TrainingSample>, MlError> {
    let file = std::fs::File::open(path)?;
    read_csv(file, normalizer)
}
