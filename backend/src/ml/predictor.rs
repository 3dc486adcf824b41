//! Yield inference over an immutable model artifact

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use shared::{
    ConfidenceMethod, FeatureNormalizer, RawFeatures,
    SampleContext, TemporalContext, YieldPrediction, UNTRAINED_MODEL_VERSION,
};

use super::artifact::ModelArtifact;
use super::dataset::model_row;
use super::error::MlError;

/// Answer given while no trained model is loaded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DegradedDefaults {
    pub yield_kg_per_ha: f64,
    pub confidence: f64,
}

impl Default for DegradedDefaults {
    fn default() -> Self {
        Self {
            yield_kg_per_ha: 3500.0,
            confidence: 0.5,
        }
    }
}

/// Confidence from the spread of tree predictions around their mean.
///
/// The standard deviation is taken relative to the mean prediction, so a
/// spread of a few hundred kg/ha on a yield of several thousand still reads
/// as confident.
pub fn ensemble_confidence(mean: f64, std: f64) -> f64 {
    (1.0 / (1.0 + std / mean.abs().max(1.0))).clamp(0.0, 1.0)
}

/// Confidence from the share of inputs that were supplied
pub fn completeness_confidence(completeness: f64) -> f64 {
    (0.5 + completeness * 0.4).min(0.95).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct Predictor {
    model: Option<Arc<ModelArtifact>>,
    normalizer: FeatureNormalizer,
    defaults: DegradedDefaults,
}

impl Predictor {
    /// Degraded predictor that answers with `defaults`
    pub fn untrained(defaults: DegradedDefaults) -> Self {
        Self {
            model: None,
            normalizer: FeatureNormalizer::new(),
            defaults,
        }
    }

    /// Serve `artifact`. A drifted artifact is kept and every prediction
    /// against it fails with `SchemaDrift`.
    pub fn from_artifact(artifact: Arc<ModelArtifact>, defaults: DegradedDefaults) -> Self {
        if let Err(e) = artifact.check_schema() {
            tracing::error!(version = %artifact.version, error = %e, "Model does not match the feature schema");
        }
        Self {
            model: Some(artifact),
            normalizer: FeatureNormalizer::new(),
            defaults,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.model.is_some()
    }

    pub fn version(&self) -> String {
        self.model
            .as_ref()
            .map(|m| m.version.to_string())
            .unwrap_or_else(|| UNTRAINED_MODEL_VERSION.to_string())
    }

    pub fn artifact(&self) -> Option<&Arc<ModelArtifact>> {
        self.model.as_ref()
    }

    pub fn normalizer(&self) -> &FeatureNormalizer {
        &self.normalizer
    }

    pub fn predict(
        &self,
        raw: &RawFeatures,
        temporal: &TemporalContext,
        context: &SampleContext,
    ) -> Result<YieldPrediction, MlError> {
        let normalized = self.normalizer.normalize(raw, temporal);

        let Some(model) = &self.model else {
            tracing::warn!("No trained model loaded, returning default prediction");
            return Ok(YieldPrediction {
                predicted_yield_kg_per_ha: self.defaults.yield_kg_per_ha,
                confidence: self.defaults.confidence.clamp(0.0, 1.0),
                confidence_method: ConfidenceMethod::Default,
                model_version: UNTRAINED_MODEL_VERSION.to_string(),
                is_trained: false,
                feature_importance: Vec::new(),
                features: normalized.vector,
                defaulted_fields: normalized.defaulted,
                completeness: normalized.completeness,
            });
        };

        model.check_schema()?;

        let codes = model.encoder.encode(context)?;
        let row = model.scaler.transform_row(&model_row(&normalized.vector, &codes))?;
        let (mean, std) = model.forest.predict_with_spread(&row)?;

        let (confidence, confidence_method) = if model.forest.n_trees() >= 2 {
            (ensemble_confidence(mean, std), ConfidenceMethod::Ensemble)
        } else {
            (
                completeness_confidence(normalized.completeness),
                ConfidenceMethod::Completeness,
            )
        };

        tracing::debug!(
            version = %model.version,
            predicted = mean,
            confidence,
            completeness = normalized.completeness,
            "Yield predicted"
        );

        Ok(YieldPrediction {
            predicted_yield_kg_per_ha: mean,
            confidence,
            confidence_method,
            model_version: model.version.to_string(),
            is_trained: true,
            feature_importance: model.feature_importance.clone(),
            features: normalized.vector,
            defaulted_fields: normalized.defaulted,
            completeness: normalized.completeness,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::ForestParams;
    use crate::ml::synthesizer::{synthesize, SynthesisConfig};
    use crate::ml::trainer::{ModelTrainer, TrainerConfig};
    use proptest::prelude::*;
    use shared::FeatureError;

    fn artifact(n_estimators: usize) -> ModelArtifact {
        let samples = synthesize(3, 150, &SynthesisConfig::default()).unwrap();
        let config = TrainerConfig {
            cv_folds: 2,
            forest: ForestParams {
                n_estimators,
                max_depth: Some(6),
                ..ForestParams::default()
            },
            ..TrainerConfig::default()
        };
        ModelTrainer::new(config)
            .train(&samples, &semver::Version::new(1, 0, 0))
            .unwrap()
    }

    fn trained(n_estimators: usize) -> Predictor {
        Predictor::from_artifact(Arc::new(artifact(n_estimators)), DegradedDefaults::default())
    }

    #[test]
    fn test_untrained_defaults() {
        let predictor = Predictor::untrained(DegradedDefaults::default());
        let out = predictor
            .predict(&RawFeatures::new(), &TemporalContext::default(), &SampleContext::default())
            .unwrap();
        assert!(!out.is_trained);
        assert_eq!(out.predicted_yield_kg_per_ha, 3500.0);
        assert_eq!(out.confidence, 0.5);
        assert_eq!(out.model_version, "untrained");
        assert_eq!(out.confidence_method, ConfidenceMethod::Default);
        assert_eq!(predictor.version(), "untrained");
    }

    #[test]
    fn test_trained_prediction() {
        let predictor = trained(10);
        let raw: RawFeatures = [("soil_ph", 6.8), ("total_rainfall", 700.0)].into_iter().collect();
        let out = predictor
            .predict(&raw, &TemporalContext::default(), &SampleContext::new("Salem", "Kharif", "Clay"))
            .unwrap();
        assert!(out.is_trained);
        assert_eq!(out.model_version, "1.0.0");
        assert_eq!(out.confidence_method, ConfidenceMethod::Ensemble);
        assert!((0.0..=1.0).contains(&out.confidence));
        assert!(out.predicted_yield_kg_per_ha > 0.0);
        assert!(!out.feature_importance.is_empty());
    }

    #[test]
    fn test_single_tree_uses_completeness() {
        let predictor = trained(1);
        let out = predictor
            .predict(&RawFeatures::new(), &TemporalContext::default(), &SampleContext::default())
            .unwrap();
        assert_eq!(out.confidence_method, ConfidenceMethod::Completeness);
        assert_eq!(out.confidence, 0.5);
    }

    #[test]
    fn test_unknown_category() {
        let predictor = trained(3);
        let err = predictor
            .predict(
                &RawFeatures::new(),
                &TemporalContext::default(),
                &SampleContext::new("Atlantis", "Kharif", "Clay"),
            )
            .unwrap_err();
        assert!(matches!(err, MlError::Category(FeatureError::UnknownCategory { .. })));
    }

    #[test]
    fn test_drifted_artifact_fails_every_request() {
        let mut drifted = artifact(3);
        drifted.feature_names.reverse();
        let predictor = Predictor::from_artifact(Arc::new(drifted), DegradedDefaults::default());
        assert!(predictor.is_trained());

        for _ in 0..2 {
            let err = predictor
                .predict(&RawFeatures::new(), &TemporalContext::default(), &SampleContext::default())
                .unwrap_err();
            assert!(matches!(err, MlError::SchemaDrift(_)));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_confidence_bounded(mean in -1e6f64..1e6, std in 0.0f64..1e6, completeness in 0.0f64..=1.0) {
            let c = ensemble_confidence(mean, std);
            prop_assert!((0.0..=1.0).contains(&c));
            let c = completeness_confidence(completeness);
            prop_assert!((0.5..=0.95).contains(&c));
        }
    }
}
