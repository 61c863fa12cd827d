use log::debug;

use crate::config::PipelineConfig;
use crate::csv_reader::Transaction;
use crate::encoder::FittedEncoder;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline;

/// A trained classifier over the encoded feature columns (identifier excluded).
pub trait RiskModel {
    fn predict_proba(&self, features: &[f64]) -> f64;
}

pub struct ServingAdapter<M> {
    encoder: FittedEncoder,
    config: PipelineConfig,
    model: M,
}

impl<M: RiskModel> ServingAdapter<M> {
    pub fn new(encoder: FittedEncoder, config: PipelineConfig, model: M) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            encoder,
            config,
            model,
        })
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.encoder.feature_names()
    }

    /// Parses a record in the raw input schema from JSON.
    pub fn parse_record(json: &str) -> PipelineResult<Transaction> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encodes one raw record exactly as the training rows were encoded.
    /// Customer aggregates are computed from the record alone.
    pub fn encode(&self, transaction: &Transaction) -> PipelineResult<Vec<f64>> {
        let records = pipeline::build_features(std::slice::from_ref(transaction), &self.config)?;
        let record = records
            .first()
            .ok_or_else(|| PipelineError::Prediction("no record to encode".to_string()))?;
        Ok(self.encoder.encode_record(record, 1)?.values)
    }

    /// Risk probability in [0, 1].
    pub fn predict(&self, transaction: &Transaction) -> PipelineResult<f64> {
        let features = self.encode(transaction)?;
        let probability = self.model.predict_proba(&features);
        if !probability.is_finite() {
            return Err(PipelineError::Prediction(format!(
                "model returned non-finite output {probability}"
            )));
        }
        debug!(
            "Scored transaction {}: {probability:.4}",
            transaction.transaction_id
        );
        Ok(probability.clamp(0.0, 1.0))
    }
}
