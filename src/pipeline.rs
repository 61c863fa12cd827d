//! Explicit pipeline entry points.
//!
//! Feature branch: records -> aggregates -> calendar fields -> fitted encoder.
//! Label branch: records -> RFM -> segmentation -> high-risk cluster.
//! Each stage consumes the previous stage's output by value and fully
//! completes before the next starts.

use std::path::Path;

use log::info;

use crate::assembler::{self, LabeledDataset};
use crate::config::PipelineConfig;
use crate::csv_reader::{self, Transaction};
use crate::encoder::{self, FeatureBlock, FittedEncoder};
use crate::error::PipelineResult;
use crate::features::{self, EnrichedRecord};
use crate::kmeans;
use crate::labeling::{self, RiskLabels};
use crate::rfm::{self, RfmVector};

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dataset: LabeledDataset,
    pub encoder: FittedEncoder,
    pub rfm: Vec<RfmVector>,
    pub risk: RiskLabels,
}

pub fn build_features(
    transactions: &[Transaction],
    config: &PipelineConfig,
) -> PipelineResult<Vec<EnrichedRecord>> {
    let records: Vec<EnrichedRecord> = transactions.iter().cloned().map(Into::into).collect();
    let records =
        features::add_aggregate_features(records, &config.group_column, &config.amount_column)?;
    features::add_temporal_features(records, &config.timestamp_column)
}

pub fn derive_labels(
    transactions: &[Transaction],
    config: &PipelineConfig,
) -> PipelineResult<(Vec<RfmVector>, RiskLabels)> {
    let rfm = rfm::calculate_rfm(transactions, config.rfm_columns())?;
    let assignments = kmeans::segment_customers(&rfm, &config.segmentation)?;
    let risk = labeling::label_customers(&rfm, &assignments, &config.risk_ranking)?;
    Ok((rfm, risk))
}

/// Encodes new transactions with an encoder fitted on an earlier run.
pub fn transform(
    transactions: &[Transaction],
    encoder: &FittedEncoder,
    config: &PipelineConfig,
) -> PipelineResult<FeatureBlock> {
    config.validate()?;
    let records = build_features(transactions, config)?;
    encoder.apply(&records)
}

pub fn run(transactions: &[Transaction], config: &PipelineConfig) -> PipelineResult<PipelineOutput> {
    config.validate()?;
    info!("Running pipeline over {} transactions", transactions.len());

    let records = build_features(transactions, config)?;
    let encoder = encoder::fit(&records, &config.encoder_config())?;
    let block = encoder.apply(&records)?;

    let (rfm, risk) = derive_labels(transactions, config)?;
    let dataset = assembler::assemble(block, &risk.labels, &config.label_column);

    Ok(PipelineOutput {
        dataset,
        encoder,
        rfm,
        risk,
    })
}

/// Reads `input`, runs the pipeline and writes the labeled dataset to `output`.
pub fn run_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &PipelineConfig,
) -> PipelineResult<PipelineOutput> {
    config.validate()?;
    let transactions = csv_reader::read_transactions(input)?;
    let result = run(&transactions, config)?;
    result.dataset.write_csv(output.as_ref())?;
    info!(
        "Wrote {} rows to {}",
        result.dataset.len(),
        output.as_ref().display()
    );
    Ok(result)
}
