//! Pipeline configuration: column names, encoder column lists, clustering
//! parameters and the high-risk ranking. Every field has a default matching the
//! standard transaction schema; a JSON file may override any subset.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::csv_reader::{FieldKind, Transaction};
use crate::encoder::EncoderConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::features::{self, EnrichedRecord};
use crate::kmeans::SegmentationConfig;
use crate::labeling::{self, RankCriterion};
use crate::rfm::RfmColumns;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub group_column: String,
    pub amount_column: String,
    pub timestamp_column: String,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub id_column: String,
    pub label_column: String,
    pub segmentation: SegmentationConfig,
    pub risk_ranking: Vec<RankCriterion>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            group_column: "CustomerId".to_string(),
            amount_column: "Amount".to_string(),
            timestamp_column: "TransactionStartTime".to_string(),
            numeric_columns: vec![
                "Amount".to_string(),
                "Value".to_string(),
                features::TOTAL_AMOUNT.to_string(),
                features::AVG_AMOUNT.to_string(),
                features::STD_AMOUNT.to_string(),
            ],
            categorical_columns: vec![
                "ProductCategory".to_string(),
                "ProviderId".to_string(),
                "ChannelId".to_string(),
            ],
            id_column: "CustomerId".to_string(),
            label_column: "is_high_risk".to_string(),
            segmentation: SegmentationConfig::default(),
            risk_ranking: labeling::default_ranking(),
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every named column against the schema before any stage runs.
    pub fn validate(&self) -> PipelineResult<()> {
        expect_kind(&self.group_column, Transaction::field_kind, FieldKind::Text)?;
        expect_kind(&self.timestamp_column, Transaction::field_kind, FieldKind::Text)?;
        expect_kind(&self.amount_column, Transaction::field_kind, FieldKind::Number)?;
        for column in &self.numeric_columns {
            expect_kind(column, EnrichedRecord::field_kind, FieldKind::Number)?;
        }
        for column in &self.categorical_columns {
            if EnrichedRecord::field_kind(column).is_none() {
                return Err(PipelineError::missing_column(column));
            }
        }
        if Transaction::field_kind(&self.id_column).is_none() {
            return Err(PipelineError::missing_column(&self.id_column));
        }
        if self.label_column.trim().is_empty() {
            return Err(PipelineError::Config("label column name is empty".to_string()));
        }

        if self.segmentation.n_clusters == 0 {
            return Err(PipelineError::Config(
                "cluster count must be at least 1".to_string(),
            ));
        }
        if self.risk_ranking.is_empty() {
            return Err(PipelineError::Config("risk ranking is empty".to_string()));
        }
        let metrics: BTreeSet<_> = self.risk_ranking.iter().map(|c| c.metric).collect();
        if metrics.len() != self.risk_ranking.len() {
            return Err(PipelineError::Config(
                "risk ranking repeats a metric".to_string(),
            ));
        }
        Ok(())
    }

    pub fn encoder_config(&self) -> EncoderConfig {
        EncoderConfig {
            numeric_columns: self.numeric_columns.clone(),
            categorical_columns: self.categorical_columns.clone(),
            id_column: self.id_column.clone(),
        }
    }

    pub fn rfm_columns(&self) -> RfmColumns<'_> {
        RfmColumns {
            group: &self.group_column,
            amount: &self.amount_column,
            timestamp: &self.timestamp_column,
        }
    }
}

fn expect_kind(
    column: &str,
    lookup: fn(&str) -> Option<FieldKind>,
    expected: FieldKind,
) -> PipelineResult<()> {
    match lookup(column) {
        Some(kind) if kind == expected => Ok(()),
        Some(_) => Err(PipelineError::wrong_kind(
            column,
            match expected {
                FieldKind::Text => "text",
                FieldKind::Number => "numeric",
            },
        )),
        None => Err(PipelineError::missing_column(column)),
    }
}
