//! Fit/apply encoding of feature rows into a dense numeric block.
//!
//! `fit` derives every statistic (medians, standardization constants, most
//! frequent categories, category vocabularies) from a reference dataset and
//! returns them as an immutable [`FittedEncoder`]. `apply` only reads those
//! parameters, so new data is encoded exactly as the reference data was.
//!
//! Output column order:
//! 1. numeric columns, median-imputed then standardized
//! 2. one-hot indicators per categorical column, first sorted category dropped
//! 3. the identifier column, unmodified (kept on [`FeatureRow::id`])

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::features::EnrichedRecord;
use crate::stats::{self, Standardization};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
    pub id_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericParams {
    pub column: String,
    pub median: f64,
    pub standardization: Standardization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalParams {
    pub column: String,
    /// Imputation value for missing entries.
    pub most_frequent: Option<String>,
    /// Sorted vocabulary observed at fit time. The first entry is the dropped reference.
    pub categories: Vec<String>,
}

impl CategoricalParams {
    pub fn indicator_categories(&self) -> &[String] {
        self.categories.get(1..).unwrap_or(&[])
    }

    fn encode_into(&self, value: Option<&str>, out: &mut Vec<f64>) {
        let value = value.or(self.most_frequent.as_deref());
        // Unseen categories and the reference category both yield all zeros.
        out.extend(
            self.indicator_categories()
                .iter()
                .map(|category| if Some(category.as_str()) == value { 1.0 } else { 0.0 }),
        );
    }
}

/// Immutable encoding parameters produced by [`fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEncoder {
    pub numeric: Vec<NumericParams>,
    pub categorical: Vec<CategoricalParams>,
    pub id_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub values: Vec<f64>,
    pub id: String,
}

/// Encoded rows. `columns` names `values`; the identifier travels separately.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBlock {
    pub columns: Vec<String>,
    pub id_column: String,
    pub rows: Vec<FeatureRow>,
}

impl FeatureBlock {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Positions of the indicator columns encoded from `column`.
    pub fn indicator_indices(&self, column: &str) -> Vec<usize> {
        let prefix = format!("{column}_");
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with(&prefix))
            .map(|(i, _)| i)
            .collect()
    }
}

pub fn fit(records: &[EnrichedRecord], config: &EncoderConfig) -> PipelineResult<FittedEncoder> {
    if records.is_empty() {
        return Err(PipelineError::Config(
            "cannot fit the encoder on an empty dataset".to_string(),
        ));
    }

    let mut numeric = Vec::with_capacity(config.numeric_columns.len());
    for column in &config.numeric_columns {
        let observed = records
            .iter()
            .map(|r| r.numeric_field(column))
            .collect::<PipelineResult<Vec<_>>>()?;
        let present: Vec<f64> = observed.iter().flatten().copied().collect();
        let median = match stats::median(&present) {
            Some(median) => median,
            None => {
                warn!("Numeric column '{column}' has no observed values; imputing 0.0");
                0.0
            }
        };
        let imputed: Vec<f64> = observed.iter().map(|v| v.unwrap_or(median)).collect();
        let standardization = Standardization::fit(&imputed);
        debug!(
            "{column}: median={median}, mean={}, scale={} ({} missing)",
            standardization.mean,
            standardization.scale,
            observed.len() - present.len()
        );
        numeric.push(NumericParams {
            column: column.clone(),
            median,
            standardization,
        });
    }

    let mut categorical = Vec::with_capacity(config.categorical_columns.len());
    for column in &config.categorical_columns {
        let observed = records
            .iter()
            .map(|r| r.category(column))
            .collect::<PipelineResult<Vec<_>>>()?;
        let most_frequent = stats::most_frequent(observed.iter().flatten().map(String::as_str));
        if most_frequent.is_none() {
            warn!("Categorical column '{column}' has no observed values; all indicators will be zero");
        }
        let mut vocabulary: BTreeSet<String> = observed.into_iter().flatten().collect();
        if let Some(fill) = &most_frequent {
            vocabulary.insert(fill.clone());
        }
        let categories: Vec<String> = vocabulary.into_iter().collect();
        debug!("{column}: {} categories, mode={most_frequent:?}", categories.len());
        categorical.push(CategoricalParams {
            column: column.clone(),
            most_frequent,
            categories,
        });
    }

    // The identifier must resolve on the reference data.
    records[0].category(&config.id_column)?;

    let fitted = FittedEncoder {
        numeric,
        categorical,
        id_column: config.id_column.clone(),
    };
    info!(
        "Fitted encoder on {} rows: {} feature columns",
        records.len(),
        fitted.feature_names().len()
    );
    Ok(fitted)
}

impl FittedEncoder {
    /// Names of the encoded feature columns, identifier excluded.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.numeric.iter().map(|p| p.column.clone()).collect();
        for params in &self.categorical {
            names.extend(
                params
                    .indicator_categories()
                    .iter()
                    .map(|category| format!("{}_{}", params.column, category)),
            );
        }
        names
    }

    pub fn encode_record(&self, record: &EnrichedRecord, row: usize) -> PipelineResult<FeatureRow> {
        let mut values = Vec::new();
        for params in &self.numeric {
            let value = record.numeric_field(&params.column)?.unwrap_or(params.median);
            values.push(params.standardization.apply(value));
        }
        for params in &self.categorical {
            let value = record.category(&params.column)?;
            params.encode_into(value.as_deref(), &mut values);
        }
        let id = record
            .category(&self.id_column)?
            .ok_or_else(|| PipelineError::Parse {
                row,
                field: self.id_column.clone(),
                message: "identifier is missing".to_string(),
            })?;
        Ok(FeatureRow { values, id })
    }

    pub fn apply(&self, records: &[EnrichedRecord]) -> PipelineResult<FeatureBlock> {
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| self.encode_record(record, index + 1))
            .collect::<PipelineResult<Vec<_>>>()?;
        Ok(FeatureBlock {
            columns: self.feature_names(),
            id_column: self.id_column.clone(),
            rows,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> PipelineResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}
