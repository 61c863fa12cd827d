use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use linfa::{Dataset, DatasetBase};
use log::{info, warn};
use ndarray::{Array1, Array2, Ix1};

use crate::encoder::FeatureBlock;
use crate::error::PipelineResult;

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub values: Vec<f64>,
    pub id: String,
    pub label: u8,
}

/// Final training table: one row per transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledDataset {
    pub columns: Vec<String>,
    pub id_column: String,
    pub label_column: String,
    pub rows: Vec<LabeledRow>,
}

/// Left join on the identifier. Unmatched rows get label 0; no row is dropped.
pub fn assemble(
    block: FeatureBlock,
    labels: &BTreeMap<String, u8>,
    label_column: &str,
) -> LabeledDataset {
    let mut unmatched = 0usize;
    let rows: Vec<LabeledRow> = block
        .rows
        .into_iter()
        .map(|row| {
            let label = match labels.get(&row.id) {
                Some(&label) => label,
                None => {
                    unmatched += 1;
                    0
                }
            };
            LabeledRow {
                values: row.values,
                id: row.id,
                label,
            }
        })
        .collect();

    if unmatched > 0 {
        warn!("{unmatched} rows had no proxy label; defaulted to 0");
    }
    info!("Assembled {} labeled rows", rows.len());

    LabeledDataset {
        columns: block.columns,
        id_column: block.id_column,
        label_column: label_column.to_string(),
        rows,
    }
}

impl LabeledDataset {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn header(&self) -> Vec<String> {
        let mut header = self.columns.clone();
        header.push(self.id_column.clone());
        header.push(self.label_column.clone());
        header
    }

    pub fn positive_rate(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().filter(|r| r.label == 1).count() as f64 / self.rows.len() as f64
    }

    /// Features without the identifier column, as a trainer consumes them.
    pub fn feature_matrix(&self) -> Array2<f64> {
        Array2::from_shape_fn((self.rows.len(), self.columns.len()), |(i, j)| {
            self.rows[i].values[j]
        })
    }

    pub fn targets(&self) -> Array1<usize> {
        self.rows.iter().map(|r| usize::from(r.label)).collect()
    }

    pub fn to_training_dataset(&self) -> Dataset<f64, usize, Ix1> {
        DatasetBase::new(self.feature_matrix(), self.targets())
            .with_feature_names(self.columns.clone())
    }

    pub fn write_to<W: Write>(&self, writer: W) -> PipelineResult<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header())?;
        for row in &self.rows {
            let mut record: Vec<String> = row.values.iter().map(f64::to_string).collect();
            record.push(row.id.clone());
            record.push(row.label.to_string());
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> PipelineResult<()> {
        self.write_to(File::create(path)?)
    }
}
