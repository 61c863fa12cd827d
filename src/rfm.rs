use std::collections::BTreeMap;

use chrono::{Duration, NaiveDateTime};
use log::info;
use serde::{Deserialize, Serialize};

use crate::csv_reader::Transaction;
use crate::error::PipelineResult;
use crate::features::{missing_value, parse_record_timestamp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmVector {
    pub customer_id: String,
    /// Whole days between the customer's last transaction and the snapshot date.
    pub recency: i64,
    pub frequency: usize,
    pub monetary: f64,
}

impl RfmVector {
    pub fn as_array(&self) -> [f64; 3] {
        [self.recency as f64, self.frequency as f64, self.monetary]
    }
}

/// Which columns feed the RFM computation.
#[derive(Debug, Clone, Copy)]
pub struct RfmColumns<'a> {
    pub group: &'a str,
    pub amount: &'a str,
    pub timestamp: &'a str,
}

/// One day past the latest timestamp, so every recency is at least one day.
pub fn snapshot_date(latest: NaiveDateTime) -> NaiveDateTime {
    latest + Duration::days(1)
}

// RFM vectors ordered by customer id. A row without a customer or amount aborts the run.
pub fn calculate_rfm(
    transactions: &[Transaction],
    columns: RfmColumns<'_>,
) -> PipelineResult<Vec<RfmVector>> {
    struct Running {
        last_seen: NaiveDateTime,
        count: usize,
        total: f64,
    }

    let mut customers: BTreeMap<&str, Running> = BTreeMap::new();
    for (index, tx) in transactions.iter().enumerate() {
        let row = index + 1;
        let timestamp = parse_record_timestamp(tx, row, columns.timestamp)?;
        let customer = tx
            .text_field(columns.group)?
            .ok_or_else(|| missing_value(row, columns.group))?;
        let amount = tx
            .numeric_field(columns.amount)?
            .ok_or_else(|| missing_value(row, columns.amount))?;

        let entry = customers.entry(customer).or_insert(Running {
            last_seen: timestamp,
            count: 0,
            total: 0.0,
        });
        entry.last_seen = entry.last_seen.max(timestamp);
        entry.count += 1;
        entry.total += amount;
    }

    let Some(latest) = customers.values().map(|c| c.last_seen).max() else {
        return Ok(Vec::new());
    };
    let snapshot = snapshot_date(latest);

    let rfm: Vec<RfmVector> = customers
        .into_iter()
        .map(|(customer_id, running)| RfmVector {
            customer_id: customer_id.to_string(),
            recency: (snapshot - running.last_seen).num_days(),
            frequency: running.count,
            monetary: running.total,
        })
        .collect();

    info!(
        "RFM computed for {} customers (snapshot {})",
        rfm.len(),
        snapshot
    );
    Ok(rfm)
}
