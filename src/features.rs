//! Per-transaction feature rows: customer aggregates broadcast back onto every
//! transaction, and calendar fields decomposed from the transaction timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::csv_reader::{FieldKind, FieldValue, Transaction};
use crate::error::{PipelineError, PipelineResult};
use crate::stats;

pub const TOTAL_AMOUNT: &str = "TotalAmount";
pub const AVG_AMOUNT: &str = "AvgAmount";
pub const TRANSACTION_COUNT: &str = "TransactionCount";
pub const STD_AMOUNT: &str = "StdAmount";

pub const TRANSACTION_HOUR: &str = "TransactionHour";
pub const TRANSACTION_DAY: &str = "TransactionDay";
pub const TRANSACTION_MONTH: &str = "TransactionMonth";
pub const TRANSACTION_YEAR: &str = "TransactionYear";
pub const TRANSACTION_WEEKDAY: &str = "TransactionWeekday";

pub const AGGREGATE_COLUMNS: &[&str] = &[TOTAL_AMOUNT, AVG_AMOUNT, TRANSACTION_COUNT, STD_AMOUNT];
pub const TEMPORAL_COLUMNS: &[&str] = &[
    TRANSACTION_HOUR,
    TRANSACTION_DAY,
    TRANSACTION_MONTH,
    TRANSACTION_YEAR,
    TRANSACTION_WEEKDAY,
];

/// Summary of one customer's transaction amounts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomerAggregate {
    pub total_amount: f64,
    pub avg_amount: f64,
    pub transaction_count: usize,
    /// Sample standard deviation; `None` for a customer with a single transaction.
    pub std_amount: Option<f64>,
}

impl CustomerAggregate {
    pub fn from_amounts(amounts: &[f64]) -> Self {
        Self {
            total_amount: amounts.iter().sum(),
            avg_amount: stats::mean(amounts).unwrap_or(0.0),
            transaction_count: amounts.len(),
            std_amount: stats::sample_std(amounts),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    pub year: i32,
    /// Monday = 0.
    pub weekday: u32,
}

impl TemporalFeatures {
    pub fn from_datetime(timestamp: NaiveDateTime) -> Self {
        Self {
            hour: timestamp.hour(),
            day: timestamp.day(),
            month: timestamp.month(),
            year: timestamp.year(),
            weekday: timestamp.weekday().num_days_from_monday(),
        }
    }
}

/// A transaction plus the derived columns computed so far.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub transaction: Transaction,
    pub aggregate: Option<CustomerAggregate>,
    pub temporal: Option<TemporalFeatures>,
}

impl From<Transaction> for EnrichedRecord {
    fn from(transaction: Transaction) -> Self {
        Self {
            transaction,
            aggregate: None,
            temporal: None,
        }
    }
}

impl EnrichedRecord {
    /// Look up a raw or derived column. Derived columns exist only once their stage has run.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        if let Some(aggregate) = &self.aggregate {
            let value = match name {
                TOTAL_AMOUNT => Some(aggregate.total_amount),
                AVG_AMOUNT => Some(aggregate.avg_amount),
                TRANSACTION_COUNT => Some(aggregate.transaction_count as f64),
                STD_AMOUNT => aggregate.std_amount,
                _ => return self.temporal_field(name),
            };
            return Some(FieldValue::Number(value));
        }
        self.temporal_field(name)
    }

    fn temporal_field(&self, name: &str) -> Option<FieldValue<'_>> {
        if let Some(temporal) = &self.temporal {
            let value = match name {
                TRANSACTION_HOUR => temporal.hour as f64,
                TRANSACTION_DAY => temporal.day as f64,
                TRANSACTION_MONTH => temporal.month as f64,
                TRANSACTION_YEAR => temporal.year as f64,
                TRANSACTION_WEEKDAY => temporal.weekday as f64,
                _ => return self.transaction.field(name),
            };
            return Some(FieldValue::Number(Some(value)));
        }
        self.transaction.field(name)
    }

    /// Kind of any raw or derived column name.
    pub fn field_kind(name: &str) -> Option<FieldKind> {
        if AGGREGATE_COLUMNS.contains(&name) || TEMPORAL_COLUMNS.contains(&name) {
            return Some(FieldKind::Number);
        }
        Transaction::field_kind(name)
    }

    pub fn numeric_field(&self, name: &str) -> PipelineResult<Option<f64>> {
        match self.field(name) {
            Some(FieldValue::Number(value)) => Ok(value),
            Some(FieldValue::Text(_)) => Err(PipelineError::wrong_kind(name, "numeric")),
            None => Err(PipelineError::missing_column(name)),
        }
    }

    /// Categorical view of a column; numeric values are rendered as text.
    pub fn category(&self, name: &str) -> PipelineResult<Option<String>> {
        match self.field(name) {
            Some(FieldValue::Text(value)) => Ok(value.map(str::to_string)),
            Some(FieldValue::Number(value)) => Ok(value.map(|v| v.to_string())),
            None => Err(PipelineError::missing_column(name)),
        }
    }
}

/// Groups amounts by customer key. A row without a key aborts the computation.
pub fn aggregate_by_customer<'a, I>(
    transactions: I,
    group_column: &str,
    amount_column: &str,
) -> PipelineResult<BTreeMap<String, CustomerAggregate>>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut amounts: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for (index, tx) in transactions.into_iter().enumerate() {
        let key = tx
            .text_field(group_column)?
            .ok_or_else(|| missing_value(index + 1, group_column))?;
        let amount = tx
            .numeric_field(amount_column)?
            .ok_or_else(|| missing_value(index + 1, amount_column))?;
        amounts.entry(key.to_string()).or_default().push(amount);
    }

    Ok(amounts
        .into_iter()
        .map(|(customer, values)| (customer, CustomerAggregate::from_amounts(&values)))
        .collect())
}

/// Attaches the owning customer's aggregate to every row. Row count and order are preserved.
pub fn add_aggregate_features(
    records: Vec<EnrichedRecord>,
    group_column: &str,
    amount_column: &str,
) -> PipelineResult<Vec<EnrichedRecord>> {
    let aggregates = aggregate_by_customer(
        records.iter().map(|r| &r.transaction),
        group_column,
        amount_column,
    )?;
    let single = aggregates
        .values()
        .filter(|a| a.std_amount.is_none())
        .count();
    debug!("{single} customers have an undefined amount deviation");

    let enriched = records
        .into_iter()
        .map(|record| {
            // Every key was inserted while building `aggregates`.
            let aggregate = record
                .transaction
                .text_field(group_column)
                .ok()
                .flatten()
                .and_then(|key| aggregates.get(key))
                .copied();
            EnrichedRecord {
                aggregate,
                ..record
            }
        })
        .collect::<Vec<_>>();

    info!(
        "Aggregate features: {} rows across {} customers",
        enriched.len(),
        aggregates.len()
    );
    Ok(enriched)
}

/// Adds calendar columns. Any unparseable timestamp fails the whole batch.
pub fn add_temporal_features(
    records: Vec<EnrichedRecord>,
    timestamp_column: &str,
) -> PipelineResult<Vec<EnrichedRecord>> {
    let mut enriched = Vec::with_capacity(records.len());
    for (index, record) in records.into_iter().enumerate() {
        let timestamp = parse_record_timestamp(&record.transaction, index + 1, timestamp_column)?;
        enriched.push(EnrichedRecord {
            temporal: Some(TemporalFeatures::from_datetime(timestamp)),
            ..record
        });
    }
    info!("Temporal features: {} rows", enriched.len());
    Ok(enriched)
}

pub(crate) fn parse_record_timestamp(
    tx: &Transaction,
    row: usize,
    timestamp_column: &str,
) -> PipelineResult<NaiveDateTime> {
    let raw = tx
        .text_field(timestamp_column)?
        .ok_or_else(|| missing_value(row, timestamp_column))?;
    parse_timestamp(raw).ok_or_else(|| PipelineError::Parse {
        row,
        field: timestamp_column.to_string(),
        message: format!("unrecognised timestamp '{raw}'"),
    })
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
];

/// Parses RFC 3339 (converted to UTC), naive date-times, or bare dates at midnight.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(raw) {
        return Some(zoned.naive_utc());
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub(crate) fn missing_value(row: usize, field: &str) -> PipelineError {
    PipelineError::Parse {
        row,
        field: field.to_string(),
        message: "value is missing".to_string(),
    }
}
