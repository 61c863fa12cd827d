use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;
use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Columns every input file must carry, in the order they are documented.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "TransactionId",
    "BatchId",
    "AccountId",
    "SubscriptionId",
    "CustomerId",
    "CurrencyCode",
    "CountryCode",
    "ProviderId",
    "ProductId",
    "ProductCategory",
    "ChannelId",
    "Amount",
    "Value",
    "TransactionStartTime",
];

/// Columns that may be absent from the input file.
pub const OPTIONAL_COLUMNS: &[&str] = &["PricingStrategy", "FraudResult"];

/// Whether a named column holds text or numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
}

/// A borrowed cell value. `None` marks a missing value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(Option<&'a str>),
    Number(Option<f64>),
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Transaction {
    #[serde(rename = "TransactionId")]
    pub transaction_id: String,
    #[serde(rename = "BatchId")]
    pub batch_id: String,
    #[serde(rename = "AccountId")]
    pub account_id: String,
    #[serde(rename = "SubscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "CustomerId")]
    pub customer_id: String,
    #[serde(rename = "CurrencyCode")]
    pub currency_code: String,
    #[serde(rename = "CountryCode")]
    pub country_code: String,
    #[serde(rename = "ProviderId")]
    pub provider_id: String,
    #[serde(rename = "ProductId")]
    pub product_id: String,
    #[serde(rename = "ProductCategory")]
    pub product_category: String,
    #[serde(rename = "ChannelId")]
    pub channel_id: String,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Value")]
    pub value: f64,
    #[serde(rename = "TransactionStartTime")]
    pub transaction_start_time: String,
    #[serde(rename = "PricingStrategy", default)]
    pub pricing_strategy: Option<String>,
    #[serde(rename = "FraudResult", default)]
    pub fraud_result: Option<u8>,
}

impl Transaction {
    /// Look up a raw column by its input-file name.
    /// Returns `None` when the name is not a column of the input schema.
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        let value = match name {
            "TransactionId" => text(&self.transaction_id),
            "BatchId" => text(&self.batch_id),
            "AccountId" => text(&self.account_id),
            "SubscriptionId" => text(&self.subscription_id),
            "CustomerId" => text(&self.customer_id),
            "CurrencyCode" => text(&self.currency_code),
            "CountryCode" => text(&self.country_code),
            "ProviderId" => text(&self.provider_id),
            "ProductId" => text(&self.product_id),
            "ProductCategory" => text(&self.product_category),
            "ChannelId" => text(&self.channel_id),
            "TransactionStartTime" => text(&self.transaction_start_time),
            "PricingStrategy" => FieldValue::Text(
                self.pricing_strategy
                    .as_deref()
                    .filter(|s| !s.trim().is_empty()),
            ),
            "Amount" => number(self.amount),
            "Value" => number(self.value),
            "FraudResult" => FieldValue::Number(self.fraud_result.map(f64::from)),
            _ => return None,
        };
        Some(value)
    }

    /// Kind of a raw column, without needing a record.
    pub fn field_kind(name: &str) -> Option<FieldKind> {
        match name {
            "Amount" | "Value" | "FraudResult" => Some(FieldKind::Number),
            _ if REQUIRED_COLUMNS.contains(&name) || OPTIONAL_COLUMNS.contains(&name) => {
                Some(FieldKind::Text)
            }
            _ => None,
        }
    }

    /// Text column accessor that reports unknown or non-text columns as schema errors.
    pub fn text_field(&self, name: &str) -> PipelineResult<Option<&str>> {
        match self.field(name) {
            Some(FieldValue::Text(value)) => Ok(value),
            Some(FieldValue::Number(_)) => Err(PipelineError::wrong_kind(name, "text")),
            None => Err(PipelineError::missing_column(name)),
        }
    }

    /// Numeric column accessor that reports unknown or non-numeric columns as schema errors.
    pub fn numeric_field(&self, name: &str) -> PipelineResult<Option<f64>> {
        match self.field(name) {
            Some(FieldValue::Number(value)) => Ok(value),
            Some(FieldValue::Text(_)) => Err(PipelineError::wrong_kind(name, "numeric")),
            None => Err(PipelineError::missing_column(name)),
        }
    }
}

fn text(value: &str) -> FieldValue<'_> {
    if value.trim().is_empty() {
        FieldValue::Text(None)
    } else {
        FieldValue::Text(Some(value))
    }
}

fn number(value: f64) -> FieldValue<'static> {
    if value.is_finite() {
        FieldValue::Number(Some(value))
    } else {
        FieldValue::Number(None)
    }
}

/// Fails with a schema error naming the first required column absent from the header.
pub fn validate_headers(headers: &StringRecord) -> PipelineResult<()> {
    for required in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == *required) {
            return Err(PipelineError::missing_column(required));
        }
    }
    Ok(())
}

pub fn read_transactions<P: AsRef<Path>>(file_path: P) -> PipelineResult<Vec<Transaction>> {
    let file = File::open(file_path.as_ref())?;
    info!("Reading transactions from {}", file_path.as_ref().display());
    read_transactions_from_reader(file)
}

/// Reads every record or none: the first malformed row aborts the load.
pub fn read_transactions_from_reader<R: Read>(reader: R) -> PipelineResult<Vec<Transaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    validate_headers(&headers)?;

    let mut transactions = Vec::new();
    for (index, result) in rdr.deserialize::<Transaction>().enumerate() {
        let transaction = result.map_err(|err| parse_error(index + 1, &headers, err))?;
        check_finite(&transaction, index + 1)?;
        transactions.push(transaction);
    }

    info!("Loaded {} transactions", transactions.len());
    Ok(transactions)
}

// Amount and Value must be finite; NaN and inf parse as f64 otherwise
fn check_finite(tx: &Transaction, row: usize) -> PipelineResult<()> {
    for (field, value) in [("Amount", tx.amount), ("Value", tx.value)] {
        if !value.is_finite() {
            return Err(PipelineError::Parse {
                row,
                field: field.to_string(),
                message: format!("non-finite value {value}"),
            });
        }
    }
    Ok(())
}

fn parse_error(row: usize, headers: &StringRecord, err: csv::Error) -> PipelineError {
    let field = match err.kind() {
        csv::ErrorKind::Deserialize { err: de, .. } => de
            .field()
            .and_then(|index| headers.get(index as usize))
            .unwrap_or("<record>")
            .to_string(),
        _ => "<record>".to_string(),
    };
    PipelineError::Parse {
        row,
        field,
        message: err.to_string(),
    }
}
