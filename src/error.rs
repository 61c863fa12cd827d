use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Schema error: column '{column}' {context}")]
    Schema { column: String, context: String },

    #[error("Parse error at row {row}, field '{field}': {message}")]
    Parse {
        row: usize,
        field: String,
        message: String,
    },

    #[error(
        "Degenerate clustering: {customers} customers ({distinct} distinct RFM vectors) cannot form {clusters} clusters"
    )]
    DegenerateCluster {
        customers: usize,
        distinct: usize,
        clusters: usize,
    },

    #[error("Clustering failed: {0}")]
    Clustering(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn missing_column(column: &str) -> Self {
        Self::Schema {
            column: column.to_string(),
            context: "is missing".to_string(),
        }
    }

    pub fn wrong_kind(column: &str, expected: &str) -> Self {
        Self::Schema {
            column: column.to_string(),
            context: format!("is not a {expected} column"),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
