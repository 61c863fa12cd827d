//! Feature engineering and proxy risk labeling for transaction data.
//!
//! Transactions are turned into an encoded feature block (one row per
//! transaction) and, independently, into RFM-based customer segments from
//! which a heuristic high-risk label is derived. The two are joined into a
//! training dataset by customer identifier.

pub mod assembler;
pub mod config;
pub mod csv_reader;
pub mod encoder;
pub mod error;
pub mod features;
pub mod kmeans;
pub mod labeling;
pub mod pipeline;
pub mod rfm;
pub mod serving;
pub mod stats;


pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use pipeline::{run, run_file, PipelineOutput};
