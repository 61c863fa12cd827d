// Command-line entry point: builds the labeled training dataset from a raw
// transactions file and reports the customer segments behind the proxy label.
//
// Usage:
//   risk_proxy --input data.csv --output processed.csv [--config pipeline.json]
//              [--encoder-out encoder.json] [--labels-out labels.csv]

use std::env;

use anyhow::{Context, Result};
use log::info;
use risk_proxy::labeling::{ClusterProfile, RiskLabels};
use risk_proxy::PipelineConfig;

const DEFAULT_INPUT: &str = "data/raw/data.csv";
const DEFAULT_OUTPUT: &str = "data/processed/processed_transactions.csv";

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

// Prints one segment's profile and whether it carries the proxy label
fn print_cluster_profile(profile: &ClusterProfile, high_risk: bool, total: usize) {
    println!("\nCluster {}{}", profile.cluster, if high_risk { " (HIGH RISK)" } else { "" });
    println!(
        "Size: {} customers ({:.1}%)",
        profile.size,
        profile.size as f64 / total.max(1) as f64 * 100.0
    );
    println!("Avg Recency: {:.1} days", profile.mean_recency);
    println!("Avg Frequency: {:.1} transactions", profile.mean_frequency);
    println!("Avg Monetary: {:.2}", profile.mean_monetary);
}

fn print_segments(risk: &RiskLabels) {
    let total = risk.labels.len();
    println!("Customer segments (k={}):", risk.profiles.len());
    for profile in &risk.profiles {
        print_cluster_profile(profile, profile.cluster == risk.high_risk_cluster, total);
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let input = arg_value(&args, "--input").unwrap_or(DEFAULT_INPUT);
    let output = arg_value(&args, "--output").unwrap_or(DEFAULT_OUTPUT);

    let config = match arg_value(&args, "--config") {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => PipelineConfig::default(),
    };

    if let Some(parent) = std::path::Path::new(output).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }

    let result = risk_proxy::run_file(input, output, &config)
        .with_context(|| format!("processing {input}"))?;

    if let Some(path) = arg_value(&args, "--encoder-out") {
        result.encoder.save(path)?;
        info!("Saved fitted encoder to {path}");
    }
    if let Some(path) = arg_value(&args, "--labels-out") {
        result
            .risk
            .write_csv(path, &config.id_column, &config.label_column)?;
        info!("Saved customer labels to {path}");
    }

    print_segments(&result.risk);

    println!("\nOverall:");
    println!("Transactions: {}", result.dataset.len());
    println!("Customers: {}", result.risk.labels.len());
    println!("High-risk customers: {}", result.risk.high_risk_count());
    println!(
        "High-risk transaction share: {:.2}%",
        result.dataset.positive_rate() * 100.0
    );
    println!("Processed dataset saved at: {output}");

    Ok(())
}
