//! End-to-end runs of the labeling pipeline over in-memory transactions.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use risk_proxy::csv_reader::{read_transactions, Transaction};
use risk_proxy::{pipeline, run, PipelineConfig, PipelineError};

fn at(days: i64) -> String {
    let base = NaiveDate::from_ymd_opt(2019, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    (base + Duration::days(days))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

fn transaction(id: usize, customer: &str, amount: f64, day: i64, category: &str) -> Transaction {
    Transaction {
        transaction_id: format!("TransactionId_{id}"),
        batch_id: format!("BatchId_{id}"),
        account_id: format!("AccountId_{customer}"),
        subscription_id: format!("SubscriptionId_{customer}"),
        customer_id: customer.to_string(),
        currency_code: "UGX".to_string(),
        country_code: "256".to_string(),
        provider_id: format!("ProviderId_{}", id % 3),
        product_id: format!("ProductId_{}", id % 5),
        product_category: category.to_string(),
        channel_id: format!("ChannelId_{}", id % 2 + 1),
        amount,
        value: amount.abs(),
        transaction_start_time: at(day),
        pricing_strategy: None,
        fraud_result: None,
    }
}

/// Customer A: 5 transactions, last one day before the snapshot, 10000 in total.
/// Customer B: a single transaction 200 days before the snapshot, worth 5.
fn scenario_transactions() -> Vec<Transaction> {
    let mut txs: Vec<Transaction> = (0..5)
        .map(|i| transaction(i, "A", 2000.0, 200 + i as i64 - 4, "airtime"))
        .collect();
    txs.push(transaction(5, "B", 5.0, 1, "utility_bill"));
    txs
}

fn synthetic_transactions(seed: u64, customers: usize) -> Vec<Transaction> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let categories = ["airtime", "financial_services", "utility_bill", "data_bundles"];
    let mut txs = Vec::new();
    for c in 0..customers {
        let customer = format!("CustomerId_{c}");
        let dormant = c % 4 == 0;
        let count = if dormant { 1 } else { rng.gen_range(3..12) };
        for _ in 0..count {
            let day = if dormant { rng.gen_range(0..60) } else { rng.gen_range(250..365) };
            let amount = if dormant {
                rng.gen_range(1.0..50.0)
            } else {
                rng.gen_range(100.0..5000.0)
            };
            let category = categories[rng.gen_range(0..categories.len())];
            txs.push(transaction(txs.len(), &customer, amount, day, category));
        }
    }
    txs
}

#[test]
fn dormant_low_value_customer_is_high_risk() {
    let mut config = PipelineConfig::default();
    config.segmentation.n_clusters = 2;

    let output = run(&scenario_transactions(), &config).expect("pipeline run");
    let rfm: BTreeMap<&str, _> = output
        .rfm
        .iter()
        .map(|v| (v.customer_id.as_str(), v))
        .collect();
    assert_eq!(rfm["A"].recency, 1);
    assert_eq!(rfm["B"].recency, 200);
    assert_eq!(rfm["A"].monetary, 10000.0);

    assert_eq!(output.risk.label("A"), 0);
    assert_eq!(output.risk.label("B"), 1);
}

#[test]
fn dormant_customer_is_high_risk_with_three_segments() {
    let mut txs = scenario_transactions();
    txs.extend((0..3).map(|i| transaction(10 + i, "C", 150.0, 150 + i as i64, "airtime")));

    let output = run(&txs, &PipelineConfig::default()).expect("pipeline run");
    assert_eq!(output.risk.profiles.len(), 3);
    assert_eq!(output.risk.label("A"), 0);
    assert_eq!(output.risk.label("B"), 1);
    assert_eq!(output.risk.label("C"), 0);
}

#[test]
fn single_customer_is_degenerate() {
    let txs: Vec<Transaction> = (0..4).map(|i| transaction(i, "A", 10.0, i as i64, "airtime")).collect();
    match run(&txs, &PipelineConfig::default()) {
        Err(PipelineError::DegenerateCluster {
            customers, clusters, ..
        }) => {
            assert_eq!(customers, 1);
            assert_eq!(clusters, 3);
        }
        other => panic!("Expected a degenerate cluster error, got {other:?}"),
    }
}

#[test]
fn same_seed_produces_identical_labels() {
    let txs = synthetic_transactions(0xC0FF_EE00, 40);
    let config = PipelineConfig::default();

    let first = run(&txs, &config).expect("first run");
    let second = run(&txs, &config).expect("second run");

    assert_eq!(first.risk.clusters, second.risk.clusters, "Cluster ids diverged");
    assert_eq!(first.risk.labels, second.risk.labels, "Labels diverged");
    assert_eq!(first.dataset, second.dataset, "Datasets diverged");
}

#[test]
fn exactly_one_cluster_is_high_risk() {
    let output = run(&synthetic_transactions(11, 40), &PipelineConfig::default()).unwrap();
    let risk = &output.risk;

    let high_risk_size = risk
        .profiles
        .iter()
        .find(|p| p.cluster == risk.high_risk_cluster)
        .map(|p| p.size)
        .expect("high-risk cluster has a profile");
    assert_eq!(risk.high_risk_count(), high_risk_size);
    for (customer, &label) in &risk.labels {
        let in_cluster = risk.clusters[customer] == risk.high_risk_cluster;
        assert_eq!(label == 1, in_cluster, "Label must follow cluster for {customer}");
    }
}

#[test]
fn customer_level_values_are_broadcast_to_every_row() {
    let txs = synthetic_transactions(3, 24);
    let output = run(&txs, &PipelineConfig::default()).unwrap();
    let dataset = &output.dataset;

    assert_eq!(dataset.len(), txs.len(), "One output row per transaction");
    assert_eq!(dataset.header().last().map(String::as_str), Some("is_high_risk"));

    let aggregate_cols: Vec<usize> = ["TotalAmount", "AvgAmount", "StdAmount"]
        .iter()
        .map(|c| dataset.columns.iter().position(|x| x == c).unwrap())
        .collect();
    let mut seen: BTreeMap<&str, (Vec<f64>, u8)> = BTreeMap::new();
    for row in &dataset.rows {
        let values: Vec<f64> = aggregate_cols.iter().map(|&i| row.values[i]).collect();
        let entry = seen.entry(row.id.as_str()).or_insert((values.clone(), row.label));
        assert_eq!(entry.0, values, "Aggregates differ within {}", row.id);
        assert_eq!(entry.1, row.label, "Labels differ within {}", row.id);
    }
}

#[test]
fn fitted_encoder_applies_to_new_data() {
    let config = PipelineConfig::default();
    let output = run(&synthetic_transactions(5, 20), &config).unwrap();

    let mut fresh = synthetic_transactions(99, 6);
    fresh[0].product_category = "never_seen_before".to_string();
    let block = pipeline::transform(&fresh, &output.encoder, &config).unwrap();

    assert_eq!(block.columns, output.dataset.columns, "Layout is fixed at fit time");
    assert_eq!(block.len(), fresh.len());

    let category_cols = block.indicator_indices("ProductCategory");
    assert!(!category_cols.is_empty(), "Fitted vocabulary has indicator columns");
    for i in category_cols {
        assert_eq!(
            block.rows[0].values[i], 0.0,
            "Unseen category must encode as all zeros"
        );
    }
}

#[test]
fn run_file_writes_labeled_csv() {
    let dir = std::env::temp_dir().join(format!("risk_proxy_{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let input = dir.join("data.csv");
    let output = dir.join("processed.csv");

    let mut wtr = csv::Writer::from_path(&input).unwrap();
    for tx in synthetic_transactions(8, 12) {
        wtr.serialize(tx).unwrap();
    }
    wtr.flush().unwrap();

    let loaded = read_transactions(&input).unwrap();
    let result = risk_proxy::run_file(&input, &output, &PipelineConfig::default()).unwrap();

    let written = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), loaded.len() + 1, "Header plus one line per transaction");
    assert_eq!(lines[0].split(',').count(), result.dataset.header().len());
    assert!(lines[0].ends_with("CustomerId,is_high_risk"));

    std::fs::remove_dir_all(&dir).ok();
}
