//! Behavioral segmentation of customers by standardized RFM vectors.

use std::collections::BTreeSet;

use linfa::prelude::Predict;
use linfa::traits::Fit;
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use log::{debug, info};
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::rfm::RfmVector;
use crate::stats::Standardization;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub n_clusters: usize,
    pub seed: u64,
    pub max_iterations: u64,
    pub tolerance: f64,
    /// Independent k-means++ restarts; the lowest inertia wins.
    pub n_runs: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            n_clusters: 3,
            seed: 42,
            max_iterations: 300,
            tolerance: 1e-4,
            n_runs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub customer_id: String,
    pub cluster: usize,
}

/// Standardizes each RFM dimension on the given set and returns the scaled matrix.
pub fn standardize_rfm(rfm: &[RfmVector]) -> Array2<f64> {
    let mut data = Array2::zeros((rfm.len(), 3));
    for dim in 0..3 {
        let column: Vec<f64> = rfm.iter().map(|v| v.as_array()[dim]).collect();
        let scaler = Standardization::fit(&column);
        for (i, &value) in column.iter().enumerate() {
            data[[i, dim]] = scaler.apply(value);
        }
    }
    data
}

fn distinct_vectors(rfm: &[RfmVector]) -> usize {
    rfm.iter()
        .map(|v| v.as_array().map(f64::to_bits))
        .collect::<BTreeSet<_>>()
        .len()
}

/// Assigns every customer a cluster id in `0..n_clusters`.
///
/// The run is seeded from `config.seed`, so identical input yields identical
/// ids. Which id ends up meaning "high risk" is not stable across datasets;
/// callers must derive it from the cluster profiles.
pub fn segment_customers(
    rfm: &[RfmVector],
    config: &SegmentationConfig,
) -> PipelineResult<Vec<ClusterAssignment>> {
    let k = config.n_clusters;
    if k == 0 {
        return Err(PipelineError::Config(
            "cluster count must be at least 1".to_string(),
        ));
    }

    let distinct = distinct_vectors(rfm);
    if rfm.len() < k || distinct < k {
        return Err(PipelineError::DegenerateCluster {
            customers: rfm.len(),
            distinct,
            clusters: k,
        });
    }

    let dataset = DatasetBase::from(standardize_rfm(rfm));
    let rng = Pcg64Mcg::seed_from_u64(config.seed);
    let model = KMeans::params_with_rng(k, rng)
        .max_n_iterations(config.max_iterations)
        .tolerance(config.tolerance)
        .n_runs(config.n_runs.max(1))
        .fit(&dataset)
        .map_err(|err| PipelineError::Clustering(err.to_string()))?;

    let labels: Array1<usize> = model.predict(dataset.records());

    let mut sizes = vec![0usize; k];
    for &label in labels.iter() {
        sizes[label] += 1;
    }
    debug!("Cluster sizes: {sizes:?}");
    info!("Segmented {} customers into {k} clusters", rfm.len());

    Ok(rfm
        .iter()
        .zip(labels.iter())
        .map(|(vector, &cluster)| ClusterAssignment {
            customer_id: vector.customer_id.clone(),
            cluster,
        })
        .collect())
}
