//! Proxy risk labels derived from cluster RFM profiles.
//!
//! The label is a heuristic, not ground truth: the segment whose customers
//! transacted longest ago, least often and for the least money is assumed to
//! be the risky one. Anything trained on these labels is bounded by how well
//! that assumption holds.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::kmeans::ClusterAssignment;
use crate::rfm::RfmVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RfmMetric {
    Recency,
    Frequency,
    Monetary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One key of the high-risk ranking. Earlier criteria take priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankCriterion {
    pub metric: RfmMetric,
    pub order: SortOrder,
}

/// Recency descending, then frequency ascending, then monetary ascending.
pub fn default_ranking() -> Vec<RankCriterion> {
    vec![
        RankCriterion {
            metric: RfmMetric::Recency,
            order: SortOrder::Descending,
        },
        RankCriterion {
            metric: RfmMetric::Frequency,
            order: SortOrder::Ascending,
        },
        RankCriterion {
            metric: RfmMetric::Monetary,
            order: SortOrder::Ascending,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterProfile {
    pub cluster: usize,
    pub size: usize,
    pub mean_recency: f64,
    pub mean_frequency: f64,
    pub mean_monetary: f64,
}

impl ClusterProfile {
    pub fn metric(&self, metric: RfmMetric) -> f64 {
        match metric {
            RfmMetric::Recency => self.mean_recency,
            RfmMetric::Frequency => self.mean_frequency,
            RfmMetric::Monetary => self.mean_monetary,
        }
    }
}

fn join_assignments<'a>(
    rfm: &'a [RfmVector],
    assignments: &[ClusterAssignment],
) -> PipelineResult<Vec<(&'a RfmVector, usize)>> {
    let clusters: BTreeMap<&str, usize> = assignments
        .iter()
        .map(|a| (a.customer_id.as_str(), a.cluster))
        .collect();
    rfm.iter()
        .map(|vector| {
            clusters
                .get(vector.customer_id.as_str())
                .map(|&cluster| (vector, cluster))
                .ok_or_else(|| {
                    PipelineError::Clustering(format!(
                        "customer '{}' has no cluster assignment",
                        vector.customer_id
                    ))
                })
        })
        .collect()
}

/// Mean R/F/M per non-empty cluster, ordered by cluster id.
pub fn profile_clusters(
    rfm: &[RfmVector],
    assignments: &[ClusterAssignment],
) -> PipelineResult<Vec<ClusterProfile>> {
    let mut sums: BTreeMap<usize, (usize, [f64; 3])> = BTreeMap::new();
    for (vector, cluster) in join_assignments(rfm, assignments)? {
        let entry = sums.entry(cluster).or_insert((0, [0.0; 3]));
        entry.0 += 1;
        for (acc, value) in entry.1.iter_mut().zip(vector.as_array()) {
            *acc += value;
        }
    }

    Ok(sums
        .into_iter()
        .map(|(cluster, (size, totals))| {
            let n = size as f64;
            ClusterProfile {
                cluster,
                size,
                mean_recency: totals[0] / n,
                mean_frequency: totals[1] / n,
                mean_monetary: totals[2] / n,
            }
        })
        .collect())
}

fn compare_profiles(a: &ClusterProfile, b: &ClusterProfile, ranking: &[RankCriterion]) -> Ordering {
    for criterion in ranking {
        let (x, y) = (a.metric(criterion.metric), b.metric(criterion.metric));
        let ordering = match criterion.order {
            SortOrder::Ascending => x.total_cmp(&y),
            SortOrder::Descending => y.total_cmp(&x),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// The top-ranked cluster. Complete ties go to the lowest cluster id.
pub fn select_high_risk(profiles: &[ClusterProfile], ranking: &[RankCriterion]) -> Option<usize> {
    profiles
        .iter()
        .min_by(|a, b| compare_profiles(a, b, ranking).then(a.cluster.cmp(&b.cluster)))
        .map(|p| p.cluster)
}

/// Cluster assignments, profiles and the binary label of every customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLabels {
    pub high_risk_cluster: usize,
    pub profiles: Vec<ClusterProfile>,
    pub clusters: BTreeMap<String, usize>,
    pub labels: BTreeMap<String, u8>,
}

impl RiskLabels {
    /// Label of a customer; customers never seen by the labeler are low risk.
    pub fn label(&self, customer_id: &str) -> u8 {
        self.labels.get(customer_id).copied().unwrap_or(0)
    }

    pub fn high_risk_count(&self) -> usize {
        self.labels.values().filter(|&&l| l == 1).count()
    }

    pub fn write_csv<P: AsRef<Path>>(
        &self,
        path: P,
        id_column: &str,
        label_column: &str,
    ) -> PipelineResult<()> {
        let mut wtr = csv::Writer::from_writer(File::create(path)?);
        wtr.write_record([id_column, "Cluster", label_column])?;
        for (customer, label) in &self.labels {
            let cluster = self.clusters.get(customer).copied().unwrap_or_default();
            wtr.write_record([customer.clone(), cluster.to_string(), label.to_string()])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

pub fn label_customers(
    rfm: &[RfmVector],
    assignments: &[ClusterAssignment],
    ranking: &[RankCriterion],
) -> PipelineResult<RiskLabels> {
    let profiles = profile_clusters(rfm, assignments)?;
    for profile in &profiles {
        debug!(
            "Cluster {}: size={} recency={:.2} frequency={:.2} monetary={:.2}",
            profile.cluster,
            profile.size,
            profile.mean_recency,
            profile.mean_frequency,
            profile.mean_monetary
        );
    }

    let high_risk_cluster = select_high_risk(&profiles, ranking)
        .ok_or_else(|| PipelineError::Clustering("no clusters to rank".to_string()))?;

    let clusters: BTreeMap<String, usize> = join_assignments(rfm, assignments)?
        .into_iter()
        .map(|(vector, cluster)| (vector.customer_id.clone(), cluster))
        .collect();
    let labels = clusters
        .iter()
        .map(|(customer, &cluster)| (customer.clone(), u8::from(cluster == high_risk_cluster)))
        .collect();

    let result = RiskLabels {
        high_risk_cluster,
        profiles,
        clusters,
        labels,
    };
    info!(
        "High-risk cluster {}: {} of {} customers labeled",
        high_risk_cluster,
        result.high_risk_count(),
        result.labels.len()
    );
    Ok(result)
}
