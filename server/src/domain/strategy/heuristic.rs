//! Default quality-weighted heuristic strategy
//!
//! Groups images over the provided labels (or a single synthetic group) by
//! round-robin over input order, and scores each image by blending the
//! payload-level quality with a recency bias favoring earlier positions.

use chrono::{DateTime, Utc};

use super::{ClusterStrategy, StrategyError, StrategyParams};
use crate::domain::cluster::{Cluster, ClusterDescriptor, ClusterMember, ClusterMetrics};
use crate::domain::job::ClusterJob;

/// Synthetic group name used when the payload carries no labels
const FALLBACK_GROUP: &str = "All";

/// Weight of the payload-level quality score
const QUALITY_WEIGHT: f64 = 0.7;

/// Weight of the input-position recency bias
const RECENCY_WEIGHT: f64 = 0.3;

#[derive(Debug, Default)]
pub struct HeuristicStrategy;

impl ClusterStrategy for HeuristicStrategy {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn version(&self) -> &'static str {
        "heuristic-v1"
    }

    fn cluster(
        &self,
        job: &ClusterJob,
        params: &StrategyParams,
        processed_at: DateTime<Utc>,
    ) -> Result<ClusterDescriptor, StrategyError> {
        let payload = job.payload.normalized();
        let quality = payload.quality_score;

        let metrics = ClusterMetrics {
            coverage: payload.coverage.clone(),
            quality_score: quality,
            processed_at,
            strategy_version: self.version().to_string(),
        };

        if payload.image_ids.is_empty() {
            return Ok(ClusterDescriptor {
                pet_id: job.pet_id.clone(),
                clusters: Vec::new(),
                metrics,
                updated_at: processed_at,
            });
        }

        let groups: Vec<Option<String>> = if payload.labels.is_empty() {
            vec![Some(FALLBACK_GROUP.to_string())]
        } else {
            payload.labels.iter().cloned().map(Some).collect()
        };

        let total = payload.image_ids.len();
        // Group k receives input indices k, k + |groups|, k + 2|groups|, ...
        let mut assigned: Vec<Vec<(usize, &str)>> = vec![Vec::new(); groups.len()];
        for (index, image_id) in payload.image_ids.iter().enumerate() {
            assigned[index % groups.len()].push((index, image_id.as_str()));
        }

        let clusters = groups
            .into_iter()
            .zip(assigned)
            // A group list longer than the image list leaves trailing groups
            // empty; those emit no cluster and the indices stay dense.
            .filter(|(_, images)| !images.is_empty())
            .enumerate()
            .map(|(cluster_index, (label, mut images))| {
                // Descending score, ties broken by ascending input position
                images.sort_by(|(ai, a), (bi, b)| {
                    let score_a = member_score(quality, *ai, total);
                    let score_b = member_score(quality, *bi, total);
                    score_b
                        .partial_cmp(&score_a)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(ai.cmp(bi))
                        .then(a.cmp(b))
                });
                images.truncate(params.max_cluster_size);

                let members: Vec<ClusterMember> = images
                    .into_iter()
                    .enumerate()
                    .map(|(position, (input_index, image_id))| ClusterMember {
                        image_id: image_id.to_string(),
                        score: member_score(quality, input_index, total),
                        position,
                    })
                    .collect();

                Cluster {
                    id: format!("{}-cluster-{}", job.pet_id, cluster_index),
                    label,
                    hero_image_id: members[0].image_id.clone(),
                    members,
                }
            })
            .collect();

        Ok(ClusterDescriptor {
            pet_id: job.pet_id.clone(),
            clusters,
            metrics,
            updated_at: processed_at,
        })
    }
}

/// Blend payload quality with a recency bias favoring earlier input
/// positions: `clamp01(quality * 0.7 + (1 - i/n) * 0.3)`
fn member_score(quality: f64, input_index: usize, total: usize) -> f64 {
    let recency = 1.0 - (input_index as f64 / total as f64);
    (quality * QUALITY_WEIGHT + recency * RECENCY_WEIGHT).clamp(0.0, 1.0)
}
