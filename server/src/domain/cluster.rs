//! Per-pet cluster state
//!
//! The descriptor is the cached artifact produced by one successful job.
//! Serialization must be deterministic for identical inputs (idempotent
//! replays overwrite with identical bytes), hence the ordered coverage map.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One image within a cluster, ordered by descending score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub image_id: String,
    /// Blended quality/recency score in [0, 1]
    pub score: f64,
    /// Dense index matching the member's position in the cluster
    pub position: usize,
}

/// A group of images with a chosen hero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Derived id: `{pet_id}-cluster-{index}`
    pub id: String,
    /// Group name when the payload carried labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Highest-scoring member, first on ties
    pub hero_image_id: String,
    pub members: Vec<ClusterMember>,
}

/// Aggregate metrics echoed alongside the clusters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterMetrics {
    /// Label coverage weights as supplied by the producer
    pub coverage: BTreeMap<String, f64>,
    pub quality_score: f64,
    pub processed_at: DateTime<Utc>,
    /// Strategy version stamp for future routing
    pub strategy_version: String,
}

/// The cached per-pet artifact produced by one successful job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub pet_id: String,
    pub clusters: Vec<Cluster>,
    pub metrics: ClusterMetrics,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_json_roundtrip() {
        let now = Utc::now();
        let descriptor = ClusterDescriptor {
            pet_id: "p1".to_string(),
            clusters: vec![Cluster {
                id: "p1-cluster-0".to_string(),
                label: None,
                hero_image_id: "a".to_string(),
                members: vec![ClusterMember {
                    image_id: "a".to_string(),
                    score: 0.85,
                    position: 0,
                }],
            }],
            metrics: ClusterMetrics {
                coverage: BTreeMap::from([("L".to_string(), 0.5)]),
                quality_score: 0.9,
                processed_at: now,
                strategy_version: "heuristic-v1".to_string(),
            },
            updated_at: now,
        };

        let json = serde_json::to_string(&descriptor).unwrap();
        let back: ClusterDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, descriptor);
    }

    #[test]
    fn test_absent_label_is_omitted() {
        let cluster = Cluster {
            id: "p1-cluster-0".to_string(),
            label: None,
            hero_image_id: "a".to_string(),
            members: vec![],
        };
        let json = serde_json::to_string(&cluster).unwrap();
        assert!(!json.contains("label"));
    }
}
