//! Cache key builder
//!
//! All cluster-state keys live under the configured namespace so several
//! deployments can share one broker.

/// Type-safe cache key builder
pub struct CacheKey;

impl CacheKey {
    /// Cache key for a pet's cluster descriptor
    pub fn pet_cluster(namespace: &str, pet_id: &str) -> String {
        format!("{}:pets:{}:cluster", namespace, pet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pet_cluster_key() {
        assert_eq!(
            CacheKey::pet_cluster("sploot", "p1"),
            "sploot:pets:p1:cluster"
        );
        assert_eq!(
            CacheKey::pet_cluster("staging", "pet-42"),
            "staging:pets:pet-42:cluster"
        );
    }
}
