//! Deterministic hashing for variant assignment
//!
//! Ensures the same user always gets assigned to the same variant
//! for a given experiment, on any platform and across releases.

use sha2::{Digest, Sha256};

/// Deterministic hasher for participant assignment
#[derive(Debug, Clone, Copy)]
pub struct AssignmentHasher;

impl AssignmentHasher {
    /// Map a user and experiment to a value in `[0, 1)`.
    ///
    /// This ensures that:
    /// - The same user + experiment always returns the same value
    /// - Values are uniformly distributed across the unit interval
    /// - The same user gets independent values in different experiments
    pub fn unit_interval(user_id: &str, experiment_id: &str) -> f64 {
        let digest = Sha256::digest(format!("{user_id}:{experiment_id}").as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);

        // Top 53 bits keep the quotient exactly representable, so the
        // result stays strictly below 1.0
        let value = u64::from_be_bytes(prefix) >> 11;
        value as f64 / (1u64 << 53) as f64
    }

    /// Map a user and experiment to a percentage in `[0, 100)`
    pub fn percent(user_id: &str, experiment_id: &str) -> f64 {
        Self::unit_interval(user_id, experiment_id) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_input_same_value() {
        let first = AssignmentHasher::unit_interval("user-1", "exp-1");
        let second = AssignmentHasher::unit_interval("user-1", "exp-1");
        assert_eq!(first, second, "Same inputs should produce same value");
    }

    #[test]
    fn test_value_stays_in_unit_interval() {
        for i in 0..1000 {
            let value = AssignmentHasher::unit_interval(&format!("user-{}", i), "exp-1");
            assert!((0.0..1.0).contains(&value), "Out of range: {}", value);
        }
    }

    #[test]
    fn test_different_experiments_decorrelate() {
        let mut same = 0;

        for i in 0..1000 {
            let user = format!("user-{}", i);
            let a = AssignmentHasher::unit_interval(&user, "exp-a") < 0.5;
            let b = AssignmentHasher::unit_interval(&user, "exp-b") < 0.5;
            if a == b {
                same += 1;
            }
        }

        // Independent fair coins agree about half the time
        assert!(same > 400, "Too few agreements: {}", same);
        assert!(same < 600, "Too many agreements: {}", same);
    }

    #[test]
    fn test_distribution_across_buckets() {
        let mut buckets = [0u32; 10];

        for i in 0..1000 {
            let value = AssignmentHasher::unit_interval(&format!("user-{}", i), "exp-1");
            buckets[(value * 10.0) as usize] += 1;
        }

        // Each bucket should have roughly 100 items (10% of 1000)
        for count in buckets {
            assert!(count > 50, "Bucket has too few items: {}", count);
            assert!(count < 150, "Bucket has too many items: {}", count);
        }
    }

    #[test]
    fn test_50_50_split() {
        let mut control_count = 0;

        for i in 0..1000 {
            let percent = AssignmentHasher::percent(&format!("user-{}", i), "homepage-hero");
            if percent <= 50.0 {
                control_count += 1;
            }
        }

        assert!(
            (475..=525).contains(&control_count),
            "Split is too uneven: control={}",
            control_count
        );
    }

    #[test]
    fn test_determinism_across_calls() {
        let user = "participant-12345";
        let experiment = "pricing-experiment-v2";

        let first = AssignmentHasher::percent(user, experiment);

        for _ in 0..100 {
            assert_eq!(AssignmentHasher::percent(user, experiment), first);
        }
    }
}
