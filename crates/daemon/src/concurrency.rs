//! Concurrency planning for library scans
//!
//! Derives how many series reconciliations may run at once from the CPU core
//! count and configuration.

use crate::config::Config;

/// Lower bound on auto-derived scan concurrency
pub const MIN_AUTO_CONCURRENCY: u32 = 4;

/// Upper bound on auto-derived scan concurrency
pub const MAX_AUTO_CONCURRENCY: u32 = 32;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of simultaneous series reconciliations
    pub max_concurrent: u32,
}

impl ScanPlan {
    /// Derive a scan plan from configuration
    ///
    /// Uses the following rules:
    /// - Uses `scan.max_concurrent` unchanged when non-zero
    /// - Otherwise 2 reconciliations per logical core, clamped to [4, 32]
    ///
    /// Reconciliation is network-bound, so oversubscribing cores is fine.
    pub fn derive(cfg: &Config) -> Self {
        Self::with_cores(num_cpus::get() as u32, cfg.scan.max_concurrent)
    }

    /// Derive a plan for an explicit core count
    pub fn with_cores(total_cores: u32, configured: u32) -> Self {
        let max_concurrent = if configured > 0 {
            configured
        } else {
            derive_max_concurrent(total_cores)
        };

        Self {
            total_cores,
            max_concurrent,
        }
    }
}

fn derive_max_concurrent(cores: u32) -> u32 {
    cores
        .saturating_mul(2)
        .clamp(MIN_AUTO_CONCURRENCY, MAX_AUTO_CONCURRENCY)
}

/// Public function to derive a scan plan from configuration
pub fn derive_plan(cfg: &Config) -> ScanPlan {
    ScanPlan::derive(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use proptest::prelude::*;

    #[test]
    fn test_small_machines_get_floor() {
        assert_eq!(ScanPlan::with_cores(1, 0).max_concurrent, 4);
        assert_eq!(ScanPlan::with_cores(2, 0).max_concurrent, 4);
        assert_eq!(ScanPlan::with_cores(3, 0).max_concurrent, 6);
    }

    #[test]
    fn test_large_machines_get_ceiling() {
        assert_eq!(ScanPlan::with_cores(16, 0).max_concurrent, 32);
        assert_eq!(ScanPlan::with_cores(128, 0).max_concurrent, 32);
    }

    #[test]
    fn test_derive_uses_configured_value() {
        let cfg = Config {
            scan: ScanConfig { max_concurrent: 3 },
            ..Default::default()
        };
        let plan = derive_plan(&cfg);
        assert_eq!(plan.max_concurrent, 3);
        assert!(plan.total_cores >= 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_auto_derivation_is_bounded(cores in 1u32..512) {
            let plan = ScanPlan::with_cores(cores, 0);

            prop_assert_eq!(plan.total_cores, cores);
            prop_assert!(
                (MIN_AUTO_CONCURRENCY..=MAX_AUTO_CONCURRENCY).contains(&plan.max_concurrent),
                "For {} cores, {} is outside [{}, {}]",
                cores, plan.max_concurrent, MIN_AUTO_CONCURRENCY, MAX_AUTO_CONCURRENCY
            );
            prop_assert_eq!(plan.max_concurrent, (cores * 2).clamp(4, 32));
        }

        #[test]
        fn prop_explicit_value_preserved(cores in 1u32..512, explicit in 1u32..1024) {
            let plan = ScanPlan::with_cores(cores, explicit);
            prop_assert_eq!(
                plan.max_concurrent, explicit,
                "Explicit limit {} should be preserved, got {}",
                explicit, plan.max_concurrent
            );
        }
    }
}
