//! Derived performance indices
//!
//! Composite indices computed from reconciled metrics:
//! - Eccentric utilization ratio (CMJ / SJ)
//! - Limb asymmetry
//! - Adductor/abductor strength ratio
//! - Acute:chronic workload ratio
//!
//! All functions return a defined zero-state instead of NaN or infinity
//! when inputs are missing or degenerate, so display layers never
//! special-case "no data".

use serde::{Deserialize, Serialize};

/// Eccentric utilization ratio: CMJ height over SJ height.
///
/// Zero when the squat-jump height is non-positive.
pub fn eccentric_utilization(cmj_height: f64, sj_height: f64) -> f64 {
    if sj_height <= 0.0 {
        return 0.0;
    }
    cmj_height / sj_height
}

/// Limb asymmetry as a signed percentage: `(right - left) / max * 100`.
///
/// Positive favors the right limb. Zero when both limbs read zero.
pub fn limb_asymmetry(left: f64, right: f64) -> f64 {
    let max = left.max(right);
    if max <= 0.0 {
        return 0.0;
    }
    (right - left) / max * 100.0
}

/// Adductor/abductor strength ratio. Zero when the abductor reading is
/// non-positive.
pub fn adduction_abduction_ratio(adductor: f64, abductor: f64) -> f64 {
    if abductor <= 0.0 {
        return 0.0;
    }
    adductor / abductor
}

/// Acute:chronic workload ratio over a series of daily loads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRatio {
    /// 7-day mean load
    pub acute: f64,
    /// 28-day mean load
    pub chronic: f64,
    /// acute / chronic
    pub ratio: f64,
}

impl WorkloadRatio {
    pub fn zeroed() -> Self {
        Self {
            acute: 0.0,
            chronic: 0.0,
            ratio: 0.0,
        }
    }
}

/// Acute (last 7 days) over chronic (last 28 days) mean load.
///
/// Requires at least 28 daily samples; returns the zero-state otherwise,
/// and when the chronic load is zero.
pub fn workload_ratio(daily_loads: &[f64]) -> WorkloadRatio {
    if daily_loads.len() < 28 {
        return WorkloadRatio::zeroed();
    }

    let acute_window = &daily_loads[daily_loads.len() - 7..];
    let chronic_window = &daily_loads[daily_loads.len() - 28..];

    let acute = acute_window.iter().sum::<f64>() / 7.0;
    let chronic = chronic_window.iter().sum::<f64>() / 28.0;

    if chronic == 0.0 {
        return WorkloadRatio {
            acute,
            chronic: 0.0,
            ratio: 0.0,
        };
    }

    WorkloadRatio {
        acute,
        chronic,
        ratio: acute / chronic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eccentric_utilization() {
        assert!((eccentric_utilization(44.0, 40.0) - 1.1).abs() < 1e-9);
        assert_eq!(eccentric_utilization(44.0, 0.0), 0.0);
    }

    #[test]
    fn test_limb_asymmetry_signed() {
        // Right 10% stronger
        assert!((limb_asymmetry(270.0, 300.0) - 10.0).abs() < 1e-9);
        // Left stronger gives a negative value
        assert!(limb_asymmetry(300.0, 270.0) < 0.0);
        assert_eq!(limb_asymmetry(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_adduction_abduction_ratio() {
        assert!((adduction_abduction_ratio(320.0, 400.0) - 0.8).abs() < 1e-9);
        assert_eq!(adduction_abduction_ratio(320.0, 0.0), 0.0);
    }

    #[test]
    fn test_workload_ratio_insufficient_data() {
        let loads = vec![400.0; 27];
        assert_eq!(workload_ratio(&loads), WorkloadRatio::zeroed());
    }

    #[test]
    fn test_workload_ratio_steady_state() {
        let loads = vec![400.0; 28];
        let w = workload_ratio(&loads);
        assert!((w.acute - 400.0).abs() < 1e-9);
        assert!((w.chronic - 400.0).abs() < 1e-9);
        assert!((w.ratio - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_workload_ratio_spike() {
        // 21 quiet days then a heavy week
        let mut loads = vec![300.0; 21];
        loads.extend(vec![600.0; 7]);
        let w = workload_ratio(&loads);
        assert!((w.acute - 600.0).abs() < 1e-9);
        assert!(w.ratio > 1.5);
    }

    #[test]
    fn test_workload_ratio_zero_chronic() {
        let loads = vec![0.0; 28];
        let w = workload_ratio(&loads);
        assert_eq!(w.ratio, 0.0);
        assert!(w.ratio.is_finite());
    }
}
