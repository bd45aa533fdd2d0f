//! Latency to physical distance-bound conversion.

use serde::Serialize;

use crate::config::PropagationModel;
use crate::constants::MS_PER_SEC;

/// The interval of possible great-circle distances consistent with one
/// latency observation. A candidate is ruled out only beyond `max_km` and
/// fully consistent only within `min_km`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistanceBound {
    pub min_km: f64,
    pub max_km: f64,
}

impl DistanceBound {
    /// Subtracts the fixed startup overhead (floored at zero) and converts
    /// the remaining time to distance under best-case and worst-case
    /// routing overhead. Latency at or below the overhead collapses both
    /// bounds to zero.
    pub fn from_latency(latency_ms: f64, model: &PropagationModel) -> Self {
        let elapsed_s = (latency_ms - model.startup_overhead_ms).max(0.0) / MS_PER_SEC;
        let direct_km = elapsed_s * model.speed_of_light_km_s * model.fiber_factor;
        Self {
            min_km: direct_km / model.routing_factor_max,
            max_km: direct_km / model.routing_factor_min,
        }
    }
}
