//! Supplemental single-point estimation and claim checks.
//!
//! The sampler produces an uncertainty region; this module adds a coarse
//! best-fit point: a world grid search refined around the best cell,
//! minimizing squared error between measured region latencies and the
//! latencies predicted from great-circle distance under a nominal routing
//! factor, with a shared non-negative bias absorbed per candidate.

use std::collections::HashMap;

use geo::{Distance, Haversine, Point};
use serde::Serialize;

use crate::config::PropagationModel;
use crate::constants::{
    MIN_HULL_POINTS, MS_PER_SEC, M_PER_KM, NOMINAL_ROUTING_FACTOR, REFINE_WINDOW_MULT,
    WORLD_LAT_MAX, WORLD_LON_MAX,
};
use crate::distance::DistanceBound;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointFit {
    pub lat: f64,
    pub lon: f64,
    pub bias_ms: f64,
    pub sse: f64,
    pub regions_used: usize,
}

/// Per-region distance check of a claimed coordinate against the hard
/// `max_km` bound.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimCheck {
    pub region: String,
    pub dist_km: f64,
    pub min_km: f64,
    pub max_km: f64,
    pub falsified: bool,
}

#[derive(Debug, Clone, Copy)]
struct RegionObs {
    point: Point<f64>,
    latency_ms: f64,
}

/// Fits a single point to the measured latencies. Needs at least three
/// regions with positive latency and known coordinates; otherwise there
/// is no meaningful minimum and the fit is absent.
pub fn fit_point(
    latencies: &HashMap<String, f64>,
    vantage: &HashMap<String, Point<f64>>,
    model: &PropagationModel,
    grid_deg: f64,
    refine_deg: f64,
) -> Option<PointFit> {
    let mut obs = Vec::new();
    for (region, &latency_ms) in latencies {
        let Some(&point) = vantage.get(region) else {
            continue;
        };
        if latency_ms.is_finite() && latency_ms > 0.0 {
            obs.push(RegionObs { point, latency_ms });
        }
    }
    if obs.len() < MIN_HULL_POINTS {
        return None;
    }

    let (best_lat, best_lon, _, _) = grid_search_bounds(
        &obs,
        model,
        -WORLD_LAT_MAX,
        WORLD_LAT_MAX,
        -WORLD_LON_MAX,
        WORLD_LON_MAX,
        grid_deg,
    )?;
    let window = grid_deg.max(refine_deg * REFINE_WINDOW_MULT);
    let (lat, lon, sse, bias_ms) = grid_search_bounds(
        &obs,
        model,
        best_lat - window,
        best_lat + window,
        best_lon - window,
        best_lon + window,
        refine_deg,
    )?;

    Some(PointFit {
        lat,
        lon,
        bias_ms,
        sse,
        regions_used: obs.len(),
    })
}

/// Checks a claimed coordinate against every bounded region, sorted by
/// region code. A claim is falsified by any region whose measured bound
/// the claimed distance exceeds.
pub fn claim_checks(
    bounds: &HashMap<String, DistanceBound>,
    vantage: &HashMap<String, Point<f64>>,
    claim_lat: f64,
    claim_lon: f64,
) -> Vec<ClaimCheck> {
    let claim = Point::new(claim_lon, claim_lat);
    let mut regions: Vec<&String> = bounds.keys().collect();
    regions.sort();
    let mut out = Vec::new();
    for region in regions {
        let Some(&point) = vantage.get(region) else {
            continue;
        };
        let bound = &bounds[region];
        let dist_km = Haversine::distance(claim, point) / M_PER_KM;
        out.push(ClaimCheck {
            region: region.clone(),
            dist_km,
            min_km: bound.min_km,
            max_km: bound.max_km,
            falsified: dist_km > bound.max_km,
        });
    }
    out
}

fn grid_search_bounds(
    obs: &[RegionObs],
    model: &PropagationModel,
    lat_min: f64,
    lat_max: f64,
    lon_min: f64,
    lon_max: f64,
    step: f64,
) -> Option<(f64, f64, f64, f64)> {
    if step <= 0.0 {
        return None;
    }
    let mut best: Option<(f64, f64, f64, f64)> = None;
    let mut lat = lat_min.max(-WORLD_LAT_MAX);
    while lat <= lat_max.min(WORLD_LAT_MAX) {
        let mut lon = lon_min;
        while lon <= lon_max {
            let (sse, bias) = sse_for_candidate(lat, lon, obs, model);
            match best {
                None => best = Some((lat, lon, sse, bias)),
                Some((_, _, best_sse, _)) if sse < best_sse => best = Some((lat, lon, sse, bias)),
                _ => {}
            }
            lon += step;
        }
        lat += step;
    }
    best
}

/// Predicted one-way latency for a candidate and the SSE against the
/// observations, with the shared bias clamped non-negative (bias models
/// relay startup, which only ever adds delay).
fn sse_for_candidate(lat: f64, lon: f64, obs: &[RegionObs], model: &PropagationModel) -> (f64, f64) {
    let speed_km_ms =
        model.speed_of_light_km_s * model.fiber_factor / (NOMINAL_ROUTING_FACTOR * MS_PER_SEC);
    let candidate = Point::new(lon, lat);
    let mut residual_sum = 0.0;
    for o in obs {
        let dist_km = Haversine::distance(candidate, o.point) / M_PER_KM;
        residual_sum += o.latency_ms - dist_km / speed_km_ms;
    }
    let bias = (residual_sum / obs.len() as f64).max(0.0);
    let mut sse = 0.0;
    for o in obs {
        let dist_km = Haversine::distance(candidate, o.point) / M_PER_KM;
        let err = o.latency_ms - (dist_km / speed_km_ms + bias);
        sse += err * err;
    }
    (sse, bias)
}
