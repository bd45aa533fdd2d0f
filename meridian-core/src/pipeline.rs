//! End-to-end orchestration of the estimation pipeline.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::constants::{DEFAULT_GRID_DEG, DEFAULT_REFINE_DEG};
use crate::distance::DistanceBound;
use crate::error::{PipelineError, Result};
use crate::fit::{self, PointFit};
use crate::geometry::{CountryAtlas, LandMask};
use crate::latency::region_min_latencies;
use crate::offset::{session_offset, validate_sessions, SessionOffset};
use crate::origin::{candidate_hull, hull_vertices, intersecting_countries, HullVertex};
use crate::record::{group_by_nonce, MeasurementRecord};
use crate::sampler::{sample_candidates, CandidatePoint};

/// Per-region latency and its distance bound.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionReport {
    pub region: String,
    pub latency_ms: f64,
    pub min_km: f64,
    pub max_km: f64,
}

/// Full pipeline output: diagnostics for every session, per-region
/// bounds, the anchor, the on-land weighted point cloud, the hull over
/// all valid candidates, the attributed countries, and the supplemental
/// point fit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginReport {
    pub records: usize,
    pub median_offset_ms: f64,
    pub sessions: Vec<SessionOffset>,
    pub regions: Vec<RegionReport>,
    pub anchor_region: String,
    pub sampled_points: usize,
    pub points: Vec<CandidatePoint>,
    pub hull: Vec<HullVertex>,
    pub countries: Vec<String>,
    pub fit: Option<PointFit>,
}

/// Runs the whole pipeline over one record batch with an injected random
/// source. Stateless and re-entrant; concurrent invocations share
/// nothing mutable.
pub fn run_pipeline<R: Rng + ?Sized>(
    records: &[MeasurementRecord],
    atlas: &CountryAtlas,
    land: &LandMask,
    cfg: &PipelineConfig,
    rng: &mut R,
) -> Result<OriginReport> {
    let sessions = group_by_nonce(records);
    debug!(records = records.len(), sessions = sessions.len(), "grouped batch");

    let offsets: HashMap<String, f64> = sessions
        .iter()
        .filter_map(|(nonce, recs)| session_offset(recs).map(|o| (nonce.clone(), o)))
        .collect();
    let (session_reports, median_offset_ms) =
        validate_sessions(&offsets, cfg.max_offset_deviation_ms)?;

    let latencies = region_min_latencies(&sessions, &session_reports);
    if latencies.is_empty() {
        return Err(PipelineError::NoRegionLatency);
    }

    let bounds: HashMap<String, DistanceBound> = latencies
        .iter()
        .map(|(region, &latency)| {
            (
                region.clone(),
                DistanceBound::from_latency(latency, &cfg.propagation),
            )
        })
        .collect();
    let mut regions: Vec<RegionReport> = latencies
        .iter()
        .map(|(region, &latency_ms)| {
            let bound = bounds[region];
            RegionReport {
                region: region.clone(),
                latency_ms,
                min_km: bound.min_km,
                max_km: bound.max_km,
            }
        })
        .collect();
    regions.sort_by(|a, b| a.region.cmp(&b.region));

    let vantage = cfg.vantage_by_region();
    let cloud = sample_candidates(&bounds, &vantage, land, &cfg.sampling, rng)?;

    let hull = candidate_hull(&cloud.hull_points);
    let (hull, countries) = match hull {
        Some(polygon) => {
            let countries = intersecting_countries(&polygon, atlas);
            (hull_vertices(&polygon), countries)
        }
        None => (Vec::new(), Vec::new()),
    };

    let fit = fit::fit_point(
        &latencies,
        &vantage,
        &cfg.propagation,
        DEFAULT_GRID_DEG,
        DEFAULT_REFINE_DEG,
    );

    Ok(OriginReport {
        records: records.len(),
        median_offset_ms,
        sessions: session_reports,
        regions,
        anchor_region: cloud.anchor_region,
        sampled_points: cloud.sampled,
        points: cloud.plot_points,
        hull,
        countries,
        fit,
    })
}

/// Convenience wrapper with a per-invocation entropy-seeded random
/// source.
pub fn estimate_origin(
    records: &[MeasurementRecord],
    atlas: &CountryAtlas,
    land: &LandMask,
    cfg: &PipelineConfig,
) -> Result<OriginReport> {
    let mut rng = StdRng::from_entropy();
    run_pipeline(records, atlas, land, cfg, &mut rng)
}
