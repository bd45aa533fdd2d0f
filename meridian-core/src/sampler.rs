//! Candidate point sampling and consistency weighting.
//!
//! The true location must lie inside the intersection of every region's
//! distance bound, and that intersection is a subset of the smallest
//! individual bound. Sampling therefore covers only the tightest
//! ("anchor") circle, and every candidate is scored against all bounded
//! regions.

use std::collections::HashMap;
use std::f64::consts::PI;

use geo::{Destination, Distance, Haversine, Point};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::SamplerConfig;
use crate::constants::M_PER_KM;
use crate::distance::DistanceBound;
use crate::error::{PipelineError, Result};
use crate::geometry::LandMask;

/// A candidate location with its joint consistency weight in [0,1].
/// Ephemeral: regenerated on every invocation.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePoint {
    pub lon: f64,
    pub lat: f64,
    pub weight: f64,
}

/// Sampling output. Hull points are every geometrically valid candidate
/// (the client could be offshore); plot points are the on-land subset
/// with min-max normalized weights.
#[derive(Debug, Clone, Default)]
pub struct CandidateCloud {
    pub anchor_region: String,
    pub sampled: usize,
    pub hull_points: Vec<CandidatePoint>,
    pub plot_points: Vec<CandidatePoint>,
}

/// Samples the anchor disk area-uniformly and weights each candidate by
/// the product of its per-region consistency scores.
///
/// Regions bounded but missing from the vantage table cannot be scored
/// and are skipped with a warning. With no scoreable region at all there
/// is no anchor, which is pipeline-fatal.
pub fn sample_candidates<R: Rng + ?Sized>(
    bounds: &HashMap<String, DistanceBound>,
    vantage: &HashMap<String, Point<f64>>,
    land: &LandMask,
    cfg: &SamplerConfig,
    rng: &mut R,
) -> Result<CandidateCloud> {
    let mut scoreable: Vec<(&String, &DistanceBound, Point<f64>)> = Vec::new();
    for (region, bound) in bounds {
        match vantage.get(region) {
            Some(point) => scoreable.push((region, bound, *point)),
            None => warn!(%region, "bounded region missing from vantage table; not scored"),
        }
    }
    let (anchor_region, anchor_bound, anchor_point) = scoreable
        .iter()
        .min_by(|a, b| {
            a.1.max_km
                .partial_cmp(&b.1.max_km)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        })
        .map(|(region, bound, point)| ((*region).clone(), **bound, *point))
        .ok_or(PipelineError::NoRegionLatency)?;

    let n = sample_count(anchor_bound.max_km, cfg);
    debug!(
        anchor = %anchor_region,
        radius_km = anchor_bound.max_km,
        samples = n,
        "sampling anchor disk"
    );

    let mut cloud = CandidateCloud {
        anchor_region,
        sampled: n,
        ..CandidateCloud::default()
    };
    for i in 0..n {
        // even angular sweep; sqrt(U) makes density uniform over the disk area
        let bearing = 360.0 * i as f64 / n as f64;
        let radius_m = rng.gen::<f64>().sqrt() * anchor_bound.max_km * M_PER_KM;
        let raw = Haversine::destination(anchor_point, bearing, radius_m);
        let point = Point::new(wrap_lon(raw.x()), raw.y());

        let Some(weight) = joint_weight(point, &scoreable) else {
            continue;
        };
        let candidate = CandidatePoint {
            lon: point.x(),
            lat: point.y(),
            weight,
        };
        cloud.hull_points.push(candidate);
        if land.contains(candidate.lon, candidate.lat) {
            cloud.plot_points.push(candidate);
        }
    }
    normalize_weights(&mut cloud.plot_points);
    debug!(
        hull_points = cloud.hull_points.len(),
        plot_points = cloud.plot_points.len(),
        "candidate sampling complete"
    );
    Ok(cloud)
}

/// Sample count scaled to the anchor circle's area, floored so tiny
/// circles still get coverage.
fn sample_count(radius_km: f64, cfg: &SamplerConfig) -> usize {
    let area_km2 = PI * radius_km * radius_km;
    let scaled = (area_km2 / 1_000_000.0 * cfg.samples_per_million_km2) as usize;
    scaled.max(cfg.min_samples)
}

/// Product of per-region scores, or `None` when any region's hard
/// max-distance constraint rules the point out.
fn joint_weight(
    point: Point<f64>,
    regions: &[(&String, &DistanceBound, Point<f64>)],
) -> Option<f64> {
    let mut weight = 1.0;
    for (_, bound, region_point) in regions {
        let dist_km = Haversine::distance(point, *region_point) / M_PER_KM;
        if dist_km > bound.max_km {
            return None;
        }
        weight *= region_score(dist_km, bound);
    }
    Some(weight)
}

/// 1.0 inside `min_km`, linear falloff to 0.0 at `max_km`, clamped.
/// A degenerate bound (min == max) scores 1.0 for any point that survived
/// the hard constraint.
fn region_score(dist_km: f64, bound: &DistanceBound) -> f64 {
    if dist_km <= bound.min_km {
        return 1.0;
    }
    let span = bound.max_km - bound.min_km;
    if span <= f64::EPSILON {
        return 1.0;
    }
    (1.0 - (dist_km - bound.min_km) / span).clamp(0.0, 1.0)
}

/// Min-max scales weights into [0,1]. Constant weights all normalize to
/// 1.0; an empty batch is left alone.
fn normalize_weights(points: &mut [CandidatePoint]) {
    let Some(min) = points.iter().map(|p| p.weight).reduce(f64::min) else {
        return;
    };
    let max = points.iter().map(|p| p.weight).fold(min, f64::max);
    let span = max - min;
    for p in points.iter_mut() {
        p.weight = if span <= f64::EPSILON {
            1.0
        } else {
            (p.weight - min) / span
        };
    }
}

fn wrap_lon(lon: f64) -> f64 {
    if lon > 180.0 {
        lon - 360.0
    } else if lon < -180.0 {
        lon + 360.0
    } else {
        lon
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiPolygon, Polygon};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::geometry::CountryAtlas;

    const TEST_SEED: u64 = 7;
    const TEST_EPSILON: f64 = 1e-9;

    fn bound(min_km: f64, max_km: f64) -> DistanceBound {
        DistanceBound { min_km, max_km }
    }

    fn one_region(
        region: &str,
        lat: f64,
        lon: f64,
        b: DistanceBound,
    ) -> (HashMap<String, DistanceBound>, HashMap<String, Point<f64>>) {
        let mut bounds = HashMap::new();
        bounds.insert(region.to_string(), b);
        let mut vantage = HashMap::new();
        vantage.insert(region.to_string(), Point::new(lon, lat));
        (bounds, vantage)
    }

    fn land_square(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> LandMask {
        let atlas = CountryAtlas::from_geometries(vec![(
            "LND".to_string(),
            MultiPolygon::new(vec![Polygon::new(
                LineString::from(vec![
                    (min_lon, min_lat),
                    (max_lon, min_lat),
                    (max_lon, max_lat),
                    (min_lon, max_lat),
                    (min_lon, min_lat),
                ]),
                vec![],
            )]),
        )]);
        LandMask::build(&atlas)
    }

    #[test]
    fn no_bounded_region_means_no_anchor() {
        let bounds = HashMap::new();
        let vantage = HashMap::new();
        let mut rng = StdRng::seed_from_u64(TEST_SEED);
        let err = sample_candidates(
            &bounds,
            &vantage,
            &LandMask::empty(),
            &SamplerConfig::default(),
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::NoRegionLatency));
    }

    #[test]
    fn no_point_exceeds_any_region_max() {
        let (bounds, vantage) =
            one_region("eu-central-1", 50.1109, 8.6821, bound(1000.0, 2000.0));
        let mut rng = StdRng::seed_from_u64(TEST_SEED);
        let cloud = sample_candidates(
            &bounds,
            &vantage,
            &LandMask::empty(),
            &SamplerConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(cloud.anchor_region, "eu-central-1");
        assert!(cloud.sampled >= SamplerConfig::default().min_samples);
        assert!(!cloud.hull_points.is_empty());
        let anchor = Point::new(8.6821, 50.1109);
        for p in &cloud.hull_points {
            let dist = Haversine::distance(Point::new(p.lon, p.lat), anchor) / M_PER_KM;
            assert!(dist <= 2000.0 + 1e-6);
        }
    }

    #[test]
    fn weight_is_product_of_region_scores() {
        let point = Point::new(0.0, 0.0);
        let near = Point::new(0.0, 0.0);
        // place the second region so the candidate sits midway through its band
        let far = Haversine::destination(point, 90.0, 1500.0 * M_PER_KM);
        let region_a = "a".to_string();
        let region_b = "b".to_string();
        let bound_a = bound(100.0, 200.0);
        let bound_b = bound(1000.0, 2000.0);
        let regions = vec![
            (&region_a, &bound_a, near),
            (&region_b, &bound_b, far),
        ];
        let weight = joint_weight(point, &regions).unwrap();
        let score_b = 1.0 - (1500.0 - 1000.0) / 1000.0;
        assert!((weight - 1.0 * score_b).abs() < 1e-6);
    }

    #[test]
    fn score_falls_monotonically_from_min_to_max() {
        let b = bound(1000.0, 2000.0);
        let mut last = f64::INFINITY;
        for dist in [500.0, 1000.0, 1250.0, 1500.0, 1750.0, 2000.0] {
            let score = region_score(dist, &b);
            assert!((0.0..=1.0).contains(&score));
            assert!(score <= last + TEST_EPSILON);
            last = score;
        }
        assert!((region_score(500.0, &b) - 1.0).abs() < TEST_EPSILON);
        assert!(region_score(2000.0, &b).abs() < TEST_EPSILON);
    }

    #[test]
    fn degenerate_bound_scores_full_weight() {
        let b = bound(750.0, 750.0);
        assert!((region_score(750.0, &b) - 1.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn conflicting_regions_rule_out_every_point() {
        // anchor circle around Frankfurt, second region on the other side
        // of the planet with a tiny bound no sampled point can satisfy
        let mut bounds = HashMap::new();
        bounds.insert("eu-central-1".to_string(), bound(100.0, 500.0));
        bounds.insert("ap-northeast-1".to_string(), bound(0.0, 100.0));
        let mut vantage = HashMap::new();
        vantage.insert("eu-central-1".to_string(), Point::new(8.6821, 50.1109));
        vantage.insert("ap-northeast-1".to_string(), Point::new(139.6503, 35.6762));
        let mut rng = StdRng::seed_from_u64(TEST_SEED);
        let cloud = sample_candidates(
            &bounds,
            &vantage,
            &LandMask::empty(),
            &SamplerConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(cloud.anchor_region, "ap-northeast-1");
        assert!(cloud.hull_points.is_empty());
        assert!(cloud.plot_points.is_empty());
    }

    #[test]
    fn plot_points_are_on_land_with_normalized_weights() {
        let (bounds, vantage) =
            one_region("eu-central-1", 50.1109, 8.6821, bound(200.0, 2000.0));
        let land = land_square(0.0, 40.0, 20.0, 60.0);
        let mut rng = StdRng::seed_from_u64(TEST_SEED);
        let cloud = sample_candidates(
            &bounds,
            &vantage,
            &land,
            &SamplerConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert!(!cloud.plot_points.is_empty());
        assert!(cloud.plot_points.len() <= cloud.hull_points.len());
        for p in &cloud.plot_points {
            assert!(land.contains(p.lon, p.lat));
            assert!((0.0..=1.0).contains(&p.weight));
        }
        let max = cloud
            .plot_points
            .iter()
            .map(|p| p.weight)
            .fold(0.0, f64::max);
        assert!((max - 1.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn constant_weights_normalize_to_one() {
        let mut points = vec![
            CandidatePoint {
                lon: 0.0,
                lat: 0.0,
                weight: 0.4,
            },
            CandidatePoint {
                lon: 1.0,
                lat: 1.0,
                weight: 0.4,
            },
        ];
        normalize_weights(&mut points);
        assert!(points.iter().all(|p| (p.weight - 1.0).abs() < TEST_EPSILON));
    }

    #[test]
    fn seeded_sampling_is_deterministic() {
        let (bounds, vantage) =
            one_region("eu-central-1", 50.1109, 8.6821, bound(500.0, 1500.0));
        let run = |seed: u64| {
            let mut rng = StdRng::seed_from_u64(seed);
            sample_candidates(
                &bounds,
                &vantage,
                &LandMask::empty(),
                &SamplerConfig::default(),
                &mut rng,
            )
            .unwrap()
        };
        let a = run(TEST_SEED);
        let b = run(TEST_SEED);
        assert_eq!(a.hull_points.len(), b.hull_points.len());
        for (pa, pb) in a.hull_points.iter().zip(&b.hull_points) {
            assert_eq!(pa.lon, pb.lon);
            assert_eq!(pa.lat, pb.lat);
            assert_eq!(pa.weight, pb.weight);
        }
    }

    #[test]
    fn sample_count_scales_with_area_above_the_floor() {
        let cfg = SamplerConfig::default();
        assert_eq!(sample_count(10.0, &cfg), cfg.min_samples);
        let big = sample_count(5000.0, &cfg);
        // pi * 5000^2 / 1e6 * 30 ~ 2356
        assert!(big > 2000 && big < 2700);
    }
}
