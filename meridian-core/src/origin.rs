//! Convex hull and country attribution.
//!
//! At regional scale the hull is a coarse bounding step, so lon/lat are
//! treated as planar. Attribution requires interior overlap: a country
//! merely touching the hull boundary is not reported.

use geo::{Area, BooleanOps, ConvexHull, Intersects, MultiPoint, MultiPolygon, Point, Polygon};
use serde::Serialize;
use tracing::debug;

use crate::constants::MIN_HULL_POINTS;
use crate::geometry::{repair, CountryAtlas};
use crate::sampler::CandidatePoint;

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HullVertex {
    pub lon: f64,
    pub lat: f64,
}

/// Convex hull over the geometrically valid candidates, repaired for
/// intersection testing. `None` with fewer than three points — a reported
/// outcome, not an error.
pub fn candidate_hull(points: &[CandidatePoint]) -> Option<Polygon<f64>> {
    if points.len() < MIN_HULL_POINTS {
        return None;
    }
    let cloud: MultiPoint<f64> = MultiPoint::new(
        points
            .iter()
            .map(|p| Point::new(p.lon, p.lat))
            .collect(),
    );
    let hull = cloud.convex_hull();
    repair(&MultiPolygon::new(vec![hull]))
        .and_then(|repaired| repaired.0.into_iter().next())
}

/// Exterior ring vertices in order, without the closing duplicate.
pub fn hull_vertices(hull: &Polygon<f64>) -> Vec<HullVertex> {
    let ring = &hull.exterior().0;
    let open = if ring.len() > 1 { &ring[..ring.len() - 1] } else { &ring[..] };
    open.iter()
        .map(|c| HullVertex { lon: c.x, lat: c.y })
        .collect()
}

/// Country codes whose geometry overlaps the hull interior, sorted.
/// An `Intersects` pre-filter is confirmed by a boolean intersection with
/// positive area, which drops boundary-only contact.
pub fn intersecting_countries(hull: &Polygon<f64>, atlas: &CountryAtlas) -> Vec<String> {
    let hull_mp = MultiPolygon::new(vec![hull.clone()]);
    let mut codes = Vec::new();
    for (code, geometry) in atlas.iter() {
        if !hull_mp.intersects(geometry) {
            continue;
        }
        if hull_mp.intersection(geometry).unsigned_area() > 0.0 {
            codes.push(code.clone());
        }
    }
    debug!(countries = codes.len(), "hull-country attribution complete");
    codes
}
