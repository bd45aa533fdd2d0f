//! Country geometry: atlas, repair, and the land mask.
//!
//! Geometry is expensive to fetch and slowly changing, so callers build
//! the atlas and land mask once and pass them into every pipeline run.

use std::collections::BTreeMap;

use geo::{BooleanOps, Contains, MultiPolygon, Point, Polygon};
use tracing::warn;

/// Country geometries keyed by stable country code, repaired on entry.
/// Iteration order is sorted by code, so derived outputs are stable.
#[derive(Debug, Clone, Default)]
pub struct CountryAtlas {
    countries: BTreeMap<String, MultiPolygon<f64>>,
}

impl CountryAtlas {
    /// Builds an atlas from raw (code, geometry) pairs. Each geometry is
    /// repaired; geometries that remain unusable are excluded and logged,
    /// never allowed to abort estimation.
    pub fn from_geometries<I>(geometries: I) -> Self
    where
        I: IntoIterator<Item = (String, MultiPolygon<f64>)>,
    {
        let mut countries = BTreeMap::new();
        for (code, raw) in geometries {
            match repair(&raw) {
                Some(geom) => {
                    countries.insert(code, geom);
                }
                None => warn!(country = %code, "excluding unrepairable country geometry"),
            }
        }
        Self { countries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MultiPolygon<f64>)> {
        self.countries.iter()
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

/// Pre-built union of all country geometry, used to restrict the plotted
/// candidate cloud to land.
#[derive(Debug, Clone)]
pub struct LandMask {
    union: MultiPolygon<f64>,
}

impl Default for LandMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl LandMask {
    pub fn build(atlas: &CountryAtlas) -> Self {
        let mut union = MultiPolygon::new(Vec::new());
        for (_, geom) in atlas.iter() {
            union = union.union(geom);
        }
        Self { union }
    }

    pub fn empty() -> Self {
        Self {
            union: MultiPolygon::new(Vec::new()),
        }
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.union.contains(&Point::new(lon, lat))
    }
}

/// Repairs a multipolygon for intersection testing: drops rings that are
/// degenerate or carry non-finite coordinates, then normalizes
/// self-intersections through a boolean-ops pass (the union with an empty
/// geometry re-noded and re-wound the remainder). Returns `None` when
/// nothing usable is left.
pub fn repair(raw: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
    let usable: Vec<Polygon<f64>> = raw
        .iter()
        .filter(|poly| ring_usable(poly))
        .cloned()
        .collect();
    if usable.is_empty() {
        return None;
    }
    let cleaned = MultiPolygon::new(usable).union(&MultiPolygon::new(Vec::new()));
    if cleaned.0.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn ring_usable(poly: &Polygon<f64>) -> bool {
    let exterior = poly.exterior();
    // a closed ring needs at least a triangle: 3 vertices + closing point
    exterior.0.len() >= 4 && exterior.0.iter().all(|c| c.x.is_finite() && c.y.is_finite())
}
