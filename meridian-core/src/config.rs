//! Pipeline configuration: the vantage-point table and tunables.
//!
//! Everything the estimation formulas consume lives here as explicit,
//! immutable data so tests can substitute synthetic deployments.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use geo::Point;
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// A fixed-location measurement node identified by its region code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VantagePoint {
    pub region: String,
    pub lat: f64,
    pub lon: f64,
}

impl VantagePoint {
    pub fn new(region: &str, lat: f64, lon: f64) -> Self {
        Self {
            region: region.to_string(),
            lat,
            lon,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

/// Physical assumptions turning elapsed time into distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationModel {
    #[serde(default = "default_speed_of_light")]
    pub speed_of_light_km_s: f64,
    #[serde(default = "default_fiber_factor")]
    pub fiber_factor: f64,
    #[serde(default = "default_routing_factor_min")]
    pub routing_factor_min: f64,
    #[serde(default = "default_routing_factor_max")]
    pub routing_factor_max: f64,
    #[serde(default = "default_startup_overhead_ms")]
    pub startup_overhead_ms: f64,
}

impl Default for PropagationModel {
    fn default() -> Self {
        Self {
            speed_of_light_km_s: SPEED_OF_LIGHT_KM_S,
            fiber_factor: FIBER_FACTOR,
            routing_factor_min: ROUTING_FACTOR_MIN,
            routing_factor_max: ROUTING_FACTOR_MAX,
            startup_overhead_ms: STARTUP_OVERHEAD_MS,
        }
    }
}

/// Candidate sampling density and floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerConfig {
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_samples_per_million_km2")]
    pub samples_per_million_km2: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLE_POINTS,
            samples_per_million_km2: SAMPLES_PER_MILLION_KM2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub vantage_points: Vec<VantagePoint>,
    #[serde(default)]
    pub propagation: PropagationModel,
    #[serde(default)]
    pub sampling: SamplerConfig,
    #[serde(default = "default_max_offset_deviation_ms")]
    pub max_offset_deviation_ms: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vantage_points: vec![
                VantagePoint::new("eu-central-1", 50.1109, 8.6821),
                VantagePoint::new("eu-west-1", 53.3498, -6.2603),
                VantagePoint::new("ap-northeast-1", 35.6762, 139.6503),
                VantagePoint::new("ap-south-1", 19.0760, 72.8777),
                VantagePoint::new("sa-east-1", -23.5505, -46.6333),
                VantagePoint::new("us-east-1", 39.0438, -77.4874),
                VantagePoint::new("us-west-2", 33.7490, -116.4568),
                VantagePoint::new("af-south-1", -33.9249, 18.4241),
            ],
            propagation: PropagationModel::default(),
            sampling: SamplerConfig::default(),
            max_offset_deviation_ms: MAX_OFFSET_DEVIATION_MS,
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let data = fs::read(path)?;
        let cfg: Self = serde_json::from_slice(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        cfg.validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.vantage_points.is_empty() {
            return Err("config needs at least one vantage point".to_string());
        }
        for vp in &self.vantage_points {
            if !(-90.0..=90.0).contains(&vp.lat) || !(-180.0..=180.0).contains(&vp.lon) {
                return Err(format!("vantage point {} has out-of-range coordinates", vp.region));
            }
        }
        let p = &self.propagation;
        if p.routing_factor_min < 1.0 || p.routing_factor_max < p.routing_factor_min {
            return Err("routing factors must satisfy 1.0 <= min <= max".to_string());
        }
        if self.max_offset_deviation_ms <= 0.0 {
            return Err("maxOffsetDeviationMs must be positive".to_string());
        }
        Ok(())
    }

    /// Vantage coordinates keyed by region code.
    pub fn vantage_by_region(&self) -> HashMap<String, Point<f64>> {
        self.vantage_points
            .iter()
            .map(|vp| (vp.region.clone(), vp.point()))
            .collect()
    }
}

fn default_speed_of_light() -> f64 {
    SPEED_OF_LIGHT_KM_S
}

fn default_fiber_factor() -> f64 {
    FIBER_FACTOR
}

fn default_routing_factor_min() -> f64 {
    ROUTING_FACTOR_MIN
}

fn default_routing_factor_max() -> f64 {
    ROUTING_FACTOR_MAX
}

fn default_startup_overhead_ms() -> f64 {
    STARTUP_OVERHEAD_MS
}

fn default_min_samples() -> usize {
    MIN_SAMPLE_POINTS
}

fn default_samples_per_million_km2() -> f64 {
    SAMPLES_PER_MILLION_KM2
}

fn default_max_offset_deviation_ms() -> f64 {
    MAX_OFFSET_DEVIATION_MS
}
