//! Physical constants and pipeline tuning defaults.

/// Speed of light in vacuum, km/s.
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Signal propagation speed in optical fiber relative to vacuum.
pub const FIBER_FACTOR: f64 = 2.0 / 3.0;

/// Best-case routing overhead (near-direct path).
pub const ROUTING_FACTOR_MIN: f64 = 1.1;

/// Worst-case routing overhead (heavy detours and electronics).
pub const ROUTING_FACTOR_MAX: f64 = 2.0;

/// Fixed relay startup overhead subtracted from every latency, ms.
pub const STARTUP_OVERHEAD_MS: f64 = 10.0;

/// Sessions whose clock offset deviates from the median by more than
/// this are excluded, ms.
pub const MAX_OFFSET_DEVIATION_MS: f64 = 20.0;

/// Floor on the candidate sample count, regardless of anchor area.
pub const MIN_SAMPLE_POINTS: usize = 100;

/// Candidate sample density inside the anchor circle.
pub const SAMPLES_PER_MILLION_KM2: f64 = 30.0;

/// Nominal routing factor used by the supplemental point fit.
pub const NOMINAL_ROUTING_FACTOR: f64 = 1.4;

pub const MS_PER_SEC: f64 = 1000.0;
pub const M_PER_KM: f64 = 1000.0;

pub const WORLD_LAT_MAX: f64 = 85.0;
pub const WORLD_LON_MAX: f64 = 180.0;
pub const DEFAULT_GRID_DEG: f64 = 5.0;
pub const DEFAULT_REFINE_DEG: f64 = 0.5;
pub const REFINE_WINDOW_MULT: f64 = 3.0;

/// A convex hull needs at least this many points.
pub const MIN_HULL_POINTS: usize = 3;
