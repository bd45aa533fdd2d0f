//! Latency-based origin estimation.
//!
//! Given one-way latency measurements recorded at geographically fixed
//! vantage regions, the pipeline infers the client's clock offset, rejects
//! outlier sessions, converts per-region minimum latencies into physical
//! distance bounds, samples a weighted candidate point cloud inside the
//! tightest bound, and attributes the convex hull of the valid candidates
//! to a set of countries.
//!
//! The core is synchronous and stateless: every invocation takes an
//! explicit record batch, pre-built country geometry, a configuration, and
//! a random source, and produces an [`OriginReport`]. I/O (record
//! retrieval, geometry loading, rendering) belongs to callers.

pub mod config;
pub mod constants;
pub mod distance;
pub mod error;
pub mod fit;
pub mod geometry;
pub mod latency;
pub mod offset;
pub mod origin;
pub mod pipeline;
pub mod record;
pub mod sampler;

pub use config::{PipelineConfig, PropagationModel, SamplerConfig, VantagePoint};
pub use distance::DistanceBound;
pub use error::{PipelineError, Result};
pub use fit::{ClaimCheck, PointFit};
pub use geometry::{CountryAtlas, LandMask};
pub use offset::SessionOffset;
pub use pipeline::{estimate_origin, run_pipeline, OriginReport, RegionReport};
pub use record::{MeasurementRecord, NonceEvent};
pub use sampler::CandidatePoint;
