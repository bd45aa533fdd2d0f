use clap::Parser;
use geo::{LineString, MultiPolygon, Polygon};
use meridian_core::record::now_unix_ms;
use meridian_core::{
    fit, CountryAtlas, DistanceBound, LandMask, MeasurementRecord, OriginReport, PipelineConfig,
    PointFit,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_WINDOW_HOURS: f64 = 20.0;

#[derive(Parser, Debug)]
#[command(about = "Estimate a client's physical origin from relayed-nonce latency logs")]
struct Args {
    /// Pipeline config JSON; the built-in eight-region deployment is used
    /// when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSONL measurement records, one per line.
    #[arg(long)]
    records: PathBuf,

    /// GeoJSON country boundaries (ISO_A3 feature property).
    #[arg(long)]
    countries: PathBuf,

    /// Restrict the batch to records from this source IP.
    #[arg(long)]
    ip: Option<String>,

    /// Restrict the batch to records younger than this many hours.
    #[arg(long, default_value_t = DEFAULT_WINDOW_HOURS)]
    window_hours: f64,

    #[arg(long)]
    claim_lat: Option<f64>,

    #[arg(long)]
    claim_lon: Option<f64>,

    /// Seed for the candidate sampler; entropy-seeded when omitted.
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisOutput {
    report: OriginReport,
    claim_checks: Option<Vec<fit::ClaimCheck>>,
}

fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    let records = load_jsonl(&args.records)?;
    let cutoff_ms = if args.window_hours > 0.0 {
        Some(now_unix_ms() - (args.window_hours * 3_600_000.0) as i64)
    } else {
        None
    };
    let batch = meridian_core::record::filter_batch(&records, args.ip.as_deref(), cutoff_ms);

    let atlas = CountryAtlas::from_geometries(load_countries(&args.countries)?);
    let land = LandMask::build(&atlas);

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let report = match meridian_core::run_pipeline(&batch, &atlas, &land, &cfg, &mut rng) {
        Ok(report) => report,
        Err(err) => {
            if args.json {
                println!("{}", serde_json::json!({ "error": err.to_string() }));
            } else {
                println!("Estimate unavailable: {err}");
            }
            return Ok(());
        }
    };

    let claim = match (args.claim_lat, args.claim_lon) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        _ => None,
    };
    let claim_checks = claim.map(|(lat, lon)| {
        let bounds: HashMap<String, DistanceBound> = report
            .regions
            .iter()
            .map(|r| {
                (
                    r.region.clone(),
                    DistanceBound {
                        min_km: r.min_km,
                        max_km: r.max_km,
                    },
                )
            })
            .collect();
        fit::claim_checks(&bounds, &cfg.vantage_by_region(), lat, lon)
    });

    if args.json {
        let output = AnalysisOutput {
            report,
            claim_checks,
        };
        let text = serde_json::to_string_pretty(&output)
            .unwrap_or_else(|_| "{\"error\":\"failed to serialize\"}".to_string());
        println!("{text}");
        return Ok(());
    }

    println!(
        "Batch: {} of {} records in window, {} countries loaded",
        batch.len(),
        records.len(),
        atlas.len()
    );
    print_sessions(&report);
    print_regions(&report);

    println!(
        "\nAnchor: {} ({} candidates sampled, {} on land, {} hull vertices)",
        report.anchor_region,
        report.sampled_points,
        report.points.len(),
        report.hull.len()
    );
    if report.countries.is_empty() {
        println!("Possible countries: none (no hull overlap)");
    } else {
        println!("Possible countries: {}", report.countries.join(", "));
    }
    if let Some(fit) = &report.fit {
        print_fit(fit);
    }

    if let Some((lat, lon)) = claim {
        println!("\nClaim check: lat={:.4}, lon={:.4}", lat, lon);
        if let Some(ref checks) = claim_checks {
            print_claim_checks(checks);
        }
    }

    Ok(())
}

fn load_jsonl(path: &PathBuf) -> io::Result<Vec<MeasurementRecord>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MeasurementRecord>(&line) {
            Ok(rec) => out.push(rec),
            Err(_) => {}
        }
    }
    Ok(out)
}

fn load_countries(path: &PathBuf) -> io::Result<Vec<(String, MultiPolygon<f64>)>> {
    let file = File::open(path)?;
    let geojson: Value = serde_json::from_reader(file)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(parse_countries(&geojson))
}

/// Pulls (ISO_A3 code, geometry) pairs from a GeoJSON FeatureCollection.
/// Features without a usable code (the dataset marks some territories
/// with "-99") or geometry are skipped; only exterior rings are kept.
fn parse_countries(geojson: &Value) -> Vec<(String, MultiPolygon<f64>)> {
    let features = match geojson["features"].as_array() {
        Some(features) => features,
        None => return Vec::new(),
    };
    let mut out = Vec::new();
    for feature in features {
        let code = feature["properties"]["ISO_A3"]
            .as_str()
            .unwrap_or("-99")
            .to_string();
        if code == "-99" {
            continue;
        }
        let geometry = &feature["geometry"];
        let coords = &geometry["coordinates"];
        let polygons: Vec<Polygon<f64>> = match geometry["type"].as_str() {
            Some("Polygon") => parse_ring(&coords[0]).into_iter().collect(),
            Some("MultiPolygon") => match coords.as_array() {
                Some(polys) => polys.iter().filter_map(|p| parse_ring(&p[0])).collect(),
                None => Vec::new(),
            },
            _ => Vec::new(),
        };
        if !polygons.is_empty() {
            out.push((code, MultiPolygon::new(polygons)));
        }
    }
    out
}

fn parse_ring(ring: &Value) -> Option<Polygon<f64>> {
    let positions = ring.as_array()?;
    let mut coords = Vec::with_capacity(positions.len());
    for pos in positions {
        let lon = pos[0].as_f64()?;
        let lat = pos[1].as_f64()?;
        coords.push((lon, lat));
    }
    if coords.len() < 4 {
        return None;
    }
    Some(Polygon::new(LineString::from(coords), vec![]))
}

fn print_sessions(report: &OriginReport) {
    let valid = report.sessions.iter().filter(|s| s.valid).count();
    println!(
        "\nSessions (median offset {:.2} ms, {} valid of {}):",
        report.median_offset_ms,
        valid,
        report.sessions.len()
    );
    for s in &report.sessions {
        let marker = if s.valid { "" } else { " EXCLUDED" };
        println!(
            "- {} offset={:.2}ms deviation={:.2}ms{}",
            s.nonce, s.offset_ms, s.deviation_ms, marker
        );
    }
}

fn print_regions(report: &OriginReport) {
    println!("\nRegion latencies and distance bounds:");
    for r in &report.regions {
        println!(
            "- {} latency={:.2}ms dist_km=[{:.1}, {:.1}]",
            r.region, r.latency_ms, r.min_km, r.max_km
        );
    }
}

fn print_fit(fit: &PointFit) {
    println!(
        "Point fit: lat={:.4}, lon={:.4}, bias={:.2}ms, sse={:.2}, regions_used={}",
        fit.lat, fit.lon, fit.bias_ms, fit.sse, fit.regions_used
    );
}

fn print_claim_checks(checks: &[fit::ClaimCheck]) {
    for c in checks {
        println!(
            "- {} dist={:.1}km bound=[{:.1}, {:.1}] falsified={}",
            c.region, c.dist_km, c.min_km, c.max_km, c.falsified
        );
    }
}
