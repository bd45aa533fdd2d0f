//! Clock-offset estimation and session validation.
//!
//! A session yields an NTP-style offset estimate from one master
//! generating record and one client record; sessions whose offset strays
//! too far from the batch median are excluded from every downstream step
//! but stay in the diagnostics.

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::record::MeasurementRecord;

/// One session's offset diagnostics. Invalid sessions are reported, not
/// silently dropped.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOffset {
    pub nonce: String,
    pub offset_ms: f64,
    pub deviation_ms: f64,
    pub valid: bool,
}

/// Estimates the client-to-master clock offset for one session:
/// `((lambda_start - client_start) + (nonce_sent - client_received)) / 2`,
/// assuming symmetric round-trip delay.
///
/// Returns `None` when the generating or client record is missing or
/// ambiguously duplicated. That is a filtering outcome, not an error.
pub fn session_offset(records: &[&MeasurementRecord]) -> Option<f64> {
    let mut generating: Option<(i64, i64)> = None;
    let mut client: Option<(i64, i64)> = None;
    for rec in records {
        if rec.is_generating() {
            if generating.is_some() {
                return None;
            }
            generating = Some((rec.lambda_start_timestamp?, rec.nonce_sent_time?));
        }
        if rec.is_client() {
            if client.is_some() {
                return None;
            }
            client = Some((
                rec.client_start_timestamp?,
                rec.client_received_nonce_timestamp?,
            ));
        }
    }
    let (lambda_start, nonce_sent) = generating?;
    let (client_start, client_received) = client?;
    Some(((lambda_start - client_start) + (nonce_sent - client_received)) as f64 / 2.0)
}

/// Validates session offsets against the batch median. Returns the
/// per-session diagnostics (sorted by nonce) and the median itself.
///
/// With fewer than two offsets the median carries no outlier information,
/// so the batch is rejected as insufficient.
pub fn validate_sessions(
    offsets: &HashMap<String, f64>,
    max_deviation_ms: f64,
) -> Result<(Vec<SessionOffset>, f64)> {
    if offsets.len() < 2 {
        return Err(PipelineError::InsufficientSessions {
            have: offsets.len(),
        });
    }
    let med = median(offsets.values().copied());
    let mut sessions: Vec<SessionOffset> = offsets
        .iter()
        .map(|(nonce, &offset_ms)| {
            let deviation_ms = (offset_ms - med).abs();
            SessionOffset {
                nonce: nonce.clone(),
                offset_ms,
                deviation_ms,
                valid: deviation_ms <= max_deviation_ms,
            }
        })
        .collect();
    sessions.sort_by(|a, b| a.nonce.cmp(&b.nonce));
    let valid = sessions.iter().filter(|s| s.valid).count();
    debug!(
        median_ms = med,
        valid,
        total = sessions.len(),
        "validated session offsets"
    );
    Ok((sessions, med))
}

/// Sort-based median; an even count averages the middle pair. Independent
/// of input ordering.
fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = v.len();
    if n % 2 == 1 {
        v[n / 2]
    } else {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NonceEvent;

    const TEST_EPSILON: f64 = 1e-9;
    const TEST_MAX_DEVIATION_MS: f64 = 20.0;

    fn generating(nonce: &str, lambda_start: i64, nonce_sent: i64) -> MeasurementRecord {
        MeasurementRecord {
            nonce: nonce.to_string(),
            event: NonceEvent::NonceGeneratedAtMaster,
            lambda_start_timestamp: Some(lambda_start),
            nonce_sent_time: Some(nonce_sent),
            client_start_timestamp: None,
            client_received_nonce_timestamp: None,
            aws_region_of_slave: None,
            ip: None,
        }
    }

    fn client(nonce: &str, client_start: i64, client_received: i64) -> MeasurementRecord {
        MeasurementRecord {
            nonce: nonce.to_string(),
            event: NonceEvent::Other,
            lambda_start_timestamp: None,
            nonce_sent_time: None,
            client_start_timestamp: Some(client_start),
            client_received_nonce_timestamp: Some(client_received),
            aws_region_of_slave: None,
            ip: None,
        }
    }

    #[test]
    fn offset_matches_formula_exactly() {
        let g = generating("n", 1000, 1010);
        let c = client("n", 900, 920);
        let offset = session_offset(&[&g, &c]).unwrap();
        // ((1000 - 900) + (1010 - 920)) / 2
        assert!((offset - 95.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn missing_records_yield_no_estimate() {
        let g = generating("n", 1000, 1010);
        assert!(session_offset(&[&g]).is_none());
        let c = client("n", 900, 920);
        assert!(session_offset(&[&c]).is_none());
        assert!(session_offset(&[]).is_none());
    }

    #[test]
    fn duplicated_records_yield_no_estimate() {
        let g1 = generating("n", 1000, 1010);
        let g2 = generating("n", 1001, 1011);
        let c = client("n", 900, 920);
        assert!(session_offset(&[&g1, &g2, &c]).is_none());
        let c2 = client("n", 901, 921);
        assert!(session_offset(&[&g1, &c, &c2]).is_none());
    }

    #[test]
    fn median_is_order_independent() {
        let a = median([5.0, 80.0, 6.0, 5.0].into_iter());
        let b = median([80.0, 5.0, 5.0, 6.0].into_iter());
        assert!((a - b).abs() < TEST_EPSILON);
        assert!((a - 5.5).abs() < TEST_EPSILON);
    }

    #[test]
    fn outlier_session_is_marked_invalid() {
        let mut offsets = HashMap::new();
        offsets.insert("a".to_string(), 5.0);
        offsets.insert("b".to_string(), 5.0);
        offsets.insert("c".to_string(), 6.0);
        offsets.insert("d".to_string(), 80.0);
        let (sessions, med) = validate_sessions(&offsets, TEST_MAX_DEVIATION_MS).unwrap();
        assert!((med - 5.5).abs() < TEST_EPSILON);
        let outlier = sessions.iter().find(|s| s.nonce == "d").unwrap();
        assert!(!outlier.valid);
        assert!((outlier.deviation_ms - 74.5).abs() < TEST_EPSILON);
        assert_eq!(sessions.iter().filter(|s| s.valid).count(), 3);
    }

    #[test]
    fn fewer_than_two_sessions_is_insufficient() {
        let mut offsets = HashMap::new();
        offsets.insert("a".to_string(), 5.0);
        let err = validate_sessions(&offsets, TEST_MAX_DEVIATION_MS).unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientSessions { have: 1 }));
    }
}
