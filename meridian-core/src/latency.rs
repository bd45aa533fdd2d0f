//! Per-region minimum-latency aggregation.

use std::collections::HashMap;

use tracing::debug;

use crate::offset::SessionOffset;
use crate::record::MeasurementRecord;

/// Computes, for every region with at least one receipt in a valid
/// session, the minimum offset-corrected one-way latency:
/// `region_receipt - (client_received + offset)`.
///
/// The minimum (not mean) is the estimator: true latency is a lower
/// bound corrupted upward by queuing and jitter, so one favorable sample
/// reveals the propagation floor. Regions with no observation are simply
/// absent from the result.
pub fn region_min_latencies(
    sessions: &HashMap<String, Vec<&MeasurementRecord>>,
    offsets: &[SessionOffset],
) -> HashMap<String, f64> {
    let mut minima: HashMap<String, f64> = HashMap::new();
    for session in offsets.iter().filter(|s| s.valid) {
        let Some(records) = sessions.get(&session.nonce) else {
            continue;
        };
        let Some(client_received) = records
            .iter()
            .find(|r| r.is_client())
            .and_then(|r| r.client_received_nonce_timestamp)
        else {
            continue;
        };
        for rec in records {
            let (Some(region), Some(receipt)) =
                (rec.aws_region_of_slave.as_ref(), rec.lambda_start_timestamp)
            else {
                continue;
            };
            let latency = receipt as f64 - (client_received as f64 + session.offset_ms);
            minima
                .entry(region.clone())
                .and_modify(|min| {
                    if latency < *min {
                        *min = latency;
                    }
                })
                .or_insert(latency);
        }
    }
    debug!(regions = minima.len(), "aggregated minimum latencies");
    minima
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::NonceEvent;

    const TEST_EPSILON: f64 = 1e-9;

    fn client(nonce: &str, client_received: i64) -> MeasurementRecord {
        MeasurementRecord {
            nonce: nonce.to_string(),
            event: NonceEvent::Other,
            lambda_start_timestamp: None,
            nonce_sent_time: None,
            client_start_timestamp: Some(client_received - 10),
            client_received_nonce_timestamp: Some(client_received),
            aws_region_of_slave: None,
            ip: None,
        }
    }

    fn receipt(nonce: &str, region: &str, ts: i64) -> MeasurementRecord {
        MeasurementRecord {
            nonce: nonce.to_string(),
            event: NonceEvent::Other,
            lambda_start_timestamp: Some(ts),
            nonce_sent_time: None,
            client_start_timestamp: None,
            client_received_nonce_timestamp: None,
            aws_region_of_slave: Some(region.to_string()),
            ip: None,
        }
    }

    fn offset(nonce: &str, offset_ms: f64, valid: bool) -> SessionOffset {
        SessionOffset {
            nonce: nonce.to_string(),
            offset_ms,
            deviation_ms: 0.0,
            valid,
        }
    }

    fn sessions_of(records: &[MeasurementRecord]) -> HashMap<String, Vec<&MeasurementRecord>> {
        crate::record::group_by_nonce(records)
    }

    #[test]
    fn aggregate_is_the_minimum_over_valid_sessions() {
        let records = vec![
            client("a", 1000),
            receipt("a", "eu-central-1", 1045),
            client("b", 2000),
            receipt("b", "eu-central-1", 2060),
        ];
        let offsets = vec![offset("a", 5.0, true), offset("b", 5.0, true)];
        let minima = region_min_latencies(&sessions_of(&records), &offsets);
        // session a: 1045 - (1000 + 5) = 40; session b: 55
        assert!((minima["eu-central-1"] - 40.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn larger_observation_never_changes_the_aggregate() {
        let base = vec![client("a", 1000), receipt("a", "eu-central-1", 1045)];
        let offsets = vec![offset("a", 5.0, true), offset("b", 5.0, true)];
        let before = region_min_latencies(&sessions_of(&base), &offsets);

        let mut more = base.clone();
        more.push(client("b", 2000));
        more.push(receipt("b", "eu-central-1", 2100));
        let after = region_min_latencies(&sessions_of(&more), &offsets);
        assert_eq!(before["eu-central-1"], after["eu-central-1"]);

        let mut smaller = base;
        smaller.push(client("b", 2000));
        smaller.push(receipt("b", "eu-central-1", 2035));
        let lowered = region_min_latencies(&sessions_of(&smaller), &offsets);
        assert!((lowered["eu-central-1"] - 30.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn invalid_sessions_do_not_contribute() {
        let records = vec![
            client("a", 1000),
            receipt("a", "eu-central-1", 1045),
            client("out", 2000),
            receipt("out", "eu-central-1", 2001),
        ];
        let offsets = vec![offset("a", 5.0, true), offset("out", 80.0, false)];
        let minima = region_min_latencies(&sessions_of(&records), &offsets);
        assert!((minima["eu-central-1"] - 40.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn duplicate_receipts_in_one_session_feed_the_min() {
        let records = vec![
            client("a", 1000),
            receipt("a", "eu-central-1", 1045),
            receipt("a", "eu-central-1", 1038),
        ];
        let offsets = vec![offset("a", 5.0, true), offset("b", 5.0, true)];
        let minima = region_min_latencies(&sessions_of(&records), &offsets);
        assert!((minima["eu-central-1"] - 33.0).abs() < TEST_EPSILON);
    }

    #[test]
    fn regions_without_observations_are_absent() {
        let records = vec![client("a", 1000), client("b", 2000)];
        let offsets = vec![offset("a", 5.0, true), offset("b", 5.0, true)];
        let minima = region_min_latencies(&sessions_of(&records), &offsets);
        assert!(minima.is_empty());
    }
}
