//! Measurement record data model and batch helpers.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Event tag carried by a measurement record. Only the master's
/// nonce-generation event is meaningful to the pipeline; every other tag
/// (relay receipts, client echoes, unknown strings) folds into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NonceEvent {
    #[serde(rename = "nonceGeneratedAtMaster")]
    NonceGeneratedAtMaster,
    #[default]
    #[serde(other, rename = "other")]
    Other,
}

/// One observation from a measurement session, as written by the
/// master/relay infrastructure. Immutable once ingested; fields are
/// optional because each record role carries a different subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    pub nonce: String,
    #[serde(default)]
    pub event: NonceEvent,
    /// Vantage-point local receipt time, ms.
    #[serde(default)]
    pub lambda_start_timestamp: Option<i64>,
    /// Master's send time; present only on the generating record.
    #[serde(default)]
    pub nonce_sent_time: Option<i64>,
    #[serde(default)]
    pub client_start_timestamp: Option<i64>,
    #[serde(default)]
    pub client_received_nonce_timestamp: Option<i64>,
    /// Region identifier; present only on relay-receipt records.
    #[serde(default)]
    pub aws_region_of_slave: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

impl MeasurementRecord {
    /// True for the master record that both generated the nonce and
    /// timestamped its dispatch.
    pub fn is_generating(&self) -> bool {
        self.event == NonceEvent::NonceGeneratedAtMaster
            && self.lambda_start_timestamp.is_some()
            && self.nonce_sent_time.is_some()
    }

    /// True for the client-originated record carrying both client-side
    /// timestamps.
    pub fn is_client(&self) -> bool {
        self.client_start_timestamp.is_some() && self.client_received_nonce_timestamp.is_some()
    }
}

/// Groups a batch into sessions keyed by nonce. Ordering within a group
/// is irrelevant to every downstream step.
pub fn group_by_nonce(records: &[MeasurementRecord]) -> HashMap<String, Vec<&MeasurementRecord>> {
    let mut sessions: HashMap<String, Vec<&MeasurementRecord>> = HashMap::new();
    for rec in records {
        sessions.entry(rec.nonce.clone()).or_default().push(rec);
    }
    sessions
}

/// Retains records relevant to one estimation run: source IP matches the
/// target (when given) and the vantage receipt time falls after the
/// cutoff (when given).
pub fn filter_batch(
    records: &[MeasurementRecord],
    target_ip: Option<&str>,
    cutoff_ms: Option<i64>,
) -> Vec<MeasurementRecord> {
    records
        .iter()
        .filter(|rec| match target_ip {
            Some(ip) => rec.ip.as_deref() == Some(ip),
            None => true,
        })
        .filter(|rec| match cutoff_ms {
            Some(cutoff) => rec.lambda_start_timestamp.map_or(false, |ts| ts > cutoff),
            None => true,
        })
        .cloned()
        .collect()
}

pub fn now_unix_ms() -> i64 {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64) * 1000 + (dur.subsec_millis() as i64)
}
