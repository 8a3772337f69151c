use guardian_core::{Command, DeviceRecord, DeviceStatus, Phase, Policy, StatusSample};
use jiff::{Timestamp, tz::TimeZone};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::store::{StoredDecision, StoredLog};

/// Fractional Unix seconds, the wire format for every timestamp.
pub fn epoch(ts: Timestamp) -> f64 {
    ts.as_millisecond() as f64 / 1000.0
}

/// Wall-clock rendering in the server's time zone.
pub fn time_str(ts: Timestamp) -> String {
    ts.to_zoned(TimeZone::system())
        .strftime("%Y-%m-%d %H:%M:%S")
        .to_string()
}

// Firmware sends booleans as true/false, 0/1 or strings depending on the
// build. Anything unrecognized reads as false.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "on"
        ),
        _ => false,
    })
}

// Numeric ids are accepted and stringified; any other non-string is absent.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_code<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_u64().and_then(|n| u8::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusReportRequest {
    #[serde(default, deserialize_with = "lenient_id")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub motion: bool,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub relay: bool,
    /// Compact encoding used by older firmware; wins over `motion`/`relay`
    /// when it carries a known code.
    #[serde(default, deserialize_with = "lenient_code")]
    pub situation: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub device_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

impl AckResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeviceStatusView {
    pub connected: bool,
    pub motion_detected: bool,
    pub relay_active: bool,
    pub last_update: Option<f64>,
    pub last_motion_time: Option<f64>,
    pub countdown_active: bool,
    pub countdown_start: Option<f64>,
    pub countdown_duration: f64,
    pub remaining_time: f64,
    pub pending_command: Option<Command>,
    pub policy: Policy,
    pub phase: Phase,
}

impl DeviceStatusView {
    pub fn new(status: &DeviceStatus, now: Timestamp) -> Self {
        let countdown = &status.countdown;
        Self {
            connected: status.connected,
            motion_detected: status.motion_detected,
            relay_active: status.relay_active,
            last_update: status.last_update.map(epoch),
            last_motion_time: status.last_motion_time.map(epoch),
            countdown_active: countdown.active,
            countdown_start: countdown.active.then(|| epoch(countdown.start)),
            countdown_duration: countdown.duration.as_secs_f64(),
            remaining_time: countdown.remaining(now).as_secs_f64(),
            pending_command: status.pending_command(),
            policy: status.policy,
            phase: status.phase(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub device_id: String,
    pub status: DeviceStatusView,
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub device_id: String,
    pub command: Option<Command>,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogView {
    pub id: i64,
    pub device_id: String,
    pub level: String,
    pub message: String,
    pub timestamp: f64,
    pub time_str: String,
}

impl From<StoredLog> for LogView {
    fn from(log: StoredLog) -> Self {
        let entry = log.entry;
        Self {
            id: log.id,
            device_id: entry.device_id.to_string(),
            level: entry.level.as_str().to_string(),
            message: entry.message.into(),
            timestamp: epoch(entry.timestamp),
            time_str: time_str(entry.timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<LogView>,
}

#[derive(Debug, Serialize)]
pub struct DecisionView {
    pub id: i64,
    pub device_id: String,
    pub decision: String,
    pub note: String,
    pub timestamp: f64,
    pub time_str: String,
}

impl From<StoredDecision> for DecisionView {
    fn from(stored: StoredDecision) -> Self {
        let decision = stored.decision;
        Self {
            id: stored.id,
            device_id: decision.device_id.to_string(),
            decision: decision.kind.to_string(),
            note: decision.note.into(),
            timestamp: epoch(decision.timestamp),
            time_str: time_str(decision.timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionsResponse {
    pub decisions: Vec<DecisionView>,
}

#[derive(Debug, Serialize)]
pub struct DeviceView {
    pub device_id: String,
    pub status: String,
    pub last_seen: f64,
    pub pending_action: bool,
    pub last_decision: Option<String>,
    pub created_time: f64,
}

impl From<DeviceRecord> for DeviceView {
    fn from(record: DeviceRecord) -> Self {
        Self {
            device_id: record.device_id.to_string(),
            status: record.status.as_str().to_string(),
            last_seen: epoch(record.last_seen),
            pending_action: record.pending_action,
            last_decision: record.last_decision.map(String::from),
            created_time: epoch(record.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceView>,
}

#[derive(Debug, Serialize)]
pub struct SampleView {
    pub phase: Phase,
    pub timestamp: f64,
    pub time_str: String,
}

impl From<StatusSample> for SampleView {
    fn from(sample: StatusSample) -> Self {
        Self {
            phase: sample.phase,
            timestamp: epoch(sample.timestamp),
            time_str: time_str(sample.timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<SampleView>,
}

#[derive(Debug, Serialize)]
pub struct FullStatusResponse {
    pub device_id: String,
    pub status: DeviceStatusView,
    pub remaining_time: f64,
    pub devices: Vec<DeviceView>,
    pub logs: Vec<LogView>,
    /// `logs` without DEBUG lines, newest 100.
    pub info_logs: Vec<LogView>,
    pub history: Vec<SampleView>,
    pub timestamp: f64,
}
