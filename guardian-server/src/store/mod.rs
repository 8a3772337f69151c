pub mod memory;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;
use guardian_core::{Activity, Decision, DeviceId, DeviceRecord, LogEntry, StatusSample};
use jiff::Timestamp;

pub use memory::MemoryStore;
pub use models::{StoredDecision, StoredLog};
pub use sqlite::SqliteStore;

/// Samples kept in the status history: 24 hours at one sample every 3 s.
pub const STATUS_HISTORY_RETAIN: usize = 28_800;

/// History sink for the coordinator.
///
/// The live device state never lives here: the store only keeps what an
/// operator needs to look back at (log lines, decisions, the last-seen
/// snapshot per device). Writes are append or upsert only; reads are
/// "most recent N", newest first.
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    /// Error type specific to this store implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one line to the event log.
    async fn append_log(&self, entry: LogEntry) -> Result<(), Self::Error>;

    /// Append a decision and stamp it on the device record, clearing any
    /// pending-action flag.
    async fn record_decision(&self, decision: Decision) -> Result<(), Self::Error>;

    /// Create or refresh the device record with its latest activity.
    async fn upsert_device(
        &self,
        device_id: &DeviceId,
        status: Activity,
        seen_at: Timestamp,
    ) -> Result<(), Self::Error>;

    /// Flag (or clear) that the device is waiting on an operator decision.
    async fn set_pending_action(&self, device_id: &DeviceId, pending: bool)
    -> Result<(), Self::Error>;

    /// Most recent log lines, optionally for one device.
    async fn recent_logs(
        &self,
        device_id: Option<&DeviceId>,
        limit: usize,
    ) -> Result<Vec<StoredLog>, Self::Error>;

    /// Most recent decisions, optionally for one device.
    async fn recent_decisions(
        &self,
        device_id: Option<&DeviceId>,
        limit: usize,
    ) -> Result<Vec<StoredDecision>, Self::Error>;

    /// All known device records.
    async fn devices(&self) -> Result<Vec<DeviceRecord>, Self::Error>;

    /// Append a phase sample, then drop all but the newest `retain` samples.
    async fn add_status_sample(
        &self,
        sample: StatusSample,
        retain: usize,
    ) -> Result<(), Self::Error>;

    /// Most recent phase samples, newest first.
    async fn status_history(&self, limit: usize) -> Result<Vec<StatusSample>, Self::Error>;
}
