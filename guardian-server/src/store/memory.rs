use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use guardian_core::{Activity, Decision, DeviceId, DeviceRecord, LogEntry, StatusSample};
use jiff::Timestamp;

use crate::store::models::{StoredDecision, StoredLog};
use crate::store::Store;

/// In-memory store.
/// Used for tests and for deployments that do not need history to survive
/// a restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    next_log_id: i64,
    next_decision_id: i64,
    logs: Vec<StoredLog>,
    decisions: Vec<StoredDecision>,
    devices: HashMap<DeviceId, DeviceRecord>,
    history: VecDeque<StatusSample>,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryStoreError {
    #[error("mutex poisoned: {0}")]
    MutexPoisoned(String),
}

impl<T> From<PoisonError<T>> for MemoryStoreError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryStoreError::MutexPoisoned(err.to_string())
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Error = MemoryStoreError;

    async fn append_log(&self, entry: LogEntry) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;

        inner.next_log_id += 1;
        let id = inner.next_log_id;
        inner.logs.push(StoredLog { id, entry });

        Ok(())
    }

    async fn record_decision(&self, decision: Decision) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;

        if let Some(record) = inner.devices.get_mut(&decision.device_id) {
            record.last_decision = Some(decision.kind.clone());
            record.pending_action = false;
        }

        inner.next_decision_id += 1;
        let id = inner.next_decision_id;
        inner.decisions.push(StoredDecision { id, decision });

        Ok(())
    }

    async fn upsert_device(
        &self,
        device_id: &DeviceId,
        status: Activity,
        seen_at: Timestamp,
    ) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;

        inner
            .devices
            .entry(device_id.clone())
            .and_modify(|record| {
                record.status = status;
                record.last_seen = seen_at;
            })
            .or_insert_with(|| DeviceRecord {
                device_id: device_id.clone(),
                status,
                last_seen: seen_at,
                pending_action: false,
                last_decision: None,
                created_at: seen_at,
            });

        Ok(())
    }

    async fn set_pending_action(
        &self,
        device_id: &DeviceId,
        pending: bool,
    ) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;

        if let Some(record) = inner.devices.get_mut(device_id) {
            record.pending_action = pending;
        }

        Ok(())
    }

    async fn recent_logs(
        &self,
        device_id: Option<&DeviceId>,
        limit: usize,
    ) -> Result<Vec<StoredLog>, Self::Error> {
        let inner = self.inner.lock()?;

        let mut logs: Vec<_> = inner
            .logs
            .iter()
            .filter(|log| device_id.is_none_or(|id| &log.entry.device_id == id))
            .cloned()
            .collect();

        logs.sort_by(|a, b| {
            b.entry
                .timestamp
                .cmp(&a.entry.timestamp)
                .then(b.id.cmp(&a.id))
        });
        logs.truncate(limit);

        Ok(logs)
    }

    async fn recent_decisions(
        &self,
        device_id: Option<&DeviceId>,
        limit: usize,
    ) -> Result<Vec<StoredDecision>, Self::Error> {
        let inner = self.inner.lock()?;

        let mut decisions: Vec<_> = inner
            .decisions
            .iter()
            .filter(|d| device_id.is_none_or(|id| &d.decision.device_id == id))
            .cloned()
            .collect();

        decisions.sort_by(|a, b| {
            b.decision
                .timestamp
                .cmp(&a.decision.timestamp)
                .then(b.id.cmp(&a.id))
        });
        decisions.truncate(limit);

        Ok(decisions)
    }

    async fn devices(&self) -> Result<Vec<DeviceRecord>, Self::Error> {
        let inner = self.inner.lock()?;

        let mut devices: Vec<_> = inner.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.device_id.as_str().cmp(b.device_id.as_str()));

        Ok(devices)
    }

    async fn add_status_sample(
        &self,
        sample: StatusSample,
        retain: usize,
    ) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock()?;

        // samples arrive in time order, so the front is always the oldest
        inner.history.push_back(sample);
        while inner.history.len() > retain {
            inner.history.pop_front();
        }

        Ok(())
    }

    async fn status_history(&self, limit: usize) -> Result<Vec<StatusSample>, Self::Error> {
        let inner = self.inner.lock()?;

        Ok(inner.history.iter().rev().take(limit).copied().collect())
    }
}
