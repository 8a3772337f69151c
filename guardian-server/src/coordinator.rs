use std::sync::Arc;

use guardian_core::{
    Activity, Command, Decision, DecisionKind, DeviceId, DeviceStatus, Event, LogEntry, LogLevel,
    MotionReport, StatusSample,
};
use jiff::{SignedDuration, Timestamp};
use tokio::sync::Mutex;
use tracing::{Level, debug, error, info, warn};

use crate::config::DeviceConfig;
use crate::store::{STATUS_HISTORY_RETAIN, Store};

/// Owner of the live [`DeviceStatus`].
///
/// Every read and read-modify-write of the record happens under one lock, so
/// a device report, an operator decision and a scheduler tick are applied
/// one after another, never interleaved. Store writes run after the lock is
/// released and after the mutation they describe; they are best-effort and
/// a failing store never rolls back in-memory state.
pub struct Coordinator<S> {
    status: Arc<Mutex<DeviceStatus>>,
    store: S,
    device_id: DeviceId,
    heartbeat_timeout: Option<SignedDuration>,
}

impl<S: Clone> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            status: Arc::clone(&self.status),
            store: self.store.clone(),
            device_id: self.device_id.clone(),
            heartbeat_timeout: self.heartbeat_timeout,
        }
    }
}

impl<S: Store> Coordinator<S> {
    pub fn new(config: &DeviceConfig, store: S) -> Self {
        Self {
            status: Arc::new(Mutex::new(DeviceStatus::new(
                config.countdown(),
                config.policy,
            ))),
            store,
            device_id: config.device_id(),
            heartbeat_timeout: config.heartbeat_timeout(),
        }
    }

    /// The device this process serves.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Seed the device record and note the boot in the event log.
    pub async fn announce_startup(&self, now: Timestamp) {
        if let Err(e) = self
            .store
            .upsert_device(&self.device_id, Activity::Idle, now)
            .await
        {
            error!(error = %e, device_id = %self.device_id, "failed to seed device record");
        }

        self.append_log(DeviceId::system(), LogLevel::Info, "server started", now)
            .await;
    }

    /// Ingest a motion report from the device.
    pub async fn report_motion(&self, device_id: DeviceId, report: MotionReport, now: Timestamp) {
        let event = {
            let mut status = self.status.lock().await;
            status.report(report, now)
        };

        debug!(
            device_id = %device_id,
            motion = report.motion,
            relay = report.relay,
            "device report"
        );

        if let Some(event) = event {
            self.record_event(&device_id, event, now).await;
        }

        if let Err(e) = self
            .store
            .upsert_device(&device_id, Activity::from_motion(report.motion), now)
            .await
        {
            error!(error = %e, device_id = %device_id, "failed to update device record");
        }

        if report.motion
            && let Err(e) = self.store.set_pending_action(&device_id, true).await
        {
            error!(error = %e, device_id = %device_id, "failed to flag pending action");
        }
    }

    /// Fire the auto power-off if the countdown has run out.
    pub async fn tick(&self, now: Timestamp) -> Option<Command> {
        let fired = {
            let mut status = self.status.lock().await;
            status.tick(now)
        };

        if fired.is_some() {
            self.record_event(&self.device_id, Event::CountdownExpired, now)
                .await;
        }

        fired
    }

    /// Current record after evaluating the countdown.
    pub async fn snapshot(&self, now: Timestamp) -> DeviceStatus {
        let (fired, snapshot) = {
            let mut status = self.status.lock().await;
            let fired = status.tick(now);
            (fired, status.clone())
        };

        if fired.is_some() {
            self.record_event(&self.device_id, Event::CountdownExpired, now)
                .await;
        }

        snapshot
    }

    /// The device's polling read: evaluate the countdown, then take the
    /// pending command. Each command is handed out at most once.
    pub async fn poll_command(&self, now: Timestamp) -> Option<Command> {
        let (fired, command) = {
            let mut status = self.status.lock().await;
            let fired = status.tick(now);
            (fired, status.mailbox.drain())
        };

        if fired.is_some() {
            self.record_event(&self.device_id, Event::CountdownExpired, now)
                .await;
        }

        if let Some(command) = command {
            info!(device_id = %self.device_id, command = command.as_str(), "command delivered");
        }

        command
    }

    /// Apply an operator decision. The decision is always recorded; `None`
    /// means the kind was not recognized and nothing changed.
    pub async fn apply_decision(
        &self,
        kind: DecisionKind,
        note: impl Into<Box<str>>,
        now: Timestamp,
    ) -> Option<Event> {
        let decision = Decision {
            device_id: self.device_id.clone(),
            kind,
            timestamp: now,
            note: note.into(),
        };

        let event = {
            let mut status = self.status.lock().await;
            status.apply(&decision)
        };

        let kind = decision.kind.clone();
        if let Err(e) = self.store.record_decision(decision).await {
            error!(error = %e, decision = %kind, "failed to record decision");
        }

        match event {
            Some(event) => self.record_event(&self.device_id, event, now).await,
            None => warn!(decision = %kind, "unknown decision ignored"),
        }

        event
    }

    /// Mark the device offline when it has gone quiet. No-op unless a
    /// heartbeat timeout is configured.
    pub async fn expire_heartbeat(&self, now: Timestamp) -> bool {
        let Some(timeout) = self.heartbeat_timeout else {
            return false;
        };

        let event = {
            let mut status = self.status.lock().await;
            status.expire_heartbeat(now, timeout)
        };

        match event {
            Some(event) => {
                self.record_event(&self.device_id, event, now).await;
                true
            }
            None => false,
        }
    }

    /// Append the current phase to the status history.
    pub async fn sample_status(&self, now: Timestamp) -> StatusSample {
        let phase = self.status.lock().await.phase();
        let sample = StatusSample {
            phase,
            timestamp: now,
        };

        if let Err(e) = self
            .store
            .add_status_sample(sample, STATUS_HISTORY_RETAIN)
            .await
        {
            error!(error = %e, "failed to store status sample");
        }

        sample
    }

    async fn record_event(&self, device_id: &DeviceId, event: Event, now: Timestamp) {
        let level = tracing_level(event.level());
        if level == Level::ERROR {
            error!(device_id = %device_id, "{}", event.message());
        } else if level == Level::WARN {
            warn!(device_id = %device_id, "{}", event.message());
        } else if level == Level::INFO {
            info!(device_id = %device_id, "{}", event.message());
        } else {
            debug!(device_id = %device_id, "{}", event.message());
        }

        self.append_log(device_id.clone(), event.level(), event.message(), now)
            .await;
    }

    async fn append_log(&self, device_id: DeviceId, level: LogLevel, message: &str, now: Timestamp) {
        let entry = LogEntry {
            device_id,
            level,
            message: message.into(),
            timestamp: now,
        };

        if let Err(e) = self.store.append_log(entry).await {
            error!(error = %e, "failed to append log entry");
        }
    }
}

// Operator log levels mirrored onto tracing so both sinks agree.
fn tracing_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warning => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}
