use async_trait::async_trait;
use guardian_core::{
    Activity, Command, Decision, DecisionKind, DeviceId, DeviceRecord, Event, LogEntry, LogLevel,
    MotionReport, Phase, Policy, StatusSample,
};
use guardian_server::Coordinator;
use guardian_server::config::DeviceConfig;
use guardian_server::store::{MemoryStore, Store, StoredDecision, StoredLog};
use jiff::Timestamp;

const DEVICE: &str = "esp32_smart_guardian";

fn at(secs: i64) -> Timestamp {
    Timestamp::from_second(1_700_000_000 + secs).unwrap()
}

fn config(policy: Policy, heartbeat_timeout_secs: Option<u64>) -> DeviceConfig {
    DeviceConfig {
        id: DEVICE.to_string(),
        countdown_secs: 180,
        policy,
        tick_interval_ms: 1000,
        sample_interval_secs: 3,
        heartbeat_timeout_secs,
    }
}

fn coordinator() -> (Coordinator<MemoryStore>, MemoryStore) {
    let store = MemoryStore::default();
    let coordinator = Coordinator::new(&config(Policy::Countdown, None), store.clone());
    (coordinator, store)
}

fn motion(motion: bool) -> MotionReport {
    MotionReport {
        motion,
        relay: motion,
    }
}

async fn report(coordinator: &Coordinator<impl Store>, value: bool, secs: i64) {
    coordinator
        .report_motion(DeviceId::from(DEVICE), motion(value), at(secs))
        .await;
}

async fn messages(store: &MemoryStore) -> Vec<String> {
    let mut logs = store.recent_logs(None, 100).await.unwrap();
    logs.reverse();
    logs.into_iter()
        .map(|log| log.entry.message.into())
        .collect()
}

#[tokio::test]
async fn motion_then_quiet_powers_off_after_countdown() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    let status = coordinator.snapshot(at(0)).await;
    assert!(status.relay_active);
    assert_eq!(status.pending_command(), Some(Command::RelayOn));
    assert_eq!(coordinator.poll_command(at(1)).await, Some(Command::RelayOn));

    report(&coordinator, false, 10).await;
    let status = coordinator.snapshot(at(10)).await;
    assert!(status.countdown.active);
    assert!(status.relay_active);
    assert_eq!(status.phase(), Phase::Countdown);

    assert_eq!(coordinator.tick(at(189)).await, None);
    assert_eq!(coordinator.tick(at(190)).await, Some(Command::RelayOff));

    let status = coordinator.snapshot(at(190)).await;
    assert!(!status.relay_active);
    assert!(!status.countdown.active);
    assert_eq!(coordinator.poll_command(at(191)).await, Some(Command::RelayOff));
    assert_eq!(coordinator.poll_command(at(192)).await, None);

    assert_eq!(
        messages(&store).await,
        [
            "motion detected, power held",
            "no motion, countdown started",
            "countdown expired, auto power-off",
        ]
    );
}

#[tokio::test]
async fn status_read_fires_overdue_countdown() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    report(&coordinator, false, 10).await;

    // no scheduler running: the read itself evaluates the countdown
    let status = coordinator.snapshot(at(500)).await;
    assert!(!status.relay_active);
    assert_eq!(status.pending_command(), Some(Command::RelayOff));
    assert_eq!(
        messages(&store).await.last().map(String::as_str),
        Some("countdown expired, auto power-off")
    );
}

#[tokio::test]
async fn repeated_reports_are_idempotent() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    coordinator.poll_command(at(0)).await;
    report(&coordinator, true, 5).await;
    report(&coordinator, true, 9).await;

    let status = coordinator.snapshot(at(9)).await;
    assert_eq!(status.last_motion_time, Some(at(0)));
    assert_eq!(status.last_update, Some(at(9)));
    assert_eq!(status.pending_command(), None);
    assert_eq!(messages(&store).await, ["motion detected, power held"]);
}

#[tokio::test]
async fn reports_update_device_record() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    let record = store.devices().await.unwrap().remove(0);
    assert_eq!(record.status, Activity::MotionDetected);
    assert!(record.pending_action);

    report(&coordinator, false, 4).await;
    let record = store.devices().await.unwrap().remove(0);
    assert_eq!(record.status, Activity::Idle);
    assert_eq!(record.last_seen, at(4));
}

#[tokio::test]
async fn keep_power_during_countdown_is_recorded_once() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    coordinator.poll_command(at(0)).await;
    report(&coordinator, false, 10).await;

    let event = coordinator
        .apply_decision(DecisionKind::KeepPower, "stay on", at(20))
        .await;
    assert_eq!(event, Some(Event::KeepPower));

    let status = coordinator.snapshot(at(400)).await;
    assert!(!status.countdown.active);
    assert!(status.relay_active);
    assert_eq!(status.pending_command(), Some(Command::RelayOn));

    let decisions = store.recent_decisions(None, 10).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decision.kind, DecisionKind::KeepPower);
    assert_eq!(&*decisions[0].decision.note, "stay on");

    let record = store.devices().await.unwrap().remove(0);
    assert_eq!(record.last_decision, Some(DecisionKind::KeepPower));
    assert!(!record.pending_action);
}

#[tokio::test]
async fn power_off_and_reset_decisions() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    coordinator
        .apply_decision(DecisionKind::PowerOff, "", at(1))
        .await;
    let status = coordinator.snapshot(at(1)).await;
    assert!(!status.relay_active);
    assert_eq!(status.pending_command(), Some(Command::RelayOff));

    coordinator.apply_decision(DecisionKind::Reset, "", at(2)).await;
    let status = coordinator.snapshot(at(2)).await;
    assert!(!status.motion_detected);
    assert!(!status.relay_active);
    assert_eq!(status.pending_command(), None);

    let tail: Vec<_> = messages(&store).await.into_iter().skip(1).collect();
    assert_eq!(tail, ["manual power-off", "system reset"]);
}

#[tokio::test]
async fn unknown_decision_is_recorded_without_effect() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    report(&coordinator, false, 10).await;
    let before = coordinator.snapshot(at(11)).await;

    let event = coordinator
        .apply_decision(DecisionKind::from("noop"), "", at(11))
        .await;
    assert_eq!(event, None);

    assert_eq!(coordinator.snapshot(at(11)).await, before);

    let decisions = store.recent_decisions(None, 10).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].decision.kind.as_str(), "noop");
}

#[tokio::test]
async fn restart_loses_live_state_but_keeps_history() {
    let (coordinator, store) = coordinator();

    report(&coordinator, true, 0).await;
    report(&coordinator, false, 10).await;
    drop(coordinator);

    let restarted = Coordinator::new(&config(Policy::Countdown, None), store.clone());
    let status = restarted.snapshot(at(500)).await;
    assert!(!status.connected);
    assert!(!status.countdown.active);
    assert!(!status.relay_active);
    assert_eq!(status.pending_command(), None);
    assert_eq!(status.phase(), Phase::Offline);

    assert_eq!(store.recent_logs(None, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn announce_startup_seeds_device_and_logs() {
    let (coordinator, store) = coordinator();

    coordinator.announce_startup(at(0)).await;

    let logs = store.recent_logs(None, 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].entry.device_id, DeviceId::system());
    assert_eq!(&*logs[0].entry.message, "server started");

    let devices = store.devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].device_id.as_str(), DEVICE);
    assert_eq!(devices[0].status, Activity::Idle);
}

#[tokio::test]
async fn heartbeat_expiry_is_opt_in() {
    let (coordinator, _) = coordinator();
    report(&coordinator, false, 0).await;
    assert!(!coordinator.expire_heartbeat(at(10_000)).await);
    assert!(coordinator.snapshot(at(10_000)).await.connected);

    let store = MemoryStore::default();
    let coordinator = Coordinator::new(&config(Policy::Countdown, Some(60)), store.clone());
    report(&coordinator, true, 0).await;

    assert!(!coordinator.expire_heartbeat(at(60)).await);
    assert!(coordinator.expire_heartbeat(at(61)).await);
    assert!(!coordinator.expire_heartbeat(at(62)).await);

    let status = coordinator.snapshot(at(61)).await;
    assert!(!status.connected);
    assert!(status.motion_detected);

    let logs = store.recent_logs(None, 1).await.unwrap();
    assert_eq!(logs[0].entry.level, LogLevel::Warning);
    assert_eq!(&*logs[0].entry.message, "device heartbeat lost");

    // the next report brings it back
    report(&coordinator, true, 70).await;
    assert!(coordinator.snapshot(at(70)).await.connected);
}

#[tokio::test]
async fn mirror_policy_follows_device() {
    let store = MemoryStore::default();
    let coordinator = Coordinator::new(&config(Policy::Mirror, None), store.clone());

    coordinator
        .report_motion(
            DeviceId::from(DEVICE),
            MotionReport {
                motion: true,
                relay: false,
            },
            at(0),
        )
        .await;
    let status = coordinator.snapshot(at(0)).await;
    assert!(status.motion_detected);
    assert!(!status.relay_active);
    assert_eq!(status.pending_command(), None);

    report(&coordinator, false, 10).await;
    let status = coordinator.snapshot(at(1000)).await;
    assert!(!status.countdown.active);
    assert_eq!(status.pending_command(), None);

    assert_eq!(messages(&store).await, ["motion detected, power held"]);
}

#[tokio::test]
async fn sample_status_records_current_phase() {
    let (coordinator, store) = coordinator();

    coordinator.sample_status(at(0)).await;
    report(&coordinator, true, 1).await;
    coordinator.sample_status(at(3)).await;
    report(&coordinator, false, 4).await;
    coordinator.sample_status(at(6)).await;

    let phases: Vec<_> = store
        .status_history(10)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.phase)
        .collect();
    assert_eq!(phases, [Phase::Countdown, Phase::Occupied, Phase::Offline]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_report_decision_and_tick_never_interleave() {
    for round in 0..200 {
        let (coordinator, store) = coordinator();

        // leave an overdue countdown behind so the tick has work to race for
        report(&coordinator, true, 0).await;
        report(&coordinator, false, 10).await;
        coordinator.poll_command(at(11)).await;

        let now = at(500);
        let reporter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { report(&coordinator, true, 500).await })
        };
        let operator = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .apply_decision(DecisionKind::PowerOff, "", now)
                    .await
            })
        };
        let ticker = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.tick(now).await })
        };

        let (reported, applied, _) = tokio::join!(reporter, operator, ticker);
        reported.unwrap();
        assert_eq!(applied.unwrap(), Some(Event::PowerOff));

        // whichever call ran first has cleared the countdown, so this read's own tick is a no-op
        let status = coordinator.snapshot(now).await;
        assert!(!status.countdown.active, "round {round}");
        assert!(status.motion_detected, "round {round}");
        match status.pending_command() {
            Some(Command::RelayOff) => assert!(!status.relay_active, "round {round}"),
            Some(Command::RelayOn) => assert!(status.relay_active, "round {round}"),
            None => panic!("round {round}: mailbox empty"),
        }

        assert_eq!(store.recent_decisions(None, 10).await.unwrap().len(), 1);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("store unavailable")]
struct Unavailable;

#[derive(Clone)]
struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    type Error = Unavailable;

    async fn append_log(&self, _entry: LogEntry) -> Result<(), Self::Error> {
        Err(Unavailable)
    }

    async fn record_decision(&self, _decision: Decision) -> Result<(), Self::Error> {
        Err(Unavailable)
    }

    async fn upsert_device(
        &self,
        _device_id: &DeviceId,
        _status: Activity,
        _seen_at: Timestamp,
    ) -> Result<(), Self::Error> {
        Err(Unavailable)
    }

    async fn set_pending_action(
        &self,
        _device_id: &DeviceId,
        _pending: bool,
    ) -> Result<(), Self::Error> {
        Err(Unavailable)
    }

    async fn recent_logs(
        &self,
        _device_id: Option<&DeviceId>,
        _limit: usize,
    ) -> Result<Vec<StoredLog>, Self::Error> {
        Err(Unavailable)
    }

    async fn recent_decisions(
        &self,
        _device_id: Option<&DeviceId>,
        _limit: usize,
    ) -> Result<Vec<StoredDecision>, Self::Error> {
        Err(Unavailable)
    }

    async fn devices(&self) -> Result<Vec<DeviceRecord>, Self::Error> {
        Err(Unavailable)
    }

    async fn add_status_sample(
        &self,
        _sample: StatusSample,
        _retain: usize,
    ) -> Result<(), Self::Error> {
        Err(Unavailable)
    }

    async fn status_history(&self, _limit: usize) -> Result<Vec<StatusSample>, Self::Error> {
        Err(Unavailable)
    }
}

#[tokio::test]
async fn store_failures_do_not_roll_back_state() {
    let coordinator = Coordinator::new(&config(Policy::Countdown, None), FailingStore);

    coordinator.announce_startup(at(0)).await;
    report(&coordinator, true, 0).await;
    assert_eq!(coordinator.poll_command(at(0)).await, Some(Command::RelayOn));

    report(&coordinator, false, 10).await;
    assert_eq!(coordinator.tick(at(190)).await, Some(Command::RelayOff));

    let event = coordinator
        .apply_decision(DecisionKind::KeepPower, "", at(200))
        .await;
    assert_eq!(event, Some(Event::KeepPower));

    let status = coordinator.snapshot(at(200)).await;
    assert!(status.relay_active);
    assert_eq!(status.pending_command(), Some(Command::RelayOn));

    let sample = coordinator.sample_status(at(201)).await;
    assert_eq!(sample.phase, Phase::Powered);
}
