use std::str::FromStr;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};

use crate::{Command, Countdown, LogLevel, Mailbox};

/// How device reports are turned into relay decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Motion holds power; losing motion starts the auto power-off countdown.
    #[default]
    Countdown,
    /// The record mirrors what the device reports. No countdown, no
    /// automatic commands.
    Mirror,
}

/// Display-level summary of the status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Offline,
    Occupied,
    Countdown,
    Powered,
    Idle,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Offline => "offline",
            Phase::Occupied => "occupied",
            Phase::Countdown => "countdown",
            Phase::Powered => "powered",
            Phase::Idle => "idle",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid phase: {0}")]
pub struct ParsePhaseError(pub String);

impl FromStr for Phase {
    type Err = ParsePhaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(Phase::Offline),
            "occupied" => Ok(Phase::Occupied),
            "countdown" => Ok(Phase::Countdown),
            "powered" => Ok(Phase::Powered),
            "idle" => Ok(Phase::Idle),
            other => Err(ParsePhaseError(other.to_owned())),
        }
    }
}

/// The phase observed at one sampling instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSample {
    pub phase: Phase,
    pub timestamp: Timestamp,
}

/// State transition worth writing to the operator log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    MotionDetected,
    MotionCleared,
    CountdownExpired,
    KeepPower,
    PowerOff,
    Reset,
    HeartbeatLost,
}

impl Event {
    pub fn level(&self) -> LogLevel {
        match self {
            Event::HeartbeatLost => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Event::MotionDetected => "motion detected, power held",
            Event::MotionCleared => "no motion, countdown started",
            Event::CountdownExpired => "countdown expired, auto power-off",
            Event::KeepPower => "manual keep-power",
            Event::PowerOff => "manual power-off",
            Event::Reset => "system reset",
            Event::HeartbeatLost => "device heartbeat lost",
        }
    }
}

/// What the device observed on its last poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotionReport {
    pub motion: bool,
    pub relay: bool,
}

impl MotionReport {
    /// Compact situation codes sent by the minimal firmware:
    /// 1 = someone present, 2 = nobody but light on, 3 = nobody and light off.
    pub fn from_situation(code: u8) -> Option<Self> {
        let (motion, relay) = match code {
            1 => (true, true),
            2 => (false, true),
            3 => (false, false),
            _ => return None,
        };

        Some(Self { motion, relay })
    }
}

/// The live status record of the single device served by this process.
///
/// Never persisted: a restart starts again from [`DeviceStatus::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatus {
    pub connected: bool,
    pub motion_detected: bool,
    pub relay_active: bool,
    pub last_update: Option<Timestamp>,
    pub last_motion_time: Option<Timestamp>,
    pub countdown: Countdown,
    pub mailbox: Mailbox,
    pub policy: Policy,
}

impl DeviceStatus {
    pub fn new(countdown_duration: SignedDuration, policy: Policy) -> Self {
        Self {
            connected: false,
            motion_detected: false,
            relay_active: false,
            last_update: None,
            last_motion_time: None,
            countdown: Countdown::new(countdown_duration),
            mailbox: Mailbox::default(),
            policy,
        }
    }

    pub fn pending_command(&self) -> Option<Command> {
        self.mailbox.peek()
    }

    pub fn phase(&self) -> Phase {
        if !self.connected {
            Phase::Offline
        } else if self.motion_detected {
            Phase::Occupied
        } else if self.countdown.active {
            Phase::Countdown
        } else if self.relay_active {
            Phase::Powered
        } else {
            Phase::Idle
        }
    }

    /// Ingest a device report. Only an edge in the motion signal runs
    /// transition logic; repeated identical reports just refresh liveness.
    pub fn report(&mut self, report: MotionReport, now: Timestamp) -> Option<Event> {
        self.connected = true;
        self.last_update = Some(now);

        match self.policy {
            Policy::Countdown => self.report_countdown(report.motion, now),
            Policy::Mirror => self.report_mirror(report, now),
        }
    }

    fn report_countdown(&mut self, motion: bool, now: Timestamp) -> Option<Event> {
        if motion == self.motion_detected {
            return None;
        }

        if motion {
            self.motion_detected = true;
            self.last_motion_time = Some(now);
            self.relay_active = true;
            self.countdown.cancel();
            self.mailbox.enqueue(Command::RelayOn);
            Some(Event::MotionDetected)
        } else {
            // relay_active stays as is until the countdown fires
            self.motion_detected = false;
            self.countdown.start(now);
            Some(Event::MotionCleared)
        }
    }

    fn report_mirror(&mut self, report: MotionReport, now: Timestamp) -> Option<Event> {
        self.relay_active = report.relay;

        if report.motion == self.motion_detected {
            return None;
        }

        self.motion_detected = report.motion;
        if report.motion {
            self.last_motion_time = Some(now);
            Some(Event::MotionDetected)
        } else {
            None
        }
    }

    /// Fire the auto power-off if the countdown has run out.
    pub fn tick(&mut self, now: Timestamp) -> Option<Command> {
        if !self.countdown.expired(now) {
            return None;
        }

        self.countdown.cancel();
        self.relay_active = false;
        self.mailbox.enqueue(Command::RelayOff);
        Some(Command::RelayOff)
    }

    /// Mark the device offline when it has been silent longer than `timeout`.
    pub fn expire_heartbeat(&mut self, now: Timestamp, timeout: SignedDuration) -> Option<Event> {
        let last_update = self.last_update?;
        if !self.connected || now.duration_since(last_update) <= timeout {
            return None;
        }

        self.connected = false;
        Some(Event::HeartbeatLost)
    }
}
