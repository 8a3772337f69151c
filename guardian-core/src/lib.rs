pub mod countdown;
pub mod mailbox;
pub mod resolver;
pub mod status;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use countdown::Countdown;
pub use mailbox::Mailbox;
pub use status::{
    DeviceStatus, Event, MotionReport, ParsePhaseError, Phase, Policy, StatusSample,
};

// Boxed strings for values that never grow after construction.
type BoxStr = Box<str>;

/// Stable identifier of a guardian unit, e.g. `esp32_smart_guardian`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub BoxStr);

impl DeviceId {
    /// Pseudo device used for server lifecycle log lines.
    pub fn system() -> Self {
        Self("SYSTEM".into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Instruction waiting for the device to pick it up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    RelayOn,
    RelayOff,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::RelayOn => "relay_on",
            Command::RelayOff => "relay_off",
        }
    }
}

/// Kind of operator override.
///
/// Unrecognized kinds are kept verbatim so they can still be recorded in the
/// decision history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DecisionKind {
    KeepPower,
    PowerOff,
    Reset,
    Unknown(BoxStr),
}

impl DecisionKind {
    pub fn as_str(&self) -> &str {
        match self {
            DecisionKind::KeepPower => "keep_power",
            DecisionKind::PowerOff => "power_off",
            DecisionKind::Reset => "reset",
            DecisionKind::Unknown(kind) => kind,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, DecisionKind::Unknown(_))
    }
}

impl From<&str> for DecisionKind {
    fn from(value: &str) -> Self {
        match value {
            "keep_power" => DecisionKind::KeepPower,
            "power_off" => DecisionKind::PowerOff,
            "reset" => DecisionKind::Reset,
            other => DecisionKind::Unknown(other.into()),
        }
    }
}

impl From<String> for DecisionKind {
    fn from(value: String) -> Self {
        DecisionKind::from(value.as_str())
    }
}

impl From<DecisionKind> for String {
    fn from(kind: DecisionKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A manual override issued by the operator. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub device_id: DeviceId,
    pub kind: DecisionKind,
    pub timestamp: jiff::Timestamp,
    pub note: BoxStr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid log level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            other => Err(ParseLevelError(other.to_owned())),
        }
    }
}

/// One line of the operator-facing event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub device_id: DeviceId,
    pub level: LogLevel,
    pub message: BoxStr,
    pub timestamp: jiff::Timestamp,
}

/// Coarse activity string kept on the device record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    MotionDetected,
    Idle,
}

impl Activity {
    pub fn from_motion(motion: bool) -> Self {
        if motion {
            Activity::MotionDetected
        } else {
            Activity::Idle
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::MotionDetected => "motion_detected",
            Activity::Idle => "idle",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid activity: {0}")]
pub struct ParseActivityError(pub String);

impl FromStr for Activity {
    type Err = ParseActivityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "motion_detected" => Ok(Activity::MotionDetected),
            "idle" => Ok(Activity::Idle),
            other => Err(ParseActivityError(other.to_owned())),
        }
    }
}

/// Latest persisted snapshot of a device, one row per device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub status: Activity,
    pub last_seen: jiff::Timestamp,
    pub pending_action: bool,
    pub last_decision: Option<DecisionKind>,
    pub created_at: jiff::Timestamp,
}
