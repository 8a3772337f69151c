use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use guardian_core::{DeviceId, Policy};
use jiff::SignedDuration;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub device: DeviceConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the HTTP server to listen on
    pub http_addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    /// Identifier of the single device served by this process
    pub id: String,
    /// Seconds between losing motion and the automatic power cut
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u64,
    #[serde(default)]
    pub policy: Policy,
    /// Interval in milliseconds between scheduler ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Seconds between status history samples
    #[serde(default = "default_sample_interval_secs")]
    pub sample_interval_secs: u64,
    /// Mark the device offline after this many silent seconds. Disabled when unset.
    #[serde(default)]
    pub heartbeat_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Sqlite { path: PathBuf },
}

fn default_countdown_secs() -> u64 {
    180
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_sample_interval_secs() -> u64 {
    3
}

impl DeviceConfig {
    pub fn device_id(&self) -> DeviceId {
        DeviceId::from(self.id.as_str())
    }

    pub fn countdown(&self) -> SignedDuration {
        secs(self.countdown_secs)
    }

    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn sample_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sample_interval_secs.max(1))
    }

    pub fn heartbeat_timeout(&self) -> Option<SignedDuration> {
        self.heartbeat_timeout_secs.map(secs)
    }
}

fn secs(value: u64) -> SignedDuration {
    SignedDuration::from_secs(i64::try_from(value).unwrap_or(i64::MAX))
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                http_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            },
            device: DeviceConfig {
                id: "esp32_smart_guardian".to_string(),
                countdown_secs: default_countdown_secs(),
                policy: Policy::Countdown,
                tick_interval_ms: default_tick_interval_ms(),
                sample_interval_secs: default_sample_interval_secs(),
                heartbeat_timeout_secs: None,
            },
            store: StoreConfig::Sqlite {
                path: PathBuf::from("guardian.db"),
            },
        }
    }
}
