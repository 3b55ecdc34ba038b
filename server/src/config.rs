//! Runtime configuration.
//!
//! Values are layered: YAML file, then environment (`PORT`, `MODE`,
//! `REDIS_URL`), then command-line flags applied by the binary. Every field
//! has a default, so an empty file is a valid mock-mode config.

use crate::fleet::{DEFAULT_CONTROL_CHANNEL, DEFAULT_COUNT_PREFIX};
use serde::Deserialize;
use slotfactory_execution::games::WheelConfig;
use slotfactory_wss::WsConfig;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_TICK_MS: u64 = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for {name}: {value:?}")]
    Env { name: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Which adapters back identity and wallet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Any token is accepted and balances live in memory.
    #[default]
    Mock,
    /// Tokens are verified by the external identity provider.
    Real,
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "real" => Ok(Self::Real),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub host: IpAddr,
    pub port: u16,
    pub mode: Mode,
    pub auth_url: Option<String>,
    pub log_level: String,
    pub ws: WsSection,
    pub wallet: WalletSection,
    pub redis: RedisSection,
    pub games: GamesSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            mode: Mode::Mock,
            auth_url: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            ws: WsSection::default(),
            wallet: WalletSection::default(),
            redis: RedisSection::default(),
            games: GamesSection::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WsSection {
    pub write_wait_ms: Option<u64>,
    pub pong_wait_ms: Option<u64>,
    /// Zero or unset pings at nine tenths of the pong wait.
    pub ping_period_ms: Option<u64>,
    pub max_message_bytes: Option<usize>,
    pub outbound_buffer: Option<usize>,
    pub hub_buffer: Option<usize>,
}

/// Upstream wallet used in real mode.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletSection {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisSection {
    /// Unset runs without a fleet: counts and kick-all stay local.
    pub url: Option<String>,
    pub channel: String,
    pub count_prefix: String,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: None,
            channel: DEFAULT_CONTROL_CHANNEL.to_string(),
            count_prefix: DEFAULT_COUNT_PREFIX.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GamesSection {
    pub tick_ms: Option<u64>,
    pub wheel_betting_ticks: Option<u32>,
    pub wheel_waiting_ticks: Option<u32>,
}

impl AppConfig {
    /// Reads `path` (if any) and applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = lookup("PORT") {
            self.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { name: "PORT", value })?;
        }
        if let Some(value) = lookup("MODE") {
            self.mode = value
                .parse()
                .map_err(|_| ConfigError::Env { name: "MODE", value })?;
        }
        if let Some(value) = lookup("REDIS_URL") {
            if !value.trim().is_empty() {
                self.redis.url = Some(value);
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ws.pong_wait_ms == Some(0) {
            return Err(ConfigError::Invalid("ws.pong_wait_ms must be positive"));
        }
        if self.ws.outbound_buffer == Some(0) {
            return Err(ConfigError::Invalid("ws.outbound_buffer must be positive"));
        }
        if self.games.tick_ms == Some(0) {
            return Err(ConfigError::Invalid("games.tick_ms must be positive"));
        }
        if self.mode == Mode::Real {
            if is_blank(self.auth_url.as_deref()) {
                return Err(ConfigError::Invalid("auth_url is required in real mode"));
            }
            if is_blank(self.wallet.base_url.as_deref()) {
                return Err(ConfigError::Invalid("wallet.base_url is required in real mode"));
            }
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::Invalid("log_level must be one of trace, debug, info, warn, error"))
    }

    pub fn ws_config(&self) -> WsConfig {
        let millis = |value: Option<u64>| value.map(Duration::from_millis);
        WsConfig {
            write_wait: millis(self.ws.write_wait_ms),
            pong_wait: millis(self.ws.pong_wait_ms),
            ping_period: millis(self.ws.ping_period_ms),
            max_message_bytes: self.ws.max_message_bytes,
            outbound_buffer: self.ws.outbound_buffer,
            hub_buffer: self.ws.hub_buffer,
        }
    }

    pub fn wheel_config(&self) -> WheelConfig {
        let defaults = WheelConfig::default();
        WheelConfig {
            tick: Duration::from_millis(self.games.tick_ms.unwrap_or(DEFAULT_TICK_MS).max(1)),
            betting_ticks: self
                .games
                .wheel_betting_ticks
                .unwrap_or(defaults.betting_ticks)
                .max(1),
            waiting_ticks: self
                .games
                .wheel_waiting_ticks
                .unwrap_or(defaults.waiting_ticks)
                .max(1),
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}
