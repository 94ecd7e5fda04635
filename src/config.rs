use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, ensure};
use serde::Deserialize;
use tracing::trace;

use crate::{
    broadcast::BroadcastChannel,
    fleet::FleetSettings,
    model::{AlertSeverity, NewBackupSystem, NewChannel, NewTransmitter},
    monitors::AlertThresholds,
    sources::{SimulationBounds, TelemetryEndpoint},
};

/// Daemon configuration
///
/// Every section is optional. Seed records (`transmitters`, `channels`,
/// `broadcast_channels`, `backup_systems`) use the same camelCase layout as
/// the persisted state and are only applied to an empty store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampler: SamplerConfig,

    #[serde(default)]
    pub black_screen: BlackScreenConfig,

    #[serde(default)]
    pub commands: CommandConfig,

    #[serde(default)]
    pub alerting: AlertingConfig,

    /// Outbound notification targets
    #[serde(default)]
    pub notify: Vec<NotifyTarget>,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Seconds between dashboard summary log lines
    #[serde(default = "default_dashboard_interval")]
    pub dashboard_interval: u64,

    #[serde(default)]
    pub transmitters: Vec<NewTransmitter>,

    #[serde(default)]
    pub channels: Vec<NewChannel>,

    #[serde(default)]
    pub broadcast_channels: Vec<BroadcastChannel>,

    #[serde(default)]
    pub backup_systems: Vec<NewBackupSystem>,
}

impl Config {
    /// Reject values the daemon cannot run with
    ///
    /// Zero intervals would stall the tickers and inverted simulation bounds
    /// would panic while clamping readings.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.sampler.interval > 0, "sampler.interval must be at least 1 second");
        if let SourceConfig::Simulated { bounds } = &self.sampler.source {
            bounds.validate().context("invalid sampler.source.bounds")?;
        }

        let bs = &self.black_screen;
        ensure!(bs.interval > 0, "black_screen.interval must be at least 1 second");
        ensure!(
            (0.0..=1.0).contains(&bs.probability),
            "black_screen.probability must be within 0..=1 (got {})",
            bs.probability
        );
        ensure!(
            bs.min_duration <= bs.max_duration,
            "black_screen.min_duration ({}) is above max_duration ({})",
            bs.min_duration,
            bs.max_duration
        );

        ensure!(
            self.storage.flush_interval() > 0,
            "storage.flush_interval must be at least 1 second"
        );
        ensure!(
            self.commands.timeout_secs > 0,
            "commands.timeout_secs must be at least 1 second"
        );
        Ok(())
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        FleetSettings {
            thresholds: self.alerting.thresholds,
            dedup_alerts: self.alerting.dedup,
            black_screen_threshold: self.black_screen.threshold,
            notify_black_screens: self.black_screen.notify,
        }
    }
}

fn default_dashboard_interval() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplerConfig {
    /// Seconds between sampling rounds
    #[serde(default = "default_sample_interval")]
    pub interval: u64,

    #[serde(default)]
    pub source: SourceConfig,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: default_sample_interval(),
            source: SourceConfig::default(),
        }
    }
}

fn default_sample_interval() -> u64 {
    5
}

/// Where telemetry comes from
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Random walk around the last readings
    Simulated {
        #[serde(default)]
        bounds: SimulationBounds,
    },

    /// Poll each transmitter's management interface
    Http {
        endpoints: HashMap<String, TelemetryEndpoint>,
        #[serde(default = "default_http_timeout")]
        timeout_secs: u64,
    },
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Simulated {
            bounds: SimulationBounds::default(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlackScreenConfig {
    /// Seconds between probes of the live channels
    #[serde(default = "default_black_screen_interval")]
    pub interval: u64,

    /// Black screens shorter than this (seconds) are ignored
    #[serde(default = "default_black_screen_threshold")]
    pub threshold: u32,

    /// Chance per live channel and tick that the simulated probe fires
    #[serde(default = "default_black_screen_probability")]
    pub probability: f64,

    #[serde(default = "default_black_screen_min")]
    pub min_duration: u32,

    #[serde(default = "default_black_screen_max")]
    pub max_duration: u32,

    /// Raise a notification for every recorded black screen
    #[serde(default = "default_true")]
    pub notify: bool,
}

impl Default for BlackScreenConfig {
    fn default() -> Self {
        Self {
            interval: default_black_screen_interval(),
            threshold: default_black_screen_threshold(),
            probability: default_black_screen_probability(),
            min_duration: default_black_screen_min(),
            max_duration: default_black_screen_max(),
            notify: true,
        }
    }
}

fn default_black_screen_interval() -> u64 {
    10
}

fn default_black_screen_threshold() -> u32 {
    5
}

fn default_black_screen_probability() -> f64 {
    0.05
}

fn default_black_screen_min() -> u32 {
    1
}

fn default_black_screen_max() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

/// Remote command execution timings
///
/// Read by [`RemoteControl::simulated`](crate::remote::RemoteControl::simulated)
/// for embedders that issue commands. The hub daemon has no command surface
/// of its own and only validates this section.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Delay before a pending command starts executing
    #[serde(default = "default_execute_delay_ms")]
    pub execute_delay_ms: u64,

    /// Time the simulated link takes to carry out a command
    #[serde(default = "default_link_delay_ms")]
    pub link_delay_ms: u64,

    /// Commands still executing after this long are failed
    #[serde(default = "default_command_timeout")]
    pub timeout_secs: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            execute_delay_ms: default_execute_delay_ms(),
            link_delay_ms: default_link_delay_ms(),
            timeout_secs: default_command_timeout(),
        }
    }
}

fn default_execute_delay_ms() -> u64 {
    1000
}

fn default_link_delay_ms() -> u64 {
    2000
}

fn default_command_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertingConfig {
    #[serde(default)]
    pub thresholds: AlertThresholds,

    /// Merge repeated alerts into the open one
    #[serde(default = "default_true")]
    pub dedup: bool,

    /// Switch to the backup transmitter on critical alerts
    #[serde(default = "default_true")]
    pub auto_failover: bool,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            dedup: true,
            auto_failover: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyTarget {
    /// Alerts below this severity are not pushed
    #[serde(default = "default_min_severity")]
    pub min_severity: AlertSeverity,

    pub alert: Alert,
}

fn default_min_severity() -> AlertSeverity {
    AlertSeverity::High
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alert {
    Discord(Discord),
    Webhook(Webhook),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// One JSON file per state key
    File {
        #[serde(default = "default_state_dir")]
        dir: PathBuf,

        #[serde(default = "default_flush_interval")]
        flush_interval: u64,
    },

    /// SQLite database
    Sqlite {
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,

        #[serde(default = "default_flush_interval")]
        flush_interval: u64,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::None
    }
}

impl StorageConfig {
    /// Seconds between flushes of changed keys
    pub fn flush_interval(&self) -> u64 {
        match self {
            StorageConfig::None => default_flush_interval(),
            StorageConfig::File { flush_interval, .. }
            | StorageConfig::Sqlite { flush_interval, .. } => *flush_interval,
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./transmission.db")
}

fn default_flush_interval() -> u64 {
    2
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate().context("Invalid configuration file provided")?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
