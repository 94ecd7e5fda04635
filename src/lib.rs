pub mod actors;
pub mod aggregator;
pub mod alerts;
pub mod broadcast;
pub mod config;
pub mod discord;
pub mod error;
pub mod fleet;
pub mod model;
pub mod monitors;
pub mod remote;
pub mod sources;
pub mod storage;
pub mod util;

use serde::{Deserialize, Serialize};

/// One telemetry reading taken from a transmitter's management interface
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Telemetry {
    /// Output power in kW
    pub power_output: f64,

    /// Signal quality in percent (0-100)
    pub signal_quality: f64,

    /// Cabinet temperature in °C
    pub temperature: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voltage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
}

/// Partial metric update applied to a transmitter
///
/// Every `None` field keeps the transmitter's current value. `uptime_increment`
/// is added to the uptime counter (seconds).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpdate {
    pub power_output: Option<f64>,
    pub signal_quality: Option<f64>,
    pub temperature: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    #[serde(default)]
    pub uptime_increment: u64,
}

impl MetricsUpdate {
    /// Build a full update from a telemetry sample
    pub fn from_telemetry(telemetry: Telemetry, uptime_increment: u64) -> Self {
        Self {
            power_output: Some(telemetry.power_output),
            signal_quality: Some(telemetry.signal_quality),
            temperature: Some(telemetry.temperature),
            voltage: telemetry.voltage,
            current: telemetry.current,
            uptime_increment,
        }
    }
}
