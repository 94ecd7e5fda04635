//! Telemetry sources the sampler reads transmitters from
//!
//! - [`SimulatedSource`] perturbs the last known readings with bounded random
//!   noise
//! - [`HttpSource`] polls each transmitter's management interface at
//!   `GET http://{ip}:{port}/telemetry`

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use tracing::{instrument, trace};

use crate::{Telemetry, model::Transmitter};

#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Take one telemetry reading for a transmitter
    async fn sample(&self, transmitter: &Transmitter) -> Result<Telemetry>;
}

/// Bounds for the simulated random walk
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SimulationBounds {
    #[serde(default = "default_power_jitter")]
    pub power_jitter: f64,
    #[serde(default = "default_signal_jitter")]
    pub signal_jitter: f64,
    #[serde(default = "default_temperature_jitter")]
    pub temperature_jitter: f64,
    #[serde(default = "default_signal_min")]
    pub signal_min: f64,
    #[serde(default = "default_signal_max")]
    pub signal_max: f64,
    #[serde(default = "default_temperature_min")]
    pub temperature_min: f64,
    #[serde(default = "default_temperature_max")]
    pub temperature_max: f64,
}

fn default_power_jitter() -> f64 {
    1.0
}

fn default_signal_jitter() -> f64 {
    2.0
}

fn default_temperature_jitter() -> f64 {
    1.5
}

fn default_signal_min() -> f64 {
    70.0
}

fn default_signal_max() -> f64 {
    100.0
}

fn default_temperature_min() -> f64 {
    35.0
}

fn default_temperature_max() -> f64 {
    75.0
}

impl Default for SimulationBounds {
    fn default() -> Self {
        Self {
            power_jitter: default_power_jitter(),
            signal_jitter: default_signal_jitter(),
            temperature_jitter: default_temperature_jitter(),
            signal_min: default_signal_min(),
            signal_max: default_signal_max(),
            temperature_min: default_temperature_min(),
            temperature_max: default_temperature_max(),
        }
    }
}

impl SimulationBounds {
    /// Reject bounds the random walk cannot clamp into
    pub fn validate(&self) -> Result<()> {
        for (name, jitter) in [
            ("power_jitter", self.power_jitter),
            ("signal_jitter", self.signal_jitter),
            ("temperature_jitter", self.temperature_jitter),
        ] {
            if !jitter.is_finite() || jitter < 0.0 {
                bail!("{name} must be a finite, non-negative number (got {jitter})");
            }
        }
        for (name, min, max) in [
            ("signal", self.signal_min, self.signal_max),
            ("temperature", self.temperature_min, self.temperature_max),
        ] {
            if !min.is_finite() || !max.is_finite() {
                bail!("{name} bounds must be finite (got {min}..{max})");
            }
            if min > max {
                bail!("{name}_min ({min}) is above {name}_max ({max})");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SimulatedSource {
    bounds: SimulationBounds,
}

impl SimulatedSource {
    pub fn new(bounds: SimulationBounds) -> Self {
        Self { bounds }
    }

    fn jitter(rng: &mut impl Rng, amplitude: f64) -> f64 {
        if amplitude > 0.0 {
            rng.gen_range(-amplitude..=amplitude)
        } else {
            0.0
        }
    }

    /// Next reading from the transmitter's current values
    pub fn next_reading(&self, transmitter: &Transmitter) -> Telemetry {
        let b = &self.bounds;
        let mut rng = rand::thread_rng();

        let max_power = transmitter.power_input.max(0.0);
        let power_output =
            (transmitter.power_output + Self::jitter(&mut rng, b.power_jitter)).clamp(0.0, max_power);
        let signal_quality = (transmitter.signal_quality + Self::jitter(&mut rng, b.signal_jitter))
            .clamp(b.signal_min, b.signal_max);
        let temperature = (transmitter.temperature + Self::jitter(&mut rng, b.temperature_jitter))
            .clamp(b.temperature_min, b.temperature_max);

        Telemetry {
            power_output,
            signal_quality,
            temperature,
            voltage: None,
            current: None,
        }
    }
}

#[async_trait]
impl MetricSource for SimulatedSource {
    async fn sample(&self, transmitter: &Transmitter) -> Result<Telemetry> {
        Ok(self.next_reading(transmitter))
    }
}

/// Management interface of one transmitter
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TelemetryEndpoint {
    pub ip: IpAddr,
    pub port: u16,

    /// Sent as `X-MONITORING-SECRET` when set
    #[serde(default)]
    pub token: Option<String>,
}

pub struct HttpSource {
    /// HTTP client (reused across requests)
    client: reqwest::Client,

    /// Endpoint per transmitter id
    endpoints: HashMap<String, TelemetryEndpoint>,
}

impl HttpSource {
    pub fn new(endpoints: HashMap<String, TelemetryEndpoint>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, endpoints })
    }
}

#[async_trait]
impl MetricSource for HttpSource {
    #[instrument(skip_all, fields(transmitter = %transmitter.id))]
    async fn sample(&self, transmitter: &Transmitter) -> Result<Telemetry> {
        let Some(endpoint) = self.endpoints.get(&transmitter.id) else {
            bail!("no telemetry endpoint configured for {}", transmitter.id);
        };

        let url = format!("http://{}:{}/telemetry", endpoint.ip, endpoint.port);
        trace!("requesting telemetry from {url}");

        let mut request = self.client.get(&url);
        if let Some(token) = &endpoint.token {
            request = request.header("X-MONITORING-SECRET", token);
        }

        let response = request
            .send()
            .await
            .context("failed to send HTTP request")?;

        if !response.status().is_success() {
            bail!("HTTP error: {}", response.status());
        }

        let body = response
            .text()
            .await
            .context("failed to read response body")?;

        let telemetry: Telemetry =
            serde_json::from_str(&body).context("failed to parse telemetry JSON")?;

        trace!("successfully parsed telemetry");
        Ok(telemetry)
    }
}
