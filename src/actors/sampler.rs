//! SamplerActor - periodically samples every online transmitter
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → online transmitters → MetricSource::sample → update_transmitter_metrics
//!     ↑                                                        (alerts + health in one turn)
//!     └─── Commands (SampleNow, UpdateInterval, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, trace, warn};

use crate::{MetricsUpdate, sources::MetricSource};

use super::MIN_TICK;
use super::fleet::FleetHandle;
use super::messages::{SampleReport, SamplerCommand};

pub struct SamplerActor {
    fleet: FleetHandle,
    source: Arc<dyn MetricSource>,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SamplerCommand>,

    /// Current sampling interval
    interval_duration: Duration,
}

impl SamplerActor {
    pub fn new(
        fleet: FleetHandle,
        source: Arc<dyn MetricSource>,
        command_rx: mpsc::Receiver<SamplerCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            fleet,
            source,
            command_rx,
            interval_duration: interval_duration.max(MIN_TICK),
        }
    }

    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting sampler actor");

        let mut ticker = interval(self.interval_duration);
        // the first tick completes immediately; skip it so the first sample
        // happens one interval after start
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sample_all().await {
                        error!("sampling round failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SamplerCommand::SampleNow { respond_to } => {
                            debug!("received SampleNow command");
                            let result = self.sample_all().await;
                            let _ = respond_to.send(result);
                        }

                        SamplerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = interval(self.interval_duration);
                            ticker.tick().await;
                        }

                        SamplerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("sampler actor stopped");
    }

    /// Sample every online transmitter once
    ///
    /// A failing transmitter is logged and skipped; the round carries on.
    async fn sample_all(&self) -> Result<SampleReport> {
        let transmitters = self
            .fleet
            .online_transmitters()
            .await
            .context("failed to list online transmitters")?;

        let uptime_increment = self.interval_duration.as_secs();
        let mut report = SampleReport::default();

        for transmitter in transmitters {
            let telemetry = match self.source.sample(&transmitter).await {
                Ok(telemetry) => telemetry,
                Err(e) => {
                    warn!("failed to sample {}: {:#}", transmitter.id, e);
                    report.failed += 1;
                    continue;
                }
            };

            let update = MetricsUpdate::from_telemetry(telemetry, uptime_increment);
            match self.fleet.update_transmitter_metrics(&transmitter.id, update).await {
                Ok(outcome) => {
                    trace!(
                        "{}: health {} ({} alerts)",
                        transmitter.id,
                        outcome.transmitter.health_score,
                        outcome.alerts.len()
                    );
                    report.sampled += 1;
                    report.alerts += outcome.alerts.len();
                }
                // removed between listing and update
                Err(e) => {
                    debug!("skipping {}: {:#}", transmitter.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Handle for controlling a SamplerActor
#[derive(Clone)]
pub struct SamplerHandle {
    sender: mpsc::Sender<SamplerCommand>,
}

impl SamplerHandle {
    pub fn spawn(fleet: FleetHandle, source: Arc<dyn MetricSource>, interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SamplerActor::new(fleet, source, cmd_rx, interval);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a sampling round now, bypassing the interval timer
    pub async fn sample_now(&self) -> Result<SampleReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SamplerCommand::SampleNow { respond_to: tx })
            .await
            .context("failed to send SampleNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(SamplerCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SamplerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
