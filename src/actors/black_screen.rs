//! BlackScreenActor - periodically probes live broadcast channels
//!
//! ```text
//! Timer tick → live channels → BlackScreenProbe::probe → detect_black_screen
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, error, instrument, warn};

use crate::{broadcast::BlackScreenDetection, monitors::BlackScreenProbe};

use super::MIN_TICK;
use super::fleet::FleetHandle;
use super::messages::BlackScreenCommand;

pub struct BlackScreenActor {
    fleet: FleetHandle,
    probe: Arc<dyn BlackScreenProbe>,
    command_rx: mpsc::Receiver<BlackScreenCommand>,
    interval_duration: Duration,
}

impl BlackScreenActor {
    pub fn new(
        fleet: FleetHandle,
        probe: Arc<dyn BlackScreenProbe>,
        command_rx: mpsc::Receiver<BlackScreenCommand>,
        interval_duration: Duration,
    ) -> Self {
        Self {
            fleet,
            probe,
            command_rx,
            interval_duration: interval_duration.max(MIN_TICK),
        }
    }

    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting black screen actor");

        let mut ticker = interval(self.interval_duration);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scan().await {
                        error!("black screen scan failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        BlackScreenCommand::ScanNow { respond_to } => {
                            let _ = respond_to.send(self.scan().await);
                        }

                        BlackScreenCommand::Shutdown => {
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

        debug!("black screen actor stopped");
    }

    /// Probe every live channel once, returning what was recorded
    async fn scan(&self) -> Result<Vec<BlackScreenDetection>> {
        let channels = self
            .fleet
            .live_broadcast_channels()
            .await
            .context("failed to list live channels")?;

        let mut detections = Vec::new();
        for channel in channels {
            let Some(duration_secs) = self.probe.probe(&channel) else {
                continue;
            };

            match self.fleet.detect_black_screen(&channel.id, duration_secs).await {
                Ok(Some(detection)) => detections.push(detection),
                Ok(None) => {}
                Err(e) => warn!("failed to record black screen on {}: {:#}", channel.id, e),
            }
        }

        Ok(detections)
    }
}

#[derive(Clone)]
pub struct BlackScreenHandle {
    sender: mpsc::Sender<BlackScreenCommand>,
}

impl BlackScreenHandle {
    pub fn spawn(fleet: FleetHandle, probe: Arc<dyn BlackScreenProbe>, interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = BlackScreenActor::new(fleet, probe, cmd_rx, interval);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Probe every live channel now
    pub async fn scan_now(&self) -> Result<Vec<BlackScreenDetection>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(BlackScreenCommand::ScanNow { respond_to: tx })
            .await
            .context("failed to send ScanNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(BlackScreenCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
