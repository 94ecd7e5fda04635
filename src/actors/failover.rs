//! FailoverActor - automatic switch to the backup transmitter
//!
//! ```text
//! FleetEvent::AlertRaised / AlertRefreshed (critical, on a primary)
//!     │
//!     ▼
//! backup system with auto_switch_enabled and not active?
//!     │ yes
//!     ▼
//! wait switch_delay ──► alert still open? ──► activate_backup("auto-failover")
//! ```
//!
//! Each backup system has at most one switch scheduled at a time.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::model::{AlertSeverity, SwitchRecord, TransmissionAlert};

use super::fleet::FleetHandle;
use super::messages::{FailoverCommand, FleetEvent};

/// Actor name written to the audit log for automatic switches
pub const AUTO_FAILOVER_ACTOR: &str = "auto-failover";

type SwitchOutcome = (String, Result<Option<SwitchRecord>>);

pub struct FailoverActor {
    fleet: FleetHandle,
    event_rx: broadcast::Receiver<FleetEvent>,
    command_rx: mpsc::Receiver<FailoverCommand>,

    /// Backup systems with a switch currently scheduled
    pending: HashSet<String>,
    switches: JoinSet<SwitchOutcome>,
}

impl FailoverActor {
    pub fn new(
        fleet: FleetHandle,
        event_rx: broadcast::Receiver<FleetEvent>,
        command_rx: mpsc::Receiver<FailoverCommand>,
    ) -> Self {
        Self {
            fleet,
            event_rx,
            command_rx,
            pending: HashSet::new(),
            switches: JoinSet::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting failover actor");

        loop {
            tokio::select! {
                event = self.event_rx.recv() => {
                    match event {
                        Ok(FleetEvent::AlertRaised(alert) | FleetEvent::AlertRefreshed { alert, .. }) => {
                            if let Err(e) = self.on_alert(alert).await {
                                warn!("failed to evaluate failover: {:#}", e);
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("failover actor lagged, skipped {skipped} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("event channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(joined) = self.switches.join_next() => {
                    match joined {
                        Ok((backup_system_id, outcome)) => {
                            self.pending.remove(&backup_system_id);
                            match outcome {
                                Ok(Some(record)) => info!(
                                    "automatic failover {} → {} complete",
                                    record.primary_transmitter_id, record.backup_transmitter_id
                                ),
                                Ok(None) => debug!("failover via {backup_system_id} no longer needed"),
                                Err(e) => warn!("automatic failover via {backup_system_id} failed: {:#}", e),
                            }
                        }
                        Err(e) => warn!("failover task aborted: {e}"),
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        FailoverCommand::GetPending { respond_to } => {
                            let mut pending: Vec<_> = self.pending.iter().cloned().collect();
                            pending.sort();
                            let _ = respond_to.send(pending);
                        }

                        FailoverCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }
            }
        }

        self.switches.abort_all();
        debug!("failover actor stopped");
    }

    async fn on_alert(&mut self, alert: TransmissionAlert) -> Result<()> {
        if alert.severity != AlertSeverity::Critical || alert.resolved {
            return Ok(());
        }
        let Some(transmitter_id) = alert.transmitter_id.clone() else {
            return Ok(());
        };

        let Some(system) = self.fleet.backup_for_primary(&transmitter_id).await? else {
            debug!("no backup system for {transmitter_id}");
            return Ok(());
        };
        if !system.auto_switch_enabled || system.is_active || self.pending.contains(&system.id) {
            return Ok(());
        }

        info!(
            "critical {} on {transmitter_id}; switching to {} in {}s",
            alert.alert_type, system.backup_transmitter_id, system.switch_delay
        );

        self.pending.insert(system.id.clone());
        let fleet = self.fleet.clone();
        let delay = Duration::from_secs(system.switch_delay);
        let alert_id = alert.id;
        self.switches.spawn(async move {
            tokio::time::sleep(delay).await;
            let outcome = switch_if_still_failing(&fleet, &system.id, &alert_id).await;
            (system.id, outcome)
        });

        Ok(())
    }
}

/// Activate the backup unless the triggering alert was resolved meanwhile
async fn switch_if_still_failing(
    fleet: &FleetHandle,
    backup_system_id: &str,
    alert_id: &str,
) -> Result<Option<SwitchRecord>> {
    let still_open = fleet
        .active_alerts()
        .await?
        .iter()
        .any(|a| a.id == alert_id);
    if !still_open {
        return Ok(None);
    }

    let record = fleet
        .activate_backup(backup_system_id, AUTO_FAILOVER_ACTOR)
        .await?;
    Ok(Some(record))
}

#[derive(Clone)]
pub struct FailoverHandle {
    sender: mpsc::Sender<FailoverCommand>,
}

impl FailoverHandle {
    pub fn spawn(fleet: FleetHandle) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let event_rx = fleet.subscribe();
        let actor = FailoverActor::new(fleet, event_rx, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Ids of backup systems with a switch scheduled
    pub async fn pending(&self) -> Result<Vec<String>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(FailoverCommand::GetPending { respond_to: tx })
            .await
            .context("failed to send GetPending command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(FailoverCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
