//! NotifierActor - pushes alerts and notifications to external targets
//!
//! ```text
//! FleetEvent::AlertRaised        ─┐
//! FleetEvent::AlertRefreshed (↑) ─┤
//! FleetEvent::AlertResolved      ─┼──► muted? ──► AlertManager (Discord / webhook)
//! FleetEvent::NotificationRaised ─┘
//! ```
//!
//! Refreshes of an already open alert are only pushed again when they raise
//! its severity. A mute expires on its own once `muted_until` has passed.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::{alerts::AlertManager, model::AlertSeverity};

use super::messages::{FleetEvent, NotifierCommand, NotifierStatus};

pub struct NotifierActor {
    alert_manager: AlertManager,

    /// Command receiver
    command_rx: mpsc::Receiver<NotifierCommand>,

    /// Fleet event receiver (broadcast subscription)
    event_rx: broadcast::Receiver<FleetEvent>,

    muted_until: Option<DateTime<Utc>>,
    sent: u64,
    suppressed: u64,
}

impl NotifierActor {
    pub fn new(
        alert_manager: AlertManager,
        command_rx: mpsc::Receiver<NotifierCommand>,
        event_rx: broadcast::Receiver<FleetEvent>,
    ) -> Self {
        Self {
            alert_manager,
            command_rx,
            event_rx,
            muted_until: None,
            sent: 0,
            suppressed: 0,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting notifier actor");

        loop {
            tokio::select! {
                result = self.event_rx.recv() => {
                    match result {
                        Ok(event) => self.handle_event(event).await,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("notifier actor lagged, skipped {skipped} events");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("event channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        NotifierCommand::MuteAlerts { duration_secs } => {
                            debug!("muting alerts for {duration_secs}s");
                            let duration = ChronoDuration::seconds(duration_secs as i64);
                            self.muted_until = Some(Utc::now() + duration);
                        }

                        NotifierCommand::UnmuteAlerts => {
                            debug!("unmuting alerts");
                            self.muted_until = None;
                        }

                        NotifierCommand::GetStatus { respond_to } => {
                            let _ = respond_to.send(self.status());
                        }

                        NotifierCommand::Shutdown => {
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

        debug!("notifier actor stopped");
    }

    fn is_muted(&mut self) -> bool {
        match self.muted_until {
            Some(until) if until > Utc::now() => true,
            Some(_) => {
                debug!("mute expired");
                self.muted_until = None;
                false
            }
            None => false,
        }
    }

    fn status(&mut self) -> NotifierStatus {
        let _ = self.is_muted();
        NotifierStatus {
            muted_until: self.muted_until,
            sent: self.sent,
            suppressed: self.suppressed,
        }
    }

    async fn handle_event(&mut self, event: FleetEvent) {
        let severity = match &event {
            FleetEvent::AlertRaised(alert) | FleetEvent::AlertResolved(alert) => alert.severity,
            FleetEvent::AlertRefreshed {
                alert,
                previous_severity,
            } if alert.severity > *previous_severity => {
                debug!("alert {} escalated {previous_severity} → {}", alert.id, alert.severity);
                alert.severity
            }
            FleetEvent::NotificationRaised(notification) => notification.severity,
            _ => return,
        };

        if self.is_muted() || !self.alert_manager.accepts(severity) {
            trace!("suppressing {severity} notification");
            self.suppressed += 1;
            return;
        }

        let delivered = match &event {
            FleetEvent::AlertRaised(alert)
            | FleetEvent::AlertResolved(alert)
            | FleetEvent::AlertRefreshed { alert, .. } => self.alert_manager.send_alert(alert).await,
            FleetEvent::NotificationRaised(notification) => {
                self.alert_manager.send_notification(notification).await
            }
            _ => 0,
        };

        if delivered > 0 {
            self.sent += 1;
        } else {
            warn!("no target accepted the {severity} notification");
        }
    }
}

/// Handle for controlling a NotifierActor
#[derive(Clone)]
pub struct NotifierHandle {
    sender: mpsc::Sender<NotifierCommand>,
}

impl NotifierHandle {
    pub fn spawn(alert_manager: AlertManager, event_rx: broadcast::Receiver<FleetEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = NotifierActor::new(alert_manager, cmd_rx, event_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn mute(&self, duration_secs: u64) -> Result<()> {
        self.sender
            .send(NotifierCommand::MuteAlerts { duration_secs })
            .await
            .context("failed to send MuteAlerts command")
    }

    pub async fn unmute(&self) -> Result<()> {
        self.sender
            .send(NotifierCommand::UnmuteAlerts)
            .await
            .context("failed to send UnmuteAlerts command")
    }

    pub async fn status(&self) -> Result<NotifierStatus> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(NotifierCommand::GetStatus { respond_to: tx })
            .await
            .context("failed to send GetStatus command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(NotifierCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}

/// Lowest severity at least one target receives
pub fn lowest_accepted(manager: &AlertManager) -> Option<AlertSeverity> {
    [
        AlertSeverity::Low,
        AlertSeverity::Medium,
        AlertSeverity::High,
        AlertSeverity::Critical,
    ]
    .into_iter()
    .find(|severity| manager.accepts(*severity))
}
