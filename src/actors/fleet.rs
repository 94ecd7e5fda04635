//! FleetActor - owns the fleet state and serializes every mutation
//!
//! ## Message Flow
//!
//! ```text
//! FleetHandle ──FleetCommand──► FleetActor ──► FleetState op
//!      ▲                            │
//!      └────── oneshot reply ───────┤
//!                                   └──► drain events ──► broadcast<FleetEvent>
//! ```
//!
//! Handle methods return `anyhow::Result`. A refused operation carries the
//! [`FleetError`](crate::error::FleetError) inside, so callers can
//! `downcast_ref` to react to a specific failure.

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::{
    MetricsUpdate,
    broadcast::{BlackScreenDetection, BroadcastChannel, BroadcastError, StreamSession},
    error::FleetResult,
    fleet::{FleetSnapshot, FleetState, MetricsOutcome},
    model::{
        AlertSeverity, BackupSystem, CommandStatus, CommandType, NewAlert, NewBackupSystem,
        NewChannel, NewTransmitter, RemoteCommand, SwitchRecord, TransmissionAlert,
        TransmissionChannel, Transmitter, TransmitterPatch,
    },
};

use super::messages::{FleetCommand, FleetEvent};

pub struct FleetActor {
    state: FleetState,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<FleetCommand>,

    /// Broadcast sender for publishing changes
    event_tx: broadcast::Sender<FleetEvent>,
}

impl FleetActor {
    pub fn new(
        state: FleetState,
        command_rx: mpsc::Receiver<FleetCommand>,
        event_tx: broadcast::Sender<FleetEvent>,
    ) -> Self {
        Self {
            state,
            command_rx,
            event_tx,
        }
    }

    /// Run the actor's main loop until `Shutdown` or until every handle is
    /// dropped
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting fleet actor");

        while let Some(cmd) = self.command_rx.recv().await {
            if matches!(cmd, FleetCommand::Shutdown) {
                debug!("received shutdown command");
                break;
            }
            self.handle(cmd);
        }

        debug!("fleet actor stopped");
    }

    fn handle(&mut self, cmd: FleetCommand) {
        let Self {
            state, event_tx, ..
        } = self;
        match cmd {
            FleetCommand::AddTransmitter {
                transmitter,
                respond_to,
            } => reply(respond_to, state.add_transmitter(transmitter), state, event_tx),
            FleetCommand::UpdateTransmitter {
                id,
                patch,
                respond_to,
            } => reply(respond_to, state.update_transmitter(&id, patch), state, event_tx),
            FleetCommand::RemoveTransmitter { id, respond_to } => {
                reply(respond_to, state.remove_transmitter(&id), state, event_tx)
            }
            FleetCommand::UpdateMetrics {
                id,
                update,
                respond_to,
            } => reply(respond_to, state.update_transmitter_metrics(&id, update), state, event_tx),
            FleetCommand::AddChannel {
                channel,
                respond_to,
            } => reply(respond_to, state.add_channel(channel), state, event_tx),
            FleetCommand::RecordChannelTest {
                id,
                signal_quality,
                bitrate,
                respond_to,
            } => reply(
                respond_to,
                state.record_channel_test(&id, signal_quality, bitrate),
                state,
                event_tx,
            ),
            FleetCommand::CreateAlert { alert, respond_to } => {
                reply(respond_to, state.create_alert(alert), state, event_tx)
            }
            FleetCommand::ResolveAlert {
                id,
                resolved_by,
                action_taken,
                respond_to,
            } => reply(
                respond_to,
                state.resolve_alert(&id, &resolved_by, action_taken),
                state,
                event_tx,
            ),
            FleetCommand::AddBackupSystem { backup, respond_to } => {
                reply(respond_to, state.add_backup_system(backup), state, event_tx)
            }
            FleetCommand::ActivateBackup {
                id,
                actor,
                respond_to,
            } => reply(respond_to, state.activate_backup(&id, &actor), state, event_tx),
            FleetCommand::DeactivateBackup {
                id,
                actor,
                respond_to,
            } => reply(respond_to, state.deactivate_backup(&id, &actor), state, event_tx),
            FleetCommand::EmergencyShutdown {
                transmitter_id,
                reason,
                actor,
                respond_to,
            } => reply(
                respond_to,
                state.emergency_shutdown(&transmitter_id, &reason, &actor),
                state,
                event_tx,
            ),
            FleetCommand::ActivateEmergencyBackup {
                channel_id,
                actor,
                respond_to,
            } => reply(
                respond_to,
                state.activate_emergency_backup(&channel_id, &actor),
                state,
                event_tx,
            ),
            FleetCommand::EnqueueCommand {
                transmitter_id,
                command,
                issued_by,
                respond_to,
            } => reply(
                respond_to,
                state.enqueue_command(&transmitter_id, command, &issued_by),
                state,
                event_tx,
            ),
            FleetCommand::SetCommandStatus {
                id,
                status,
                error,
                respond_to,
            } => reply(respond_to, state.set_command_status(&id, status, error), state, event_tx),
            FleetCommand::AddBroadcastChannel {
                channel,
                respond_to,
            } => reply(respond_to, state.add_broadcast_channel(channel), state, event_tx),
            FleetCommand::SetChannelLive {
                id,
                is_live,
                respond_to,
            } => reply(respond_to, state.set_channel_live(&id, is_live), state, event_tx),
            FleetCommand::UpdateBroadcastSignal {
                id,
                signal_quality,
                respond_to,
            } => reply(
                respond_to,
                state.update_broadcast_signal(&id, signal_quality),
                state,
                event_tx,
            ),
            FleetCommand::DetectBlackScreen {
                channel_id,
                duration_secs,
                respond_to,
            } => reply(
                respond_to,
                state.detect_black_screen(&channel_id, duration_secs),
                state,
                event_tx,
            ),
            FleetCommand::ResolveBlackScreen { id, respond_to } => {
                reply(respond_to, state.resolve_black_screen(&id), state, event_tx)
            }
            FleetCommand::StartStreamSession {
                channel_id,
                respond_to,
            } => reply(respond_to, state.start_stream_session(&channel_id), state, event_tx),
            FleetCommand::EndStreamSession { id, respond_to } => {
                reply(respond_to, state.end_stream_session(&id), state, event_tx)
            }

            FleetCommand::GetTransmitter { id, respond_to } => {
                let _ = respond_to.send(state.transmitter(&id).cloned());
            }
            FleetCommand::GetOnlineTransmitters { respond_to } => {
                let _ = respond_to.send(state.online_transmitters());
            }
            FleetCommand::GetLiveBroadcastChannels { respond_to } => {
                let _ = respond_to.send(state.live_broadcast_channels());
            }
            FleetCommand::GetActiveAlerts { respond_to } => {
                let _ = respond_to.send(state.active_alerts());
            }
            FleetCommand::GetAlertsBySeverity {
                severity,
                respond_to,
            } => {
                let _ = respond_to.send(state.alerts_by_severity(severity));
            }
            FleetCommand::GetBackupForPrimary {
                transmitter_id,
                respond_to,
            } => {
                let _ = respond_to.send(state.backup_for_primary(&transmitter_id).cloned());
            }
            FleetCommand::GetCommand { id, respond_to } => {
                let _ = respond_to.send(state.command(&id).cloned());
            }
            FleetCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(state.snapshot());
            }

            FleetCommand::Shutdown => {}
        }
    }
}

/// Publish the events queued by the last operation
fn publish(state: &mut FleetState, event_tx: &broadcast::Sender<FleetEvent>) {
    for event in state.drain_events() {
        // no subscribers is fine
        if let Ok(receivers) = event_tx.send(event) {
            trace!("published fleet event to {receivers} receivers");
        }
    }
}

/// Publish the operation's events, then answer the caller
///
/// A caller that has its reply can rely on the events being queued for every
/// subscriber.
fn reply<T>(
    respond_to: oneshot::Sender<FleetResult<T>>,
    result: FleetResult<T>,
    state: &mut FleetState,
    event_tx: &broadcast::Sender<FleetEvent>,
) {
    publish(state, event_tx);
    if let Err(e) = &result {
        debug!("fleet operation refused: {e}");
    }
    if respond_to.send(result).is_err() {
        warn!("caller went away before the fleet replied");
    }
}

/// Handle for talking to the FleetActor
///
/// Cheap to clone and shared by every other actor.
#[derive(Clone)]
pub struct FleetHandle {
    sender: mpsc::Sender<FleetCommand>,
    event_tx: broadcast::Sender<FleetEvent>,
}

impl FleetHandle {
    /// Spawn the fleet actor around an initial state
    pub fn spawn(state: FleetState, event_tx: broadcast::Sender<FleetEvent>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);

        let actor = FleetActor::new(state, cmd_rx, event_tx.clone());
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            event_tx,
        }
    }

    /// Subscribe to fleet events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.event_tx.subscribe()
    }

    async fn request<T>(
        &self,
        name: &'static str,
        build: impl FnOnce(oneshot::Sender<FleetResult<T>>) -> FleetCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .with_context(|| format!("failed to send {name} command"))?;

        let value = rx.await.context("failed to receive response")??;
        Ok(value)
    }

    async fn query<T>(
        &self,
        name: &'static str,
        build: impl FnOnce(oneshot::Sender<T>) -> FleetCommand,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .with_context(|| format!("failed to send {name} command"))?;

        rx.await.context("failed to receive response")
    }

    pub async fn add_transmitter(&self, transmitter: NewTransmitter) -> Result<Transmitter> {
        self.request("AddTransmitter", |respond_to| FleetCommand::AddTransmitter {
            transmitter,
            respond_to,
        })
        .await
    }

    pub async fn update_transmitter(&self, id: &str, patch: TransmitterPatch) -> Result<Transmitter> {
        self.request("UpdateTransmitter", |respond_to| {
            FleetCommand::UpdateTransmitter {
                id: id.to_string(),
                patch,
                respond_to,
            }
        })
        .await
    }

    pub async fn remove_transmitter(&self, id: &str) -> Result<Transmitter> {
        self.request("RemoveTransmitter", |respond_to| {
            FleetCommand::RemoveTransmitter {
                id: id.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn update_transmitter_metrics(
        &self,
        id: &str,
        update: MetricsUpdate,
    ) -> Result<MetricsOutcome> {
        self.request("UpdateMetrics", |respond_to| FleetCommand::UpdateMetrics {
            id: id.to_string(),
            update,
            respond_to,
        })
        .await
    }

    pub async fn add_channel(&self, channel: NewChannel) -> Result<TransmissionChannel> {
        self.request("AddChannel", |respond_to| FleetCommand::AddChannel {
            channel,
            respond_to,
        })
        .await
    }

    pub async fn record_channel_test(
        &self,
        id: &str,
        signal_quality: f64,
        bitrate: f64,
    ) -> Result<TransmissionChannel> {
        self.request("RecordChannelTest", |respond_to| {
            FleetCommand::RecordChannelTest {
                id: id.to_string(),
                signal_quality,
                bitrate,
                respond_to,
            }
        })
        .await
    }

    pub async fn create_alert(&self, alert: NewAlert) -> Result<TransmissionAlert> {
        self.request("CreateAlert", |respond_to| FleetCommand::CreateAlert {
            alert,
            respond_to,
        })
        .await
    }

    pub async fn resolve_alert(
        &self,
        id: &str,
        resolved_by: &str,
        action_taken: Option<String>,
    ) -> Result<TransmissionAlert> {
        self.request("ResolveAlert", |respond_to| FleetCommand::ResolveAlert {
            id: id.to_string(),
            resolved_by: resolved_by.to_string(),
            action_taken,
            respond_to,
        })
        .await
    }

    pub async fn add_backup_system(&self, backup: NewBackupSystem) -> Result<BackupSystem> {
        self.request("AddBackupSystem", |respond_to| {
            FleetCommand::AddBackupSystem { backup, respond_to }
        })
        .await
    }

    pub async fn activate_backup(&self, id: &str, actor: &str) -> Result<SwitchRecord> {
        self.request("ActivateBackup", |respond_to| FleetCommand::ActivateBackup {
            id: id.to_string(),
            actor: actor.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn deactivate_backup(&self, id: &str, actor: &str) -> Result<BackupSystem> {
        self.request("DeactivateBackup", |respond_to| {
            FleetCommand::DeactivateBackup {
                id: id.to_string(),
                actor: actor.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn emergency_shutdown(
        &self,
        transmitter_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<TransmissionAlert> {
        self.request("EmergencyShutdown", |respond_to| {
            FleetCommand::EmergencyShutdown {
                transmitter_id: transmitter_id.to_string(),
                reason: reason.to_string(),
                actor: actor.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn activate_emergency_backup(&self, channel_id: &str, actor: &str) -> Result<SwitchRecord> {
        self.request("ActivateEmergencyBackup", |respond_to| {
            FleetCommand::ActivateEmergencyBackup {
                channel_id: channel_id.to_string(),
                actor: actor.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn enqueue_command(
        &self,
        transmitter_id: &str,
        command: CommandType,
        issued_by: &str,
    ) -> Result<RemoteCommand> {
        self.request("EnqueueCommand", |respond_to| FleetCommand::EnqueueCommand {
            transmitter_id: transmitter_id.to_string(),
            command,
            issued_by: issued_by.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn set_command_status(
        &self,
        id: &str,
        status: CommandStatus,
        error: Option<String>,
    ) -> Result<RemoteCommand> {
        self.request("SetCommandStatus", |respond_to| {
            FleetCommand::SetCommandStatus {
                id: id.to_string(),
                status,
                error,
                respond_to,
            }
        })
        .await
    }

    pub async fn add_broadcast_channel(&self, channel: BroadcastChannel) -> Result<BroadcastChannel> {
        self.request("AddBroadcastChannel", |respond_to| {
            FleetCommand::AddBroadcastChannel {
                channel,
                respond_to,
            }
        })
        .await
    }

    pub async fn set_channel_live(&self, id: &str, is_live: bool) -> Result<BroadcastChannel> {
        self.request("SetChannelLive", |respond_to| FleetCommand::SetChannelLive {
            id: id.to_string(),
            is_live,
            respond_to,
        })
        .await
    }

    pub async fn update_broadcast_signal(
        &self,
        id: &str,
        signal_quality: f64,
    ) -> Result<Option<BroadcastError>> {
        self.request("UpdateBroadcastSignal", |respond_to| {
            FleetCommand::UpdateBroadcastSignal {
                id: id.to_string(),
                signal_quality,
                respond_to,
            }
        })
        .await
    }

    pub async fn detect_black_screen(
        &self,
        channel_id: &str,
        duration_secs: u32,
    ) -> Result<Option<BlackScreenDetection>> {
        self.request("DetectBlackScreen", |respond_to| {
            FleetCommand::DetectBlackScreen {
                channel_id: channel_id.to_string(),
                duration_secs,
                respond_to,
            }
        })
        .await
    }

    pub async fn resolve_black_screen(&self, id: &str) -> Result<BlackScreenDetection> {
        self.request("ResolveBlackScreen", |respond_to| {
            FleetCommand::ResolveBlackScreen {
                id: id.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn start_stream_session(&self, channel_id: &str) -> Result<StreamSession> {
        self.request("StartStreamSession", |respond_to| {
            FleetCommand::StartStreamSession {
                channel_id: channel_id.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn end_stream_session(&self, id: &str) -> Result<StreamSession> {
        self.request("EndStreamSession", |respond_to| {
            FleetCommand::EndStreamSession {
                id: id.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn transmitter(&self, id: &str) -> Result<Option<Transmitter>> {
        self.query("GetTransmitter", |respond_to| FleetCommand::GetTransmitter {
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn online_transmitters(&self) -> Result<Vec<Transmitter>> {
        self.query("GetOnlineTransmitters", |respond_to| {
            FleetCommand::GetOnlineTransmitters { respond_to }
        })
        .await
    }

    pub async fn live_broadcast_channels(&self) -> Result<Vec<BroadcastChannel>> {
        self.query("GetLiveBroadcastChannels", |respond_to| {
            FleetCommand::GetLiveBroadcastChannels { respond_to }
        })
        .await
    }

    pub async fn active_alerts(&self) -> Result<Vec<TransmissionAlert>> {
        self.query("GetActiveAlerts", |respond_to| FleetCommand::GetActiveAlerts {
            respond_to,
        })
        .await
    }

    pub async fn alerts_by_severity(&self, severity: AlertSeverity) -> Result<Vec<TransmissionAlert>> {
        self.query("GetAlertsBySeverity", |respond_to| {
            FleetCommand::GetAlertsBySeverity {
                severity,
                respond_to,
            }
        })
        .await
    }

    pub async fn backup_for_primary(&self, transmitter_id: &str) -> Result<Option<BackupSystem>> {
        self.query("GetBackupForPrimary", |respond_to| {
            FleetCommand::GetBackupForPrimary {
                transmitter_id: transmitter_id.to_string(),
                respond_to,
            }
        })
        .await
    }

    pub async fn command(&self, id: &str) -> Result<Option<RemoteCommand>> {
        self.query("GetCommand", |respond_to| FleetCommand::GetCommand {
            id: id.to_string(),
            respond_to,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<FleetSnapshot> {
        self.query("GetSnapshot", |respond_to| FleetCommand::GetSnapshot {
            respond_to,
        })
        .await
    }

    /// Gracefully shut down the fleet actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(FleetCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
