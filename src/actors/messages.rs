//! Message types for actor communication
//!
//! 1. **Commands**: request/response messages sent to one actor via mpsc,
//!    answered over a oneshot
//! 2. **Events**: [`FleetEvent`]s published by the fleet actor on a broadcast
//!    channel for every change it makes

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::{
    MetricsUpdate,
    broadcast::{BlackScreenDetection, BroadcastChannel, BroadcastError, Notification, StreamSession},
    error::FleetResult,
    fleet::{FleetSnapshot, MetricsOutcome},
    model::{
        AlertSeverity, AuditLogEntry, BackupSystem, CommandStatus, CommandType, NewAlert,
        NewBackupSystem, NewChannel, NewTransmitter, RemoteCommand, SwitchRecord,
        TransmissionAlert, TransmissionChannel, Transmitter, TransmitterPatch,
    },
    storage::StateKey,
};

/// Change published by the fleet actor
///
/// The broadcast channel may lag for slow subscribers. Subscribers that need
/// the full picture re-read the snapshot.
#[derive(Debug, Clone)]
pub enum FleetEvent {
    TransmitterChanged { transmitter_id: String },
    TransmitterRemoved { transmitter_id: String },
    ChannelChanged { channel_id: String },
    AlertRaised(TransmissionAlert),
    /// A repeat report merged into an open alert
    AlertRefreshed {
        alert: TransmissionAlert,
        previous_severity: AlertSeverity,
    },
    AlertResolved(TransmissionAlert),
    BackupSystemChanged { backup_system_id: String },
    BackupActivated(SwitchRecord),
    BackupDeactivated { backup_system_id: String },
    AuditLogged(AuditLogEntry),
    CommandChanged(RemoteCommand),
    BroadcastChannelChanged { channel_id: String },
    BlackScreenDetected(BlackScreenDetection),
    BlackScreenResolved { detection_id: String },
    BroadcastErrorRaised(BroadcastError),
    /// A further low reading merged into the channel's open error
    BroadcastErrorRefreshed(BroadcastError),
    BroadcastErrorResolved(BroadcastError),
    NotificationRaised(Notification),
    StreamSessionChanged { session_id: String },
}

impl FleetEvent {
    /// Storage keys whose contents this change affects
    pub fn touched(&self) -> &'static [StateKey] {
        match self {
            FleetEvent::TransmitterChanged { .. } | FleetEvent::TransmitterRemoved { .. } => {
                &[StateKey::Transmitters]
            }
            FleetEvent::ChannelChanged { .. } => &[StateKey::Channels],
            // alerts feed the transmitter's alert list and health score
            FleetEvent::AlertRaised(_)
            | FleetEvent::AlertRefreshed { .. }
            | FleetEvent::AlertResolved(_) => &[StateKey::Alerts, StateKey::Transmitters],
            FleetEvent::BackupSystemChanged { .. }
            | FleetEvent::BackupActivated(_)
            | FleetEvent::BackupDeactivated { .. } => &[StateKey::BackupSystems],
            FleetEvent::AuditLogged(_) => &[StateKey::AuditLog],
            FleetEvent::CommandChanged(_) => &[StateKey::Commands],
            FleetEvent::BroadcastChannelChanged { .. } => &[StateKey::BroadcastChannels],
            FleetEvent::BlackScreenDetected(_) | FleetEvent::BlackScreenResolved { .. } => {
                &[StateKey::BlackScreens]
            }
            FleetEvent::BroadcastErrorRaised(_)
            | FleetEvent::BroadcastErrorRefreshed(_)
            | FleetEvent::BroadcastErrorResolved(_) => &[StateKey::BroadcastErrors],
            FleetEvent::NotificationRaised(_) => &[StateKey::Notifications],
            FleetEvent::StreamSessionChanged { .. } => &[StateKey::StreamSessions],
        }
    }
}

type Reply<T> = oneshot::Sender<FleetResult<T>>;

/// Commands that can be sent to the FleetActor
#[derive(Debug)]
pub enum FleetCommand {
    AddTransmitter {
        transmitter: NewTransmitter,
        respond_to: Reply<Transmitter>,
    },
    UpdateTransmitter {
        id: String,
        patch: TransmitterPatch,
        respond_to: Reply<Transmitter>,
    },
    RemoveTransmitter {
        id: String,
        respond_to: Reply<Transmitter>,
    },
    UpdateMetrics {
        id: String,
        update: MetricsUpdate,
        respond_to: Reply<MetricsOutcome>,
    },
    AddChannel {
        channel: NewChannel,
        respond_to: Reply<TransmissionChannel>,
    },
    RecordChannelTest {
        id: String,
        signal_quality: f64,
        bitrate: f64,
        respond_to: Reply<TransmissionChannel>,
    },
    CreateAlert {
        alert: NewAlert,
        respond_to: Reply<TransmissionAlert>,
    },
    ResolveAlert {
        id: String,
        resolved_by: String,
        action_taken: Option<String>,
        respond_to: Reply<TransmissionAlert>,
    },
    AddBackupSystem {
        backup: NewBackupSystem,
        respond_to: Reply<BackupSystem>,
    },
    ActivateBackup {
        id: String,
        actor: String,
        respond_to: Reply<SwitchRecord>,
    },
    DeactivateBackup {
        id: String,
        actor: String,
        respond_to: Reply<BackupSystem>,
    },
    EmergencyShutdown {
        transmitter_id: String,
        reason: String,
        actor: String,
        respond_to: Reply<TransmissionAlert>,
    },
    ActivateEmergencyBackup {
        channel_id: String,
        actor: String,
        respond_to: Reply<SwitchRecord>,
    },
    EnqueueCommand {
        transmitter_id: String,
        command: CommandType,
        issued_by: String,
        respond_to: Reply<RemoteCommand>,
    },
    SetCommandStatus {
        id: String,
        status: CommandStatus,
        error: Option<String>,
        respond_to: Reply<RemoteCommand>,
    },
    AddBroadcastChannel {
        channel: BroadcastChannel,
        respond_to: Reply<BroadcastChannel>,
    },
    SetChannelLive {
        id: String,
        is_live: bool,
        respond_to: Reply<BroadcastChannel>,
    },
    UpdateBroadcastSignal {
        id: String,
        signal_quality: f64,
        respond_to: Reply<Option<BroadcastError>>,
    },
    DetectBlackScreen {
        channel_id: String,
        duration_secs: u32,
        respond_to: Reply<Option<BlackScreenDetection>>,
    },
    ResolveBlackScreen {
        id: String,
        respond_to: Reply<BlackScreenDetection>,
    },
    StartStreamSession {
        channel_id: String,
        respond_to: Reply<StreamSession>,
    },
    EndStreamSession {
        id: String,
        respond_to: Reply<StreamSession>,
    },

    GetTransmitter {
        id: String,
        respond_to: oneshot::Sender<Option<Transmitter>>,
    },
    GetOnlineTransmitters {
        respond_to: oneshot::Sender<Vec<Transmitter>>,
    },
    GetLiveBroadcastChannels {
        respond_to: oneshot::Sender<Vec<BroadcastChannel>>,
    },
    GetActiveAlerts {
        respond_to: oneshot::Sender<Vec<TransmissionAlert>>,
    },
    GetAlertsBySeverity {
        severity: AlertSeverity,
        respond_to: oneshot::Sender<Vec<TransmissionAlert>>,
    },
    GetBackupForPrimary {
        transmitter_id: String,
        respond_to: oneshot::Sender<Option<BackupSystem>>,
    },
    GetCommand {
        id: String,
        respond_to: oneshot::Sender<Option<RemoteCommand>>,
    },
    GetSnapshot {
        respond_to: oneshot::Sender<FleetSnapshot>,
    },

    /// Gracefully shut down the fleet actor
    Shutdown,
}

/// Commands that can be sent to the SamplerActor
#[derive(Debug)]
pub enum SamplerCommand {
    /// Sample every online transmitter immediately
    SampleNow {
        respond_to: oneshot::Sender<anyhow::Result<SampleReport>>,
    },

    /// Update the sampling interval
    UpdateInterval { interval_secs: u64 },

    Shutdown,
}

/// Outcome of one sampling round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleReport {
    /// Transmitters updated with a fresh sample
    pub sampled: usize,

    /// Transmitters whose sample failed and were skipped
    pub failed: usize,

    /// Alerts opened or refreshed during the round
    pub alerts: usize,
}

/// Commands that can be sent to the BlackScreenActor
#[derive(Debug)]
pub enum BlackScreenCommand {
    /// Probe every live channel immediately
    ScanNow {
        respond_to: oneshot::Sender<anyhow::Result<Vec<BlackScreenDetection>>>,
    },

    Shutdown,
}

/// Commands that can be sent to the FailoverActor
#[derive(Debug)]
pub enum FailoverCommand {
    /// Backup systems with a switch currently scheduled
    GetPending {
        respond_to: oneshot::Sender<Vec<String>>,
    },

    Shutdown,
}

/// Commands that can be sent to the NotifierActor
#[derive(Debug)]
pub enum NotifierCommand {
    /// Mute outbound notifications for a duration
    ///
    /// Useful for maintenance windows.
    MuteAlerts { duration_secs: u64 },

    UnmuteAlerts,

    GetStatus {
        respond_to: oneshot::Sender<NotifierStatus>,
    },

    Shutdown,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotifierStatus {
    /// Muted until this instant, if muted
    pub muted_until: Option<DateTime<Utc>>,

    /// Alerts pushed to at least one target
    pub sent: u64,

    /// Alerts dropped while muted or below the minimum severity
    pub suppressed: u64,
}

/// Commands that can be sent to the PersistenceActor
#[derive(Debug)]
pub enum PersistenceCommand {
    /// Write every dirty key now
    Flush {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },

    GetStats {
        respond_to: oneshot::Sender<PersistenceStats>,
    },

    /// Flush pending changes and stop
    Shutdown {
        respond_to: oneshot::Sender<anyhow::Result<()>>,
    },
}

/// Persistence statistics
#[derive(Debug, Clone, Default)]
pub struct PersistenceStats {
    /// Keys changed since the last flush
    pub dirty_keys: usize,

    /// Number of flush operations performed
    pub flush_count: u64,

    /// Number of key writes performed
    pub keys_written: u64,

    /// Flushes that failed and were retried later
    pub failed_flushes: u64,

    pub last_flush: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_events_touch_transmitters() {
        let alert: TransmissionAlert = serde_json::from_value(serde_json::json!({
            "id": "a-1",
            "type": "overheating",
            "severity": "high",
            "message": "hot",
            "transmitterId": "tx-1",
            "detectedAt": "2026-01-01T00:00:00Z",
            "resolved": false,
            "lastSeen": "2026-01-01T00:00:00Z"
        }))
        .unwrap();

        let touched = FleetEvent::AlertRaised(alert).touched();
        assert!(touched.contains(&StateKey::Alerts));
        assert!(touched.contains(&StateKey::Transmitters));
    }

    #[test]
    fn test_audit_event_touches_audit_log_only() {
        let entry = AuditLogEntry {
            id: "e-1".to_string(),
            timestamp: Utc::now(),
            action: "backup_activated".to_string(),
            transmitter_id: None,
            details: String::new(),
            actor: "operator".to_string(),
        };
        assert_eq!(FleetEvent::AuditLogged(entry).touched(), &[StateKey::AuditLog]);
    }
}
