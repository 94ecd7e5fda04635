//! Fleet state - the single source of truth for transmitters, channels,
//! alerts, backup pairs, remote commands and the broadcast side
//!
//! `FleetState` is a plain synchronous struct. It is owned by the
//! [`FleetActor`](crate::actors::fleet::FleetActor), which serializes all
//! mutations and publishes the events each operation queues.
//!
//! Operations are split by concern:
//!
//! - this module: transmitters, transmission channels, metric updates
//! - [`alerts`]: alert engine (open/dedup/resolve, queries)
//! - [`backup`]: backup coordinator and emergency procedures
//! - [`commands`]: remote command lifecycle
//! - [`broadcast`]: broadcast channels, black screens, stream sessions

pub mod alerts;
pub mod backup;
pub mod broadcast;
pub mod commands;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    MetricsUpdate,
    actors::messages::FleetEvent,
    broadcast::{
        BlackScreenDetection, BroadcastChannel, BroadcastError, Notification, StreamSession,
    },
    error::{EntityKind, FleetError, FleetResult},
    model::{
        AlertType, AuditLogEntry, BackupSystem, ChannelStatus, NewAlert, NewChannel,
        NewTransmitter, RemoteCommand,
        TransmissionAlert, TransmissionChannel, Transmitter, TransmitterPatch, TransmitterStatus,
        efficiency, new_id,
    },
    monitors::{AlertThresholds, HealthInputs, calculate_health_score},
};

/// Tunables for the fleet state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FleetSettings {
    pub thresholds: AlertThresholds,

    /// Merge repeated alerts with the same key into the open one
    pub dedup_alerts: bool,

    /// Black screens shorter than this many seconds are ignored
    pub black_screen_threshold: u32,

    /// Raise a notification for every recorded black screen
    pub notify_black_screens: bool,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            thresholds: AlertThresholds::default(),
            dedup_alerts: true,
            black_screen_threshold: 5,
            notify_black_screens: true,
        }
    }
}

/// Point-in-time copy of every collection in the fleet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub transmitters: Vec<Transmitter>,
    pub channels: Vec<TransmissionChannel>,
    pub alerts: Vec<TransmissionAlert>,
    pub backup_systems: Vec<BackupSystem>,
    pub audit_log: Vec<AuditLogEntry>,
    pub commands: Vec<RemoteCommand>,
    pub broadcast_channels: Vec<BroadcastChannel>,
    pub black_screens: Vec<BlackScreenDetection>,
    pub broadcast_errors: Vec<BroadcastError>,
    pub notifications: Vec<Notification>,
    pub stream_sessions: Vec<StreamSession>,
}

/// Result of a metric update
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsOutcome {
    pub transmitter: Transmitter,

    /// Alerts opened or refreshed by this update
    pub alerts: Vec<TransmissionAlert>,
}

#[derive(Debug, Default)]
pub struct FleetState {
    settings: FleetSettings,
    records: FleetSnapshot,
    events: Vec<FleetEvent>,
}

impl FleetState {
    pub fn new(settings: FleetSettings) -> Self {
        Self::from_snapshot(settings, FleetSnapshot::default())
    }

    /// Rebuild state from persisted records
    ///
    /// Commands still pending or executing lost their executor with the
    /// previous process and are failed. Their changes are queued like any
    /// other operation's, so the next flush writes them back.
    pub fn from_snapshot(settings: FleetSettings, records: FleetSnapshot) -> Self {
        let mut state = Self {
            settings,
            records,
            events: Vec::new(),
        };
        state.fail_interrupted_commands();
        state
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        self.records.clone()
    }

    /// Take the events queued by the operations since the last drain
    pub fn drain_events(&mut self) -> Vec<FleetEvent> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: FleetEvent) {
        trace!("queued fleet event: {event:?}");
        self.events.push(event);
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    pub fn transmitter(&self, id: &str) -> Option<&Transmitter> {
        self.records.transmitters.iter().find(|t| t.id == id)
    }

    fn transmitter_mut(&mut self, id: &str) -> FleetResult<&mut Transmitter> {
        self.records
            .transmitters
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Transmitter, id))
    }

    fn require_transmitter(&self, id: &str) -> FleetResult<&Transmitter> {
        self.transmitter(id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Transmitter, id))
    }

    pub fn channel(&self, id: &str) -> Option<&TransmissionChannel> {
        self.records.channels.iter().find(|c| c.id == id)
    }

    fn require_channel(&self, id: &str) -> FleetResult<&TransmissionChannel> {
        self.channel(id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Channel, id))
    }

    /// Transmitters currently in `online` status
    pub fn online_transmitters(&self) -> Vec<Transmitter> {
        self.records
            .transmitters
            .iter()
            .filter(|t| t.status == TransmitterStatus::Online)
            .cloned()
            .collect()
    }

    // ========================================================================
    // Transmitters
    // ========================================================================

    pub fn add_transmitter(&mut self, new: NewTransmitter) -> FleetResult<Transmitter> {
        let id = new.id.unwrap_or_else(new_id);
        if id.trim().is_empty() {
            return Err(FleetError::InvalidInput("transmitter id is empty".to_string()));
        }
        if self.transmitter(&id).is_some() {
            return Err(FleetError::AlreadyExists {
                kind: EntityKind::Transmitter,
                id,
            });
        }
        if let Some(backup_id) = &new.backup_transmitter_id {
            self.require_transmitter(backup_id)?;
        }

        let now = Utc::now();
        let mut transmitter = Transmitter {
            id,
            name: new.name,
            location: new.location,
            serial_number: new.serial_number,
            frequency: new.frequency,
            modulation: new.modulation,
            power_input: new.power_input,
            power_output: new.power_output,
            voltage: new.voltage,
            current: new.current,
            efficiency: efficiency(new.power_input, new.power_output),
            signal_quality: new.signal_quality,
            temperature: new.temperature,
            health_score: 0,
            status: new.status,
            uptime: 0,
            alerts: Vec::new(),
            is_backup: new.is_backup,
            backup_transmitter_id: new.backup_transmitter_id,
            last_maintenance: None,
            created_at: now,
            updated_at: now,
        };
        transmitter.health_score =
            calculate_health_score(&HealthInputs::from(&transmitter), std::iter::empty());

        debug!("adding transmitter {} ({})", transmitter.id, transmitter.name);
        self.records.transmitters.push(transmitter.clone());
        self.emit(FleetEvent::TransmitterChanged {
            transmitter_id: transmitter.id.clone(),
        });

        Ok(transmitter)
    }

    pub fn update_transmitter(
        &mut self,
        id: &str,
        patch: TransmitterPatch,
    ) -> FleetResult<Transmitter> {
        if let Some(Some(backup_id)) = &patch.backup_transmitter_id {
            if backup_id == id {
                return Err(FleetError::InvalidInput(
                    "a transmitter cannot back itself up".to_string(),
                ));
            }
            self.require_transmitter(backup_id)?;
        }

        let transmitter = self.transmitter_mut(id)?;
        if let Some(name) = patch.name {
            transmitter.name = name;
        }
        if let Some(location) = patch.location {
            transmitter.location = location;
        }
        if let Some(serial) = patch.serial_number {
            transmitter.serial_number = serial;
        }
        if let Some(frequency) = patch.frequency {
            transmitter.frequency = frequency;
        }
        if let Some(modulation) = patch.modulation {
            transmitter.modulation = modulation;
        }
        if let Some(power_input) = patch.power_input {
            transmitter.power_input = power_input;
            transmitter.refresh_efficiency();
        }
        if let Some(status) = patch.status {
            transmitter.status = status;
        }
        if let Some(is_backup) = patch.is_backup {
            transmitter.is_backup = is_backup;
        }
        if let Some(backup_id) = patch.backup_transmitter_id {
            transmitter.backup_transmitter_id = backup_id;
        }
        if let Some(at) = patch.last_maintenance {
            transmitter.last_maintenance = Some(at);
        }
        transmitter.updated_at = Utc::now();

        self.refresh_health(id);
        self.emit(FleetEvent::TransmitterChanged {
            transmitter_id: id.to_string(),
        });
        self.require_transmitter(id).cloned()
    }

    /// Remove a transmitter
    ///
    /// Refused while channels or backup systems still reference it. Its
    /// alerts stay in the history.
    pub fn remove_transmitter(&mut self, id: &str) -> FleetResult<Transmitter> {
        self.require_transmitter(id)?;

        if self.records.channels.iter().any(|c| c.transmitter_id == id) {
            return Err(FleetError::Conflict(format!(
                "transmitter '{id}' still carries channels"
            )));
        }
        if self
            .records
            .backup_systems
            .iter()
            .any(|b| b.primary_transmitter_id == id || b.backup_transmitter_id == id)
        {
            return Err(FleetError::Conflict(format!(
                "transmitter '{id}' is part of a backup system"
            )));
        }

        let index = self
            .records
            .transmitters
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Transmitter, id))?;
        let removed = self.records.transmitters.remove(index);

        for other in &mut self.records.transmitters {
            if other.backup_transmitter_id.as_deref() == Some(id) {
                other.backup_transmitter_id = None;
            }
        }

        debug!("removed transmitter {id}");
        self.emit(FleetEvent::TransmitterRemoved {
            transmitter_id: id.to_string(),
        });
        Ok(removed)
    }

    /// Apply a telemetry update, run the alert rules and rescore
    pub fn update_transmitter_metrics(
        &mut self,
        id: &str,
        update: MetricsUpdate,
    ) -> FleetResult<MetricsOutcome> {
        let thresholds = self.settings.thresholds;
        let transmitter = self.transmitter_mut(id)?;
        if let Some(power_output) = update.power_output {
            transmitter.power_output = power_output;
        }
        if let Some(signal_quality) = update.signal_quality {
            transmitter.signal_quality = signal_quality;
        }
        if let Some(temperature) = update.temperature {
            transmitter.temperature = temperature;
        }
        if let Some(voltage) = update.voltage {
            transmitter.voltage = voltage;
        }
        if let Some(current) = update.current {
            transmitter.current = current;
        }
        transmitter.uptime = transmitter.uptime.saturating_add(update.uptime_increment);
        transmitter.refresh_efficiency();
        transmitter.updated_at = Utc::now();

        let candidates = thresholds.evaluate(transmitter);
        let mut alerts = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            alerts.push(self.upsert_alert(candidate));
        }

        self.refresh_health(id);
        self.emit(FleetEvent::TransmitterChanged {
            transmitter_id: id.to_string(),
        });

        Ok(MetricsOutcome {
            transmitter: self.require_transmitter(id)?.clone(),
            alerts,
        })
    }

    /// Set a transmitter's status, logging the change
    fn set_transmitter_status(&mut self, id: &str, status: TransmitterStatus) -> FleetResult<()> {
        let transmitter = self.transmitter_mut(id)?;
        if transmitter.status != status {
            debug!("{id}: status {} → {status}", transmitter.status);
        }
        transmitter.status = status;
        transmitter.updated_at = Utc::now();
        self.emit(FleetEvent::TransmitterChanged {
            transmitter_id: id.to_string(),
        });
        Ok(())
    }

    /// Recompute a transmitter's health score from its readings and alerts
    fn refresh_health(&mut self, id: &str) {
        let Some(transmitter) = self.transmitter(id) else {
            return;
        };
        let inputs = HealthInputs::from(transmitter);
        let score = calculate_health_score(
            &inputs,
            self.records
                .alerts
                .iter()
                .filter(|a| a.transmitter_id.as_deref() == Some(id)),
        );

        if let Ok(transmitter) = self.transmitter_mut(id) {
            if transmitter.health_score != score {
                trace!("{id}: health {} → {score}", transmitter.health_score);
            }
            transmitter.health_score = score;
        }
    }

    fn audit(&mut self, action: &str, transmitter_id: Option<&str>, details: String, actor: &str) {
        let entry = AuditLogEntry {
            id: new_id(),
            timestamp: Utc::now(),
            action: action.to_string(),
            transmitter_id: transmitter_id.map(str::to_string),
            details,
            actor: actor.to_string(),
        };
        debug!("audit: {} by {}: {}", entry.action, entry.actor, entry.details);
        self.records.audit_log.push(entry.clone());
        self.emit(FleetEvent::AuditLogged(entry));
    }

    // ========================================================================
    // Transmission channels
    // ========================================================================

    pub fn add_channel(&mut self, new: NewChannel) -> FleetResult<TransmissionChannel> {
        self.require_transmitter(&new.transmitter_id)?;

        let id = new.id.unwrap_or_else(new_id);
        if self.channel(&id).is_some() {
            return Err(FleetError::AlreadyExists {
                kind: EntityKind::Channel,
                id,
            });
        }

        let channel = TransmissionChannel {
            id,
            name: new.name,
            transmitter_id: new.transmitter_id,
            frequency: new.frequency,
            bitrate: new.bitrate,
            signal_quality: new.signal_quality,
            status: new.status,
            last_test: None,
        };

        self.records.channels.push(channel.clone());
        self.emit(FleetEvent::ChannelChanged {
            channel_id: channel.id.clone(),
        });
        Ok(channel)
    }

    pub fn set_channel_status(
        &mut self,
        id: &str,
        status: ChannelStatus,
    ) -> FleetResult<TransmissionChannel> {
        let channel = self
            .records
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Channel, id))?;
        channel.status = status;
        let channel = channel.clone();

        self.emit(FleetEvent::ChannelChanged {
            channel_id: id.to_string(),
        });
        Ok(channel)
    }

    /// Record the outcome of a channel test run
    ///
    /// A signal below the loss threshold puts the channel into `error` and
    /// opens a `signal_loss` alert against both channel and transmitter.
    pub fn record_channel_test(
        &mut self,
        id: &str,
        signal_quality: f64,
        bitrate: f64,
    ) -> FleetResult<TransmissionChannel> {
        let thresholds = self.settings.thresholds;
        let loss = thresholds.signal_loss(signal_quality);

        let channel = self
            .records
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Channel, id))?;
        channel.signal_quality = signal_quality;
        channel.bitrate = bitrate;
        channel.last_test = Some(Utc::now());
        channel.status = if loss.is_some() {
            ChannelStatus::Error
        } else {
            ChannelStatus::Active
        };
        let channel = channel.clone();

        if let Some(severity) = loss {
            let transmitter_id = channel.transmitter_id.clone();
            self.upsert_alert(NewAlert {
                alert_type: AlertType::SignalLoss,
                severity,
                message: format!(
                    "channel {} test measured {:.1}% signal quality",
                    channel.name, signal_quality
                ),
                transmitter_id: Some(transmitter_id.clone()),
                channel_id: Some(channel.id.clone()),
                antenna_id: None,
            });
            self.refresh_health(&transmitter_id);
        }

        self.emit(FleetEvent::ChannelChanged {
            channel_id: id.to_string(),
        });
        Ok(channel)
    }
}
