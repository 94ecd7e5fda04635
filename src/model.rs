//! Transmission fleet entities
//!
//! All records are flat and serialize to the persisted JSON layout
//! (`camelCase` fields, RFC 3339 timestamps). Ownership between records is
//! expressed through id fields only; the fleet state checks those ids on write.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a fresh record id
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmitterStatus {
    Online,
    Offline,
    Standby,
    Maintenance,
    Error,
    Backup,
}

impl fmt::Display for TransmitterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransmitterStatus::Online => "online",
            TransmitterStatus::Offline => "offline",
            TransmitterStatus::Standby => "standby",
            TransmitterStatus::Maintenance => "maintenance",
            TransmitterStatus::Error => "error",
            TransmitterStatus::Backup => "backup",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transmitter {
    pub id: String,
    pub name: String,
    pub location: String,
    pub serial_number: String,

    /// Carrier frequency in MHz
    pub frequency: f64,
    pub modulation: String,

    /// Input power in kW
    pub power_input: f64,

    /// Output power in kW
    pub power_output: f64,
    pub voltage: f64,
    pub current: f64,

    /// Derived: `power_output / power_input * 100`
    pub efficiency: f64,
    pub signal_quality: f64,
    pub temperature: f64,

    /// Derived: 0-100
    pub health_score: u8,
    pub status: TransmitterStatus,

    /// Seconds spent online
    pub uptime: u64,

    /// Ids of alerts raised against this transmitter
    #[serde(default)]
    pub alerts: Vec<String>,
    pub is_backup: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_transmitter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_maintenance: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transmitter {
    /// Recompute the derived efficiency from the current power figures
    pub fn refresh_efficiency(&mut self) {
        self.efficiency = efficiency(self.power_input, self.power_output);
    }
}

/// Output/input power ratio in percent; 0 when there is no input power
pub fn efficiency(power_input: f64, power_output: f64) -> f64 {
    if power_input <= 0.0 || !power_input.is_finite() {
        return 0.0;
    }
    (power_output / power_input * 100.0).clamp(0.0, 100.0)
}

/// Fields an operator supplies when registering a transmitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransmitter {
    /// Explicit id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub serial_number: String,
    pub frequency: f64,
    #[serde(default = "default_modulation")]
    pub modulation: String,
    pub power_input: f64,
    pub power_output: f64,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub current: f64,
    #[serde(default = "default_signal_quality")]
    pub signal_quality: f64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_status")]
    pub status: TransmitterStatus,
    #[serde(default)]
    pub is_backup: bool,
    #[serde(default)]
    pub backup_transmitter_id: Option<String>,
}

fn default_modulation() -> String {
    "DVB-T2".to_string()
}

fn default_signal_quality() -> f64 {
    95.0
}

fn default_temperature() -> f64 {
    45.0
}

fn default_status() -> TransmitterStatus {
    TransmitterStatus::Online
}

/// Operator edits to a transmitter's descriptive and operating parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmitterPatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub serial_number: Option<String>,
    pub frequency: Option<f64>,
    pub modulation: Option<String>,
    pub power_input: Option<f64>,
    pub status: Option<TransmitterStatus>,
    pub is_backup: Option<bool>,
    pub backup_transmitter_id: Option<Option<String>>,
    pub last_maintenance: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    Active,
    Inactive,
    Testing,
    Error,
    Maintenance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionChannel {
    pub id: String,
    pub name: String,
    pub transmitter_id: String,
    pub frequency: f64,

    /// Bitrate in Mbit/s
    pub bitrate: f64,
    pub signal_quality: f64,
    pub status: ChannelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_test: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChannel {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub transmitter_id: String,
    pub frequency: f64,
    #[serde(default)]
    pub bitrate: f64,
    #[serde(default = "default_signal_quality")]
    pub signal_quality: f64,
    #[serde(default = "default_channel_status")]
    pub status: ChannelStatus,
}

fn default_channel_status() -> ChannelStatus {
    ChannelStatus::Active
}

/// Alert severity, ordered `Low < Medium < High < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    /// Sort rank used by the dashboard (`critical=4` … `low=1`)
    pub fn rank(self) -> u8 {
        match self {
            AlertSeverity::Low => 1,
            AlertSeverity::Medium => 2,
            AlertSeverity::High => 3,
            AlertSeverity::Critical => 4,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PowerFailure,
    SignalLoss,
    Overheating,
    EquipmentFailure,
    FrequencyDrift,
    LowEfficiency,
    AntennaFault,
    MaintenanceDue,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertType::PowerFailure => "power_failure",
            AlertType::SignalLoss => "signal_loss",
            AlertType::Overheating => "overheating",
            AlertType::EquipmentFailure => "equipment_failure",
            AlertType::FrequencyDrift => "frequency_drift",
            AlertType::LowEfficiency => "low_efficiency",
            AlertType::AntennaFault => "antenna_fault",
            AlertType::MaintenanceDue => "maintenance_due",
        };
        write!(f, "{s}")
    }
}

/// An alert raised against a transmitter, channel or antenna
///
/// Unresolved alerts have `resolved == false` and no `resolved_at`; resolved
/// alerts carry both. Once resolved an alert is never reopened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmitter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub antenna_id: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_taken: Option<String>,

    /// How many times the condition was observed while the alert stayed open
    #[serde(default = "default_occurrences")]
    pub occurrences: u32,
    pub last_seen: DateTime<Utc>,
}

fn default_occurrences() -> u32 {
    1
}

impl TransmissionAlert {
    pub fn is_active(&self) -> bool {
        !self.resolved
    }

    /// Whether this alert is the open instance for the given dedup key
    pub fn matches_key(&self, key: &AlertKey) -> bool {
        self.alert_type == key.alert_type
            && self.transmitter_id == key.transmitter_id
            && self.channel_id == key.channel_id
    }
}

/// Dedup key: at most one unresolved alert exists per key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
    pub alert_type: AlertType,
    pub transmitter_id: Option<String>,
    pub channel_id: Option<String>,
}

/// Request to open (or refresh) an alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub transmitter_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub antenna_id: Option<String>,
}

impl NewAlert {
    pub fn for_transmitter(
        transmitter_id: impl Into<String>,
        alert_type: AlertType,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            alert_type,
            severity,
            message: message.into(),
            transmitter_id: Some(transmitter_id.into()),
            channel_id: None,
            antenna_id: None,
        }
    }

    pub fn key(&self) -> AlertKey {
        AlertKey {
            alert_type: self.alert_type,
            transmitter_id: self.transmitter_id.clone(),
            channel_id: self.channel_id.clone(),
        }
    }
}

/// Primary/backup transmitter pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSystem {
    pub id: String,
    pub name: String,
    pub primary_transmitter_id: String,
    pub backup_transmitter_id: String,
    pub auto_switch_enabled: bool,

    /// Seconds to wait before an automatic switch
    pub switch_delay: u64,
    pub switch_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_switch: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBackupSystem {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub primary_transmitter_id: String,
    pub backup_transmitter_id: String,
    #[serde(default)]
    pub auto_switch_enabled: bool,
    #[serde(default = "default_switch_delay")]
    pub switch_delay: u64,
}

fn default_switch_delay() -> u64 {
    5
}

/// Result of a primary/backup switch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchRecord {
    pub backup_system_id: String,
    pub primary_transmitter_id: String,
    pub backup_transmitter_id: String,
    pub switch_count: u32,
    pub switched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmitter_id: Option<String>,
    pub details: String,
    pub actor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    PowerOn,
    PowerOff,
    Standby,
    Reset,
    MaintenanceMode,
    RunDiagnostics,
}

impl CommandType {
    /// Status a transmitter ends up in once the command completed
    pub fn resulting_status(self) -> Option<TransmitterStatus> {
        match self {
            CommandType::PowerOn | CommandType::Reset => Some(TransmitterStatus::Online),
            CommandType::PowerOff => Some(TransmitterStatus::Offline),
            CommandType::Standby => Some(TransmitterStatus::Standby),
            CommandType::MaintenanceMode => Some(TransmitterStatus::Maintenance),
            CommandType::RunDiagnostics => None,
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandType::PowerOn => "power_on",
            CommandType::PowerOff => "power_off",
            CommandType::Standby => "standby",
            CommandType::Reset => "reset",
            CommandType::MaintenanceMode => "maintenance_mode",
            CommandType::RunDiagnostics => "run_diagnostics",
        };
        write!(f, "{s}")
    }
}

/// `Pending → Executing → Completed | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Pending,
    Executing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (CommandStatus::Pending, CommandStatus::Executing)
                | (CommandStatus::Pending, CommandStatus::Failed)
                | (CommandStatus::Executing, CommandStatus::Completed)
                | (CommandStatus::Executing, CommandStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommand {
    pub id: String,
    pub transmitter_id: String,
    pub command: CommandType,
    pub issued_by: String,
    pub status: CommandStatus,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
