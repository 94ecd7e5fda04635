//! Cross-source alert view and overall system health
//!
//! Transmission alerts, broadcast errors and black-screen detections are
//! folded into one [`UnifiedAlert`] list, most severe first.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    broadcast::{BlackScreenDetection, BroadcastError},
    fleet::FleetSnapshot,
    model::{AlertSeverity, TransmissionAlert, TransmitterStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSource {
    Transmission,
    Broadcast,
    Streaming,
    System,
}

impl fmt::Display for AlertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlertSource::Transmission => "transmission",
            AlertSource::Broadcast => "broadcast",
            AlertSource::Streaming => "streaming",
            AlertSource::System => "system",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedAlert {
    pub id: String,
    pub source: AlertSource,
    pub kind: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,

    /// Transmitter or channel the alert is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

impl From<&TransmissionAlert> for UnifiedAlert {
    fn from(alert: &TransmissionAlert) -> Self {
        let subject = alert
            .transmitter_id
            .clone()
            .or_else(|| alert.channel_id.clone())
            .or_else(|| alert.antenna_id.clone());

        // alerts not tied to any equipment are fleet-wide
        let source = if subject.is_some() {
            AlertSource::Transmission
        } else {
            AlertSource::System
        };

        Self {
            id: alert.id.clone(),
            source,
            kind: alert.alert_type.to_string(),
            severity: alert.severity,
            message: alert.message.clone(),
            detected_at: alert.detected_at,
            resolved: alert.resolved,
            subject,
        }
    }
}

impl From<&BroadcastError> for UnifiedAlert {
    fn from(error: &BroadcastError) -> Self {
        Self {
            id: error.id.clone(),
            source: AlertSource::Broadcast,
            kind: error.error_type.to_string(),
            severity: error.severity,
            message: error.message.clone(),
            detected_at: error.detected_at,
            resolved: error.resolved,
            subject: Some(error.channel_id.clone()),
        }
    }
}

impl From<&BlackScreenDetection> for UnifiedAlert {
    fn from(detection: &BlackScreenDetection) -> Self {
        Self {
            id: detection.id.clone(),
            source: AlertSource::Streaming,
            kind: "black_screen".to_string(),
            severity: detection.severity,
            message: format!(
                "black screen for {}s on {}",
                detection.duration_secs, detection.channel_id
            ),
            detected_at: detection.detected_at,
            resolved: detection.resolved,
            subject: Some(detection.channel_id.clone()),
        }
    }
}

/// Every alert-like record in the snapshot, most severe first
///
/// Equal severities are ordered newest first.
pub fn aggregate_alerts(snapshot: &FleetSnapshot) -> Vec<UnifiedAlert> {
    let mut alerts: Vec<UnifiedAlert> = snapshot
        .alerts
        .iter()
        .map(UnifiedAlert::from)
        .chain(snapshot.broadcast_errors.iter().map(UnifiedAlert::from))
        .chain(snapshot.black_screens.iter().map(UnifiedAlert::from))
        .collect();

    alerts.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| b.detected_at.cmp(&a.detected_at))
    });
    alerts
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AlertFilter {
    #[serde(default)]
    pub severity: Option<AlertSeverity>,
    #[serde(default)]
    pub source: Option<AlertSource>,

    /// Case-insensitive substring of kind or message
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub include_resolved: bool,
}

impl AlertFilter {
    pub fn matches(&self, alert: &UnifiedAlert) -> bool {
        if !self.include_resolved && alert.resolved {
            return false;
        }
        if self.severity.is_some_and(|s| s != alert.severity) {
            return false;
        }
        if self.source.is_some_and(|s| s != alert.source) {
            return false;
        }
        match &self.search {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                alert.kind.to_lowercase().contains(&needle)
                    || alert.message.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }

    pub fn apply(&self, alerts: Vec<UnifiedAlert>) -> Vec<UnifiedAlert> {
        alerts.into_iter().filter(|a| self.matches(a)).collect()
    }
}

/// Share of systems up, in percent
///
/// Counts online transmitters, live broadcast channels and live stream
/// sessions against their totals. An empty fleet is fully healthy.
pub fn system_health(snapshot: &FleetSnapshot) -> f64 {
    let online = snapshot
        .transmitters
        .iter()
        .filter(|t| t.status == TransmitterStatus::Online)
        .count()
        + snapshot.broadcast_channels.iter().filter(|c| c.is_live).count()
        + snapshot.stream_sessions.iter().filter(|s| s.is_live).count();

    let total = snapshot.transmitters.len()
        + snapshot.broadcast_channels.len()
        + snapshot.stream_sessions.len();

    if total == 0 {
        100.0
    } else {
        online as f64 / total as f64 * 100.0
    }
}

/// Numbers behind the periodic dashboard line
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSummary {
    pub system_health: f64,
    pub transmitters: usize,
    pub online_transmitters: usize,
    pub live_channels: usize,
    pub active_alerts: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl MonitoringSummary {
    pub fn from_snapshot(snapshot: &FleetSnapshot) -> Self {
        let mut summary = MonitoringSummary {
            system_health: system_health(snapshot),
            transmitters: snapshot.transmitters.len(),
            online_transmitters: snapshot
                .transmitters
                .iter()
                .filter(|t| t.status == TransmitterStatus::Online)
                .count(),
            live_channels: snapshot.broadcast_channels.iter().filter(|c| c.is_live).count(),
            ..Default::default()
        };

        for alert in aggregate_alerts(snapshot).iter().filter(|a| !a.resolved) {
            summary.active_alerts += 1;
            match alert.severity {
                AlertSeverity::Critical => summary.critical += 1,
                AlertSeverity::High => summary.high += 1,
                AlertSeverity::Medium => summary.medium += 1,
                AlertSeverity::Low => summary.low += 1,
            }
        }

        summary
    }
}

impl fmt::Display for MonitoringSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "health {:.1}% | transmitters {}/{} online | {} live channels | {} active alerts ({} critical, {} high, {} medium, {} low)",
            self.system_health,
            self.online_transmitters,
            self.transmitters,
            self.live_channels,
            self.active_alerts,
            self.critical,
            self.high,
            self.medium,
            self.low
        )
    }
}
