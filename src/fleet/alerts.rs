//! Alert engine
//!
//! Alerts are keyed by `(type, transmitter, channel)`. While an alert with a
//! key is unresolved, further reports for the same key refresh it instead of
//! opening a duplicate:
//!
//! ```text
//! report(key) ── open alert for key? ──yes──► occurrences += 1, last_seen = now,
//!                      │                      severity = max(old, new)
//!                      no
//!                      ▼
//!               append new alert
//! ```
//!
//! Once resolved an alert is frozen; the next report for its key opens a
//! fresh one.

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    actors::messages::FleetEvent,
    error::{EntityKind, FleetError, FleetResult},
    model::{AlertSeverity, NewAlert, TransmissionAlert, new_id},
};

use super::FleetState;

impl FleetState {
    /// Open an alert, or refresh the open alert with the same key
    ///
    /// Referenced transmitter and channel must exist.
    pub fn create_alert(&mut self, new: NewAlert) -> FleetResult<TransmissionAlert> {
        if let Some(transmitter_id) = &new.transmitter_id {
            self.require_transmitter(transmitter_id)?;
        }
        if let Some(channel_id) = &new.channel_id {
            let channel = self.require_channel(channel_id)?;
            if let Some(transmitter_id) = &new.transmitter_id {
                if &channel.transmitter_id != transmitter_id {
                    return Err(FleetError::InvalidInput(format!(
                        "channel '{channel_id}' does not belong to transmitter '{transmitter_id}'"
                    )));
                }
            }
        }

        let transmitter_id = new.transmitter_id.clone();
        let alert = self.upsert_alert(new);
        if let Some(transmitter_id) = transmitter_id {
            self.refresh_health(&transmitter_id);
        }
        Ok(alert)
    }

    /// Insert or refresh without reference checks; callers have validated
    pub(super) fn upsert_alert(&mut self, new: NewAlert) -> TransmissionAlert {
        let now = Utc::now();
        let key = new.key();

        let existing = if self.settings.dedup_alerts {
            self.records
                .alerts
                .iter_mut()
                .find(|a| a.is_active() && a.matches_key(&key))
        } else {
            None
        };

        if let Some(existing) = existing {
            let previous_severity = existing.severity;
            existing.occurrences = existing.occurrences.saturating_add(1);
            existing.last_seen = now;
            existing.message = new.message;
            existing.severity = existing.severity.max(new.severity);
            let alert = existing.clone();

            debug!(
                "refreshed {} alert {} ({} occurrences)",
                alert.alert_type, alert.id, alert.occurrences
            );
            self.emit(FleetEvent::AlertRefreshed {
                alert: alert.clone(),
                previous_severity,
            });
            return alert;
        }

        let alert = TransmissionAlert {
            id: new_id(),
            alert_type: new.alert_type,
            severity: new.severity,
            message: new.message,
            transmitter_id: new.transmitter_id,
            channel_id: new.channel_id,
            antenna_id: new.antenna_id,
            detected_at: now,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
            action_taken: None,
            occurrences: 1,
            last_seen: now,
        };

        info!(
            "{} alert raised ({}): {}",
            alert.severity, alert.alert_type, alert.message
        );

        if let Some(transmitter_id) = &alert.transmitter_id {
            if let Ok(transmitter) = self.transmitter_mut(transmitter_id) {
                transmitter.alerts.push(alert.id.clone());
            }
        }

        self.records.alerts.push(alert.clone());
        self.emit(FleetEvent::AlertRaised(alert.clone()));
        alert
    }

    /// Mark one alert resolved
    ///
    /// Resolving twice is refused so the original resolution stays intact.
    pub fn resolve_alert(
        &mut self,
        id: &str,
        resolved_by: &str,
        action_taken: Option<String>,
    ) -> FleetResult<TransmissionAlert> {
        let alert = self
            .records
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Alert, id))?;

        if alert.resolved {
            return Err(FleetError::Conflict(format!("alert '{id}' is already resolved")));
        }

        alert.resolved = true;
        alert.resolved_at = Some(Utc::now());
        alert.resolved_by = Some(resolved_by.to_string());
        alert.action_taken = action_taken;
        let alert = alert.clone();

        info!("alert {} ({}) resolved by {resolved_by}", alert.id, alert.alert_type);

        if let Some(transmitter_id) = &alert.transmitter_id {
            self.refresh_health(transmitter_id);
        }
        self.emit(FleetEvent::AlertResolved(alert.clone()));
        Ok(alert)
    }

    pub fn alert(&self, id: &str) -> Option<&TransmissionAlert> {
        self.records.alerts.iter().find(|a| a.id == id)
    }

    /// All unresolved alerts, oldest first
    pub fn active_alerts(&self) -> Vec<TransmissionAlert> {
        self.records
            .alerts
            .iter()
            .filter(|a| a.is_active())
            .cloned()
            .collect()
    }

    /// All alerts (resolved or not) with the given severity
    pub fn alerts_by_severity(&self, severity: AlertSeverity) -> Vec<TransmissionAlert> {
        self.records
            .alerts
            .iter()
            .filter(|a| a.severity == severity)
            .cloned()
            .collect()
    }
}
