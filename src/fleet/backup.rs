//! Backup coordinator: primary/backup pairing, switching and emergency
//! procedures
//!
//! At most one backup system per primary transmitter may be active at a
//! time; activation of a second one is refused.

use chrono::Utc;
use tracing::{info, warn};

use crate::{
    actors::messages::FleetEvent,
    error::{EntityKind, FleetError, FleetResult},
    model::{
        AlertSeverity, AlertType, BackupSystem, NewAlert, NewBackupSystem, SwitchRecord,
        TransmissionAlert, TransmitterStatus, new_id,
    },
};

use super::FleetState;

impl FleetState {
    pub fn backup_system(&self, id: &str) -> Option<&BackupSystem> {
        self.records.backup_systems.iter().find(|b| b.id == id)
    }

    /// The backup system configured for a primary transmitter
    ///
    /// When several exist, an active one is preferred, then the first
    /// configured.
    pub fn backup_for_primary(&self, transmitter_id: &str) -> Option<&BackupSystem> {
        let mut candidates = self
            .records
            .backup_systems
            .iter()
            .filter(|b| b.primary_transmitter_id == transmitter_id);
        let first = candidates.next()?;
        if first.is_active {
            return Some(first);
        }
        candidates.find(|b| b.is_active).or(Some(first))
    }

    pub fn add_backup_system(&mut self, new: NewBackupSystem) -> FleetResult<BackupSystem> {
        if new.primary_transmitter_id == new.backup_transmitter_id {
            return Err(FleetError::InvalidInput(
                "primary and backup transmitter must differ".to_string(),
            ));
        }
        self.require_transmitter(&new.primary_transmitter_id)?;
        self.require_transmitter(&new.backup_transmitter_id)?;

        let id = new.id.unwrap_or_else(new_id);
        if self.backup_system(&id).is_some() {
            return Err(FleetError::AlreadyExists {
                kind: EntityKind::BackupSystem,
                id,
            });
        }

        let system = BackupSystem {
            id,
            name: new.name,
            primary_transmitter_id: new.primary_transmitter_id,
            backup_transmitter_id: new.backup_transmitter_id,
            auto_switch_enabled: new.auto_switch_enabled,
            switch_delay: new.switch_delay,
            switch_count: 0,
            last_switch: None,
            is_active: false,
        };

        let backup_id = system.backup_transmitter_id.clone();
        if let Ok(backup) = self.transmitter_mut(&backup_id) {
            backup.is_backup = true;
        }
        let primary_id = system.primary_transmitter_id.clone();
        if let Ok(primary) = self.transmitter_mut(&primary_id) {
            primary.backup_transmitter_id = Some(backup_id.clone());
        }

        self.records.backup_systems.push(system.clone());
        self.emit(FleetEvent::BackupSystemChanged {
            backup_system_id: system.id.clone(),
        });
        self.emit(FleetEvent::TransmitterChanged {
            transmitter_id: primary_id,
        });
        self.emit(FleetEvent::TransmitterChanged {
            transmitter_id: backup_id,
        });
        Ok(system)
    }

    /// Switch traffic from the primary to the backup transmitter
    pub fn activate_backup(&mut self, backup_system_id: &str, actor: &str) -> FleetResult<SwitchRecord> {
        let system = self
            .backup_system(backup_system_id)
            .ok_or_else(|| FleetError::not_found(EntityKind::BackupSystem, backup_system_id))?
            .clone();

        self.require_transmitter(&system.primary_transmitter_id)?;
        self.require_transmitter(&system.backup_transmitter_id)?;

        if let Some(other) = self.records.backup_systems.iter().find(|b| {
            b.is_active && b.id != system.id && b.primary_transmitter_id == system.primary_transmitter_id
        }) {
            return Err(FleetError::Conflict(format!(
                "backup system '{}' is already active for transmitter '{}'",
                other.id, system.primary_transmitter_id
            )));
        }

        self.set_transmitter_status(&system.primary_transmitter_id, TransmitterStatus::Backup)?;
        self.set_transmitter_status(&system.backup_transmitter_id, TransmitterStatus::Online)?;

        let now = Utc::now();
        let stored = self
            .records
            .backup_systems
            .iter_mut()
            .find(|b| b.id == system.id)
            .ok_or_else(|| FleetError::not_found(EntityKind::BackupSystem, backup_system_id))?;
        stored.switch_count = stored.switch_count.saturating_add(1);
        stored.last_switch = Some(now);
        stored.is_active = true;

        let record = SwitchRecord {
            backup_system_id: stored.id.clone(),
            primary_transmitter_id: stored.primary_transmitter_id.clone(),
            backup_transmitter_id: stored.backup_transmitter_id.clone(),
            switch_count: stored.switch_count,
            switched_at: now,
        };

        info!(
            "backup system {} activated: {} → {} (switch #{})",
            record.backup_system_id,
            record.primary_transmitter_id,
            record.backup_transmitter_id,
            record.switch_count
        );

        self.audit(
            "backup_activated",
            Some(&record.primary_transmitter_id),
            format!(
                "switched {} to backup {} via {}",
                record.primary_transmitter_id, record.backup_transmitter_id, record.backup_system_id
            ),
            actor,
        );
        self.emit(FleetEvent::BackupSystemChanged {
            backup_system_id: record.backup_system_id.clone(),
        });
        self.emit(FleetEvent::BackupActivated(record.clone()));
        Ok(record)
    }

    /// Hand traffic back to the primary and put the backup on standby
    pub fn deactivate_backup(&mut self, backup_system_id: &str, actor: &str) -> FleetResult<BackupSystem> {
        let system = self
            .backup_system(backup_system_id)
            .ok_or_else(|| FleetError::not_found(EntityKind::BackupSystem, backup_system_id))?
            .clone();

        if !system.is_active {
            return Err(FleetError::Conflict(format!(
                "backup system '{backup_system_id}' is not active"
            )));
        }

        self.set_transmitter_status(&system.primary_transmitter_id, TransmitterStatus::Online)?;
        self.set_transmitter_status(&system.backup_transmitter_id, TransmitterStatus::Standby)?;

        let stored = self
            .records
            .backup_systems
            .iter_mut()
            .find(|b| b.id == system.id)
            .ok_or_else(|| FleetError::not_found(EntityKind::BackupSystem, backup_system_id))?;
        stored.is_active = false;
        let stored = stored.clone();

        self.audit(
            "backup_deactivated",
            Some(&stored.primary_transmitter_id),
            format!(
                "returned traffic to {} from {}",
                stored.primary_transmitter_id, stored.backup_transmitter_id
            ),
            actor,
        );
        self.emit(FleetEvent::BackupSystemChanged {
            backup_system_id: stored.id.clone(),
        });
        self.emit(FleetEvent::BackupDeactivated {
            backup_system_id: stored.id.clone(),
        });
        Ok(stored)
    }

    /// Force a transmitter offline and raise a critical equipment alert
    pub fn emergency_shutdown(
        &mut self,
        transmitter_id: &str,
        reason: &str,
        actor: &str,
    ) -> FleetResult<TransmissionAlert> {
        self.set_transmitter_status(transmitter_id, TransmitterStatus::Offline)?;

        warn!("emergency shutdown of {transmitter_id}: {reason}");

        let alert = self.upsert_alert(NewAlert::for_transmitter(
            transmitter_id,
            AlertType::EquipmentFailure,
            AlertSeverity::Critical,
            format!("emergency shutdown: {reason}"),
        ));
        self.refresh_health(transmitter_id);
        self.audit(
            "emergency_shutdown",
            Some(transmitter_id),
            reason.to_string(),
            actor,
        );
        Ok(alert)
    }

    /// Fail over the transmitter carrying a channel to its configured backup
    pub fn activate_emergency_backup(
        &mut self,
        channel_id: &str,
        actor: &str,
    ) -> FleetResult<SwitchRecord> {
        let transmitter_id = self.require_channel(channel_id)?.transmitter_id.clone();

        let Some(system_id) = self
            .backup_for_primary(&transmitter_id)
            .map(|b| b.id.clone())
        else {
            warn!("emergency backup requested for channel {channel_id}, but {transmitter_id} has no backup system");
            return Err(FleetError::NoBackupConfigured { transmitter_id });
        };

        self.activate_backup(&system_id, actor)
    }
}
