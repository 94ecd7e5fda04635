//! Remote command lifecycle
//!
//! ```text
//! pending ──► executing ──► completed
//!    │            │
//!    └────────────┴───────► failed
//! ```
//!
//! The status effect of a command is applied to its transmitter when the
//! command reaches `completed`. A command whose transmitter was removed in
//! the meantime fails instead.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    actors::messages::FleetEvent,
    error::{EntityKind, FleetError, FleetResult},
    model::{CommandStatus, CommandType, RemoteCommand, new_id},
};

use super::FleetState;

/// Error recorded on commands that were in flight when the service stopped
pub const INTERRUPTED_BY_RESTART: &str = "interrupted by restart";

impl FleetState {
    pub fn command(&self, id: &str) -> Option<&RemoteCommand> {
        self.records.commands.iter().find(|c| c.id == id)
    }

    /// Record a new command in `pending`
    pub fn enqueue_command(
        &mut self,
        transmitter_id: &str,
        command: CommandType,
        issued_by: &str,
    ) -> FleetResult<RemoteCommand> {
        self.require_transmitter(transmitter_id)?;

        let record = RemoteCommand {
            id: new_id(),
            transmitter_id: transmitter_id.to_string(),
            command,
            issued_by: issued_by.to_string(),
            status: CommandStatus::Pending,
            issued_at: Utc::now(),
            executed_at: None,
            completed_at: None,
            error: None,
        };

        debug!("queued {command} for {transmitter_id} (command {})", record.id);
        self.records.commands.push(record.clone());
        self.audit(
            "command_issued",
            Some(transmitter_id),
            format!("{command} ({})", record.id),
            issued_by,
        );
        self.emit(FleetEvent::CommandChanged(record.clone()));
        Ok(record)
    }

    /// Move a command along its lifecycle
    ///
    /// Completing a command whose transmitter no longer exists records it as
    /// failed and returns the failed record.
    pub fn set_command_status(
        &mut self,
        id: &str,
        status: CommandStatus,
        error: Option<String>,
    ) -> FleetResult<RemoteCommand> {
        let current = self
            .command(id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Command, id))?;

        if !current.status.can_transition_to(status) {
            return Err(FleetError::Conflict(format!(
                "command '{id}' cannot move from {:?} to {status:?}",
                current.status
            )));
        }

        let (status, error) = if status == CommandStatus::Completed
            && self.transmitter(&current.transmitter_id).is_none()
        {
            let reason = format!("transmitter '{}' no longer exists", current.transmitter_id);
            (CommandStatus::Failed, Some(reason))
        } else {
            (status, error)
        };

        let record = self
            .records
            .commands
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::Command, id))?;

        let now = Utc::now();
        record.status = status;
        match status {
            CommandStatus::Executing => record.executed_at = Some(now),
            CommandStatus::Completed | CommandStatus::Failed => {
                record.completed_at = Some(now);
                record.error = error;
            }
            CommandStatus::Pending => {}
        }
        let record = record.clone();

        match record.status {
            CommandStatus::Completed => {
                info!("{} on {} completed", record.command, record.transmitter_id);
                self.apply_command_effect(&record)?;
            }
            CommandStatus::Failed => warn!(
                "{} on {} failed: {}",
                record.command,
                record.transmitter_id,
                record.error.as_deref().unwrap_or("unknown error")
            ),
            _ => {}
        }

        self.emit(FleetEvent::CommandChanged(record.clone()));
        Ok(record)
    }

    /// Fail every command that has not reached a terminal status
    pub(super) fn fail_interrupted_commands(&mut self) {
        let now = Utc::now();
        let mut interrupted = Vec::new();
        for record in &mut self.records.commands {
            if record.status.is_terminal() {
                continue;
            }
            record.status = CommandStatus::Failed;
            record.completed_at = Some(now);
            record.error = Some(INTERRUPTED_BY_RESTART.to_string());
            interrupted.push(record.clone());
        }

        if !interrupted.is_empty() {
            warn!("failed {} commands interrupted by restart", interrupted.len());
        }
        for record in interrupted {
            self.emit(FleetEvent::CommandChanged(record));
        }
    }

    fn apply_command_effect(&mut self, record: &RemoteCommand) -> FleetResult<()> {
        if let Some(status) = record.command.resulting_status() {
            self.set_transmitter_status(&record.transmitter_id, status)?;
        }
        if record.command == CommandType::Reset {
            self.transmitter_mut(&record.transmitter_id)?.uptime = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::{FleetSettings, tests::state_with};
    use super::*;
    use crate::{MetricsUpdate, model::TransmitterStatus};
    use assert_matches::assert_matches;

    fn run(state: &mut FleetState, transmitter_id: &str, command: CommandType) -> RemoteCommand {
        let record = state.enqueue_command(transmitter_id, command, "operator").unwrap();
        state
            .set_command_status(&record.id, CommandStatus::Executing, None)
            .unwrap();
        state
            .set_command_status(&record.id, CommandStatus::Completed, None)
            .unwrap()
    }

    #[test]
    fn test_enqueue_command_is_pending() {
        let mut state = state_with(&["tx-1"]);
        let record = state
            .enqueue_command("tx-1", CommandType::Standby, "operator")
            .unwrap();

        assert_eq!(record.status, CommandStatus::Pending);
        assert_eq!(state.command(&record.id), Some(&record));
        assert_eq!(state.snapshot().audit_log.len(), 1);
    }

    #[test]
    fn test_enqueue_command_unknown_transmitter() {
        let mut state = state_with(&[]);
        assert_matches!(
            state.enqueue_command("tx-9", CommandType::PowerOn, "operator"),
            Err(FleetError::NotFound { kind: EntityKind::Transmitter, .. })
        );
    }

    #[test]
    fn test_completed_commands_apply_status() {
        let cases = [
            (CommandType::PowerOff, TransmitterStatus::Offline),
            (CommandType::PowerOn, TransmitterStatus::Online),
            (CommandType::Standby, TransmitterStatus::Standby),
            (CommandType::MaintenanceMode, TransmitterStatus::Maintenance),
        ];
        let mut state = state_with(&["tx-1"]);

        for (command, expected) in cases {
            let record = run(&mut state, "tx-1", command);
            assert_eq!(record.status, CommandStatus::Completed);
            assert!(record.executed_at.is_some());
            assert!(record.completed_at.is_some());
            assert_eq!(state.transmitter("tx-1").unwrap().status, expected, "{command}");
        }
    }

    #[test]
    fn test_reset_zeroes_uptime() {
        let mut state = state_with(&["tx-1"]);
        state
            .update_transmitter_metrics(
                "tx-1",
                MetricsUpdate {
                    uptime_increment: 3600,
                    ..Default::default()
                },
            )
            .unwrap();
        run(&mut state, "tx-1", CommandType::PowerOff);

        run(&mut state, "tx-1", CommandType::Reset);

        let tx = state.transmitter("tx-1").unwrap();
        assert_eq!(tx.uptime, 0);
        assert_eq!(tx.status, TransmitterStatus::Online);
    }

    #[test]
    fn test_diagnostics_leave_status_alone() {
        let mut state = state_with(&["tx-1"]);
        run(&mut state, "tx-1", CommandType::Standby);
        run(&mut state, "tx-1", CommandType::RunDiagnostics);
        assert_eq!(state.transmitter("tx-1").unwrap().status, TransmitterStatus::Standby);
    }

    #[test]
    fn test_failed_command_keeps_status() {
        let mut state = state_with(&["tx-1"]);
        let record = state
            .enqueue_command("tx-1", CommandType::PowerOff, "operator")
            .unwrap();
        state
            .set_command_status(&record.id, CommandStatus::Executing, None)
            .unwrap();
        let failed = state
            .set_command_status(&record.id, CommandStatus::Failed, Some("link down".into()))
            .unwrap();

        assert_eq!(failed.error.as_deref(), Some("link down"));
        assert_eq!(state.transmitter("tx-1").unwrap().status, TransmitterStatus::Online);
    }

    #[test]
    fn test_invalid_transitions_refused() {
        let mut state = state_with(&["tx-1"]);
        let record = state
            .enqueue_command("tx-1", CommandType::Standby, "operator")
            .unwrap();

        assert_matches!(
            state.set_command_status(&record.id, CommandStatus::Completed, None),
            Err(FleetError::Conflict(_))
        );

        let done = run(&mut state, "tx-1", CommandType::Standby);
        assert_matches!(
            state.set_command_status(&done.id, CommandStatus::Executing, None),
            Err(FleetError::Conflict(_))
        );
        assert_matches!(
            state.set_command_status("missing", CommandStatus::Executing, None),
            Err(FleetError::NotFound { kind: EntityKind::Command, .. })
        );
    }

    #[test]
    fn test_removed_transmitter_fails_command() {
        let mut state = state_with(&["tx-1"]);
        let record = state
            .enqueue_command("tx-1", CommandType::PowerOff, "operator")
            .unwrap();
        state
            .set_command_status(&record.id, CommandStatus::Executing, None)
            .unwrap();
        state.remove_transmitter("tx-1").unwrap();
        state.drain_events();

        let done = state
            .set_command_status(&record.id, CommandStatus::Completed, None)
            .unwrap();

        assert_eq!(done.status, CommandStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("transmitter 'tx-1' no longer exists"));
        assert!(done.completed_at.is_some());
        assert_eq!(state.command(&record.id), Some(&done));
        assert_matches!(
            state.drain_events().as_slice(),
            [FleetEvent::CommandChanged(changed)] if changed.status == CommandStatus::Failed
        );
    }

    #[test]
    fn test_restart_fails_commands_in_flight() {
        let mut state = state_with(&["tx-1"]);
        let pending = state
            .enqueue_command("tx-1", CommandType::Standby, "operator")
            .unwrap();
        let executing = state
            .enqueue_command("tx-1", CommandType::Reset, "operator")
            .unwrap();
        state
            .set_command_status(&executing.id, CommandStatus::Executing, None)
            .unwrap();
        let done = run(&mut state, "tx-1", CommandType::RunDiagnostics);

        let mut restored = FleetState::from_snapshot(FleetSettings::default(), state.snapshot());

        for id in [&pending.id, &executing.id] {
            let command = restored.command(id).unwrap();
            assert_eq!(command.status, CommandStatus::Failed);
            assert_eq!(command.error.as_deref(), Some(INTERRUPTED_BY_RESTART));
            assert!(command.completed_at.is_some());
        }
        assert_eq!(restored.command(&done.id), Some(&done));
        assert_eq!(restored.drain_events().len(), 2);
    }
}
