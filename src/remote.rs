//! Remote control of transmitters
//!
//! ```text
//! send() ──► pending ──(execute_delay)──► executing ──link──► completed
//!                                              │
//!                                              └─ error / timeout ──► failed
//! ```
//!
//! `send` returns as soon as the command is queued; the rest of the lifecycle
//! runs on a spawned task and is visible through the fleet's command records.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use crate::{
    actors::fleet::FleetHandle,
    config::CommandConfig,
    model::{CommandStatus, CommandType, RemoteCommand},
};

/// Carries a command to the device itself
#[async_trait]
pub trait TransmitterLink: Send + Sync {
    async fn execute(&self, transmitter_id: &str, command: CommandType) -> Result<()>;
}

/// Pretends to talk to the device: waits, then succeeds
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    delay: Duration,
}

impl SimulatedLink {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedLink {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl TransmitterLink for SimulatedLink {
    async fn execute(&self, transmitter_id: &str, command: CommandType) -> Result<()> {
        debug!("simulating {command} on {transmitter_id}");
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RemoteControl {
    fleet: FleetHandle,
    link: Arc<dyn TransmitterLink>,
    execute_delay: Duration,
    timeout: Duration,
}

impl RemoteControl {
    pub fn new(
        fleet: FleetHandle,
        link: Arc<dyn TransmitterLink>,
        execute_delay: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            fleet,
            link,
            execute_delay,
            timeout,
        }
    }

    /// Remote control over a [`SimulatedLink`] with configured timings
    pub fn simulated(fleet: FleetHandle, config: &CommandConfig) -> Self {
        let link = SimulatedLink::new(Duration::from_millis(config.link_delay_ms));
        Self::new(
            fleet,
            Arc::new(link),
            Duration::from_millis(config.execute_delay_ms),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Queue a command and start executing it in the background
    #[instrument(skip(self))]
    pub async fn send(
        &self,
        transmitter_id: &str,
        command: CommandType,
        issued_by: &str,
    ) -> Result<RemoteCommand> {
        let record = self
            .fleet
            .enqueue_command(transmitter_id, command, issued_by)
            .await?;
        info!("queued {command} for {transmitter_id} as {}", record.id);

        let this = self.clone();
        let queued = record.clone();
        tokio::spawn(async move {
            if let Err(e) = this.execute(&queued).await {
                warn!("command {} did not finish cleanly: {:#}", queued.id, e);
            }
        });

        Ok(record)
    }

    async fn execute(&self, queued: &RemoteCommand) -> Result<RemoteCommand> {
        tokio::time::sleep(self.execute_delay).await;

        self.fleet
            .set_command_status(&queued.id, CommandStatus::Executing, None)
            .await?;

        let outcome = match tokio::time::timeout(
            self.timeout,
            self.link.execute(&queued.transmitter_id, queued.command),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("{e:#}")),
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        };

        match outcome {
            Ok(()) => {
                let done = self
                    .fleet
                    .set_command_status(&queued.id, CommandStatus::Completed, None)
                    .await?;
                if done.status == CommandStatus::Failed {
                    bail!(
                        "{} on {} failed: {}",
                        queued.command,
                        queued.transmitter_id,
                        done.error.as_deref().unwrap_or("unknown error")
                    );
                }
                info!("{} on {} completed", queued.command, queued.transmitter_id);
                Ok(done)
            }
            Err(reason) => {
                self.fleet
                    .set_command_status(&queued.id, CommandStatus::Failed, Some(reason.clone()))
                    .await?;
                bail!("{} on {} failed: {reason}", queued.command, queued.transmitter_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        fleet::{FleetSettings, FleetState, tests::new_transmitter},
        model::TransmitterStatus,
    };
    use pretty_assertions::assert_eq;
    use tokio::sync::broadcast;

    struct BrokenLink;

    #[async_trait]
    impl TransmitterLink for BrokenLink {
        async fn execute(&self, _transmitter_id: &str, _command: CommandType) -> Result<()> {
            bail!("device unreachable")
        }
    }

    async fn fleet() -> FleetHandle {
        let (event_tx, _) = broadcast::channel(64);
        let fleet = FleetHandle::spawn(FleetState::new(FleetSettings::default()), event_tx);
        fleet.add_transmitter(new_transmitter("tx-1")).await.unwrap();
        fleet
    }

    fn control(fleet: &FleetHandle, link: Arc<dyn TransmitterLink>, timeout: Duration) -> RemoteControl {
        RemoteControl::new(fleet.clone(), link, Duration::from_millis(10), timeout)
    }

    async fn wait_until_done(fleet: &FleetHandle, id: &str) -> RemoteCommand {
        for _ in 0..100 {
            let command = fleet.command(id).await.unwrap().unwrap();
            if command.status.is_terminal() {
                return command;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("command {id} never finished");
    }

    #[tokio::test]
    async fn test_command_completes_and_applies_status() {
        let fleet = fleet().await;
        let remote = control(
            &fleet,
            Arc::new(SimulatedLink::new(Duration::from_millis(10))),
            Duration::from_secs(5),
        );

        let queued = remote
            .send("tx-1", CommandType::Standby, "operator")
            .await
            .unwrap();
        assert_eq!(queued.status, CommandStatus::Pending);

        let done = wait_until_done(&fleet, &queued.id).await;
        assert_eq!(done.status, CommandStatus::Completed);
        assert!(done.executed_at.is_some());
        assert!(done.completed_at.is_some());
        assert_eq!(done.error, None);

        let tx = fleet.transmitter("tx-1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransmitterStatus::Standby);

        fleet.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_link_error_fails_command() {
        let fleet = fleet().await;
        let remote = control(&fleet, Arc::new(BrokenLink), Duration::from_secs(5));

        let queued = remote
            .send("tx-1", CommandType::PowerOff, "operator")
            .await
            .unwrap();

        let done = wait_until_done(&fleet, &queued.id).await;
        assert_eq!(done.status, CommandStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("device unreachable"));

        let tx = fleet.transmitter("tx-1").await.unwrap().unwrap();
        assert_eq!(tx.status, TransmitterStatus::Online);

        fleet.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_link_times_out() {
        let fleet = fleet().await;
        let remote = control(
            &fleet,
            Arc::new(SimulatedLink::new(Duration::from_secs(10))),
            Duration::from_millis(50),
        );

        let queued = remote
            .send("tx-1", CommandType::Reset, "operator")
            .await
            .unwrap();

        let done = wait_until_done(&fleet, &queued.id).await;
        assert_eq!(done.status, CommandStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("timed out after 50ms"));

        fleet.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_transmitter_removed_while_executing() {
        let fleet = fleet().await;
        let remote = control(
            &fleet,
            Arc::new(SimulatedLink::new(Duration::from_millis(300))),
            Duration::from_secs(5),
        );

        let queued = remote
            .send("tx-1", CommandType::PowerOff, "operator")
            .await
            .unwrap();
        for _ in 0..50 {
            let command = fleet.command(&queued.id).await.unwrap().unwrap();
            if command.status == CommandStatus::Executing {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        fleet.remove_transmitter("tx-1").await.unwrap();

        let done = wait_until_done(&fleet, &queued.id).await;
        assert_eq!(done.status, CommandStatus::Failed);
        assert_eq!(done.error.as_deref(), Some("transmitter 'tx-1' no longer exists"));

        fleet.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_transmitter_is_rejected() {
        let fleet = fleet().await;
        let remote = RemoteControl::simulated(fleet.clone(), &CommandConfig::default());

        assert!(
            remote
                .send("tx-404", CommandType::PowerOn, "operator")
                .await
                .is_err()
        );

        fleet.shutdown().await.unwrap();
    }
}
