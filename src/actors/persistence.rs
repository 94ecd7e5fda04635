//! PersistenceActor - writes changed collections to the state backend
//!
//! ## Batching Strategy
//!
//! Every [`FleetEvent`] names the storage keys it touches. The actor collects
//! those keys and, on each flush, takes one snapshot from the fleet actor and
//! writes only the dirty keys:
//!
//! - **Time trigger**: every `flush_interval` while something is dirty
//! - **Explicit**: `Flush` and `Shutdown` commands
//!
//! A failed flush keeps its keys dirty, so they are retried on the next tick.
//! If the subscription lags, every key is marked dirty.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time;
use tracing::{debug, error, instrument, trace, warn};

use crate::storage::{StateBackend, StateKey, schema};

use super::MIN_TICK;
use super::fleet::FleetHandle;
use super::messages::{FleetEvent, PersistenceCommand, PersistenceStats};

pub struct PersistenceActor {
    fleet: FleetHandle,
    backend: Box<dyn StateBackend>,

    /// Command receiver
    command_rx: mpsc::Receiver<PersistenceCommand>,

    /// Fleet event receiver (broadcast subscription)
    event_rx: broadcast::Receiver<FleetEvent>,

    /// Keys changed since the last successful flush
    dirty: BTreeSet<StateKey>,

    flush_interval: Duration,
    stats: PersistenceStats,
}

impl PersistenceActor {
    pub fn new(
        fleet: FleetHandle,
        backend: Box<dyn StateBackend>,
        command_rx: mpsc::Receiver<PersistenceCommand>,
        event_rx: broadcast::Receiver<FleetEvent>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            fleet,
            backend,
            command_rx,
            event_rx,
            dirty: BTreeSet::new(),
            flush_interval: flush_interval.max(MIN_TICK),
            stats: PersistenceStats::default(),
        }
    }

    #[instrument(skip(self), fields(flush_interval = ?self.flush_interval))]
    pub async fn run(mut self) {
        debug!("starting persistence actor");

        let mut flush_ticker = time::interval(self.flush_interval);
        flush_ticker.tick().await;

        loop {
            tokio::select! {
                result = self.event_rx.recv() => {
                    match result {
                        Ok(event) => self.mark(&event),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("persistence actor lagged, skipped {skipped} events; marking everything dirty");
                            self.dirty.extend(StateKey::ALL);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            warn!("event channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = flush_ticker.tick() => {
                    if !self.dirty.is_empty() {
                        trace!("time-based flush triggered ({} keys)", self.dirty.len());
                        if let Err(e) = self.flush().await {
                            error!("failed to flush state: {:#}", e);
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PersistenceCommand::Flush { respond_to } => {
                            let _ = respond_to.send(self.flush().await);
                        }

                        PersistenceCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats());
                        }

                        PersistenceCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            let result = self.flush().await;
                            if let Err(e) = self.backend.close().await {
                                error!("error closing backend: {}", e);
                            }
                            let _ = respond_to.send(result);
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

        debug!("persistence actor stopped");
    }

    fn mark(&mut self, event: &FleetEvent) {
        self.dirty.extend(event.touched().iter().copied());
    }

    fn stats(&self) -> PersistenceStats {
        PersistenceStats {
            dirty_keys: self.dirty.len(),
            ..self.stats.clone()
        }
    }

    /// Write every dirty key from a fresh snapshot
    ///
    /// Queued events are drained before the snapshot is requested, so the
    /// snapshot covers every key marked at that point. Events that arrive
    /// later stay queued and mark their keys again.
    async fn flush(&mut self) -> Result<()> {
        loop {
            match self.event_rx.try_recv() {
                Ok(event) => self.mark(&event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("persistence actor lagged, skipped {skipped} events; marking everything dirty");
                    self.dirty.extend(StateKey::ALL);
                }
                Err(_) => break,
            }
        }

        if self.dirty.is_empty() {
            return Ok(());
        }
        let keys: Vec<StateKey> = self.dirty.iter().copied().collect();

        let snapshot = self
            .fleet
            .snapshot()
            .await
            .context("failed to snapshot fleet state")?;

        debug!("flushing {} keys to backend", keys.len());

        match schema::save_keys(self.backend.as_ref(), &snapshot, &keys).await {
            Ok(()) => {
                for key in &keys {
                    self.dirty.remove(key);
                }
                self.stats.flush_count += 1;
                self.stats.keys_written += keys.len() as u64;
                self.stats.last_flush = Some(Utc::now());
                trace!("flush #{} complete", self.stats.flush_count);
                Ok(())
            }
            Err(e) => {
                self.stats.failed_flushes += 1;
                Err(e).context("failed to write state")
            }
        }
    }
}

/// Handle for controlling a PersistenceActor
#[derive(Clone)]
pub struct PersistenceHandle {
    sender: mpsc::Sender<PersistenceCommand>,
}

impl PersistenceHandle {
    /// Spawn the actor; it subscribes to the fleet's events immediately
    pub fn spawn(fleet: FleetHandle, backend: Box<dyn StateBackend>, flush_interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let event_rx = fleet.subscribe();
        let actor = PersistenceActor::new(fleet, backend, cmd_rx, event_rx, flush_interval);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn flush(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersistenceCommand::Flush { respond_to: tx })
            .await
            .context("failed to send Flush command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn stats(&self) -> Result<PersistenceStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersistenceCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    /// Flush pending changes, close the backend and stop
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PersistenceCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;

        rx.await.context("failed to receive response")?
    }
}
