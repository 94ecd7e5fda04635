//! Persisted state layout
//!
//! The fleet is stored as one JSON array per entity type:
//!
//! ```text
//! transmission-transmitters     [Transmitter, ...]
//! transmission-channels         [TransmissionChannel, ...]
//! transmission-alerts           [TransmissionAlert, ...]
//! transmission-backup-systems   [BackupSystem, ...]
//! transmission-audit-log        [AuditLogEntry, ...]
//! transmission-commands         [RemoteCommand, ...]
//! broadcast-channels            [BroadcastChannel, ...]
//! broadcast-black-screens       [BlackScreenDetection, ...]
//! broadcast-errors              [BroadcastError, ...]
//! broadcast-notifications       [Notification, ...]
//! broadcast-stream-sessions     [StreamSession, ...]
//! ```
//!
//! A key that was never written decodes as an empty collection. A key that
//! holds something other than the expected array is an error; it is never
//! silently replaced by defaults.

use std::fmt;

use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};

use crate::fleet::FleetSnapshot;

use super::backend::StateBackend;
use super::error::{StorageError, StorageResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKey {
    Transmitters,
    Channels,
    Alerts,
    BackupSystems,
    AuditLog,
    Commands,
    BroadcastChannels,
    BlackScreens,
    BroadcastErrors,
    Notifications,
    StreamSessions,
}

impl StateKey {
    pub const ALL: [StateKey; 11] = [
        StateKey::Transmitters,
        StateKey::Channels,
        StateKey::Alerts,
        StateKey::BackupSystems,
        StateKey::AuditLog,
        StateKey::Commands,
        StateKey::BroadcastChannels,
        StateKey::BlackScreens,
        StateKey::BroadcastErrors,
        StateKey::Notifications,
        StateKey::StreamSessions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StateKey::Transmitters => "transmission-transmitters",
            StateKey::Channels => "transmission-channels",
            StateKey::Alerts => "transmission-alerts",
            StateKey::BackupSystems => "transmission-backup-systems",
            StateKey::AuditLog => "transmission-audit-log",
            StateKey::Commands => "transmission-commands",
            StateKey::BroadcastChannels => "broadcast-channels",
            StateKey::BlackScreens => "broadcast-black-screens",
            StateKey::BroadcastErrors => "broadcast-errors",
            StateKey::Notifications => "broadcast-notifications",
            StateKey::StreamSessions => "broadcast-stream-sessions",
        }
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn to_json<T: Serialize>(key: StateKey, records: &[T]) -> StorageResult<String> {
    serde_json::to_string(records).map_err(|e| StorageError::SerializationError {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn from_json<T: DeserializeOwned>(key: StateKey, json: &str) -> StorageResult<Vec<T>> {
    serde_json::from_str(json).map_err(|e| StorageError::SerializationError {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Encode the collection stored under `key`
pub fn encode(snapshot: &FleetSnapshot, key: StateKey) -> StorageResult<String> {
    match key {
        StateKey::Transmitters => to_json(key, &snapshot.transmitters),
        StateKey::Channels => to_json(key, &snapshot.channels),
        StateKey::Alerts => to_json(key, &snapshot.alerts),
        StateKey::BackupSystems => to_json(key, &snapshot.backup_systems),
        StateKey::AuditLog => to_json(key, &snapshot.audit_log),
        StateKey::Commands => to_json(key, &snapshot.commands),
        StateKey::BroadcastChannels => to_json(key, &snapshot.broadcast_channels),
        StateKey::BlackScreens => to_json(key, &snapshot.black_screens),
        StateKey::BroadcastErrors => to_json(key, &snapshot.broadcast_errors),
        StateKey::Notifications => to_json(key, &snapshot.notifications),
        StateKey::StreamSessions => to_json(key, &snapshot.stream_sessions),
    }
}

/// Decode a stored document into the matching collection of `snapshot`
pub fn decode_into(snapshot: &mut FleetSnapshot, key: StateKey, json: &str) -> StorageResult<()> {
    match key {
        StateKey::Transmitters => snapshot.transmitters = from_json(key, json)?,
        StateKey::Channels => snapshot.channels = from_json(key, json)?,
        StateKey::Alerts => snapshot.alerts = from_json(key, json)?,
        StateKey::BackupSystems => snapshot.backup_systems = from_json(key, json)?,
        StateKey::AuditLog => snapshot.audit_log = from_json(key, json)?,
        StateKey::Commands => snapshot.commands = from_json(key, json)?,
        StateKey::BroadcastChannels => snapshot.broadcast_channels = from_json(key, json)?,
        StateKey::BlackScreens => snapshot.black_screens = from_json(key, json)?,
        StateKey::BroadcastErrors => snapshot.broadcast_errors = from_json(key, json)?,
        StateKey::Notifications => snapshot.notifications = from_json(key, json)?,
        StateKey::StreamSessions => snapshot.stream_sessions = from_json(key, json)?,
    }
    Ok(())
}

/// Read every key from a backend
///
/// Returns `None` when the store holds nothing at all, so callers can tell a
/// fresh store from one whose collections are merely empty.
#[instrument(skip_all)]
pub async fn load_snapshot(backend: &dyn StateBackend) -> StorageResult<Option<FleetSnapshot>> {
    let mut snapshot = FleetSnapshot::default();
    let mut found = 0;

    for key in StateKey::ALL {
        if let Some(json) = backend.load(key).await? {
            decode_into(&mut snapshot, key, &json)?;
            found += 1;
        }
    }

    debug!("loaded {found} of {} keys", StateKey::ALL.len());
    Ok((found > 0).then_some(snapshot))
}

/// Write the given keys of a snapshot to a backend
#[instrument(skip(backend, snapshot))]
pub async fn save_keys(
    backend: &dyn StateBackend,
    snapshot: &FleetSnapshot,
    keys: &[StateKey],
) -> StorageResult<()> {
    for key in keys {
        let json = encode(snapshot, *key)?;
        backend.save(*key, json).await?;
    }
    Ok(())
}
