//! Error types for fleet operations

use std::fmt;

/// Result type alias for fleet operations
pub type FleetResult<T> = Result<T, FleetError>;

/// Kind of record a lookup failed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Transmitter,
    Channel,
    Alert,
    BackupSystem,
    Command,
    BroadcastChannel,
    BlackScreen,
    StreamSession,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Transmitter => "transmitter",
            EntityKind::Channel => "transmission channel",
            EntityKind::Alert => "alert",
            EntityKind::BackupSystem => "backup system",
            EntityKind::Command => "remote command",
            EntityKind::BroadcastChannel => "broadcast channel",
            EntityKind::BlackScreen => "black screen detection",
            EntityKind::StreamSession => "stream session",
        };
        write!(f, "{s}")
    }
}

/// Errors returned by fleet state operations
#[derive(Debug, Clone, PartialEq)]
pub enum FleetError {
    /// A referenced record does not exist
    NotFound { kind: EntityKind, id: String },

    /// A record with this id already exists
    AlreadyExists { kind: EntityKind, id: String },

    /// The operation conflicts with the current state
    Conflict(String),

    /// No backup system is configured for the transmitter
    NoBackupConfigured { transmitter_id: String },

    /// The request itself is malformed
    InvalidInput(String),
}

impl FleetError {
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        FleetError::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FleetError::NotFound { kind, id } => write!(f, "{kind} '{id}' not found"),
            FleetError::AlreadyExists { kind, id } => write!(f, "{kind} '{id}' already exists"),
            FleetError::Conflict(msg) => write!(f, "conflict: {msg}"),
            FleetError::NoBackupConfigured { transmitter_id } => {
                write!(f, "no backup system configured for transmitter '{transmitter_id}'")
            }
            FleetError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for FleetError {}
