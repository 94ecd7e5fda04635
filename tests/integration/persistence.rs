//! State survives a restart through the persistence actor

use std::time::Duration;

use assert_matches::assert_matches;
use tokio::sync::broadcast;
use transmission_monitoring::{
    actors::{fleet::FleetHandle, persistence::PersistenceHandle},
    fleet::{FleetSettings, FleetSnapshot, FleetState, commands::INTERRUPTED_BY_RESTART},
    model::{AlertSeverity, AlertType, CommandStatus, CommandType, NewAlert},
    storage::{
        StateBackend, StateKey, StorageError, file::FileBackend, schema,
    },
};

use crate::helpers::*;

/// Populate a fleet with a little of everything worth persisting
async fn populate(fleet: &FleetHandle) {
    for id in ["tx-1", "tx-2"] {
        fleet.add_transmitter(new_transmitter(id)).await.unwrap();
    }
    fleet.add_backup_system(backup_pair("tx-1", "tx-2", false)).await.unwrap();
    let alert = fleet
        .create_alert(NewAlert::for_transmitter(
            "tx-1",
            AlertType::PowerFailure,
            AlertSeverity::Critical,
            "mains lost",
        ))
        .await
        .unwrap();
    fleet.activate_backup("bs-tx-1", "operator").await.unwrap();
    fleet
        .resolve_alert(&alert.id, "engineer", Some("generator started".to_string()))
        .await
        .unwrap();
}

fn assert_same_records(restored: &FleetSnapshot, expected: &FleetSnapshot) {
    let ids = |s: &FleetSnapshot| s.transmitters.iter().map(|t| t.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(restored), ids(expected));
    for (a, b) in restored.transmitters.iter().zip(&expected.transmitters) {
        assert_eq!(a.status, b.status);
        assert_eq!(a.health_score, b.health_score);
        assert_eq!(a.alerts, b.alerts);
    }
    assert_eq!(restored.alerts, expected.alerts);
    assert_eq!(restored.backup_systems, expected.backup_systems);
    assert_eq!(restored.audit_log, expected.audit_log);
}

async fn restart_roundtrip(backend: Box<dyn StateBackend>, reopen: impl AsyncFnOnce() -> Box<dyn StateBackend>) {
    let fleet = spawn_fleet(FleetSettings::default());
    let persistence = PersistenceHandle::spawn(fleet.clone(), backend, Duration::from_secs(60));

    populate(&fleet).await;
    let expected = fleet.snapshot().await.unwrap();
    persistence.shutdown().await.unwrap();
    fleet.shutdown().await.unwrap();

    let backend = reopen().await;
    let restored = schema::load_snapshot(backend.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_same_records(&restored, &expected);

    // the restored records drive a working fleet again
    let (event_tx, _) = broadcast::channel(16);
    let fleet = FleetHandle::spawn(
        FleetState::from_snapshot(FleetSettings::default(), restored),
        event_tx,
    );
    let system = fleet.backup_for_primary("tx-1").await.unwrap().unwrap();
    assert!(system.is_active);
    assert_eq!(system.switch_count, 1);
    assert!(fleet.active_alerts().await.unwrap().is_empty());
    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_file_backend_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    let backend = FileBackend::new(&path).await.unwrap();
    restart_roundtrip(Box::new(backend), async move || {
        Box::new(FileBackend::new(&path).await.unwrap()) as Box<dyn StateBackend>
    })
    .await;

    assert!(dir.path().join("transmission-alerts.json").exists());
}

#[tokio::test]
async fn test_commands_in_flight_fail_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    let fleet = spawn_fleet(FleetSettings::default());
    let persistence = PersistenceHandle::spawn(
        fleet.clone(),
        Box::new(FileBackend::new(&path).await.unwrap()),
        Duration::from_secs(60),
    );
    fleet.add_transmitter(new_transmitter("tx-1")).await.unwrap();
    let queued = fleet
        .enqueue_command("tx-1", CommandType::PowerOff, "operator")
        .await
        .unwrap();
    persistence.shutdown().await.unwrap();
    fleet.shutdown().await.unwrap();

    let backend = FileBackend::new(&path).await.unwrap();
    let stored = schema::load_snapshot(&backend).await.unwrap().unwrap();
    assert_eq!(stored.commands[0].status, CommandStatus::Pending);

    let fleet = FleetHandle::spawn(
        FleetState::from_snapshot(FleetSettings::default(), stored),
        broadcast::channel(64).0,
    );
    let persistence = PersistenceHandle::spawn(fleet.clone(), Box::new(backend), Duration::from_secs(60));

    let command = fleet.command(&queued.id).await.unwrap().unwrap();
    assert_eq!(command.status, CommandStatus::Failed);
    assert_eq!(command.error.as_deref(), Some(INTERRUPTED_BY_RESTART));

    // the failure goes out with the next change and is written back
    fleet.add_transmitter(new_transmitter("tx-2")).await.unwrap();
    persistence.flush().await.unwrap();
    persistence.shutdown().await.unwrap();
    fleet.shutdown().await.unwrap();

    let backend = FileBackend::new(&path).await.unwrap();
    let stored = schema::load_snapshot(&backend).await.unwrap().unwrap();
    assert_eq!(stored.commands[0].status, CommandStatus::Failed);
    assert_eq!(stored.commands[0].error.as_deref(), Some(INTERRUPTED_BY_RESTART));
}

#[tokio::test]
async fn test_fresh_store_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path()).await.unwrap();

    assert_eq!(schema::load_snapshot(&backend).await.unwrap(), None);
}

#[tokio::test]
async fn test_corrupted_document_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::new(dir.path()).await.unwrap();
    backend
        .save(StateKey::Transmitters, "[]".to_string())
        .await
        .unwrap();
    tokio::fs::write(dir.path().join("transmission-alerts.json"), "{\"not\": \"a list\"}")
        .await
        .unwrap();

    let err = schema::load_snapshot(&backend).await.unwrap_err();
    assert_matches!(
        err,
        StorageError::SerializationError { ref key, .. } if key == "transmission-alerts"
    );
}

#[cfg(feature = "storage-sqlite")]
#[tokio::test]
async fn test_sqlite_backend_restart() {
    use transmission_monitoring::storage::sqlite::SqliteBackend;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transmission.db");

    let backend = SqliteBackend::new(&path).await.unwrap();
    restart_roundtrip(Box::new(backend), async move || {
        Box::new(SqliteBackend::new(&path).await.unwrap()) as Box<dyn StateBackend>
    })
    .await;
}
