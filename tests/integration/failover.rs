//! Backup switching, manual and automatic

use assert_matches::assert_matches;
use transmission_monitoring::{
    actors::failover::{AUTO_FAILOVER_ACTOR, FailoverHandle},
    error::FleetError,
    model::{ChannelStatus, NewChannel, TransmitterStatus},
};

use crate::helpers::*;

fn channel(id: &str, transmitter_id: &str) -> NewChannel {
    NewChannel {
        id: Some(id.to_string()),
        name: format!("Channel {id}"),
        transmitter_id: transmitter_id.to_string(),
        frequency: 602.0,
        bitrate: 24.0,
        signal_quality: 95.0,
        status: ChannelStatus::Active,
    }
}

#[tokio::test]
async fn test_emergency_shutdown_triggers_automatic_failover() {
    let fleet = fleet_with(&["tx-1", "tx-2"]).await;
    fleet.add_backup_system(backup_pair("tx-1", "tx-2", true)).await.unwrap();
    let failover = FailoverHandle::spawn(fleet.clone());

    let alert = fleet
        .emergency_shutdown("tx-1", "arc detected in output stage", "operator")
        .await
        .unwrap();
    assert!(alert.message.contains("arc detected"));

    let switched = eventually(|| async {
        fleet
            .backup_for_primary("tx-1")
            .await
            .unwrap()
            .is_some_and(|b| b.is_active)
    })
    .await;
    assert!(switched);

    let primary = fleet.transmitter("tx-1").await.unwrap().unwrap();
    let backup = fleet.transmitter("tx-2").await.unwrap().unwrap();
    assert_eq!(primary.status, TransmitterStatus::Backup);
    assert_eq!(backup.status, TransmitterStatus::Online);

    let snapshot = fleet.snapshot().await.unwrap();
    let entry = snapshot
        .audit_log
        .iter()
        .find(|e| e.action == "backup_activated")
        .unwrap();
    assert_eq!(entry.actor, AUTO_FAILOVER_ACTOR);
    assert_eq!(entry.transmitter_id.as_deref(), Some("tx-1"));
    assert!(snapshot.audit_log.iter().any(|e| e.action == "emergency_shutdown"));

    assert!(eventually(|| async { failover.pending().await.unwrap().is_empty() }).await);

    failover.shutdown().await.unwrap();
    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_manual_pairs_are_not_switched_automatically() {
    let fleet = fleet_with(&["tx-1", "tx-2"]).await;
    fleet.add_backup_system(backup_pair("tx-1", "tx-2", false)).await.unwrap();
    let failover = FailoverHandle::spawn(fleet.clone());

    fleet
        .emergency_shutdown("tx-1", "cooling failure", "operator")
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(failover.pending().await.unwrap().is_empty());

    let backup = fleet.backup_for_primary("tx-1").await.unwrap().unwrap();
    assert!(!backup.is_active);
    assert_eq!(
        fleet.transmitter("tx-1").await.unwrap().unwrap().status,
        TransmitterStatus::Offline
    );

    failover.shutdown().await.unwrap();
    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_emergency_backup_for_channel() {
    let fleet = fleet_with(&["tx-1", "tx-2"]).await;
    fleet.add_backup_system(backup_pair("tx-1", "tx-2", false)).await.unwrap();
    fleet.add_channel(channel("ch-1", "tx-1")).await.unwrap();

    let record = fleet
        .activate_emergency_backup("ch-1", "director")
        .await
        .unwrap();
    assert_eq!(record.backup_system_id, "bs-tx-1");
    assert_eq!(record.primary_transmitter_id, "tx-1");
    assert_eq!(record.backup_transmitter_id, "tx-2");
    assert_eq!(record.switch_count, 1);

    let system = fleet.backup_for_primary("tx-1").await.unwrap().unwrap();
    assert!(system.is_active);
    assert_eq!(system.switch_count, 1);
    assert_eq!(system.last_switch, Some(record.switched_at));

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_emergency_backup_without_backup_system() {
    let fleet = fleet_with(&["tx-1"]).await;
    fleet.add_channel(channel("ch-1", "tx-1")).await.unwrap();

    let err = fleet
        .activate_emergency_backup("ch-1", "director")
        .await
        .unwrap_err();
    assert_matches!(
        err.downcast_ref::<FleetError>(),
        Some(FleetError::NoBackupConfigured { transmitter_id }) if transmitter_id == "tx-1"
    );

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_active_backup_is_refused() {
    let fleet = fleet_with(&["tx-1", "tx-2", "tx-3"]).await;
    fleet.add_backup_system(backup_pair("tx-1", "tx-2", false)).await.unwrap();
    let mut second = backup_pair("tx-1", "tx-3", false);
    second.id = Some("bs-tx-1-spare".to_string());
    fleet.add_backup_system(second).await.unwrap();

    fleet.activate_backup("bs-tx-1", "operator").await.unwrap();
    let err = fleet
        .activate_backup("bs-tx-1-spare", "operator")
        .await
        .unwrap_err();
    assert_matches!(err.downcast_ref::<FleetError>(), Some(FleetError::Conflict(_)));

    // handing traffic back frees the primary for the other pair
    fleet.deactivate_backup("bs-tx-1", "operator").await.unwrap();
    assert_eq!(
        fleet.transmitter("tx-2").await.unwrap().unwrap().status,
        TransmitterStatus::Standby
    );
    fleet.activate_backup("bs-tx-1-spare", "operator").await.unwrap();

    fleet.shutdown().await.unwrap();
}
