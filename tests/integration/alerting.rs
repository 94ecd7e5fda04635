//! Alert lifecycle through the fleet actor

use assert_matches::assert_matches;
use transmission_monitoring::{
    actors::messages::FleetEvent,
    error::FleetError,
    fleet::FleetSettings,
    model::{AlertSeverity, AlertType, NewAlert},
};

use crate::helpers::*;

fn overheating(transmitter_id: &str, severity: AlertSeverity) -> NewAlert {
    NewAlert::for_transmitter(
        transmitter_id,
        AlertType::Overheating,
        severity,
        "cabinet temperature above limit",
    )
}

#[tokio::test]
async fn test_resolve_alert_restores_health() {
    let fleet = fleet_with(&["tx-1"]).await;
    let mut events = fleet.subscribe();

    let alert = fleet
        .create_alert(overheating("tx-1", AlertSeverity::Critical))
        .await
        .unwrap();
    assert_eq!(fleet.transmitter("tx-1").await.unwrap().unwrap().health_score, 70);

    let resolved = fleet
        .resolve_alert(&alert.id, "engineer", Some("replaced fan".to_string()))
        .await
        .unwrap();
    assert!(resolved.resolved);
    assert!(resolved.resolved_at.is_some());
    assert_eq!(resolved.resolved_by.as_deref(), Some("engineer"));
    assert_eq!(resolved.action_taken.as_deref(), Some("replaced fan"));
    assert!(fleet.active_alerts().await.unwrap().is_empty());

    let tx = fleet.transmitter("tx-1").await.unwrap().unwrap();
    assert_eq!(tx.health_score, 100);
    assert!(tx.alerts.contains(&alert.id));

    let mut saw_resolution = false;
    while let Ok(event) = events.try_recv() {
        if let FleetEvent::AlertResolved(a) = event {
            assert_eq!(a.id, alert.id);
            saw_resolution = true;
        }
    }
    assert!(saw_resolution);

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_resolving_twice_is_a_conflict() {
    let fleet = fleet_with(&["tx-1"]).await;
    let alert = fleet
        .create_alert(overheating("tx-1", AlertSeverity::High))
        .await
        .unwrap();

    let first = fleet.resolve_alert(&alert.id, "engineer", None).await.unwrap();
    let err = fleet
        .resolve_alert(&alert.id, "someone-else", None)
        .await
        .unwrap_err();
    assert_matches!(err.downcast_ref::<FleetError>(), Some(FleetError::Conflict(_)));

    // the first resolution is kept
    let snapshot = fleet.snapshot().await.unwrap();
    assert_eq!(snapshot.alerts[0].resolved_by, first.resolved_by);
    assert_eq!(snapshot.alerts[0].resolved_at, first.resolved_at);

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_alert_for_unknown_transmitter_is_rejected() {
    let fleet = fleet_with(&["tx-1"]).await;

    let err = fleet
        .create_alert(overheating("tx-9", AlertSeverity::High))
        .await
        .unwrap_err();
    assert_matches!(
        err.downcast_ref::<FleetError>(),
        Some(FleetError::NotFound { id, .. }) if id == "tx-9"
    );
    assert!(fleet.snapshot().await.unwrap().alerts.is_empty());

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_alerts_are_merged() {
    let fleet = fleet_with(&["tx-1"]).await;

    let first = fleet
        .create_alert(overheating("tx-1", AlertSeverity::High))
        .await
        .unwrap();
    let second = fleet
        .create_alert(overheating("tx-1", AlertSeverity::Critical))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.occurrences, 2);
    assert_eq!(second.severity, AlertSeverity::Critical);
    assert!(second.last_seen >= first.last_seen);
    assert_eq!(fleet.active_alerts().await.unwrap().len(), 1);

    // after resolution the same condition opens a new alert
    fleet.resolve_alert(&first.id, "engineer", None).await.unwrap();
    let third = fleet
        .create_alert(overheating("tx-1", AlertSeverity::High))
        .await
        .unwrap();
    assert_ne!(third.id, first.id);
    assert_eq!(third.occurrences, 1);

    fleet.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_duplicates_kept_without_dedup() {
    let fleet = spawn_fleet(FleetSettings {
        dedup_alerts: false,
        ..Default::default()
    });
    fleet.add_transmitter(new_transmitter("tx-1")).await.unwrap();

    fleet
        .create_alert(overheating("tx-1", AlertSeverity::High))
        .await
        .unwrap();
    fleet
        .create_alert(overheating("tx-1", AlertSeverity::High))
        .await
        .unwrap();

    assert_eq!(fleet.active_alerts().await.unwrap().len(), 2);
    assert_eq!(
        fleet.alerts_by_severity(AlertSeverity::High).await.unwrap().len(),
        2
    );

    fleet.shutdown().await.unwrap();
}
