//! End-to-end tests for the sampling pipeline
//!
//! telemetry endpoint → SamplerActor → FleetActor → NotifierActor → webhook

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use transmission_monitoring::{
    actors::{
        black_screen::BlackScreenHandle, notifier::NotifierHandle, sampler::SamplerHandle,
    },
    aggregator::{AlertSource, aggregate_alerts, system_health},
    alerts::AlertManager,
    broadcast::{BroadcastChannel, UserRole},
    config::{Alert, NotifyTarget, Webhook},
    model::{AlertSeverity, AlertType},
    monitors::BlackScreenProbe,
    sources::{HttpSource, TelemetryEndpoint},
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

fn endpoint(server: &MockServer) -> TelemetryEndpoint {
    let url = url::Url::parse(&server.uri()).unwrap();
    TelemetryEndpoint {
        ip: url.host_str().unwrap().parse().unwrap(),
        port: url.port().unwrap(),
        token: None,
    }
}

#[tokio::test]
async fn test_overheating_transmitter_end_to_end() {
    let agent = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/telemetry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "powerOutput": 8.5,
            "signalQuality": 95.0,
            "temperature": 95.0
        })))
        .mount(&agent)
        .await;

    let webhook = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(serde_json::json!({
            "alert": { "type": "overheating", "severity": "critical" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&webhook)
        .await;

    let fleet = fleet_with(&["tx-1"]).await;
    let before = fleet.transmitter("tx-1").await.unwrap().unwrap().health_score;

    let notifier = NotifierHandle::spawn(
        AlertManager::new(vec![NotifyTarget {
            min_severity: AlertSeverity::High,
            alert: Alert::Webhook(Webhook {
                url: format!("{}/alerts", webhook.uri()),
            }),
        }]),
        fleet.subscribe(),
    );

    let source = HttpSource::new(
        HashMap::from([("tx-1".to_string(), endpoint(&agent))]),
        Duration::from_secs(5),
    )
    .unwrap();
    let sampler = SamplerHandle::spawn(fleet.clone(), Arc::new(source), Duration::from_secs(60));

    let report = sampler.sample_now().await.unwrap();
    assert_eq!(report.sampled, 1);

    let tx = fleet.transmitter("tx-1").await.unwrap().unwrap();
    assert_eq!(tx.temperature, 95.0);
    assert!(before - tx.health_score >= 30);

    let active = fleet.active_alerts().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].alert_type, AlertType::Overheating);
    assert_eq!(active[0].severity, AlertSeverity::Critical);
    assert_eq!(active[0].transmitter_id.as_deref(), Some("tx-1"));

    assert!(eventually(|| async { notifier.status().await.unwrap().sent == 1 }).await);

    // a second hot sample refreshes the open alert instead of opening another
    sampler.sample_now().await.unwrap();
    let active = fleet.active_alerts().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].occurrences, 2);

    sampler.shutdown().await.unwrap();
    notifier.shutdown().await.unwrap();
    fleet.shutdown().await.unwrap();
}

struct AlwaysBlack(u32);

impl BlackScreenProbe for AlwaysBlack {
    fn probe(&self, _channel: &BroadcastChannel) -> Option<u32> {
        Some(self.0)
    }
}

#[tokio::test]
async fn test_black_screens_reach_the_aggregated_view() {
    let fleet = fleet_with(&["tx-1"]).await;
    fleet
        .add_broadcast_channel(BroadcastChannel {
            id: "news".to_string(),
            name: "News 24".to_string(),
            is_live: true,
            signal_quality: 97.0,
            permitted_roles: vec![UserRole::Director, UserRole::Operator],
        })
        .await
        .unwrap();

    let scanner = BlackScreenHandle::spawn(
        fleet.clone(),
        Arc::new(AlwaysBlack(45)),
        Duration::from_secs(60),
    );
    let detections = scanner.scan_now().await.unwrap();
    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].severity, AlertSeverity::Critical);

    fleet.update_broadcast_signal("news", 40.0).await.unwrap();
    fleet.set_channel_live("news", false).await.unwrap();

    let snapshot = fleet.snapshot().await.unwrap();
    let alerts = aggregate_alerts(&snapshot);
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0].source, AlertSource::Streaming);
    assert_eq!(alerts[1].source, AlertSource::Broadcast);
    assert_eq!(system_health(&snapshot), 50.0);

    assert_eq!(snapshot.notifications.len(), 1);
    assert!(snapshot.notifications[0].is_for(UserRole::Operator));
    assert!(!snapshot.notifications[0].is_for(UserRole::Engineer));

    scanner.shutdown().await.unwrap();
    fleet.shutdown().await.unwrap();
}
