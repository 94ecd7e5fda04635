//! Helper functions for integration tests

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;
use transmission_monitoring::{
    actors::fleet::FleetHandle,
    fleet::{FleetSettings, FleetState},
    model::{NewBackupSystem, NewTransmitter, TransmitterStatus},
};

pub fn new_transmitter(id: &str) -> NewTransmitter {
    NewTransmitter {
        id: Some(id.to_string()),
        name: format!("Transmitter {id}"),
        location: "Hilltop".to_string(),
        serial_number: format!("SN-{id}"),
        frequency: 602.0,
        modulation: "DVB-T2".to_string(),
        power_input: 10.0,
        power_output: 8.5,
        voltage: 400.0,
        current: 25.0,
        signal_quality: 95.0,
        temperature: 45.0,
        status: TransmitterStatus::Online,
        is_backup: false,
        backup_transmitter_id: None,
    }
}

pub fn backup_pair(primary: &str, backup: &str, auto_switch_enabled: bool) -> NewBackupSystem {
    NewBackupSystem {
        id: Some(format!("bs-{primary}")),
        name: format!("{primary} backup"),
        primary_transmitter_id: primary.to_string(),
        backup_transmitter_id: backup.to_string(),
        auto_switch_enabled,
        switch_delay: 0,
    }
}

pub fn spawn_fleet(settings: FleetSettings) -> FleetHandle {
    let (event_tx, _) = broadcast::channel(256);
    FleetHandle::spawn(FleetState::new(settings), event_tx)
}

pub async fn fleet_with(ids: &[&str]) -> FleetHandle {
    let fleet = spawn_fleet(FleetSettings::default());
    for id in ids {
        fleet.add_transmitter(new_transmitter(id)).await.unwrap();
    }
    fleet
}

/// Poll `check` until it holds or two seconds have passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
