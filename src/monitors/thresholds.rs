//! Threshold rules evaluated on every transmitter metric update
//!
//! ```text
//! temperature > 70   → overheating   (critical above 80, high otherwise)
//! signal      < 50   → signal_loss   (critical below 20, high otherwise)
//! ```

use serde::Deserialize;

use crate::model::{AlertSeverity, AlertType, NewAlert, Transmitter};

/// Limits for the built-in alert rules
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_overheat")]
    pub overheat: f64,
    #[serde(default = "default_overheat_critical")]
    pub overheat_critical: f64,
    #[serde(default = "default_signal_loss")]
    pub signal_loss: f64,
    #[serde(default = "default_signal_loss_critical")]
    pub signal_loss_critical: f64,
}

fn default_overheat() -> f64 {
    70.0
}

fn default_overheat_critical() -> f64 {
    80.0
}

fn default_signal_loss() -> f64 {
    50.0
}

fn default_signal_loss_critical() -> f64 {
    20.0
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            overheat: default_overheat(),
            overheat_critical: default_overheat_critical(),
            signal_loss: default_signal_loss(),
            signal_loss_critical: default_signal_loss_critical(),
        }
    }
}

impl AlertThresholds {
    /// Evaluate a transmitter's current readings
    ///
    /// Returns one alert request per violated rule. Whether a request opens
    /// a new alert or refreshes an open one is decided by the fleet state.
    pub fn evaluate(&self, transmitter: &Transmitter) -> Vec<NewAlert> {
        let mut alerts = Vec::new();

        if let Some(severity) = self.overheating(transmitter.temperature) {
            alerts.push(NewAlert::for_transmitter(
                &transmitter.id,
                AlertType::Overheating,
                severity,
                format!(
                    "{} temperature is {:.1}°C (limit {:.0}°C)",
                    transmitter.name, transmitter.temperature, self.overheat
                ),
            ));
        }

        if let Some(severity) = self.signal_loss(transmitter.signal_quality) {
            alerts.push(NewAlert::for_transmitter(
                &transmitter.id,
                AlertType::SignalLoss,
                severity,
                format!(
                    "{} signal quality dropped to {:.1}% (limit {:.0}%)",
                    transmitter.name, transmitter.signal_quality, self.signal_loss
                ),
            ));
        }

        alerts
    }

    pub fn overheating(&self, temperature: f64) -> Option<AlertSeverity> {
        if temperature > self.overheat_critical {
            Some(AlertSeverity::Critical)
        } else if temperature > self.overheat {
            Some(AlertSeverity::High)
        } else {
            None
        }
    }

    pub fn signal_loss(&self, signal_quality: f64) -> Option<AlertSeverity> {
        if signal_quality < self.signal_loss_critical {
            Some(AlertSeverity::Critical)
        } else if signal_quality < self.signal_loss {
            Some(AlertSeverity::High)
        } else {
            None
        }
    }
}
