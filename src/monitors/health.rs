//! Transmitter health scoring
//!
//! The score starts at 100 and loses points for hot cabinets, weak signal,
//! poor efficiency and open high/critical alerts:
//!
//! ```text
//! temperature > 60   -10      signal < 80   -15      efficiency < 70   -10
//! temperature > 70   -20      signal < 50   -30
//! unresolved critical alert   -30
//! unresolved high alert       -15
//! ```
//!
//! The bands of one metric stack (a 75°C cabinet loses 30 points). The result
//! is clamped to `0..=100`.

use crate::model::{AlertSeverity, TransmissionAlert, Transmitter};

const MAX_SCORE: i32 = 100;

/// The telemetry the score is derived from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthInputs {
    pub temperature: f64,
    pub signal_quality: f64,
    pub efficiency: f64,
}

impl From<&Transmitter> for HealthInputs {
    fn from(transmitter: &Transmitter) -> Self {
        Self {
            temperature: transmitter.temperature,
            signal_quality: transmitter.signal_quality,
            efficiency: transmitter.efficiency,
        }
    }
}

/// Compute the 0-100 health score for a transmitter
///
/// `alerts` may contain resolved alerts; only unresolved ones are counted.
/// Comparisons against NaN are false, so a NaN reading never costs points
/// but also never adds any.
pub fn calculate_health_score<'a>(
    inputs: &HealthInputs,
    alerts: impl IntoIterator<Item = &'a TransmissionAlert>,
) -> u8 {
    let mut score = MAX_SCORE;

    if inputs.temperature > 60.0 {
        score -= 10;
    }
    if inputs.temperature > 70.0 {
        score -= 20;
    }

    if inputs.signal_quality < 80.0 {
        score -= 15;
    }
    if inputs.signal_quality < 50.0 {
        score -= 30;
    }

    if inputs.efficiency < 70.0 {
        score -= 10;
    }

    let (mut has_critical, mut has_high) = (false, false);
    for alert in alerts.into_iter().filter(|a| a.is_active()) {
        match alert.severity {
            AlertSeverity::Critical => has_critical = true,
            AlertSeverity::High => has_high = true,
            _ => {}
        }
    }

    if has_critical {
        score -= 30;
    }
    if has_high {
        score -= 15;
    }

    score.clamp(0, MAX_SCORE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AlertType;
    use chrono::Utc;

    fn healthy() -> HealthInputs {
        HealthInputs {
            temperature: 45.0,
            signal_quality: 95.0,
            efficiency: 85.0,
        }
    }

    fn alert(severity: AlertSeverity, resolved: bool) -> TransmissionAlert {
        let now = Utc::now();
        TransmissionAlert {
            id: "a1".to_string(),
            alert_type: AlertType::Overheating,
            severity,
            message: "test".to_string(),
            transmitter_id: Some("tx-1".to_string()),
            channel_id: None,
            antenna_id: None,
            detected_at: now,
            resolved,
            resolved_at: resolved.then_some(now),
            resolved_by: None,
            action_taken: None,
            occurrences: 1,
            last_seen: now,
        }
    }

    #[test]
    fn test_healthy_transmitter_scores_full() {
        assert_eq!(calculate_health_score(&healthy(), &[]), 100);
    }

    #[test]
    fn test_temperature_bands_stack() {
        let mut inputs = healthy();
        inputs.temperature = 65.0;
        assert_eq!(calculate_health_score(&inputs, &[]), 90);

        inputs.temperature = 75.0;
        assert_eq!(calculate_health_score(&inputs, &[]), 70);
    }

    #[test]
    fn test_signal_bands_stack() {
        let mut inputs = healthy();
        inputs.signal_quality = 79.0;
        assert_eq!(calculate_health_score(&inputs, &[]), 85);

        inputs.signal_quality = 40.0;
        assert_eq!(calculate_health_score(&inputs, &[]), 55);
    }

    #[test]
    fn test_low_efficiency_penalty() {
        let mut inputs = healthy();
        inputs.efficiency = 60.0;
        assert_eq!(calculate_health_score(&inputs, &[]), 90);
    }

    #[test]
    fn test_unresolved_alerts_penalized_once_per_severity() {
        let alerts = vec![
            alert(AlertSeverity::Critical, false),
            alert(AlertSeverity::Critical, false),
            alert(AlertSeverity::High, false),
            alert(AlertSeverity::Medium, false),
        ];
        assert_eq!(calculate_health_score(&healthy(), &alerts), 55);
    }

    #[test]
    fn test_resolved_alerts_ignored() {
        let alerts = vec![alert(AlertSeverity::Critical, true)];
        assert_eq!(calculate_health_score(&healthy(), &alerts), 100);
    }

    #[test]
    fn test_worst_case_clamps_to_zero() {
        let inputs = HealthInputs {
            temperature: 500.0,
            signal_quality: -20.0,
            efficiency: 0.0,
        };
        let alerts = vec![
            alert(AlertSeverity::Critical, false),
            alert(AlertSeverity::High, false),
        ];
        assert_eq!(calculate_health_score(&inputs, &alerts), 0);
    }

    #[test]
    fn test_nan_readings_do_not_panic() {
        let inputs = HealthInputs {
            temperature: f64::NAN,
            signal_quality: f64::NAN,
            efficiency: f64::NAN,
        };
        assert_eq!(calculate_health_score(&inputs, &[]), 100);
    }
}
