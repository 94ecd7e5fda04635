//! Black-screen classification and probing

use rand::Rng;

use crate::{broadcast::BroadcastChannel, model::AlertSeverity};

/// Severity for a black screen of the given length
///
/// `> 30s` critical, `> 15s` high, `> 5s` medium, anything shorter low.
pub fn black_screen_severity(duration_secs: u32) -> AlertSeverity {
    match duration_secs {
        d if d > 30 => AlertSeverity::Critical,
        d if d > 15 => AlertSeverity::High,
        d if d > 5 => AlertSeverity::Medium,
        _ => AlertSeverity::Low,
    }
}

/// Source of black-screen observations for a live channel
///
/// Returns the length in seconds of a black screen seen since the last
/// probe, or `None` if the picture was fine.
pub trait BlackScreenProbe: Send + Sync {
    fn probe(&self, channel: &BroadcastChannel) -> Option<u32>;
}

/// Simulated probe: fires with a fixed probability, duration uniform in
/// `min_duration..=max_duration`
#[derive(Debug, Clone)]
pub struct RandomProbe {
    probability: f64,
    min_duration: u32,
    max_duration: u32,
}

impl RandomProbe {
    pub fn new(probability: f64, min_duration: u32, max_duration: u32) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            min_duration: min_duration.min(max_duration),
            max_duration,
        }
    }
}

impl Default for RandomProbe {
    fn default() -> Self {
        Self::new(0.05, 1, 30)
    }
}

impl BlackScreenProbe for RandomProbe {
    fn probe(&self, _channel: &BroadcastChannel) -> Option<u32> {
        let mut rng = rand::thread_rng();
        if !rng.gen_bool(self.probability) {
            return None;
        }
        Some(rng.gen_range(self.min_duration..=self.max_duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> BroadcastChannel {
        BroadcastChannel {
            id: "ch-1".to_string(),
            name: "Channel One".to_string(),
            is_live: true,
            signal_quality: 98.0,
            permitted_roles: vec![],
        }
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(black_screen_severity(3), AlertSeverity::Low);
        assert_eq!(black_screen_severity(5), AlertSeverity::Low);
        assert_eq!(black_screen_severity(6), AlertSeverity::Medium);
        assert_eq!(black_screen_severity(15), AlertSeverity::Medium);
        assert_eq!(black_screen_severity(16), AlertSeverity::High);
        assert_eq!(black_screen_severity(30), AlertSeverity::High);
        assert_eq!(black_screen_severity(31), AlertSeverity::Critical);
    }

    #[test]
    fn test_random_probe_never_fires_at_zero_probability() {
        let probe = RandomProbe::new(0.0, 1, 30);
        for _ in 0..1000 {
            assert_eq!(probe.probe(&channel()), None);
        }
    }

    #[test]
    fn test_random_probe_durations_within_range() {
        let probe = RandomProbe::new(1.0, 1, 30);
        for _ in 0..1000 {
            let duration = probe.probe(&channel()).unwrap();
            assert!((1..=30).contains(&duration));
        }
    }
}
