//! Pure evaluation logic shared by the fleet state and the actors

pub mod black_screen;
pub mod health;
pub mod thresholds;

pub use black_screen::{BlackScreenProbe, RandomProbe, black_screen_severity};
pub use health::{HealthInputs, calculate_health_score};
pub use thresholds::AlertThresholds;
