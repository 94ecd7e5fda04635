//! Broadcast-side entities: live channels, black-screen detections,
//! broadcast errors, operator notifications and stream sessions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::AlertSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Director,
    Producer,
    Engineer,
    Technician,
    Operator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastChannel {
    pub id: String,
    pub name: String,
    pub is_live: bool,
    pub signal_quality: f64,

    /// Roles that receive notifications raised for this channel
    #[serde(default)]
    pub permitted_roles: Vec<UserRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlackScreenDetection {
    pub id: String,
    pub channel_id: String,
    pub detected_at: DateTime<Utc>,
    pub duration_secs: u32,
    pub severity: AlertSeverity,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastErrorType {
    SignalLoss,
    EncoderFailure,
    BlackScreen,
    AudioLoss,
}

impl fmt::Display for BroadcastErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BroadcastErrorType::SignalLoss => "signal_loss",
            BroadcastErrorType::EncoderFailure => "encoder_failure",
            BroadcastErrorType::BlackScreen => "black_screen",
            BroadcastErrorType::AudioLoss => "audio_loss",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastError {
    pub id: String,
    pub channel_id: String,
    #[serde(rename = "type")]
    pub error_type: BroadcastErrorType,
    pub severity: AlertSeverity,
    pub message: String,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
}

impl BroadcastError {
    pub(crate) fn is_open_signal_loss(&self, channel_id: &str) -> bool {
        !self.resolved
            && self.error_type == BroadcastErrorType::SignalLoss
            && self.channel_id == channel_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub target_roles: Vec<UserRole>,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn is_for(&self, role: UserRole) -> bool {
        self.target_roles.contains(&role)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSession {
    pub id: String,
    pub channel_id: String,
    pub is_live: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}
