use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::broadcast::Notification;
use crate::config::Discord;
use crate::model::{AlertSeverity, TransmissionAlert};

const RED: u32 = 15158332;
const ORANGE: u32 = 15105570;
const GREEN: u32 = 3066993;
const LIGHT_BLUE: u32 = 5793266;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    fn inline(name: &str, value: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            inline: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

pub fn severity_color(severity: AlertSeverity) -> u32 {
    match severity {
        AlertSeverity::Critical => RED,
        AlertSeverity::High => ORANGE,
        AlertSeverity::Medium | AlertSeverity::Low => LIGHT_BLUE,
    }
}

pub fn severity_emoji(severity: AlertSeverity) -> &'static str {
    match severity {
        AlertSeverity::Critical => "🔴",
        AlertSeverity::High => "🟠",
        AlertSeverity::Medium => "🟡",
        AlertSeverity::Low => "🟢",
    }
}

#[derive(Debug, Clone, Default)]
pub struct DiscordManager {
    client: Client,
}

impl DiscordManager {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    pub fn build_alert_embed(&self, alert: &TransmissionAlert) -> Embed {
        let (title, color) = if alert.resolved {
            (format!("✅ Resolved: {}", alert.alert_type), GREEN)
        } else {
            (
                format!(
                    "{} {} alert: {}",
                    severity_emoji(alert.severity),
                    alert.severity,
                    alert.alert_type
                ),
                severity_color(alert.severity),
            )
        };

        let mut fields = vec![
            EmbedField::inline("Type", alert.alert_type),
            EmbedField::inline("Severity", alert.severity),
        ];
        if let Some(transmitter_id) = &alert.transmitter_id {
            fields.push(EmbedField::inline("Transmitter", transmitter_id));
        }
        if let Some(channel_id) = &alert.channel_id {
            fields.push(EmbedField::inline("Channel", channel_id));
        }
        if alert.occurrences > 1 {
            fields.push(EmbedField::inline("Occurrences", alert.occurrences));
        }
        if let Some(action) = &alert.action_taken {
            fields.push(EmbedField {
                name: "Action taken".to_string(),
                value: action.clone(),
                inline: false,
            });
        }

        let timestamp = alert.resolved_at.unwrap_or(alert.detected_at);

        Embed {
            title: Some(title),
            description: Some(alert.message.clone()),
            color: Some(color),
            fields,
            footer: Some(EmbedFooter {
                text: format!("Alert {}", alert.id),
            }),
            timestamp: Some(timestamp.to_rfc3339()),
        }
    }

    pub fn build_notification_embed(&self, notification: &Notification) -> Embed {
        let roles = notification
            .target_roles
            .iter()
            .map(|r| format!("{r:?}").to_lowercase())
            .collect::<Vec<_>>()
            .join(", ");

        Embed {
            title: Some(format!(
                "{} {}",
                severity_emoji(notification.severity),
                notification.title
            )),
            description: Some(notification.message.clone()),
            color: Some(severity_color(notification.severity)),
            fields: vec![EmbedField::inline("Roles", roles)],
            footer: None,
            timestamp: Some(notification.created_at.to_rfc3339()),
        }
    }

    /// Post a message to the webhook, returning whether Discord accepted it
    #[instrument(skip(self, discord, message))]
    pub async fn send_message(&self, discord: &Discord, message: &Message) -> bool {
        match self.client.post(&discord.url).json(message).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent Discord message");
                    true
                } else {
                    error!("Discord message failed with status: {}", response.status());
                    if let Ok(error_text) = response.text().await {
                        error!("Discord API error response: {}", error_text);
                    }
                    false
                }
            }
            Err(e) => {
                error!("Failed to send Discord message: {}", e);
                false
            }
        }
    }
}
