//! Outbound notifications for fleet alerts and broadcast notifications
//!
//! Each configured [`NotifyTarget`] receives everything at or above its
//! minimum severity, as a Discord embed or a plain JSON webhook.

use chrono::Utc;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{error, info, instrument};

use crate::broadcast::Notification;
use crate::config::{Alert, NotifyTarget, Webhook};
use crate::discord::{DiscordManager, MessageBuilder, severity_emoji};
use crate::model::{AlertSeverity, TransmissionAlert};

#[derive(Debug, Clone, Default)]
pub struct AlertManager {
    client: Client,
    targets: Vec<NotifyTarget>,
    discord_manager: DiscordManager,
}

impl AlertManager {
    pub fn new(targets: Vec<NotifyTarget>) -> Self {
        Self {
            client: Client::new(),
            targets,
            discord_manager: DiscordManager::new(),
        }
    }

    fn targets_for(&self, severity: AlertSeverity) -> impl Iterator<Item = &NotifyTarget> {
        self.targets
            .iter()
            .filter(move |target| severity >= target.min_severity)
    }

    /// Push a newly raised or resolved alert
    ///
    /// Returns the number of targets that accepted it.
    #[instrument(skip(self, alert), fields(alert = %alert.id))]
    pub async fn send_alert(&self, alert: &TransmissionAlert) -> usize {
        let mut delivered = 0;

        for target in self.targets_for(alert.severity) {
            let ok = match &target.alert {
                Alert::Discord(discord) => {
                    let embed = self.discord_manager.build_alert_embed(alert);
                    let mut message_builder = MessageBuilder::new().add_embed(embed);
                    if let Some(user_id) = &discord.user_id {
                        if !alert.resolved {
                            message_builder = message_builder.content(format!(
                                "{} {} <@{user_id}>",
                                severity_emoji(alert.severity),
                                alert.alert_type
                            ));
                        }
                    }
                    self.discord_manager
                        .send_message(discord, &message_builder.build())
                        .await
                }
                Alert::Webhook(webhook) => {
                    let payload = json!({
                        "message": Self::format_alert_message(alert),
                        "alert": alert,
                        "timestamp": Utc::now().to_rfc3339()
                    });
                    self.send_webhook_alert(webhook, &payload).await
                }
            };

            if ok {
                delivered += 1;
            }
        }

        delivered
    }

    /// Push a broadcast notification
    #[instrument(skip(self, notification), fields(notification = %notification.id))]
    pub async fn send_notification(&self, notification: &Notification) -> usize {
        let mut delivered = 0;

        for target in self.targets_for(notification.severity) {
            let ok = match &target.alert {
                Alert::Discord(discord) => {
                    let embed = self.discord_manager.build_notification_embed(notification);
                    let message = MessageBuilder::new().add_embed(embed).build();
                    self.discord_manager.send_message(discord, &message).await
                }
                Alert::Webhook(webhook) => {
                    let payload = json!({
                        "message": format!("**{}**: {}", notification.title, notification.message),
                        "notification": notification,
                        "timestamp": Utc::now().to_rfc3339()
                    });
                    self.send_webhook_alert(webhook, &payload).await
                }
            };

            if ok {
                delivered += 1;
            }
        }

        delivered
    }

    /// Whether any target would receive something of this severity
    pub fn accepts(&self, severity: AlertSeverity) -> bool {
        self.targets_for(severity).next().is_some()
    }

    fn format_alert_message(alert: &TransmissionAlert) -> String {
        let subject = alert
            .transmitter_id
            .as_deref()
            .or(alert.channel_id.as_deref())
            .unwrap_or("fleet");

        if alert.resolved {
            format!(
                "✅ **Resolved**: {} on `{}`",
                alert.alert_type, subject
            )
        } else {
            format!(
                "{} **{} {}** on `{}`: {}",
                severity_emoji(alert.severity),
                alert.severity,
                alert.alert_type,
                subject,
                alert.message
            )
        }
    }

    #[instrument(skip(self, webhook, payload))]
    async fn send_webhook_alert(&self, webhook: &Webhook, payload: &Value) -> bool {
        match self.client.post(&webhook.url).json(payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                    true
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                    false
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Discord;
    use crate::fleet::tests::state_with;
    use crate::model::{AlertType, NewAlert};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert(severity: AlertSeverity) -> TransmissionAlert {
        let mut state = state_with(&["tx-1"]);
        state
            .create_alert(NewAlert::for_transmitter(
                "tx-1",
                AlertType::PowerFailure,
                severity,
                "mains lost",
            ))
            .unwrap()
    }

    fn webhook(server: &MockServer, min_severity: AlertSeverity) -> NotifyTarget {
        NotifyTarget {
            min_severity,
            alert: Alert::Webhook(Webhook {
                url: format!("{}/hook", server.uri()),
            }),
        }
    }

    #[tokio::test]
    async fn test_webhook_receives_alert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "alert": { "type": "power_failure", "severity": "critical", "transmitterId": "tx-1" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let manager = AlertManager::new(vec![webhook(&server, AlertSeverity::High)]);
        assert_eq!(manager.send_alert(&alert(AlertSeverity::Critical)).await, 1);
    }

    #[tokio::test]
    async fn test_below_min_severity_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let manager = AlertManager::new(vec![webhook(&server, AlertSeverity::Critical)]);
        assert!(!manager.accepts(AlertSeverity::High));
        assert_eq!(manager.send_alert(&alert(AlertSeverity::High)).await, 0);
    }

    #[tokio::test]
    async fn test_discord_mentions_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/discord"))
            .and(body_partial_json(serde_json::json!({
                "content": "🔴 power_failure <@42>"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let manager = AlertManager::new(vec![NotifyTarget {
            min_severity: AlertSeverity::Low,
            alert: Alert::Discord(Discord {
                url: format!("{}/discord", server.uri()),
                user_id: Some("42".to_string()),
            }),
        }]);

        assert_eq!(manager.send_alert(&alert(AlertSeverity::Critical)).await, 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_counted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let manager = AlertManager::new(vec![webhook(&server, AlertSeverity::Low)]);
        assert_eq!(manager.send_alert(&alert(AlertSeverity::Critical)).await, 0);
    }

    #[test]
    fn test_format_alert_message() {
        let mut a = alert(AlertSeverity::Critical);
        assert_eq!(
            AlertManager::format_alert_message(&a),
            "🔴 **critical power_failure** on `tx-1`: mains lost"
        );

        a.resolved = true;
        assert_eq!(
            AlertManager::format_alert_message(&a),
            "✅ **Resolved**: power_failure on `tx-1`"
        );
    }
}
