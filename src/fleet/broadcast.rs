//! Broadcast side of the fleet: live channels, black-screen detections,
//! signal errors, operator notifications and stream sessions

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    actors::messages::FleetEvent,
    broadcast::{
        BlackScreenDetection, BroadcastChannel, BroadcastError, BroadcastErrorType, Notification,
        StreamSession, UserRole,
    },
    error::{EntityKind, FleetError, FleetResult},
    model::{AlertSeverity, new_id},
    monitors::black_screen_severity,
};

use super::FleetState;

/// Broadcast signal below this quality is recorded as a signal loss
const BROADCAST_SIGNAL_LOSS: f64 = 50.0;

/// Broadcast signal below this quality is a critical loss
const BROADCAST_SIGNAL_LOSS_CRITICAL: f64 = 20.0;

impl FleetState {
    pub fn broadcast_channel(&self, id: &str) -> Option<&BroadcastChannel> {
        self.records.broadcast_channels.iter().find(|c| c.id == id)
    }

    fn broadcast_channel_mut(&mut self, id: &str) -> FleetResult<&mut BroadcastChannel> {
        self.records
            .broadcast_channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::BroadcastChannel, id))
    }

    pub fn live_broadcast_channels(&self) -> Vec<BroadcastChannel> {
        self.records
            .broadcast_channels
            .iter()
            .filter(|c| c.is_live)
            .cloned()
            .collect()
    }

    pub fn add_broadcast_channel(&mut self, channel: BroadcastChannel) -> FleetResult<BroadcastChannel> {
        if self.broadcast_channel(&channel.id).is_some() {
            return Err(FleetError::AlreadyExists {
                kind: EntityKind::BroadcastChannel,
                id: channel.id,
            });
        }

        self.records.broadcast_channels.push(channel.clone());
        self.emit(FleetEvent::BroadcastChannelChanged {
            channel_id: channel.id.clone(),
        });
        Ok(channel)
    }

    pub fn set_channel_live(&mut self, id: &str, is_live: bool) -> FleetResult<BroadcastChannel> {
        let channel = self.broadcast_channel_mut(id)?;
        channel.is_live = is_live;
        let channel = channel.clone();

        debug!("broadcast channel {id} live: {is_live}");
        self.emit(FleetEvent::BroadcastChannelChanged {
            channel_id: id.to_string(),
        });
        Ok(channel)
    }

    /// Store a broadcast signal reading
    ///
    /// Readings below 50 % keep one open `signal_loss` broadcast error per
    /// channel, which is returned. Further low readings refresh it and can
    /// only raise its severity. A reading back at 50 % or more resolves it.
    pub fn update_broadcast_signal(
        &mut self,
        id: &str,
        signal_quality: f64,
    ) -> FleetResult<Option<BroadcastError>> {
        let channel = self.broadcast_channel_mut(id)?;
        channel.signal_quality = signal_quality;
        let name = channel.name.clone();

        self.emit(FleetEvent::BroadcastChannelChanged {
            channel_id: id.to_string(),
        });

        if signal_quality >= BROADCAST_SIGNAL_LOSS {
            self.resolve_signal_loss(id);
            return Ok(None);
        }

        let severity = if signal_quality < BROADCAST_SIGNAL_LOSS_CRITICAL {
            AlertSeverity::Critical
        } else {
            AlertSeverity::High
        };
        let message = format!("{name}: signal quality dropped to {signal_quality:.1}%");

        let open = self
            .records
            .broadcast_errors
            .iter_mut()
            .find(|e| e.is_open_signal_loss(id));
        if let Some(open) = open {
            open.severity = open.severity.max(severity);
            open.message = message;
            let error = open.clone();

            debug!("refreshed signal loss {} on {id}", error.id);
            self.emit(FleetEvent::BroadcastErrorRefreshed(error.clone()));
            return Ok(Some(error));
        }

        let error = BroadcastError {
            id: new_id(),
            channel_id: id.to_string(),
            error_type: BroadcastErrorType::SignalLoss,
            severity,
            message,
            detected_at: Utc::now(),
            resolved: false,
        };

        warn!("{severity} broadcast error on {id}: {}", error.message);
        self.records.broadcast_errors.push(error.clone());
        self.emit(FleetEvent::BroadcastErrorRaised(error.clone()));
        Ok(Some(error))
    }

    fn resolve_signal_loss(&mut self, channel_id: &str) {
        let mut resolved = Vec::new();
        for error in &mut self.records.broadcast_errors {
            if error.is_open_signal_loss(channel_id) {
                error.resolved = true;
                resolved.push(error.clone());
            }
        }
        for error in resolved {
            info!("signal restored on {channel_id}, resolved {}", error.id);
            self.emit(FleetEvent::BroadcastErrorResolved(error));
        }
    }

    /// Record a black screen on a broadcast channel
    ///
    /// Returns `None` when the duration is below the configured threshold.
    pub fn detect_black_screen(
        &mut self,
        channel_id: &str,
        duration_secs: u32,
    ) -> FleetResult<Option<BlackScreenDetection>> {
        let channel = self
            .broadcast_channel(channel_id)
            .ok_or_else(|| FleetError::not_found(EntityKind::BroadcastChannel, channel_id))?
            .clone();

        if duration_secs < self.settings.black_screen_threshold {
            debug!(
                "ignoring {duration_secs}s black screen on {channel_id} (threshold {}s)",
                self.settings.black_screen_threshold
            );
            return Ok(None);
        }

        let now = Utc::now();
        let detection = BlackScreenDetection {
            id: new_id(),
            channel_id: channel_id.to_string(),
            detected_at: now,
            duration_secs,
            severity: black_screen_severity(duration_secs),
            resolved: false,
            resolved_at: None,
        };

        warn!(
            "{} black screen on {} ({duration_secs}s)",
            detection.severity, channel.name
        );
        self.records.black_screens.push(detection.clone());
        self.emit(FleetEvent::BlackScreenDetected(detection.clone()));

        if self.settings.notify_black_screens {
            self.notify(
                "Black screen detected".to_string(),
                format!("{} showed a black screen for {duration_secs}s", channel.name),
                detection.severity,
                channel.permitted_roles,
            );
        }

        Ok(Some(detection))
    }

    pub fn resolve_black_screen(&mut self, id: &str) -> FleetResult<BlackScreenDetection> {
        let detection = self
            .records
            .black_screens
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::BlackScreen, id))?;

        if detection.resolved {
            return Err(FleetError::Conflict(format!(
                "black screen '{id}' is already resolved"
            )));
        }
        detection.resolved = true;
        detection.resolved_at = Some(Utc::now());
        let detection = detection.clone();

        info!("black screen {id} on {} resolved", detection.channel_id);
        self.emit(FleetEvent::BlackScreenResolved {
            detection_id: id.to_string(),
        });
        Ok(detection)
    }

    fn notify(
        &mut self,
        title: String,
        message: String,
        severity: AlertSeverity,
        target_roles: Vec<UserRole>,
    ) {
        let notification = Notification {
            id: new_id(),
            title,
            message,
            severity,
            target_roles,
            created_at: Utc::now(),
            read: false,
        };
        self.records.notifications.push(notification.clone());
        self.emit(FleetEvent::NotificationRaised(notification));
    }

    /// Notifications addressed to a role, newest first
    pub fn notifications_for(&self, role: UserRole) -> Vec<Notification> {
        self.records
            .notifications
            .iter()
            .rev()
            .filter(|n| n.is_for(role))
            .cloned()
            .collect()
    }

    /// Open a live stream session on a broadcast channel
    ///
    /// A channel carries at most one live session at a time.
    pub fn start_stream_session(&mut self, channel_id: &str) -> FleetResult<StreamSession> {
        if self.broadcast_channel(channel_id).is_none() {
            return Err(FleetError::not_found(EntityKind::BroadcastChannel, channel_id));
        }
        if let Some(live) = self
            .records
            .stream_sessions
            .iter()
            .find(|s| s.is_live && s.channel_id == channel_id)
        {
            return Err(FleetError::Conflict(format!(
                "channel '{channel_id}' already streams in session '{}'",
                live.id
            )));
        }

        let session = StreamSession {
            id: new_id(),
            channel_id: channel_id.to_string(),
            is_live: true,
            started_at: Utc::now(),
            ended_at: None,
        };
        self.records.stream_sessions.push(session.clone());
        self.emit(FleetEvent::StreamSessionChanged {
            session_id: session.id.clone(),
        });
        Ok(session)
    }

    pub fn end_stream_session(&mut self, id: &str) -> FleetResult<StreamSession> {
        let session = self
            .records
            .stream_sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| FleetError::not_found(EntityKind::StreamSession, id))?;

        if !session.is_live {
            return Err(FleetError::Conflict(format!("stream session '{id}' already ended")));
        }
        session.is_live = false;
        session.ended_at = Some(Utc::now());
        let session = session.clone();

        self.emit(FleetEvent::StreamSessionChanged {
            session_id: id.to_string(),
        });
        Ok(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::{FleetSettings, tests::state_with};
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    pub(crate) fn broadcast_channel(id: &str) -> BroadcastChannel {
        BroadcastChannel {
            id: id.to_string(),
            name: format!("Channel {id}"),
            is_live: true,
            signal_quality: 98.0,
            permitted_roles: vec![UserRole::Director, UserRole::Engineer],
        }
    }

    fn state_with_channel(id: &str) -> FleetState {
        let mut state = state_with(&[]);
        state.add_broadcast_channel(broadcast_channel(id)).unwrap();
        state
    }

    #[test]
    fn test_black_screen_severity_bands() {
        let mut state = state_with_channel("bc-1");
        let cases = [
            (6, AlertSeverity::Medium),
            (16, AlertSeverity::High),
            (31, AlertSeverity::Critical),
        ];

        for (duration, expected) in cases {
            let detection = state.detect_black_screen("bc-1", duration).unwrap().unwrap();
            assert_eq!(detection.severity, expected, "{duration}s");
            assert_eq!(detection.duration_secs, duration);
        }
        assert_eq!(state.snapshot().black_screens.len(), 3);
    }

    #[test]
    fn test_short_black_screen_ignored() {
        let mut state = state_with_channel("bc-1");

        assert_eq!(state.detect_black_screen("bc-1", 3).unwrap(), None);
        assert!(state.snapshot().black_screens.is_empty());
        assert!(state.snapshot().notifications.is_empty());
    }

    #[test]
    fn test_black_screen_threshold_is_configurable() {
        let settings = FleetSettings {
            black_screen_threshold: 2,
            ..Default::default()
        };
        let mut state = FleetState::new(settings);
        state.add_broadcast_channel(broadcast_channel("bc-1")).unwrap();

        let detection = state.detect_black_screen("bc-1", 3).unwrap().unwrap();
        assert_eq!(detection.severity, AlertSeverity::Low);
    }

    #[test]
    fn test_black_screen_notifies_permitted_roles() {
        let mut state = state_with_channel("bc-1");
        state.detect_black_screen("bc-1", 20).unwrap();

        let for_director = state.notifications_for(UserRole::Director);
        assert_eq!(for_director.len(), 1);
        assert_eq!(for_director[0].severity, AlertSeverity::High);
        assert!(!for_director[0].read);
        assert!(state.notifications_for(UserRole::Operator).is_empty());
    }

    #[test]
    fn test_black_screen_unknown_channel() {
        let mut state = state_with(&[]);
        assert_matches!(
            state.detect_black_screen("bc-9", 20),
            Err(FleetError::NotFound { kind: EntityKind::BroadcastChannel, .. })
        );
    }

    #[test]
    fn test_resolve_black_screen() {
        let mut state = state_with_channel("bc-1");
        let detection = state.detect_black_screen("bc-1", 10).unwrap().unwrap();

        let resolved = state.resolve_black_screen(&detection.id).unwrap();
        assert!(resolved.resolved);
        assert!(resolved.resolved_at.is_some());
        assert_matches!(state.resolve_black_screen(&detection.id), Err(FleetError::Conflict(_)));
    }

    #[test]
    fn test_broadcast_signal_loss() {
        let mut state = state_with_channel("bc-1");

        assert_eq!(state.update_broadcast_signal("bc-1", 80.0).unwrap(), None);

        let high = state.update_broadcast_signal("bc-1", 40.0).unwrap().unwrap();
        assert_eq!(high.error_type, BroadcastErrorType::SignalLoss);
        assert_eq!(high.severity, AlertSeverity::High);

        let critical = state.update_broadcast_signal("bc-1", 10.0).unwrap().unwrap();
        assert_eq!(critical.id, high.id);
        assert_eq!(critical.severity, AlertSeverity::Critical);

        // a partial recovery keeps the worst severity seen
        let still = state.update_broadcast_signal("bc-1", 45.0).unwrap().unwrap();
        assert_eq!(still.severity, AlertSeverity::Critical);

        assert_eq!(state.broadcast_channel("bc-1").unwrap().signal_quality, 45.0);
        assert_eq!(state.snapshot().broadcast_errors.len(), 1);
    }

    #[test]
    fn test_flapping_signal_stays_bounded() {
        let mut state = state_with_channel("bc-1");
        state.drain_events();

        for _ in 0..500 {
            state.update_broadcast_signal("bc-1", 30.0).unwrap();
        }
        let errors = state.snapshot().broadcast_errors;
        assert_eq!(errors.len(), 1);
        assert!(!errors[0].resolved);

        assert_eq!(state.update_broadcast_signal("bc-1", 75.0).unwrap(), None);
        let events = state.drain_events();
        assert_matches!(
            events.last(),
            Some(FleetEvent::BroadcastErrorResolved(error)) if error.id == errors[0].id
        );
        assert!(state.snapshot().broadcast_errors[0].resolved);

        // a new loss after recovery opens a fresh error
        let next = state.update_broadcast_signal("bc-1", 30.0).unwrap().unwrap();
        assert_ne!(next.id, errors[0].id);
        assert_eq!(state.snapshot().broadcast_errors.len(), 2);
    }

    #[test]
    fn test_duplicate_broadcast_channel_rejected() {
        let mut state = state_with_channel("bc-1");
        assert_matches!(
            state.add_broadcast_channel(broadcast_channel("bc-1")),
            Err(FleetError::AlreadyExists { .. })
        );
    }

    #[test]
    fn test_live_channels() {
        let mut state = state_with_channel("bc-1");
        state.add_broadcast_channel(broadcast_channel("bc-2")).unwrap();
        state.set_channel_live("bc-2", false).unwrap();

        let live = state.live_broadcast_channels();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, "bc-1");
    }

    #[test]
    fn test_stream_session_lifecycle() {
        let mut state = state_with_channel("bc-1");

        let session = state.start_stream_session("bc-1").unwrap();
        assert!(session.is_live);
        assert_matches!(state.start_stream_session("bc-1"), Err(FleetError::Conflict(_)));

        let ended = state.end_stream_session(&session.id).unwrap();
        assert!(!ended.is_live);
        assert!(ended.ended_at.is_some());
        assert_matches!(state.end_stream_session(&session.id), Err(FleetError::Conflict(_)));

        state.start_stream_session("bc-1").unwrap();
    }
}
