//! Top-score notifications.
//!
//! The engine emits a [`TopScoreEvent`] for every recorded submission that
//! lands within the cached top rows. Delivery is fire-and-forget: a
//! [`Notifier`] must not block the submitting thread and never reports
//! failures back to the engine.
//!
//! [`WebhookPolicy`] holds the eligibility rules (target URL, rank cutoff,
//! cooldown) read from the settings store, so they can be exercised without
//! an HTTP client.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::settings::{
    SettingsStore, WEBHOOK_COOLDOWN_MS, WEBHOOK_LAST_FIRED, WEBHOOK_TOP_N, WEBHOOK_URL,
};

/// Default rank cutoff when `WEBHOOK_TOP_N` is unset.
pub const DEFAULT_TOP_N: u64 = 10;
/// Default cooldown when `WEBHOOK_COOLDOWN_MS` is unset.
pub const DEFAULT_COOLDOWN_MS: i64 = 10_000;

/// A recorded submission that ranks within the top rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TopScoreEvent {
    /// Leaderboard slug.
    pub leaderboard_slug: String,
    /// Player alias.
    pub player_alias: String,
    /// The stored score after the submission was applied.
    pub score: f64,
    /// The entry's rank after the submission.
    pub rank: u64,
    /// When the submission was applied.
    pub timestamp: DateTime<Utc>,
}

/// Receiver of top-score events.
pub trait Notifier: Send + Sync {
    /// Hands an event to the notifier. Must return promptly.
    fn notify_top_score(&self, event: TopScoreEvent);
}

/// Notifier that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_top_score(&self, _event: TopScoreEvent) {}
}

/// JSON body posted to a webhook receiver.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Always `"NEW_TOP_SCORE"`.
    pub event: &'static str,
    /// Leaderboard slug.
    pub leaderboard_slug: String,
    /// Player alias.
    pub player_alias: String,
    /// The stored score.
    pub score: f64,
    /// The entry's rank.
    pub rank: u64,
    /// RFC 3339 event time.
    pub timestamp: String,
}

impl From<&TopScoreEvent> for WebhookPayload {
    fn from(event: &TopScoreEvent) -> Self {
        Self {
            event: "NEW_TOP_SCORE",
            leaderboard_slug: event.leaderboard_slug.clone(),
            player_alias: event.player_alias.clone(),
            score: event.score,
            rank: event.rank,
            timestamp: event.timestamp.to_rfc3339(),
        }
    }
}

/// Webhook eligibility rules as currently configured.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPolicy {
    /// Receiver URL.
    pub url: String,
    /// Largest rank that triggers a delivery.
    pub top_n: u64,
    /// Minimum time between deliveries.
    pub cooldown: Duration,
    /// Time of the last successful delivery.
    pub last_fired: Option<DateTime<Utc>>,
}

impl WebhookPolicy {
    /// Reads the policy from settings. Returns `None` when no URL is set.
    ///
    /// Malformed numeric settings fall back to their defaults with a
    /// warning; a malformed last-fired timestamp is treated as never fired.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings store cannot be read.
    pub fn from_settings(settings: &dyn SettingsStore) -> Result<Option<Self>> {
        let Some(url) = settings.get(WEBHOOK_URL)?.filter(|u| !u.trim().is_empty()) else {
            return Ok(None);
        };

        let top_n = parse_or(settings.get(WEBHOOK_TOP_N)?, WEBHOOK_TOP_N, DEFAULT_TOP_N);
        let cooldown_ms = parse_or(
            settings.get(WEBHOOK_COOLDOWN_MS)?,
            WEBHOOK_COOLDOWN_MS,
            DEFAULT_COOLDOWN_MS,
        );
        let last_fired = settings
            .get(WEBHOOK_LAST_FIRED)?
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(Some(Self {
            url,
            top_n,
            cooldown: Duration::milliseconds(cooldown_ms),
            last_fired,
        }))
    }

    /// Returns `true` if an event with `rank` at `now` should be delivered.
    pub fn allows(&self, rank: u64, now: DateTime<Utc>) -> bool {
        if rank > self.top_n {
            return false;
        }
        self.last_fired.is_none_or(|last| last + self.cooldown < now)
    }
}

/// Records a successful delivery at `now`.
///
/// # Errors
///
/// Returns an error if the settings store cannot be written.
pub fn record_fired(settings: &dyn SettingsStore, now: DateTime<Utc>) -> Result<()> {
    settings.set(WEBHOOK_LAST_FIRED, &now.to_rfc3339())
}

fn parse_or<T: std::str::FromStr + Copy>(raw: Option<String>, key: &str, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring malformed webhook setting");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_url_disables_webhooks() {
        let settings = MemorySettings::new();
        assert!(WebhookPolicy::from_settings(&settings).unwrap().is_none());

        settings.set(WEBHOOK_URL, "   ").unwrap();
        assert!(WebhookPolicy::from_settings(&settings).unwrap().is_none());
    }

    #[test]
    fn test_defaults_and_rank_cutoff() {
        let settings = MemorySettings::new();
        settings.set(WEBHOOK_URL, "http://hooks.local/top").unwrap();

        let policy = WebhookPolicy::from_settings(&settings).unwrap().unwrap();
        assert_eq!(policy.top_n, 10);
        assert_eq!(policy.cooldown, Duration::milliseconds(10_000));
        assert!(policy.allows(10, now()));
        assert!(!policy.allows(11, now()));
    }

    #[test]
    fn test_cooldown() {
        let settings = MemorySettings::new();
        settings.set(WEBHOOK_URL, "http://hooks.local/top").unwrap();
        settings.set(WEBHOOK_COOLDOWN_MS, "60000").unwrap();
        record_fired(&settings, now()).unwrap();

        let policy = WebhookPolicy::from_settings(&settings).unwrap().unwrap();
        assert!(!policy.allows(1, now() + Duration::seconds(30)));
        assert!(!policy.allows(1, now() + Duration::seconds(60)));
        assert!(policy.allows(1, now() + Duration::seconds(61)));
    }

    #[test]
    fn test_malformed_settings_fall_back() {
        let settings = MemorySettings::new();
        settings.set(WEBHOOK_URL, "http://hooks.local/top").unwrap();
        settings.set(WEBHOOK_TOP_N, "lots").unwrap();
        settings.set(WEBHOOK_LAST_FIRED, "yesterday").unwrap();

        let policy = WebhookPolicy::from_settings(&settings).unwrap().unwrap();
        assert_eq!(policy.top_n, DEFAULT_TOP_N);
        assert!(policy.last_fired.is_none());
    }

    #[test]
    fn test_payload_shape() {
        let event = TopScoreEvent {
            leaderboard_slug: "global".to_string(),
            player_alias: "P1".to_string(),
            score: 900.0,
            rank: 1,
            timestamp: now(),
        };
        let json = serde_json::to_value(WebhookPayload::from(&event)).unwrap();
        assert_eq!(json["event"], "NEW_TOP_SCORE");
        assert_eq!(json["leaderboardSlug"], "global");
        assert_eq!(json["rank"], 1);
    }
}
