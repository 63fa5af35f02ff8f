//! HTTP webhook delivery of top-score events.
//!
//! This module is only available when the `webhook` feature is enabled.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rankdrop::clock::SystemClock;
//! use rankdrop::settings::{MemorySettings, SettingsStore, WEBHOOK_URL};
//! use rankdrop::webhook::WebhookNotifier;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Arc::new(MemorySettings::new());
//! settings.set(WEBHOOK_URL, "https://hooks.example.com/rankdrop")?;
//! let notifier = WebhookNotifier::new(settings, Arc::new(SystemClock))?;
//! # let _ = notifier;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::{NotifyError, Result};
use crate::notify::{Notifier, TopScoreEvent, WebhookPayload, WebhookPolicy, record_fired};
use crate::settings::SettingsStore;

/// [`Notifier`] that posts [`WebhookPayload`]s to the URL in `WEBHOOK_URL`.
///
/// Eligibility is re-read from settings for every event, so changing the URL
/// or cooldown takes effect immediately. Each delivery runs on its own
/// detached thread; failures are logged and dropped.
pub struct WebhookNotifier {
    settings: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    client: reqwest::blocking::Client,
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier").finish_non_exhaustive()
    }
}

impl WebhookNotifier {
    /// Creates a notifier with a 10 second request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::ClientCreate`] if the HTTP client cannot be
    /// built.
    pub fn new(settings: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotifyError::ClientCreate { source: e })?;
        Ok(Self {
            settings,
            clock,
            client,
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify_top_score(&self, event: TopScoreEvent) {
        let now = self.clock.now();
        let policy = match WebhookPolicy::from_settings(self.settings.as_ref()) {
            Ok(Some(policy)) => policy,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read webhook settings");
                return;
            }
        };
        if !policy.allows(event.rank, now) {
            return;
        }

        let client = self.client.clone();
        let settings = Arc::clone(&self.settings);
        let clock = Arc::clone(&self.clock);
        let payload = WebhookPayload::from(&event);

        let spawned = std::thread::Builder::new()
            .name("rankdrop-webhook".to_string())
            .spawn(move || match post(&client, &policy.url, &payload) {
                Ok(()) => {
                    debug!(slug = %payload.leaderboard_slug, rank = payload.rank, "webhook delivered");
                    if let Err(e) = record_fired(settings.as_ref(), clock.now()) {
                        warn!(error = %e, "failed to record webhook delivery");
                    }
                }
                Err(e) => warn!(error = %e, "webhook failed"),
            });
        if let Err(e) = spawned {
            warn!(error = %e, "failed to spawn webhook thread");
        }
    }
}

/// Posts one payload; non-2xx responses are errors.
fn post(client: &reqwest::blocking::Client, url: &str, payload: &WebhookPayload) -> Result<()> {
    let body = serde_json::to_vec(payload).map_err(NotifyError::Serialization)?;
    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .map_err(|e| NotifyError::RequestFailed { source: e })?;

    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status().as_u16();
    let body = resp.text().unwrap_or_default();
    Err(NotifyError::HttpStatus { status, body }.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::settings::{MemorySettings, WEBHOOK_LAST_FIRED, WEBHOOK_URL};
    use chrono::{TimeZone, Utc};

    fn event(rank: u64) -> TopScoreEvent {
        TopScoreEvent {
            leaderboard_slug: "global".to_string(),
            player_alias: "P1".to_string(),
            score: 10.0,
            rank,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_unreachable_receiver_is_swallowed() {
        let settings = Arc::new(MemorySettings::new());
        // Port 9 (discard) on localhost is refused in test environments
        settings.set(WEBHOOK_URL, "http://127.0.0.1:9/hook").unwrap();
        let clock = Arc::new(ManualClock::frozen(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let notifier = WebhookNotifier::new(settings.clone(), clock).unwrap();

        notifier.notify_top_score(event(1));
        std::thread::sleep(Duration::from_millis(200));
        assert!(settings.get(WEBHOOK_LAST_FIRED).unwrap().is_none());
    }

    #[test]
    fn test_disabled_without_url() {
        let settings = Arc::new(MemorySettings::new());
        let clock = Arc::new(ManualClock::frozen(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let notifier = WebhookNotifier::new(settings.clone(), clock).unwrap();
        notifier.notify_top_score(event(1));
        assert!(settings.get(WEBHOOK_LAST_FIRED).unwrap().is_none());
    }
}
