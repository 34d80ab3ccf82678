use chrono::{DateTime, Datelike, Timelike, Utc};
use thiserror::Error;
use uuid::Uuid;

use queue_broker::QueueBroker;
use repository::models::DigestConfig;
use repository::Repository;
use types::{CrawlJob, DigestStatus, WeekWindow, QUEUE_CRAWL};

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
    #[error("broker error: {0}")]
    Broker(#[from] queue_broker::BrokerError),
    #[error("digest {0} is not retryable from status {1}")]
    NotRetryable(Uuid, String),
    #[error("digest {0} is already terminal ({1})")]
    AlreadyTerminal(Uuid, String),
}

/// The only component that creates digests and decides when stage jobs
/// enter the pipeline. Stage workers advance between queues; trigger,
/// retry, cancel, and the hourly fan-out live here.
#[derive(Clone)]
pub struct Orchestrator {
    repo: Repository,
    broker: QueueBroker,
}

impl Orchestrator {
    pub fn new(repo: Repository, broker: QueueBroker) -> Self {
        Self { repo, broker }
    }

    /// Creates a pending digest covering the trailing week and enqueues
    /// the first stage. The `crawl-{digestId}` job id dedups double
    /// triggers.
    #[tracing::instrument(skip(self))]
    pub async fn trigger(
        &self,
        user_id: Uuid,
        config_id: Uuid,
    ) -> Result<Uuid, OrchestratorError> {
        let now = Utc::now();
        let window = WeekWindow {
            week_start: now - chrono::Duration::days(7),
            week_end: now,
        };

        let title = format!("Your Weekly Digest, {}", now.format("%B %-d, %Y"));

        let digest = self
            .repo
            .create_digest(user_id, config_id, &title, window)
            .await?;

        self.broker
            .enqueue(
                QUEUE_CRAWL,
                &format!("crawl-{}", digest.id),
                &serde_json::json!(CrawlJob {
                    digest_id: digest.id,
                    user_id,
                    config_id,
                }),
            )
            .await?;

        tracing::info!("triggered digest {} for config {}", digest.id, config_id);

        Ok(digest.id)
    }

    /// Explicit retry of a failed digest: reset to pending and enqueue a
    /// fresh crawl under a nonce'd job id (the original terminal job id is
    /// still in its retention window).
    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, digest_id: Uuid) -> Result<(), OrchestratorError> {
        let digest = self.repo.find_digest(digest_id).await?;

        if digest.status() != DigestStatus::Failed {
            return Err(OrchestratorError::NotRetryable(digest_id, digest.status));
        }

        let digest = self.repo.reset_digest_for_retry(digest_id).await?;

        let nonce = Uuid::new_v4().simple().to_string();
        self.broker
            .enqueue(
                QUEUE_CRAWL,
                &format!("crawl-retry-{digest_id}-{nonce}"),
                &serde_json::json!(CrawlJob {
                    digest_id,
                    user_id: digest.user_id,
                    config_id: digest.config_id,
                }),
            )
            .await?;

        Ok(())
    }

    /// Cancels a non-terminal digest: pending stage jobs are removed and
    /// the digest is failed with "cancelled". A stage already holding a
    /// lease finishes on its own; its follow-up enqueue is a no-op once
    /// the digest is terminal.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, digest_id: Uuid) -> Result<(), OrchestratorError> {
        let digest = self.repo.find_digest(digest_id).await?;

        if digest.status().is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(digest_id, digest.status));
        }

        for queue in [
            types::QUEUE_CRAWL,
            types::QUEUE_TRANSCRIBE,
            types::QUEUE_ANALYZE,
            types::QUEUE_NARRATE,
            types::QUEUE_ASSEMBLE,
            types::QUEUE_DELIVER,
        ] {
            let job_id = format!("{queue}-{digest_id}");
            if self.broker.remove_pending(queue, &job_id).await? {
                tracing::info!("removed pending job {}", job_id);
            }
        }

        self.repo
            .set_digest_status(digest_id, DigestStatus::Failed, Some("cancelled"))
            .await?;

        Ok(())
    }

    /// Hourly fan-out: trigger every active config whose delivery slot
    /// matches the tick, unless a run is already in flight for it.
    #[tracing::instrument(skip(self))]
    pub async fn cron_tick(&self) -> Result<(), OrchestratorError> {
        let now = Utc::now();
        let configs = self.repo.list_active_configs().await?;

        for config in configs {
            if !delivery_matches(&config, now) {
                continue;
            }

            if self.repo.has_non_terminal_digest(config.id).await? {
                tracing::debug!("config {} already has a digest in flight", config.id);
                continue;
            }

            if let Err(e) = self.trigger(config.user_id, config.id).await {
                tracing::error!("failed to trigger config {}: {}", config.id, e);
            }
        }

        Ok(())
    }
}

/// All scheduling comparisons are UTC: weekday name equality plus
/// hour-of-day equality against the tick.
pub fn delivery_matches(config: &DigestConfig, now: DateTime<Utc>) -> bool {
    let weekday = now.weekday();
    let day_matches = config
        .delivery_day
        .eq_ignore_ascii_case(weekday_name(weekday));

    let hour_matches = config.delivery_hour() == Some(now.hour());

    day_matches && hour_matches
}

fn weekday_name(weekday: chrono::Weekday) -> &'static str {
    match weekday {
        chrono::Weekday::Mon => "monday",
        chrono::Weekday::Tue => "tuesday",
        chrono::Weekday::Wed => "wednesday",
        chrono::Weekday::Thu => "thursday",
        chrono::Weekday::Fri => "friday",
        chrono::Weekday::Sat => "saturday",
        chrono::Weekday::Sun => "sunday",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(delivery_day: &str, delivery_time: &str) -> DigestConfig {
        DigestConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            target_length_minutes: 60,
            clip_length_preference: "medium".to_string(),
            structure: "by_score".to_string(),
            breadth_depth: 50,
            voice_id: "voice-1".to_string(),
            narration_depth: "standard".to_string(),
            music_style: None,
            transition_style: "silence".to_string(),
            delivery_day: delivery_day.to_string(),
            delivery_time: delivery_time.to_string(),
            delivery_method: "syndication".to_string(),
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn matches_on_utc_day_and_hour() {
        // 2026-08-01 is a Saturday
        let now = at("2026-08-01T08:30:00Z");

        assert!(delivery_matches(&config("saturday", "08:00"), now));
        assert!(delivery_matches(&config("Saturday", "08:45"), now));
        assert!(!delivery_matches(&config("saturday", "09:00"), now));
        assert!(!delivery_matches(&config("sunday", "08:00"), now));
    }

    #[test]
    fn malformed_delivery_time_never_matches() {
        let now = at("2026-08-01T08:30:00Z");
        assert!(!delivery_matches(&config("saturday", "late"), now));
        assert!(!delivery_matches(&config("saturday", "99:00"), now));
    }
}
