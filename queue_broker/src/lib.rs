use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How long terminal (complete/failed) job hashes stay around for
/// inspection before redis expires them.
const TERMINAL_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

const BACKOFF_BASE: Duration = Duration::from_secs(30);
const BACKOFF_CAP: Duration = Duration::from_secs(15 * 60);

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed job {0}: {1}")]
    MalformedJob(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Processing,
    Delayed,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Delayed => "delayed",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
        }
    }

    fn is_live(s: &str) -> bool {
        matches!(s, "queued" | "processing" | "delayed")
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// Job was re-queued with a delay before its next attempt.
    Retried { attempt: u32, delay: Duration },
    /// Attempts exhausted; the job is terminally failed.
    Exhausted,
}

fn job_key(queue: &str, job_id: &str) -> String {
    format!("queue:{queue}:job:{job_id}")
}

fn ready_key(queue: &str) -> String {
    format!("queue:{queue}:ready")
}

fn processing_key(queue: &str) -> String {
    format!("queue:{queue}:processing")
}

fn delayed_key(queue: &str) -> String {
    format!("queue:{queue}:delayed")
}

/// Exponential backoff for the Nth failed attempt (1-based), capped.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = BACKOFF_BASE * 2_u32.pow(exponent);
    delay.min(BACKOFF_CAP)
}

/// Dedup id for the hourly scheduler tick: every process that tries to
/// enqueue the tick for the same hour collapses onto one job.
pub fn cron_tick_id(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("pipeline-tick-{}", now.format("%Y%m%d%H"))
}

/// Durable named FIFO queues over redis.
///
/// A job is a hash (`queue:{name}:job:{id}`) holding its payload and
/// attempt state; queue order lives in a ready list, leases in a
/// processing list, and retry scheduling in a delayed zset. Delivery is
/// at-least-once: consumers must be idempotent.
#[derive(Clone)]
pub struct QueueBroker {
    client: redis::Client,
    max_attempts: u32,
}

impl QueueBroker {
    pub fn new(redis_url: &str, max_attempts: u32) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url)?;

        Ok(Self {
            client,
            max_attempts,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, BrokerError> {
        Ok(self
            .client
            .get_multiplexed_async_connection()
            .await?)
    }

    /// Enqueues a job. The explicit job id is the dedup key: while a job
    /// with the same id is live (queued, processing, or delayed), a second
    /// enqueue is a no-op and returns `false`.
    #[tracing::instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        queue: &str,
        job_id: &str,
        payload: &serde_json::Value,
    ) -> Result<bool, BrokerError> {
        let mut con = self.connection().await?;

        let key = job_key(queue, job_id);

        let existing_status: Option<String> = con.hget(&key, "status").await?;
        if let Some(status) = existing_status {
            if JobStatus::is_live(&status) {
                tracing::debug!("job {} already live ({}), deduped", job_id, status);
                return Ok(false);
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let payload_text = payload.to_string();

        let _: () = con
            .hset_multiple(
                &key,
                &[
                    ("id", job_id),
                    ("queue", queue),
                    ("payload", payload_text.as_str()),
                    ("attempts", "0"),
                    ("status", JobStatus::Queued.as_str()),
                    ("enqueued_at", now.as_str()),
                ],
            )
            .await?;
        let _: () = con.persist(&key).await?;
        let _: () = con.lpush(ready_key(queue), job_id).await?;

        Ok(true)
    }

    /// Blocks up to `timeout` for the next ready job, moving it onto the
    /// processing list (the lease) and bumping its attempt counter.
    pub async fn lease(
        &self,
        queue: &str,
        timeout: Duration,
    ) -> Result<Option<Job>, BrokerError> {
        let mut con = self.connection().await?;

        let job_id: Option<String> = con
            .blmove(
                ready_key(queue),
                processing_key(queue),
                redis::Direction::Right,
                redis::Direction::Left,
                timeout.as_secs_f64(),
            )
            .await?;

        let Some(job_id) = job_id else {
            return Ok(None);
        };

        let key = job_key(queue, &job_id);

        let data: HashMap<String, String> = con.hgetall(&key).await?;
        if data.is_empty() {
            // hash expired or was deleted out from under the list entry
            let _: () = con.lrem(processing_key(queue), 1, &job_id).await?;
            return Err(BrokerError::MalformedJob(
                job_id,
                "job hash missing".to_string(),
            ));
        }

        let payload = serde_json::from_str(data.get("payload").map_or("null", String::as_str))
            .map_err(|e| BrokerError::MalformedJob(job_id.clone(), e.to_string()))?;

        let attempts = data
            .get("attempts")
            .and_then(|a| a.parse::<u32>().ok())
            .unwrap_or(0)
            + 1;

        let attempts_text = attempts.to_string();
        let _: () = con
            .hset_multiple(
                &key,
                &[
                    ("status", JobStatus::Processing.as_str()),
                    ("attempts", attempts_text.as_str()),
                ],
            )
            .await?;

        Ok(Some(Job {
            id: job_id,
            queue: queue.to_string(),
            payload,
            attempts,
        }))
    }

    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn complete(&self, job: &Job) -> Result<(), BrokerError> {
        let mut con = self.connection().await?;

        let key = job_key(&job.queue, &job.id);

        let _: () = con.lrem(processing_key(&job.queue), 1, &job.id).await?;
        let _: () = con
            .hset(&key, "status", JobStatus::Complete.as_str())
            .await?;
        let _: () = con
            .expire(&key, TERMINAL_RETENTION.as_secs() as i64)
            .await?;

        Ok(())
    }

    /// Releases a failed lease. Until `max_attempts` is reached the job is
    /// parked on the delayed zset with exponential backoff; afterwards it
    /// is terminally failed and retained for inspection.
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id))]
    pub async fn fail(&self, job: &Job, error: &str) -> Result<FailOutcome, BrokerError> {
        let mut con = self.connection().await?;

        let key = job_key(&job.queue, &job.id);

        let _: () = con.lrem(processing_key(&job.queue), 1, &job.id).await?;
        let _: () = con.hset(&key, "last_error", error).await?;

        if job.attempts < self.max_attempts {
            let delay = backoff_delay(job.attempts);
            let due = chrono::Utc::now().timestamp() + delay.as_secs() as i64;

            let _: () = con
                .hset(&key, "status", JobStatus::Delayed.as_str())
                .await?;
            let _: () = con.zadd(delayed_key(&job.queue), &job.id, due).await?;

            tracing::warn!(
                "job {} attempt {} failed, retrying in {}s: {}",
                job.id,
                job.attempts,
                delay.as_secs(),
                error
            );

            Ok(FailOutcome::Retried {
                attempt: job.attempts,
                delay,
            })
        } else {
            let _: () = con.hset(&key, "status", JobStatus::Failed.as_str()).await?;
            let _: () = con
                .expire(&key, TERMINAL_RETENTION.as_secs() as i64)
                .await?;

            tracing::error!(
                "job {} exhausted after {} attempts: {}",
                job.id,
                job.attempts,
                error
            );

            Ok(FailOutcome::Exhausted)
        }
    }

    /// Moves due delayed jobs back onto the ready list. Each worker loop
    /// calls this before leasing.
    pub async fn promote_delayed(&self, queue: &str) -> Result<u32, BrokerError> {
        let mut con = self.connection().await?;

        let now = chrono::Utc::now().timestamp();

        let due: Vec<String> = con
            .zrangebyscore(delayed_key(queue), "-inf", now)
            .await?;

        let mut promoted = 0;
        for job_id in due {
            let removed: u32 = con.zrem(delayed_key(queue), &job_id).await?;
            if removed == 0 {
                // another worker promoted it first
                continue;
            }

            let _: () = con
                .hset(job_key(queue, &job_id), "status", JobStatus::Queued.as_str())
                .await?;
            let _: () = con.lpush(ready_key(queue), &job_id).await?;
            promoted += 1;
        }

        Ok(promoted)
    }

    /// Removes a job that has not been leased yet. Used by cancel. Returns
    /// `false` when there was nothing pending under that id.
    pub async fn remove_pending(
        &self,
        queue: &str,
        job_id: &str,
    ) -> Result<bool, BrokerError> {
        let mut con = self.connection().await?;

        let removed_ready: u32 = con.lrem(ready_key(queue), 0, job_id).await?;
        let removed_delayed: u32 = con.zrem(delayed_key(queue), job_id).await?;

        if removed_ready + removed_delayed > 0 {
            let _: () = con.del(job_key(queue, job_id)).await?;
            return Ok(true);
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(30));
        assert_eq!(backoff_delay(2), Duration::from_secs(60));
        assert_eq!(backoff_delay(3), Duration::from_secs(120));
        assert_eq!(backoff_delay(5), Duration::from_secs(480));
        // capped
        assert_eq!(backoff_delay(6), Duration::from_secs(900));
        assert_eq!(backoff_delay(30), Duration::from_secs(900));
    }

    #[test]
    fn cron_tick_ids_collapse_within_an_hour() {
        let a = chrono::DateTime::parse_from_rfc3339("2026-02-06T14:05:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let b = chrono::DateTime::parse_from_rfc3339("2026-02-06T14:55:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let c = chrono::DateTime::parse_from_rfc3339("2026-02-06T15:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);

        assert_eq!(cron_tick_id(a), cron_tick_id(b));
        assert_ne!(cron_tick_id(a), cron_tick_id(c));
        assert_eq!(cron_tick_id(a), "pipeline-tick-2026020614");
    }

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(job_key("crawl", "crawl-abc"), "queue:crawl:job:crawl-abc");
        assert_eq!(ready_key("crawl"), "queue:crawl:ready");
        assert_eq!(processing_key("crawl"), "queue:crawl:processing");
        assert_eq!(delayed_key("crawl"), "queue:crawl:delayed");
    }

    #[test]
    fn live_statuses_dedup() {
        assert!(JobStatus::is_live("queued"));
        assert!(JobStatus::is_live("processing"));
        assert!(JobStatus::is_live("delayed"));
        assert!(!JobStatus::is_live("complete"));
        assert!(!JobStatus::is_live("failed"));
    }
}
