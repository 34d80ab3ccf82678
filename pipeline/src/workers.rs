use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use queue_broker::{FailOutcome, Job};
use types::{
    AnalyzeJob, AssembleJob, CrawlJob, DeliverJob, DigestStatus, NarrateJob,
    TranscribeJob, QUEUE_ANALYZE, QUEUE_ASSEMBLE, QUEUE_CRAWL, QUEUE_DELIVER,
    QUEUE_NARRATE, QUEUE_PIPELINE, QUEUE_TRANSCRIBE,
};

use crate::context::AppContext;

const LEASE_TIMEOUT: Duration = Duration::from_secs(5);
const BROKER_ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Outcome of one stage job, translated at the worker boundary into
/// queue completion, queue retry, or a failed digest.
#[derive(Debug)]
pub enum StageOutcome {
    /// The stage produced its output; the next stage (if any) is enqueued.
    Ok,
    /// Some items failed but at least one survived; the stage advanced.
    PerItemFailures(Vec<String>),
    /// The stage cannot produce its required output. The digest fails
    /// with the short error string and is not advanced.
    StageFailure {
        kind: &'static str,
        message: String,
    },
    /// The digest turned terminal under us (cancel); drop the job.
    Skipped,
}

/// A failure worth handing back to the queue's retry policy.
#[derive(Debug)]
pub struct TransientFailure(pub String);

type StageResult = Result<StageOutcome, TransientFailure>;

/// One worker: promotes due retries, leases the next job, runs it, and
/// translates the outcome. Workers of one queue are independent; digests
/// are serialized by the `{stage}-{digestId}` dedup ids.
pub async fn run_worker(ctx: Arc<AppContext>, queue: &'static str) {
    tracing::info!("worker started on queue {}", queue);

    loop {
        if let Err(e) = ctx.broker.promote_delayed(queue).await {
            tracing::warn!("promote_delayed on {} failed: {}", queue, e);
            tokio::time::sleep(BROKER_ERROR_PAUSE).await;
            continue;
        }

        let job = match ctx.broker.lease(queue, LEASE_TIMEOUT).await {
            Ok(Some(job)) => job,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("lease on {} failed: {}", queue, e);
                tokio::time::sleep(BROKER_ERROR_PAUSE).await;
                continue;
            }
        };

        process_job(&ctx, &job).await;
    }
}

async fn process_job(ctx: &AppContext, job: &Job) {
    tracing::info!("processing job {} (attempt {})", job.id, job.attempts);

    let digest_id = digest_id_of(job);

    match dispatch(ctx, job).await {
        Ok(StageOutcome::Ok) | Ok(StageOutcome::Skipped) => {
            if let Err(e) = ctx.broker.complete(job).await {
                tracing::error!("failed to complete job {}: {}", job.id, e);
            }
        }
        Ok(StageOutcome::PerItemFailures(failures)) => {
            tracing::warn!(
                "job {} advanced with {} item failures: {:?}",
                job.id,
                failures.len(),
                failures
            );
            if let Err(e) = ctx.broker.complete(job).await {
                tracing::error!("failed to complete job {}: {}", job.id, e);
            }
        }
        Ok(StageOutcome::StageFailure { kind, message }) => {
            tracing::error!("job {} failed its stage ({}): {}", job.id, kind, message);
            if let Some(digest_id) = digest_id {
                mark_digest_failed(ctx, digest_id, kind).await;
            }
            if let Err(e) = ctx.broker.complete(job).await {
                tracing::error!("failed to complete job {}: {}", job.id, e);
            }
        }
        Err(TransientFailure(message)) => match ctx.broker.fail(job, &message).await {
            Ok(FailOutcome::Retried { attempt, delay }) => {
                tracing::warn!(
                    "job {} attempt {} will retry in {:?}",
                    job.id,
                    attempt,
                    delay
                );
            }
            Ok(FailOutcome::Exhausted) => {
                if let Some(digest_id) = digest_id {
                    mark_digest_failed(ctx, digest_id, &message).await;
                }
            }
            Err(e) => tracing::error!("failed to fail job {}: {}", job.id, e),
        },
    }
}

async fn dispatch(ctx: &AppContext, job: &Job) -> StageResult {
    match job.queue.as_str() {
        QUEUE_PIPELINE => run_cron_tick(ctx).await,
        QUEUE_CRAWL => run_crawl(ctx, job).await,
        QUEUE_TRANSCRIBE => run_transcribe(ctx, job).await,
        QUEUE_ANALYZE => run_analyze(ctx, job).await,
        QUEUE_NARRATE => run_narrate(ctx, job).await,
        QUEUE_ASSEMBLE => run_assemble(ctx, job).await,
        QUEUE_DELIVER => run_deliver(ctx, job).await,
        other => {
            tracing::error!("job {} on unknown queue {}", job.id, other);
            Ok(StageOutcome::Skipped)
        }
    }
}

fn digest_id_of(job: &Job) -> Option<Uuid> {
    job.payload
        .get("digest_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

fn parse_payload<T: serde::de::DeserializeOwned>(job: &Job) -> Option<T> {
    match serde_json::from_value(job.payload.clone()) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::error!("job {} has malformed payload: {}", job.id, e);
            None
        }
    }
}

/// Marks the digest failed. A conflict here means the digest already went
/// terminal (cancel), which is fine.
async fn mark_digest_failed(ctx: &AppContext, digest_id: Uuid, error: &str) {
    match ctx
        .repo
        .set_digest_status(digest_id, DigestStatus::Failed, Some(error))
        .await
    {
        Ok(_) => {}
        Err(repository::RepositoryError::Conflict(_)) => {}
        Err(e) => tracing::error!("failed to mark digest {} failed: {}", digest_id, e),
    }
}

/// Flips the digest into the stage's in-progress status on entry. Returns
/// false when the digest is terminal and the job should be dropped.
async fn enter_stage(
    ctx: &AppContext,
    digest_id: Uuid,
    status: DigestStatus,
) -> Result<bool, TransientFailure> {
    match ctx.repo.set_digest_status(digest_id, status, None).await {
        Ok(_) => Ok(true),
        Err(repository::RepositoryError::Conflict(reason)) => {
            tracing::info!("skipping stage for digest {}: {}", digest_id, reason);
            Ok(false)
        }
        Err(e) => Err(TransientFailure(e.to_string())),
    }
}

async fn advance(
    ctx: &AppContext,
    queue: &str,
    digest_id: Uuid,
    payload: serde_json::Value,
) -> Result<(), TransientFailure> {
    ctx.broker
        .enqueue(queue, &format!("{queue}-{digest_id}"), &payload)
        .await
        .map(|_| ())
        .map_err(|e| TransientFailure(e.to_string()))
}

async fn run_cron_tick(ctx: &AppContext) -> StageResult {
    ctx.orchestrator
        .cron_tick()
        .await
        .map(|()| StageOutcome::Ok)
        .map_err(|e| TransientFailure(e.to_string()))
}

async fn run_crawl(ctx: &AppContext, job: &Job) -> StageResult {
    let Some(payload) = parse_payload::<CrawlJob>(job) else {
        return Ok(StageOutcome::Skipped);
    };

    if !enter_stage(ctx, payload.digest_id, DigestStatus::Crawling).await? {
        return Ok(StageOutcome::Skipped);
    }

    let digest = ctx
        .repo
        .find_digest(payload.digest_id)
        .await
        .map_err(|e| TransientFailure(e.to_string()))?;

    let episode_ids = match ctx
        .ingestor
        .crawl_for_user(payload.user_id, digest.week_start)
        .await
    {
        Ok(ids) => ids,
        Err(feed_ingestor::IngestError::NoEpisodes) => {
            return Ok(StageOutcome::StageFailure {
                kind: "no-episodes",
                message: "no episodes found after fallback".to_string(),
            });
        }
        Err(e) => return Err(TransientFailure(e.to_string())),
    };

    advance(
        ctx,
        QUEUE_TRANSCRIBE,
        payload.digest_id,
        serde_json::json!(TranscribeJob {
            digest_id: payload.digest_id,
            episode_ids,
        }),
    )
    .await?;

    Ok(StageOutcome::Ok)
}

/// What the transcribe stage should do after working through its episode
/// list. Pure so the per-item semantics stay pinned by tests.
#[derive(Debug, PartialEq)]
enum TranscribeResolution {
    Advance,
    Retry,
    FailStage,
}

fn resolve_transcription(succeeded: usize, any_transient: bool) -> TranscribeResolution {
    if succeeded > 0 {
        // partial failure is acceptable; the digest continues with what it has
        TranscribeResolution::Advance
    } else if any_transient {
        TranscribeResolution::Retry
    } else {
        TranscribeResolution::FailStage
    }
}

async fn run_transcribe(ctx: &AppContext, job: &Job) -> StageResult {
    let Some(payload) = parse_payload::<TranscribeJob>(job) else {
        return Ok(StageOutcome::Skipped);
    };

    if !enter_stage(ctx, payload.digest_id, DigestStatus::Transcribing).await? {
        return Ok(StageOutcome::Skipped);
    }

    let mut succeeded = Vec::new();
    let mut failures = Vec::new();
    let mut any_transient = false;

    for episode_id in &payload.episode_ids {
        match ctx.transcriber.transcribe(*episode_id).await {
            Ok(()) => succeeded.push(*episode_id),
            Err(e) => {
                any_transient |= e.is_transient();
                failures.push(format!("{episode_id}: {e}"));
            }
        }
    }

    match resolve_transcription(succeeded.len(), any_transient) {
        TranscribeResolution::Advance => {
            advance(
                ctx,
                QUEUE_ANALYZE,
                payload.digest_id,
                serde_json::json!(AnalyzeJob {
                    digest_id: payload.digest_id,
                    episode_ids: succeeded,
                }),
            )
            .await?;

            if failures.is_empty() {
                Ok(StageOutcome::Ok)
            } else {
                Ok(StageOutcome::PerItemFailures(failures))
            }
        }
        TranscribeResolution::Retry => Err(TransientFailure(format!(
            "all {} episodes failed, at least one transiently",
            failures.len()
        ))),
        TranscribeResolution::FailStage => Ok(StageOutcome::StageFailure {
            kind: "no-transcripts",
            message: failures.join("; "),
        }),
    }
}

async fn run_analyze(ctx: &AppContext, job: &Job) -> StageResult {
    let Some(payload) = parse_payload::<AnalyzeJob>(job) else {
        return Ok(StageOutcome::Skipped);
    };

    if !enter_stage(ctx, payload.digest_id, DigestStatus::Analyzing).await? {
        return Ok(StageOutcome::Skipped);
    }

    let digest = ctx
        .repo
        .find_digest(payload.digest_id)
        .await
        .map_err(|e| TransientFailure(e.to_string()))?;
    let config = ctx
        .repo
        .find_config(digest.config_id)
        .await
        .map_err(|e| TransientFailure(e.to_string()))?;

    let clip_ids = match ctx
        .analyzer
        .analyze(payload.digest_id, &payload.episode_ids, &config)
        .await
    {
        Ok(clip_ids) => clip_ids,
        Err(analyzer::AnalyzeError::NoViableClips) => {
            return Ok(StageOutcome::StageFailure {
                kind: "no-viable-clips",
                message: "no candidate region survived selection".to_string(),
            });
        }
        Err(e) if e.is_transient() => return Err(TransientFailure(e.to_string())),
        Err(e) => {
            return Ok(StageOutcome::StageFailure {
                kind: "no-viable-clips",
                message: e.to_string(),
            });
        }
    };

    advance(
        ctx,
        QUEUE_NARRATE,
        payload.digest_id,
        serde_json::json!(NarrateJob {
            digest_id: payload.digest_id,
            clip_ids,
        }),
    )
    .await?;

    Ok(StageOutcome::Ok)
}

async fn run_narrate(ctx: &AppContext, job: &Job) -> StageResult {
    let Some(payload) = parse_payload::<NarrateJob>(job) else {
        return Ok(StageOutcome::Skipped);
    };

    if !enter_stage(ctx, payload.digest_id, DigestStatus::Narrating).await? {
        return Ok(StageOutcome::Skipped);
    }

    let narration_audios = match ctx.narrator.produce_narration(payload.digest_id).await {
        Ok(narration_audios) => narration_audios,
        Err(e) if e.is_transient() => return Err(TransientFailure(e.to_string())),
        Err(e) => {
            return Ok(StageOutcome::StageFailure {
                kind: "missing-narration",
                message: e.to_string(),
            });
        }
    };

    advance(
        ctx,
        QUEUE_ASSEMBLE,
        payload.digest_id,
        serde_json::json!(AssembleJob {
            digest_id: payload.digest_id,
            narration_audios,
        }),
    )
    .await?;

    Ok(StageOutcome::Ok)
}

async fn run_assemble(ctx: &AppContext, job: &Job) -> StageResult {
    let Some(payload) = parse_payload::<AssembleJob>(job) else {
        return Ok(StageOutcome::Skipped);
    };

    if !enter_stage(ctx, payload.digest_id, DigestStatus::Assembling).await? {
        return Ok(StageOutcome::Skipped);
    }

    match ctx
        .assembler
        .assemble(payload.digest_id, &payload.narration_audios)
        .await
    {
        Ok(_output) => {}
        Err(e) if e.is_transient() => return Err(TransientFailure(e.to_string())),
        Err(e) => {
            return Ok(StageOutcome::StageFailure {
                kind: e.stage_error(),
                message: e.to_string(),
            });
        }
    }

    advance(
        ctx,
        QUEUE_DELIVER,
        payload.digest_id,
        serde_json::json!(DeliverJob {
            digest_id: payload.digest_id,
        }),
    )
    .await?;

    Ok(StageOutcome::Ok)
}

async fn run_deliver(ctx: &AppContext, job: &Job) -> StageResult {
    let Some(payload) = parse_payload::<DeliverJob>(job) else {
        return Ok(StageOutcome::Skipped);
    };

    if !enter_stage(ctx, payload.digest_id, DigestStatus::Delivering).await? {
        return Ok(StageOutcome::Skipped);
    }

    match ctx.deliverer.deliver(payload.digest_id).await {
        Ok(()) => {}
        Err(e) if e.is_transient() => return Err(TransientFailure(e.to_string())),
        Err(e) => {
            return Ok(StageOutcome::StageFailure {
                kind: "delivery-failed",
                message: e.to_string(),
            });
        }
    }

    // the only path that completes a digest
    ctx.repo
        .set_digest_status(payload.digest_id, DigestStatus::Completed, None)
        .await
        .map_err(|e| TransientFailure(e.to_string()))?;

    Ok(StageOutcome::Ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_transcription_failure_still_advances() {
        // 5 episodes in, 2 failed permanently: the stage advances with 3
        assert_eq!(
            resolve_transcription(3, false),
            TranscribeResolution::Advance
        );
    }

    #[test]
    fn all_failed_permanently_fails_the_stage() {
        assert_eq!(
            resolve_transcription(0, false),
            TranscribeResolution::FailStage
        );
    }

    #[test]
    fn all_failed_with_a_transient_error_retries() {
        assert_eq!(
            resolve_transcription(0, true),
            TranscribeResolution::Retry
        );
    }

    #[test]
    fn digest_id_is_extracted_from_any_stage_payload() {
        let digest_id = Uuid::new_v4();
        let job = Job {
            id: format!("transcribe-{digest_id}"),
            queue: QUEUE_TRANSCRIBE.to_string(),
            payload: serde_json::json!(TranscribeJob {
                digest_id,
                episode_ids: vec![],
            }),
            attempts: 1,
        };

        assert_eq!(digest_id_of(&job), Some(digest_id));
    }

    #[test]
    fn cron_tick_payload_has_no_digest() {
        let job = Job {
            id: "pipeline-tick-2026080112".to_string(),
            queue: QUEUE_PIPELINE.to_string(),
            payload: serde_json::json!({}),
            attempts: 1,
        };

        assert_eq!(digest_id_of(&job), None);
    }
}
