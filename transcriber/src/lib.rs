pub mod provider;

use thiserror::Error;
use uuid::Uuid;

use provider::{ProviderError, SpeechProvider};
use repository::Repository;
use types::{TranscriptSegment, TranscriptStatus};

#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("empty-transcript")]
    EmptyTranscript,
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
}

impl TranscribeError {
    pub fn is_transient(&self) -> bool {
        match self {
            TranscribeError::Provider(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub struct Transcriber {
    repo: Repository,
    provider: SpeechProvider,
}

impl Transcriber {
    pub fn new(repo: Repository, provider: SpeechProvider) -> Self {
        Self { repo, provider }
    }

    /// Obtains a diarized transcript for one episode. Idempotent: a
    /// completed transcript short-circuits, so re-delivered queue jobs are
    /// harmless.
    #[tracing::instrument(skip(self))]
    pub async fn transcribe(&self, episode_id: Uuid) -> Result<(), TranscribeError> {
        if self
            .repo
            .find_completed_transcript(episode_id)
            .await?
            .is_some()
        {
            tracing::debug!("episode {} already transcribed", episode_id);
            return Ok(());
        }

        let episode = self.repo.find_episode(episode_id).await?;

        self.repo
            .set_transcript_status(episode_id, TranscriptStatus::Processing)
            .await?;

        let response = match self.provider.transcribe_url(&episode.audio_url).await {
            Ok(response) => response,
            Err(e) => {
                // transient errors bubble up for the queue to retry; the
                // episode stays `processing` until attempts are exhausted
                if !e.is_transient() {
                    self.mark_failed(episode_id, &e.to_string()).await?;
                }
                return Err(e.into());
            }
        };

        let mut segments = provider::normalize_segments(&response);

        if segments.is_empty() {
            self.mark_failed(episode_id, "empty-transcript").await?;
            return Err(TranscribeError::EmptyTranscript);
        }

        if let Some(duration) = episode.duration_sec {
            clamp_segments(&mut segments, f64::from(duration));
        }

        let text = provider::full_text(&response, &segments);

        self.repo
            .store_transcript(episode_id, &text, &segments, response.language.as_deref())
            .await?;
        self.repo
            .set_transcript_status(episode_id, TranscriptStatus::Completed)
            .await?;

        tracing::info!(
            "transcribed episode {}: {} segments",
            episode_id,
            segments.len()
        );

        Ok(())
    }

    async fn mark_failed(
        &self,
        episode_id: Uuid,
        reason: &str,
    ) -> Result<(), TranscribeError> {
        self.repo.mark_transcript_failed(episode_id, reason).await?;
        self.repo
            .set_transcript_status(episode_id, TranscriptStatus::Failed)
            .await?;
        Ok(())
    }
}

/// Provider timestamps occasionally overshoot the episode's declared
/// duration; segment ends are clamped so downstream clip bounds stay valid.
fn clamp_segments(segments: &mut [TranscriptSegment], duration_sec: f64) {
    for segment in segments.iter_mut() {
        if segment.end_sec > duration_sec {
            segment.end_sec = duration_sec;
        }
        if segment.start_sec > segment.end_sec {
            segment.start_sec = segment.end_sec;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_overshooting_segments() {
        let mut segments = vec![
            TranscriptSegment {
                start_sec: 0.0,
                end_sec: 100.0,
                speaker_tag: None,
                text: "ok".to_string(),
            },
            TranscriptSegment {
                start_sec: 3590.0,
                end_sec: 3620.5,
                speaker_tag: None,
                text: "overshoots".to_string(),
            },
        ];

        clamp_segments(&mut segments, 3600.0);

        assert_eq!(segments[0].end_sec, 100.0);
        assert_eq!(segments[1].end_sec, 3600.0);
        assert!(segments[1].start_sec <= segments[1].end_sec);
    }
}
