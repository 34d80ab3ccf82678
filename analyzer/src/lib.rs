pub mod candidates;
pub mod selection;

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use candidates::{CandidateError, CandidateGenerator};
use repository::models::{DigestConfig, NewDigestClip};
use repository::Repository;
use selection::{Candidate, SelectionParams};

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("no-viable-clips")]
    NoViableClips,
    #[error("candidate generation failed: {0}")]
    Candidates(#[from] CandidateError),
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
}

impl AnalyzeError {
    pub fn is_transient(&self) -> bool {
        match self {
            AnalyzeError::Candidates(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub struct Analyzer {
    repo: Repository,
    generator: CandidateGenerator,
}

impl Analyzer {
    pub fn new(repo: Repository, generator: CandidateGenerator) -> Self {
        Self { repo, generator }
    }

    /// Scores the transcripts of the given episodes, selects the final
    /// clip set under the config's constraints, and persists it as the
    /// digest's ordered clip list. Returns the clip ids in position order.
    #[tracing::instrument(skip(self, config))]
    pub async fn analyze(
        &self,
        digest_id: Uuid,
        episode_ids: &[Uuid],
        config: &DigestConfig,
    ) -> Result<Vec<Uuid>, AnalyzeError> {
        let episodes = self.repo.find_episodes(episode_ids).await?;

        let mut podcast_titles: HashMap<Uuid, String> = HashMap::new();
        let mut all_candidates: Vec<Candidate> = Vec::new();

        for episode in &episodes {
            let Some(transcript) = self.repo.find_completed_transcript(episode.id).await?
            else {
                tracing::debug!("episode {} has no completed transcript", episode.id);
                continue;
            };

            let segments = transcript.segments();
            let duration_sec = episode
                .duration_sec
                .map(f64::from)
                .or_else(|| segments.last().map(|s| s.end_sec))
                .unwrap_or(0.0);

            let episode_candidates = match self
                .generator
                .candidates_for_episode(episode.id, &segments, duration_sec)
                .await
            {
                Ok(candidates) => candidates,
                Err(e) if e.is_transient() => return Err(e.into()),
                Err(e) => {
                    // per-episode scoring failure drops the episode
                    tracing::warn!("dropping episode {} from analysis: {}", episode.id, e);
                    continue;
                }
            };

            tracing::info!(
                "episode {}: {} candidate regions",
                episode.id,
                episode_candidates.len()
            );

            all_candidates.extend(episode_candidates);

            if let Ok(podcast) = self.repo.find_podcast(episode.podcast_id).await {
                podcast_titles.insert(episode.id, podcast.title);
            }
        }

        let params = SelectionParams {
            target_length_minutes: config.target_length_minutes.max(0) as u32,
            clip_length_preference: config.clip_length_preference(),
            breadth_depth: config.breadth_depth.clamp(0, 100) as u32,
        };

        let selected = selection::select(&all_candidates, params);
        let ordered = selection::order(selected, config.structure(), &podcast_titles);

        if ordered.is_empty() {
            return Err(AnalyzeError::NoViableClips);
        }

        // re-running the stage replaces any previously persisted clip set
        self.repo.clear_clips(digest_id).await?;

        let mut clip_ids = Vec::with_capacity(ordered.len());

        for (position, candidate) in ordered.iter().enumerate() {
            let clip = self
                .repo
                .append_clip(NewDigestClip {
                    digest_id,
                    episode_id: candidate.episode_id,
                    start_sec: candidate.start_sec,
                    end_sec: candidate.end_sec,
                    score: candidate.score(),
                    score_dimensions: serde_json::json!(candidate.dimensions),
                    position: position as i32,
                })
                .await?;
            clip_ids.push(clip.id);
        }

        self.repo
            .set_clip_count(digest_id, clip_ids.len() as i32)
            .await?;

        tracing::info!("digest {}: selected {} clips", digest_id, clip_ids.len());

        Ok(clip_ids)
    }
}
