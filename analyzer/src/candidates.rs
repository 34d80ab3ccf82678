use std::time::Duration;

use openai_dive::v1::api::Client;
use openai_dive::v1::error::APIError;
use openai_dive::v1::resources::chat::{
    ChatCompletionParameters, ChatCompletionResponseFormat, ChatMessage,
    ChatMessageContent,
};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::selection::Candidate;
use types::{ScoreDimensions, TranscriptSegment};

/// Sliding-window construction parameters.
pub const WINDOW_SEC: f64 = 180.0;
pub const WINDOW_STEP_SEC: f64 = 90.0;

/// Transcripts longer than this are scored window-by-window instead of in
/// one whole-episode request.
const WHOLE_EPISODE_LIMIT_SEC: f64 = 2.0 * 3600.0;

/// Rate limiting for window scoring.
const MAX_CONCURRENT_REQUESTS: usize = 5;
const INTER_BATCH_DELAY: Duration = Duration::from_millis(200);

const MAX_LLM_ATTEMPTS: u32 = 3;

#[derive(Error, Debug)]
pub enum CandidateError {
    #[error("scoring request rejected: {0}")]
    Rejected(String),
    #[error("scoring request failed: {0}")]
    Transient(String),
    #[error("unparseable scoring response: {0}")]
    Parse(String),
}

impl CandidateError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CandidateError::Transient(_))
    }
}

#[derive(Debug, Deserialize)]
struct RegionList {
    #[serde(default)]
    regions: Vec<RawRegion>,
}

#[derive(Debug, Deserialize)]
struct RawRegion {
    start_sec: f64,
    end_sec: f64,
    insight_density: i64,
    emotional_intensity: i64,
    actionability: i64,
    topical_relevance: i64,
    conversational_quality: i64,
}

pub struct CandidateGenerator {
    client: Client,
    model: String,
}

impl CandidateGenerator {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: Client::new(api_key),
            model,
        }
    }

    /// Builds the scored candidate regions for one episode's transcript.
    ///
    /// Short transcripts go out as a single whole-episode solicit; long
    /// ones are scored as overlapping windows in bounded-parallel batches.
    /// A window whose scoring ultimately fails is dropped, not fatal.
    #[tracing::instrument(skip(self, segments))]
    pub async fn candidates_for_episode(
        &self,
        episode_id: Uuid,
        segments: &[TranscriptSegment],
        episode_duration_sec: f64,
    ) -> Result<Vec<Candidate>, CandidateError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        if episode_duration_sec <= WHOLE_EPISODE_LIMIT_SEC {
            let prompt = whole_episode_prompt(segments);
            let regions = self.solicit_regions(&prompt).await?;
            return Ok(to_candidates(episode_id, regions, episode_duration_sec));
        }

        let windows = windows(episode_duration_sec);
        let mut candidates = Vec::new();

        for batch in windows.chunks(MAX_CONCURRENT_REQUESTS) {
            let requests = batch.iter().map(|(win_start, win_end)| {
                let prompt = window_prompt(segments, *win_start, *win_end);
                async move {
                    match self.solicit_regions(&prompt).await {
                        Ok(regions) => regions,
                        Err(e) => {
                            // per-window failure: drop the region
                            tracing::warn!(
                                "window {}..{} scoring dropped: {}",
                                win_start,
                                win_end,
                                e
                            );
                            Vec::new()
                        }
                    }
                }
            });

            for regions in futures::future::join_all(requests).await {
                candidates.extend(to_candidates(episode_id, regions, episode_duration_sec));
            }

            tokio::time::sleep(INTER_BATCH_DELAY).await;
        }

        Ok(candidates)
    }

    async fn solicit_regions(&self, prompt: &str) -> Result<Vec<RawRegion>, CandidateError> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.request_once(prompt).await {
                Ok(regions) => return Ok(regions),
                Err(e) if e.is_transient() && attempt < MAX_LLM_ATTEMPTS => {
                    let delay = Duration::from_millis(500 * 2_u64.pow(attempt - 1));
                    tracing::warn!(
                        "scoring attempt {} failed ({}), retrying in {:?}",
                        attempt,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(&self, prompt: &str) -> Result<Vec<RawRegion>, CandidateError> {
        let parameters = ChatCompletionParameters {
            model: self.model.clone(),
            response_format: Some(ChatCompletionResponseFormat::JsonObject),
            messages: vec![
                ChatMessage::System {
                    name: None,
                    content: ChatMessageContent::Text(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage::User {
                    name: None,
                    content: ChatMessageContent::Text(prompt.to_string()),
                },
            ],
            ..Default::default()
        };

        let response = match self.client.chat().create(parameters).await {
            Ok(response) => response,
            Err(e) => {
                return Err(match e {
                    APIError::InvalidRequestError(message) => {
                        CandidateError::Rejected(message)
                    }
                    other => CandidateError::Transient(other.to_string()),
                });
            }
        };

        let text = match response.choices.first() {
            Some(choice) => match &choice.message {
                ChatMessage::Assistant {
                    content: Some(ChatMessageContent::Text(text)),
                    ..
                } => text.clone(),
                _ => {
                    return Err(CandidateError::Parse(
                        "no text content in completion".to_string(),
                    ))
                }
            },
            None => {
                return Err(CandidateError::Parse("no choices in completion".to_string()))
            }
        };

        parse_regions(&text)
    }
}

const SYSTEM_PROMPT: &str = "You score podcast transcript regions for a weekly \
highlight digest. Respond with a JSON object of the form {\"regions\": [...]}; \
each region has start_sec, end_sec and integer 0-100 scores for \
insight_density, emotional_intensity, actionability, topical_relevance and \
conversational_quality. Pick self-contained passages that stand on their own.";

fn whole_episode_prompt(segments: &[TranscriptSegment]) -> String {
    let mut prompt = String::from(
        "Identify the 10-15 strongest candidate regions in this episode \
transcript and score each.\n\nTranscript:\n",
    );
    prompt.push_str(&timestamped_transcript(segments));
    prompt
}

fn window_prompt(segments: &[TranscriptSegment], win_start: f64, win_end: f64) -> String {
    let in_window: Vec<TranscriptSegment> = segments
        .iter()
        .filter(|s| s.start_sec < win_end && s.end_sec > win_start)
        .cloned()
        .collect();

    format!(
        "Score the passage between {win_start:.0}s and {win_end:.0}s as a digest \
candidate region; you may tighten the bounds to the strongest span inside \
it.\n\nTranscript:\n{}",
        timestamped_transcript(&in_window)
    )
}

/// Timestamp-prefixed transcript rendering shared by both prompts.
fn timestamped_transcript(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| match &s.speaker_tag {
            Some(tag) => format!(
                "[{:.1}-{:.1}] ({}) {}",
                s.start_sec, s.end_sec, tag, s.text
            ),
            None => format!("[{:.1}-{:.1}] {}", s.start_sec, s.end_sec, s.text),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Overlapping (start, end) windows of W=180s advanced by S=90s covering
/// the whole episode.
pub fn windows(duration_sec: f64) -> Vec<(f64, f64)> {
    let mut out = Vec::new();
    let mut start = 0.0;

    while start < duration_sec {
        out.push((start, (start + WINDOW_SEC).min(duration_sec)));
        start += WINDOW_STEP_SEC;
    }

    out
}

fn parse_regions(text: &str) -> Result<Vec<RawRegion>, CandidateError> {
    let list: RegionList =
        serde_json::from_str(text).map_err(|e| CandidateError::Parse(e.to_string()))?;
    Ok(list.regions)
}

fn to_candidates(
    episode_id: Uuid,
    regions: Vec<RawRegion>,
    episode_duration_sec: f64,
) -> Vec<Candidate> {
    regions
        .into_iter()
        .filter_map(|r| {
            let start_sec = r.start_sec.max(0.0);
            let end_sec = r.end_sec.min(episode_duration_sec);
            if end_sec <= start_sec {
                return None;
            }

            Some(Candidate {
                episode_id,
                start_sec,
                end_sec,
                dimensions: ScoreDimensions::new(
                    r.insight_density,
                    r.emotional_intensity,
                    r.actionability,
                    r.topical_relevance,
                    r.conversational_quality,
                ),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn windows_overlap_and_cover() {
        let w = windows(400.0);
        assert_eq!(
            w,
            vec![(0.0, 180.0), (90.0, 270.0), (180.0, 360.0), (270.0, 400.0), (360.0, 400.0)]
        );
    }

    #[test]
    fn parses_region_response() {
        let text = r#"{"regions": [
            {"start_sec": 120.0, "end_sec": 420.0, "insight_density": 80,
             "emotional_intensity": 60, "actionability": 70,
             "topical_relevance": 75, "conversational_quality": 65}
        ]}"#;

        let regions = parse_regions(text).unwrap();
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].insight_density, 80);
    }

    #[test]
    fn malformed_response_is_a_parse_error() {
        assert!(parse_regions("not json").is_err());
        assert!(!parse_regions("not json").unwrap_err().is_transient());
    }

    #[test]
    fn candidates_are_clamped_to_episode_bounds() {
        let episode_id = Uuid::new_v4();
        let regions = vec![
            RawRegion {
                start_sec: -5.0,
                end_sec: 100.0,
                insight_density: 150,
                emotional_intensity: 50,
                actionability: 50,
                topical_relevance: 50,
                conversational_quality: 50,
            },
            RawRegion {
                start_sec: 3500.0,
                end_sec: 3700.0,
                insight_density: 50,
                emotional_intensity: 50,
                actionability: 50,
                topical_relevance: 50,
                conversational_quality: 50,
            },
            RawRegion {
                start_sec: 400.0,
                end_sec: 300.0,
                insight_density: 50,
                emotional_intensity: 50,
                actionability: 50,
                topical_relevance: 50,
                conversational_quality: 50,
            },
        ];

        let candidates = to_candidates(episode_id, regions, 3600.0);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].start_sec, 0.0);
        assert_eq!(candidates[0].dimensions.insight_density, 100);
        assert_eq!(candidates[1].end_sec, 3600.0);
    }

    #[test]
    fn transcript_rendering_is_timestamp_prefixed() {
        let segments = vec![TranscriptSegment {
            start_sec: 0.0,
            end_sec: 4.5,
            speaker_tag: Some("speaker_0".to_string()),
            text: "Welcome back.".to_string(),
        }];

        assert_eq!(
            timestamped_transcript(&segments),
            "[0.0-4.5] (speaker_0) Welcome back."
        );
    }
}
