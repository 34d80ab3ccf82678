use serde::Deserialize;
use thiserror::Error;

use types::TranscriptSegment;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ProviderError {
    /// 429 and 5xx responses (and plain transport failures) are worth a
    /// queue-level retry; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(e) => e.is_timeout() || e.is_connect(),
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Parse(_) => false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub transcript: Option<String>,

    #[serde(default)]
    pub utterances: Vec<Utterance>,

    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,

    #[serde(default)]
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Utterance {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub speaker: Option<u32>,
    pub transcript: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paragraph {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub speaker: Option<u32>,
    #[serde(default)]
    pub sentences: Vec<Sentence>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Sentence {
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Word {
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub speaker: Option<u32>,
    pub word: String,
}

/// Thin driver over the diarizing speech-to-text provider. The audio is
/// never fetched locally; the provider pulls the episode url itself.
pub struct SpeechProvider {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SpeechProvider {
    pub fn new(http_client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http_client,
            base_url,
            api_key,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn transcribe_url(
        &self,
        audio_url: &str,
    ) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .http_client
            .post(&self.base_url)
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&serde_json::json!({
                "url": audio_url,
                "diarize": true,
                "utterances": true,
                "punctuate": true,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn speaker_tag(speaker: Option<u32>) -> Option<String> {
    speaker.map(|s| format!("speaker_{s}"))
}

/// Normalizes a provider response into ordered transcript segments.
///
/// Three strategies are tried in priority order and the first that yields
/// at least one segment wins: provider utterances, paragraph groupings,
/// then coalesced same-speaker word runs.
pub fn normalize_segments(response: &ProviderResponse) -> Vec<TranscriptSegment> {
    let from_utterances: Vec<TranscriptSegment> = response
        .utterances
        .iter()
        .filter(|u| !u.transcript.trim().is_empty())
        .map(|u| TranscriptSegment {
            start_sec: u.start,
            end_sec: u.end,
            speaker_tag: speaker_tag(u.speaker),
            text: u.transcript.trim().to_string(),
        })
        .collect();

    if !from_utterances.is_empty() {
        return from_utterances;
    }

    let from_paragraphs: Vec<TranscriptSegment> = response
        .paragraphs
        .iter()
        .filter_map(|p| {
            let text = p
                .sentences
                .iter()
                .map(|s| s.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            if text.trim().is_empty() {
                return None;
            }

            Some(TranscriptSegment {
                start_sec: p.start,
                end_sec: p.end,
                speaker_tag: speaker_tag(p.speaker),
                text,
            })
        })
        .collect();

    if !from_paragraphs.is_empty() {
        return from_paragraphs;
    }

    coalesce_words(&response.words)
}

/// Fallback strategy: runs of consecutive words with the same speaker tag
/// collapse into one segment each.
fn coalesce_words(words: &[Word]) -> Vec<TranscriptSegment> {
    let mut segments: Vec<TranscriptSegment> = Vec::new();

    for word in words {
        let text = word.word.trim();
        if text.is_empty() {
            continue;
        }

        let tag = speaker_tag(word.speaker);

        match segments.last_mut() {
            Some(last) if last.speaker_tag == tag => {
                last.end_sec = word.end;
                last.text.push(' ');
                last.text.push_str(text);
            }
            _ => segments.push(TranscriptSegment {
                start_sec: word.start,
                end_sec: word.end,
                speaker_tag: tag,
                text: text.to_string(),
            }),
        }
    }

    segments
}

/// Full text of the transcript: the provider's own rendering when present,
/// otherwise the segment texts joined.
pub fn full_text(response: &ProviderResponse, segments: &[TranscriptSegment]) -> String {
    if let Some(transcript) = &response.transcript {
        if !transcript.trim().is_empty() {
            return transcript.trim().to_string();
        }
    }

    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn utterances_win_over_other_strategies() {
        let response: ProviderResponse = serde_json::from_str(
            r#"{
                "language": "en",
                "utterances": [
                    {"start": 0.0, "end": 5.5, "speaker": 0, "transcript": "Hello there."},
                    {"start": 5.5, "end": 9.0, "speaker": 1, "transcript": "Hi."}
                ],
                "words": [
                    {"start": 0.0, "end": 0.4, "speaker": 0, "word": "Hello"}
                ]
            }"#,
        )
        .unwrap();

        let segments = normalize_segments(&response);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "Hello there.");
        assert_eq!(segments[0].speaker_tag.as_deref(), Some("speaker_0"));
        assert_eq!(segments[1].speaker_tag.as_deref(), Some("speaker_1"));
    }

    #[test]
    fn paragraphs_are_second_choice() {
        let response: ProviderResponse = serde_json::from_str(
            r#"{
                "paragraphs": [
                    {
                        "start": 0.0,
                        "end": 12.0,
                        "speaker": 0,
                        "sentences": [{"text": "First sentence."}, {"text": "Second one."}]
                    }
                ]
            }"#,
        )
        .unwrap();

        let segments = normalize_segments(&response);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "First sentence. Second one.");
        assert_eq!(segments[0].end_sec, 12.0);
    }

    #[test]
    fn word_runs_coalesce_by_speaker() {
        let response: ProviderResponse = serde_json::from_str(
            r#"{
                "words": [
                    {"start": 0.0, "end": 0.4, "speaker": 0, "word": "Hello"},
                    {"start": 0.4, "end": 0.9, "speaker": 0, "word": "there"},
                    {"start": 1.0, "end": 1.2, "speaker": 1, "word": "Hi"},
                    {"start": 1.3, "end": 1.8, "speaker": 0, "word": "Welcome"}
                ]
            }"#,
        )
        .unwrap();

        let segments = normalize_segments(&response);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].text, "Hello there");
        assert_eq!(segments[0].start_sec, 0.0);
        assert_eq!(segments[0].end_sec, 0.9);
        assert_eq!(segments[1].text, "Hi");
        assert_eq!(segments[2].text, "Welcome");
    }

    #[test]
    fn empty_response_yields_no_segments() {
        let response: ProviderResponse = serde_json::from_str("{}").unwrap();
        assert!(normalize_segments(&response).is_empty());
    }

    #[test]
    fn full_text_prefers_provider_transcript() {
        let response: ProviderResponse = serde_json::from_str(
            r#"{"transcript": "The whole thing.", "utterances": [
                {"start": 0.0, "end": 1.0, "transcript": "The whole"},
                {"start": 1.0, "end": 2.0, "transcript": "thing."}
            ]}"#,
        )
        .unwrap();

        let segments = normalize_segments(&response);
        assert_eq!(full_text(&response, &segments), "The whole thing.");

        let bare: ProviderResponse = serde_json::from_str(
            r#"{"utterances": [
                {"start": 0.0, "end": 1.0, "transcript": "Joined"},
                {"start": 1.0, "end": 2.0, "transcript": "up."}
            ]}"#,
        )
        .unwrap();
        let segments = normalize_segments(&bare);
        assert_eq!(full_text(&bare, &segments), "Joined up.");
    }
}
