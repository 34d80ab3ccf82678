pub mod script;
pub mod tts;

use std::collections::HashMap;

use openai_dive::v1::api::Client;
use openai_dive::v1::error::APIError;
use openai_dive::v1::resources::chat::{
    ChatCompletionParameters, ChatMessage, ChatMessageContent,
};
use thiserror::Error;
use uuid::Uuid;

use object_store::{ObjectStore, StoreError};
use repository::Repository;
use script::{ClipContext, MissingNarration};
use tts::{TtsError, TtsProvider};
use types::NarrationAudio;

#[derive(Error, Debug)]
pub enum NarrationError {
    #[error("missing-narration")]
    MissingNarration(#[from] MissingNarration),
    #[error("script generation rejected: {0}")]
    LlmRejected(String),
    #[error("script generation failed: {0}")]
    LlmTransient(String),
    #[error("synthesis failed: {0}")]
    Tts(#[from] TtsError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
}

impl NarrationError {
    pub fn is_transient(&self) -> bool {
        match self {
            NarrationError::LlmTransient(_) => true,
            NarrationError::Tts(e) => e.is_transient(),
            NarrationError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub struct Narrator {
    repo: Repository,
    store: ObjectStore,
    llm_client: Client,
    llm_model: String,
    tts: TtsProvider,
}

impl Narrator {
    pub fn new(
        repo: Repository,
        store: ObjectStore,
        llm_api_key: String,
        llm_model: String,
        tts: TtsProvider,
    ) -> Self {
        Self {
            repo,
            store,
            llm_client: Client::new(llm_api_key),
            llm_model,
            tts,
        }
    }

    /// Generates and synthesizes the N+2 narration segments for a digest:
    /// intro, one transition per clip, outro. Scripts come from a single
    /// LLM call; synthesis runs sequentially against the TTS provider.
    #[tracing::instrument(skip(self))]
    pub async fn produce_narration(
        &self,
        digest_id: Uuid,
    ) -> Result<Vec<NarrationAudio>, NarrationError> {
        let digest = self.repo.find_digest(digest_id).await?;
        let config = self.repo.find_config(digest.config_id).await?;
        let clips = self.repo.find_clips(digest_id).await?;

        if clips.is_empty() {
            return Err(MissingNarration.into());
        }

        let mut podcast_titles: HashMap<Uuid, String> = HashMap::new();
        let mut contexts = Vec::with_capacity(clips.len());

        for clip in &clips {
            let episode = self.repo.find_episode(clip.episode_id).await?;
            let podcast_title = match podcast_titles.get(&episode.podcast_id) {
                Some(title) => title.clone(),
                None => {
                    let podcast = self.repo.find_podcast(episode.podcast_id).await?;
                    podcast_titles.insert(episode.podcast_id, podcast.title.clone());
                    podcast.title
                }
            };

            contexts.push(ClipContext {
                podcast_title,
                episode_title: episode.title,
            });
        }

        let prompt = script::build_prompt(config.narration_depth(), &contexts);
        let response = self.generate_scripts(&prompt).await?;
        let scripts = script::split_scripts(&response, clips.len())?;

        let mut narration_audios = Vec::with_capacity(scripts.len());

        for (position, text) in scripts.iter().enumerate() {
            let kind = script::kind_for_position(position, clips.len());

            let synthesis = self.tts.synthesize(&config.voice_id, text).await?;

            let object_key = format!(
                "digests/{digest_id}/narration/{position}-{}.mp3",
                kind.as_str()
            );

            self.store
                .put(&object_key, synthesis.audio, "audio/mpeg", HashMap::new(), None)
                .await?;

            let duration_sec = synthesis
                .duration_sec
                .unwrap_or_else(|| script::estimate_duration_sec(text));

            narration_audios.push(NarrationAudio {
                position: position as u32,
                kind,
                object_key,
                duration_sec,
            });
        }

        tracing::info!(
            "digest {}: produced {} narration segments",
            digest_id,
            narration_audios.len()
        );

        Ok(narration_audios)
    }

    async fn generate_scripts(&self, prompt: &str) -> Result<String, NarrationError> {
        let parameters = ChatCompletionParameters {
            model: self.llm_model.clone(),
            messages: vec![
                ChatMessage::System {
                    name: None,
                    content: ChatMessageContent::Text(
                        "You are the narrator of a personal weekly podcast digest. \
Warm, concise, spoken register; never mention that you are an AI."
                            .to_string(),
                    ),
                },
                ChatMessage::User {
                    name: None,
                    content: ChatMessageContent::Text(prompt.to_string()),
                },
            ],
            ..Default::default()
        };

        let response = match self.llm_client.chat().create(parameters).await {
            Ok(response) => response,
            Err(e) => {
                return Err(match e {
                    APIError::InvalidRequestError(message) => {
                        NarrationError::LlmRejected(message)
                    }
                    other => NarrationError::LlmTransient(other.to_string()),
                });
            }
        };

        match response.choices.first() {
            Some(choice) => match &choice.message {
                ChatMessage::Assistant {
                    content: Some(ChatMessageContent::Text(text)),
                    ..
                } => Ok(text.clone()),
                _ => Err(MissingNarration.into()),
            },
            None => Err(MissingNarration.into()),
        }
    }
}
