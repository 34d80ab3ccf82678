use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl TtsError {
    pub fn is_transient(&self) -> bool {
        match self {
            TtsError::Request(e) => e.is_timeout() || e.is_connect(),
            TtsError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

pub struct Synthesis {
    pub audio: Vec<u8>,
    /// Reported by some providers; callers fall back to a word-rate
    /// estimate when absent.
    pub duration_sec: Option<f64>,
}

/// Thin driver over the text-to-speech provider. One request per script,
/// voice selected by the config's voice id.
pub struct TtsProvider {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TtsProvider {
    pub fn new(http_client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            http_client,
            base_url,
            api_key,
        }
    }

    #[tracing::instrument(skip(self, text))]
    pub async fn synthesize(&self, voice_id: &str, text: &str) -> Result<Synthesis, TtsError> {
        let response = self
            .http_client
            .post(format!("{}/{}", self.base_url, voice_id))
            .header("xi-api-key", &self.api_key)
            .json(&serde_json::json!({
                "text": text,
                "output_format": "mp3_44100_128",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let duration_sec = response
            .headers()
            .get("x-audio-duration-sec")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok());

        let audio = response.bytes().await?.to_vec();

        Ok(Synthesis {
            audio,
            duration_sec,
        })
    }
}
