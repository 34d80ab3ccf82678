use figment::{providers::Env, Figment};
use figment_file_provider_adapter::FileAdapter;
use redact::Secret;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub database_url: Secret<String>,
    pub redis_url: String,

    pub bucket: String,
    pub public_cdn_domain: String,

    // `OPENAI_KEY_PATH` is the name of the environment variable
    pub openai_key: Secret<String>,
    pub openai_model: String,

    pub stt_api_url: String,
    // `STT_API_KEY_PATH` is the name of the environment variable
    pub stt_api_key: Secret<String>,

    pub tts_api_url: String,
    // `TTS_API_KEY_PATH` is the name of the environment variable
    pub tts_api_key: Secret<String>,

    pub notification_webhook_url: Option<String>,

    pub http_client_agent: String,

    pub queue_max_attempts: u32,

    pub crawl_workers: usize,
    pub transcribe_workers: usize,
    pub analyze_workers: usize,
    pub narrate_workers: usize,
    pub assemble_workers: usize,
    pub deliver_workers: usize,
    pub pipeline_workers: usize,
}

/// The environment figment with secret-file indirection (`*_PATH`
/// variables) and the deploy defaults joined in.
pub fn figment() -> Figment {
    Figment::new()
        .merge(FileAdapter::wrap(Env::raw()))
        .join(("openai_model", "gpt-4o"))
        .join(("http_client_agent", "pod-digest-pipeline/0.1"))
        .join(("queue_max_attempts", 5))
        .join(("crawl_workers", 2))
        .join(("transcribe_workers", 2))
        .join(("analyze_workers", 2))
        .join(("narrate_workers", 2))
        .join(("assemble_workers", 1))
        .join(("deliver_workers", 2))
        .join(("pipeline_workers", 1))
}

pub fn load_config() -> Result<Config, figment::Error> {
    figment().extract()
}
