use pd_app::ContextProvider;

use analyzer::candidates::CandidateGenerator;
use analyzer::Analyzer;
use assembler::source::HttpClipSource;
use assembler::Assembler;
use deliverer::Deliverer;
use feed_ingestor::FeedIngestor;
use narrator::tts::TtsProvider;
use narrator::Narrator;
use object_store::ObjectStore;
use queue_broker::QueueBroker;
use repository::Repository;
use transcriber::provider::SpeechProvider;
use transcriber::Transcriber;

use crate::config::Config;
use crate::orchestrator::Orchestrator;

/// Everything a worker needs, constructed once at startup and shared
/// through an Arc. No process-wide singletons.
pub struct AppContext {
    pub config: Config,
    pub repo: Repository,
    pub broker: QueueBroker,
    pub store: ObjectStore,
    pub orchestrator: Orchestrator,
    pub ingestor: FeedIngestor,
    pub transcriber: Transcriber,
    pub analyzer: Analyzer,
    pub narrator: Narrator,
    pub assembler: Assembler<HttpClipSource>,
    pub deliverer: Deliverer,
}

impl ContextProvider<Config> for AppContext {
    async fn new(config: Config, aws_config: aws_config::SdkConfig) -> Self {
        let pool = repository::create_pool(config.database_url.expose_secret())
            .await
            .expect("failed to create database pool");
        let repo = Repository::new(pool);

        let broker = QueueBroker::new(&config.redis_url, config.queue_max_attempts)
            .expect("failed to open redis client");

        let store = ObjectStore::new(
            &aws_config,
            config.bucket.clone(),
            config.public_cdn_domain.clone(),
        );

        let http_client = reqwest::Client::builder()
            .user_agent(config.http_client_agent.clone())
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("failed to build http client");

        let orchestrator = Orchestrator::new(repo.clone(), broker.clone());

        let ingestor = FeedIngestor::new(repo.clone(), http_client.clone());

        let transcriber = Transcriber::new(
            repo.clone(),
            SpeechProvider::new(
                http_client.clone(),
                config.stt_api_url.clone(),
                config.stt_api_key.expose_secret().clone(),
            ),
        );

        let analyzer = Analyzer::new(
            repo.clone(),
            CandidateGenerator::new(
                config.openai_key.expose_secret().clone(),
                config.openai_model.clone(),
            ),
        );

        let narrator = Narrator::new(
            repo.clone(),
            store.clone(),
            config.openai_key.expose_secret().clone(),
            config.openai_model.clone(),
            TtsProvider::new(
                http_client.clone(),
                config.tts_api_url.clone(),
                config.tts_api_key.expose_secret().clone(),
            ),
        );

        let assembler = Assembler::new(
            repo.clone(),
            store.clone(),
            HttpClipSource::new(http_client.clone()),
        );

        let deliverer = Deliverer::new(
            repo.clone(),
            store.clone(),
            http_client,
            config.notification_webhook_url.clone(),
        );

        Self {
            config,
            repo,
            broker,
            store,
            orchestrator,
            ingestor,
            transcriber,
            analyzer,
            narrator,
            assembler,
            deliverer,
        }
    }
}
