pub mod feed;

use thiserror::Error;
use uuid::Uuid;

use feed::{FeedChannel, FeedItem};
use object_store::{ObjectStore, StoreError};
use repository::models::Digest;
use repository::Repository;
use types::DeliveryMethod;

/// Cache lifetime of the per-user feed document.
const FEED_CACHE_CONTROL: &str = "max-age=300";

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("repository error: {0}")]
    Repository(#[from] repository::RepositoryError),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}

pub struct Deliverer {
    repo: Repository,
    store: ObjectStore,
    http_client: reqwest::Client,
    /// Optional webhook for push/email side-effect notifications.
    notification_url: Option<String>,
}

impl Deliverer {
    pub fn new(
        repo: Repository,
        store: ObjectStore,
        http_client: reqwest::Client,
        notification_url: Option<String>,
    ) -> Self {
        Self {
            repo,
            store,
            http_client,
            notification_url,
        }
    }

    /// Publishes a finished digest according to the config's delivery
    /// method. Notification failures are best-effort and never fail the
    /// stage; only feed regeneration can.
    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, digest_id: Uuid) -> Result<(), DeliveryError> {
        let digest = self.repo.find_digest(digest_id).await?;
        let config = self.repo.find_config(digest.config_id).await?;

        match config.delivery_method() {
            DeliveryMethod::Syndication => self.regenerate_feed(&digest).await?,
            DeliveryMethod::Push => self.notify(&digest, "push").await,
            DeliveryMethod::Email => self.notify(&digest, "email").await,
            DeliveryMethod::InApp => {
                // the digest row is already queryable; nothing to publish
                tracing::debug!("digest {} delivered in-app", digest_id);
            }
        }

        Ok(())
    }

    /// Rewrites `feeds/{userId}/feed.xml` with every delivered digest of
    /// the user, newest first. The digest being delivered is included even
    /// though its status flips to completed only after this stage returns.
    async fn regenerate_feed(&self, digest: &Digest) -> Result<(), DeliveryError> {
        let mut digests = self
            .repo
            .list_completed_digests_for_user(digest.user_id)
            .await?;

        if !digests.iter().any(|d| d.id == digest.id) {
            digests.push(digest.clone());
        }

        digests.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let items: Vec<FeedItem> = digests
            .iter()
            .filter_map(|d| {
                let audio_object_key = d.audio_object_key.as_ref()?;
                Some(FeedItem {
                    title: d.title.clone(),
                    description: format!("{} clips from your subscriptions", d.clip_count),
                    enclosure_url: self.store.public_url(audio_object_key),
                    pub_date: d.created_at,
                    duration_sec: d.total_duration_sec.unwrap_or(0.0).round() as i64,
                    guid: d.id.to_string(),
                })
            })
            .collect();

        let feed_key = format!("feeds/{}/feed.xml", digest.user_id);
        let channel = FeedChannel {
            title: "Your Weekly Digest".to_string(),
            description: "Personalized highlights from your podcast subscriptions"
                .to_string(),
            link: self.store.public_url(&feed_key),
            language: "en-us".to_string(),
            self_url: self.store.public_url(&feed_key),
            author: "PodDigest".to_string(),
        };

        let xml = feed::render_feed(&channel, &items);

        self.store
            .put(
                &feed_key,
                xml.into_bytes(),
                "application/rss+xml",
                std::collections::HashMap::new(),
                Some(FEED_CACHE_CONTROL),
            )
            .await?;

        tracing::info!(
            "regenerated feed {} with {} items",
            feed_key,
            items.len()
        );

        Ok(())
    }

    /// Side-effect notification, opaque to the pipeline. Best effort.
    async fn notify(&self, digest: &Digest, channel: &str) {
        let Some(url) = &self.notification_url else {
            tracing::debug!("no notification webhook configured, skipping {channel}");
            return;
        };

        let result = self
            .http_client
            .post(url)
            .json(&serde_json::json!({
                "channel": channel,
                "userId": digest.user_id,
                "digestId": digest.id,
                "title": digest.title,
            }))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(
                    "{} notification for digest {} returned {}",
                    channel,
                    digest.id,
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!(
                    "{} notification for digest {} failed: {}",
                    channel,
                    digest.id,
                    e
                );
            }
        }
    }
}
