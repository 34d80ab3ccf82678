use std::future::Future;
use std::path::Path;

use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use object_store::{ObjectStore, StoreError};
use repository::models::Episode;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("fetch returned status {0}")]
    Status(u16),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where clip source audio comes from. Deployments either stream from the
/// episode's original url or read a cached copy out of the object store;
/// the assembly is identical either way.
pub trait ClipSource {
    fn fetch(
        &self,
        episode: &Episode,
        dest: &Path,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}

/// Streams the episode audio from its original url straight to disk.
pub struct HttpClipSource {
    http_client: reqwest::Client,
}

impl HttpClipSource {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

impl ClipSource for HttpClipSource {
    async fn fetch(&self, episode: &Episode, dest: &Path) -> Result<(), SourceError> {
        let response = self.http_client.get(&episode.audio_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }

        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(dest).await?;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        Ok(())
    }
}

/// Reads a cached copy at `episodes/{episodeId}/audio.mp3`.
pub struct StoreClipSource {
    store: ObjectStore,
}

impl StoreClipSource {
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }
}

impl ClipSource for StoreClipSource {
    async fn fetch(&self, episode: &Episode, dest: &Path) -> Result<(), SourceError> {
        let key = format!("episodes/{}/audio.mp3", episode.id);
        self.store.download_to_file(&key, dest).await?;
        Ok(())
    }
}
