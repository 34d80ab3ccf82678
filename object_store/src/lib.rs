use std::collections::HashMap;
use std::path::Path;

use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("store error: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

fn classify_sdk_error<E>(err: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    match &err {
        SdkError::ServiceError(context) => {
            let status = context.raw().status().as_u16();
            if status == 404 {
                StoreError::NotFound
            } else if status == 429 || status >= 500 {
                StoreError::Transient(err.to_string())
            } else {
                StoreError::Fatal(err.to_string())
            }
        }
        SdkError::TimeoutError(_)
        | SdkError::DispatchFailure(_)
        | SdkError::ResponseError(_) => StoreError::Transient(err.to_string()),
        _ => StoreError::Fatal(err.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: i64,
    pub content_type: Option<String>,
}

/// Thin facade over the digest bucket. Keys are flat strings; layout is
/// dictated by callers.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_domain: String,
}

impl ObjectStore {
    pub fn new(
        aws_config: &aws_config::SdkConfig,
        bucket: String,
        public_domain: String,
    ) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(aws_config),
            bucket,
            public_domain,
        }
    }

    #[tracing::instrument(skip(self, bytes))]
    pub async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        metadata: HashMap<String, String>,
        cache_control: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes));

        if let Some(cache_control) = cache_control {
            request = request.cache_control(cache_control);
        }

        for (name, value) in metadata {
            request = request.metadata(name, value);
        }

        request.send().await.map_err(classify_sdk_error)?;

        Ok(())
    }

    /// Streams a local file into the bucket without buffering it in memory.
    #[tracing::instrument(skip(self, path))]
    pub async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
        metadata: HashMap<String, String>,
        cache_control: Option<&str>,
    ) -> Result<(), StoreError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StoreError::Fatal(e.to_string()))?;

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body);

        if let Some(cache_control) = cache_control {
            request = request.cache_control(cache_control);
        }

        for (name, value) in metadata {
            request = request.metadata(name, value);
        }

        request.send().await.map_err(classify_sdk_error)?;

        tracing::info!("uploaded object: {}", key);

        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<ByteStream, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(output.body)
    }

    /// Streams an object to a local file.
    #[tracing::instrument(skip(self, path))]
    pub async fn download_to_file(
        &self,
        key: &str,
        path: &Path,
    ) -> Result<(), StoreError> {
        let mut body = self.get(key).await?;

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StoreError::Fatal(e.to_string()))?;

        while let Some(bytes) = body
            .try_next()
            .await
            .map_err(|e| StoreError::Transient(e.to_string()))?
        {
            file.write_all(&bytes)
                .await
                .map_err(|e| StoreError::Fatal(e.to_string()))?;
        }

        file.flush()
            .await
            .map_err(|e| StoreError::Fatal(e.to_string()))?;

        Ok(())
    }

    pub async fn head(&self, key: &str) -> Result<ObjectInfo, StoreError> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(ObjectInfo {
            size: output.content_length().unwrap_or(0),
            content_type: output.content_type().map(str::to_string),
        })
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(classify_sdk_error)?;

        Ok(())
    }

    /// Public URL of an object behind the CDN domain.
    pub fn public_url(&self, key: &str) -> String {
        format!("https://{}/{}", self.public_domain, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ObjectStore {
        let config = aws_config::SdkConfig::builder()
            .behavior_version(aws_config::BehaviorVersion::latest())
            .build();
        ObjectStore::new(&config, "digests".to_string(), "cdn.example.com".to_string())
    }

    #[test]
    fn public_url_joins_domain_and_key() {
        assert_eq!(
            store().public_url("digests/abc/digest.mp3"),
            "https://cdn.example.com/digests/abc/digest.mp3"
        );
    }
}
