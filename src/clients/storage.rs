use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use tracing::debug;

/// Object storage for intermediate audio artifacts.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, local: &Path, key: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Public URL of an uploaded object, handed to the recognizer.
    fn object_url(&self, key: &str) -> String;
}

/// HTTP bucket speaking plain `PUT`/`DELETE` on `<bucket_url>/<key>`.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    bucket_url: String,
    token: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(bucket_url: impl Into<String>, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build object storage client")?;
        Ok(Self {
            client,
            bucket_url: bucket_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn upload(&self, local: &Path, key: &str) -> Result<()> {
        let bytes = tokio::fs::read(local)
            .await
            .with_context(|| format!("failed to read {}", local.display()))?;
        debug!(key, size = bytes.len(), "uploading audio object");

        let request = self.client.put(self.object_url(key)).body(bytes);
        self.authorize(request)
            .send()
            .await
            .context("object upload request failed")?
            .error_for_status()
            .context("object upload rejected")?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let request = self.client.delete(self.object_url(key));
        self.authorize(request)
            .send()
            .await
            .context("object delete request failed")?
            .error_for_status()
            .context("object delete rejected")?;
        Ok(())
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{key}", self.bucket_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn uploads_file_bytes_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/42-1700000000.aac"))
            .and(header("authorization", "Bearer bucket-tok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("42-1700000000.aac");
        std::fs::write(&local, b"aac bytes").unwrap();

        let storage =
            HttpObjectStorage::new(server.uri(), Some("bucket-tok".to_string())).unwrap();
        storage.upload(&local, "42-1700000000.aac").await.unwrap();
    }

    #[tokio::test]
    async fn delete_failure_surfaces_as_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let storage = HttpObjectStorage::new(server.uri(), None).unwrap();
        assert!(storage.delete("gone.aac").await.is_err());
    }

    #[test]
    fn object_url_joins_without_double_slash() {
        let storage = HttpObjectStorage::new("https://bucket.example/", None).unwrap();
        assert_eq!(
            storage.object_url("a.aac"),
            "https://bucket.example/a.aac"
        );
    }
}
