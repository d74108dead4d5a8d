use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::core::configuration::{Configuration, APP_NAME, APP_VERSION};

/// Network seam used by provisioning and update checks.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Streams `url` into `dest` and returns the number of bytes written.
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> anyhow::Result<u64>;

    async fn fetch_json(&self, url: &str) -> anyhow::Result<serde_json::Value>;
}

pub fn client_builder(timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(format!("{}/{}", APP_NAME, APP_VERSION))
        .connect_timeout(Duration::from_secs(30))
        .timeout(timeout)
}

pub struct HttpFetcher {
    download_client: reqwest::Client,
    api_client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &Configuration) -> anyhow::Result<Self> {
        Ok(Self {
            download_client: client_builder(config.tool_fetch_timeout).build()?,
            api_client: client_builder(config.api_timeout).build()?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_to_file(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        tracing::info!("Downloading {} -> {}", url, dest.display());
        let response = self.download_client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP {} from {}", response.status(), url));
        }
        if let Some(len) = response.content_length() {
            tracing::debug!("{} announces {:.2} MB", url, len as f64 / (1024.0 * 1024.0));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| anyhow!("Stream error: {}", e))?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::info!(
            "Download complete: {} ({:.2} MB)",
            dest.display(),
            written as f64 / (1024.0 * 1024.0)
        );
        Ok(written)
    }

    async fn fetch_json(&self, url: &str) -> anyhow::Result<serde_json::Value> {
        let response = self
            .api_client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP {} from {}", response.status(), url));
        }
        Ok(response.json::<serde_json::Value>().await?)
    }
}
