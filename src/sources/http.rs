use std::io::{Read, Seek, SeekFrom};

use async_trait::async_trait;
use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::FetchConfig;
use crate::errors::{AppError, AppResult};
use crate::sources::traits::ByteSource;
use crate::utils::format_bytes;
use crate::utils::url::UrlUtils;

/// reqwest client configured with the retrieval timeouts and user agent
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> AppResult<Response> {
        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::source_unavailable(
                UrlUtils::obfuscate_credentials(url),
                UrlUtils::obfuscate_credentials(&e.to_string()),
            )
        })?;

        if !response.status().is_success() {
            return Err(AppError::source_unavailable(
                UrlUtils::obfuscate_credentials(url),
                format!(
                    "HTTP error: {} {}",
                    response.status(),
                    response.status().canonical_reason().unwrap_or("Unknown")
                ),
            ));
        }
        Ok(response)
    }

    /// Fetch a small text resource such as a wanted-id list
    pub async fn fetch_text(&self, url: &str, cancel: &CancellationToken) -> AppResult<String> {
        debug!("Fetching text content from: {}", UrlUtils::obfuscate_credentials(url));

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = self.get(url) => response?,
        };

        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            text = response.text() => text.map_err(|e| {
                AppError::source_unavailable(
                    UrlUtils::obfuscate_credentials(url),
                    format!("Failed to read response: {e}"),
                )
            })?,
        };

        debug!("Fetched {} characters of text content", text.len());
        Ok(text)
    }

    /// Stream a response body into an anonymous temporary file and return it
    /// rewound to the start
    pub async fn spool_to_tempfile(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> AppResult<std::fs::File> {
        let display_url = UrlUtils::obfuscate_credentials(url);
        let unavailable = |message: String| AppError::source_unavailable(display_url.clone(), message);

        let mut response = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            response = self.get(url) => response?,
        };

        let spool = tempfile::tempfile()
            .map_err(|e| unavailable(format!("Failed to create spool file: {e}")))?;
        let mut spool = tokio::fs::File::from_std(spool);
        let mut total: u64 = 0;

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                chunk = response.chunk() => chunk
                    .map_err(|e| unavailable(format!("Failed to read response body: {e}")))?,
            };
            let Some(chunk) = chunk else {
                break;
            };
            spool
                .write_all(&chunk)
                .await
                .map_err(|e| unavailable(format!("Failed to spool response body: {e}")))?;
            total += chunk.len() as u64;
        }

        spool
            .flush()
            .await
            .map_err(|e| unavailable(format!("Failed to spool response body: {e}")))?;
        let mut file = spool.into_std().await;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| unavailable(format!("Failed to rewind spool file: {e}")))?;

        info!("Downloaded {} from {}", format_bytes(total), display_url);
        Ok(file)
    }
}

/// A feed retrieved over http(s)
pub struct HttpSource {
    url: String,
    fetcher: HttpFetcher,
}

impl HttpSource {
    pub fn new<S: Into<String>>(url: S, fetcher: HttpFetcher) -> Self {
        Self {
            url: url.into(),
            fetcher,
        }
    }
}

#[async_trait]
impl ByteSource for HttpSource {
    fn label(&self) -> String {
        UrlUtils::label(&self.url)
    }

    async fn open(&self, cancel: &CancellationToken) -> AppResult<Box<dyn Read + Send>> {
        info!("Downloading EPG from {}", UrlUtils::obfuscate_credentials(&self.url));
        let file = self.fetcher.spool_to_tempfile(&self.url, cancel).await?;
        Ok(Box::new(file))
    }
}
