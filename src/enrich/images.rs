use crate::http::build_client_with_timeout;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const DEFAULT_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("image url `{0}` is not http(s)")]
    InvalidUrl(String),
    #[error("image request failed: {0}")]
    Request(String),
    #[error("image request returned HTTP {0}")]
    Status(u16),
    #[error("image response was empty")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, DownloadError>;
}

/// Downloads product images over HTTP, asking the CDN for a bounded width.
pub struct HttpImageFetcher {
    http: Client,
    width_hint: u32,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, width_hint: u32) -> Self {
        Self {
            http: build_client_with_timeout(timeout),
            width_hint,
        }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, DownloadError> {
        let trimmed = url.trim();
        if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
            return Err(DownloadError::InvalidUrl(trimmed.to_string()));
        }
        let sized = sized_image_url(trimmed, self.width_hint);
        let response = self
            .http
            .get(&sized)
            .send()
            .await
            .map_err(|err| DownloadError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_string())
            .filter(|value| value.starts_with("image/"))
            .unwrap_or_else(|| DEFAULT_MIME.to_string());
        let bytes = response
            .bytes()
            .await
            .map_err(|err| DownloadError::Request(err.to_string()))?;
        if bytes.is_empty() {
            return Err(DownloadError::Empty);
        }
        debug!(target = "forge.enrich", url = %sized, bytes = bytes.len(), "image_downloaded");
        Ok(FetchedImage {
            mime_type,
            bytes: bytes.to_vec(),
        })
    }
}

/// Drops any existing query and appends `?width=N`. A zero width leaves the
/// URL without a query.
pub fn sized_image_url(url: &str, width: u32) -> String {
    let base = url.split('?').next().unwrap_or(url);
    if width == 0 {
        base.to_string()
    } else {
        format!("{base}?width={width}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_hint_replaces_query() {
        assert_eq!(
            sized_image_url("https://cdn.example.com/a.jpg?v=123&x=1", 800),
            "https://cdn.example.com/a.jpg?width=800"
        );
        assert_eq!(
            sized_image_url("https://cdn.example.com/a.jpg", 640),
            "https://cdn.example.com/a.jpg?width=640"
        );
        assert_eq!(
            sized_image_url("https://cdn.example.com/a.jpg?v=1", 0),
            "https://cdn.example.com/a.jpg"
        );
    }

    #[tokio::test]
    async fn non_http_urls_are_rejected_without_a_request() {
        let fetcher = HttpImageFetcher::new(Duration::from_millis(50), 800);
        let err = fetcher.fetch("ftp://cdn.example.com/a.jpg").await.expect_err("invalid");
        assert!(matches!(err, DownloadError::InvalidUrl(_)));
    }
}
