use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use reqwest::{Client, Url};
use tracing::{debug, instrument, warn};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("invalid media reference: {0}")]
    InvalidRef(String),
    #[error("media download failed: {0}")]
    Download(#[from] reqwest::Error),
    #[error("media host returned {0}")]
    Status(u16),
    #[error("media is larger than {max} bytes")]
    TooLarge { max: u64 },
}

/// Resolves a client-supplied media reference to its bytes, refusing
/// anything over `max_bytes`.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, media_ref: &str, max_bytes: u64) -> Result<Bytes, MediaError>;
}

pub struct HttpMediaFetcher {
    client: Client,
}

impl HttpMediaFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

/// Only absolute http(s) URLs are fetched.
pub fn parse_media_ref(media_ref: &str) -> Result<Url, MediaError> {
    let url = Url::parse(media_ref.trim()).map_err(|e| MediaError::InvalidRef(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(MediaError::InvalidRef(format!("unsupported scheme {other}"))),
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, media_ref: &str, max_bytes: u64) -> Result<Bytes, MediaError> {
        let url = parse_media_ref(media_ref)?;
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(MediaError::Status(response.status().as_u16()));
        }
        if response.content_length().is_some_and(|len| len > max_bytes) {
            warn!(declared = ?response.content_length(), max_bytes, "media rejected by length");
            return Err(MediaError::TooLarge { max: max_bytes });
        }

        // The declared length may be absent or wrong, so count as we read.
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > max_bytes {
                warn!(read = body.len(), max_bytes, "media body exceeded limit");
                return Err(MediaError::TooLarge { max: max_bytes });
            }
            body.extend_from_slice(&chunk);
        }
        debug!(bytes = body.len(), "media fetched");
        Ok(body.freeze())
    }
}
