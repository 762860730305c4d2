//! Speech-to-text with a primary provider and one fallback.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::config::TranscriptionConfig;

/// Both providers failed or produced nothing usable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transcription failed: {detail}")]
pub struct TranscriptionFailure {
    pub detail: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("empty transcript")]
    Empty,
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, ProviderError>;
}

/// Response shapes differ between endpoints; the first non-empty field wins.
#[derive(Debug, Default, Deserialize)]
struct TranscriptBody {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    transcription: Option<String>,
    #[serde(default)]
    result: Option<String>,
}

impl TranscriptBody {
    fn into_text(self) -> Result<String, ProviderError> {
        [self.text, self.transcription, self.result]
            .into_iter()
            .flatten()
            .map(|t| t.trim().to_string())
            .find(|t| !t.is_empty())
            .ok_or(ProviderError::Empty)
    }
}

async fn read_transcript(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        });
    }
    response.json::<TranscriptBody>().await?.into_text()
}

/// OpenAI-compatible whisper endpoint: multipart `file`, `model`, `language`.
pub struct WhisperPrimary {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    language: String,
}

impl WhisperPrimary {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.primary_timeout_secs))
                .build()?,
            url: config.primary_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperPrimary {
    fn name(&self) -> &'static str {
        "primary"
    }

    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, ProviderError> {
        let form = Form::new()
            .part("file", Part::bytes(audio.to_vec()).file_name(file_name.to_string()))
            .text("model", self.model.clone())
            .text("language", self.language.clone());
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        read_transcript(response).await
    }
}

/// Direct audio endpoint with a longer timeout; takes only the file part.
pub struct WhisperSecondary {
    client: Client,
    url: String,
    api_key: String,
}

impl WhisperSecondary {
    pub fn new(config: &TranscriptionConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.secondary_timeout_secs))
                .build()?,
            url: config.secondary_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl TranscriptionProvider for WhisperSecondary {
    fn name(&self) -> &'static str {
        "secondary"
    }

    async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, ProviderError> {
        let part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/ogg")?;
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        read_transcript(response).await
    }
}

pub struct TranscriptionGateway {
    primary: Box<dyn TranscriptionProvider>,
    secondary: Box<dyn TranscriptionProvider>,
}

impl TranscriptionGateway {
    pub fn new(
        primary: Box<dyn TranscriptionProvider>,
        secondary: Box<dyn TranscriptionProvider>,
    ) -> Self {
        Self { primary, secondary }
    }

    pub fn from_config(config: &TranscriptionConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            Box::new(WhisperPrimary::new(config)?),
            Box::new(WhisperSecondary::new(config)?),
        ))
    }

    /// Tries the primary provider, then the secondary one on any error or an
    /// empty transcript. The returned text is trimmed and non-empty.
    #[instrument(skip(self, audio), fields(bytes = audio.len()))]
    pub async fn transcribe(&self, audio: Bytes, file_name: &str) -> Result<String, TranscriptionFailure> {
        let mut last_error = None;
        for provider in [&self.primary, &self.secondary] {
            match provider.transcribe(audio.clone(), file_name).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!(provider = provider.name(), chars = text.chars().count(), "audio transcribed");
                    return Ok(text.trim().to_string());
                }
                Ok(_) => {
                    warn!(provider = provider.name(), "provider returned an empty transcript");
                    last_error = Some(ProviderError::Empty);
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "transcription provider failed");
                    last_error = Some(e);
                }
            }
        }
        Err(TranscriptionFailure {
            detail: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no provider configured".into()),
        })
    }
}
