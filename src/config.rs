use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use time::UtcOffset;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReasoningConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionConfig {
    pub api_key: String,
    pub primary_url: String,
    pub secondary_url: String,
    pub model: String,
    pub language: String,
    pub primary_timeout_secs: u64,
    pub secondary_timeout_secs: u64,
}

/// Rejection thresholds applied before any gateway call.
#[derive(Debug, Clone, Deserialize)]
pub struct InputLimits {
    pub max_voice_seconds: u32,
    pub max_photo_bytes: u64,
    pub max_voice_bytes: u64,
    pub max_image_base64_len: usize,
    pub max_text_chars: usize,
    pub min_transcript_chars: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_voice_seconds: 60,
            max_photo_bytes: 5 * 1024 * 1024,
            max_voice_bytes: 20 * 1024 * 1024,
            max_image_base64_len: 20 * 1024 * 1024,
            max_text_chars: 500,
            min_transcript_chars: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub reasoning: ReasoningConfig,
    pub transcription: TranscriptionConfig,
    pub media_fetch_timeout_secs: u64,
    pub limits: InputLimits,
    /// Fixed zone in which "today" is computed for counters and entries.
    pub utc_offset: UtcOffset,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "calorie-gateway".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "calorie-gateway-clients".into()),
        };
        let reasoning = ReasoningConfig {
            api_key: std::env::var("REASONING_API_KEY").context("REASONING_API_KEY is not set")?,
            base_url: std::env::var("REASONING_BASE_URL")
                .unwrap_or_else(|_| "https://api.anthropic.com".into()),
            model: std::env::var("REASONING_MODEL")
                .unwrap_or_else(|_| "claude-3-5-haiku-20241022".into()),
            max_tokens: env_or("REASONING_MAX_TOKENS", 1500),
            timeout_secs: env_or("REASONING_TIMEOUT_SECS", 60),
        };
        let transcription = TranscriptionConfig {
            api_key: std::env::var("TRANSCRIPTION_API_KEY")
                .context("TRANSCRIPTION_API_KEY is not set")?,
            primary_url: std::env::var("TRANSCRIPTION_PRIMARY_URL").unwrap_or_else(|_| {
                "https://api.fireworks.ai/inference/v1/audio/transcriptions".into()
            }),
            secondary_url: std::env::var("TRANSCRIPTION_SECONDARY_URL").unwrap_or_else(|_| {
                "https://audio-prod.us-virginia-1.direct.fireworks.ai/v1/audio/transcriptions".into()
            }),
            model: std::env::var("TRANSCRIPTION_MODEL")
                .unwrap_or_else(|_| "accounts/fireworks/models/whisper-v3-turbo".into()),
            language: std::env::var("TRANSCRIPTION_LANGUAGE").unwrap_or_else(|_| "ru".into()),
            primary_timeout_secs: env_or("TRANSCRIPTION_PRIMARY_TIMEOUT_SECS", 30),
            secondary_timeout_secs: env_or("TRANSCRIPTION_SECONDARY_TIMEOUT_SECS", 45),
        };

        let defaults = InputLimits::default();
        let limits = InputLimits {
            max_voice_seconds: env_or("MAX_VOICE_SECONDS", defaults.max_voice_seconds),
            max_photo_bytes: env_or("MAX_PHOTO_BYTES", defaults.max_photo_bytes),
            max_voice_bytes: env_or("MAX_VOICE_BYTES", defaults.max_voice_bytes),
            max_image_base64_len: env_or("MAX_IMAGE_BASE64_LEN", defaults.max_image_base64_len),
            max_text_chars: env_or("MAX_TEXT_CHARS", defaults.max_text_chars),
            min_transcript_chars: env_or("MIN_TRANSCRIPT_CHARS", defaults.min_transcript_chars),
        };

        let offset_hours: i8 = env_or("SERVICE_UTC_OFFSET_HOURS", 0);
        let utc_offset = UtcOffset::from_hms(offset_hours, 0, 0)
            .context("SERVICE_UTC_OFFSET_HOURS out of range")?;

        Ok(Self {
            database_url,
            jwt,
            reasoning,
            transcription,
            media_fetch_timeout_secs: env_or("MEDIA_FETCH_TIMEOUT_SECS", 30),
            limits,
            utc_offset,
        })
    }

    pub fn media_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.media_fetch_timeout_secs)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
