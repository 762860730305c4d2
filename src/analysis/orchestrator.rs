//! Drives one analysis attempt from raw input to a charged, persisted result.
//!
//! Every attempt ends in exactly one [`AnalysisOutcome`] or an
//! [`AnalysisError`]. Quota is charged once for every attempt that reached
//! the reasoning stage (a "not food" verdict included) and never for
//! attempts rejected earlier.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::heuristic::HeuristicEstimator;
use super::media::{MediaError, MediaFetcher};
use super::normalizer::{normalize, DEFAULT_CALORIES};
use super::reasoning::{ReasonerReply, ReasoningGateway};
use super::transcription::TranscriptionGateway;
use super::types::{AnalysisResult, FoodEstimate, FoodItem};
use crate::config::InputLimits;
use crate::quota::{Allowance, ChargeSource, QuotaLedger, Reservation};
use crate::store::{AnalysisMethod, NewFoodEntry, Store, StoreError, User};

const PHOTO_ENTRY_DESCRIPTION: &str = "Фото еды";
const VOICE_FILE_NAME: &str = "voice.ogg";
const DEFAULT_PORTION: &str = "стандартная порция";
const DEFAULT_ITEM_NAME: &str = "блюдо";
const DEFAULT_CONFIDENCE: &str = "средняя";
const DEFAULT_NOT_FOOD: &str = "Не удалось найти еду или напитки";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("user {0} is not registered")]
    UnknownUser(i64),
    #[error("daily calorie goal is not set")]
    GoalNotSet,
    #[error("text is empty")]
    EmptyText,
    #[error("text is longer than {max} characters")]
    TextTooLong { max: usize },
    #[error("voice message is longer than {max} seconds")]
    VoiceTooLong { max: u32 },
    #[error("photo is larger than {max} bytes")]
    PhotoTooLarge { max: u64 },
    #[error("voice message is larger than {max} bytes")]
    AudioTooLarge { max: u64 },
    #[error("encoded photo is larger than {max} bytes")]
    EncodedPhotoTooLarge { max: usize },
    #[error("invalid media reference: {0}")]
    InvalidMediaRef(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl From<StoreError> for AnalysisError {
    fn from(e: StoreError) -> Self {
        AnalysisError::Infrastructure(e.to_string())
    }
}

impl From<MediaError> for AnalysisError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::InvalidRef(reason) => ValidationError::InvalidMediaRef(reason).into(),
            other => AnalysisError::Infrastructure(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    /// Nothing charged; the front-end offers credits or tomorrow.
    Blocked { allowance: Allowance },
    NotFood {
        message: String,
        charged: ChargeSource,
        allowance: Allowance,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    FoodDetected {
        estimate: FoodEstimate,
        method: AnalysisMethod,
        entry_id: Uuid,
        charged: ChargeSource,
        allowance: Allowance,
        #[serde(skip_serializing_if = "Option::is_none")]
        transcript: Option<String>,
    },
    /// Nothing charged; the user should retry, speak clearer or type.
    TranscriptionFailed { detail: String },
}

pub struct AnalysisOrchestrator {
    store: Arc<dyn Store>,
    ledger: Arc<QuotaLedger>,
    reasoning: Arc<dyn ReasoningGateway>,
    heuristic: HeuristicEstimator,
    transcription: Arc<TranscriptionGateway>,
    media: Arc<dyn MediaFetcher>,
    limits: InputLimits,
}

impl AnalysisOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Arc<QuotaLedger>,
        reasoning: Arc<dyn ReasoningGateway>,
        transcription: Arc<TranscriptionGateway>,
        media: Arc<dyn MediaFetcher>,
        limits: InputLimits,
    ) -> Self {
        Self {
            store,
            ledger,
            reasoning,
            heuristic: HeuristicEstimator,
            transcription,
            media,
            limits,
        }
    }

    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    pub async fn on_text_input(
        &self,
        external_id: i64,
        text: &str,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let user = self.confirmed_user(external_id).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyText.into());
        }
        if text.chars().count() > self.limits.max_text_chars {
            return Err(ValidationError::TextTooLong {
                max: self.limits.max_text_chars,
            }
            .into());
        }
        self.analyze_description(&user, text, None).await
    }

    #[instrument(skip(self, audio_ref))]
    pub async fn on_voice_input(
        &self,
        external_id: i64,
        audio_ref: &str,
        duration_seconds: u32,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let user = self.confirmed_user(external_id).await?;
        if duration_seconds > self.limits.max_voice_seconds {
            return Err(ValidationError::VoiceTooLong {
                max: self.limits.max_voice_seconds,
            }
            .into());
        }

        let audio = self
            .media
            .fetch(audio_ref, self.limits.max_voice_bytes)
            .await
            .map_err(|e| match e {
                MediaError::TooLarge { max } => ValidationError::AudioTooLarge { max }.into(),
                other => AnalysisError::from(other),
            })?;
        let transcript = match self.transcription.transcribe(audio, VOICE_FILE_NAME).await {
            Ok(text) => text,
            Err(failure) => {
                return Ok(AnalysisOutcome::TranscriptionFailed {
                    detail: failure.detail,
                })
            }
        };
        if transcript.trim().chars().count() < self.limits.min_transcript_chars {
            warn!(%transcript, "transcript too short");
            return Ok(AnalysisOutcome::TranscriptionFailed {
                detail: format!("transcript too short: {transcript:?}"),
            });
        }

        let transcript = transcript.trim().to_string();
        self.analyze_description(&user, &transcript, Some(transcript.clone()))
            .await
    }

    #[instrument(skip(self, image_ref))]
    pub async fn on_image_input(
        &self,
        external_id: i64,
        image_ref: &str,
        size_bytes: Option<u64>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let user = self.confirmed_user(external_id).await?;
        let max = self.limits.max_photo_bytes;
        if size_bytes.is_some_and(|size| size > max) {
            return Err(ValidationError::PhotoTooLarge { max }.into());
        }

        let image = self
            .media
            .fetch(image_ref, max)
            .await
            .map_err(|e| match e {
                MediaError::TooLarge { max } => ValidationError::PhotoTooLarge { max }.into(),
                other => AnalysisError::from(other),
            })?;
        let encoded = STANDARD.encode(&image);
        if encoded.len() > self.limits.max_image_base64_len {
            return Err(ValidationError::EncodedPhotoTooLarge {
                max: self.limits.max_image_base64_len,
            }
            .into());
        }

        let reservation = self.ledger.reserve(user.id).await?;
        if !reservation.allowance().allowed {
            return Ok(AnalysisOutcome::Blocked {
                allowance: reservation.allowance(),
            });
        }

        // The text heuristic can't read a photo, so there is no fallback here.
        let reply = self.reasoning.analyze_image(&encoded).await.map_err(|e| {
            warn!(error = %e, "image analysis failed");
            AnalysisError::Infrastructure(e.to_string())
        })?;

        self.settle(
            &user,
            reservation,
            normalize_reply(reply),
            AnalysisMethod::ReasoningService,
            PHOTO_ENTRY_DESCRIPTION,
            None,
        )
        .await
    }

    async fn confirmed_user(&self, external_id: i64) -> Result<User, AnalysisError> {
        let user = self
            .store
            .get_user(external_id)
            .await?
            .ok_or(ValidationError::UnknownUser(external_id))?;
        if !user.goal_confirmed {
            return Err(ValidationError::GoalNotSet.into());
        }
        Ok(user)
    }

    async fn analyze_description(
        &self,
        user: &User,
        description: &str,
        transcript: Option<String>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let reservation = self.ledger.reserve(user.id).await?;
        if !reservation.allowance().allowed {
            info!(user_id = %user.id, "analysis blocked by quota");
            return Ok(AnalysisOutcome::Blocked {
                allowance: reservation.allowance(),
            });
        }

        let (result, method) = match self.reasoning.analyze_text(description).await {
            Ok(reply) => (normalize_reply(reply), AnalysisMethod::ReasoningService),
            Err(e) => {
                warn!(error = %e, "reasoning failed; using heuristic estimate");
                (self.heuristic.estimate(description), AnalysisMethod::Heuristic)
            }
        };

        self.settle(user, reservation, result, method, description, transcript)
            .await
    }

    /// Persists the verdict and charges the reservation. The entry is written
    /// before the charge so a store failure never leaves a charge without it.
    async fn settle(
        &self,
        user: &User,
        reservation: Reservation<'_>,
        result: AnalysisResult,
        method: AnalysisMethod,
        description: &str,
        transcript: Option<String>,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let allowance = reservation.allowance();
        match result {
            AnalysisResult::NoFoodDetected { message } => {
                let charged = reservation.charge().await?;
                info!(user_id = %user.id, ?charged, "not food; attempt charged");
                Ok(AnalysisOutcome::NotFood {
                    message,
                    charged,
                    allowance: allowance.after_charge(charged),
                    transcript,
                })
            }
            AnalysisResult::FoodDetected(estimate) => {
                let entry = self
                    .store
                    .insert_food_entry(NewFoodEntry {
                        user_id: user.id,
                        entry_date: self.ledger.today(),
                        description: description.to_string(),
                        calories: i32::try_from(estimate.total_calories).unwrap_or(i32::MAX),
                        analysis_method: method,
                    })
                    .await?;
                let charged = reservation.charge().await?;
                info!(
                    user_id = %user.id,
                    entry_id = %entry.id,
                    calories = estimate.total_calories,
                    method = method.as_str(),
                    ?charged,
                    "food entry recorded"
                );
                Ok(AnalysisOutcome::FoodDetected {
                    estimate,
                    method,
                    entry_id: entry.id,
                    charged,
                    allowance: allowance.after_charge(charged),
                    transcript,
                })
            }
        }
    }
}

/// Canonicalizes a reasoning reply: every calorie field goes through the
/// normalizer, missing descriptive fields get defaults.
pub fn normalize_reply(reply: ReasonerReply) -> AnalysisResult {
    if reply.no_food_detected {
        let message = reply
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_NOT_FOOD.to_string());
        return AnalysisResult::NoFoodDetected { message };
    }

    let items: Vec<FoodItem> = reply
        .items
        .into_iter()
        .map(|raw| FoodItem {
            name: raw
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ITEM_NAME.to_string()),
            portion: portion_text(&raw.portion),
            calories: normalize(&raw.calories),
        })
        .collect();

    let total_calories = match &reply.total_calories {
        Value::Null if items.is_empty() => DEFAULT_CALORIES,
        Value::Null => items.iter().fold(0u32, |acc, i| acc.saturating_add(i.calories)),
        total => normalize(total),
    };

    AnalysisResult::FoodDetected(FoodEstimate {
        items,
        total_calories,
        confidence: reply
            .confidence
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIDENCE.to_string()),
        reasoning: reply.reasoning.unwrap_or_default(),
        comment: reply.comment.filter(|c| !c.trim().is_empty()),
        approximate: reply.approximate,
    })
}

fn portion_text(value: &Value) -> String {
    match value {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => DEFAULT_PORTION.to_string(),
    }
}
