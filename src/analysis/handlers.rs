use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use tracing::instrument;

use super::dto::{ImageAnalysisRequest, TextAnalysisRequest, VoiceAnalysisRequest};
use super::orchestrator::AnalysisOutcome;
use crate::{auth::FrontendCaller, error::ApiError, state::AppState};

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:external_id/analyses/text", post(analyze_text))
        .route("/users/:external_id/analyses/voice", post(analyze_voice))
        .route("/users/:external_id/analyses/image", post(analyze_image))
}

#[instrument(skip(state, caller, body), fields(caller = %caller.0.sub))]
pub async fn analyze_text(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Path(external_id): Path<i64>,
    Json(body): Json<TextAnalysisRequest>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_text_input(external_id, &body.text)
        .await?;
    Ok(Json(outcome))
}

#[instrument(skip(state, caller, body), fields(caller = %caller.0.sub))]
pub async fn analyze_voice(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Path(external_id): Path<i64>,
    Json(body): Json<VoiceAnalysisRequest>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_voice_input(external_id, &body.file_url, body.duration_seconds)
        .await?;
    Ok(Json(outcome))
}

#[instrument(skip(state, caller, body), fields(caller = %caller.0.sub))]
pub async fn analyze_image(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Path(external_id): Path<i64>,
    Json(body): Json<ImageAnalysisRequest>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let outcome = state
        .orchestrator
        .on_image_input(external_id, &body.file_url, body.size_bytes)
        .await?;
    Ok(Json(outcome))
}
