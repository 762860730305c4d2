//! The analysis pipeline: input validation, transcription, reasoning with a
//! heuristic fallback, calorie normalization and metered settlement.

mod dto;
pub mod handlers;
pub mod heuristic;
pub mod media;
pub mod normalizer;
pub mod orchestrator;
pub mod reasoning;
pub mod transcription;
pub mod types;

use crate::state::AppState;
use axum::Router;

pub use orchestrator::{AnalysisError, AnalysisOrchestrator, ValidationError};

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::analysis_routes())
}
