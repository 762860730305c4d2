use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use time::{Date, Duration};
use tracing::{info, instrument};

use super::dto::{GrantCreditsRequest, GrantUnlimitedRequest};
use crate::{
    auth::PaymentsCaller,
    error::ApiError,
    state::AppState,
    users::{
        dto::BalanceResponse,
        handlers::{balance_of, find_user},
    },
};

/// Largest single credit purchase accepted from the payment service.
const MAX_CREDITS_PER_GRANT: u32 = 100_000;

pub fn billing_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:external_id/credits", post(grant_credits))
        .route("/users/:external_id/unlimited", post(grant_unlimited))
}

#[instrument(skip(state, caller, payload), fields(caller = %caller.0.sub))]
pub async fn grant_credits(
    State(state): State<AppState>,
    caller: PaymentsCaller,
    Path(external_id): Path<i64>,
    Json(payload): Json<GrantCreditsRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    validate_count(payload.count).map_err(ApiError::Validation)?;
    let user = find_user(&state, external_id).await?;
    let user = state.ledger.grant_credits(user.id, payload.count).await?;
    info!(external_id, count = payload.count, "credit purchase applied");
    Ok(Json(balance_of(&state, user).await?))
}

#[instrument(skip(state, caller, payload), fields(caller = %caller.0.sub))]
pub async fn grant_unlimited(
    State(state): State<AppState>,
    caller: PaymentsCaller,
    Path(external_id): Path<i64>,
    Json(payload): Json<GrantUnlimitedRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let until = resolve_until(&payload, state.ledger.today()).map_err(ApiError::Validation)?;
    let user = find_user(&state, external_id).await?;
    let user = state.ledger.grant_unlimited_until(user.id, until).await?;
    info!(external_id, %until, "unlimited purchase applied");
    Ok(Json(balance_of(&state, user).await?))
}

fn validate_count(count: u32) -> Result<(), String> {
    match count {
        0 => Err("count must be at least 1".into()),
        n if n > MAX_CREDITS_PER_GRANT => {
            Err(format!("count must be at most {MAX_CREDITS_PER_GRANT}"))
        }
        _ => Ok(()),
    }
}

/// The entitlement's end date: explicit, or `days` after `today`.
fn resolve_until(req: &GrantUnlimitedRequest, today: Date) -> Result<Date, String> {
    match (req.until, req.days) {
        (Some(until), None) if until > today => Ok(until),
        (Some(_), None) => Err("until must be a future date".into()),
        (None, Some(days)) if days > 0 => today
            .checked_add(Duration::days(i64::from(days)))
            .ok_or_else(|| "days is out of range".into()),
        (None, Some(_)) => Err("days must be at least 1".into()),
        _ => Err("exactly one of until or days is required".into()),
    }
}
