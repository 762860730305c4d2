use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use super::dto::{BalanceResponse, DailySummary, SetGoalRequest, UpsertUserRequest, UserResponse};
use super::services::{daily_summary, validate_goal};
use crate::{auth::FrontendCaller, error::ApiError, state::AppState, store::User};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(upsert_user))
        .route("/users/:external_id", get(get_user))
        .route("/users/:external_id/goal", put(set_goal))
        .route("/users/:external_id/balance", get(get_balance))
        .route("/users/:external_id/today", get(get_today))
}

pub(crate) async fn find_user(state: &AppState, external_id: i64) -> Result<User, ApiError> {
    state
        .store
        .get_user(external_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {external_id} not found")))
}

pub(crate) async fn balance_of(state: &AppState, user: User) -> Result<BalanceResponse, ApiError> {
    let allowance = state.ledger.check_allowance(user.id).await?;
    Ok(BalanceResponse {
        allowance,
        purchased_credits: user.purchased_credits,
        unlimited_until: user.unlimited_until,
    })
}

#[instrument(skip(state, caller, payload), fields(caller = %caller.0.sub))]
pub async fn upsert_user(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Json(payload): Json<UpsertUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let first_name = payload
        .first_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let user = state
        .store
        .upsert_user(payload.external_id, first_name)
        .await?;
    info!(user_id = %user.id, external_id = user.external_id, "user upserted");
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller), fields(caller = %caller.0.sub))]
pub async fn get_user(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Path(external_id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(find_user(&state, external_id).await?.into()))
}

#[instrument(skip(state, caller, payload), fields(caller = %caller.0.sub))]
pub async fn set_goal(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Path(external_id): Path<i64>,
    Json(payload): Json<SetGoalRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let goal = validate_goal(payload.daily_goal_calories).map_err(|reason| {
        warn!(goal = payload.daily_goal_calories, "goal out of range");
        ApiError::Validation(reason)
    })?;
    find_user(&state, external_id).await?;
    let user = state.store.set_daily_goal(external_id, goal).await?;
    info!(user_id = %user.id, goal, "daily goal set");
    Ok(Json(user.into()))
}

#[instrument(skip(state, caller), fields(caller = %caller.0.sub))]
pub async fn get_balance(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Path(external_id): Path<i64>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = find_user(&state, external_id).await?;
    Ok(Json(balance_of(&state, user).await?))
}

#[instrument(skip(state, caller), fields(caller = %caller.0.sub))]
pub async fn get_today(
    State(state): State<AppState>,
    caller: FrontendCaller,
    Path(external_id): Path<i64>,
) -> Result<Json<DailySummary>, ApiError> {
    let user = find_user(&state, external_id).await?;
    let today = state.ledger.today();
    let entries = state.store.list_entries_for_date(user.id, today).await?;
    Ok(Json(daily_summary(today, user.daily_goal_calories, entries)))
}
