//! Persistence contract for users, daily usage counters and food entries.
//!
//! The core depends only on each call being transactionally consistent on
//! its own; no operation here spans more than one statement.

#[cfg(test)]
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::clock::iso_date;
pub use postgres::PgStore;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub external_id: i64,                 // chat platform user id
    pub first_name: Option<String>,
    pub daily_goal_calories: i32,
    pub goal_confirmed: bool,             // gates every analysis feature
    pub purchased_credits: i32,           // never negative
    #[serde(default, with = "iso_date::option")]
    pub unlimited_until: Option<Date>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One row per (user, service-local date).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyUsage {
    pub user_id: Uuid,
    #[serde(with = "iso_date")]
    pub usage_date: Date,
    pub free_requests_used: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisMethod {
    #[serde(rename = "reasoning-service")]
    ReasoningService,
    #[serde(rename = "heuristic")]
    Heuristic,
}

impl AnalysisMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisMethod::ReasoningService => "reasoning-service",
            AnalysisMethod::Heuristic => "heuristic",
        }
    }
}

impl TryFrom<String> for AnalysisMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "reasoning-service" => Ok(AnalysisMethod::ReasoningService),
            "heuristic" => Ok(AnalysisMethod::Heuristic),
            other => Err(format!("unknown analysis method: {other}")),
        }
    }
}

/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FoodEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(with = "iso_date")]
    pub entry_date: Date,
    pub description: String,
    pub calories: i32,
    #[sqlx(try_from = "String")]
    pub analysis_method: AnalysisMethod,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewFoodEntry {
    pub user_id: Uuid,
    pub entry_date: Date,
    pub description: String,
    pub calories: i32,
    pub analysis_method: AnalysisMethod,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user {0} not found")]
    UserNotFound(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Idempotent: creates the user on first contact, otherwise refreshes the name.
    async fn upsert_user(&self, external_id: i64, first_name: Option<&str>)
        -> Result<User, StoreError>;
    async fn get_user(&self, external_id: i64) -> Result<Option<User>, StoreError>;
    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;
    /// Sets the goal and marks it confirmed.
    async fn set_daily_goal(&self, external_id: i64, goal: i32) -> Result<User, StoreError>;

    async fn find_daily_counter(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<Option<DailyUsage>, StoreError>;
    async fn get_or_create_daily_counter(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<DailyUsage, StoreError>;
    /// Increments today's free usage, never past `cap`.
    async fn increment_free_usage(
        &self,
        user_id: Uuid,
        date: Date,
        cap: i32,
    ) -> Result<DailyUsage, StoreError>;

    /// Decrements the purchased balance, floored at zero.
    async fn decrement_purchased_credits(&self, user_id: Uuid) -> Result<User, StoreError>;
    async fn add_purchased_credits(&self, user_id: Uuid, count: i32) -> Result<User, StoreError>;
    async fn set_unlimited_until(&self, user_id: Uuid, until: Date) -> Result<User, StoreError>;

    async fn insert_food_entry(&self, entry: NewFoodEntry) -> Result<FoodEntry, StoreError>;
    async fn list_entries_for_date(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<Vec<FoodEntry>, StoreError>;
}
