use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::clock::iso_date;
use crate::quota::Allowance;
use crate::store::{AnalysisMethod, FoodEntry, User};

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub external_id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetGoalRequest {
    pub daily_goal_calories: i32,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub external_id: i64,
    pub first_name: Option<String>,
    pub daily_goal_calories: i32,
    pub goal_confirmed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            external_id: u.external_id,
            first_name: u.first_name,
            daily_goal_calories: u.daily_goal_calories,
            goal_confirmed: u.goal_confirmed,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub allowance: Allowance,
    pub purchased_credits: i32,
    #[serde(with = "iso_date::option")]
    pub unlimited_until: Option<Date>,
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    pub id: Uuid,
    pub description: String,
    pub calories: i32,
    pub method: AnalysisMethod,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<FoodEntry> for EntryView {
    fn from(e: FoodEntry) -> Self {
        Self {
            id: e.id,
            description: e.description,
            calories: e.calories,
            method: e.analysis_method,
            created_at: e.created_at,
        }
    }
}

/// Today's intake against the user's goal.
#[derive(Debug, Serialize)]
pub struct DailySummary {
    #[serde(with = "iso_date")]
    pub date: Date,
    pub goal: i32,
    pub eaten: i64,
    pub remaining: i64, // negative once the goal is exceeded
    pub progress_percent: i64,
    pub entries: Vec<EntryView>,
}
