use async_trait::async_trait;
use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use super::{DailyUsage, FoodEntry, NewFoodEntry, Store, StoreError, User};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_user(
        &self,
        external_id: i64,
        first_name: Option<&str>,
    ) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, external_id, first_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (external_id)
            DO UPDATE SET first_name = COALESCE(EXCLUDED.first_name, users.first_name)
            RETURNING id, external_id, first_name, daily_goal_calories, goal_confirmed,
                      purchased_credits, unlimited_until, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(external_id)
        .bind(first_name)
        .fetch_one(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_user(&self, external_id: i64) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, external_id, first_name, daily_goal_calories, goal_confirmed,
                   purchased_credits, unlimited_until, created_at
            FROM users
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, external_id, first_name, daily_goal_calories, goal_confirmed,
                   purchased_credits, unlimited_until, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn set_daily_goal(&self, external_id: i64, goal: i32) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET daily_goal_calories = $2, goal_confirmed = TRUE
            WHERE external_id = $1
            RETURNING id, external_id, first_name, daily_goal_calories, goal_confirmed,
                      purchased_credits, unlimited_until, created_at
            "#,
        )
        .bind(external_id)
        .bind(goal)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| StoreError::UserNotFound(external_id.to_string()))
    }

    async fn find_daily_counter(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<Option<DailyUsage>, StoreError> {
        let row = sqlx::query_as::<_, DailyUsage>(
            r#"
            SELECT user_id, usage_date, free_requests_used
            FROM daily_usage
            WHERE user_id = $1 AND usage_date = $2
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn get_or_create_daily_counter(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<DailyUsage, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let row = sqlx::query_as::<_, DailyUsage>(
            r#"
            INSERT INTO daily_usage (user_id, usage_date, free_requests_used)
            VALUES ($1, $2, 0)
            ON CONFLICT (user_id, usage_date)
            DO UPDATE SET free_requests_used = daily_usage.free_requests_used
            RETURNING user_id, usage_date, free_requests_used
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn increment_free_usage(
        &self,
        user_id: Uuid,
        date: Date,
        cap: i32,
    ) -> Result<DailyUsage, StoreError> {
        let row = sqlx::query_as::<_, DailyUsage>(
            r#"
            INSERT INTO daily_usage (user_id, usage_date, free_requests_used)
            VALUES ($1, $2, LEAST(1, $3))
            ON CONFLICT (user_id, usage_date)
            DO UPDATE SET free_requests_used = LEAST(daily_usage.free_requests_used + 1, $3)
            RETURNING user_id, usage_date, free_requests_used
            "#,
        )
        .bind(user_id)
        .bind(date)
        .bind(cap)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn decrement_purchased_credits(&self, user_id: Uuid) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET purchased_credits = GREATEST(purchased_credits - 1, 0)
            WHERE id = $1
            RETURNING id, external_id, first_name, daily_goal_calories, goal_confirmed,
                      purchased_credits, unlimited_until, created_at
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    async fn add_purchased_credits(&self, user_id: Uuid, count: i32) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET purchased_credits = LEAST(purchased_credits::BIGINT + $2, 2147483647)::INTEGER
            WHERE id = $1
            RETURNING id, external_id, first_name, daily_goal_calories, goal_confirmed,
                      purchased_credits, unlimited_until, created_at
            "#,
        )
        .bind(user_id)
        .bind(count)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    async fn set_unlimited_until(&self, user_id: Uuid, until: Date) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET unlimited_until = $2
            WHERE id = $1
            RETURNING id, external_id, first_name, daily_goal_calories, goal_confirmed,
                      purchased_credits, unlimited_until, created_at
            "#,
        )
        .bind(user_id)
        .bind(until)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }

    async fn insert_food_entry(&self, entry: NewFoodEntry) -> Result<FoodEntry, StoreError> {
        let row = sqlx::query_as::<_, FoodEntry>(
            r#"
            INSERT INTO food_entries (id, user_id, entry_date, description, calories, analysis_method)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, entry_date, description, calories, analysis_method, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.entry_date)
        .bind(&entry.description)
        .bind(entry.calories)
        .bind(entry.analysis_method.as_str())
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn list_entries_for_date(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<Vec<FoodEntry>, StoreError> {
        let rows = sqlx::query_as::<_, FoodEntry>(
            r#"
            SELECT id, user_id, entry_date, description, calories, analysis_method, created_at
            FROM food_entries
            WHERE user_id = $1 AND entry_date = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}
