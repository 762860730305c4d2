use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use super::{DailyUsage, FoodEntry, NewFoodEntry, Store, StoreError, User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    counters: HashMap<(Uuid, Date), DailyUsage>,
    entries: Vec<FoodEntry>,
}

/// In-process store for tests. `set_unavailable(true)` makes every call fail
/// the way a dropped database connection would.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<FoodEntry> {
        self.tables.lock().unwrap().entries.clone()
    }

    pub fn counter(&self, user_id: Uuid, date: Date) -> Option<DailyUsage> {
        self.tables.lock().unwrap().counters.get(&(user_id, date)).cloned()
    }

    /// Seeds entitlement state directly, bypassing the ledger.
    pub fn patch_user(&self, user_id: Uuid, patch: impl FnOnce(&mut User)) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.get_mut(&user_id) {
            patch(user);
        }
    }

    pub fn seed_counter(&self, user_id: Uuid, date: Date, used: i32) {
        self.tables.lock().unwrap().counters.insert(
            (user_id, date),
            DailyUsage {
                user_id,
                usage_date: date,
                free_requests_used: used,
            },
        );
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn update_user(
        &self,
        user_id: Uuid,
        f: impl FnOnce(&mut User),
    ) -> Result<User, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))?;
        f(user);
        Ok(user.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_user(
        &self,
        external_id: i64,
        first_name: Option<&str>,
    ) -> Result<User, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.values_mut().find(|u| u.external_id == external_id) {
            if let Some(name) = first_name {
                user.first_name = Some(name.to_string());
            }
            return Ok(user.clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            external_id,
            first_name: first_name.map(str::to_string),
            daily_goal_calories: 2000,
            goal_confirmed: false,
            purchased_credits: 0,
            unlimited_until: None,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, external_id: i64) -> Result<Option<User>, StoreError> {
        self.check()?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .values()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        self.check()?;
        Ok(self.tables.lock().unwrap().users.get(&user_id).cloned())
    }

    async fn set_daily_goal(&self, external_id: i64, goal: i32) -> Result<User, StoreError> {
        let user = self
            .get_user(external_id)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(external_id.to_string()))?;
        self.update_user(user.id, |u| {
            u.daily_goal_calories = goal;
            u.goal_confirmed = true;
        })
    }

    async fn find_daily_counter(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<Option<DailyUsage>, StoreError> {
        self.check()?;
        Ok(self.counter(user_id, date))
    }

    async fn get_or_create_daily_counter(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<DailyUsage, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .counters
            .entry((user_id, date))
            .or_insert_with(|| DailyUsage {
                user_id,
                usage_date: date,
                free_requests_used: 0,
            });
        Ok(row.clone())
    }

    async fn increment_free_usage(
        &self,
        user_id: Uuid,
        date: Date,
        cap: i32,
    ) -> Result<DailyUsage, StoreError> {
        self.check()?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .counters
            .entry((user_id, date))
            .or_insert_with(|| DailyUsage {
                user_id,
                usage_date: date,
                free_requests_used: 0,
            });
        row.free_requests_used = (row.free_requests_used + 1).min(cap);
        Ok(row.clone())
    }

    async fn decrement_purchased_credits(&self, user_id: Uuid) -> Result<User, StoreError> {
        self.update_user(user_id, |u| {
            u.purchased_credits = (u.purchased_credits - 1).max(0);
        })
    }

    async fn add_purchased_credits(&self, user_id: Uuid, count: i32) -> Result<User, StoreError> {
        self.update_user(user_id, |u| {
            u.purchased_credits = u.purchased_credits.saturating_add(count);
        })
    }

    async fn set_unlimited_until(&self, user_id: Uuid, until: Date) -> Result<User, StoreError> {
        self.update_user(user_id, |u| u.unlimited_until = Some(until))
    }

    async fn insert_food_entry(&self, entry: NewFoodEntry) -> Result<FoodEntry, StoreError> {
        self.check()?;
        let row = FoodEntry {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            entry_date: entry.entry_date,
            description: entry.description,
            calories: entry.calories,
            analysis_method: entry.analysis_method,
            created_at: OffsetDateTime::now_utc(),
        };
        self.tables.lock().unwrap().entries.push(row.clone());
        Ok(row)
    }

    async fn list_entries_for_date(
        &self,
        user_id: Uuid,
        date: Date,
    ) -> Result<Vec<FoodEntry>, StoreError> {
        self.check()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.user_id == user_id && e.entry_date == date)
            .cloned()
            .collect())
    }
}
