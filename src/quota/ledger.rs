use std::sync::Arc;

use serde::{Serialize, Serializer};
use time::{Date, OffsetDateTime, UtcOffset};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::locks::UserLocks;
use crate::clock::{service_date, start_of_day, Clock};
use crate::store::{Store, StoreError, User};

/// Free analyses per user per service-local day.
pub const FREE_DAILY_LIMIT: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    Limited(u32),
    Unbounded,
}

impl Remaining {
    fn count(self) -> Option<u32> {
        match self {
            Remaining::Limited(n) => Some(n),
            Remaining::Unbounded => None,
        }
    }
}

impl Serialize for Remaining {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Remaining::Limited(n) => serializer.serialize_u32(*n),
            Remaining::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Allowance {
    pub allowed: bool,
    pub free_remaining: Remaining,
    pub purchased_remaining: Remaining,
    pub is_unlimited: bool,
}

impl Allowance {
    /// Analyses left before the user is blocked; `None` while unlimited.
    pub fn total_remaining(&self) -> Option<u32> {
        Some(self.free_remaining.count()? + self.purchased_remaining.count()?)
    }

    /// The allowance left once `source` has been charged against this one.
    pub fn after_charge(self, source: ChargeSource) -> Allowance {
        let mut next = self;
        match (source, &mut next.free_remaining, &mut next.purchased_remaining) {
            (ChargeSource::Free, Remaining::Limited(n), _) => *n = n.saturating_sub(1),
            (ChargeSource::Purchased, _, Remaining::Limited(n)) => *n = n.saturating_sub(1),
            _ => {}
        }
        if !next.is_unlimited {
            next.allowed = next.total_remaining().map_or(false, |n| n > 0);
        }
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeSource {
    Unlimited,
    Free,
    Purchased,
}

/// Whether `user` is entitled to one more analysis at `now`.
pub fn compute_allowance(
    user: &User,
    free_used_today: i32,
    now: OffsetDateTime,
    offset: UtcOffset,
) -> Allowance {
    if unlimited_active(user, now, offset) {
        return Allowance {
            allowed: true,
            free_remaining: Remaining::Unbounded,
            purchased_remaining: Remaining::Unbounded,
            is_unlimited: true,
        };
    }
    let free = (FREE_DAILY_LIMIT - free_used_today).max(0) as u32;
    let purchased = user.purchased_credits.max(0) as u32;
    Allowance {
        allowed: free + purchased > 0,
        free_remaining: Remaining::Limited(free),
        purchased_remaining: Remaining::Limited(purchased),
        is_unlimited: false,
    }
}

fn unlimited_active(user: &User, now: OffsetDateTime, offset: UtcOffset) -> bool {
    user.unlimited_until
        .map(|until| start_of_day(until, offset) > now)
        .unwrap_or(false)
}

/// Owns entitlement state: the free daily allowance, the purchased balance
/// and the unlimited subscription. Precedence is unlimited, then free, then
/// purchased.
pub struct QuotaLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    offset: UtcOffset,
    locks: UserLocks,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, offset: UtcOffset) -> Self {
        Self {
            store,
            clock,
            offset,
            locks: UserLocks::default(),
        }
    }

    pub fn today(&self) -> Date {
        service_date(self.clock.now(), self.offset)
    }

    #[instrument(skip(self))]
    pub async fn check_allowance(&self, user_id: Uuid) -> Result<Allowance, StoreError> {
        let user = self.load_user(user_id).await?;
        let now = self.clock.now();
        let free_used = self
            .store
            .find_daily_counter(user_id, service_date(now, self.offset))
            .await?
            .map(|c| c.free_requests_used)
            .unwrap_or(0);
        Ok(compute_allowance(&user, free_used, now, self.offset))
    }

    /// Charges one analysis outside any reservation. Serialized against
    /// concurrent reservations for the same user. The analysis flow charges
    /// through [`Reservation::charge`] instead.
    #[allow(dead_code)]
    pub async fn charge(&self, user_id: Uuid) -> Result<ChargeSource, StoreError> {
        let _guard = self.locks.acquire(user_id).await;
        self.charge_locked(user_id).await
    }

    /// Locks the user, reads the allowance and hands back a reservation that
    /// keeps the lock until it is charged or dropped. Check-then-charge for
    /// one user therefore can't interleave with another attempt by that user.
    pub async fn reserve(&self, user_id: Uuid) -> Result<Reservation<'_>, StoreError> {
        let guard = self.locks.acquire(user_id).await;
        let allowance = self.check_allowance(user_id).await?;
        debug!(%user_id, ?allowance, "allowance reserved");
        Ok(Reservation {
            ledger: self,
            user_id,
            allowance,
            _guard: guard,
        })
    }

    #[instrument(skip(self))]
    pub async fn grant_credits(&self, user_id: Uuid, count: u32) -> Result<User, StoreError> {
        let _guard = self.locks.acquire(user_id).await;
        let count = i32::try_from(count).unwrap_or(i32::MAX);
        let user = self.store.add_purchased_credits(user_id, count).await?;
        info!(%user_id, count, balance = user.purchased_credits, "credits granted");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn grant_unlimited_until(&self, user_id: Uuid, until: Date) -> Result<User, StoreError> {
        let _guard = self.locks.acquire(user_id).await;
        let user = self.store.set_unlimited_until(user_id, until).await?;
        info!(%user_id, %until, "unlimited entitlement granted");
        Ok(user)
    }

    async fn charge_locked(&self, user_id: Uuid) -> Result<ChargeSource, StoreError> {
        let user = self.load_user(user_id).await?;
        let now = self.clock.now();
        if unlimited_active(&user, now, self.offset) {
            info!(%user_id, source = "unlimited", "analysis charged");
            return Ok(ChargeSource::Unlimited);
        }

        let today = service_date(now, self.offset);
        let counter = self.store.get_or_create_daily_counter(user_id, today).await?;
        let source = if counter.free_requests_used < FREE_DAILY_LIMIT {
            self.store
                .increment_free_usage(user_id, today, FREE_DAILY_LIMIT)
                .await?;
            ChargeSource::Free
        } else {
            // Floored at zero by the store; an empty balance is a no-op.
            self.store.decrement_purchased_credits(user_id).await?;
            ChargeSource::Purchased
        };
        info!(%user_id, ?source, "analysis charged");
        Ok(source)
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User, StoreError> {
        self.store
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| StoreError::UserNotFound(user_id.to_string()))
    }
}

/// An allowance decision for one analysis attempt. Charging consumes it, so
/// an attempt can be charged at most once; dropping it charges nothing.
pub struct Reservation<'a> {
    ledger: &'a QuotaLedger,
    user_id: Uuid,
    allowance: Allowance,
    _guard: OwnedMutexGuard<()>,
}

impl Reservation<'_> {
    pub fn allowance(&self) -> Allowance {
        self.allowance
    }

    pub async fn charge(self) -> Result<ChargeSource, StoreError> {
        self.ledger.charge_locked(self.user_id).await
    }
}
