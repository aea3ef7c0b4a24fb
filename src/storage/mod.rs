// Store contracts and backends
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{AvailabilityRecord, Match};

pub use memory::{MemoryAvailabilityStore, MemoryMatchStore};
pub use postgres::{PgAvailabilityStore, PgMatchStore};

/// Persistence contract for per-day availability records.
///
/// Implementations are expected to provide read-committed, per-row atomic
/// updates; no multi-row transaction is required by callers.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// The active record for (user, day), if any.
    async fn find_for_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityRecord>>;

    /// Insert a new record. Fails with Conflict when an active record already
    /// exists for the same (user, day).
    async fn insert(&self, record: &AvailabilityRecord) -> Result<()>;

    /// Replace an existing record by id. Fails with NotFound when missing.
    async fn update(&self, record: &AvailabilityRecord) -> Result<()>;

    /// Active, available, queued records for `date`, ordered by `queued_at`
    /// ascending (oldest wait first), capped at `limit`.
    async fn list_queued(&self, date: NaiveDate, limit: usize) -> Result<Vec<AvailabilityRecord>>;

    /// Hard-delete records for days strictly before `cutoff`. Returns the
    /// number of rows removed.
    async fn delete_before(&self, cutoff: NaiveDate) -> Result<u64>;

    /// Force queued records whose heartbeat is older than `heartbeat_cutoff`
    /// (or absent) to offline, stamping `offline_at`. Returns the updated
    /// records so callers can publish per-user events.
    async fn mark_stale_queued_offline(
        &self,
        heartbeat_cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRecord>>;
}

/// Persistence contract for match records.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn insert(&self, m: &Match) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Match>>;

    /// Replace an existing match by id. Fails with NotFound when missing.
    async fn update(&self, m: &Match) -> Result<()>;

    /// The pending or accepted active match for the unordered pair {a, b},
    /// if one exists.
    async fn find_occupying_for_pair(&self, a: &str, b: &str) -> Result<Option<Match>>;

    /// Number of pending or accepted daily matches involving `user_id` on
    /// `date`.
    async fn count_daily_for_user(&self, user_id: &str, date: NaiveDate) -> Result<u64>;

    /// Flip every pending match with `expires_at` before `now` to expired,
    /// stamping `expired_at`. Returns the affected matches.
    async fn expire_pending_before(&self, now: DateTime<Utc>) -> Result<Vec<Match>>;
}
