use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{EmberError, Result};
use crate::models::{
    AvailabilityRecord, AvailabilityStatus, Match, MatchStatus, MatchType, ScoreBreakdown,
};
use crate::storage::{AvailabilityStore, MatchStore};

/// Postgres error code for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Open a connection pool and run pending migrations.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    min_connections: u32,
) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .test_before_acquire(true)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Health check for the database connection.
pub async fn health_check(pool: &PgPool) -> Result<bool> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map(|_| true)
        .map_err(Into::into)
}

/// Availability store backed by the `availabilities` table.
///
/// The partial unique index on (user_id, date) WHERE is_active is the
/// authoritative guard for the one-active-record-per-day invariant.
pub struct PgAvailabilityStore {
    pool: PgPool,
}

impl PgAvailabilityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AvailabilityStore for PgAvailabilityStore {
    async fn find_for_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityRecord>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM availabilities
            WHERE user_id = $1 AND date = $2 AND is_active
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_availability).transpose()
    }

    async fn insert(&self, record: &AvailabilityRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO availabilities (
                id, user_id, date, status, last_heartbeat,
                queued_at, matched_at, busy_at, offline_at,
                is_active, is_available, preferences, metadata,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(record.date)
        .bind(record.status)
        .bind(record.last_heartbeat)
        .bind(record.queued_at)
        .bind(record.matched_at)
        .bind(record.busy_at)
        .bind(record.offline_at)
        .bind(record.is_active)
        .bind(record.is_available)
        .bind(serde_json::to_value(&record.preferences)?)
        .bind(&record.metadata)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(EmberError::Conflict(format!(
                "availability already exists for user {} on {}",
                record.user_id, record.date
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, record: &AvailabilityRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE availabilities SET
                status = $2, last_heartbeat = $3,
                queued_at = $4, matched_at = $5, busy_at = $6, offline_at = $7,
                is_active = $8, is_available = $9, preferences = $10,
                metadata = $11, updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(record.id)
        .bind(record.status)
        .bind(record.last_heartbeat)
        .bind(record.queued_at)
        .bind(record.matched_at)
        .bind(record.busy_at)
        .bind(record.offline_at)
        .bind(record.is_active)
        .bind(record.is_available)
        .bind(serde_json::to_value(&record.preferences)?)
        .bind(&record.metadata)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EmberError::NotFound(format!(
                "availability record {} not found",
                record.id
            )));
        }
        Ok(())
    }

    async fn list_queued(&self, date: NaiveDate, limit: usize) -> Result<Vec<AvailabilityRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM availabilities
            WHERE date = $1 AND is_active AND is_available AND status = 'queued'
            ORDER BY queued_at ASC NULLS LAST
            LIMIT $2
            "#,
        )
        .bind(date)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_availability).collect()
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let result = sqlx::query("DELETE FROM availabilities WHERE date < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn mark_stale_queued_offline(
        &self,
        heartbeat_cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRecord>> {
        let rows = sqlx::query(
            r#"
            UPDATE availabilities
            SET status = 'offline', offline_at = $2, is_available = FALSE, updated_at = $2
            WHERE is_active AND status = 'queued'
              AND (last_heartbeat IS NULL OR last_heartbeat < $1)
            RETURNING *
            "#,
        )
        .bind(heartbeat_cutoff)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_availability).collect()
    }
}

/// Match store backed by the `matches` table.
///
/// The partial unique index over (LEAST(user1_id, user2_id),
/// GREATEST(user1_id, user2_id)) for pending/accepted rows is the
/// authoritative guard against double-booking a pair under concurrency.
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn insert(&self, m: &Match) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO matches (
                id, user1_id, user2_id, profile1_id, profile2_id,
                status, match_type, compatibility_score, score_breakdown,
                match_date, expires_at,
                accepted_at, rejected_at, cancelled_at, expired_at,
                is_active, is_mutual, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            "#,
        )
        .bind(m.id)
        .bind(&m.user1_id)
        .bind(&m.user2_id)
        .bind(&m.profile1_id)
        .bind(&m.profile2_id)
        .bind(m.status)
        .bind(m.match_type)
        .bind(m.compatibility_score)
        .bind(serde_json::to_value(m.score_breakdown)?)
        .bind(m.match_date)
        .bind(m.expires_at)
        .bind(m.accepted_at)
        .bind(m.rejected_at)
        .bind(m.cancelled_at)
        .bind(m.expired_at)
        .bind(m.is_active)
        .bind(m.is_mutual)
        .bind(&m.metadata)
        .bind(m.created_at)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(EmberError::Conflict(format!(
                "active match already exists for pair {{{}, {}}}",
                m.user1_id, m.user2_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<Match>> {
        let row = sqlx::query("SELECT * FROM matches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_match).transpose()
    }

    async fn update(&self, m: &Match) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE matches SET
                status = $2, compatibility_score = $3, score_breakdown = $4,
                expires_at = $5, accepted_at = $6, rejected_at = $7,
                cancelled_at = $8, expired_at = $9, is_active = $10,
                is_mutual = $11, metadata = $12, updated_at = $13
            WHERE id = $1
            "#,
        )
        .bind(m.id)
        .bind(m.status)
        .bind(m.compatibility_score)
        .bind(serde_json::to_value(m.score_breakdown)?)
        .bind(m.expires_at)
        .bind(m.accepted_at)
        .bind(m.rejected_at)
        .bind(m.cancelled_at)
        .bind(m.expired_at)
        .bind(m.is_active)
        .bind(m.is_mutual)
        .bind(&m.metadata)
        .bind(m.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(EmberError::NotFound(format!("match {} not found", m.id)));
        }
        Ok(())
    }

    async fn find_occupying_for_pair(&self, a: &str, b: &str) -> Result<Option<Match>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM matches
            WHERE is_active AND status IN ('pending', 'accepted')
              AND ((user1_id = $1 AND user2_id = $2) OR (user1_id = $2 AND user2_id = $1))
            LIMIT 1
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_match).transpose()
    }

    async fn count_daily_for_user(&self, user_id: &str, date: NaiveDate) -> Result<u64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS daily_count FROM matches
            WHERE is_active AND status IN ('pending', 'accepted')
              AND match_type = 'daily' AND match_date = $2
              AND (user1_id = $1 OR user2_id = $1)
            "#,
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = row.get("daily_count");
        Ok(count as u64)
    }

    async fn expire_pending_before(&self, now: DateTime<Utc>) -> Result<Vec<Match>> {
        let rows = sqlx::query(
            r#"
            UPDATE matches
            SET status = 'expired', expired_at = $1, updated_at = $1
            WHERE status = 'pending' AND expires_at < $1
            RETURNING *
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_match).collect()
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false)
}

fn row_to_availability(row: &PgRow) -> Result<AvailabilityRecord> {
    let preferences: Value = row.get("preferences");
    Ok(AvailabilityRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        date: row.get("date"),
        status: row.get::<AvailabilityStatus, _>("status"),
        last_heartbeat: row.get("last_heartbeat"),
        queued_at: row.get("queued_at"),
        matched_at: row.get("matched_at"),
        busy_at: row.get("busy_at"),
        offline_at: row.get("offline_at"),
        is_active: row.get("is_active"),
        is_available: row.get("is_available"),
        preferences: serde_json::from_value(preferences)?,
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn row_to_match(row: &PgRow) -> Result<Match> {
    let breakdown: Value = row.get("score_breakdown");
    Ok(Match {
        id: row.get("id"),
        user1_id: row.get("user1_id"),
        user2_id: row.get("user2_id"),
        profile1_id: row.get("profile1_id"),
        profile2_id: row.get("profile2_id"),
        status: row.get::<MatchStatus, _>("status"),
        match_type: row.get::<MatchType, _>("match_type"),
        compatibility_score: row.get("compatibility_score"),
        score_breakdown: serde_json::from_value::<ScoreBreakdown>(breakdown)?,
        match_date: row.get("match_date"),
        expires_at: row.get("expires_at"),
        accepted_at: row.get("accepted_at"),
        rejected_at: row.get("rejected_at"),
        cancelled_at: row.get("cancelled_at"),
        expired_at: row.get("expired_at"),
        is_active: row.get("is_active"),
        is_mutual: row.get("is_mutual"),
        metadata: row.get("metadata"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
