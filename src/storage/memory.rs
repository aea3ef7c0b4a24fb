use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{EmberError, Result};
use crate::models::{AvailabilityRecord, AvailabilityStatus, Match, MatchStatus, MatchType};
use crate::storage::{AvailabilityStore, MatchStore};

/// In-process availability store backed by a map keyed on (user, day).
///
/// Used by the test suites and for embedding the core without a database; the
/// Postgres store is the production backend.
#[derive(Default)]
pub struct MemoryAvailabilityStore {
    records: RwLock<HashMap<(String, NaiveDate), AvailabilityRecord>>,
}

impl MemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for MemoryAvailabilityStore {
    async fn find_for_day(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<AvailabilityRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(user_id.to_string(), date))
            .filter(|r| r.is_active)
            .cloned())
    }

    async fn insert(&self, record: &AvailabilityRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let key = (record.user_id.clone(), record.date);
        if records.get(&key).map(|r| r.is_active).unwrap_or(false) {
            return Err(EmberError::Conflict(format!(
                "availability already exists for user {} on {}",
                record.user_id, record.date
            )));
        }
        records.insert(key, record.clone());
        Ok(())
    }

    async fn update(&self, record: &AvailabilityRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let key = (record.user_id.clone(), record.date);
        match records.get_mut(&key) {
            Some(existing) if existing.id == record.id => {
                *existing = record.clone();
                Ok(())
            }
            _ => Err(EmberError::NotFound(format!(
                "availability record {} not found",
                record.id
            ))),
        }
    }

    async fn list_queued(&self, date: NaiveDate, limit: usize) -> Result<Vec<AvailabilityRecord>> {
        let records = self.records.read().await;
        let mut queued: Vec<AvailabilityRecord> = records
            .values()
            .filter(|r| {
                r.date == date
                    && r.is_active
                    && r.is_available
                    && r.status == AvailabilityStatus::Queued
            })
            .cloned()
            .collect();

        queued.sort_by_key(|r| r.queued_at);
        queued.truncate(limit);
        Ok(queued)
    }

    async fn delete_before(&self, cutoff: NaiveDate) -> Result<u64> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|(_, date), _| *date >= cutoff);
        Ok((before - records.len()) as u64)
    }

    async fn mark_stale_queued_offline(
        &self,
        heartbeat_cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailabilityRecord>> {
        let mut records = self.records.write().await;
        let mut updated = Vec::new();

        for record in records.values_mut() {
            if record.is_active
                && record.status == AvailabilityStatus::Queued
                && record.last_heartbeat.map_or(true, |beat| beat < heartbeat_cutoff)
            {
                record.stamp_status(AvailabilityStatus::Offline, now);
                updated.push(record.clone());
            }
        }

        Ok(updated)
    }
}

/// In-process match store backed by an id-keyed map.
#[derive(Default)]
pub struct MemoryMatchStore {
    matches: RwLock<HashMap<Uuid, Match>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchStore for MemoryMatchStore {
    async fn insert(&self, m: &Match) -> Result<()> {
        let mut matches = self.matches.write().await;
        if m.occupies_pair() {
            let duplicate = matches
                .values()
                .any(|existing| existing.occupies_pair() && pairs_equal(existing, m));
            if duplicate {
                return Err(EmberError::Conflict(format!(
                    "active match already exists for pair {{{}, {}}}",
                    m.user1_id, m.user2_id
                )));
            }
        }
        matches.insert(m.id, m.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Match>> {
        let matches = self.matches.read().await;
        Ok(matches.get(&id).cloned())
    }

    async fn update(&self, m: &Match) -> Result<()> {
        let mut matches = self.matches.write().await;
        match matches.get_mut(&m.id) {
            Some(existing) => {
                *existing = m.clone();
                Ok(())
            }
            None => Err(EmberError::NotFound(format!("match {} not found", m.id))),
        }
    }

    async fn find_occupying_for_pair(&self, a: &str, b: &str) -> Result<Option<Match>> {
        let matches = self.matches.read().await;
        Ok(matches
            .values()
            .find(|m| m.occupies_pair() && involves_pair(m, a, b))
            .cloned())
    }

    async fn count_daily_for_user(&self, user_id: &str, date: NaiveDate) -> Result<u64> {
        let matches = self.matches.read().await;
        let count = matches
            .values()
            .filter(|m| {
                m.match_type == MatchType::Daily
                    && m.match_date == date
                    && m.occupies_pair()
                    && m.involves(user_id)
            })
            .count();
        Ok(count as u64)
    }

    async fn expire_pending_before(&self, now: DateTime<Utc>) -> Result<Vec<Match>> {
        let mut matches = self.matches.write().await;
        let mut expired = Vec::new();

        for m in matches.values_mut() {
            if m.status == MatchStatus::Pending && m.expires_at < now {
                m.status = MatchStatus::Expired;
                m.expired_at = Some(now);
                m.updated_at = now;
                expired.push(m.clone());
            }
        }

        Ok(expired)
    }
}

fn pairs_equal(a: &Match, b: &Match) -> bool {
    involves_pair(a, &b.user1_id, &b.user2_id)
}

fn involves_pair(m: &Match, a: &str, b: &str) -> bool {
    (m.user1_id == a && m.user2_id == b) || (m.user1_id == b && m.user2_id == a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScoreBreakdown;
    use chrono::Duration;

    fn noon() -> DateTime<Utc> {
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn make_match(u1: &str, u2: &str, now: DateTime<Utc>) -> Match {
        Match {
            id: Uuid::new_v4(),
            user1_id: u1.to_string(),
            user2_id: u2.to_string(),
            profile1_id: format!("p-{}", u1),
            profile2_id: format!("p-{}", u2),
            status: MatchStatus::Pending,
            match_type: MatchType::Daily,
            compatibility_score: 74.0,
            score_breakdown: ScoreBreakdown::uniform(74.0),
            match_date: now.date_naive(),
            expires_at: now + Duration::hours(24),
            accepted_at: None,
            rejected_at: None,
            cancelled_at: None,
            expired_at: None,
            is_active: true,
            is_mutual: false,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_availability_insert_conflicts_on_same_day() {
        let store = MemoryAvailabilityStore::new();
        let now = noon();
        let record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);

        store.insert(&record).await.unwrap();
        let again = store.insert(&record).await;

        assert!(matches!(again, Err(EmberError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_list_queued_is_fifo_by_queued_at() {
        let store = MemoryAvailabilityStore::new();
        let now = noon();
        let date = now.date_naive();

        let late = AvailabilityRecord::new("late", date, AvailabilityStatus::Queued, now);
        let early =
            AvailabilityRecord::new("early", date, AvailabilityStatus::Queued, now - Duration::minutes(5));
        store.insert(&late).await.unwrap();
        store.insert(&early).await.unwrap();

        let queued = store.list_queued(date, 50).await.unwrap();

        assert_eq!(queued.len(), 2);
        assert_eq!(queued[0].user_id, "early");
        assert_eq!(queued[1].user_id, "late");
    }

    #[tokio::test]
    async fn test_mark_stale_queued_offline() {
        let store = MemoryAvailabilityStore::new();
        let now = noon();
        let date = now.date_naive();

        let mut stale = AvailabilityRecord::new("stale", date, AvailabilityStatus::Queued, now);
        stale.record_heartbeat(now - Duration::minutes(10));
        let mut fresh = AvailabilityRecord::new("fresh", date, AvailabilityStatus::Queued, now);
        fresh.record_heartbeat(now);
        store.insert(&stale).await.unwrap();
        store.insert(&fresh).await.unwrap();

        let cutoff = now - Duration::minutes(5);
        let flipped = store.mark_stale_queued_offline(cutoff, now).await.unwrap();

        assert_eq!(flipped.len(), 1);
        assert_eq!(flipped[0].user_id, "stale");
        assert_eq!(flipped[0].status, AvailabilityStatus::Offline);

        let remaining = store.list_queued(date, 50).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "fresh");
    }

    #[tokio::test]
    async fn test_delete_before_retention_cutoff() {
        let store = MemoryAvailabilityStore::new();
        let now = noon();
        let old_date = now.date_naive() - Duration::days(8);

        let old = AvailabilityRecord::new("old", old_date, AvailabilityStatus::Idle, now);
        let current = AvailabilityRecord::new("new", now.date_naive(), AvailabilityStatus::Idle, now);
        store.insert(&old).await.unwrap();
        store.insert(&current).await.unwrap();

        let removed = store
            .delete_before(now.date_naive() - Duration::days(7))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert!(store.find_for_day("old", old_date).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_match_pair_uniqueness_is_unordered() {
        let store = MemoryMatchStore::new();
        let now = noon();

        store.insert(&make_match("a", "b", now)).await.unwrap();
        let reversed = store.insert(&make_match("b", "a", now)).await;

        assert!(matches!(reversed, Err(EmberError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_expired_match_frees_the_pair() {
        let store = MemoryMatchStore::new();
        let now = noon();

        let mut m = make_match("a", "b", now);
        m.expires_at = now - Duration::hours(1);
        store.insert(&m).await.unwrap();

        let expired = store.expire_pending_before(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].status, MatchStatus::Expired);

        // Second run with no time passing affects nothing
        let again = store.expire_pending_before(now).await.unwrap();
        assert!(again.is_empty());

        // The pair is free again
        store.insert(&make_match("a", "b", now)).await.unwrap();
    }

    #[tokio::test]
    async fn test_count_daily_for_user() {
        let store = MemoryMatchStore::new();
        let now = noon();

        store.insert(&make_match("a", "b", now)).await.unwrap();
        store.insert(&make_match("a", "c", now)).await.unwrap();

        assert_eq!(store.count_daily_for_user("a", now.date_naive()).await.unwrap(), 2);
        assert_eq!(store.count_daily_for_user("b", now.date_naive()).await.unwrap(), 1);
        assert_eq!(store.count_daily_for_user("d", now.date_naive()).await.unwrap(), 0);
    }
}
