use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{EmberError, Result};
use crate::models::{
    AvailabilityChangedEvent, AvailabilityRecord, AvailabilityStatus,
    AVAILABILITY_RETENTION_DAYS, HEARTBEAT_TTL_SECS,
};
use crate::services::directory::ProfileDirectory;
use crate::services::events::EventBridge;
use crate::storage::AvailabilityStore;

/// Manages per-user, per-day availability records: status transitions,
/// heartbeats, the queued-candidate fetch, and the two sweepers.
pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
    directory: Arc<dyn ProfileDirectory>,
    events: Arc<dyn EventBridge>,
    queue_limit: usize,
}

impl AvailabilityService {
    pub fn new(
        store: Arc<dyn AvailabilityStore>,
        directory: Arc<dyn ProfileDirectory>,
        events: Arc<dyn EventBridge>,
        queue_limit: usize,
    ) -> Self {
        Self {
            store,
            directory,
            events,
            queue_limit,
        }
    }

    /// Idempotent status upsert for today. Creates the day's record when
    /// absent; otherwise transitions the existing record, stamping the
    /// status-specific timestamp. The metadata patch is shallow-merged and
    /// `lastActivity` refreshed either way.
    pub async fn set_status(
        &self,
        user_id: &str,
        status: AvailabilityStatus,
        metadata: Option<Value>,
    ) -> Result<AvailabilityRecord> {
        self.ensure_active_user(user_id).await?;

        let now = Utc::now();
        let today = now.date_naive();
        let patch = metadata.unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        let record = match self.store.find_for_day(user_id, today).await? {
            Some(mut record) => {
                record.stamp_status(status, now);
                record.merge_metadata(&patch, now);
                self.store.update(&record).await?;
                record
            }
            None => {
                let mut record = AvailabilityRecord::new(user_id, today, status, now);
                record.merge_metadata(&patch, now);
                self.store.insert(&record).await?;
                record
            }
        };

        debug!("Availability for {} set to {}", user_id, status);
        self.publish(&record).await;
        Ok(record)
    }

    /// Record a liveness signal. Creates today's idle record when absent and
    /// always refreshes `last_heartbeat`.
    pub async fn heartbeat(
        &self,
        user_id: &str,
        metadata: Option<Value>,
    ) -> Result<AvailabilityRecord> {
        self.ensure_active_user(user_id).await?;

        let now = Utc::now();
        let today = now.date_naive();

        let record = match self.store.find_for_day(user_id, today).await? {
            Some(mut record) => {
                record.record_heartbeat(now);
                if let Some(patch) = &metadata {
                    record.merge_metadata(patch, now);
                }
                self.store.update(&record).await?;
                record
            }
            None => {
                let mut record =
                    AvailabilityRecord::new(user_id, today, AvailabilityStatus::Idle, now);
                record.record_heartbeat(now);
                if let Some(patch) = &metadata {
                    record.merge_metadata(patch, now);
                }
                self.store.insert(&record).await?;
                record
            }
        };

        self.publish(&record).await;
        Ok(record)
    }

    /// Today's matchable queue: queued, active, available records in FIFO
    /// order by `queued_at`, post-filtered to users with a fresh heartbeat.
    pub async fn queued_candidates(&self, limit: Option<usize>) -> Result<Vec<AvailabilityRecord>> {
        let now = Utc::now();
        let today = now.date_naive();
        let limit = limit.unwrap_or(self.queue_limit);

        let queued = self.store.list_queued(today, limit).await?;
        let online: Vec<AvailabilityRecord> = queued
            .into_iter()
            .filter(|record| record.can_be_matched(now))
            .collect();

        debug!("{} queued candidates online", online.len());
        Ok(online)
    }

    /// Retention sweep: hard-delete records older than the retention window.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let cutoff = Utc::now().date_naive() - Duration::days(AVAILABILITY_RETENTION_DAYS);
        let removed = self.store.delete_before(cutoff).await?;

        if removed > 0 {
            info!("Retention sweep removed {} availability records", removed);
        }
        Ok(removed)
    }

    /// Liveness sweep: flip queued records with stale or missing heartbeats to
    /// offline so the scheduler never pairs disconnected users.
    pub async fn sweep_offline(&self) -> Result<u64> {
        let now = Utc::now();
        let cutoff = now - Duration::seconds(HEARTBEAT_TTL_SECS);

        let flipped = self.store.mark_stale_queued_offline(cutoff, now).await?;
        for record in &flipped {
            self.publish(record).await;
        }

        if !flipped.is_empty() {
            info!("Offline sweep flipped {} stale queued users", flipped.len());
        }
        Ok(flipped.len() as u64)
    }

    async fn ensure_active_user(&self, user_id: &str) -> Result<()> {
        if !self.directory.are_active_users(&[user_id]).await? {
            return Err(EmberError::NotFound(format!(
                "user {} not found or inactive",
                user_id
            )));
        }
        Ok(())
    }

    /// Availability events are best-effort; a bridge failure never fails the
    /// operation that produced the change.
    async fn publish(&self, record: &AvailabilityRecord) {
        let event = AvailabilityChangedEvent::new(record, Utc::now());
        if let Err(e) = self.events.availability_changed(&event).await {
            warn!("Failed to publish availability event for {}: {}", record.user_id, e);
        }
    }
}
