use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::pairing::greedy_pairs;
use crate::core::scoring::compatibility_score;
use crate::error::{EmberError, Result};
use crate::models::{
    CompatibilityScore, Match, MatchFoundEvent, MatchStatus, MatchType, ScoringWeights,
};
use crate::services::directory::ProfileDirectory;
use crate::services::events::EventBridge;
use crate::storage::MatchStore;

/// Algorithm tag recorded on batch-generated matches.
pub const BATCH_ALGORITHM: &str = "daily-batch/v1";

/// Validation knobs for match creation.
#[derive(Debug, Clone, Copy)]
pub struct MatchPolicy {
    /// Pairs scoring below this are rejected.
    pub min_score: f64,
    /// Maximum pending/accepted daily matches per user per calendar day.
    pub daily_limit: u64,
    /// Lifetime of a match measured from midnight of its match date.
    pub ttl_hours: i64,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            min_score: crate::core::scoring::MIN_COMPATIBILITY_SCORE,
            daily_limit: 1,
            ttl_hours: 24,
        }
    }
}

/// Creation options beyond the pair itself.
#[derive(Debug, Clone)]
pub struct CreateMatchOptions {
    pub match_type: MatchType,
    /// Explicit expiry; defaults to match date midnight + TTL.
    pub expires_at: Option<DateTime<Utc>>,
    /// Participant exempt from the daily cap. Scoped per call so fallback
    /// pairings stay auditable.
    pub skip_daily_limit_for: Option<String>,
    /// Participants accepted on their own behalf at creation, so a live user
    /// is never left waiting on a synthetic partner's action.
    pub auto_accept_user_ids: Vec<String>,
    pub metadata: Value,
}

impl Default for CreateMatchOptions {
    fn default() -> Self {
        Self {
            match_type: MatchType::Daily,
            expires_at: None,
            skip_daily_limit_for: None,
            auto_accept_user_ids: Vec::new(),
            metadata: Value::Object(serde_json::Map::new()),
        }
    }
}

/// A fully specified creation request.
#[derive(Debug, Clone)]
pub struct CreateMatch {
    pub user1_id: String,
    pub user2_id: String,
    pub profile1_id: String,
    pub profile2_id: String,
    pub match_date: NaiveDate,
    /// Supplied for fallback pairings; computed from profile snapshots
    /// otherwise.
    pub score: Option<CompatibilityScore>,
    pub options: CreateMatchOptions,
}

/// Drives the match lifecycle: creation with full validation, participant
/// actions, the expiry sweep, and the batch pairing strategy.
pub struct MatchService {
    store: Arc<dyn MatchStore>,
    directory: Arc<dyn ProfileDirectory>,
    events: Arc<dyn EventBridge>,
    weights: ScoringWeights,
    policy: MatchPolicy,
}

impl MatchService {
    pub fn new(
        store: Arc<dyn MatchStore>,
        directory: Arc<dyn ProfileDirectory>,
        events: Arc<dyn EventBridge>,
        weights: ScoringWeights,
        policy: MatchPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            events,
            weights,
            policy,
        }
    }

    /// Create a match after validating participants, the unordered-pair
    /// uniqueness invariant, the daily cap, and the score threshold.
    pub async fn create(&self, req: CreateMatch) -> Result<Match> {
        let now = Utc::now();

        if req.user1_id == req.user2_id {
            return Err(EmberError::BadRequest(
                "cannot match a user with themselves".to_string(),
            ));
        }

        let user_ids = [req.user1_id.as_str(), req.user2_id.as_str()];
        if !self.directory.are_active_users(&user_ids).await? {
            return Err(EmberError::NotFound(format!(
                "one or both users are not active: {}, {}",
                req.user1_id, req.user2_id
            )));
        }

        let profile_ids = [req.profile1_id.as_str(), req.profile2_id.as_str()];
        if !self.directory.are_active_profiles(&profile_ids).await? {
            return Err(EmberError::NotFound(format!(
                "one or both profiles are not active: {}, {}",
                req.profile1_id, req.profile2_id
            )));
        }

        if let Some(existing) = self
            .store
            .find_occupying_for_pair(&req.user1_id, &req.user2_id)
            .await?
        {
            return Err(EmberError::Conflict(format!(
                "active match {} already exists for pair {{{}, {}}}",
                existing.id, req.user1_id, req.user2_id
            )));
        }

        if req.options.match_type == MatchType::Daily {
            self.check_daily_limit(&req).await?;
        }

        let score = match req.score {
            Some(score) => score,
            None => self.score_pair(&req.user1_id, &req.user2_id).await?,
        };

        if score.total < self.policy.min_score {
            return Err(EmberError::BadRequest(format!(
                "compatibility score {:.2} below threshold {:.2}",
                score.total, self.policy.min_score
            )));
        }

        let expires_at = req.options.expires_at.unwrap_or_else(|| {
            req.match_date.and_time(NaiveTime::MIN).and_utc()
                + Duration::hours(self.policy.ttl_hours)
        });

        let mut m = Match {
            id: Uuid::new_v4(),
            user1_id: req.user1_id,
            user2_id: req.user2_id,
            profile1_id: req.profile1_id,
            profile2_id: req.profile2_id,
            status: MatchStatus::Pending,
            match_type: req.options.match_type,
            compatibility_score: score.total,
            score_breakdown: score.breakdown,
            match_date: req.match_date,
            expires_at,
            accepted_at: None,
            rejected_at: None,
            cancelled_at: None,
            expired_at: None,
            is_active: true,
            is_mutual: false,
            metadata: req.options.metadata,
            created_at: now,
            updated_at: now,
        };

        if !req.options.auto_accept_user_ids.is_empty() {
            self.apply_auto_accept(&mut m, &req.options.auto_accept_user_ids, now)?;
        }

        self.store.insert(&m).await?;

        info!(
            "Created {} match {} for {{{}, {}}} scoring {:.2}",
            m.match_type, m.id, m.user1_id, m.user2_id, m.compatibility_score
        );

        self.publish_found(&m, now).await;
        Ok(m)
    }

    /// Accept a pending match on behalf of one of its participants.
    pub async fn accept(&self, match_id: Uuid, user_id: &str) -> Result<Match> {
        let now = Utc::now();
        let mut m = self.load_for_action(match_id, user_id).await?;

        self.ensure_actionable(&m, now)?;

        m.status = MatchStatus::Accepted;
        m.accepted_at = Some(now);
        m.is_mutual = true;
        m.updated_at = now;
        self.store.update(&m).await?;

        info!("Match {} accepted by {}", m.id, user_id);
        Ok(m)
    }

    /// Reject a pending match on behalf of one of its participants.
    pub async fn reject(&self, match_id: Uuid, user_id: &str) -> Result<Match> {
        let now = Utc::now();
        let mut m = self.load_for_action(match_id, user_id).await?;

        self.ensure_actionable(&m, now)?;

        m.status = MatchStatus::Rejected;
        m.rejected_at = Some(now);
        m.updated_at = now;
        self.store.update(&m).await?;

        info!("Match {} rejected by {}", m.id, user_id);
        Ok(m)
    }

    /// Cancel a match. Unlike accept/reject this is also allowed after
    /// acceptance; only absorbing states refuse it.
    pub async fn cancel(&self, match_id: Uuid, user_id: &str) -> Result<Match> {
        let now = Utc::now();
        let mut m = self.load_for_action(match_id, user_id).await?;

        if m.status.is_absorbing() {
            return Err(EmberError::BadRequest(format!(
                "match already {}",
                m.status
            )));
        }

        m.status = MatchStatus::Cancelled;
        m.cancelled_at = Some(now);
        m.updated_at = now;
        self.store.update(&m).await?;

        info!("Match {} cancelled by {}", m.id, user_id);
        Ok(m)
    }

    /// Flip every pending match past its expiry to expired. Returns the
    /// number of matches transitioned; immediately repeating the sweep
    /// affects none.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let expired = self.store.expire_pending_before(now).await?;

        if !expired.is_empty() {
            info!("Expiry sweep transitioned {} matches", expired.len());
        }
        Ok(expired.len() as u64)
    }

    /// Offline alternative to the live queue: pair every active, complete
    /// profile greedily, re-validating each pair through `create` so the
    /// uniqueness and cap invariants hold.
    pub async fn generate_daily_batch(&self, date: NaiveDate) -> Result<Vec<Match>> {
        let profiles = self.directory.list_active_complete_profiles().await?;
        let pairs = greedy_pairs(&profiles, &self.weights, self.policy.min_score);

        let mut created = Vec::new();
        for pair in pairs {
            let first = &profiles[pair.first];
            let second = &profiles[pair.second];

            let req = CreateMatch {
                user1_id: first.user_id.clone(),
                user2_id: second.user_id.clone(),
                profile1_id: first.profile_id.clone(),
                profile2_id: second.profile_id.clone(),
                match_date: date,
                score: Some(pair.score),
                options: CreateMatchOptions {
                    metadata: serde_json::json!({ "algorithm": BATCH_ALGORITHM }),
                    ..CreateMatchOptions::default()
                },
            };

            match self.create(req).await {
                Ok(m) => created.push(m),
                Err(e) if e.is_validation() => {
                    debug!(
                        "Batch pair {{{}, {}}} skipped: {}",
                        first.user_id, second.user_id, e
                    );
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Daily batch for {} created {} matches from {} profiles",
            date,
            created.len(),
            profiles.len()
        );
        Ok(created)
    }

    async fn check_daily_limit(&self, req: &CreateMatch) -> Result<()> {
        let skip = req.options.skip_daily_limit_for.as_deref();
        for user_id in [req.user1_id.as_str(), req.user2_id.as_str()] {
            if skip == Some(user_id) {
                continue;
            }
            let count = self
                .store
                .count_daily_for_user(user_id, req.match_date)
                .await?;
            if count >= self.policy.daily_limit {
                return Err(EmberError::BadRequest(format!(
                    "daily match limit reached for user {}",
                    user_id
                )));
            }
        }
        Ok(())
    }

    async fn score_pair(&self, user1_id: &str, user2_id: &str) -> Result<CompatibilityScore> {
        let first = self
            .directory
            .get_active_complete_profile(user1_id)
            .await?
            .ok_or_else(|| {
                EmberError::NotFound(format!("no active complete profile for {}", user1_id))
            })?;
        let second = self
            .directory
            .get_active_complete_profile(user2_id)
            .await?
            .ok_or_else(|| {
                EmberError::NotFound(format!("no active complete profile for {}", user2_id))
            })?;

        Ok(compatibility_score(&first, &second, &self.weights))
    }

    fn apply_auto_accept(
        &self,
        m: &mut Match,
        user_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        for user_id in user_ids {
            if !m.involves(user_id) {
                return Err(EmberError::Forbidden(format!(
                    "auto-accept user {} is not a participant",
                    user_id
                )));
            }
        }

        m.status = MatchStatus::Accepted;
        m.accepted_at = Some(now);
        if let Value::Object(map) = &mut m.metadata {
            map.insert(
                "autoAccepted".to_string(),
                serde_json::to_value(user_ids)?,
            );
        }
        Ok(())
    }

    async fn load_for_action(&self, match_id: Uuid, user_id: &str) -> Result<Match> {
        let m = self
            .store
            .get(match_id)
            .await?
            .ok_or_else(|| EmberError::NotFound(format!("match {} not found", match_id)))?;

        if !m.involves(user_id) {
            return Err(EmberError::Forbidden(format!(
                "user {} is not a participant of match {}",
                user_id, match_id
            )));
        }
        Ok(m)
    }

    fn ensure_actionable(&self, m: &Match, now: DateTime<Utc>) -> Result<()> {
        if m.status != MatchStatus::Pending {
            return Err(EmberError::BadRequest(format!(
                "match already {}",
                m.status
            )));
        }
        if m.is_expired(now) {
            return Err(EmberError::BadRequest("match has expired".to_string()));
        }
        Ok(())
    }

    /// Match-found events are best-effort; delivery failure never rolls back
    /// a created match.
    async fn publish_found(&self, m: &Match, now: DateTime<Utc>) {
        for event in MatchFoundEvent::for_participants(m, now) {
            if let Err(e) = self.events.match_found(&event).await {
                warn!("Failed to publish match event for {}: {}", event.user_id, e);
            }
        }
    }
}
