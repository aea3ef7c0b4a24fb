use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Heartbeats older than this mark a user offline for matching purposes.
pub const HEARTBEAT_TTL_SECS: i64 = 300;

/// Availability records older than this many days are purged by the retention sweep.
pub const AVAILABILITY_RETENTION_DAYS: i64 = 7;

/// Presence state of a user within a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "availability_status", rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Idle,
    Queued,
    Matched,
    Busy,
    Offline,
}

impl std::fmt::Display for AvailabilityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AvailabilityStatus::Idle => "idle",
            AvailabilityStatus::Queued => "queued",
            AvailabilityStatus::Matched => "matched",
            AvailabilityStatus::Busy => "busy",
            AvailabilityStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Per-user matching preferences attached to an availability record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityPreferences {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(rename = "maxWaitSecs", default)]
    pub max_wait_secs: Option<i64>,
}

/// One availability record per (user, calendar day).
///
/// Time-dependent predicates (`is_online`, `can_be_matched`, `time_in_queue`)
/// are pure functions over `(record, now)` rather than stored fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityRecord {
    pub id: Uuid,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub date: NaiveDate,
    pub status: AvailabilityStatus,
    #[serde(rename = "lastHeartbeat")]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(rename = "queuedAt")]
    pub queued_at: Option<DateTime<Utc>>,
    #[serde(rename = "matchedAt")]
    pub matched_at: Option<DateTime<Utc>>,
    #[serde(rename = "busyAt")]
    pub busy_at: Option<DateTime<Utc>>,
    #[serde(rename = "offlineAt")]
    pub offline_at: Option<DateTime<Utc>>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "isAvailable")]
    pub is_available: bool,
    #[serde(default)]
    pub preferences: AvailabilityPreferences,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

impl AvailabilityRecord {
    pub fn new(
        user_id: &str,
        date: NaiveDate,
        status: AvailabilityStatus,
        now: DateTime<Utc>,
    ) -> Self {
        let mut record = Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            date,
            status,
            last_heartbeat: None,
            queued_at: None,
            matched_at: None,
            busy_at: None,
            offline_at: None,
            is_active: true,
            is_available: status == AvailabilityStatus::Queued,
            preferences: AvailabilityPreferences::default(),
            metadata: empty_object(),
            created_at: now,
            updated_at: now,
        };
        record.stamp_status(status, now);
        record
    }

    /// Apply a status transition, stamping the status-specific timestamp.
    pub fn stamp_status(&mut self, status: AvailabilityStatus, now: DateTime<Utc>) {
        self.status = status;
        match status {
            AvailabilityStatus::Queued => {
                self.queued_at = Some(now);
                self.is_available = true;
            }
            AvailabilityStatus::Matched => self.matched_at = Some(now),
            AvailabilityStatus::Busy => self.busy_at = Some(now),
            AvailabilityStatus::Offline => {
                self.offline_at = Some(now);
                self.is_available = false;
            }
            AvailabilityStatus::Idle => {}
        }
        self.updated_at = now;
    }

    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = Some(now);
        self.updated_at = now;
    }

    /// Shallow-merge a metadata patch (last write wins per key) and stamp
    /// `lastActivity`.
    pub fn merge_metadata(&mut self, patch: &Value, now: DateTime<Utc>) {
        merge_objects(&mut self.metadata, patch);
        if let Value::Object(map) = &mut self.metadata {
            map.insert("lastActivity".to_string(), Value::String(now.to_rfc3339()));
        }
        self.updated_at = now;
    }

    /// A user counts as online while their latest heartbeat is fresh.
    pub fn is_online(&self, now: DateTime<Utc>) -> bool {
        match self.last_heartbeat {
            Some(beat) => now.signed_duration_since(beat) <= Duration::seconds(HEARTBEAT_TTL_SECS),
            None => false,
        }
    }

    pub fn can_be_matched(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.is_available
            && self.status == AvailabilityStatus::Queued
            && self.is_online(now)
    }

    pub fn time_in_queue(&self, now: DateTime<Utc>) -> Option<Duration> {
        match (self.status, self.queued_at) {
            (AvailabilityStatus::Queued, Some(queued_at)) => {
                Some(now.signed_duration_since(queued_at))
            }
            _ => None,
        }
    }
}

/// Lifecycle state of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "match_status", rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
    Expired,
}

impl MatchStatus {
    /// Absorbing states admit no further transitions, including cancellation.
    pub fn is_absorbing(self) -> bool {
        matches!(
            self,
            MatchStatus::Rejected | MatchStatus::Cancelled | MatchStatus::Expired
        )
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Accepted => "accepted",
            MatchStatus::Rejected => "rejected",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "match_type", rename_all = "lowercase")]
pub enum MatchType {
    Daily,
    Manual,
    Premium,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MatchType::Daily => "daily",
            MatchType::Manual => "manual",
            MatchType::Premium => "premium",
        };
        f.write_str(s)
    }
}

/// The seven named sub-scores backing a compatibility total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub age: f64,
    pub location: f64,
    pub interests: f64,
    pub values: f64,
    #[serde(rename = "responseRate")]
    pub response_rate: f64,
    pub activity: f64,
    pub verification: f64,
}

impl ScoreBreakdown {
    pub fn uniform(value: f64) -> Self {
        Self {
            age: value,
            location: value,
            interests: value,
            values: value,
            response_rate: value,
            activity: value,
            verification: value,
        }
    }
}

/// A computed compatibility result: weighted 0-100 total plus its breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompatibilityScore {
    pub total: f64,
    pub breakdown: ScoreBreakdown,
}

impl CompatibilityScore {
    /// A fixed score with a flat breakdown, used for synthetic fallback matches.
    pub fn fixed(total: f64) -> Self {
        Self {
            total,
            breakdown: ScoreBreakdown::uniform(total),
        }
    }
}

/// Scoring weights, summing to 1.0.
#[derive(Debug, Clone, Copy)]
pub struct ScoringWeights {
    pub age: f64,
    pub location: f64,
    pub interests: f64,
    pub values: f64,
    pub response_rate: f64,
    pub activity: f64,
    pub verification: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            age: 0.20,
            location: 0.15,
            interests: 0.25,
            values: 0.20,
            response_rate: 0.10,
            activity: 0.05,
            verification: 0.05,
        }
    }
}

/// Profile snapshot fetched from the directory collaborator. Never persisted here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "profileId")]
    pub profile_id: String,
    pub age: u8,
    pub city: String,
    pub country: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(rename = "isVerified", default)]
    pub is_verified: bool,
    #[serde(rename = "isActive", default = "default_true")]
    pub is_active: bool,
    #[serde(rename = "isComplete", default = "default_true")]
    pub is_complete: bool,
}

fn default_true() -> bool {
    true
}

/// A designated fallback account used when no live partner is available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticAccount {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "profileId")]
    pub profile_id: String,
    pub slug: String,
}

/// One committed pairing attempt between two users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    #[serde(rename = "user1Id")]
    pub user1_id: String,
    #[serde(rename = "user2Id")]
    pub user2_id: String,
    #[serde(rename = "profile1Id")]
    pub profile1_id: String,
    #[serde(rename = "profile2Id")]
    pub profile2_id: String,
    pub status: MatchStatus,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(rename = "compatibilityScore")]
    pub compatibility_score: f64,
    #[serde(rename = "scoreBreakdown")]
    pub score_breakdown: ScoreBreakdown,
    #[serde(rename = "matchDate")]
    pub match_date: NaiveDate,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "acceptedAt")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(rename = "rejectedAt")]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(rename = "cancelledAt")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(rename = "expiredAt")]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(rename = "isActive")]
    pub is_active: bool,
    #[serde(rename = "isMutual")]
    pub is_mutual: bool,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.status == MatchStatus::Pending && !self.is_expired(now)
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if self.user1_id == user_id {
            Some(&self.user2_id)
        } else if self.user2_id == user_id {
            Some(&self.user1_id)
        } else {
            None
        }
    }

    pub fn partner_profile_of(&self, user_id: &str) -> Option<&str> {
        if self.user1_id == user_id {
            Some(&self.profile2_id)
        } else if self.user2_id == user_id {
            Some(&self.profile1_id)
        } else {
            None
        }
    }

    /// Whether this match occupies its unordered user pair. Only pending and
    /// accepted matches block a new match between the same two users.
    pub fn occupies_pair(&self) -> bool {
        self.is_active && matches!(self.status, MatchStatus::Pending | MatchStatus::Accepted)
    }

    pub fn is_test_account_match(&self) -> bool {
        self.metadata
            .get("isTestAccountMatch")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Shallow merge: every top-level key of `patch` overwrites `dst`.
pub(crate) fn merge_objects(dst: &mut Value, patch: &Value) {
    if !dst.is_object() {
        *dst = empty_object();
    }
    if let (Value::Object(dst_map), Value::Object(patch_map)) = (dst, patch) {
        for (key, value) in patch_map {
            dst_map.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noon() -> DateTime<Utc> {
        "2025-06-01T12:00:00Z".parse().unwrap()
    }

    fn sample_match(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Match {
        Match {
            id: Uuid::new_v4(),
            user1_id: "u1".to_string(),
            user2_id: "u2".to_string(),
            profile1_id: "p1".to_string(),
            profile2_id: "p2".to_string(),
            status: MatchStatus::Pending,
            match_type: MatchType::Daily,
            compatibility_score: 74.0,
            score_breakdown: ScoreBreakdown::uniform(74.0),
            match_date: now.date_naive(),
            expires_at,
            accepted_at: None,
            rejected_at: None,
            cancelled_at: None,
            expired_at: None,
            is_active: true,
            is_mutual: false,
            metadata: Value::Object(serde_json::Map::new()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_new_queued_record_is_available() {
        let now = noon();
        let record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);

        assert!(record.is_available);
        assert_eq!(record.queued_at, Some(now));
        assert!(record.is_active);
    }

    #[test]
    fn test_new_idle_record_is_not_available() {
        let now = noon();
        let record = AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Idle, now);

        assert!(!record.is_available);
        assert!(record.queued_at.is_none());
    }

    #[test]
    fn test_is_online_requires_fresh_heartbeat() {
        let now = noon();
        let mut record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);

        // No heartbeat yet
        assert!(!record.is_online(now));

        record.record_heartbeat(now);
        assert!(record.is_online(now));
        assert!(record.is_online(now + Duration::seconds(HEARTBEAT_TTL_SECS)));
        assert!(!record.is_online(now + Duration::seconds(HEARTBEAT_TTL_SECS + 1)));
    }

    #[test]
    fn test_can_be_matched() {
        let now = noon();
        let mut record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);
        record.record_heartbeat(now);

        assert!(record.can_be_matched(now));

        record.stamp_status(AvailabilityStatus::Matched, now);
        assert!(!record.can_be_matched(now));
    }

    #[test]
    fn test_offline_clears_availability() {
        let now = noon();
        let mut record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);

        record.stamp_status(AvailabilityStatus::Offline, now);

        assert!(!record.is_available);
        assert_eq!(record.offline_at, Some(now));
    }

    #[test]
    fn test_requeue_refreshes_queued_at() {
        let now = noon();
        let mut record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);

        let later = now + Duration::minutes(10);
        record.stamp_status(AvailabilityStatus::Queued, later);

        assert_eq!(record.queued_at, Some(later));
    }

    #[test]
    fn test_metadata_merge_is_shallow_last_write_wins() {
        let now = noon();
        let mut record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Idle, now);

        record.merge_metadata(&json!({"device": "ios", "network": "wifi"}), now);
        record.merge_metadata(&json!({"device": "android"}), now);

        assert_eq!(record.metadata["device"], "android");
        assert_eq!(record.metadata["network"], "wifi");
        assert!(record.metadata.get("lastActivity").is_some());
    }

    #[test]
    fn test_time_in_queue() {
        let now = noon();
        let record =
            AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);

        let waited = record.time_in_queue(now + Duration::minutes(3)).unwrap();
        assert_eq!(waited, Duration::minutes(3));
    }

    #[test]
    fn test_match_expiry_predicates() {
        let now = noon();
        let m = sample_match(now, now + Duration::hours(24));

        assert!(!m.is_expired(now));
        assert!(m.is_pending(now));
        assert!(m.is_expired(now + Duration::hours(25)));
        assert!(!m.is_pending(now + Duration::hours(25)));
    }

    #[test]
    fn test_match_partner_lookup() {
        let now = noon();
        let m = sample_match(now, now + Duration::hours(24));

        assert_eq!(m.partner_of("u1"), Some("u2"));
        assert_eq!(m.partner_of("u2"), Some("u1"));
        assert_eq!(m.partner_of("u3"), None);
        assert_eq!(m.partner_profile_of("u1"), Some("p2"));
    }

    #[test]
    fn test_occupies_pair_only_for_open_statuses() {
        let now = noon();
        let mut m = sample_match(now, now + Duration::hours(24));

        assert!(m.occupies_pair());
        m.status = MatchStatus::Accepted;
        assert!(m.occupies_pair());
        m.status = MatchStatus::Expired;
        assert!(!m.occupies_pair());
        m.status = MatchStatus::Rejected;
        assert!(!m.occupies_pair());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ScoringWeights::default();
        let sum = w.age + w.location + w.interests + w.values
            + w.response_rate + w.activity + w.verification;
        assert!((sum - 1.0).abs() < 1e-9);
    }
}
