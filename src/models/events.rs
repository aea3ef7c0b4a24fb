use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::{AvailabilityRecord, Match, MatchType};

/// Channel an availability update for `user_id` is published on.
pub fn availability_channel(user_id: &str) -> String {
    format!("availability.status.{}", user_id)
}

/// Channel a new match for `user_id` is published on.
pub fn match_found_channel(user_id: &str) -> String {
    format!("matches.found.{}", user_id)
}

/// Published whenever an availability record is created or changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityChangedEvent {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub record: AvailabilityRecord,
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
}

impl AvailabilityChangedEvent {
    pub fn new(record: &AvailabilityRecord, occurred_at: DateTime<Utc>) -> Self {
        Self {
            user_id: record.user_id.clone(),
            record: record.clone(),
            occurred_at,
        }
    }
}

/// Published once per participant for every newly created match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFoundEvent {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "matchId")]
    pub match_id: Uuid,
    #[serde(rename = "partnerUserId")]
    pub partner_user_id: String,
    #[serde(rename = "partnerProfileId")]
    pub partner_profile_id: String,
    #[serde(rename = "matchType")]
    pub match_type: MatchType,
    #[serde(rename = "compatibilityScore")]
    pub compatibility_score: f64,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "isTestAccountMatch")]
    pub is_test_account_match: bool,
    #[serde(rename = "occurredAt")]
    pub occurred_at: DateTime<Utc>,
}

impl MatchFoundEvent {
    /// One event per participant, each carrying the other side's summary.
    pub fn for_participants(m: &Match, occurred_at: DateTime<Utc>) -> Vec<Self> {
        [&m.user1_id, &m.user2_id]
            .into_iter()
            .map(|user_id| Self {
                user_id: user_id.clone(),
                match_id: m.id,
                partner_user_id: m.partner_of(user_id).unwrap_or_default().to_string(),
                partner_profile_id: m.partner_profile_of(user_id).unwrap_or_default().to_string(),
                match_type: m.match_type,
                compatibility_score: m.compatibility_score,
                expires_at: m.expires_at,
                is_test_account_match: m.is_test_account_match(),
                occurred_at,
            })
            .collect()
    }
}
