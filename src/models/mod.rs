// Domain model exports
pub mod domain;
pub mod events;

pub use domain::{
    AvailabilityPreferences, AvailabilityRecord, AvailabilityStatus, CompatibilityScore, Match,
    MatchStatus, MatchType, ProfileSnapshot, ScoreBreakdown, ScoringWeights, SyntheticAccount,
    AVAILABILITY_RETENTION_DAYS, HEARTBEAT_TTL_SECS,
};
pub use events::{
    availability_channel, match_found_channel, AvailabilityChangedEvent, MatchFoundEvent,
};
