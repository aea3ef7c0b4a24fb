//! Ember Match - daily matchmaking core for the Ember dating app
//!
//! This library implements the matchmaking core: a per-user availability
//! state machine, a weighted compatibility scorer, a match lifecycle with
//! time-based expiry, and a periodically-ticking queue scheduler that pairs
//! waiting users (falling back to synthetic partners when nobody fits).
//!
//! The surrounding app's HTTP/WS surface and profile storage stay outside;
//! they are reached through the `ProfileDirectory` and `EventBridge` traits.

pub mod config;
pub mod core;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

// Re-export commonly used types
pub use core::{compatibility_score, greedy_pairs, QueueScheduler, MIN_COMPATIBILITY_SCORE};
pub use error::{EmberError, Result};
pub use models::{
    AvailabilityRecord, AvailabilityStatus, CompatibilityScore, Match, MatchStatus, MatchType,
    ProfileSnapshot, ScoreBreakdown, ScoringWeights, SyntheticAccount,
};
pub use services::{AvailabilityService, MatchPolicy, MatchService};
