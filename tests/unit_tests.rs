// Unit tests for the compatibility scorer and pairing primitives.

use chrono::{DateTime, Duration, Utc};
use ember_match::core::{compatibility_score, greedy_pairs, MIN_COMPATIBILITY_SCORE};
use ember_match::models::{
    AvailabilityRecord, AvailabilityStatus, ProfileSnapshot, ScoringWeights, HEARTBEAT_TTL_SECS,
};

fn snapshot(
    user_id: &str,
    age: u8,
    city: &str,
    country: &str,
    interests: &[&str],
    values: &[&str],
    verified: bool,
) -> ProfileSnapshot {
    ProfileSnapshot {
        user_id: user_id.to_string(),
        profile_id: format!("{}-profile", user_id),
        age,
        city: city.to_string(),
        country: country.to_string(),
        interests: interests.iter().map(|s| s.to_string()).collect(),
        values: values.iter().map(|s| s.to_string()).collect(),
        is_verified: verified,
        is_active: true,
        is_complete: true,
    }
}

#[test]
fn test_score_is_deterministic() {
    let a = snapshot("a", 30, "Berlin", "DE", &["Hiking"], &["Honesty"], true);
    let b = snapshot("b", 33, "Munich", "DE", &["Hiking", "Chess"], &[], false);
    let weights = ScoringWeights::default();

    let first = compatibility_score(&a, &b, &weights);
    let second = compatibility_score(&a, &b, &weights);

    assert_eq!(first, second);
}

#[test]
fn test_score_is_symmetric() {
    let a = snapshot("a", 26, "Lisbon", "PT", &["Surfing"], &["Family"], true);
    let b = snapshot("b", 39, "Paris", "FR", &["Surfing", "Wine"], &["Family", "Career"], false);
    let weights = ScoringWeights::default();

    let forward = compatibility_score(&a, &b, &weights);
    let backward = compatibility_score(&b, &a, &weights);

    assert_eq!(forward.total, backward.total);
    assert_eq!(forward.breakdown, backward.breakdown);
}

#[test]
fn test_score_stays_in_range() {
    let best = snapshot("a", 30, "Berlin", "DE", &["Hiking"], &["Honesty"], true);
    let twin = snapshot("b", 30, "Berlin", "DE", &["Hiking"], &["Honesty"], true);
    let worst = snapshot("c", 70, "Sydney", "AU", &["Golf"], &["Quiet"], false);

    let high = compatibility_score(&best, &twin, &ScoringWeights::default());
    let low = compatibility_score(&best, &worst, &ScoringWeights::default());

    assert!(high.total <= 100.0);
    assert!(low.total >= 0.0);
    assert!(high.total > low.total);
}

#[test]
fn test_overlapping_pair_clears_threshold() {
    let a = snapshot("a", 30, "Berlin", "DE", &["Hiking", "Wine Tasting"], &[], true);
    let b = snapshot("b", 32, "Berlin", "DE", &["Hiking", "Reading"], &[], true);

    let score = compatibility_score(&a, &b, &ScoringWeights::default());

    assert!(score.total >= MIN_COMPATIBILITY_SCORE);
    assert_eq!(score.total, 74.0);
}

#[test]
fn test_distant_pair_misses_threshold() {
    let a = snapshot("a", 24, "Berlin", "DE", &["Hiking"], &[], false);
    let b = snapshot("b", 52, "Osaka", "JP", &["Karaoke"], &[], false);

    let score = compatibility_score(&a, &b, &ScoringWeights::default());

    assert!(score.total < MIN_COMPATIBILITY_SCORE);
}

#[test]
fn test_greedy_pairs_respects_threshold_and_order() {
    let profiles = vec![
        snapshot("a", 30, "Berlin", "DE", &["Hiking"], &[], true),
        snapshot("b", 58, "Osaka", "JP", &[], &[], false),
        snapshot("c", 31, "Berlin", "DE", &["Hiking"], &[], true),
    ];

    let pairs = greedy_pairs(&profiles, &ScoringWeights::default(), MIN_COMPATIBILITY_SCORE);

    // "a" skips the incompatible "b" and pairs with "c"; "b" stays unpaired
    assert_eq!(pairs.len(), 1);
    assert_eq!((pairs[0].first, pairs[0].second), (0, 2));
    assert!(pairs[0].score.total >= MIN_COMPATIBILITY_SCORE);
}

#[test]
fn test_queue_predicates_round_trip() {
    let now: DateTime<Utc> = Utc::now();
    let mut record = AvailabilityRecord::new("u1", now.date_naive(), AvailabilityStatus::Queued, now);

    // Queued without a heartbeat is not matchable
    assert!(!record.can_be_matched(now));

    record.record_heartbeat(now);
    assert!(record.can_be_matched(now));

    // A heartbeat past the liveness window drops the user from the queue view
    let later = now + Duration::seconds(HEARTBEAT_TTL_SECS + 1);
    assert!(!record.can_be_matched(later));
}
