use crate::models::{CompatibilityScore, ProfileSnapshot, ScoreBreakdown, ScoringWeights};

/// Pairs scoring below this threshold are rejected at match creation.
pub const MIN_COMPATIBILITY_SCORE: f64 = 60.0;

/// Placeholder sub-scores until real engagement signals are wired in.
pub const RESPONSE_RATE_STUB: f64 = 75.0;
pub const ACTIVITY_STUB: f64 = 80.0;

/// Compute a compatibility score (0-100) for a candidate pair.
///
/// Scoring formula (each sub-score on a 0-100 scale):
///
/// total = age * 0.20
///       + location * 0.15
///       + interests * 0.25
///       + values * 0.20
///       + response_rate * 0.10
///       + activity * 0.05
///       + verification * 0.05
///
/// The weighted total is rounded to 2 decimals. The function is deterministic
/// and side-effect free; every sub-score is symmetric in its two inputs.
pub fn compatibility_score(
    a: &ProfileSnapshot,
    b: &ProfileSnapshot,
    weights: &ScoringWeights,
) -> CompatibilityScore {
    let breakdown = ScoreBreakdown {
        age: age_score(a.age, b.age),
        location: location_score(&a.city, &a.country, &b.city, &b.country),
        interests: overlap_score(&a.interests, &b.interests),
        values: overlap_score(&a.values, &b.values),
        response_rate: RESPONSE_RATE_STUB,
        activity: ACTIVITY_STUB,
        verification: verification_score(a.is_verified, b.is_verified),
    };

    let total = breakdown.age * weights.age
        + breakdown.location * weights.location
        + breakdown.interests * weights.interests
        + breakdown.values * weights.values
        + breakdown.response_rate * weights.response_rate
        + breakdown.activity * weights.activity
        + breakdown.verification * weights.verification;

    CompatibilityScore {
        total: round2(total.clamp(0.0, 100.0)),
        breakdown,
    }
}

/// Age sub-score, banded by absolute age difference.
#[inline]
fn age_score(a: u8, b: u8) -> f64 {
    let diff = a.abs_diff(b);
    match diff {
        0..=2 => 100.0,
        3..=5 => 80.0,
        6..=10 => 60.0,
        11..=15 => 40.0,
        _ => 20.0,
    }
}

/// Location sub-score: same city beats same country beats everything else.
#[inline]
fn location_score(city_a: &str, country_a: &str, city_b: &str, country_b: &str) -> f64 {
    if city_a.eq_ignore_ascii_case(city_b) && country_a.eq_ignore_ascii_case(country_b) {
        100.0
    } else if country_a.eq_ignore_ascii_case(country_b) {
        70.0
    } else {
        30.0
    }
}

/// Overlap sub-score for declared interests and values:
/// |intersection| / max(|a|, |b|) scaled to 0-100, with a neutral default of
/// 50 when either list is empty.
#[inline]
fn overlap_score(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 50.0;
    }

    let shared = a.iter().filter(|item| b.contains(item)).count();
    let larger = a.len().max(b.len());

    (shared as f64 / larger as f64) * 100.0
}

/// Verification sub-score: 50 points per verified party.
#[inline]
fn verification_score(a_verified: bool, b_verified: bool) -> f64 {
    let mut score = 0.0;
    if a_verified {
        score += 50.0;
    }
    if b_verified {
        score += 50.0;
    }
    score
}

#[inline]
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(age: u8, city: &str, country: &str, interests: &[&str], verified: bool) -> ProfileSnapshot {
        ProfileSnapshot {
            user_id: format!("user-{}", age),
            profile_id: format!("profile-{}", age),
            age,
            city: city.to_string(),
            country: country.to_string(),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            values: vec![],
            is_verified: verified,
            is_active: true,
            is_complete: true,
        }
    }

    #[test]
    fn test_age_bands() {
        assert_eq!(age_score(30, 30), 100.0);
        assert_eq!(age_score(30, 32), 100.0);
        assert_eq!(age_score(30, 35), 80.0);
        assert_eq!(age_score(30, 40), 60.0);
        assert_eq!(age_score(30, 45), 40.0);
        assert_eq!(age_score(30, 50), 20.0);
        // Symmetric by construction
        assert_eq!(age_score(45, 30), age_score(30, 45));
    }

    #[test]
    fn test_location_tiers() {
        assert_eq!(location_score("Berlin", "DE", "Berlin", "DE"), 100.0);
        assert_eq!(location_score("Berlin", "DE", "Munich", "DE"), 70.0);
        assert_eq!(location_score("Berlin", "DE", "Paris", "FR"), 30.0);
        assert_eq!(location_score("berlin", "de", "Berlin", "DE"), 100.0);
    }

    #[test]
    fn test_overlap_score() {
        let a = vec!["Hiking".to_string(), "Wine Tasting".to_string()];
        let b = vec!["Hiking".to_string(), "Reading".to_string()];
        assert_eq!(overlap_score(&a, &b), 50.0);

        let identical = vec!["Hiking".to_string()];
        assert_eq!(overlap_score(&identical, &identical), 100.0);

        // Asymmetric sizes divide by the larger list
        let many = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let one = vec!["a".to_string()];
        assert_eq!(overlap_score(&many, &one), 25.0);
    }

    #[test]
    fn test_overlap_defaults_to_neutral_when_empty() {
        let some = vec!["Hiking".to_string()];
        let none: Vec<String> = vec![];
        assert_eq!(overlap_score(&some, &none), 50.0);
        assert_eq!(overlap_score(&none, &none), 50.0);
    }

    #[test]
    fn test_verification_points() {
        assert_eq!(verification_score(false, false), 0.0);
        assert_eq!(verification_score(true, false), 50.0);
        assert_eq!(verification_score(true, true), 100.0);
    }

    #[test]
    fn test_total_is_weighted_and_rounded() {
        let a = snapshot(30, "Berlin", "DE", &["Hiking", "Wine Tasting"], true);
        let b = snapshot(32, "Berlin", "DE", &["Hiking", "Reading"], true);

        let score = compatibility_score(&a, &b, &ScoringWeights::default());

        // 100*.20 + 100*.15 + 50*.25 + 50*.20 + 75*.10 + 80*.05 + 100*.05
        assert_eq!(score.total, 74.0);
        assert_eq!(score.breakdown.age, 100.0);
        assert_eq!(score.breakdown.location, 100.0);
        assert_eq!(score.breakdown.interests, 50.0);
        assert_eq!(score.breakdown.values, 50.0);
        assert_eq!(score.breakdown.verification, 100.0);
    }

    #[test]
    fn test_deterministic_and_symmetric() {
        let a = snapshot(28, "Lisbon", "PT", &["Surfing", "Cooking"], true);
        let b = snapshot(34, "Porto", "PT", &["Cooking"], false);
        let weights = ScoringWeights::default();

        let first = compatibility_score(&a, &b, &weights);
        let second = compatibility_score(&a, &b, &weights);
        let swapped = compatibility_score(&b, &a, &weights);

        assert_eq!(first, second);
        assert_eq!(first.total, swapped.total);
        assert_eq!(first.breakdown, swapped.breakdown);
    }

    #[test]
    fn test_stub_signals_are_constant() {
        let a = snapshot(30, "Berlin", "DE", &[], false);
        let b = snapshot(30, "Berlin", "DE", &[], false);

        let score = compatibility_score(&a, &b, &ScoringWeights::default());

        assert_eq!(score.breakdown.response_rate, RESPONSE_RATE_STUB);
        assert_eq!(score.breakdown.activity, ACTIVITY_STUB);
    }
}
