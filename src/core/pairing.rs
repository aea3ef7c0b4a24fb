use crate::core::scoring::compatibility_score;
use crate::models::{CompatibilityScore, ProfileSnapshot, ScoringWeights};

/// A candidate pairing produced by the greedy pass: indexes into the input
/// slice plus the score that cleared the threshold.
#[derive(Debug, Clone)]
pub struct PairCandidate {
    pub first: usize,
    pub second: usize,
    pub score: CompatibilityScore,
}

/// Greedily pair profiles first-fit: walk the list in order and, for each
/// unused profile, take the first later unused profile whose score clears the
/// threshold. Deliberately not a globally optimal matching; the trade-off is
/// latency and predictability over pair quality.
pub fn greedy_pairs(
    profiles: &[ProfileSnapshot],
    weights: &ScoringWeights,
    min_score: f64,
) -> Vec<PairCandidate> {
    let mut used = vec![false; profiles.len()];
    let mut pairs = Vec::new();

    for first in 0..profiles.len() {
        if used[first] {
            continue;
        }
        for second in (first + 1)..profiles.len() {
            if used[second] {
                continue;
            }
            let score = compatibility_score(&profiles[first], &profiles[second], weights);
            if score.total >= min_score {
                used[first] = true;
                used[second] = true;
                pairs.push(PairCandidate { first, second, score });
                break;
            }
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, age: u8, city: &str, interests: &[&str]) -> ProfileSnapshot {
        ProfileSnapshot {
            user_id: format!("user-{}", id),
            profile_id: format!("profile-{}", id),
            age,
            city: city.to_string(),
            country: "DE".to_string(),
            interests: interests.iter().map(|s| s.to_string()).collect(),
            values: interests.iter().map(|s| s.to_string()).collect(),
            is_verified: true,
            is_active: true,
            is_complete: true,
        }
    }

    #[test]
    fn test_pairs_compatible_neighbours() {
        let profiles = vec![
            snapshot("a", 30, "Berlin", &["Hiking"]),
            snapshot("b", 31, "Berlin", &["Hiking"]),
            snapshot("c", 29, "Berlin", &["Hiking"]),
            snapshot("d", 30, "Berlin", &["Hiking"]),
        ];

        let pairs = greedy_pairs(&profiles, &ScoringWeights::default(), 60.0);

        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].first, pairs[0].second), (0, 1));
        assert_eq!((pairs[1].first, pairs[1].second), (2, 3));
    }

    #[test]
    fn test_skips_below_threshold_partners() {
        // Profile 1 is a poor fit for 0 (age gap, different country trumped by
        // same-country default here, no shared interests), profile 2 is close.
        let mut far = snapshot("far", 55, "Munich", &[]);
        far.country = "FR".to_string();
        far.is_verified = false;

        let profiles = vec![
            snapshot("a", 30, "Berlin", &["Hiking"]),
            far,
            snapshot("b", 30, "Berlin", &["Hiking"]),
        ];

        let pairs = greedy_pairs(&profiles, &ScoringWeights::default(), 60.0);

        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].first, pairs[0].second), (0, 2));
    }

    #[test]
    fn test_odd_one_out_stays_unpaired() {
        let profiles = vec![
            snapshot("a", 30, "Berlin", &["Hiking"]),
            snapshot("b", 30, "Berlin", &["Hiking"]),
            snapshot("c", 30, "Berlin", &["Hiking"]),
        ];

        let pairs = greedy_pairs(&profiles, &ScoringWeights::default(), 60.0);

        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        let pairs = greedy_pairs(&[], &ScoringWeights::default(), 60.0);
        assert!(pairs.is_empty());
    }
}
