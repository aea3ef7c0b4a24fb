use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::{
    AvailabilityRecord, AvailabilityStatus, CompatibilityScore, Match, ProfileSnapshot,
    SyntheticAccount,
};
use crate::services::availability::AvailabilityService;
use crate::services::directory::ProfileDirectory;
use crate::services::matches::{CreateMatch, CreateMatchOptions, MatchService};

/// Algorithm tags recorded in match metadata.
pub const QUEUE_ALGORITHM: &str = "queue-first-fit/v1";
pub const FALLBACK_ALGORITHM: &str = "queue-fallback/v1";

/// Timer-driven worker that drains the availability queue once per tick.
///
/// Candidates are taken in FIFO order by `queued_at` and paired first-fit:
/// for each unmatched candidate the scan takes the first later candidate whose
/// pair passes creation validation. A candidate with no viable partner falls
/// back to a rotating pool of synthetic accounts when the feature flag allows.
///
/// The overlap guard and the fallback cursor are owned state, not globals; a
/// clustered deployment must promote the guard to a distributed lease before
/// running more than one scheduler instance.
pub struct QueueScheduler {
    availability: Arc<AvailabilityService>,
    matches: Arc<MatchService>,
    directory: Arc<dyn ProfileDirectory>,
    synthetic_accounts: Vec<SyntheticAccount>,
    fallback_score: f64,
    interval_secs: u64,
    running: AtomicBool,
    fallback_cursor: AtomicUsize,
}

/// Releases the overlap guard when a tick ends, even on early return.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl QueueScheduler {
    pub fn new(
        availability: Arc<AvailabilityService>,
        matches: Arc<MatchService>,
        directory: Arc<dyn ProfileDirectory>,
        synthetic_accounts: Vec<SyntheticAccount>,
        fallback_score: f64,
        interval_secs: u64,
    ) -> Self {
        Self {
            availability,
            matches,
            directory,
            synthetic_accounts,
            fallback_score,
            interval_secs,
            running: AtomicBool::new(false),
            fallback_cursor: AtomicUsize::new(0),
        }
    }

    pub fn interval_secs(&self) -> u64 {
        self.interval_secs
    }

    /// Run a single pairing tick. Returns the matches created so callers can
    /// observe and test a tick's outcome.
    ///
    /// A failure fetching the candidate set aborts the whole tick and
    /// propagates; failures pairing an individual candidate are logged and the
    /// tick continues with the next one.
    pub async fn run_once(&self) -> Result<Vec<Match>> {
        if self.running.swap(true, Ordering::SeqCst) {
            info!("Pairing tick already running, skipping");
            return Ok(Vec::new());
        }
        let _guard = TickGuard(&self.running);

        let now = Utc::now();
        let today = now.date_naive();

        let candidates = self.availability.queued_candidates(None).await?;
        if candidates.is_empty() {
            debug!("No queued candidates this tick");
            return Ok(Vec::new());
        }

        let fallback_enabled = match self.directory.synthetic_fallback_enabled().await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!("Fallback flag lookup failed, treating as disabled: {}", e);
                false
            }
        };

        let mut used: HashSet<String> = HashSet::new();
        let mut created = Vec::new();

        for i in 0..candidates.len() {
            let first = &candidates[i];
            if used.contains(&first.user_id) {
                continue;
            }

            let first_profile = match self.resolve_profile(&first.user_id).await {
                Some(profile) => profile,
                None => continue,
            };

            let mut paired = false;
            for second in candidates.iter().skip(i + 1) {
                if used.contains(&second.user_id) || !second.is_online(now) {
                    continue;
                }

                let second_profile = match self.resolve_profile(&second.user_id).await {
                    Some(profile) => profile,
                    None => continue,
                };

                match self
                    .pair_live(first, &first_profile, second, &second_profile)
                    .await
                {
                    Some(m) => {
                        used.insert(first.user_id.clone());
                        used.insert(second.user_id.clone());
                        created.push(m);
                        paired = true;
                        break;
                    }
                    None => continue,
                }
            }

            if !paired && fallback_enabled {
                if let Some(m) = self.pair_fallback(first, &first_profile, today).await {
                    used.insert(first.user_id.clone());
                    created.push(m);
                }
            }
        }

        info!(
            "Pairing tick complete: {} matches from {} candidates",
            created.len(),
            candidates.len()
        );
        Ok(created)
    }

    /// Attempt a live pairing. Validation rejections and transport failures
    /// are both per-pair outcomes: log and let the scan move on.
    async fn pair_live(
        &self,
        first: &AvailabilityRecord,
        first_profile: &ProfileSnapshot,
        second: &AvailabilityRecord,
        second_profile: &ProfileSnapshot,
    ) -> Option<Match> {
        let req = CreateMatch {
            user1_id: first.user_id.clone(),
            user2_id: second.user_id.clone(),
            profile1_id: first_profile.profile_id.clone(),
            profile2_id: second_profile.profile_id.clone(),
            match_date: first.date,
            score: None,
            options: CreateMatchOptions {
                metadata: json!({ "algorithm": QUEUE_ALGORITHM }),
                ..CreateMatchOptions::default()
            },
        };

        match self.matches.create(req).await {
            Ok(m) => {
                self.flip_to_matched(&first.user_id).await;
                self.flip_to_matched(&second.user_id).await;
                Some(m)
            }
            Err(e) => {
                debug!(
                    "Pair {{{}, {}}} not created: {}",
                    first.user_id, second.user_id, e
                );
                None
            }
        }
    }

    /// Pair a lone candidate against the synthetic pool. The cursor rotates
    /// round-robin across ticks; a Conflict with one synthetic account (an
    /// open match from a previous day) retries the next one in the ring.
    async fn pair_fallback(
        &self,
        candidate: &AvailabilityRecord,
        candidate_profile: &ProfileSnapshot,
        today: chrono::NaiveDate,
    ) -> Option<Match> {
        if self.synthetic_accounts.is_empty() {
            return None;
        }
        if self
            .synthetic_accounts
            .iter()
            .any(|account| account.user_id == candidate.user_id)
        {
            return None;
        }

        for _ in 0..self.synthetic_accounts.len() {
            let index =
                self.fallback_cursor.fetch_add(1, Ordering::SeqCst) % self.synthetic_accounts.len();
            let account = &self.synthetic_accounts[index];

            let req = CreateMatch {
                user1_id: candidate.user_id.clone(),
                user2_id: account.user_id.clone(),
                profile1_id: candidate_profile.profile_id.clone(),
                profile2_id: account.profile_id.clone(),
                match_date: today,
                score: Some(CompatibilityScore::fixed(self.fallback_score)),
                options: CreateMatchOptions {
                    skip_daily_limit_for: Some(account.user_id.clone()),
                    auto_accept_user_ids: vec![account.user_id.clone()],
                    metadata: json!({
                        "algorithm": FALLBACK_ALGORITHM,
                        "isTestAccountMatch": true,
                        "testAccountSlug": account.slug,
                    }),
                    ..CreateMatchOptions::default()
                },
            };

            match self.matches.create(req).await {
                Ok(m) => {
                    info!(
                        "Fallback match {} created for {} against {}",
                        m.id, candidate.user_id, account.slug
                    );
                    self.flip_to_matched(&candidate.user_id).await;
                    return Some(m);
                }
                Err(e) => {
                    debug!(
                        "Fallback pairing {} -> {} failed: {}",
                        candidate.user_id, account.slug, e
                    );
                }
            }
        }

        warn!("No synthetic account available for {}", candidate.user_id);
        None
    }

    async fn resolve_profile(&self, user_id: &str) -> Option<ProfileSnapshot> {
        match self.directory.get_active_complete_profile(user_id).await {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                debug!("Skipping {}: no active complete profile", user_id);
                None
            }
            Err(e) => {
                warn!("Profile lookup for {} failed: {}", user_id, e);
                None
            }
        }
    }

    /// The match exists at this point; an availability write failure is
    /// logged, not propagated.
    async fn flip_to_matched(&self, user_id: &str) {
        if let Err(e) = self
            .availability
            .set_status(user_id, AvailabilityStatus::Matched, None)
            .await
        {
            warn!("Failed to flip {} to matched: {}", user_id, e);
        }
    }
}
