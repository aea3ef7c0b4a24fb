use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EmberError, Result};
use crate::models::ProfileSnapshot;

/// Read-only collaborator contract for the user/profile system of record.
///
/// The matchmaking core never owns profile data; it validates participants and
/// fetches scoring snapshots through this interface.
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// The profile snapshot for a user, or None when the user has no active,
    /// complete profile.
    async fn get_active_complete_profile(&self, user_id: &str) -> Result<Option<ProfileSnapshot>>;

    /// Every active, complete profile. Used by the batch pairing strategy.
    async fn list_active_complete_profiles(&self) -> Result<Vec<ProfileSnapshot>>;

    /// True when every listed user exists and is active.
    async fn are_active_users(&self, user_ids: &[&str]) -> Result<bool>;

    /// True when every listed profile exists and is active.
    async fn are_active_profiles(&self, profile_ids: &[&str]) -> Result<bool>;

    /// Feature flag gating synthetic fallback pairing.
    async fn synthetic_fallback_enabled(&self) -> Result<bool>;
}

/// HTTP client for the directory service.
///
/// Handles all communication with the surrounding app's internal API:
/// profile snapshots, user/profile validation, and feature flags.
pub struct HttpDirectory {
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct ValidateRequest<'a> {
    ids: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(rename = "allActive")]
    all_active: bool,
}

#[derive(Debug, Deserialize)]
struct ProfileListResponse {
    profiles: Vec<ProfileSnapshot>,
}

#[derive(Debug, Deserialize)]
struct FlagResponse {
    enabled: bool,
}

impl HttpDirectory {
    pub fn new(base_url: String, api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url,
            api_key,
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn validate(&self, path: &str, ids: &[&str]) -> Result<bool> {
        let response = self
            .client
            .post(self.url(path))
            .header("X-Ember-Key", &self.api_key)
            .json(&ValidateRequest { ids })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmberError::InvalidResponse(format!(
                "validation call {} returned {}",
                path,
                response.status()
            )));
        }

        let body: ValidateResponse = response.json().await?;
        Ok(body.all_active)
    }
}

#[async_trait]
impl ProfileDirectory for HttpDirectory {
    async fn get_active_complete_profile(&self, user_id: &str) -> Result<Option<ProfileSnapshot>> {
        let url = self.url(&format!("/internal/v1/profiles/{}", user_id));
        tracing::debug!("Fetching profile snapshot from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Ember-Key", &self.api_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(EmberError::InvalidResponse(format!(
                "profile lookup for {} returned {}",
                user_id,
                response.status()
            )));
        }

        let snapshot: ProfileSnapshot = response.json().await?;
        if !snapshot.is_active || !snapshot.is_complete {
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    async fn list_active_complete_profiles(&self) -> Result<Vec<ProfileSnapshot>> {
        let response = self
            .client
            .get(self.url("/internal/v1/profiles?active=true&complete=true"))
            .header("X-Ember-Key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmberError::InvalidResponse(format!(
                "profile listing returned {}",
                response.status()
            )));
        }

        let body: ProfileListResponse = response.json().await?;
        Ok(body.profiles)
    }

    async fn are_active_users(&self, user_ids: &[&str]) -> Result<bool> {
        self.validate("/internal/v1/users/validate", user_ids).await
    }

    async fn are_active_profiles(&self, profile_ids: &[&str]) -> Result<bool> {
        self.validate("/internal/v1/profiles/validate", profile_ids)
            .await
    }

    async fn synthetic_fallback_enabled(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.url("/internal/v1/flags/synthetic-fallback"))
            .header("X-Ember-Key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EmberError::InvalidResponse(format!(
                "flag lookup returned {}",
                response.status()
            )));
        }

        let body: FlagResponse = response.json().await?;
        Ok(body.enabled)
    }
}

/// Read-through snapshot cache in front of any directory implementation.
///
/// Profile lookups hit the directory once per TTL window; the scheduler
/// resolves the same snapshots repeatedly within a tick.
pub struct CachedDirectory {
    inner: Arc<dyn ProfileDirectory>,
    profiles: Cache<String, ProfileSnapshot>,
}

impl CachedDirectory {
    pub fn new(inner: Arc<dyn ProfileDirectory>, capacity: u64, ttl_secs: u64) -> Self {
        let profiles = Cache::builder()
            .max_capacity(capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self { inner, profiles }
    }
}

#[async_trait]
impl ProfileDirectory for CachedDirectory {
    async fn get_active_complete_profile(&self, user_id: &str) -> Result<Option<ProfileSnapshot>> {
        if let Some(snapshot) = self.profiles.get(user_id).await {
            tracing::trace!("Profile cache hit: {}", user_id);
            return Ok(Some(snapshot));
        }

        let snapshot = self.inner.get_active_complete_profile(user_id).await?;
        if let Some(snapshot) = &snapshot {
            self.profiles
                .insert(user_id.to_string(), snapshot.clone())
                .await;
        }
        Ok(snapshot)
    }

    async fn list_active_complete_profiles(&self) -> Result<Vec<ProfileSnapshot>> {
        self.inner.list_active_complete_profiles().await
    }

    async fn are_active_users(&self, user_ids: &[&str]) -> Result<bool> {
        self.inner.are_active_users(user_ids).await
    }

    async fn are_active_profiles(&self, profile_ids: &[&str]) -> Result<bool> {
        self.inner.are_active_profiles(profile_ids).await
    }

    async fn synthetic_fallback_enabled(&self) -> Result<bool> {
        self.inner.synthetic_fallback_enabled().await
    }
}
