use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ember_match::config::Settings;
use ember_match::models::ScoringWeights;
use ember_match::services::{
    AvailabilityService, CachedDirectory, EventBridge, HttpDirectory, MatchPolicy, MatchService,
    NullEventBridge, ProfileDirectory, RedisEventBridge,
};
use ember_match::storage::{self, AvailabilityStore, MatchStore, PgAvailabilityStore, PgMatchStore};
use ember_match::QueueScheduler;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenv::dotenv().ok();

    // Initialize logging
    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());

    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(EnvFilter::new(log_level));

    if log_format == "pretty" {
        subscriber.pretty().init();
    } else {
        subscriber.init();
    }

    info!("Starting Ember Match worker...");

    // Load configuration
    let settings = Settings::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        panic!("Configuration error: {}", e);
    });

    info!("Configuration loaded successfully");

    // Initialize PostgreSQL stores
    let pool = storage::postgres::connect(
        &settings.database.url,
        settings.database.max_connections.unwrap_or(10),
        settings.database.min_connections.unwrap_or(1),
    )
    .await
    .unwrap_or_else(|e| {
        error!("Failed to connect to PostgreSQL: {}", e);
        panic!("PostgreSQL connection error: {}", e);
    });

    let availability_store: Arc<dyn AvailabilityStore> =
        Arc::new(PgAvailabilityStore::new(pool.clone()));
    let match_store: Arc<dyn MatchStore> = Arc::new(PgMatchStore::new(pool.clone()));

    info!("PostgreSQL stores initialized");

    // Initialize the event bridge; the core keeps working without one
    let events: Arc<dyn EventBridge> = match RedisEventBridge::connect(&settings.redis.url).await {
        Ok(bridge) => {
            info!("Redis event bridge initialized");
            Arc::new(bridge)
        }
        Err(e) => {
            error!("Failed to connect to Redis ({}), events disabled", e);
            Arc::new(NullEventBridge)
        }
    };

    // Initialize the profile directory client with a read-through cache
    let http = Arc::new(HttpDirectory::new(
        settings.directory.endpoint.clone(),
        settings.directory.api_key.clone(),
    ));
    let directory: Arc<dyn ProfileDirectory> = Arc::new(CachedDirectory::new(
        http,
        settings.directory.cache_size,
        settings.directory.cache_ttl_secs,
    ));

    info!("Profile directory client initialized");

    // Build services
    let availability = Arc::new(AvailabilityService::new(
        availability_store,
        directory.clone(),
        events.clone(),
        settings.scheduler.queue_limit,
    ));

    let weights: ScoringWeights = settings.scoring.weights.clone().into();
    let policy = MatchPolicy {
        min_score: settings.matching.min_score,
        daily_limit: settings.matching.daily_limit,
        ttl_hours: settings.matching.ttl_hours,
    };
    let matches = Arc::new(MatchService::new(
        match_store,
        directory.clone(),
        events.clone(),
        weights,
        policy,
    ));

    let scheduler = Arc::new(QueueScheduler::new(
        availability.clone(),
        matches.clone(),
        directory.clone(),
        settings.fallback.accounts.clone(),
        settings.fallback.score,
        settings.scheduler.interval_secs,
    ));

    info!(
        "Scheduler initialized (tick every {}s, queue limit {})",
        settings.scheduler.interval_secs, settings.scheduler.queue_limit
    );

    // Pairing tick loop
    let tick_scheduler = scheduler.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(tick_scheduler.interval_secs())).await;
            if let Err(e) = tick_scheduler.run_once().await {
                error!("Pairing tick failed: {}", e);
            }
        }
    });

    // Expiry and offline sweeps
    let sweep_matches = matches.clone();
    let sweep_availability = availability.clone();
    let sweep_interval = settings.scheduler.sweep_interval_secs;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(sweep_interval)).await;
            if let Err(e) = sweep_matches.sweep_expired().await {
                error!("Match expiry sweep failed: {}", e);
            }
            if let Err(e) = sweep_availability.sweep_offline().await {
                error!("Offline sweep failed: {}", e);
            }
        }
    });

    // Retention sweep
    let retention_availability = availability.clone();
    let retention_interval = settings.scheduler.retention_interval_secs;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(retention_interval)).await;
            if let Err(e) = retention_availability.sweep_expired().await {
                error!("Retention sweep failed: {}", e);
            }
        }
    });

    info!("Ember Match worker running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    Ok(())
}
