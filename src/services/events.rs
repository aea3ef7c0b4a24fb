use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::models::{
    availability_channel, match_found_channel, AvailabilityChangedEvent, MatchFoundEvent,
};

/// Outbound signal contract consumed by the live-update bridge (SSE/WebSocket)
/// of the surrounding app.
#[async_trait]
pub trait EventBridge: Send + Sync {
    async fn availability_changed(&self, event: &AvailabilityChangedEvent) -> Result<()>;

    async fn match_found(&self, event: &MatchFoundEvent) -> Result<()>;
}

/// Event bridge publishing JSON payloads to per-user Redis channels.
pub struct RedisEventBridge {
    conn: Mutex<ConnectionManager>,
}

impl RedisEventBridge {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<()> {
        let mut conn = self.conn.lock().await;
        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async::<()>(&mut *conn)
            .await?;
        drop(conn);

        tracing::trace!("Published event on {}", channel);
        Ok(())
    }
}

#[async_trait]
impl EventBridge for RedisEventBridge {
    async fn availability_changed(&self, event: &AvailabilityChangedEvent) -> Result<()> {
        let channel = availability_channel(&event.user_id);
        self.publish(&channel, serde_json::to_string(event)?).await
    }

    async fn match_found(&self, event: &MatchFoundEvent) -> Result<()> {
        let channel = match_found_channel(&event.user_id);
        self.publish(&channel, serde_json::to_string(event)?).await
    }
}

/// Bridge that drops every event. Used in tests and for running the core
/// without a live-update consumer.
#[derive(Default)]
pub struct NullEventBridge;

#[async_trait]
impl EventBridge for NullEventBridge {
    async fn availability_changed(&self, event: &AvailabilityChangedEvent) -> Result<()> {
        tracing::debug!("availability event dropped for {}", event.user_id);
        Ok(())
    }

    async fn match_found(&self, event: &MatchFoundEvent) -> Result<()> {
        tracing::debug!("match event dropped for {}", event.user_id);
        Ok(())
    }
}
