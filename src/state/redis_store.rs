// Redis-backed ephemeral state: rate limit windows and webhook de-duplication

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{sleep, timeout, Duration};

use crate::core::errors::AppError;
use crate::store::EphemeralStore;

const MAX_RETRIES: u32 = 3;
const INITIAL_DELAY_MS: u64 = 500;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Redis store for short-lived counters and markers
#[derive(Clone)]
pub struct RedisStore {
    connection_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect with retries, verifying each connection with PING
    ///
    /// Backoff is linear (500ms, 1s). All attempt errors are reported together
    /// when every attempt fails.
    pub async fn new(redis_url: &str) -> Result<Self, AppError> {
        let mut connection_errors = Vec::new();

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                sleep(Duration::from_millis(INITIAL_DELAY_MS * attempt as u64)).await;
            }

            match Self::try_create_connection(redis_url).await {
                Ok(store) => match store.ping().await {
                    Ok(()) => {
                        if attempt > 0 {
                            tracing::info!(attempt = attempt + 1, "Redis connection succeeded after retry");
                        }
                        return Ok(store);
                    }
                    Err(e) => {
                        connection_errors.push(format!("Connection created but ping failed: {}", e));
                    }
                },
                Err(e) => {
                    if attempt < MAX_RETRIES - 1 {
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            error = %e,
                            "Redis connection attempt failed, retrying..."
                        );
                    }
                    connection_errors.push(format!("Attempt {} failed: {}", attempt + 1, e));
                }
            }
        }

        Err(AppError::StateError(format!(
            "Failed to create Redis connection after {} attempts: {}",
            MAX_RETRIES,
            connection_errors.join("; ")
        )))
    }

    async fn try_create_connection(redis_url: &str) -> Result<Self, AppError> {
        let client = Client::open(redis_url).map_err(|e| {
            AppError::StateError(format!("Invalid Redis URL format '{}': {}", redis_url, e))
        })?;

        let connection_manager = timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| {
                AppError::StateError(format!(
                    "Redis connection timed out after {} seconds",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| AppError::StateError(format!("Failed to create Redis ConnectionManager: {}", e)))?;

        Ok(Self { connection_manager })
    }
}

/// MULTI; SET key 0 NX EX window; INCR key; EXEC
///
/// The first hit creates the key together with its TTL, so a counter can
/// never be left without an expiry. INCR keeps the TTL of an existing key.
fn window_hit_pipeline(key: &str, window: Duration) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("NX")
        .arg("EX")
        .arg(window.as_secs().max(1))
        .ignore()
        .incr(key, 1u64);
    pipe
}

#[async_trait]
impl EphemeralStore for RedisStore {
    async fn ping(&self) -> Result<(), AppError> {
        let mut conn = self.connection_manager.clone();
        let result: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::StateError(format!("Redis ping failed: {}", e)))?;

        if result == "PONG" {
            Ok(())
        } else {
            Err(AppError::StateError(format!(
                "Redis ping returned unexpected response: {}",
                result
            )))
        }
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<u64, AppError> {
        let mut conn = self.connection_manager.clone();

        let (count,): (u64,) = window_hit_pipeline(key, window)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::StateError(format!("Failed to count hit: {}", e)))?;

        Ok(count)
    }

    async fn mark_once(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        let mut conn = self.connection_manager.clone();

        // SET key 1 NX EX ttl -> "OK" when set, nil when the key already exists
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::StateError(format!("Failed to set marker: {}", e)))?;

        Ok(result.is_some())
    }

    async fn release(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.connection_manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::StateError(format!("Failed to release marker: {}", e)))
    }
}
