// Moka cache for the public donation statistics

use chrono::Utc;
use moka::future::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::errors::AppError;
use crate::core::stats::DonationStats;
use crate::store::DonationStore;

pub const DEFAULT_STATS_TTL: Duration = Duration::from_secs(60);

/// Caches `DonationStats` for a short TTL
///
/// Cache misses are loaded from the underlying `DonationStore`, one load per
/// miss however many callers are waiting. Any donation status change must
/// call `invalidate`.
///
/// Entries are keyed by a generation that `invalidate` bumps, so a load that
/// was already running when the data changed lands under a key no later
/// reader asks for.
pub struct StatsCache {
    cache: Cache<u64, Arc<DonationStats>>,
    generation: AtomicU64,
    donations: Arc<dyn DonationStore + Send + Sync>,
}

impl StatsCache {
    pub fn new(donations: Arc<dyn DonationStore + Send + Sync>, ttl: Duration) -> Self {
        let cache = Cache::builder().time_to_live(ttl).max_capacity(2).build();
        Self {
            cache,
            generation: AtomicU64::new(0),
            donations,
        }
    }

    pub async fn get(&self) -> Result<Arc<DonationStats>, AppError> {
        let generation = self.generation.load(Ordering::Acquire);
        self.cache
            .try_get_with(generation, async {
                self.donations.stats(Utc::now()).await.map(Arc::new)
            })
            .await
            .map_err(|shared| {
                Arc::try_unwrap(shared).unwrap_or_else(|e| AppError::Internal(e.to_string()))
            })
    }

    pub async fn invalidate(&self) {
        let stale = self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate(&stale).await;
    }
}
