// src/services/pool.rs - live pool accounting, health classification, and
// the background replenishment loop (spec.md §4.4).
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kme_crypto::MasterCipher;
use kme_storage::models::PoolCounters;
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::middleware::error_handler::KmeError;
use crate::services::key_generator::KeyGenerator;

const EMERGENCY_BATCH_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolHealth {
    Healthy,
    Warning,
    Critical,
    Exhausted,
}

impl PoolHealth {
    /// Exact thresholds from spec.md §4.4.
    pub fn classify(active: i64, min_key_threshold: u32) -> Self {
        let min_key_threshold = min_key_threshold as i64;
        if active == 0 {
            Self::Exhausted
        } else if active < min_key_threshold {
            Self::Critical
        } else if active < 2 * min_key_threshold {
            Self::Warning
        } else {
            Self::Healthy
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolStatus {
    pub counters: PoolCounters,
    pub max_key_count: u64,
    pub min_key_threshold: u32,
    pub pool_health: PoolHealth,
    pub availability_percentage: f64,
    pub last_generation: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    PoolHealthDegraded { from: PoolHealthKind, to: PoolHealthKind },
    LowKeyCount { active: i64, threshold: u32 },
    HighConsumptionRate { consumed_24h: i64, generated_24h: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoolHealthKind {
    Healthy,
    Warning,
    Critical,
    Exhausted,
}

impl From<PoolHealth> for PoolHealthKind {
    fn from(h: PoolHealth) -> Self {
        match h {
            PoolHealth::Healthy => Self::Healthy,
            PoolHealth::Warning => Self::Warning,
            PoolHealth::Critical => Self::Critical,
            PoolHealth::Exhausted => Self::Exhausted,
        }
    }
}

/// Owns no authoritative state; every durable fact lives in `kme-storage`.
/// `version` is bumped on every successful write path so a cached snapshot
/// can be told apart from a stale one (spec.md §4.4 "shared state policy").
pub struct KeyPoolManager {
    db: PgPool,
    cipher: Arc<MasterCipher>,
    generator: Arc<dyn KeyGenerator>,
    max_key_count: u32,
    min_key_threshold: u32,
    default_key_size: u32,
    key_expiry_seconds: i64,
    last_generation: RwLock<Option<DateTime<Utc>>>,
    version: AtomicU64,
}

impl KeyPoolManager {
    pub fn new(
        db: PgPool,
        cipher: Arc<MasterCipher>,
        generator: Arc<dyn KeyGenerator>,
        max_key_count: u32,
        min_key_threshold: u32,
        default_key_size: u32,
        key_expiry_seconds: i64,
    ) -> Self {
        Self {
            db,
            cipher,
            generator,
            max_key_count,
            min_key_threshold,
            default_key_size,
            key_expiry_seconds,
            last_generation: RwLock::new(None),
            version: AtomicU64::new(0),
        }
    }

    pub fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub async fn status(&self) -> Result<PoolStatus, KmeError> {
        let counters = kme_storage::keys::pool_counters(&self.db).await?;
        let pool_health = PoolHealth::classify(counters.active, self.min_key_threshold);
        let availability_percentage = if self.max_key_count == 0 {
            0.0
        } else {
            (counters.active as f64 / self.max_key_count as f64 * 100.0).min(100.0)
        };
        let last_generation = *self.last_generation.read().await;

        Ok(PoolStatus {
            counters,
            max_key_count: self.max_key_count as u64,
            min_key_threshold: self.min_key_threshold,
            pool_health,
            availability_percentage,
            last_generation,
        })
    }

    /// True iff the system currently holds at least `n` active, unconsumed
    /// key records, counted size-agnostically (spec.md §4.4 defines
    /// `Exhausted` as `active == 0` regardless of what size was requested;
    /// a request for a non-default size is always materialized fresh by
    /// the generator, so availability never depends on the pool having
    /// pre-stocked that exact size).
    pub async fn check_availability(&self, n: u32) -> Result<bool, KmeError> {
        let counters = kme_storage::keys::pool_counters(&self.db).await?;
        Ok(counters.active >= n as i64)
    }

    /// Total active, unconsumed key count, for the `Insufficient` error's
    /// `available` field.
    pub async fn active_count(&self) -> Result<i64, KmeError> {
        Ok(kme_storage::keys::pool_counters(&self.db).await?.active)
    }

    pub async fn check_alert_conditions(&self) -> Result<Vec<Alert>, KmeError> {
        let status = self.status().await?;
        let mut alerts = Vec::new();

        if status.pool_health != PoolHealth::Healthy {
            alerts.push(Alert::LowKeyCount {
                active: status.counters.active,
                threshold: self.min_key_threshold,
            });
        }

        let since = Utc::now() - chrono::Duration::hours(24);
        let generated_24h = kme_storage::keys::generation_count_since(&self.db, since).await?;
        let consumed_24h = kme_storage::audit::consumption_count_since(&self.db, since).await?;
        if generated_24h > 0 && consumed_24h as f64 > 1.5 * generated_24h as f64 {
            alerts.push(Alert::HighConsumptionRate { consumed_24h, generated_24h });
        }

        Ok(alerts)
    }

    /// Runs one replenishment iteration: if the active count is below
    /// threshold, generates enough keys to reach `max_key_count` and stores
    /// each as a pool-owned record.
    async fn replenish_once(&self, emergency: bool) -> Result<u32, KmeError> {
        let counters = kme_storage::keys::pool_counters(&self.db).await?;

        if !emergency && counters.active >= self.min_key_threshold as i64 {
            return Ok(0);
        }

        let deficit = (self.max_key_count as i64 - counters.active).max(0) as u32;
        let batch = if emergency { deficit.min(EMERGENCY_BATCH_SIZE) } else { deficit };
        if batch == 0 {
            return Ok(0);
        }

        let raw_keys = self
            .generator
            .generate(batch, self.default_key_size)
            .map_err(|e| KmeError::ServiceUnavailable(e.to_string()))
            .await?;

        let expires_at = Utc::now() + chrono::Duration::seconds(self.key_expiry_seconds);
        let mut stored = 0u32;
        for plaintext in raw_keys {
            let key_id = Uuid::new_v4();
            let result = kme_storage::keys::store_pooled_key(
                &self.db,
                &self.cipher,
                key_id,
                &plaintext,
                self.default_key_size as i32,
                expires_at,
                json!({ "source": "replenishment", "emergency": emergency }),
            )
            .await;
            match result {
                Ok(()) => stored += 1,
                Err(e) => tracing::warn!(error = %e, "failed to persist generated key, continuing batch"),
            }
        }

        *self.last_generation.write().await = Some(Utc::now());
        self.bump_version();
        tracing::info!(stored, emergency, "replenishment batch completed");
        Ok(stored)
    }

    pub async fn emergency_replenish(&self) -> Result<u32, KmeError> {
        self.replenish_once(true).await
    }

    /// Spawns the long-lived background replenishment task. Honours
    /// cancellation at iteration boundaries; a batch already committed via
    /// `store_key` stays committed (spec.md §5 Cancellation).
    pub fn spawn_replenishment_loop(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.replenish_once(false).await {
                            tracing::error!(error = %e, "replenishment iteration failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("replenishment loop shutting down");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_exhausted_at_zero() {
        assert_eq!(PoolHealth::classify(0, 1000), PoolHealth::Exhausted);
    }

    #[test]
    fn classifies_critical_below_threshold() {
        assert_eq!(PoolHealth::classify(500, 1000), PoolHealth::Critical);
    }

    #[test]
    fn classifies_warning_below_double_threshold() {
        assert_eq!(PoolHealth::classify(1500, 1000), PoolHealth::Warning);
    }

    #[test]
    fn classifies_healthy_otherwise() {
        assert_eq!(PoolHealth::classify(2000, 1000), PoolHealth::Healthy);
        assert_eq!(PoolHealth::classify(2001, 1000), PoolHealth::Healthy);
    }

    #[test]
    fn boundary_at_exactly_double_threshold_is_healthy() {
        // active < 2*threshold is warning; active == 2*threshold falls through to healthy.
        assert_eq!(PoolHealth::classify(2000, 1000), PoolHealth::Healthy);
        assert_eq!(PoolHealth::classify(1999, 1000), PoolHealth::Warning);
    }
}
