use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A persisted key record: the unit of storage. `ciphertext` is the
/// AEAD output (`nonce || ciphertext`) of the raw key bytes, as produced
/// by `kme_crypto::MasterCipher::encrypt`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct KeyRecord {
    pub key_id: Uuid,
    pub ciphertext: Vec<u8>,
    pub integrity_hash: Vec<u8>,
    pub salt: Vec<u8>,
    pub master_sae_id: String,
    pub slave_sae_id: String,
    pub additional_slave_sae_ids: Json<Vec<String>>,
    pub key_size_bits: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub is_consumed: bool,
    pub metadata: Json<serde_json::Value>,
    pub request_id: Option<Uuid>,
}

/// A registered SAE and its per-client limits.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SaeRecord {
    pub sae_id: String,
    pub kme_id: String,
    pub certificate_fingerprint: String,
    pub status: String,
    pub max_keys_per_request: i32,
    pub max_key_size: i32,
    pub min_key_size: i32,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Counters derived from `keys`, used by the pool manager to compute a
/// status snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolCounters {
    pub total: i64,
    pub active: i64,
    pub expired: i64,
    pub consumed: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct KeyAccessLog {
    pub id: Uuid,
    pub key_id: Uuid,
    pub requesting_sae_id: String,
    pub access_type: String,
    pub outcome: String,
    pub request_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct KeyDistributionEvent {
    pub id: Uuid,
    pub master_sae_id: String,
    pub slave_sae_id: String,
    pub key_ids: Json<Vec<Uuid>>,
    pub processing_time_ms: i64,
    pub occurred_at: DateTime<Utc>,
}
