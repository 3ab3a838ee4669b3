// The storage engine: encryption at rest, integrity verification on
// read, authorization-gated retrieval, and expiry sweep. Decoupled from
// HTTP; the request pipeline is the only caller.

use chrono::{DateTime, Utc};
use kme_auth::{is_authorized, master_matches_path, KeyOperation, KeyOwnership};
use kme_crypto::{integrity, MasterCipher};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::models::{KeyRecord, PoolCounters};

pub enum SaeRole {
    Master,
    Slave,
}

/// Pool-owned records produced by background replenishment are parked
/// under this reserved (master, slave) pairing until a request pipeline
/// claims and re-binds one to a real SAE pair (spec.md §4.4/§4.6: the
/// "reserve from pool" materialization path).
pub const POOL_MASTER_SENTINEL: &str = "POOL0000RESERVED";
pub const POOL_SLAVE_SENTINEL: &str = "POOL0000RESERVE2";

#[allow(clippy::too_many_arguments)]
pub async fn store_key(
    pool: &PgPool,
    cipher: &MasterCipher,
    key_id: Uuid,
    plaintext: &[u8],
    master_sae_id: &str,
    slave_sae_id: &str,
    additional_slave_sae_ids: &[String],
    key_size_bits: i32,
    expires_at: DateTime<Utc>,
    metadata: serde_json::Value,
    request_id: Option<Uuid>,
) -> StorageResult<()> {
    if master_sae_id.len() != 16 || slave_sae_id.len() != 16 {
        return Err(StorageError::InvalidArgument(
            "master_sae_id and slave_sae_id must be 16 characters".into(),
        ));
    }
    if master_sae_id == slave_sae_id {
        return Err(StorageError::InvalidArgument(
            "master_sae_id must differ from slave_sae_id".into(),
        ));
    }
    if plaintext.is_empty() {
        return Err(StorageError::InvalidArgument("key_data cannot be empty".into()));
    }

    let salt = {
        use rand::RngCore;
        let mut salt = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    };
    let hash = integrity::hash_data(plaintext);
    let ciphertext = cipher.encrypt(plaintext).map_err(|_| {
        StorageError::InvalidArgument("failed to encrypt key material".into())
    })?;

    let result = sqlx::query(
        r#"
        INSERT INTO keys (
            key_id, ciphertext, integrity_hash, salt, master_sae_id, slave_sae_id,
            additional_slave_sae_ids, key_size_bits, created_at, expires_at,
            is_active, is_consumed, metadata, request_id
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), $9, true, false, $10, $11)
        "#,
    )
    .bind(key_id)
    .bind(&ciphertext)
    .bind(hash.to_vec())
    .bind(salt.to_vec())
    .bind(master_sae_id)
    .bind(slave_sae_id)
    .bind(sqlx::types::Json(additional_slave_sae_ids))
    .bind(key_size_bits)
    .bind(expires_at)
    .bind(sqlx::types::Json(metadata))
    .bind(request_id)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(StorageError::DuplicateKeyId(key_id))
        }
        Err(e) => Err(StorageError::Unavailable(e)),
    }
}

/// Stores a key generated by background replenishment, not yet bound to a
/// real SAE pair.
pub async fn store_pooled_key(
    pool: &PgPool,
    cipher: &MasterCipher,
    key_id: Uuid,
    plaintext: &[u8],
    key_size_bits: i32,
    expires_at: DateTime<Utc>,
    metadata: serde_json::Value,
) -> StorageResult<()> {
    store_key(
        pool,
        cipher,
        key_id,
        plaintext,
        POOL_MASTER_SENTINEL,
        POOL_SLAVE_SENTINEL,
        &[],
        key_size_bits,
        expires_at,
        metadata,
        None,
    )
    .await
}

/// Atomically claims one pool-owned record of `key_size_bits` and re-binds
/// it to the real (master, slave) pair for `request_id`, using
/// `SELECT ... FOR UPDATE SKIP LOCKED` so concurrent claimants never race
/// on the same row. Returns `None` if the pool holds no matching record.
#[allow(clippy::too_many_arguments)]
pub async fn claim_pooled_key(
    pool: &PgPool,
    key_size_bits: i32,
    master_sae_id: &str,
    slave_sae_id: &str,
    additional_slave_sae_ids: &[String],
    expires_at: DateTime<Utc>,
    request_id: Uuid,
) -> StorageResult<Option<Uuid>> {
    let mut tx = pool.begin().await?;

    let claimed: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT key_id FROM keys
        WHERE master_sae_id = $1 AND slave_sae_id = $2
          AND key_size_bits = $3 AND is_active = true AND expires_at > now()
        FOR UPDATE SKIP LOCKED
        LIMIT 1
        "#,
    )
    .bind(POOL_MASTER_SENTINEL)
    .bind(POOL_SLAVE_SENTINEL)
    .bind(key_size_bits)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((key_id,)) = claimed else {
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        r#"
        UPDATE keys
        SET master_sae_id = $1, slave_sae_id = $2, additional_slave_sae_ids = $3,
            expires_at = $4, request_id = $5
        WHERE key_id = $6
        "#,
    )
    .bind(master_sae_id)
    .bind(slave_sae_id)
    .bind(sqlx::types::Json(additional_slave_sae_ids))
    .bind(expires_at)
    .bind(request_id)
    .bind(key_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(key_id))
}

/// Retrieves a key's plaintext iff active, unexpired, and authorized.
/// When `consume` is true (the dec_keys path), marks the record consumed
/// atomically with the read.
pub async fn retrieve_key(
    pool: &PgPool,
    cipher: &MasterCipher,
    key_id: Uuid,
    requester: &str,
    alleged_master: Option<&str>,
    consume: bool,
) -> StorageResult<(KeyRecord, Vec<u8>)> {
    let mut tx = pool.begin().await?;

    let record: Option<KeyRecord> = sqlx::query_as(
        r#"
        SELECT key_id, ciphertext, integrity_hash, salt, master_sae_id, slave_sae_id,
               additional_slave_sae_ids, key_size_bits, created_at, expires_at,
               is_active, is_consumed, metadata, request_id
        FROM keys
        WHERE key_id = $1 AND is_active = true AND expires_at > now()
        FOR UPDATE
        "#,
    )
    .bind(key_id)
    .fetch_optional(&mut *tx)
    .await?;

    let record = record.ok_or(StorageError::NotFound)?;

    let owner = KeyOwnership {
        master_sae_id: &record.master_sae_id,
        slave_sae_id: &record.slave_sae_id,
        additional_slave_sae_ids: &record.additional_slave_sae_ids.0,
    };
    let op = if consume {
        KeyOperation::SlaveRetrieval
    } else {
        KeyOperation::MasterAccess
    };
    if !is_authorized(&owner, requester, op) {
        return Err(StorageError::Unauthorized);
    }
    if let Some(alleged) = alleged_master {
        if !master_matches_path(&owner, alleged) {
            return Err(StorageError::Unauthorized);
        }
    }
    if consume && record.is_consumed {
        // Single-use: a second dec_keys retrieval of an already-consumed
        // record is treated identically to an unknown id.
        return Err(StorageError::NotFound);
    }

    let plaintext = cipher
        .decrypt(&record.ciphertext)
        .map_err(|_| StorageError::IntegrityError)?;

    if !integrity::verify(&plaintext, &record.integrity_hash) {
        sqlx::query("UPDATE keys SET is_active = false WHERE key_id = $1")
            .bind(key_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        return Err(StorageError::IntegrityError);
    }

    if consume {
        sqlx::query("UPDATE keys SET is_consumed = true WHERE key_id = $1")
            .bind(key_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok((record, plaintext))
}

/// Outcome of a batch dec_keys lookup. `Unauthorized` and `NotFound` are
/// kept distinct because they carry different HTTP statuses at the
/// transport boundary (401 vs 400, spec.md §8 scenario 3).
pub enum BatchRetrieval {
    Resolved(Vec<(Uuid, Vec<u8>)>),
    Unauthorized,
    NotFound(Vec<Uuid>),
}

/// Looks up and, if `consume` is set, marks consumed every id in `key_ids`
/// within a single transaction. If any id is missing, expired, unauthorized,
/// or already consumed, the whole transaction rolls back and no record is
/// touched (spec.md §4.7/§8: dec_keys is all-or-nothing).
pub async fn retrieve_keys_batch(
    pool: &PgPool,
    cipher: &MasterCipher,
    key_ids: &[Uuid],
    requester: &str,
    alleged_master: Option<&str>,
    consume: bool,
) -> StorageResult<BatchRetrieval> {
    let mut tx = pool.begin().await?;
    let mut resolved = Vec::with_capacity(key_ids.len());
    let mut unresolved = Vec::new();

    for &key_id in key_ids {
        let record: Option<KeyRecord> = sqlx::query_as(
            r#"
            SELECT key_id, ciphertext, integrity_hash, salt, master_sae_id, slave_sae_id,
                   additional_slave_sae_ids, key_size_bits, created_at, expires_at,
                   is_active, is_consumed, metadata, request_id
            FROM keys
            WHERE key_id = $1 AND is_active = true AND expires_at > now()
            FOR UPDATE
            "#,
        )
        .bind(key_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            unresolved.push(key_id);
            continue;
        };

        let owner = KeyOwnership {
            master_sae_id: &record.master_sae_id,
            slave_sae_id: &record.slave_sae_id,
            additional_slave_sae_ids: &record.additional_slave_sae_ids.0,
        };
        let op = if consume { KeyOperation::SlaveRetrieval } else { KeyOperation::MasterAccess };
        let authorized = is_authorized(&owner, requester, op)
            && alleged_master.is_none_or(|alleged| master_matches_path(&owner, alleged));
        if !authorized {
            tx.rollback().await?;
            return Ok(BatchRetrieval::Unauthorized);
        }
        if consume && record.is_consumed {
            unresolved.push(key_id);
            continue;
        }

        resolved.push(record);
    }

    if !unresolved.is_empty() {
        tx.rollback().await?;
        return Ok(BatchRetrieval::NotFound(unresolved));
    }

    let mut out = Vec::with_capacity(resolved.len());
    for record in &resolved {
        let plaintext = cipher
            .decrypt(&record.ciphertext)
            .map_err(|_| StorageError::IntegrityError)?;
        if !integrity::verify(&plaintext, &record.integrity_hash) {
            return Err(StorageError::IntegrityError);
        }
        out.push((record.key_id, plaintext));
    }

    if consume {
        for record in &resolved {
            sqlx::query("UPDATE keys SET is_consumed = true WHERE key_id = $1")
                .bind(record.key_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    Ok(BatchRetrieval::Resolved(out))
}

/// All currently active, unexpired keys owned by or deliverable to `sae_id`.
pub async fn get_keys_by_sae(
    pool: &PgPool,
    sae_id: &str,
    role: SaeRole,
    limit: Option<i64>,
) -> StorageResult<Vec<KeyRecord>> {
    let limit = limit.unwrap_or(i64::MAX);
    let rows: Vec<KeyRecord> = match role {
        SaeRole::Master => sqlx::query_as(
            r#"
            SELECT key_id, ciphertext, integrity_hash, salt, master_sae_id, slave_sae_id,
                   additional_slave_sae_ids, key_size_bits, created_at, expires_at,
                   is_active, is_consumed, metadata, request_id
            FROM keys
            WHERE master_sae_id = $1 AND is_active = true AND expires_at > now()
            LIMIT $2
            "#,
        )
        .bind(sae_id)
        .bind(limit)
        .fetch_all(pool)
        .await?,
        SaeRole::Slave => sqlx::query_as(
            r#"
            SELECT key_id, ciphertext, integrity_hash, salt, master_sae_id, slave_sae_id,
                   additional_slave_sae_ids, key_size_bits, created_at, expires_at,
                   is_active, is_consumed, metadata, request_id
            FROM keys
            WHERE (slave_sae_id = $1 OR additional_slave_sae_ids ? $1)
              AND is_active = true AND expires_at > now()
            LIMIT $2
            "#,
        )
        .bind(sae_id)
        .bind(limit)
        .fetch_all(pool)
        .await?,
    };
    Ok(rows)
}

/// Flips `is_active = false` on all records past expiry; returns the count.
pub async fn cleanup_expired(pool: &PgPool) -> StorageResult<u64> {
    let result = sqlx::query(
        "UPDATE keys SET is_active = false WHERE is_active = true AND expires_at <= now()",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Count of key records created since `since`, used to derive the pool
/// manager's trailing generation rate.
pub async fn generation_count_since(pool: &PgPool, since: DateTime<Utc>) -> StorageResult<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT count(*) FROM keys WHERE created_at > $1")
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn pool_counters(pool: &PgPool) -> StorageResult<PoolCounters> {
    let row: (i64, i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            count(*) FILTER (WHERE is_active) AS total,
            count(*) FILTER (WHERE is_active AND NOT is_consumed AND expires_at > now()) AS active,
            count(*) FILTER (WHERE is_active AND expires_at <= now()) AS expired,
            count(*) FILTER (WHERE is_active AND is_consumed) AS consumed
        FROM keys
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(PoolCounters {
        total: row.0,
        active: row.1,
        expired: row.2,
        consumed: row.3,
    })
}
