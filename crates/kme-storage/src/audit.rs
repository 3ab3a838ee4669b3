use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::StorageResult;

pub async fn log_access(
    pool: &PgPool,
    key_id: Uuid,
    requesting_sae_id: &str,
    access_type: &str,
    outcome: &str,
    request_id: Uuid,
) -> StorageResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO key_access_logs
            (id, key_id, requesting_sae_id, access_type, outcome, request_id, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(key_id)
    .bind(requesting_sae_id)
    .bind(access_type)
    .bind(outcome)
    .bind(request_id)
    .bind(Utc::now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to write key access log, continuing");
    }
    Ok(())
}

pub async fn log_distribution(
    pool: &PgPool,
    master_sae_id: &str,
    slave_sae_id: &str,
    key_ids: &[Uuid],
    processing_time_ms: i64,
) -> StorageResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO key_distribution_events
            (id, master_sae_id, slave_sae_id, key_ids, processing_time_ms, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(master_sae_id)
    .bind(slave_sae_id)
    .bind(sqlx::types::Json(key_ids))
    .bind(processing_time_ms)
    .bind(Utc::now())
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to write key distribution event, continuing");
    }
    Ok(())
}

/// Count of successful dec_keys accesses since `since`, used to derive the
/// pool manager's trailing consumption rate.
pub async fn consumption_count_since(pool: &PgPool, since: DateTime<Utc>) -> StorageResult<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT count(*) FROM key_access_logs
        WHERE access_type = 'dec_keys' AND outcome = 'success' AND occurred_at > $1
        "#,
    )
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(count)
}
