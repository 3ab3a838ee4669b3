use sqlx::PgPool;

use crate::error::StorageResult;
use crate::models::SaeRecord;

pub async fn find_sae(pool: &PgPool, sae_id: &str) -> StorageResult<Option<SaeRecord>> {
    let row = sqlx::query_as(
        r#"
        SELECT sae_id, kme_id, certificate_fingerprint, status, max_keys_per_request,
               max_key_size, min_key_size, registered_at, updated_at
        FROM saes
        WHERE sae_id = $1
        "#,
    )
    .bind(sae_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn register_sae(
    pool: &PgPool,
    sae_id: &str,
    kme_id: &str,
    certificate_fingerprint: &str,
    max_keys_per_request: i32,
    max_key_size: i32,
    min_key_size: i32,
) -> StorageResult<()> {
    sqlx::query(
        r#"
        INSERT INTO saes (
            sae_id, kme_id, certificate_fingerprint, status,
            max_keys_per_request, max_key_size, min_key_size, registered_at, updated_at
        ) VALUES ($1, $2, $3, 'active', $4, $5, $6, now(), now())
        "#,
    )
    .bind(sae_id)
    .bind(kme_id)
    .bind(certificate_fingerprint)
    .bind(max_keys_per_request)
    .bind(max_key_size)
    .bind(min_key_size)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_status(pool: &PgPool, sae_id: &str, status: &str) -> StorageResult<()> {
    sqlx::query("UPDATE saes SET status = $1, updated_at = now() WHERE sae_id = $2")
        .bind(status)
        .bind(sae_id)
        .execute(pool)
        .await?;
    Ok(())
}
