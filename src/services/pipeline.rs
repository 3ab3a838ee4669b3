// src/services/pipeline.rs - the three ETSI request pipelines (spec.md §4.5-4.7)
//
// Each function is the single boundary between the transport adaptor and
// the core: validation, extension negotiation, pool reservation, and
// container assembly all happen here, never in the handler.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use uuid::Uuid;

use crate::middleware::error_handler::KmeError;
use crate::models::etsi::{Key, KeyContainer, KeyIds, KeyRequest, Status};
use crate::state::AppState;

fn is_sae_id(s: &str) -> bool {
    s.len() == 16
}

/// GET /keys/{slave_SAE_ID}/status — spec.md §4.5. Never blocks, never
/// triggers replenishment. `master_sae_id` is the authenticated caller
/// (policy: any active SAE may query; no record-level authorization).
pub async fn get_status(
    state: &AppState,
    master_sae_id: &str,
    slave_sae_id: &str,
) -> Result<Status, KmeError> {
    if !is_sae_id(slave_sae_id) {
        return Err(KmeError::InvalidRequest(vec![(
            "slave_SAE_ID".to_string(),
            "must be exactly 16 characters".to_string(),
        )]));
    }

    let snapshot = state.pool_manager.status().await?;

    Ok(Status {
        source_kme_id: state.config.kme_id.clone(),
        target_kme_id: state.config.kme_id.clone(),
        master_sae_id: master_sae_id.to_string(),
        slave_sae_id: slave_sae_id.to_string(),
        key_size: state.config.default_key_size,
        stored_key_count: snapshot.counters.active.max(0) as u64,
        max_key_count: snapshot.max_key_count,
        max_key_per_request: state.config.max_keys_per_request,
        max_key_size: state.config.max_key_size,
        min_key_size: state.config.min_key_size,
        max_sae_id_count: state.config.max_sae_id_count,
        status_extension: None,
    })
}

/// Bounds that a `KeyRequest` is checked against (spec.md §4.1). Pulled out
/// of `Config` so the validation itself stays pure and CPU-only, with no
/// dependency on a live database (spec.md §5: "Validation ... are CPU-only
/// and non-suspending").
struct RequestLimits {
    max_keys_per_request: u32,
    default_key_size: u32,
    min_key_size: u32,
    max_key_size: u32,
    max_sae_id_count: u32,
}

impl From<&crate::config::Config> for RequestLimits {
    fn from(c: &crate::config::Config) -> Self {
        Self {
            max_keys_per_request: c.max_keys_per_request,
            default_key_size: c.default_key_size,
            min_key_size: c.min_key_size,
            max_key_size: c.max_key_size,
            max_sae_id_count: c.max_sae_id_count,
        }
    }
}

fn validate_key_request(
    limits: &RequestLimits,
    slave_sae_id: &str,
    req: &KeyRequest,
) -> Result<u32, Vec<(String, String)>> {
    let mut details = Vec::new();

    if !is_sae_id(slave_sae_id) {
        details.push(("slave_SAE_ID".to_string(), "must be exactly 16 characters".to_string()));
    }

    if req.number < 1 || req.number > limits.max_keys_per_request {
        details.push((
            "number".to_string(),
            format!("must be between 1 and {}", limits.max_keys_per_request),
        ));
    }

    let size = req.size.unwrap_or(limits.default_key_size);
    if size == 0 || size % 8 != 0 || size < limits.min_key_size || size > limits.max_key_size {
        details.push((
            "size".to_string(),
            format!(
                "must be a multiple of 8 within [{}, {}]",
                limits.min_key_size, limits.max_key_size
            ),
        ));
    }

    if req.additional_slave_sae_ids.len() > limits.max_sae_id_count as usize {
        details.push((
            "additional_slave_SAE_IDs".to_string(),
            format!("length must not exceed {}", limits.max_sae_id_count),
        ));
    }
    if req.additional_slave_sae_ids.iter().any(|id| !is_sae_id(id)) {
        details.push((
            "additional_slave_SAE_IDs".to_string(),
            "each id must be exactly 16 characters".to_string(),
        ));
    }
    if req.additional_slave_sae_ids.contains(&slave_sae_id.to_string()) {
        details.push((
            "additional_slave_SAE_IDs".to_string(),
            "must not contain the primary slave SAE".to_string(),
        ));
    }
    let mut seen = std::collections::HashSet::new();
    if req.additional_slave_sae_ids.iter().any(|id| !seen.insert(id)) {
        details.push(("additional_slave_SAE_IDs".to_string(), "must not contain duplicates".to_string()));
    }

    if details.is_empty() {
        Ok(size)
    } else {
        Err(details)
    }
}

/// POST /keys/{slave_SAE_ID}/enc_keys — spec.md §4.6. Strict ordering:
/// validation, then extension negotiation, then availability, then
/// materialization. Nothing is persisted if an earlier step fails.
pub async fn enc_keys(
    state: &AppState,
    master_sae_id: &str,
    slave_sae_id: &str,
    request: KeyRequest,
) -> Result<KeyContainer, KmeError> {
    let limits = RequestLimits::from(state.config.as_ref());
    let size = validate_key_request(&limits, slave_sae_id, &request).map_err(KmeError::InvalidRequest)?;

    if !request.extension_mandatory.is_empty() {
        let unsupported: Vec<String> = request
            .extension_mandatory
            .iter()
            .flat_map(|entry| entry.keys().cloned())
            .collect();
        return Err(KmeError::ExtensionUnsupported(unsupported));
    }

    let n = request.number;
    if !state.pool_manager.check_availability(n).await? {
        let available = state.pool_manager.active_count().await?;
        if available == 0 {
            let _ = state.pool_manager.emergency_replenish().await;
            return Err(KmeError::Exhausted {
                recovery_hint: "pool exhausted; emergency replenishment triggered, retry shortly"
                    .to_string(),
            });
        }
        return Err(KmeError::Insufficient {
            available: available as u64,
            requested: n as u64,
        });
    }

    let request_id = Uuid::new_v4();
    let expires_at = Utc::now() + chrono::Duration::seconds(state.config.key_expiry_seconds);
    let mut keys = Vec::with_capacity(n as usize);

    // The background pool only ever stocks `default_key_size` material
    // (see `services::pool::replenish_once`); a request for any other
    // size is always materialized fresh below rather than claimed.
    let try_pool_claim = size == state.config.default_key_size;

    for _ in 0..n {
        let key_id = Uuid::new_v4();
        let claimed = if try_pool_claim {
            kme_storage::keys::claim_pooled_key(
                &state.db,
                size as i32,
                master_sae_id,
                slave_sae_id,
                &request.additional_slave_sae_ids,
                expires_at,
                request_id,
            )
            .await?
        } else {
            None
        };
        let plaintext = match claimed {
            Some(claimed_id) => {
                let (_, plaintext) = kme_storage::keys::retrieve_key(
                    &state.db,
                    &state.cipher,
                    claimed_id,
                    master_sae_id,
                    None,
                    false,
                )
                .await?;
                state.pool_manager.bump_version();
                keys.push(Key {
                    key_id: claimed_id,
                    key: STANDARD.encode(&plaintext),
                    key_id_extension: None,
                    key_extension: None,
                });
                continue;
            }
            None => {
                let raw = generate_one(state, size).await?;
                kme_storage::keys::store_key(
                    &state.db,
                    &state.cipher,
                    key_id,
                    &raw,
                    master_sae_id,
                    slave_sae_id,
                    &request.additional_slave_sae_ids,
                    size as i32,
                    expires_at,
                    serde_json::json!({ "source": "direct_generation" }),
                    Some(request_id),
                )
                .await?;
                state.pool_manager.bump_version();
                raw
            }
        };
        keys.push(Key {
            key_id,
            key: STANDARD.encode(&plaintext),
            key_id_extension: None,
            key_extension: None,
        });
    }

    let _ = kme_storage::audit::log_distribution(
        &state.db,
        master_sae_id,
        slave_sae_id,
        &keys.iter().map(|k| k.key_id).collect::<Vec<_>>(),
        0,
    )
    .await;

    Ok(KeyContainer { keys, key_container_extension: None })
}

async fn generate_one(state: &AppState, size_bits: u32) -> Result<Vec<u8>, KmeError> {
    use crate::services::key_generator::{KeyGenerator, OsRngKeyGenerator};
    let timeout = std::time::Duration::from_secs(state.config.request_timeout_seconds);
    let generator = OsRngKeyGenerator;
    tokio::time::timeout(timeout, generator.generate(1, size_bits))
        .await
        .map_err(|_| KmeError::ServiceUnavailable("key generator timed out".to_string()))?
        .map_err(|e| KmeError::ServiceUnavailable(e.to_string()))?
        .into_iter()
        .next()
        .ok_or_else(|| KmeError::ServiceUnavailable("generator returned no key".to_string()))
}

/// POST /keys/{master_SAE_ID}/dec_keys — spec.md §4.7. All-or-nothing: any
/// unresolved id fails the whole request before anything is consumed.
pub async fn dec_keys(
    state: &AppState,
    requester_sae_id: &str,
    master_sae_id: &str,
    request: KeyIds,
) -> Result<KeyContainer, KmeError> {
    if request.key_ids.is_empty() {
        return Err(KmeError::InvalidRequest(vec![(
            "key_IDs".to_string(),
            "must be non-empty".to_string(),
        )]));
    }
    if request.key_ids.len() > state.config.max_keys_per_request as usize {
        return Err(KmeError::InvalidRequest(vec![(
            "key_IDs".to_string(),
            format!("length must not exceed {}", state.config.max_keys_per_request),
        )]));
    }
    if !is_sae_id(master_sae_id) {
        return Err(KmeError::InvalidRequest(vec![(
            "master_SAE_ID".to_string(),
            "must be exactly 16 characters".to_string(),
        )]));
    }

    let ids: Vec<Uuid> = request.key_ids.iter().map(|id| id.key_id).collect();

    let resolved = match kme_storage::keys::retrieve_keys_batch(
        &state.db,
        &state.cipher,
        &ids,
        requester_sae_id,
        Some(master_sae_id),
        state.config.single_use_keys,
    )
    .await?
    {
        kme_storage::keys::BatchRetrieval::Resolved(resolved) => resolved,
        kme_storage::keys::BatchRetrieval::Unauthorized => {
            // The whole batch rolled back; no record state changed.
            return Err(KmeError::Unauthorized(
                "requester is not authorized to retrieve one or more of the requested keys"
                    .to_string(),
            ));
        }
        kme_storage::keys::BatchRetrieval::NotFound(unresolved) => {
            // The whole batch rolled back; none of these ids were marked
            // consumed (spec.md §8: all-or-nothing).
            return Err(KmeError::InvalidRequest(vec![(
                "key_ids".to_string(),
                format!(
                    "unresolved ids: {}",
                    unresolved.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
                ),
            )]));
        }
    };

    let request_id = Uuid::new_v4();
    let mut keys = Vec::with_capacity(resolved.len());
    for (key_id, plaintext) in resolved {
        let _ = kme_storage::audit::log_access(
            &state.db,
            key_id,
            requester_sae_id,
            "dec_keys",
            "success",
            request_id,
        )
        .await;
        keys.push(Key {
            key_id,
            key: STANDARD.encode(&plaintext),
            key_id_extension: None,
            key_extension: None,
        });
    }

    Ok(KeyContainer { keys, key_container_extension: None })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_request() -> KeyRequest {
        KeyRequest {
            number: 1,
            size: Some(256),
            additional_slave_sae_ids: vec![],
            extension_mandatory: vec![],
            extension_optional: vec![],
        }
    }

    fn limits() -> RequestLimits {
        RequestLimits::from(&crate::config::Config::default())
    }

    #[test]
    fn accepts_request_within_bounds() {
        let req = base_request();
        assert!(validate_key_request(&limits(), "MMMMNNNNOOOOPPPP", &req).is_ok());
    }

    #[test]
    fn rejects_oversized_number() {
        let l = limits();
        let mut req = base_request();
        req.number = l.max_keys_per_request + 1;
        let err = validate_key_request(&l, "MMMMNNNNOOOOPPPP", &req).unwrap_err();
        assert!(err.iter().any(|(k, _)| k == "number"));
    }

    #[test]
    fn rejects_size_outside_bounds() {
        let l = limits();
        let mut req = base_request();
        req.size = Some(l.max_key_size + 8);
        let err = validate_key_request(&l, "MMMMNNNNOOOOPPPP", &req).unwrap_err();
        assert!(err.iter().any(|(k, _)| k == "size"));
    }

    #[test]
    fn rejects_primary_slave_listed_as_additional() {
        let l = limits();
        let mut req = base_request();
        req.additional_slave_sae_ids = vec!["MMMMNNNNOOOOPPPP".to_string()];
        let err = validate_key_request(&l, "MMMMNNNNOOOOPPPP", &req).unwrap_err();
        assert!(err.iter().any(|(k, _)| k == "additional_slave_SAE_IDs"));
    }

    #[test]
    fn rejects_duplicate_additional_slaves() {
        let l = limits();
        let mut req = base_request();
        req.additional_slave_sae_ids =
            vec!["AAAA1111BBBB2222".to_string(), "AAAA1111BBBB2222".to_string()];
        let err = validate_key_request(&l, "MMMMNNNNOOOOPPPP", &req).unwrap_err();
        assert!(err.iter().any(|(k, _)| k == "additional_slave_SAE_IDs"));
    }

    #[test]
    fn mandatory_extension_names_are_collected() {
        let mut req = base_request();
        let mut entry = HashMap::new();
        entry.insert("unknown_ext".to_string(), serde_json::json!(true));
        req.extension_mandatory.push(entry);
        let names: Vec<String> =
            req.extension_mandatory.iter().flat_map(|e| e.keys().cloned()).collect();
        assert_eq!(names, vec!["unknown_ext".to_string()]);
    }
}
