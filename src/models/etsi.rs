// src/models/etsi.rs - ETSI GS QKD 014 V1.1.1 wire types
//
// Field names and casing follow the standard verbatim (see
// original_source/app/models/etsi_models.py for the reference field list);
// serde renames preserve that casing on the wire while Rust fields stay
// snake_case internally.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Response body for GET /keys/{slave_SAE_ID}/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    #[serde(rename = "source_KME_ID")]
    pub source_kme_id: String,
    #[serde(rename = "target_KME_ID")]
    pub target_kme_id: String,
    #[serde(rename = "master_SAE_ID")]
    pub master_sae_id: String,
    #[serde(rename = "slave_SAE_ID")]
    pub slave_sae_id: String,
    pub key_size: u32,
    pub stored_key_count: u64,
    pub max_key_count: u64,
    pub max_key_per_request: u32,
    pub max_key_size: u32,
    pub min_key_size: u32,
    #[serde(rename = "max_SAE_ID_count")]
    pub max_sae_id_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_extension: Option<serde_json::Value>,
}

/// Request body for POST /keys/{slave_SAE_ID}/enc_keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRequest {
    #[serde(default = "default_number")]
    pub number: u32,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(rename = "additional_slave_SAE_IDs", default)]
    pub additional_slave_sae_ids: Vec<String>,
    #[serde(default)]
    pub extension_mandatory: Vec<std::collections::HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub extension_optional: Vec<std::collections::HashMap<String, serde_json::Value>>,
}

fn default_number() -> u32 {
    1
}

/// A single delivered key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    #[serde(rename = "key_ID")]
    pub key_id: Uuid,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id_extension: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_extension: Option<serde_json::Value>,
}

/// Response body for enc_keys and dec_keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyContainer {
    pub keys: Vec<Key>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_container_extension: Option<serde_json::Value>,
}

/// A single key identifier in a dec_keys request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyId {
    #[serde(rename = "key_ID")]
    pub key_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id_extension: Option<serde_json::Value>,
}

/// Request body for POST /keys/{master_SAE_ID}/dec_keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyIds {
    #[serde(rename = "key_IDs")]
    pub key_ids: Vec<KeyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_ids_extension: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_request_defaults_number_to_one() {
        let parsed: KeyRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed.number, 1);
        assert!(parsed.size.is_none());
        assert!(parsed.additional_slave_sae_ids.is_empty());
    }

    #[test]
    fn status_uses_etsi_casing_on_the_wire() {
        let status = Status {
            source_kme_id: "AAAABBBBCCCCDDDD".into(),
            target_kme_id: "EEEEFFFFGGGGHHHH".into(),
            master_sae_id: "IIIIJJJJKKKKLLLL".into(),
            slave_sae_id: "MMMMNNNNOOOOPPPP".into(),
            key_size: 352,
            stored_key_count: 25000,
            max_key_count: 100000,
            max_key_per_request: 128,
            max_key_size: 102400,
            min_key_size: 64,
            max_sae_id_count: 10,
            status_extension: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"source_KME_ID\""));
        assert!(json.contains("\"master_SAE_ID\""));
        assert!(json.contains("\"max_SAE_ID_count\""));
    }

    #[test]
    fn key_ids_round_trip_uuid_casing() {
        let json = r#"{"key_IDs":[{"key_ID":"550e8400-e29b-41d4-a716-446655440000"}]}"#;
        let parsed: KeyIds = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.key_ids.len(), 1);
    }
}
