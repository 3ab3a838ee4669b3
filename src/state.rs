// src/state.rs - shared application state injected into every handler
use std::sync::Arc;

use kme_crypto::MasterCipher;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::config::Config;
use crate::services::key_generator::{KeyGenerator, OsRngKeyGenerator};
use crate::services::pool::KeyPoolManager;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<Config>,
    pub cipher: Arc<MasterCipher>,
    pub pool_manager: Arc<KeyPoolManager>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        // The configured secret is an operator-chosen passphrase of any
        // length; derive the fixed 256-bit AEAD key from it.
        let derived_key: [u8; 32] = Sha256::digest(config.master_encryption_key.as_bytes()).into();
        let cipher = Arc::new(MasterCipher::new(&derived_key)?);
        let generator: Arc<dyn KeyGenerator> = Arc::new(OsRngKeyGenerator);
        let pool_manager = Arc::new(KeyPoolManager::new(
            db.clone(),
            cipher.clone(),
            generator,
            config.max_key_count,
            config.min_key_threshold,
            config.default_key_size,
            config.key_expiry_seconds,
        ));

        Ok(Self { db, config: Arc::new(config), cipher, pool_manager })
    }
}
