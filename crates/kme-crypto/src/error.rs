//! Error taxonomy for encryption-at-rest and integrity verification.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("master key must be exactly 32 bytes, got {0}")]
    InvalidMasterKeyLength(usize),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("ciphertext too short to contain a nonce")]
    CiphertextTruncated,

    #[error("integrity hash mismatch: stored key material has been tampered with or corrupted")]
    IntegrityMismatch,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
