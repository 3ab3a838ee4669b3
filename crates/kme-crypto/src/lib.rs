//! Encryption at rest and integrity hashing for key material held by a KME.
//!
//! This crate knows nothing about SAEs, pools, or HTTP; it is a narrow
//! utility used by the storage engine to encrypt key plaintext under a
//! process-wide master key and to verify it has not been tampered with.

pub mod aead;
pub mod error;
pub mod integrity;

pub use aead::MasterCipher;
pub use error::{CryptoError, CryptoResult};
