//! AES-256-GCM encryption at rest for raw key material.
//!
//! The nonce is generated fresh per call and prepended to the ciphertext,
//! mirroring the on-disk layout common to file-backed AEAD stores.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};

const NONCE_LEN: usize = 12;

/// Process-wide AEAD key, loaded once from configuration at startup.
pub struct MasterCipher {
    cipher: Aes256Gcm,
}

impl MasterCipher {
    pub fn new(key_bytes: &[u8]) -> CryptoResult<Self> {
        if key_bytes.len() != 32 {
            return Err(CryptoError::InvalidMasterKeyLength(key_bytes.len()));
        }
        let cipher = Aes256Gcm::new_from_slice(key_bytes).map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext`, returning `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a blob produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, blob: &[u8]) -> CryptoResult<Vec<u8>> {
        if blob.len() < NONCE_LEN {
            return Err(CryptoError::CiphertextTruncated);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let mut plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        let result = plaintext.clone();
        plaintext.zeroize();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> MasterCipher {
        MasterCipher::new(&[7u8; 32]).unwrap()
    }

    #[test]
    fn round_trips_plaintext() {
        let c = cipher();
        let pt = b"quantum derived key material, 32 bytes!";
        let blob = c.encrypt(pt).unwrap();
        assert_ne!(&blob[12..], pt.as_slice());
        let decrypted = c.decrypt(&blob).unwrap();
        assert_eq!(decrypted, pt);
    }

    #[test]
    fn rejects_short_master_key() {
        assert!(matches!(
            MasterCipher::new(&[0u8; 16]),
            Err(CryptoError::InvalidMasterKeyLength(16))
        ));
    }

    #[test]
    fn rejects_truncated_ciphertext() {
        let c = cipher();
        assert!(matches!(
            c.decrypt(&[1, 2, 3]),
            Err(CryptoError::CiphertextTruncated)
        ));
    }

    #[test]
    fn rejects_tampered_ciphertext() {
        let c = cipher();
        let mut blob = c.encrypt(b"secret bytes").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0xFF;
        assert!(matches!(c.decrypt(&blob), Err(CryptoError::DecryptionFailed)));
    }
}
