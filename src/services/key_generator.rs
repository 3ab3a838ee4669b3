// src/services/key_generator.rs - the narrow interface to the QKD substrate
//
// spec.md §1 places "the QKD hardware / network that produces raw key
// material" out of scope; this crate consumes it through this interface
// only. `OsRngKeyGenerator` stands in for it in development and tests.
use async_trait::async_trait;
use rand::RngCore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("requested size {0} bits is not a positive multiple of 8")]
    InvalidSize(u32),
    #[error("generator timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[async_trait]
pub trait KeyGenerator: Send + Sync {
    /// Produces `n` keys of `size_bits` bits each, validating key quality
    /// before returning.
    async fn generate(&self, n: u32, size_bits: u32) -> Result<Vec<Vec<u8>>, GeneratorError>;
}

/// Fills key material from the OS CSPRNG. Not a QKD substrate; a
/// development/test stand-in behind the same interface.
pub struct OsRngKeyGenerator;

#[async_trait]
impl KeyGenerator for OsRngKeyGenerator {
    async fn generate(&self, n: u32, size_bits: u32) -> Result<Vec<Vec<u8>>, GeneratorError> {
        if size_bits == 0 || size_bits % 8 != 0 {
            return Err(GeneratorError::InvalidSize(size_bits));
        }
        let byte_len = (size_bits / 8) as usize;
        let mut out = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let mut buf = vec![0u8; byte_len];
            rand::rngs::OsRng.fill_bytes(&mut buf);
            out.push(buf);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_requested_count_and_size() {
        let gen = OsRngKeyGenerator;
        let keys = gen.generate(5, 256).await.unwrap();
        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|k| k.len() == 32));
    }

    #[tokio::test]
    async fn rejects_non_multiple_of_eight() {
        let gen = OsRngKeyGenerator;
        assert!(matches!(
            gen.generate(1, 255).await,
            Err(GeneratorError::InvalidSize(255))
        ));
    }

    #[tokio::test]
    async fn distinct_calls_produce_distinct_keys() {
        let gen = OsRngKeyGenerator;
        let keys = gen.generate(2, 128).await.unwrap();
        assert_ne!(keys[0], keys[1]);
    }
}
