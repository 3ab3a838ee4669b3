// Extracts an SAE identity (16-character Common Name + certificate
// fingerprint) from a validated mTLS peer certificate. TLS chain
// validation itself happens below this crate, at the transport layer;
// this module only reads what the handshake already proved trustworthy.

use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::errors::AuthError;

/// The identity a peer certificate claims, before it is checked against
/// the SAE registry.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    pub sae_id: String,
    pub fingerprint: [u8; 32],
}

/// Parses the DER bytes of a validated client certificate and extracts
/// the Common Name and SHA-256 fingerprint of the whole certificate.
pub fn extract_identity(der: &[u8]) -> Result<PeerIdentity, AuthError> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| AuthError::MalformedCertificate(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .ok_or(AuthError::InvalidCommonName)?;

    if common_name.len() != 16 {
        return Err(AuthError::InvalidCommonName);
    }

    Ok(PeerIdentity {
        sae_id: common_name.to_string(),
        fingerprint: fingerprint(der),
    })
}

/// SHA-256 fingerprint of a certificate's DER encoding.
pub fn fingerprint(der: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(der);
    hasher.finalize().into()
}

pub fn fingerprint_hex(der: &[u8]) -> String {
    fingerprint(der).iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage_der() {
        assert!(matches!(
            extract_identity(b"not a certificate"),
            Err(AuthError::MalformedCertificate(_))
        ));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(b"same bytes");
        let b = fingerprint(b"same bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_hex_is_lowercase_64_chars() {
        let hex = fingerprint_hex(b"cert bytes");
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
