// Authentication error types for the KME's mTLS identity boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no client certificate presented")]
    MissingCertificate,

    #[error("client certificate could not be parsed: {0}")]
    MalformedCertificate(String),

    #[error("client certificate Common Name is not a 16-character SAE ID")]
    InvalidCommonName,

    #[error("certificate fingerprint does not match the registered SAE")]
    FingerprintMismatch,

    #[error("SAE {0} is not registered with this KME")]
    UnknownSae(String),

    #[error("SAE {sae_id} has status {status:?} and may not initiate operations")]
    SaeNotActive { sae_id: String, status: SaeStatus },

    #[error("invalid SAE status string: {0}")]
    InvalidSaeStatus(String),
}

/// Lifecycle states for a registered SAE: `unregistered -> active <-> inactive
/// <-> suspended -> revoked`. Only `Active` permits new operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaeStatus {
    Active,
    Inactive,
    Suspended,
    Revoked,
}

impl SaeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::str::FromStr for SaeStatus {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            "revoked" => Ok(Self::Revoked),
            other => Err(AuthError::InvalidSaeStatus(other.to_string())),
        }
    }
}
