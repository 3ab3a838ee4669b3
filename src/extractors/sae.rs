// src/extractors/sae.rs - SAE identity extraction from the mTLS peer certificate
use std::net::SocketAddr;

use axum::{
    extract::{connect_info::Connected, ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use kme_auth::{AuthError, SaeStatus};

use crate::middleware::error_handler::KmeError;
use crate::state::AppState;

/// The DER bytes of the validated client certificate for this connection,
/// captured once at the TLS handshake and carried via axum's connect-info
/// mechanism (see `main.rs`'s acceptor wiring).
#[derive(Debug, Clone)]
pub struct ClientCertificate(pub Vec<u8>);

/// Connection-level info axum attaches once per accepted TLS connection.
/// `cert` is `None` only if the peer negotiated TLS without presenting a
/// certificate, which `WebPkiClientVerifier` in `main.rs` does not permit
/// for routes that reach this extractor.
#[derive(Clone)]
pub struct ClientCertInfo {
    pub remote_addr: SocketAddr,
    pub cert: Option<ClientCertificate>,
}

type TlsStream = tokio_rustls::server::TlsStream<tokio::net::TcpStream>;

impl Connected<axum_server::accept::IncomingStream<'_, TlsStream>> for ClientCertInfo {
    fn connect_info(stream: axum_server::accept::IncomingStream<'_, TlsStream>) -> Self {
        let remote_addr = stream.remote_addr();
        let (_, session) = stream.io().get_ref();
        let cert = session
            .peer_certificates()
            .and_then(|certs| certs.first())
            .map(|c| ClientCertificate(c.as_ref().to_vec()));
        Self { remote_addr, cert }
    }
}

/// An authenticated, active SAE, resolved from the peer certificate's
/// Common Name and verified against the registered fingerprint (spec.md §4.8).
#[derive(Debug, Clone)]
pub struct SaeIdentity {
    pub sae_id: String,
    pub kme_id: String,
}

impl<S> FromRequestParts<S> for SaeIdentity
where
    AppState: axum::extract::FromRef<S>,
    S: Send + Sync,
{
    type Rejection = KmeError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = <AppState as axum::extract::FromRef<S>>::from_ref(state);

        let ConnectInfo(conn_info) = parts
            .extensions
            .get::<ConnectInfo<ClientCertInfo>>()
            .cloned()
            .ok_or(AuthError::MissingCertificate)?;
        let cert = conn_info.cert.ok_or(AuthError::MissingCertificate)?;

        let identity = kme_auth::extract_identity(&cert.0)?;

        let record = kme_storage::saes::find_sae(&app_state.db, &identity.sae_id)
            .await
            .map_err(KmeError::from)?
            .ok_or_else(|| AuthError::UnknownSae(identity.sae_id.clone()))?;

        if record.certificate_fingerprint != kme_auth::fingerprint_hex(&cert.0) {
            return Err(AuthError::FingerprintMismatch.into());
        }

        let status: SaeStatus = record.status.parse()?;
        if !status.is_active() {
            return Err(AuthError::SaeNotActive { sae_id: identity.sae_id, status }.into());
        }

        Ok(SaeIdentity { sae_id: identity.sae_id, kme_id: record.kme_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_certificate_carries_der_bytes() {
        let cert = ClientCertificate(vec![1, 2, 3]);
        assert_eq!(cert.0, vec![1, 2, 3]);
    }
}
