// src/main.rs - process entrypoint: TLS termination with mandatory client
// certificates, route wiring, and graceful shutdown.
use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig as RustlsServerConfig};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod extractors;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod state;

use config::Config;
use extractors::ClientCertInfo;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config)?;

    let db_pool =
        kme_storage::create_pool(&config.database_url, config.database_max_connections, config.database_min_connections)
            .await?;

    let port = config.port;
    let host = config.host.clone();
    let tls_config = load_tls_config(&config)?;
    let replenishment_period = std::time::Duration::from_secs(config.replenishment_period_seconds);

    let app_state = AppState::new(db_pool, config)?;
    let pool_manager = app_state.pool_manager.clone();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let replenishment_handle = pool_manager.spawn_replenishment_loop(replenishment_period, shutdown_rx);

    let app = routes::create_router(app_state)
        .layer(
            tower::ServiceBuilder::new().layer(
                TraceLayer::new_for_http()
                    .make_span_with(middleware::trace::make_span)
                    .on_request(middleware::trace::on_request)
                    .on_response(middleware::trace::on_response),
            ),
        )
        .into_make_service_with_connect_info::<ClientCertInfo>();

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    tracing::info!(%addr, "KME backend starting");

    axum_server::bind(addr)
        .acceptor(RustlsAcceptor::new(tls_config))
        .serve(app)
        .await?;

    let _ = shutdown_tx.send(true);
    replenishment_handle.await.ok();

    Ok(())
}

/// Builds a `rustls::ServerConfig` requiring client certificates, verified
/// against the configured CA bundle. TLS termination is otherwise assumed
/// out of this crate's scope; this is the minimal glue to turn that on.
fn load_tls_config(config: &Config) -> anyhow::Result<RustlsConfig> {
    let cert_chain = load_certs(&config.tls_cert_path)?;
    let key = load_key(&config.tls_key_path)?;

    let mut root_store = RootCertStore::empty();
    for cert in load_certs(&config.tls_ca_bundle_path)? {
        root_store.add(cert)?;
    }

    let client_verifier = WebPkiClientVerifier::builder(Arc::new(root_store)).build()?;

    let server_config = RustlsServerConfig::builder()
        .with_client_cert_verifier(client_verifier)
        .with_single_cert(cert_chain, key)?;

    Ok(RustlsConfig::from_config(Arc::new(server_config)))
}

fn load_certs(path: &str) -> anyhow::Result<Vec<rustls::pki_types::CertificateDer<'static>>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("failed to parse certificate bundle {path}: {e}"))
}

fn load_key(path: &str) -> anyhow::Result<rustls::pki_types::PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {path}"))
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.tracing_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
    Ok(())
}
