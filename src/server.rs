//! HTTPS server hosting the admission webhook

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::webhook::{webhook_router, WebhookState};
use crate::{Error, DEFAULT_WEBHOOK_PORT};

/// Time in-flight admission requests get to finish after shutdown starts
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// TLS certificate PEM file
    pub cert_path: PathBuf,
    /// TLS private key PEM file
    pub key_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_WEBHOOK_PORT)),
            cert_path: PathBuf::from("/tmp/k8s-webhook-server/serving-certs/tls.crt"),
            key_path: PathBuf::from("/tmp/k8s-webhook-server/serving-certs/tls.key"),
        }
    }
}

/// Load the serving certificate and key
pub async fn load_tls_config(config: &ServerConfig) -> Result<RustlsConfig, Error> {
    RustlsConfig::from_pem_file(&config.cert_path, &config.key_path)
        .await
        .map_err(|e| {
            Error::config(format!(
                "TLS config error ({}, {}): {}",
                config.cert_path.display(),
                config.key_path.display(),
                e
            ))
        })
}

/// Serve the webhook until `shutdown` is cancelled
///
/// Cancelling `shutdown` also abandons in-flight namespace lookups, which
/// then admit their Pods unchanged.
pub async fn start_server(
    config: ServerConfig,
    state: WebhookState,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let tls_config = load_tls_config(&config).await?;
    let state = Arc::new(state.with_shutdown(shutdown.clone()));
    let app = webhook_router(state);

    let handle = Handle::new();
    let shutdown_handle = handle.clone();
    tokio::spawn(async move {
        shutdown.cancelled().await;
        info!("Shutting down webhook server");
        shutdown_handle.graceful_shutdown(Some(SHUTDOWN_GRACE_PERIOD));
    });

    info!(addr = %config.addr, "Starting webhook server");

    axum_server::bind_rustls(config.addr, tls_config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| Error::server(format!("{}: {}", config.addr, e)))?;

    Ok(())
}
