// crates/clace-server/src/bootstrap.rs
// ============================================================================
// Module: Listener Bootstrap
// Description: Binds the built router to a plaintext and/or TLS listener
//              (spec.md §6.4's `[http]`/`[https]` sections).
// Purpose: Keep `clace-cli`'s `server start` to a config load plus one
//          call here.
// Dependencies: axum, axum-server, tokio, clace-config
// ============================================================================

use std::io;
use std::net::SocketAddr;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clace_apply::CancelToken;
use clace_config::HttpsConfig;

/// Loads a [`RustlsConfig`] from an `[https]` section, if it's enabled.
///
/// Returns `Ok(None)` when `config.host` is empty (TLS disabled).
///
/// # Errors
/// Returns an I/O error if the certificate or key file cannot be read.
pub async fn load_https(config: &HttpsConfig) -> io::Result<Option<(SocketAddr, RustlsConfig)>> {
    if config.host.is_empty() {
        return Ok(None);
    }
    let addr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid https address: {err}")))?;
    let rustls_config = RustlsConfig::from_pem_file(&config.cert_file, &config.key_file).await?;
    Ok(Some((addr, rustls_config)))
}

/// Serves `router` on `http_addr`, or over TLS on `https` if present,
/// until `shutdown` is cancelled (`POST /_clace/stop`, spec.md §5).
///
/// Only one listener runs per call; a deployment wanting both plaintext
/// and TLS simultaneously calls this twice against a cloned `router` on
/// separate tasks.
///
/// # Errors
/// Returns an I/O error if the listener fails to bind or the server
/// loop exits abnormally.
pub async fn serve(
    router: Router,
    http_addr: SocketAddr,
    https: Option<(SocketAddr, RustlsConfig)>,
    shutdown: CancelToken,
) -> io::Result<()> {
    match https {
        Some((addr, rustls_config)) => {
            let handle = axum_server::Handle::new();
            let shutdown_handle = handle.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                shutdown_handle.graceful_shutdown(None);
            });
            axum_server::bind_rustls(addr, rustls_config)
                .handle(handle)
                .serve(router.into_make_service())
                .await
        }
        None => {
            let listener = tokio::net::TcpListener::bind(http_addr).await?;
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    }
}
