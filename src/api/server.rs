use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{serve::Listener, Router};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Duration;
use tokio_rustls::{server::TlsStream, TlsAcceptor};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{config::ValidationConfig, errors::Error, validation::Validator};

use super::routes::{build_admission_router, build_fetch_router, ApiState};

fn parse_addr(bind_address: &str, surface: &str) -> crate::Result<SocketAddr> {
    bind_address
        .parse()
        .map_err(|e| Error::config(format!("Invalid {} address '{}': {}", surface, bind_address, e)))
}

pub async fn start_rest_server(
    bind_address: &str,
    state: ApiState,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let addr = parse_addr(bind_address, "REST fetch")?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind REST fetch server: {}", e)))?;

    info!(address = %addr, "Starting REST fetch server");
    run_http_server(listener, build_fetch_router(state), cancel, "REST fetch").await?;
    info!("REST fetch server shutdown completed");
    Ok(())
}

/// Serve the admission webhook, over HTTPS when certificate paths are configured
pub async fn start_admission_server(
    config: &ValidationConfig,
    validator: Arc<Validator>,
    cancel: CancellationToken,
) -> crate::Result<()> {
    let addr = parse_addr(&config.bind_address, "admission")?;
    let acceptor = config
        .tls_paths()
        .map(|(cert, key)| configure_tls_acceptor(cert, key))
        .transpose()?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::transport(format!("Failed to bind admission server: {}", e)))?;
    let router = build_admission_router(validator.clone());

    match acceptor {
        Some(acceptor) => {
            info!(address = %addr, policy = ?validator.policy(), "Starting HTTPS admission webhook");
            run_tls_server(listener, acceptor, router, cancel).await?;
        }
        None => {
            warn!(address = %addr, "admission webhook has no TLS certificate, serving plain HTTP");
            run_http_server(listener, router, cancel, "admission").await?;
        }
    }
    info!("Admission webhook shutdown completed");
    Ok(())
}

async fn run_http_server(
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
    surface: &str,
) -> crate::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| Error::transport(format!("{} server error: {}", surface, e)))
}

async fn run_tls_server(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
    cancel: CancellationToken,
) -> crate::Result<()> {
    axum::serve(TlsListener::new(listener, acceptor), router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| Error::transport(format!("HTTPS admission server error: {}", e)))
}

fn configure_tls_acceptor(cert_path: &Path, key_path: &Path) -> crate::Result<TlsAcceptor> {
    let cert_bytes = std::fs::read(cert_path).map_err(|e| {
        Error::config(format!("Failed to read TLS certificate {}: {}", cert_path.display(), e))
    })?;
    let cert_chain: Vec<CertificateDer<'static>> = CertificateDer::pem_slice_iter(&cert_bytes)
        .collect::<Result<_, _>>()
        .map_err(|e| {
            Error::config(format!("Invalid TLS certificate {}: {}", cert_path.display(), e))
        })?;
    if cert_chain.is_empty() {
        return Err(Error::config(format!(
            "TLS certificate {} contains no certificates",
            cert_path.display()
        )));
    }

    let key_bytes = std::fs::read(key_path).map_err(|e| {
        Error::config(format!("Failed to read TLS private key {}: {}", key_path.display(), e))
    })?;
    let private_key = PrivateKeyDer::from_pem_slice(&key_bytes).map_err(|e| {
        Error::config(format!("Invalid TLS private key {}: {}", key_path.display(), e))
    })?;

    let provider = rustls::crypto::ring::default_provider();
    let server_config = rustls::ServerConfig::builder_with_provider(provider.into())
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::config(format!("Invalid TLS protocol configuration: {e}")))?
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(|e| Error::config(format!("Failed to load TLS certificate: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

struct TlsListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    fn new(listener: TcpListener, acceptor: TlsAcceptor) -> Self {
        Self { listener, acceptor }
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => match self.acceptor.accept(stream).await {
                    Ok(tls_stream) => return (tls_stream, addr),
                    Err(err) => {
                        warn!(error = %err, %addr, "TLS handshake failed");
                        continue;
                    }
                },
                Err(err) => {
                    if is_connection_error(&err) {
                        continue;
                    }
                    error!("HTTPS accept error: {err}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    fn local_addr(&self) -> std::io::Result<Self::Addr> {
        self.listener.local_addr()
    }
}

fn is_connection_error(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
    )
}
