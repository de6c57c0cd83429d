//! Gateway - TCP/TLS listener that accepts incoming WebSocket clients.
//!
//! The Gateway binds its sockets, performs the WebSocket upgrade under the
//! configured [`UpgradePolicy`], and spawns one Connection task per client.

use crate::config::{ListenConfig, TlsConfig};
use crate::error::ConnectionError;
use crate::metrics;
use crate::network::{Connection, UpgradePolicy};
use crate::state::{Registry, SessionId};
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{BufReader, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tracing::{debug, error, info, instrument, warn};

/// The Gateway accepts incoming TCP/TLS connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    tls_listener: Option<(TcpListener, TlsAcceptor)>,
    policy: Arc<UpgradePolicy>,
    registry: Arc<Registry>,
}

impl Gateway {
    /// Bind the gateway to the configured addresses.
    pub async fn bind(
        listen: ListenConfig,
        tls_config: Option<TlsConfig>,
        registry: Arc<Registry>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen.address).await?;
        info!(address = %listen.address, path = %listen.path, "WebSocket listener bound");

        let tls_listener = if let Some(tls_cfg) = tls_config {
            let tls_acceptor = Self::load_tls(&tls_cfg)?;
            let listener = TcpListener::bind(tls_cfg.address).await?;
            info!(address = %tls_cfg.address, "TLS listener bound");
            Some((listener, tls_acceptor))
        } else {
            None
        };

        Ok(Self {
            listener,
            tls_listener,
            policy: Arc::new(UpgradePolicy::from_config(&listen)),
            registry,
        })
    }

    /// Address of the plaintext listener.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Load TLS certificates and create TlsAcceptor.
    fn load_tls(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
        let cert_file = std::fs::read(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;

        if certs.is_empty() {
            anyhow::bail!("No certificates found in {}", config.cert_path);
        }

        let key_file = std::fs::read(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let key = pkcs8_private_keys(key_reader)
            .next()
            .transpose()?
            .map(PrivateKeyDer::from)
            .ok_or_else(|| anyhow::anyhow!("No private keys found in {}", config.key_path))?;

        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        if let Some((tls_listener, tls_acceptor)) = self.tls_listener {
            let policy = Arc::clone(&self.policy);
            let registry = Arc::clone(&self.registry);

            tokio::spawn(async move {
                loop {
                    match tls_listener.accept().await {
                        Ok((stream, addr)) => {
                            debug!(%addr, "TLS connection accepted");
                            let acceptor = tls_acceptor.clone();
                            let policy = Arc::clone(&policy);
                            let registry = Arc::clone(&registry);

                            tokio::spawn(async move {
                                match acceptor.accept(stream).await {
                                    Ok(tls_stream) => serve(tls_stream, addr, policy, registry).await,
                                    Err(e) => {
                                        metrics::record_connection_error("tls");
                                        warn!(%addr, error = %e, "TLS handshake failed");
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept TLS connection");
                        }
                    }
                }
            });
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "Connection accepted");
                    let policy = Arc::clone(&self.policy);
                    let registry = Arc::clone(&self.registry);
                    tokio::spawn(serve(stream, addr, policy, registry));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Upgrade one stream and serve it until the client leaves.
async fn serve<S>(stream: S, addr: SocketAddr, policy: Arc<UpgradePolicy>, registry: Arc<Registry>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = accept_and_run(stream, addr, &policy, registry).await {
        metrics::record_connection_error(e.error_code());
        match e {
            ConnectionError::Handshake(e) => debug!(%addr, error = %e, "WebSocket handshake failed"),
            ConnectionError::Registry(e) => error!(%addr, error = %e, "Connection error"),
        }
    }
}

async fn accept_and_run<S>(
    stream: S,
    addr: SocketAddr,
    policy: &UpgradePolicy,
    registry: Arc<Registry>,
) -> Result<(), ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let callback = |req: &Request, response: Response| policy.check(req).map(|()| response);
    let ws_stream = accept_hdr_async(stream, callback).await?;

    metrics::record_connection();
    let session = SessionId::generate();
    info!(%addr, %session, "WebSocket connection established");

    Connection::new(session, ws_stream, addr, registry).run().await?;
    Ok(())
}
