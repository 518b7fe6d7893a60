use crate::config::{Config, TlsConfig};
use crate::telemetry;
use crate::session::{self, SessionContext, SessionError};
use obridge_core::Driver;
use rustls_pemfile::{certs, private_key};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

pub async fn run(config: Config, driver: Arc<dyn Driver>, token: CancellationToken) -> anyhow::Result<()> {
    if config.metrics.enabled {
        telemetry::serve(&config.metrics, token.clone()).await?;
    }

    let ctx = Arc::new(SessionContext {
        driver,
        gateway: config.gateway.clone(),
    });

    let mut listeners = JoinSet::new();
    if let Some(addr) = non_empty(&config.server.plain_listen_addr) {
        let listener = TcpListener::bind(addr).await?;
        info!("OBridge listening on {addr}");
        listeners.spawn(accept_loop(listener, None, ctx.clone(), token.clone()));
    }
    if config.tls.enabled {
        if let Some(addr) = non_empty(&config.server.tls_listen_addr) {
            let acceptor = build_tls_acceptor(&config.tls)?;
            let listener = TcpListener::bind(addr).await?;
            info!("OBridge listening on {addr} using TLS");
            listeners.spawn(accept_loop(listener, Some(acceptor), ctx.clone(), token.clone()));
        }
    }

    while let Some(result) = listeners.join_next().await {
        result??;
    }
    info!("listeners stopped");
    Ok(())
}

fn non_empty(addr: &Option<String>) -> Option<&str> {
    addr.as_deref().filter(|a| !a.is_empty())
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    ctx: Arc<SessionContext>,
    token: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        let (socket, peer) = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            accepted = listener.accept() => accepted?,
        };
        let span = info_span!("session", %peer, id = %Uuid::new_v4(), tls = tls.is_some());
        let tls = tls.clone();
        let ctx = ctx.clone();
        let token = token.clone();
        tokio::spawn(
            async move {
                debug!("client connected");
                match tls {
                    Some(acceptor) => match acceptor.accept(socket).await {
                        Ok(stream) => handle_client(stream, peer, ctx, token).await,
                        Err(err) => error!("tls accept error: {err}"),
                    },
                    None => handle_client(socket, peer, ctx, token).await,
                }
                debug!("client disconnected");
            }
            .instrument(span),
        );
    }
}

async fn handle_client<S>(stream: S, peer: SocketAddr, ctx: Arc<SessionContext>, token: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    match session::process(stream, ctx, token).await {
        Ok(()) => {}
        Err(SessionError::Cancelled) => debug!("session cancelled"),
        Err(SessionError::ConnectionModeDisabled(_) | SessionError::ConnectionFailed(_)) => {
            debug!("session rejected for {peer}")
        }
        Err(err) => error!("session error: {err}"),
    }
}

fn build_tls_acceptor(tls: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
    let cert_path = tls
        .cert_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("missing tls cert_path"))?;
    let key_path = tls
        .key_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("missing tls key_path"))?;
    let cert_file = &mut BufReader::new(File::open(cert_path)?);
    let key_file = &mut BufReader::new(File::open(key_path)?);
    let cert_chain = certs(cert_file).collect::<Result<Vec<_>, _>>()?;
    if cert_chain.is_empty() {
        return Err(anyhow::anyhow!("no certificates found"));
    }
    let key = private_key(key_file)?.ok_or_else(|| anyhow::anyhow!("no private keys found"))?;
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}
