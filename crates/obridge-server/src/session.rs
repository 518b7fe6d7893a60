//! One client connection: handshake, credential negotiation, then the
//! command loop that hands statements to [`Query`].

use crate::config::GatewayConfig;
use crate::query::{Query, QueryContext, SharedConnection};
use crate::transport::{self, BoxedReader, Outbound};
use metrics::{counter, gauge};
use obridge_core::{Connection, Driver, DriverError};
use obridge_protocol::backend::encode;
use obridge_protocol::frontend::{read_credentials, read_handshake, read_query_request};
use obridge_protocol::{
    BackendMessage, Command, ConnectionCredentials, ErrorCode, WireError, WireReader,
};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitHeader,
    AwaitCredentials,
    Connecting,
    Negotiated,
    CommandLoop,
    Closed,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Wire(WireError),
    #[error("connection mode disabled: {0}")]
    ConnectionModeDisabled(String),
    #[error("upstream connection failed: {0}")]
    ConnectionFailed(String),
    #[error("session cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<WireError> for SessionError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Protocol(message) => SessionError::Protocol(message),
            WireError::Io(err) => SessionError::Io(err),
            other => SessionError::Wire(other),
        }
    }
}

/// Shared by every session of a server.
pub struct SessionContext {
    pub driver: Arc<dyn Driver>,
    pub gateway: GatewayConfig,
}

pub struct Session {
    ctx: Arc<SessionContext>,
    token: CancellationToken,
    state: SessionState,
    outbound: Outbound,
    reader: WireReader<BoxedReader>,
    connection: Option<SharedConnection>,
    current: Option<Query>,
}

/// Serve one client until it disconnects, fails, or `token` is cancelled.
pub async fn process<S>(
    stream: S,
    ctx: Arc<SessionContext>,
    token: CancellationToken,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = transport::split(stream);
    let mut session = Session {
        ctx,
        token: token.child_token(),
        state: SessionState::AwaitHeader,
        outbound: Outbound::new(writer),
        reader: WireReader::new(reader),
        connection: None,
        current: None,
    };
    counter!("obridge_sessions_total").increment(1);
    gauge!("obridge_sessions_active").increment(1.0);
    let result = session.run().await;
    session.shutdown().await;
    gauge!("obridge_sessions_active").decrement(1.0);
    result
}

impl Session {
    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    async fn run(&mut self) -> Result<(), SessionError> {
        let handshake = read_handshake(&self.reader).await?;
        let compression = handshake.compression_requested && self.ctx.gateway.enable_compression;
        self.transition(SessionState::AwaitCredentials);

        let credentials = read_credentials(&self.reader).await?;
        debug!(?credentials, "credentials received");
        self.transition(SessionState::Connecting);
        let connection = self.connect(credentials).await?;
        self.connection = Some(Arc::new(Mutex::new(connection)));

        self.send(&BackendMessage::ConnectionSuccess { compression }).await?;
        if compression {
            self.enable_compression().await;
        }
        self.transition(SessionState::Negotiated);
        info!(compression, "session established");

        self.transition(SessionState::CommandLoop);
        self.command_loop().await
    }

    async fn enable_compression(&mut self) {
        let reader = std::mem::replace(
            &mut self.reader,
            WireReader::new(Box::new(tokio::io::empty())),
        );
        self.reader = WireReader::new(transport::decompressing(reader.into_inner()));
        self.outbound.wrap(transport::compressing).await;
    }

    async fn connect(
        &mut self,
        credentials: ConnectionCredentials,
    ) -> Result<Box<dyn Connection>, SessionError> {
        let connection_string = match credentials {
            ConnectionCredentials::Proxy { .. } => {
                return self.reject_mode("Internal mode is not implemented").await;
            }
            ConnectionCredentials::External { connection_string }
                if connection_string.is_empty() =>
            {
                return self.reject_mode("Internal mode is not implemented").await;
            }
            ConnectionCredentials::External { connection_string } => connection_string,
        };
        if !self.ctx.gateway.enable_full_proxy {
            return self.reject_mode("Full proxy mode is disabled").await;
        }

        let opened = tokio::select! {
            _ = self.token.cancelled() => return Err(SessionError::Cancelled),
            opened = self.open_upstream(&connection_string) => opened,
        };
        match opened {
            Ok(connection) => Ok(connection),
            Err(err) => {
                let message = err.to_string();
                warn!("upstream connection failed: {message}");
                self.send(&BackendMessage::error(ErrorCode::ConnectionFailed, message.clone()))
                    .await?;
                Err(SessionError::ConnectionFailed(message))
            }
        }
    }

    async fn open_upstream(&self, connection_string: &str) -> Result<Box<dyn Connection>, DriverError> {
        let mut connection = self.ctx.driver.open(connection_string).await?;
        for statement in &self.ctx.gateway.session_init {
            if let Err(err) = connection.execute_non_query(statement).await {
                let _ = connection.close().await;
                return Err(err);
            }
        }
        Ok(connection)
    }

    async fn reject_mode<T>(&mut self, message: &str) -> Result<T, SessionError> {
        warn!("{message}");
        self.send(&BackendMessage::error(ErrorCode::ConnectionModeDisabled, message))
            .await?;
        Err(SessionError::ConnectionModeDisabled(message.to_string()))
    }

    async fn send(&self, msg: &BackendMessage) -> Result<(), SessionError> {
        let response = encode(msg)?;
        self.outbound.send_and_flush(&response).await?;
        Ok(())
    }

    async fn command_loop(&mut self) -> Result<(), SessionError> {
        loop {
            let byte = tokio::select! {
                _ = self.token.cancelled() => return Err(SessionError::Cancelled),
                byte = self.reader.read_u8() => byte,
            };
            let byte = match byte {
                Ok(byte) => byte,
                Err(WireError::TruncatedStream) => {
                    debug!("client closed the command stream");
                    if let Some(query) = self.current.take() {
                        query.finish().await;
                    }
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };

            match Command::from_wire(byte) {
                Some(Command::StopQuery) => {
                    if let Some(query) = self.current.take() {
                        let state = query.stop().await;
                        debug!(?state, "query stopped");
                    }
                }
                Some(command @ (Command::SubmitQuery | Command::SubmitParameterizedQuery)) => {
                    if let Some(query) = self.current.take() {
                        query.finish().await;
                    }
                    self.submit(command).await?;
                }
                None => warn!("ignoring unknown command {byte:#04x}"),
            }
        }
    }

    async fn submit(&mut self, command: Command) -> Result<(), SessionError> {
        let read = tokio::select! {
            _ = self.token.cancelled() => return Err(SessionError::Cancelled),
            read = read_query_request(&self.reader, command) => read,
        };
        let request = match read {
            Ok(request) => request,
            Err(err) if !err.is_fatal() => {
                warn!("rejecting query: {err}");
                return self
                    .send(&BackendMessage::error(ErrorCode::QueryExecutionFailed, err.to_string()))
                    .await;
            }
            Err(err) => return Err(err.into()),
        };
        let Some(connection) = self.connection.clone() else {
            return Err(SessionError::Protocol("no upstream connection".into()));
        };
        self.current = Some(Query::start(
            request,
            QueryContext {
                connection,
                outbound: self.outbound.clone(),
                session: self.token.clone(),
                timeout: self.ctx.gateway.query_timeout(),
            },
        ));
        Ok(())
    }

    /// Stop any running query, release the upstream connection and close
    /// the outbound stream.
    async fn shutdown(&mut self) {
        if let Some(query) = self.current.take() {
            query.stop().await;
        }
        if let Some(connection) = self.connection.take() {
            if let Err(err) = connection.lock().await.close().await {
                warn!("closing upstream connection failed: {err}");
            }
        }
        if let Err(err) = self.outbound.shutdown().await {
            debug!("outbound shutdown: {err}");
        }
        self.transition(SessionState::Closed);
    }
}
