//! Per-connection relay of one HTTP request/response exchange.

use crate::backend::Backend;
use crate::error::ProxyError;
use crate::framer::MessageFramer;
use crate::pool::BackendPool;
use crate::types::LoadBalancerConfig;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{Instrument, Span, debug, field, info, info_span, warn};

/// Sent to the client when no backend can take the request.
pub const SERVICE_UNAVAILABLE: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Lifecycle of one proxied connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    BackendSelected,
    RequestForwarded,
    ResponseForwarded,
    Closed,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Aborted)
    }

    fn advance(&mut self, next: SessionState) {
        debug!(from = %self, to = %next, "Session state transition");
        *self = next;
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Accepted => write!(f, "ACCEPTED"),
            SessionState::BackendSelected => write!(f, "BACKEND_SELECTED"),
            SessionState::RequestForwarded => write!(f, "REQUEST_FORWARDED"),
            SessionState::ResponseForwarded => write!(f, "RESPONSE_FORWARDED"),
            SessionState::Closed => write!(f, "CLOSED"),
            SessionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Relays exactly one request and one response per inbound connection.
pub struct ConnectionHandler {
    pool: Arc<BackendPool>,
    framer: MessageFramer,
    connect_timeout: Duration,
    io_timeout: Option<Duration>,
}

impl ConnectionHandler {
    pub fn new(pool: Arc<BackendPool>, config: &LoadBalancerConfig) -> Self {
        Self {
            pool,
            framer: MessageFramer::new(config.max_header_bytes),
            connect_timeout: config.connect_timeout,
            io_timeout: config.io_timeout,
        }
    }

    /// Handle one inbound connection to completion.
    ///
    /// Both sockets are closed when this returns, whatever the outcome.
    /// Returns the terminal state of the session.
    pub async fn handle(&self, mut inbound: TcpStream, peer: SocketAddr) -> SessionState {
        let span = info_span!("session", peer = %peer, backend = field::Empty);

        async move {
            let mut state = SessionState::Accepted;

            match self.relay(&mut inbound, &mut state).await {
                Ok(()) => {
                    state.advance(SessionState::Closed);
                    info!("Exchange relayed");
                }
                Err(err) => {
                    if err.is_unavailable() {
                        if let Err(e) = inbound.write_all(SERVICE_UNAVAILABLE).await {
                            debug!(error = %e, "Failed to send 503 to client");
                        }
                    }
                    warn!(state = %state, error = %err, "Connection aborted");
                    state.advance(SessionState::Aborted);
                }
            }

            let _ = inbound.shutdown().await;
            state
        }
        .instrument(span)
        .await
    }

    async fn relay(
        &self,
        inbound: &mut TcpStream,
        state: &mut SessionState,
    ) -> Result<(), ProxyError> {
        let backend = self.pool.select_next().await?;
        Span::current().record("backend", field::display(&backend));
        state.advance(SessionState::BackendSelected);

        let mut outbound = self.dial(&backend).await?;

        let (client_read, mut client_write) = inbound.split();
        let mut client_read = BufReader::new(client_read);
        let (backend_read, mut backend_write) = outbound.split();
        let mut backend_read = BufReader::new(backend_read);

        let request = self
            .with_deadline("read request", self.framer.read_message(&mut client_read))
            .await?;
        debug!(start_line = request.start_line(), bytes = request.len(), "Request framed");

        self.with_deadline("forward request", async {
            backend_write.write_all(request.as_bytes()).await?;
            // Half-close so the backend sees the end of the request.
            backend_write.shutdown().await
        })
        .await?;
        state.advance(SessionState::RequestForwarded);

        let response = self
            .with_deadline("read response", self.framer.read_message(&mut backend_read))
            .await?;
        debug!(start_line = response.start_line(), bytes = response.len(), "Response framed");

        self.with_deadline("forward response", async {
            client_write.write_all(response.as_bytes()).await?;
            client_write.flush().await
        })
        .await?;
        state.advance(SessionState::ResponseForwarded);

        Ok(())
    }

    async fn dial(&self, backend: &Backend) -> Result<TcpStream, ProxyError> {
        let addr = backend.address();
        match timeout(self.connect_timeout, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(ProxyError::Dial {
                backend: addr,
                source,
            }),
            Err(_) => Err(ProxyError::Dial {
                backend: addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            }),
        }
    }

    async fn with_deadline<F, T, E>(&self, phase: &'static str, fut: F) -> Result<T, ProxyError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ProxyError>,
    {
        match self.io_timeout {
            Some(limit) => timeout(limit, fut)
                .await
                .map_err(|_| ProxyError::Timeout {
                    phase,
                    timeout: limit,
                })?
                .map_err(Into::into),
            None => fut.await.map_err(Into::into),
        }
    }
}
