//! TCP accept loop.

use super::{Authenticator, Connection, ConnectionId, Router};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::shutdown::Shutdown;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info, warn};

const BACKLOG: i32 = 1024;

/// Ceiling on a single WebSocket message at the transport level.
///
/// Deliberately above the application limit: messages between the two are
/// dropped by the connection instead of failing the whole socket.
const TRANSPORT_MESSAGE_LIMIT: usize = 64 * 1024;

/// Accepts TCP connections, authenticates them and hands them to worlds.
pub struct Listener {
    inner: TcpListener,
    authenticator: Arc<Authenticator>,
    router: Arc<dyn Router>,
    next_id: Arc<AtomicU32>,
    max_message_size: usize,
}

impl Listener {
    /// Binds the listening socket.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Network`] if the address cannot be bound.
    pub fn bind(config: &ServerConfig, router: Arc<dyn Router>) -> Result<Self, ServerError> {
        let inner = bind_socket(config.bind_address)?;
        info!("✅ Listener bound on {}", config.bind_address);

        Ok(Self {
            inner,
            authenticator: Arc::new(Authenticator::new(
                config.auth_token.clone(),
                config.handshake_timeout,
            )),
            router,
            next_id: Arc::new(AtomicU32::new(0)),
            max_message_size: config.max_message_size,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accepts connections until `shutdown` fires.
    ///
    /// Each accepted socket is handshaken on its own task, so a slow client
    /// never holds up the next accept.
    pub async fn run(self, shutdown: Shutdown) {
        let shutdown_signal = shutdown.wait();
        tokio::pin!(shutdown_signal);

        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, addr)) => self.dispatch(stream, addr, shutdown.clone()),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        // Usually descriptor exhaustion; back off instead of spinning.
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = &mut shutdown_signal => {
                    info!("Listener stopped accepting connections");
                    break;
                }
            }
        }
    }

    fn dispatch(&self, stream: TcpStream, addr: SocketAddr, shutdown: Shutdown) {
        let authenticator = self.authenticator.clone();
        let router = self.router.clone();
        let next_id = self.next_id.clone();
        let max_message_size = self.max_message_size;

        tokio::spawn(async move {
            if let Err(e) = stream.set_nodelay(true) {
                debug!(%addr, "Failed to set TCP_NODELAY: {}", e);
            }

            // Chosen before the handshake so a client is never upgraded without a world.
            let Some(handler) = router.select() else {
                warn!(%addr, "No world available, dropping connection");
                return;
            };

            let mut ws_config = WebSocketConfig::default();
            ws_config.max_message_size = Some(TRANSPORT_MESSAGE_LIMIT);
            ws_config.max_frame_size = Some(TRANSPORT_MESSAGE_LIMIT);

            let stream = match authenticator.accept(stream, ws_config).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(%addr, "Handshake failed: {}", e);
                    return;
                }
            };

            let id: ConnectionId = next_id.fetch_add(1, Ordering::Relaxed);
            info!(connection = id, %addr, "🔗 Connection established");

            let (connection, outbound) = Connection::new(id, handler, max_message_size);
            connection.serve(stream, outbound, shutdown).await;
        });
    }
}

fn bind_socket(address: SocketAddr) -> Result<TcpListener, ServerError> {
    let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| ServerError::Network(format!("Socket creation failed: {e}")))?;
    socket
        .set_reuse_address(true)
        .map_err(|e| ServerError::Network(format!("Setting SO_REUSEADDR failed: {e}")))?;
    socket
        .bind(&address.into())
        .map_err(|e| ServerError::Network(format!("Bind to {address} failed: {e}")))?;
    socket
        .listen(BACKLOG)
        .map_err(|e| ServerError::Network(format!("Listen failed: {e}")))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| ServerError::Network(format!("Setting non-blocking mode failed: {e}")))?;

    let std_listener: StdTcpListener = socket.into();
    TcpListener::from_std(std_listener)
        .map_err(|e| ServerError::Network(format!("Tokio listener creation failed: {e}")))
}
