//! Per-client WebSocket connection.
//!
//! A [`Connection`] is owned by the task running [`Connection::serve`]. The
//! simulation only ever sees it through a [`Weak<dyn Socket>`], so a closed
//! connection cannot be kept alive by a session that forgot about it.
//!
//! Outbound messages go through an unbounded FIFO drained by a dedicated
//! writer task, which keeps writes in order and never concurrent. Inbound
//! frames are read one at a time and forwarded to the [`Handler`].

use super::{ConnectionError, ConnectionId, Handler, Socket};
use crate::shutdown::Shutdown;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

/// How long to wait for the peer to finish a close handshake.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a connection. Transitions only move forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Items consumed by the writer task.
#[derive(Debug)]
pub enum Outbound {
    Message(Vec<u8>),
    Close,
}

pub struct Connection {
    id: ConnectionId,
    state: AtomicU8,
    outbound: mpsc::UnboundedSender<Outbound>,
    handler: Arc<dyn Handler>,
    max_message_size: usize,
}

impl Connection {
    /// Creates a connection in the `Connecting` state.
    ///
    /// Returns the receiving end of the outbound queue, which must be passed
    /// to [`Connection::serve`].
    pub fn new(
        id: ConnectionId,
        handler: Arc<dyn Handler>,
        max_message_size: usize,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, receiver) = mpsc::unbounded_channel();
        let connection = Arc::new(Self {
            id,
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            outbound,
            handler,
            max_message_size,
        });
        (connection, receiver)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Drives the connection until it closes.
    ///
    /// Moves to `Open`, reports the connection to the handler, then reads
    /// until the peer closes, a transport error occurs, [`Socket::close`] is
    /// called, or `shutdown` fires. The handler learns about the close when
    /// the last strong reference to the connection is dropped.
    pub async fn serve<S>(
        self: Arc<Self>,
        stream: WebSocketStream<S>,
        outbound: mpsc::UnboundedReceiver<Outbound>,
        shutdown: Shutdown,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, mut source) = stream.split();
        let mut writer = tokio::spawn(write_loop(sink, outbound));
        let mut writer_done = false;

        self.set_state(ConnectionState::Open);
        let socket: Arc<dyn Socket> = self.clone();
        self.handler.on_open(self.id, Arc::downgrade(&socket));
        drop(socket);

        let shutdown_signal = shutdown.wait();
        tokio::pin!(shutdown_signal);
        let mut shutdown_seen = false;

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(message)) => {
                        if !self.receive(message) {
                            break;
                        }
                    }
                    Some(Err(error)) => {
                        self.report("read", error.into());
                        break;
                    }
                    None => break,
                },
                result = &mut writer, if !writer_done => {
                    writer_done = true;
                    match result {
                        Ok(Ok(())) => {
                            // Our close frame is out; give the peer a moment to answer.
                            let _ = tokio::time::timeout(CLOSE_TIMEOUT, async {
                                while let Some(Ok(message)) = source.next().await {
                                    if message.is_close() {
                                        break;
                                    }
                                }
                            })
                            .await;
                        }
                        Ok(Err(error)) => self.report("write", error.into()),
                        Err(error) => debug!(connection = self.id, "writer task ended: {}", error),
                    }
                    break;
                }
                _ = &mut shutdown_signal, if !shutdown_seen => {
                    shutdown_seen = true;
                    trace!(connection = self.id, "closing for shutdown");
                    self.close();
                }
            }
        }

        self.set_state(ConnectionState::Closing);
        if !writer_done {
            // Also flushes tungstenite's reply when the peer started the close.
            let _ = self.outbound.send(Outbound::Close);
            match tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await {
                Ok(Ok(Err(error))) => trace!(connection = self.id, "close failed: {}", error),
                Ok(_) => {}
                Err(_) => writer.abort(),
            }
        }

        self.set_state(ConnectionState::Closed);
        debug!(connection = self.id, "connection closed");
    }

    /// Handles one inbound frame. Returns `false` once the peer has closed.
    fn receive(&self, message: Message) -> bool {
        match message {
            Message::Binary(data) => {
                if data.len() > self.max_message_size {
                    debug!(
                        connection = self.id,
                        size = data.len(),
                        limit = self.max_message_size,
                        "dropping oversized message"
                    );
                } else {
                    self.handler.on_message(self.id, data.to_vec());
                }
                true
            }
            Message::Text(_) => {
                debug!(connection = self.id, "dropping text frame");
                true
            }
            Message::Close(frame) => {
                debug!(connection = self.id, ?frame, "peer closed connection");
                false
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => true,
        }
    }

    fn report(&self, what: &str, error: ConnectionError) {
        if error.is_benign() {
            trace!(connection = self.id, "{} ended: {}", what, error);
        } else {
            self.handler.on_error(self.id, what, &error);
        }
    }
}

impl Socket for Connection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn send(&self, data: Vec<u8>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.outbound.send(Outbound::Message(data)).is_ok()
    }

    fn close(&self) {
        let opened = self.state.compare_exchange(
            ConnectionState::Open as u8,
            ConnectionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if opened.is_ok() {
            let _ = self.outbound.send(Outbound::Close);
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.set_state(ConnectionState::Closed);
        self.handler.on_close(self.id);
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) -> Result<(), WsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Message(data) => sink.send(Message::binary(data)).await?,
            Outbound::Close => {
                sink.send(Message::Close(None)).await?;
                break;
            }
        }
    }
    Ok(())
}
