//! WebSocket upgrade and sub-protocol authentication.
//!
//! The upgrade request is parsed here rather than inside tungstenite so the
//! server can answer `400` and `401` itself. Once the request is accepted the
//! already-read bytes are handed to tungstenite with
//! [`WebSocketStream::from_partially_read`].

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;

/// Largest request head accepted before the handshake is abandoned.
pub const MAX_REQUEST_SIZE: usize = 2048;

const MAX_HEADERS: usize = 32;
const READ_CHUNK: usize = 512;
const SERVER_NAME: &str = concat!("game_server/", env!("CARGO_PKG_VERSION"));

/// Reasons an incoming connection never becomes a [`Connection`](super::Connection).
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("handshake timed out")]
    Timeout,

    #[error("request head exceeds the size limit")]
    TooLarge,

    #[error("peer closed the connection during the handshake")]
    Closed,

    #[error("malformed HTTP request: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("not a websocket upgrade request")]
    NotUpgrade,

    #[error("sub-protocol token rejected")]
    Unauthorized,

    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),
}

/// The parts of an upgrade request the server cares about.
#[derive(Debug, Default)]
struct UpgradeRequest {
    is_get: bool,
    upgrade_websocket: bool,
    connection_upgrade: bool,
    version_13: bool,
    key: Option<String>,
    protocols: Vec<String>,
}

impl UpgradeRequest {
    fn is_upgrade(&self) -> bool {
        self.is_get
            && self.upgrade_websocket
            && self.connection_upgrade
            && self.version_13
            && self.key.is_some()
    }
}

/// Validates upgrade requests against a fixed sub-protocol token.
///
/// The token check is a placeholder for real authentication: a client is
/// admitted if any entry of its `Sec-WebSocket-Protocol` list equals the
/// configured token.
#[derive(Debug, Clone)]
pub struct Authenticator {
    token: String,
    timeout: Duration,
}

impl Authenticator {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Self {
        Self {
            token: token.into(),
            timeout,
        }
    }

    /// Runs the handshake on `stream` and returns the upgraded WebSocket.
    ///
    /// The whole exchange, including writing the response, must finish within
    /// the configured timeout. Rejected requests get an HTTP error response
    /// before the error is returned; the caller just drops the stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - A freshly accepted byte stream
    /// * `config` - Frame limits applied to the upgraded WebSocket
    pub async fn accept<S>(
        &self,
        mut stream: S,
        config: WebSocketConfig,
    ) -> Result<WebSocketStream<S>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let leftover = tokio::time::timeout(self.timeout, self.negotiate(&mut stream))
            .await
            .map_err(|_| HandshakeError::Timeout)??;

        Ok(WebSocketStream::from_partially_read(stream, leftover, Role::Server, Some(config)).await)
    }

    /// Reads the request, answers it, and returns any bytes read past the head.
    async fn negotiate<S>(&self, stream: &mut S) -> Result<Vec<u8>, HandshakeError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (request, head_len, buffer) = match read_request(stream).await {
            Ok(parsed) => parsed,
            Err(error @ HandshakeError::Malformed(_)) => {
                respond_error(stream, "400 Bad Request").await?;
                return Err(error);
            }
            Err(error) => return Err(error),
        };

        if !request.is_upgrade() {
            respond_error(stream, "400 Bad Request").await?;
            return Err(HandshakeError::NotUpgrade);
        }

        if !request.protocols.iter().any(|p| *p == self.token) {
            respond_error(stream, "401 Unauthorized").await?;
            return Err(HandshakeError::Unauthorized);
        }

        let key = request.key.as_deref().unwrap_or_default();
        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             Sec-WebSocket-Protocol: {}\r\n\
             Server: {}\r\n\r\n",
            derive_accept_key(key.as_bytes()),
            self.token,
            SERVER_NAME,
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;

        Ok(buffer[head_len..].to_vec())
    }
}

/// Reads until a full request head is buffered.
///
/// Returns the parsed request, the length of the head, and the whole buffer
/// (which may extend past the head if the client pipelined frames).
async fn read_request<S>(stream: &mut S) -> Result<(UpgradeRequest, usize, Vec<u8>), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        if let Some((request, head_len)) = parse_request(&buffer)? {
            return Ok((request, head_len, buffer));
        }

        let room = MAX_REQUEST_SIZE - buffer.len();
        if room == 0 {
            return Err(HandshakeError::TooLarge);
        }

        let read = stream.read(&mut chunk[..room.min(READ_CHUNK)]).await?;
        if read == 0 {
            return Err(HandshakeError::Closed);
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}

/// Parses a request head, or returns `None` if more bytes are needed.
fn parse_request(buffer: &[u8]) -> Result<Option<(UpgradeRequest, usize)>, httparse::Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);

    let head_len = match parsed.parse(buffer)? {
        httparse::Status::Complete(len) => len,
        httparse::Status::Partial => return Ok(None),
    };

    let mut request = UpgradeRequest {
        is_get: parsed.method == Some("GET") && parsed.version == Some(1),
        ..Default::default()
    };

    for header in parsed.headers.iter() {
        let value = String::from_utf8_lossy(header.value);
        let value = value.trim();

        if header.name.eq_ignore_ascii_case("upgrade") {
            request.upgrade_websocket |= has_token(value, "websocket");
        } else if header.name.eq_ignore_ascii_case("connection") {
            request.connection_upgrade |= has_token(value, "upgrade");
        } else if header.name.eq_ignore_ascii_case("sec-websocket-version") {
            request.version_13 = value == "13";
        } else if header.name.eq_ignore_ascii_case("sec-websocket-key") {
            request.key = Some(value.to_string());
        } else if header.name.eq_ignore_ascii_case("sec-websocket-protocol") {
            request.protocols.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }
    }

    Ok(Some((request, head_len)))
}

fn has_token(list: &str, token: &str) -> bool {
    list.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

async fn respond_error<S>(stream: &mut S, status: &str) -> Result<(), HandshakeError>
where
    S: AsyncWrite + Unpin,
{
    let response = format!(
        "HTTP/1.1 {status}\r\nServer: {SERVER_NAME}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio::io::{duplex, DuplexStream};
    use tokio_tungstenite::tungstenite::Message;

    const KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn upgrade_request(protocol: Option<&str>) -> String {
        let mut request = format!(
            "GET / HTTP/1.1\r\n\
             Host: localhost\r\n\
             Upgrade: websocket\r\n\
             Connection: keep-alive, Upgrade\r\n\
             Sec-WebSocket-Key: {KEY}\r\n\
             Sec-WebSocket-Version: 13\r\n"
        );
        if let Some(protocol) = protocol {
            request.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
        }
        request.push_str("\r\n");
        request
    }

    fn authenticator() -> Authenticator {
        Authenticator::new("test", Duration::from_secs(1))
    }

    async fn read_response(client: &mut DuplexStream) -> String {
        let mut buffer = vec![0u8; 1024];
        let mut len = 0;
        while !buffer[..len].windows(4).any(|w| w == b"\r\n\r\n") {
            let read = client.read(&mut buffer[len..]).await.unwrap();
            assert!(read > 0, "server closed before responding");
            len += read;
        }
        String::from_utf8(buffer[..len].to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_accepts_valid_token() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(upgrade_request(Some("chat, test")).as_bytes())
            .await
            .unwrap();

        let accept = tokio::spawn(async move {
            authenticator()
                .accept(server, WebSocketConfig::default())
                .await
        });

        let response = read_response(&mut client).await;
        assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        // Accept key from RFC 6455 section 1.3.
        assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(response.contains("Sec-WebSocket-Protocol: test\r\n"));
        assert!(response.contains("Server: game_server/"));
        assert!(accept.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_rejects_wrong_token_with_401() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(upgrade_request(Some("nope")).as_bytes())
            .await
            .unwrap();

        let result = authenticator()
            .accept(server, WebSocketConfig::default())
            .await;
        assert!(matches!(result, Err(HandshakeError::Unauthorized)));
        assert!(read_response(&mut client)
            .await
            .starts_with("HTTP/1.1 401 Unauthorized\r\n"));
    }

    #[tokio::test]
    async fn test_rejects_missing_token_with_401() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(upgrade_request(None).as_bytes())
            .await
            .unwrap();

        let result = authenticator()
            .accept(server, WebSocketConfig::default())
            .await;
        assert!(matches!(result, Err(HandshakeError::Unauthorized)));
    }

    #[tokio::test]
    async fn test_plain_http_gets_400() {
        let (mut client, server) = duplex(4096);
        client
            .write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();

        let result = authenticator()
            .accept(server, WebSocketConfig::default())
            .await;
        assert!(matches!(result, Err(HandshakeError::NotUpgrade)));
        assert!(read_response(&mut client)
            .await
            .starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_garbage_gets_400() {
        let (mut client, server) = duplex(4096);
        client.write_all(b"\x16\x03\x01 hello\r\n\r\n").await.unwrap();

        let result = authenticator()
            .accept(server, WebSocketConfig::default())
            .await;
        assert!(matches!(result, Err(HandshakeError::Malformed(_))));
        assert!(read_response(&mut client)
            .await
            .starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[tokio::test]
    async fn test_oversized_head_is_dropped() {
        let (mut client, server) = duplex(8192);
        let mut request = "GET / HTTP/1.1\r\n".to_string();
        request.push_str(&format!("X-Padding: {}\r\n", "a".repeat(MAX_REQUEST_SIZE)));
        client.write_all(request.as_bytes()).await.unwrap();

        let result = authenticator()
            .accept(server, WebSocketConfig::default())
            .await;
        assert!(matches!(result, Err(HandshakeError::TooLarge)));
    }

    #[tokio::test]
    async fn test_silent_client_times_out() {
        let (_client, server) = duplex(64);
        let result = Authenticator::new("test", Duration::from_millis(20))
            .accept(server, WebSocketConfig::default())
            .await;
        assert!(matches!(result, Err(HandshakeError::Timeout)));
    }

    #[tokio::test]
    async fn test_pipelined_frame_after_head_is_kept() {
        let (client, server) = duplex(4096);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        let accept = tokio::spawn(async move {
            authenticator()
                .accept(server, WebSocketConfig::default())
                .await
        });

        // Request head and a masked binary frame [0x00, 0x00, 0x01, 0x00] in one write.
        let mut bytes = upgrade_request(Some("test")).into_bytes();
        let mask = [0x11, 0x22, 0x33, 0x44];
        bytes.extend_from_slice(&[0x82, 0x84]);
        bytes.extend_from_slice(&mask);
        bytes.extend([0x00u8, 0x00, 0x01, 0x00].iter().zip(mask.iter().cycle()).map(|(b, m)| b ^ m));
        client_write.write_all(&bytes).await.unwrap();

        let mut server_ws = accept.await.unwrap().unwrap();
        let message = server_ws.next().await.unwrap().unwrap();
        assert_eq!(message, Message::binary(vec![0x00, 0x00, 0x01, 0x00]));

        let mut head = vec![0u8; 1024];
        let read = client_read.read(&mut head).await.unwrap();
        assert!(head[..read].starts_with(b"HTTP/1.1 101"));
        server_ws.close(None).await.ok();
    }
}
