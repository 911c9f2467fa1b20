//! End-to-end tests over real TCP sockets.
//!
//! Each test binds the server on an ephemeral port, connects with a
//! tokio-tungstenite client offering the `test` sub-protocol and talks the
//! binary protocol to it.

use futures::{SinkExt, StreamExt};
use game_server::game::{ScriptEngine, ScriptError, WorldId};
use game_server::{GameServer, ServerConfig, Shutdown};
use protocol::{encode_message, Packet, Script, ScriptResult};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Running {
    addr: SocketAddr,
    shutdown: Shutdown,
    router: Arc<game_server::game::WorldRouter>,
    task: JoinHandle<()>,
}

fn test_config(worlds: usize) -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        worlds,
        tick_rate: 100,
        ..Default::default()
    }
}

async fn spawn_server(mut server: GameServer) -> Running {
    let listener = server.bind().expect("bind");
    let addr = listener.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let router = server.router();
    let task = tokio::spawn(async move {
        server.serve(listener).await.expect("serve");
    });
    Running {
        addr,
        shutdown,
        router,
        task,
    }
}

async fn connect(addr: SocketAddr, protocol: &'static str) -> Client {
    let mut request = format!("ws://{addr}/").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(protocol));
    let (client, response) = connect_async(request).await.expect("connect");
    assert_eq!(
        response.headers().get("Sec-WebSocket-Protocol").unwrap(),
        protocol
    );
    client
}

async fn next_binary(client: &mut Client) -> Vec<u8> {
    loop {
        let message = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("response in time")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Binary(data) = message {
            return data.to_vec();
        }
    }
}

async fn raw_request(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(2), stream.read_to_end(&mut response))
        .await
        .expect("server closes after rejecting")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

async fn wait_for_population(router: &game_server::game::WorldRouter, total: usize) {
    for _ in 0..200 {
        if router.populations().iter().sum::<usize>() == total {
            return;
        }
        sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "population never reached {total}: {:?}",
        router.populations()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_echo_opcode_over_websocket() {
    let server = spawn_server(GameServer::new(test_config(1))).await;
    let mut client = connect(server.addr, "test").await;

    client
        .send(Message::binary(vec![0, 0, 1, 0]))
        .await
        .unwrap();
    assert_eq!(next_binary(&mut client).await, vec![0, 0, 0, 0]);

    server.shutdown.trigger();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_input_keeps_connection_open() {
    let server = spawn_server(GameServer::new(test_config(1))).await;
    let mut client = connect(server.addr, "test").await;

    // Oversized, truncated, unknown opcode and text: all dropped silently.
    client.send(Message::binary(vec![0; 300])).await.unwrap();
    client.send(Message::binary(vec![0])).await.unwrap();
    client.send(Message::binary(vec![0, 0, 1])).await.unwrap();
    client.send(Message::binary(vec![0x7F, 0xFF])).await.unwrap();
    client.send(Message::text("hello")).await.unwrap();

    client
        .send(Message::binary(vec![0, 0, 1, 0]))
        .await
        .unwrap();
    assert_eq!(next_binary(&mut client).await, vec![0, 0, 0, 0]);

    server.shutdown.trigger();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_wrong_token_gets_401() {
    let server = spawn_server(GameServer::new(test_config(1))).await;

    let response = raw_request(
        server.addr,
        "GET / HTTP/1.1\r\n\
         Host: localhost\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\
         Sec-WebSocket-Protocol: intruder\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 401 Unauthorized"), "{response}");
    assert_eq!(server.router.populations(), vec![0]);

    server.shutdown.trigger();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_plain_http_gets_400() {
    let server = spawn_server(GameServer::new(test_config(1))).await;

    let response = raw_request(server.addr, "GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request"), "{response}");

    server.shutdown.trigger();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sessions_follow_connection_lifecycle() {
    let server = spawn_server(GameServer::new(test_config(1))).await;

    let mut client = connect(server.addr, "test").await;
    wait_for_population(&server.router, 1).await;

    client.close(None).await.unwrap();
    wait_for_population(&server.router, 0).await;

    server.shutdown.trigger();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sequential_connections_fill_every_world() {
    const WORLDS: usize = 3;
    let server = spawn_server(GameServer::new(test_config(WORLDS))).await;

    let mut clients = Vec::new();
    for connected in 1..=WORLDS {
        clients.push(connect(server.addr, "test").await);
        wait_for_population(&server.router, connected).await;
    }
    assert_eq!(server.router.populations(), vec![1; WORLDS]);

    // Every world answers its own client.
    for client in &mut clients {
        client
            .send(Message::binary(vec![0, 0, 1, 0]))
            .await
            .unwrap();
        assert_eq!(next_binary(client).await, vec![0, 0, 0, 0]);
    }

    server.shutdown.trigger();
    server.task.await.unwrap();
}

struct UpperScripts;

impl ScriptEngine for UpperScripts {
    fn execute(&mut self, path: &str, args: &[String]) -> Result<String, ScriptError> {
        if path == "fail.lua" {
            return Err(ScriptError::Failed("boom".into()));
        }
        Ok(args.join(" ").to_uppercase())
    }

    fn eval(&mut self, source: &str) -> Result<String, ScriptError> {
        Ok(source.to_uppercase())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_script_opcode_uses_world_engine() {
    let server = spawn_server(GameServer::with_scripts(
        test_config(1),
        Arc::new(|_: WorldId| Box::new(UpperScripts) as Box<dyn ScriptEngine>),
    ))
    .await;
    let mut client = connect(server.addr, "test").await;

    let request = encode_message(&Script {
        path: "shout.lua".into(),
        args: vec!["hi".into(), "there".into()],
    });
    client.send(Message::binary(request)).await.unwrap();

    let mut packet = Packet::from(next_binary(&mut client).await);
    packet.set_cursor(protocol::OPCODE_SIZE);
    assert_eq!(
        packet.read::<ScriptResult>().unwrap(),
        ScriptResult::success("HI THERE")
    );

    let request = encode_message(&Script {
        path: "fail.lua".into(),
        args: vec![],
    });
    client.send(Message::binary(request)).await.unwrap();

    let mut packet = Packet::from(next_binary(&mut client).await);
    packet.set_cursor(protocol::OPCODE_SIZE);
    let result = packet.read::<ScriptResult>().unwrap();
    assert!(!result.is_ok());
    assert_eq!(result.output, "script failed: boom");

    server.shutdown.trigger();
    server.task.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_closes_clients() {
    let server = spawn_server(GameServer::new(test_config(1))).await;
    let mut client = connect(server.addr, "test").await;
    wait_for_population(&server.router, 1).await;

    server.shutdown.trigger();

    let closed = timeout(Duration::from_secs(2), async {
        while let Some(Ok(message)) = client.next().await {
            if message.is_close() {
                return true;
            }
        }
        true
    })
    .await
    .expect("client sees the close");
    assert!(closed);

    timeout(Duration::from_secs(5), server.task)
        .await
        .expect("server stops")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bind_conflict_is_fatal() {
    let server = spawn_server(GameServer::new(test_config(1))).await;

    let second = GameServer::new(ServerConfig {
        bind_address: server.addr,
        ..Default::default()
    });
    assert!(matches!(
        second.bind(),
        Err(game_server::ServerError::Network(_))
    ));

    server.shutdown.trigger();
    server.task.await.unwrap();
}
