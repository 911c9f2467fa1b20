//! Fakes shared by unit tests.

use crate::game::{ScriptEngine, ScriptError, WorldId};
use crate::net::{ConnectionError, ConnectionId, Handler, Router, Socket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// In-memory socket that records everything sent through it.
pub struct TestSocket {
    id: ConnectionId,
    open: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl TestSocket {
    pub fn new(id: ConnectionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn weak(this: &Arc<Self>) -> Weak<dyn Socket> {
        let socket: Arc<dyn Socket> = this.clone();
        Arc::downgrade(&socket)
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }
}

impl Socket for TestSocket {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, data: Vec<u8>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.sent.lock().unwrap().push(data);
        true
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Handler that records every callback.
#[derive(Default)]
pub struct RecordingHandler {
    opens: Mutex<Vec<(ConnectionId, Weak<dyn Socket>)>>,
    messages: Mutex<Vec<(ConnectionId, Vec<u8>)>>,
    closes: Mutex<Vec<ConnectionId>>,
    errors: Mutex<Vec<(ConnectionId, String)>>,
}

impl RecordingHandler {
    pub async fn wait_for_open(&self) -> Weak<dyn Socket> {
        for _ in 0..200 {
            if let Some((_, socket)) = self.opens.lock().unwrap().first() {
                return socket.clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("connection never opened");
    }

    pub async fn wait_for_messages(&self, count: usize) -> Vec<(ConnectionId, Vec<u8>)> {
        for _ in 0..200 {
            let messages = self.messages.lock().unwrap().clone();
            if messages.len() >= count {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {count} message(s)");
    }

    pub fn closes(&self) -> Vec<ConnectionId> {
        self.closes.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<(ConnectionId, String)> {
        self.errors.lock().unwrap().clone()
    }
}

impl Handler for RecordingHandler {
    fn on_open(&self, id: ConnectionId, socket: Weak<dyn Socket>) {
        self.opens.lock().unwrap().push((id, socket));
    }

    fn on_message(&self, id: ConnectionId, data: Vec<u8>) {
        self.messages.lock().unwrap().push((id, data));
    }

    fn on_close(&self, id: ConnectionId) {
        self.closes.lock().unwrap().push(id);
    }

    fn on_error(&self, id: ConnectionId, what: &str, error: &ConnectionError) {
        self.errors
            .lock()
            .unwrap()
            .push((id, format!("{what}: {error}")));
    }
}

/// Router that always answers with the same handler.
#[derive(Default)]
pub struct FixedRouter {
    handler: Arc<RecordingHandler>,
}

impl Router for FixedRouter {
    fn select(&self) -> Option<Arc<dyn Handler>> {
        Some(self.handler.clone())
    }

    fn select_world(&self, world: WorldId) -> Option<Arc<dyn Handler>> {
        (world == 0).then(|| self.handler.clone() as Arc<dyn Handler>)
    }
}

/// Engine whose output is the path followed by the arguments.
#[derive(Default)]
pub struct EchoScripts {
    pub calls: usize,
}

impl ScriptEngine for EchoScripts {
    fn execute(&mut self, path: &str, args: &[String]) -> Result<String, ScriptError> {
        self.calls += 1;
        let mut output = path.to_string();
        for arg in args {
            output.push(' ');
            output.push_str(arg);
        }
        Ok(output)
    }

    fn eval(&mut self, source: &str) -> Result<String, ScriptError> {
        self.calls += 1;
        Ok(source.to_string())
    }
}
