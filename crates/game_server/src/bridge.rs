//! Lock-free hand-off of network events from I/O tasks to a world thread.
//!
//! Each event kind has its own [`EventQueue`]: a `SegQueue` paired with an
//! atomic pending count. Producers push and then increment. The consumer
//! samples the count, subtracts exactly that amount and pops that many
//! items, so anything that arrives during a drain stays for the next tick.

use crate::net::{ConnectionError, ConnectionId, Handler, Socket};
use crossbeam::queue::SegQueue;
use protocol::Packet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Weak;
use tracing::{trace, warn};

/// Unbounded multi-producer queue drained in counted batches by one consumer.
pub struct EventQueue<T> {
    items: SegQueue<T>,
    pending: AtomicUsize,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self {
            items: SegQueue::new(),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, item: T) {
        // Item first: the count must never promise something not yet poppable.
        self.items.push(item);
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Items published and not yet drained.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Removes the items counted at the start of the call, in push order.
    ///
    /// Only one thread may drain a given queue.
    pub fn drain(&self) -> Vec<T> {
        let count = self.pending.load(Ordering::SeqCst);
        if count == 0 {
            return Vec::new();
        }
        self.pending.fetch_sub(count, Ordering::SeqCst);

        let mut drained = Vec::with_capacity(count);
        for _ in 0..count {
            match self.items.pop() {
                Some(item) => drained.push(item),
                None => break,
            }
        }
        drained
    }
}

/// One tick's worth of events.
pub struct TickEvents {
    pub opens: Vec<(ConnectionId, Weak<dyn Socket>)>,
    pub messages: Vec<(ConnectionId, Packet)>,
    pub closes: Vec<ConnectionId>,
}

impl TickEvents {
    pub fn is_empty(&self) -> bool {
        self.opens.is_empty() && self.messages.is_empty() && self.closes.is_empty()
    }
}

/// The [`Handler`] every connection of a world reports to.
#[derive(Default)]
pub struct EventBridge {
    opens: EventQueue<(ConnectionId, Weak<dyn Socket>)>,
    messages: EventQueue<(ConnectionId, Packet)>,
    closes: EventQueue<ConnectionId>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes everything currently pending.
    ///
    /// Queues are sampled closes first, opens last. A connection publishes
    /// its open before any message and its messages before its close, so a
    /// drained message always comes with its open, and a drained close with
    /// all of that connection's messages.
    pub fn drain(&self) -> TickEvents {
        let closes = self.closes.drain();
        let messages = self.messages.drain();
        let opens = self.opens.drain();
        TickEvents {
            opens,
            messages,
            closes,
        }
    }

    pub fn pending(&self) -> (usize, usize, usize) {
        (
            self.opens.pending(),
            self.messages.pending(),
            self.closes.pending(),
        )
    }
}

impl Handler for EventBridge {
    fn on_open(&self, id: ConnectionId, socket: Weak<dyn Socket>) {
        trace!(connection = id, "queueing open");
        self.opens.push((id, socket));
    }

    fn on_message(&self, id: ConnectionId, data: Vec<u8>) {
        self.messages.push((id, Packet::from(data)));
    }

    fn on_close(&self, id: ConnectionId) {
        trace!(connection = id, "queueing close");
        self.closes.push(id);
    }

    fn on_error(&self, id: ConnectionId, what: &str, error: &ConnectionError) {
        warn!(connection = id, "⚠️ Connection {} failed: {}", what, error);
    }
}
