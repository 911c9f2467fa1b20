//! A single simulation world and its fixed-rate tick loop.

use super::dispatch::{dispatch, Context};
use super::script::ScriptEngine;
use super::session::{Session, SessionRegistry};
use super::WorldId;
use crate::bridge::EventBridge;
use crate::net::Handler;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Owns the sessions of the connections routed to it.
///
/// Only the thread running [`World::update`] touches the registry. I/O tasks
/// talk to the world exclusively through its [`EventBridge`].
pub struct World {
    id: WorldId,
    bridge: Arc<EventBridge>,
    sessions: SessionRegistry,
    scripts: Box<dyn ScriptEngine>,
    population: Arc<AtomicUsize>,
    ticks: u64,
}

impl World {
    pub fn new(id: WorldId, scripts: Box<dyn ScriptEngine>) -> Self {
        Self {
            id,
            bridge: Arc::new(EventBridge::new()),
            sessions: SessionRegistry::new(),
            scripts,
            population: Arc::new(AtomicUsize::new(0)),
            ticks: 0,
        }
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    /// The handler connections assigned to this world report to.
    pub fn handler(&self) -> Arc<dyn Handler> {
        self.bridge.clone()
    }

    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.bridge
    }

    /// Session count as of the last tick, readable from any thread.
    pub fn population(&self) -> Arc<AtomicUsize> {
        self.population.clone()
    }

    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Runs one tick: opens, then messages, then closes.
    pub fn update(&mut self) {
        let events = self.bridge.drain();

        for (id, socket) in events.opens {
            if socket.upgrade().is_none() {
                trace!(world = self.id, connection = id, "connection gone before open");
                continue;
            }
            if self.sessions.insert(Session::new(id, socket)) {
                info!(world = self.id, connection = id, "👋 Player connected");
            } else {
                warn!(world = self.id, connection = id, "Duplicate open ignored");
            }
        }

        for (id, mut packet) in events.messages {
            let Some(session) = self.sessions.get(id) else {
                trace!(world = self.id, connection = id, "message without session dropped");
                continue;
            };
            let Ok(opcode) = packet.read::<u16>() else {
                trace!(world = self.id, connection = id, "message shorter than opcode dropped");
                continue;
            };

            let mut ctx = Context {
                session,
                scripts: self.scripts.as_mut(),
                world: self.id,
            };
            dispatch(&mut ctx, opcode, &mut packet);
        }

        for id in events.closes {
            if let Some(session) = self.sessions.remove(id) {
                info!(
                    world = self.id,
                    connection = id,
                    "👋 Player disconnected after {:.1}s",
                    session.uptime().as_secs_f64()
                );
            }
        }

        self.population.store(self.sessions.len(), Ordering::Release);
        self.ticks += 1;
    }

    /// Ticks every `interval` until `exit` is set.
    ///
    /// Polls the clock instead of sleeping, trading CPU for input latency.
    /// `exit` is checked between ticks, so the current tick always finishes.
    pub fn run(&mut self, interval: Duration, exit: &AtomicBool) {
        debug!(world = self.id, ?interval, "tick loop started");
        let mut last = Instant::now();

        while !exit.load(Ordering::Acquire) {
            let now = Instant::now();
            if now.duration_since(last) >= interval {
                last = now;
                self.update();
            } else {
                std::hint::spin_loop();
                std::thread::yield_now();
            }
        }

        debug!(world = self.id, ticks = self.ticks, "tick loop stopped");
    }
}
