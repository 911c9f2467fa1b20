//! World routing and world thread management.
//!
//! ## Components
//!
//! * [`WorldRouter`] - the shareable [`Router`] used by the listener; reads
//!   each world's population atomically and never touches world state
//! * [`WorldManager`] - owns the worlds and the threads that tick them
//!
//! A world whose thread panics is marked dead and no longer receives
//! connections.

use super::script::ScriptFactory;
use super::world::World;
use super::WorldId;
use crate::bridge::EventBridge;
use crate::error::ServerError;
use crate::net::{Handler, Router};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info};

struct WorldEntry {
    id: WorldId,
    bridge: Arc<EventBridge>,
    population: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
}

impl WorldEntry {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}

/// Sends new connections to the least populated live world.
pub struct WorldRouter {
    worlds: Vec<WorldEntry>,
}

impl WorldRouter {
    fn new(worlds: &[World]) -> Self {
        Self {
            worlds: worlds
                .iter()
                .map(|world| WorldEntry {
                    id: world.id(),
                    bridge: world.bridge().clone(),
                    population: world.population(),
                    alive: Arc::new(AtomicBool::new(true)),
                })
                .collect(),
        }
    }

    /// Population of each world as of its last tick, in world id order.
    pub fn populations(&self) -> Vec<usize> {
        self.worlds
            .iter()
            .map(|world| world.population.load(Ordering::Acquire))
            .collect()
    }

    /// Whether world `id` exists and its thread has not died.
    pub fn is_alive(&self, id: WorldId) -> bool {
        self.worlds
            .iter()
            .any(|entry| entry.id == id && entry.is_alive())
    }

    pub fn len(&self) -> usize {
        self.worlds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.worlds.is_empty()
    }

    fn liveness(&self, id: WorldId) -> Option<Arc<AtomicBool>> {
        self.worlds
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.alive.clone())
    }
}

impl Router for WorldRouter {
    /// Fewest sessions wins; ties go to the lowest world id.
    fn select(&self) -> Option<Arc<dyn Handler>> {
        self.worlds
            .iter()
            .filter(|world| world.is_alive())
            .min_by_key(|world| (world.population.load(Ordering::Acquire), world.id))
            .map(|world| world.bridge.clone() as Arc<dyn Handler>)
    }

    fn select_world(&self, world: WorldId) -> Option<Arc<dyn Handler>> {
        self.worlds
            .iter()
            .find(|entry| entry.id == world && entry.is_alive())
            .map(|entry| entry.bridge.clone() as Arc<dyn Handler>)
    }
}

/// Clears a world's liveness flag if its thread unwinds.
struct DeathWatch {
    id: WorldId,
    alive: Option<Arc<AtomicBool>>,
}

impl Drop for DeathWatch {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(world = self.id, "💥 World thread panicked, no longer routing to it");
            if let Some(alive) = &self.alive {
                alive.store(false, Ordering::Release);
            }
        }
    }
}

enum Slot {
    Idle(World),
    Running(WorldId, JoinHandle<Option<World>>),
    Dead(WorldId),
}

/// Owns every world and starts or stops their threads as a group.
///
/// Worlds that are not running can be ticked by hand with
/// [`WorldManager::update`].
pub struct WorldManager {
    slots: Vec<Slot>,
    router: Arc<WorldRouter>,
    exit: Arc<AtomicBool>,
    interval: Duration,
}

impl WorldManager {
    /// Creates `count` worlds with ids `0..count`, each with its own engine.
    pub fn new(count: usize, interval: Duration, scripts: &ScriptFactory) -> Self {
        let worlds: Vec<World> = (0..count)
            .map(|index| {
                let id = WorldId::try_from(index).unwrap_or(WorldId::MAX);
                World::new(id, scripts(id))
            })
            .collect();

        Self {
            router: Arc::new(WorldRouter::new(&worlds)),
            slots: worlds.into_iter().map(Slot::Idle).collect(),
            exit: Arc::new(AtomicBool::new(false)),
            interval,
        }
    }

    pub fn router(&self) -> Arc<WorldRouter> {
        self.router.clone()
    }

    /// Number of worlds, dead ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether any world thread is still ticking.
    pub fn is_running(&self) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, Slot::Running(_, handle) if !handle.is_finished()))
    }

    /// Spawns one named thread per idle world.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Internal`] if a thread cannot be spawned. That
    /// world stays idle, worlds already started keep running; call
    /// [`WorldManager::stop`] to undo.
    pub fn start(&mut self) -> Result<(), ServerError> {
        self.exit.store(false, Ordering::Release);
        let mut failure = None;

        for slot in std::mem::take(&mut self.slots) {
            let world = match slot {
                Slot::Idle(world) => world,
                other => {
                    self.slots.push(other);
                    continue;
                }
            };

            let id = world.id();
            let exit = self.exit.clone();
            let interval = self.interval;
            let watch = DeathWatch {
                id,
                alive: self.router.liveness(id),
            };
            // The world is handed over only once the thread exists, so a
            // failed spawn leaves it with us.
            let (sender, receiver) = mpsc::channel::<World>();
            let spawned = std::thread::Builder::new()
                .name(format!("world-{id}"))
                .spawn(move || {
                    let _watch = watch;
                    let mut world = receiver.recv().ok()?;
                    world.run(interval, &exit);
                    Some(world)
                });

            match spawned {
                Ok(handle) => match sender.send(world) {
                    Ok(()) => {
                        info!(world = id, "🌍 World started");
                        self.slots.push(Slot::Running(id, handle));
                    }
                    Err(mpsc::SendError(world)) => {
                        error!(world = id, "World thread exited before receiving its world");
                        failure.get_or_insert(ServerError::Internal(format!(
                            "thread for world {id} exited early"
                        )));
                        self.slots.push(Slot::Idle(world));
                    }
                },
                Err(e) => {
                    error!(world = id, "Failed to spawn world thread: {}", e);
                    failure.get_or_insert(ServerError::Internal(format!(
                        "failed to spawn thread for world {id}: {e}"
                    )));
                    self.slots.push(Slot::Idle(world));
                }
            }
        }

        failure.map_or(Ok(()), Err)
    }

    /// Signals every world thread to exit after its current tick and joins it.
    ///
    /// Worlds whose thread panicked are kept as dead slots.
    pub fn stop(&mut self) {
        if !self.slots.iter().any(|slot| matches!(slot, Slot::Running(..))) {
            return;
        }
        self.exit.store(true, Ordering::Release);

        for slot in std::mem::take(&mut self.slots) {
            match slot {
                Slot::Running(id, handle) => match handle.join() {
                    Ok(Some(world)) => {
                        info!(world = id, ticks = world.ticks(), "World stopped");
                        self.slots.push(Slot::Idle(world));
                    }
                    Ok(None) | Err(_) => self.slots.push(Slot::Dead(id)),
                },
                other => self.slots.push(other),
            }
        }
    }

    /// Ticks every idle world once on the calling thread.
    pub fn update(&mut self) {
        for slot in &mut self.slots {
            if let Slot::Idle(world) = slot {
                world.update();
            }
        }
    }

    /// An idle world by id.
    pub fn world(&self, id: WorldId) -> Option<&World> {
        self.slots.iter().find_map(|slot| match slot {
            Slot::Idle(world) if world.id() == id => Some(world),
            _ => None,
        })
    }
}

impl Drop for WorldManager {
    fn drop(&mut self) {
        self.stop();
    }
}
