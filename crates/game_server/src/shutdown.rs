//! Graceful shutdown coordination.
//!
//! A [`Shutdown`] is shared by everything that has to stop together: the
//! accept loop and connections await it asynchronously, world threads poll
//! the flag between ticks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Cloneable shutdown handle.
///
/// Triggering is idempotent and visible to every clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    notify: broadcast::Sender<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            notify,
        }
    }

    /// Requests shutdown. Only the first call has any effect.
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            info!("🛑 Shutdown requested");
            let _ = self.notify.send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been triggered, immediately if it already was.
    pub async fn wait(&self) {
        // Subscribe before checking the flag so a trigger in between is not missed.
        let mut receiver = self.notify.subscribe();
        if self.is_triggered() {
            return;
        }
        let _ = receiver.recv().await;
    }
}
