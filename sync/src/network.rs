//! Network reachability signal.
//!
//! The host application reports connectivity; the sync engine only reads the
//! flag, and the trigger loop watches for offline-to-online transitions.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// Shared reachability flag with change notification.
#[derive(Debug)]
pub struct NetworkStatus {
    online: AtomicBool,
    tx: watch::Sender<bool>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self {
            online: AtomicBool::new(online),
            tx,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record the current reachability. Returns `true` on an offline-to-online
    /// transition.
    pub fn set_online(&self, online: bool) -> bool {
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if was_online != online {
            tracing::debug!(online, "network status changed");
            self.tx.send_replace(online);
        }
        online && !was_online
    }

    /// Receiver observing every reachability change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}
