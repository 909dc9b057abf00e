use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use log::{debug, info};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Opaque handle identifying one live session's registration. Sessions hold
/// this only to unregister themselves on exit.
pub type SessionId = u64;

/// The process-lifetime set of connected sessions, keyed by a monotonic id.
///
/// Every session registers its outbound line channel here on connect and
/// removes itself on exit. This is also the engine-death notify list: when
/// the engine dies, every registered sender gets one `error engine` line.
pub struct ClientRegistry {
    sessions: DashMap<SessionId, UnboundedSender<String>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new session and return its id, its own clone of the
    /// outbound sender (so it can hand copies to the matchmaker/opponent
    /// without a second lookup), and the receiving half it should `select!`
    /// on alongside reads from its peer socket.
    pub fn register(&self) -> (SessionId, UnboundedSender<String>, UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.insert(id, tx.clone());
        debug!("session {} registered ({} live)", id, self.sessions.len());
        (id, tx, rx)
    }

    pub fn unregister(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!("session {} unregistered ({} live)", id, self.sessions.len());
        }
    }

    /// Send a line to exactly one session, if it's still registered. Used to
    /// relay moves and game-end notifications to a human opponent.
    pub fn send_to(&self, id: SessionId, line: impl Into<String>) {
        if let Some(sender) = self.sessions.get(&id) {
            let _ = sender.send(line.into());
        }
    }

    /// Notify every live session that the engine has died. Called at most
    /// once, immediately before the process exits.
    pub async fn broadcast_engine_error(&self) {
        info!("broadcasting engine death to {} live sessions", self.sessions.len());
        for entry in self.sessions.iter() {
            let _ = entry.value().send("error engine\n".to_string());
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_distinct_ids() {
        let registry = ClientRegistry::new();
        let (id1, _tx1, _rx1) = registry.register();
        let (id2, _tx2, _rx2) = registry.register();
        assert_ne!(id1, id2);
    }

    #[test]
    fn unregister_removes_session() {
        let registry = ClientRegistry::new();
        let (id, _tx, _rx) = registry.register();
        assert_eq!(registry.sessions.len(), 1);
        registry.unregister(id);
        assert_eq!(registry.sessions.len(), 0);
    }

    #[tokio::test]
    async fn send_to_delivers_to_registered_session() {
        let registry = ClientRegistry::new();
        let (id, _tx, mut rx) = registry.register();
        registry.send_to(id, "moved e2e4\n");
        assert_eq!(rx.recv().await.unwrap(), "moved e2e4\n");
    }

    #[tokio::test]
    async fn broadcast_engine_error_reaches_all_sessions() {
        let registry = ClientRegistry::new();
        let (_id1, _tx1, mut rx1) = registry.register();
        let (_id2, _tx2, mut rx2) = registry.register();
        registry.broadcast_engine_error().await;
        assert_eq!(rx1.recv().await.unwrap(), "error engine\n");
        assert_eq!(rx2.recv().await.unwrap(), "error engine\n");
    }
}
