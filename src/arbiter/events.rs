//! Change notifications for the operator surface.

use tokio::sync::broadcast;

/// What changed. Exactly two kinds exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEvent {
    /// The session table was mutated (admit, authorize, disconnect, stop).
    UsersChanged,
    /// The resource table was mutated (grant, free-all).
    ResourcesChanged,
}

/// Broadcast fan-out of [`ServerEvent`]s.
///
/// Emitting never blocks; slow subscribers observe `Lagged` instead.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ServerEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
