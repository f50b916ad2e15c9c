use tokio::sync::broadcast;
use uuid::Uuid;

/// What changed, at the granularity the continuous reads filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Occupancy(Uuid),
    /// Any session write affecting the given user
    SessionsOf(Uuid),
}

/// Write-side invalidation channel driving the `observe_*` streams.
/// Observers re-query on every matching notification; a lagged receiver
/// misses intermediate states, never the latest one it re-reads.
#[derive(Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<Change>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    pub fn notify(&self, change: Change) {
        // No receivers is fine; nobody is observing.
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.tx.subscribe()
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
