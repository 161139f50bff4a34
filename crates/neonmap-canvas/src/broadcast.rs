//! Viewer fan-out.
//!
//! Events are serialized once and pushed to every connected viewer through a
//! bounded broadcast channel. A viewer that falls more than `capacity`
//! events behind loses the oldest ones; other viewers are unaffected.
//! Publishing never blocks and never fails the caller.

use std::sync::Arc;

use neonmap_types::{CanvasEvent, EventEnvelope};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Broadcast hub for serialized [`EventEnvelope`]s.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<Arc<str>>,
}

impl EventBroadcaster {
    /// Create a broadcaster with the given per-viewer buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current viewer. Returns how many received it.
    pub fn publish(&self, event: CanvasEvent, timestamp: u64) -> usize {
        let kind = event.type_name();
        let envelope = EventEnvelope { event, timestamp };
        let json = match serde_json::to_string(&envelope) {
            Ok(json) => json,
            Err(e) => {
                warn!(kind, error = %e, "Dropping unserializable event");
                return 0;
            }
        };
        // No viewers is not an error.
        let reached = self.sender.send(Arc::from(json)).unwrap_or(0);
        trace!(kind, reached, "Event published");
        reached
    }

    /// Register a new viewer.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.sender.subscribe()
    }

    /// Number of connected viewers.
    pub fn viewer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
