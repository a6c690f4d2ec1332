//! Outbound signal bus

use tokio::sync::broadcast;

use crate::types::ViewEvent;

const DEFAULT_CAPACITY: usize = 1024;

/// Typed publish/subscribe bus for `ViewEvent`s
///
/// Publishing with no subscriber is fine; slow subscribers observe `Lagged`.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ViewEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: ViewEvent) {
        log::trace!("emit {event:?}");
        // Err only means nobody is listening right now
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
