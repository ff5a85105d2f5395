//! State sinks
//!
//! The runner reports every item change as an `(item_id, ItemUpdate)` pair.
//! Sinks must not block: the runner schedules its next tick without waiting
//! for a sink to finish.

use tokio::sync::mpsc;
use tracing::warn;

use crate::core::models::{BatchEvent, BatchSummary, ItemUpdate};

/// Receiver of item updates
pub trait StateSink: Send + Sync {
    /// Reflect a partial update; unknown ids are ignored
    fn publish(&self, item_id: &str, update: &ItemUpdate);

    /// The run is over
    fn batch_finished(&self, _summary: &BatchSummary) {}
}

pub type EventSender = mpsc::UnboundedSender<BatchEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<BatchEvent>;

/// Forwards updates as [`BatchEvent`]s over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: EventSender,
}

impl ChannelSink {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }

    /// Create a sink with its receiving end
    pub fn channel() -> (Self, EventReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }

    fn send(&self, event: BatchEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!("Event receiver dropped, discarding event: {:?}", e.0);
        }
    }
}

impl StateSink for ChannelSink {
    fn publish(&self, item_id: &str, update: &ItemUpdate) {
        self.send(BatchEvent::ItemUpdated {
            item_id: item_id.to_string(),
            update: update.clone(),
        });
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        self.send(BatchEvent::BatchFinished {
            summary: summary.clone(),
        });
    }
}
