//! Batch queue - the ordered working set of items plus the processing flag
//!
//! `BatchQueue` is a cheap-to-clone handle. The runner mutates items through
//! the [`StateSink`] implementation while user actions (retry, removal,
//! clear) go through the methods below; both are serialized by one lock.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::core::models::{AppError, AppResult, BatchStats, ItemStatus, ItemUpdate, WorkItem};
use crate::core::sink::StateSink;

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<WorkItem>,
    is_processing: bool,
    generation: u64,
}

#[derive(Debug)]
struct Shared {
    state: RwLock<QueueState>,
    batch_id: RwLock<String>,
    /// Bumped on clear so an in-flight run can abandon its iteration
    generation_tx: watch::Sender<u64>,
}

/// Items selected for one run
#[derive(Debug, Clone)]
pub(crate) struct RunTicket {
    pub generation: u64,
    pub item_ids: Vec<String>,
}

/// Result of trying to start the next item of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Claim {
    Claimed,
    /// Removed or no longer pending/failed
    Skipped,
    /// The queue was cleared after the run started
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct BatchQueue {
    shared: Arc<Shared>,
}

impl Default for BatchQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchQueue {
    pub fn new() -> Self {
        let (generation_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(QueueState::default()),
                batch_id: RwLock::new(uuid::Uuid::new_v4().to_string()),
                generation_tx,
            }),
        }
    }

    pub fn from_items(items: Vec<WorkItem>) -> Self {
        let queue = Self::new();
        queue.shared.state.write().items = items;
        queue
    }

    /// Identifier of the currently loaded batch
    pub fn batch_id(&self) -> String {
        self.shared.batch_id.read().clone()
    }

    /// Replace the working set with freshly imported items
    pub fn load(&self, items: Vec<WorkItem>) -> AppResult<usize> {
        let mut state = self.shared.state.write();
        if state.is_processing {
            return Err(AppError::InvalidState(
                "Cannot load a new batch while processing".to_string(),
            ));
        }

        let count = items.len();
        state.items = items;
        *self.shared.batch_id.write() = uuid::Uuid::new_v4().to_string();
        info!("📥 Loaded {} items into the queue", count);
        Ok(count)
    }

    pub fn snapshot(&self) -> Vec<WorkItem> {
        self.shared.state.read().items.clone()
    }

    pub fn get(&self, item_id: &str) -> Option<WorkItem> {
        self.shared
            .state
            .read()
            .items
            .iter()
            .find(|item| item.id == item_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self) -> bool {
        self.shared.state.read().is_processing
    }

    pub fn stats(&self) -> BatchStats {
        let state = self.shared.state.read();
        BatchStats::from_items(&state.items, state.is_processing)
    }

    /// Items eligible for archive export, in queue order
    pub fn completed_items(&self) -> Vec<WorkItem> {
        self.shared
            .state
            .read()
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Completed)
            .cloned()
            .collect()
    }

    /// Reset a failed item so the next batch start picks it up
    pub fn retry(&self, item_id: &str) -> AppResult<()> {
        let mut state = self.shared.state.write();
        let item = state
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| AppError::NotFound(item_id.to_string()))?;

        if item.status != ItemStatus::Failed {
            warn!("Ignoring retry for {} in state {}", item_id, item.status);
            return Err(AppError::InvalidState(format!(
                "Only failed items can be retried, item is {}",
                item.status
            )));
        }

        item.apply(&ItemUpdate::reset());
        info!("🔄 Reset item {} for retry", item_id);
        Ok(())
    }

    /// Reset every failed item; returns how many were reset
    pub fn retry_all_failed(&self) -> usize {
        let mut state = self.shared.state.write();
        let mut retry_count = 0;

        for item in state.items.iter_mut() {
            if item.status == ItemStatus::Failed {
                item.apply(&ItemUpdate::reset());
                retry_count += 1;
            }
        }

        info!("🔄 Reset {} failed items for retry", retry_count);
        retry_count
    }

    /// Remove an item that is not currently downloading
    pub fn remove(&self, item_id: &str) -> AppResult<WorkItem> {
        let mut state = self.shared.state.write();
        let index = state
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| AppError::NotFound(item_id.to_string()))?;

        if state.items[index].status == ItemStatus::Downloading {
            warn!("Refusing to remove item {} while it is downloading", item_id);
            return Err(AppError::InvalidState(
                "Cannot remove active download".to_string(),
            ));
        }

        let removed = state.items.remove(index);
        info!("🗑️ Removed item: {}", item_id);
        Ok(removed)
    }

    /// Drop every item and abandon any in-flight run
    pub fn clear(&self) -> usize {
        let mut state = self.shared.state.write();
        let removed = state.items.len();
        state.items.clear();
        state.is_processing = false;
        state.generation += 1;
        let generation = state.generation;
        drop(state);

        self.shared.generation_tx.send_replace(generation);
        info!("🧹 Cleared {} items from the queue", removed);
        removed
    }

    pub(crate) fn subscribe_generation(&self) -> watch::Receiver<u64> {
        self.shared.generation_tx.subscribe()
    }

    /// Mark the queue as processing and select pending/failed items in order
    pub(crate) fn begin_run(&self) -> AppResult<RunTicket> {
        let mut state = self.shared.state.write();
        if state.is_processing {
            return Err(AppError::AlreadyProcessing);
        }

        state.is_processing = true;
        let item_ids = state
            .items
            .iter()
            .filter(|item| item.status.is_runnable())
            .map(|item| item.id.clone())
            .collect();

        Ok(RunTicket {
            generation: state.generation,
            item_ids,
        })
    }

    /// Move the next selected item to downloading, if it is still eligible
    pub(crate) fn claim(&self, item_id: &str, generation: u64) -> Claim {
        let mut state = self.shared.state.write();
        if state.generation != generation {
            return Claim::Abandoned;
        }

        match state.items.iter_mut().find(|item| item.id == item_id) {
            Some(item) if item.status.is_runnable() => {
                item.apply(&ItemUpdate::started());
                Claim::Claimed
            }
            Some(item) => {
                debug!("Skipping {}: now {}", item_id, item.status);
                Claim::Skipped
            }
            None => {
                debug!("Skipping {}: removed from queue", item_id);
                Claim::Skipped
            }
        }
    }

    /// Put an interrupted item back to pending; false if nothing changed
    pub(crate) fn release(&self, item_id: &str, generation: u64) -> bool {
        let mut state = self.shared.state.write();
        if state.generation != generation {
            return false;
        }

        match state.items.iter_mut().find(|item| item.id == item_id) {
            Some(item) if item.status == ItemStatus::Downloading => {
                item.apply(&ItemUpdate::reset());
                true
            }
            _ => false,
        }
    }

    /// Clear the processing flag unless the queue was cleared meanwhile
    pub(crate) fn end_run(&self, generation: u64) {
        let mut state = self.shared.state.write();
        if state.generation == generation {
            state.is_processing = false;
        }
    }
}

impl StateSink for BatchQueue {
    fn publish(&self, item_id: &str, update: &ItemUpdate) {
        let mut state = self.shared.state.write();
        match state.items.iter_mut().find(|item| item.id == item_id) {
            Some(item) => item.apply(update),
            None => debug!("Dropping update for unknown item {}", item_id),
        }
    }
}
