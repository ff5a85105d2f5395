//! Batch runner
//!
//! Walks the queue strictly one item at a time, driving each selected item
//! through a simulated download and publishing every change to the queue and
//! to the registered observers.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::SimulationConfig;
use crate::core::models::{AppResult, BatchSummary, ItemUpdate};
use crate::core::queue::{BatchQueue, Claim};
use crate::core::simulation::{
    Clock, ProgressSimulator, RandomTickSource, SimulationOutcome, TickSource, TokioClock,
};
use crate::core::sink::StateSink;

pub struct BatchRunner {
    simulator: ProgressSimulator,
    observers: Vec<Arc<dyn StateSink>>,
}

impl BatchRunner {
    /// Runner with entropy-seeded randomness and real timers
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_parts(
            config,
            Box::new(RandomTickSource::from_entropy()),
            Arc::new(TokioClock),
        )
    }

    pub fn with_parts(
        config: SimulationConfig,
        source: Box<dyn TickSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            simulator: ProgressSimulator::new(config, source, clock),
            observers: Vec::new(),
        }
    }

    /// Register an extra sink that sees every update after the queue does
    pub fn with_observer(mut self, observer: Arc<dyn StateSink>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StateSink>) {
        self.observers.push(observer);
    }

    pub fn config(&self) -> &SimulationConfig {
        self.simulator.config()
    }

    /// Process every pending or failed item of the queue in order
    ///
    /// Per-item failures are recorded on the item and never abort the batch.
    /// Returns `AppError::AlreadyProcessing` if another run holds the queue.
    pub async fn run(&mut self, queue: &BatchQueue) -> AppResult<BatchSummary> {
        let started_at = Instant::now();
        let ticket = queue.begin_run()?;
        let mut guard = RunGuard {
            queue,
            observers: self.observers.clone(),
            generation: ticket.generation,
            current: None,
        };
        let mut cleared = queue.subscribe_generation();

        info!(
            "🚀 Starting batch {}: {} items selected",
            queue.batch_id(),
            ticket.item_ids.len()
        );

        let mut summary = BatchSummary {
            selected: ticket.item_ids.len(),
            ..Default::default()
        };

        for item_id in &ticket.item_ids {
            match queue.claim(item_id, ticket.generation) {
                Claim::Claimed => {}
                Claim::Skipped => {
                    summary.skipped += 1;
                    continue;
                }
                Claim::Abandoned => {
                    summary.abandoned = true;
                    break;
                }
            }

            guard.current = Some(item_id.clone());
            // 队列已在 claim 中更新，这里只通知观察者
            notify(&self.observers, item_id, &ItemUpdate::started());
            info!("⬇️ Processing item {}", item_id);

            let observers = &self.observers;
            let outcome = tokio::select! {
                outcome = self.simulator.run(item_id, |progress| {
                    let update = ItemUpdate::progress(progress);
                    queue.publish(item_id, &update);
                    notify(observers, item_id, &update);
                }) => Some(outcome),
                _ = wait_for_clear(&mut cleared, ticket.generation) => None,
            };

            let update = match outcome {
                Some(SimulationOutcome::Completed { size }) => {
                    info!("✅ Item {} completed ({})", item_id, size);
                    summary.completed += 1;
                    ItemUpdate::completed(size)
                }
                Some(SimulationOutcome::Failed { message }) => {
                    warn!("❌ Item {} failed: {}", item_id, message);
                    summary.failed += 1;
                    ItemUpdate::failed(message)
                }
                None => {
                    warn!("Queue cleared while {} was downloading, abandoning batch", item_id);
                    summary.abandoned = true;
                    break;
                }
            };

            queue.publish(item_id, &update);
            notify(&self.observers, item_id, &update);
            guard.current = None;
        }

        drop(guard);
        summary.elapsed_ms = started_at.elapsed().as_millis() as u64;

        for observer in &self.observers {
            observer.batch_finished(&summary);
        }

        info!(
            "🏁 Batch finished: {} completed, {} failed, {} skipped{}",
            summary.completed,
            summary.failed,
            summary.skipped,
            if summary.abandoned { " (abandoned)" } else { "" }
        );

        Ok(summary)
    }

    /// Run the batch on a background task
    pub fn spawn(mut self, queue: BatchQueue) -> JoinHandle<AppResult<BatchSummary>> {
        tokio::spawn(async move { self.run(&queue).await })
    }
}

/// Releases the queue if the run future is dropped before it finishes
///
/// An item still downloading goes back to pending so it can be removed or
/// picked up by the next run.
struct RunGuard<'a> {
    queue: &'a BatchQueue,
    observers: Vec<Arc<dyn StateSink>>,
    generation: u64,
    current: Option<String>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if let Some(item_id) = self.current.take() {
            if self.queue.release(&item_id, self.generation) {
                warn!("Run dropped while {} was downloading, reset to pending", item_id);
                notify(&self.observers, &item_id, &ItemUpdate::reset());
            }
        }
        self.queue.end_run(self.generation);
    }
}

fn notify(observers: &[Arc<dyn StateSink>], item_id: &str, update: &ItemUpdate) {
    for observer in observers {
        observer.publish(item_id, update);
    }
}

/// Resolves once the queue generation moves past `generation`
async fn wait_for_clear(rx: &mut watch::Receiver<u64>, generation: u64) {
    loop {
        if *rx.borrow_and_update() != generation {
            debug!("Queue generation changed from {}", generation);
            return;
        }
        if rx.changed().await.is_err() {
            // 发送端随队列一起释放，不会再有清空
            std::future::pending::<()>().await;
        }
    }
}
