//! Document store persistence
//!
//! Mirrors every WorkItem as one JSON document at
//! `{root}/{batch_id}/{item_id}.json`, next to a `batch.json` record holding
//! the batch timestamps and the last run summary. `StoreSink` feeds the store
//! from a background task so the runner never waits on disk writes.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::models::{AppError, AppResult, BatchSummary, ItemUpdate, WorkItem};
use crate::core::sink::StateSink;

const BATCH_RECORD_FILE: &str = "batch.json";

/// Persisted form of a WorkItem
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemDocument {
    #[serde(flatten)]
    pub item: WorkItem,
    /// Position in the queue
    pub position: usize,
    pub updated_at: DateTime<Utc>,
}

/// Persisted batch metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchRecord {
    pub batch_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<BatchSummary>,
}

#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn batch_dir(&self, batch_id: &str) -> PathBuf {
        self.root.join(batch_id)
    }

    fn item_path(&self, batch_id: &str, item_id: &str) -> PathBuf {
        self.batch_dir(batch_id).join(format!("{}.json", item_id))
    }

    async fn write_json<T: Serialize>(path: &Path, value: &T) -> AppResult<()> {
        let content =
            serde_json::to_string_pretty(value).map_err(|e| AppError::Store(e.to_string()))?;
        fs::write(path, content).await?;
        Ok(())
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> AppResult<T> {
        let content = fs::read_to_string(path).await?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::Store(format!("{}: {}", path.display(), e)))
    }

    /// Write the whole batch, replacing earlier documents for the same id
    pub async fn save_batch(&self, batch_id: &str, items: &[WorkItem]) -> AppResult<()> {
        let dir = self.batch_dir(batch_id);
        if fs::metadata(&dir).await.is_ok() {
            fs::remove_dir_all(&dir).await?;
        }
        fs::create_dir_all(&dir).await?;

        let now = Utc::now();
        let record = BatchRecord {
            batch_id: batch_id.to_string(),
            created_at: now,
            updated_at: now,
            last_summary: None,
        };
        Self::write_json(&dir.join(BATCH_RECORD_FILE), &record).await?;

        for (position, item) in items.iter().enumerate() {
            let doc = ItemDocument {
                item: item.clone(),
                position,
                updated_at: now,
            };
            Self::write_json(&self.item_path(batch_id, &item.id), &doc).await?;
        }

        info!("💾 Saved batch {} with {} items", batch_id, items.len());
        Ok(())
    }

    /// Merge a partial update into the stored item
    ///
    /// Returns false when the item has no document (removed or never saved).
    pub async fn apply_update(
        &self,
        batch_id: &str,
        item_id: &str,
        update: &ItemUpdate,
    ) -> AppResult<bool> {
        let path = self.item_path(batch_id, item_id);
        if fs::metadata(&path).await.is_err() {
            debug!("No stored document for {}/{}", batch_id, item_id);
            return Ok(false);
        }

        let mut doc: ItemDocument = Self::read_json(&path).await?;
        doc.item.apply(update);
        doc.updated_at = Utc::now();
        Self::write_json(&path, &doc).await?;
        Ok(true)
    }

    pub async fn delete_item(&self, batch_id: &str, item_id: &str) -> AppResult<()> {
        let path = self.item_path(batch_id, item_id);
        if fs::metadata(&path).await.is_ok() {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    pub async fn record_summary(&self, batch_id: &str, summary: &BatchSummary) -> AppResult<()> {
        let path = self.batch_dir(batch_id).join(BATCH_RECORD_FILE);
        let mut record: BatchRecord = Self::read_json(&path).await?;
        record.updated_at = Utc::now();
        record.last_summary = Some(summary.clone());
        Self::write_json(&path, &record).await
    }

    pub async fn load_record(&self, batch_id: &str) -> AppResult<BatchRecord> {
        let path = self.batch_dir(batch_id).join(BATCH_RECORD_FILE);
        if fs::metadata(&path).await.is_err() {
            return Err(AppError::NotFound(format!("batch {}", batch_id)));
        }
        Self::read_json(&path).await
    }

    /// Read a batch back in queue order
    pub async fn load_batch(&self, batch_id: &str) -> AppResult<Vec<WorkItem>> {
        let dir = self.batch_dir(batch_id);
        if fs::metadata(&dir).await.is_err() {
            return Err(AppError::NotFound(format!("batch {}", batch_id)));
        }

        let mut docs = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_item = path.extension().and_then(|e| e.to_str()) == Some("json")
                && path.file_name().and_then(|n| n.to_str()) != Some(BATCH_RECORD_FILE);
            if !is_item {
                continue;
            }
            let doc: ItemDocument = Self::read_json(&path).await?;
            docs.push(doc);
        }

        docs.sort_by_key(|doc| doc.position);
        Ok(docs.into_iter().map(|doc| doc.item).collect())
    }

    /// Ids of every stored batch
    pub async fn list_batches(&self) -> AppResult<Vec<String>> {
        if fs::metadata(&self.root).await.is_err() {
            return Ok(Vec::new());
        }

        let mut batches = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                batches.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        batches.sort();
        Ok(batches)
    }

    pub async fn delete_batch(&self, batch_id: &str) -> AppResult<()> {
        let dir = self.batch_dir(batch_id);
        if fs::metadata(&dir).await.is_ok() {
            fs::remove_dir_all(&dir).await?;
            info!("🗑️ Deleted stored batch {}", batch_id);
        }
        Ok(())
    }
}

enum StoreCommand {
    Update { item_id: String, update: ItemUpdate },
    Finished(BatchSummary),
    Flush(oneshot::Sender<()>),
}

/// `StateSink` that persists updates on a background task
#[derive(Debug, Clone)]
pub struct StoreSink {
    sender: mpsc::UnboundedSender<StoreCommand>,
}

impl std::fmt::Debug for StoreCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreCommand::Update { item_id, .. } => write!(f, "Update({})", item_id),
            StoreCommand::Finished(_) => f.write_str("Finished"),
            StoreCommand::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl StoreSink {
    /// Start the writer task for one batch
    ///
    /// The task ends once every clone of the sink is dropped.
    pub fn spawn(store: DocumentStore, batch_id: impl Into<String>) -> (Self, JoinHandle<()>) {
        let batch_id = batch_id.into();
        let (sender, mut receiver) = mpsc::unbounded_channel::<StoreCommand>();

        let handle = tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                let result = match command {
                    StoreCommand::Update { item_id, update } => store
                        .apply_update(&batch_id, &item_id, &update)
                        .await
                        .map(|_| ()),
                    StoreCommand::Finished(summary) => {
                        store.record_summary(&batch_id, &summary).await
                    }
                    StoreCommand::Flush(ack) => {
                        let _ = ack.send(());
                        Ok(())
                    }
                };

                if let Err(e) = result {
                    warn!("Failed to persist update for batch {}: {}", batch_id, e);
                }
            }
            debug!("Store writer for batch {} stopped", batch_id);
        });

        (Self { sender }, handle)
    }

    /// Wait until every update queued so far has been written
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(StoreCommand::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    fn send(&self, command: StoreCommand) {
        if let Err(e) = self.sender.send(command) {
            warn!("Store writer stopped, dropping {:?}", e.0);
        }
    }
}

impl StateSink for StoreSink {
    fn publish(&self, item_id: &str, update: &ItemUpdate) {
        self.send(StoreCommand::Update {
            item_id: item_id.to_string(),
            update: update.clone(),
        });
    }

    fn batch_finished(&self, summary: &BatchSummary) {
        self.send(StoreCommand::Finished(summary.clone()));
    }
}
