//! Core data models for the batch download queue

use serde::{Deserialize, Serialize};

/// Item status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Pending,

    Downloading,

    Completed,

    Failed,
}

impl ItemStatus {
    /// Whether a batch start picks this item up
    pub fn is_runnable(self) -> bool {
        matches!(self, ItemStatus::Pending | ItemStatus::Failed)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Downloading => "downloading",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of imported CSV data destined for processing

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]

pub struct WorkItem {
    pub id: String,

    pub url: String,

    pub title: String,

    pub status: ItemStatus,

    /// 0-100
    pub progress: u8,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

impl WorkItem {
    /// Create a fresh pending item with a new unique id
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.into(),
            title: title.into(),
            status: ItemStatus::Pending,
            progress: 0,
            error: None,
            size: None,
        }
    }

    /// Merge a partial update into this item
    pub fn apply(&mut self, update: &ItemUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress.min(100);
        }
        match &update.error {
            FieldChange::Keep => {}
            FieldChange::Set(message) => self.error = Some(message.clone()),
            FieldChange::Clear => self.error = None,
        }
        match &update.size {
            FieldChange::Keep => {}
            FieldChange::Set(size) => self.size = Some(size.clone()),
            FieldChange::Clear => self.size = None,
        }
    }
}

/// Tri-state change for optional fields in a partial update
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", content = "value", rename_all = "lowercase")]
pub enum FieldChange {
    #[default]
    Keep,

    Set(String),

    Clear,
}

impl FieldChange {
    pub fn is_keep(&self) -> bool {
        matches!(self, FieldChange::Keep)
    }

    /// The new value, if this change sets one
    pub fn value(&self) -> Option<&str> {
        match self {
            FieldChange::Set(value) => Some(value.as_str()),
            _ => None,
        }
    }
}

/// Partial item update delivered to state sinks

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]

pub struct ItemUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,

    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    pub error: FieldChange,

    #[serde(default, skip_serializing_if = "FieldChange::is_keep")]
    pub size: FieldChange,
}

impl ItemUpdate {
    /// Item picked by the runner
    pub fn started() -> Self {
        Self {
            status: Some(ItemStatus::Downloading),
            progress: Some(0),
            error: FieldChange::Clear,
            size: FieldChange::Clear,
        }
    }

    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress.min(100)),
            ..Default::default()
        }
    }

    pub fn completed(size: impl Into<String>) -> Self {
        Self {
            status: Some(ItemStatus::Completed),
            progress: Some(100),
            error: FieldChange::Clear,
            size: FieldChange::Set(size.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(ItemStatus::Failed),
            error: FieldChange::Set(message.into()),
            ..Default::default()
        }
    }

    /// User retry of a failed item
    pub fn reset() -> Self {
        Self {
            status: Some(ItemStatus::Pending),
            progress: Some(0),
            error: FieldChange::Clear,
            size: FieldChange::Keep,
        }
    }
}

/// Aggregated queue statistics

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]

pub struct BatchStats {
    pub total: usize,

    pub pending: usize,

    pub downloading: usize,

    pub completed: usize,

    pub failed: usize,

    pub is_processing: bool,

    /// Share of completed items, 0-100
    pub overall_progress: u8,

    /// Every item reached completed or failed
    pub is_finished: bool,
}

impl BatchStats {
    pub fn from_items(items: &[WorkItem], is_processing: bool) -> Self {
        let mut stats = BatchStats {
            total: items.len(),
            is_processing,
            ..Default::default()
        };

        for item in items {
            match item.status {
                ItemStatus::Pending => stats.pending += 1,
                ItemStatus::Downloading => stats.downloading += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
            }
        }

        if stats.total > 0 {
            stats.overall_progress =
                ((stats.completed as f64 / stats.total as f64) * 100.0).round() as u8;
            stats.is_finished = stats.completed + stats.failed == stats.total;
        }

        stats
    }
}

/// Outcome of a single batch run

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]

pub struct BatchSummary {
    /// Items selected when the run started
    pub selected: usize,

    pub completed: usize,

    pub failed: usize,

    /// Selected items removed or changed before their turn
    pub skipped: usize,

    /// The queue was cleared mid-run
    pub abandoned: bool,

    pub elapsed_ms: u64,
}

/// Events emitted to observers while a batch runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum BatchEvent {
    ItemUpdated { item_id: String, update: ItemUpdate },

    BatchFinished { summary: BatchSummary },
}

/// Application error types

#[derive(Debug, thiserror::Error)]

pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("A batch is already being processed")]
    AlreadyProcessing,

    #[error("Archive error: {0}")]
    Archive(#[from] crate::core::archive::ArchiveError),

    #[error("Store error: {0}")]
    Store(String),
}

/// Result type alias for application operations

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_item() -> WorkItem {
        let mut item = WorkItem::new("https://youtu.be/a", "A");
        item.apply(&ItemUpdate::started());
        item.apply(&ItemUpdate::progress(40));
        item.apply(&ItemUpdate::failed("Stream connection lost. Please retry."));
        item
    }

    #[test]
    fn test_new_item_is_pending() {
        let item = WorkItem::new("https://youtu.be/a", "A");
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.progress, 0);
        assert!(item.error.is_none());
        assert!(item.size.is_none());
        assert!(!item.id.is_empty());
    }

    #[test]
    fn test_unique_ids() {
        let a = WorkItem::new("https://youtu.be/a", "A");
        let b = WorkItem::new("https://youtu.be/a", "A");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_apply_failure_keeps_progress() {
        let item = failed_item();
        assert_eq!(item.status, ItemStatus::Failed);
        assert_eq!(item.progress, 40);
        assert_eq!(
            item.error.as_deref(),
            Some("Stream connection lost. Please retry.")
        );
    }

    #[test]
    fn test_apply_reset_clears_error() {
        let mut item = failed_item();
        item.apply(&ItemUpdate::reset());
        assert_eq!(item.status, ItemStatus::Pending);
        assert_eq!(item.progress, 0);
        assert!(item.error.is_none());
    }

    #[test]
    fn test_apply_completed_sets_size() {
        let mut item = WorkItem::new("https://youtu.be/a", "A");
        item.apply(&ItemUpdate::started());
        item.apply(&ItemUpdate::completed("12.5MB"));
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.progress, 100);
        assert_eq!(item.size.as_deref(), Some("12.5MB"));
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut item = WorkItem::new("https://youtu.be/a", "A");
        item.apply(&ItemUpdate::progress(250));
        assert_eq!(item.progress, 100);
    }

    #[test]
    fn test_stats_from_items() {
        let mut items = vec![
            WorkItem::new("https://youtu.be/a", "A"),
            WorkItem::new("https://youtu.be/b", "B"),
            WorkItem::new("https://youtu.be/c", "C"),
        ];
        items[0].apply(&ItemUpdate::completed("10.0MB"));
        items[1].apply(&ItemUpdate::failed("boom"));

        let stats = BatchStats::from_items(&items, false);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.overall_progress, 33);
        assert!(!stats.is_finished);

        items[2].apply(&ItemUpdate::completed("11.0MB"));
        let stats = BatchStats::from_items(&items, false);
        assert!(stats.is_finished);
    }

    #[test]
    fn test_empty_stats_not_finished() {
        let stats = BatchStats::from_items(&[], false);
        assert_eq!(stats.total, 0);
        assert!(!stats.is_finished);
        assert_eq!(stats.overall_progress, 0);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ItemStatus::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
    }

    #[test]
    fn test_item_serialization_omits_empty_fields() {
        let item = WorkItem::new("https://youtu.be/a", "A");
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("size").is_none());
        assert_eq!(json["status"], "pending");
    }
}
