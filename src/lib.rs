//! TubeBatch - Core Library
//!
//! This library provides the core functionality for the batch video link
//! importer: schema-free CSV ingest, the sequential simulated batch runner,
//! queue state, persistence and archive export.

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{
    archive::{ArchiveError, ArchiveExporter},
    config::AppConfig,
    csv_ingest::{csv_template, parse_video_csv, CsvIngest},
    models::{AppError, AppResult, BatchStats, BatchSummary, ItemStatus, ItemUpdate, WorkItem},
    queue::BatchQueue,
    runner::BatchRunner,
    sink::{ChannelSink, StateSink},
    store::{DocumentStore, StoreSink},
};

pub use utils::encoding::detect_encoding;

/// Application state shared by the orchestrator
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub queue: BatchQueue,
}

impl AppState {
    pub fn new() -> Self {
        Self::with_config(AppConfig::load_or_default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            config,
            queue: BatchQueue::new(),
        }
    }

    pub fn ingest(&self) -> CsvIngest {
        CsvIngest::with_config(self.config.import.clone())
    }

    pub fn runner(&self) -> BatchRunner {
        BatchRunner::new(self.config.simulation.clone())
    }

    pub fn exporter(&self) -> ArchiveExporter {
        ArchiveExporter::new(self.config.archive.clone())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_config(AppConfig::default())
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the library with default settings
pub fn init() -> anyhow::Result<()> {
    // 初始化日志系统（如果还没有初始化）
    utils::logging::init_tracing(None);

    tracing::info!("📚 {} v{} initialized", NAME, VERSION);
    Ok(())
}
