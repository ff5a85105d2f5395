//! Core business logic module
//!
//! This module contains the domain models, CSV ingest, the simulated batch
//! runner and its collaborators (queue state, sinks, persistence, archive).

pub mod archive;
pub mod config;
pub mod csv_ingest;
pub mod models;
pub mod queue;
pub mod runner;
pub mod simulation;
pub mod sink;
pub mod store;

pub use archive::{ArchiveError, ArchiveExporter, ArchiveReport};
pub use config::AppConfig;
pub use csv_ingest::{CsvIngest, IngestReport, ParseStats};
pub use models::{
    AppError, AppResult, BatchEvent, BatchStats, BatchSummary, ItemStatus, ItemUpdate, WorkItem,
};
pub use queue::BatchQueue;
pub use runner::BatchRunner;
pub use sink::{ChannelSink, StateSink};
pub use store::{DocumentStore, StoreSink};

#[cfg(test)]
mod csv_ingest_tests;
