use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tubebatch::core::archive::{ArchiveError, ArchiveExporter};
use tubebatch::core::csv_ingest::{csv_template, CsvIngest, TEMPLATE_FILE_NAME};
use tubebatch::core::models::{BatchEvent, ItemStatus};
use tubebatch::core::simulation::{
    Clock, ImmediateClock, RandomTickSource, TickSource, TokioClock,
};
use tubebatch::core::sink::{ChannelSink, EventReceiver};
use tubebatch::utils::logging::init_tracing;
use tubebatch::{AppConfig, BatchQueue, BatchRunner, DocumentStore, StoreSink};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "tubebatch",
    version,
    about = "Import video links from CSV and process them as a sequential batch"
)]
pub struct Cli {
    /// Use this configuration file instead of the per-user one
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Parse a CSV file and show the detected structure
    Preview {
        file: PathBuf,

        /// Number of items to print
        #[arg(long, default_value_t = 10)]
        max_rows: usize,
    },

    /// Import a CSV file, run the batch and export completed items
    Run {
        file: PathBuf,

        /// Directory for the archive (defaults to the configured one)
        #[arg(long)]
        archive_dir: Option<PathBuf>,

        /// Skip the archive export
        #[arg(long)]
        no_archive: bool,

        /// Seed for a reproducible simulation
        #[arg(long)]
        seed: Option<u64>,

        /// Skip the waits between ticks
        #[arg(long)]
        fast: bool,

        /// Mirror item state into the document store
        #[arg(long)]
        persist: bool,

        /// Print the final items as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write the CSV template, or print it when no output is given
    Template {
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Inspect or reset the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand, Clone)]
pub enum ConfigAction {
    Show,
    Path,
    Reset,
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_or_default(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub async fn run(args: Cli) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.advanced.log_level.clone());
    init_tracing(Some(&level));

    match args.command {
        Command::Preview { file, max_rows } => preview(&config, &file, max_rows).await,
        Command::Run {
            file,
            archive_dir,
            no_archive,
            seed,
            fast,
            persist,
            json,
        } => {
            let options = RunOptions {
                archive_dir,
                no_archive,
                seed,
                fast,
                persist: persist || config.advanced.persist_batches,
                json,
            };
            run_batch(&config, &file, options).await
        }
        Command::Template { output } => template(output.as_deref()),
        Command::Config { action } => config_command(&config, action, args.config.as_deref()),
    }
}

async fn preview(config: &AppConfig, file: &Path, max_rows: usize) -> Result<()> {
    let report = CsvIngest::with_config(config.import.clone())
        .parse_file(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let stats = &report.stats;

    println!("File: {}", file.display());
    if let Some(encoding) = report.encoding {
        println!("Encoding: {}", encoding.name());
    }
    println!("Delimiter: {:?}", stats.delimiter);
    println!("Header row: {}", if stats.has_header { "yes" } else { "no" });
    println!(
        "URL column: {} ({:?}), title column: {} ({:?})",
        stats.url_column, stats.url_column_source, stats.title_column, stats.title_column_source
    );
    println!(
        "Rows: {} total, {} parsed, {} skipped",
        stats.total_rows, stats.parsed_rows, stats.skipped_rows
    );
    println!("Items:");
    for item in report.items.iter().take(max_rows) {
        println!("  {}  {}", item.url, item.title);
    }
    if report.items.len() > max_rows {
        println!("  ... {} more", report.items.len() - max_rows);
    }
    Ok(())
}

struct RunOptions {
    archive_dir: Option<PathBuf>,
    no_archive: bool,
    seed: Option<u64>,
    fast: bool,
    persist: bool,
    json: bool,
}

/// Print progress events as they arrive
fn spawn_event_printer(mut rx: EventReceiver, titles: HashMap<String, String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::ItemUpdated { item_id, update } => {
                    let title = titles.get(&item_id).map(String::as_str).unwrap_or("?");
                    match (update.status, update.progress) {
                        (Some(ItemStatus::Completed), _) => {
                            let size = update.size.value().unwrap_or("");
                            println!("[100%] {} completed {}", title, size);
                        }
                        (Some(ItemStatus::Failed), _) => {
                            let error = update.error.value().unwrap_or("");
                            println!("[FAIL] {}: {}", title, error);
                        }
                        (_, Some(progress)) => println!("[{:>3}%] {}", progress, title),
                        _ => {}
                    }
                }
                BatchEvent::BatchFinished { summary } => {
                    println!(
                        "Batch finished in {} ms: {} completed, {} failed, {} skipped",
                        summary.elapsed_ms, summary.completed, summary.failed, summary.skipped
                    );
                    break;
                }
            }
        }
    })
}

async fn run_batch(config: &AppConfig, file: &Path, options: RunOptions) -> Result<()> {
    let report = CsvIngest::with_config(config.import.clone())
        .parse_file(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    if report.items.is_empty() {
        warn!("No video links found in {}", file.display());
        println!("No video links found in {}", file.display());
        return Ok(());
    }

    let queue = BatchQueue::new();
    queue.load(report.items)?;
    let batch_id = queue.batch_id();

    let source: Box<dyn TickSource> = match options.seed {
        Some(seed) => Box::new(RandomTickSource::seeded(seed)),
        None => Box::new(RandomTickSource::from_entropy()),
    };
    let clock: Arc<dyn Clock> = if options.fast {
        Arc::new(ImmediateClock)
    } else {
        Arc::new(TokioClock)
    };

    let (channel_sink, rx) = ChannelSink::channel();
    let titles = queue
        .snapshot()
        .into_iter()
        .map(|item| (item.id, item.title))
        .collect();
    let printer = spawn_event_printer(rx, titles);

    let mut runner = BatchRunner::with_parts(config.simulation.clone(), source, clock)
        .with_observer(Arc::new(channel_sink));

    let store_writer = if options.persist {
        let store = DocumentStore::new(config.store_dir()?);
        store.save_batch(&batch_id, &queue.snapshot()).await?;
        let (sink, writer) = StoreSink::spawn(store, batch_id.clone());
        let sink = Arc::new(sink);
        runner.add_observer(sink.clone());
        info!("Persisting batch {} to {:?}", batch_id, config.store_dir()?);
        Some((sink, writer))
    } else {
        None
    };

    let summary = runner.run(&queue).await?;
    drop(runner);
    let _ = printer.await;

    if let Some((sink, writer)) = store_writer {
        sink.flush().await;
        drop(sink);
        let _ = writer.await;
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&queue.snapshot())?);
    }

    if !options.no_archive && summary.completed > 0 {
        let dir = options
            .archive_dir
            .unwrap_or_else(|| PathBuf::from(&config.archive.output_directory));
        let exporter = ArchiveExporter::new(config.archive.clone());
        match exporter.export(&queue.completed_items(), &dir).await {
            Ok(report) => println!(
                "Archive written to {} ({} files)",
                report.path.display(),
                report.entries.len()
            ),
            Err(ArchiveError::NothingToExport) => println!("Nothing to export"),
            Err(e) => return Err(e).context("Archive export failed"),
        }
    }

    Ok(())
}

fn template(output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(TEMPLATE_FILE_NAME)
            } else {
                path.to_path_buf()
            };
            std::fs::write(&path, csv_template())
                .with_context(|| format!("Failed to write template to {}", path.display()))?;
            println!("Template written to {}", path.display());
        }
        None => println!("{}", csv_template()),
    }
    Ok(())
}

fn config_command(config: &AppConfig, action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => println!("{}", config.export()?),
        ConfigAction::Path => match path {
            Some(path) => println!("{}", path.display()),
            None => println!("{}", AppConfig::get_config_path()?.display()),
        },
        ConfigAction::Reset => {
            match path {
                Some(path) => AppConfig::default().save_to(path)?,
                None => {
                    AppConfig::reset()?;
                }
            }
            println!("Configuration reset to defaults");
        }
    }
    Ok(())
}
