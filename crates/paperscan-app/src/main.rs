//! `paperscan` command-line client.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use uuid::Uuid;

use paperscan_app::{delayed_refresh, logging, App, AppConfig, REFRESH_DELAY};
use paperscan_core::{FileRef, SuggestionResult, UploadMetadata, UploadRequest, UploadUiState};
use paperscan_jobs::worker::wait_for_terminal;
use paperscan_jobs::{NotifyDispatcher, WorkerConfig, WorkerEvent};

#[derive(Parser)]
#[command(name = "paperscan", version, about = "Offline-first document upload client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload scanned pages
    Upload(UploadArgs),
    /// Inspect and manage the upload queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Run the background upload worker until interrupted
    Worker,
    /// Suggest tags and metadata for a scanned image
    Suggest(SuggestArgs),
}

#[derive(Args)]
struct UploadArgs {
    /// Page files, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[arg(long)]
    title: Option<String>,
    /// Tag id (repeatable)
    #[arg(long = "tag")]
    tags: Vec<i64>,
    #[arg(long)]
    document_type: Option<i64>,
    #[arg(long)]
    correspondent: Option<i64>,
    /// Queue each page as its own document
    #[arg(long)]
    separate: bool,
    /// Treat the files as transient handles and stage copies
    #[arg(long)]
    copy: bool,
    /// Only queue; leave the upload to a running worker
    #[arg(long)]
    detach: bool,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queue entries
    List,
    /// Number of entries still to upload
    Count,
    /// Requeue a failed entry
    Retry { id: Uuid },
    /// Drop a failed entry and its staged files
    Abandon { id: Uuid },
}

#[derive(Args)]
struct SuggestArgs {
    image: PathBuf,
    /// File with OCR text for the image
    #[arg(long)]
    text_file: Option<PathBuf>,
    /// Server id of an already uploaded document
    #[arg(long)]
    document_id: Option<i64>,
    /// Ignore the WiFi-only setting for this request
    #[arg(long)]
    use_anyway: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init_logging();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;
    let app = App::build(config).await.context("initializing")?;

    match cli.command {
        Command::Upload(args) => upload(&app, args).await,
        Command::Queue { action } => queue(&app, action).await,
        Command::Worker => worker(&app).await,
        Command::Suggest(args) => suggest(&app, args).await,
    }
}

fn metadata(args: &UploadArgs) -> UploadMetadata {
    let mut meta = UploadMetadata::new().with_tags(args.tags.iter().copied());
    if let Some(title) = &args.title {
        meta = meta.with_title(title.clone());
    }
    if let Some(id) = args.document_type {
        meta = meta.with_document_type(id);
    }
    if let Some(id) = args.correspondent {
        meta = meta.with_correspondent(id);
    }
    meta
}

async fn upload(app: &App, args: UploadArgs) -> anyhow::Result<()> {
    let pages: Vec<FileRef> = args
        .files
        .iter()
        .map(|path| {
            if args.copy {
                FileRef::transient(format!("file://{}", path.display()))
            } else {
                FileRef::local(path.clone())
            }
        })
        .collect();
    let meta = metadata(&args);

    let worker = app.worker(WorkerConfig::from_env());
    let dispatcher = Arc::new(worker.dispatcher());

    let queue_ids = if args.separate {
        app.preconditions.check_storage(&pages).await?;
        app.upload_queue(dispatcher)
            .queue_pages_separately(&pages, meta)
            .await?
    } else {
        let vm = app.upload_view_model(dispatcher);
        let mut states = vm.subscribe();
        let printer = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = states.borrow_and_update().clone();
                if let UploadUiState::Retrying { attempt, max_attempts, next_delay } = state {
                    eprintln!("retrying ({attempt}/{max_attempts}) in {}s", next_delay.as_secs());
                }
            }
        });
        let state = vm.submit(UploadRequest::multi_page(pages, meta)).await;
        printer.abort();

        match state {
            UploadUiState::Queued { queue_ids } => queue_ids,
            UploadUiState::Success { task_id } => {
                println!("uploaded: task {task_id}");
                delayed_refresh(|| app.catalog.refresh_soft(), REFRESH_DELAY).await;
                return Ok(());
            }
            UploadUiState::Error(failure) => {
                bail!(
                    "{} ({})",
                    failure.user_message,
                    failure.technical_details.unwrap_or_default()
                );
            }
            other => bail!("unexpected upload state: {other:?}"),
        }
    };

    for id in &queue_ids {
        println!("queued: {id}");
    }
    if args.detach {
        return Ok(());
    }

    // Subscribe before starting so no outcome is missed.
    let mut events = worker.events();
    let handle = worker.start();
    let mut failed = 0;
    for id in &queue_ids {
        match wait_for_terminal(&mut events, *id).await {
            Some(WorkerEvent::UploadCompleted { task_id, .. }) => {
                println!("uploaded: {id} (task {task_id})");
            }
            Some(WorkerEvent::UploadFailed { error, .. }) => {
                failed += 1;
                println!("failed: {id}: {error}");
            }
            _ => break,
        }
    }
    handle.shutdown().await?;
    if failed > 0 {
        bail!("{failed} upload(s) failed");
    }
    delayed_refresh(|| app.catalog.refresh_soft(), REFRESH_DELAY).await;
    Ok(())
}

async fn queue(app: &App, action: QueueAction) -> anyhow::Result<()> {
    let queue = app.upload_queue(Arc::new(NotifyDispatcher::new()));
    match action {
        QueueAction::List => {
            for entry in queue.list().await? {
                println!(
                    "{}  {:<9}  attempts {}/{}  pages {}  {}",
                    entry.id,
                    entry.status,
                    entry.attempt_count,
                    entry.max_attempts,
                    entry.files.len(),
                    entry.last_error.as_deref().unwrap_or("")
                );
            }
        }
        QueueAction::Count => println!("{}", queue.pending_count().await?),
        QueueAction::Retry { id } => {
            queue.retry_failed(id).await?;
            println!("requeued: {id}");
        }
        QueueAction::Abandon { id } => {
            queue.abandon(id).await?;
            println!("abandoned: {id}");
        }
    }
    Ok(())
}

async fn worker(app: &App) -> anyhow::Result<()> {
    let prober = app.reachability.start_probing(Duration::from_secs(30));
    let handle = app.worker(WorkerConfig::from_env()).start();
    let mut events = handle.events();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping worker");
                break;
            }
            event = events.recv() => match event {
                Ok(WorkerEvent::UploadCompleted { queue_id, task_id }) => {
                    println!("uploaded: {queue_id} (task {task_id})");
                }
                Ok(WorkerEvent::UploadFailed { queue_id, error, .. }) => {
                    println!("failed: {queue_id}: {error}");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Worker event stream ended");
                    break;
                }
            }
        }
    }

    handle.shutdown().await?;
    prober.abort();
    Ok(())
}

async fn suggest(app: &App, args: SuggestArgs) -> anyhow::Result<()> {
    let image = tokio::fs::read(&args.image)
        .await
        .with_context(|| format!("reading {}", args.image.display()))?;
    let text = match &args.text_file {
        Some(path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?,
        ),
        None => None,
    };

    app.catalog.refresh_soft().await;
    let orchestrator = app.orchestrator();
    let result = orchestrator
        .get_suggestions(&image, text.as_deref(), args.document_id, args.use_anyway)
        .await;

    match result {
        SuggestionResult::Success { analysis, source } => {
            println!("source: {source}");
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            println!("ai usage: {:?}", app.usage.status());
        }
        SuggestionResult::WifiRequired => {
            println!("AI analysis is limited to WiFi; pass --use-anyway to analyze now");
        }
        SuggestionResult::Error { message } => bail!(message),
        SuggestionResult::Loading => bail!("suggestions did not complete"),
    }
    Ok(())
}
