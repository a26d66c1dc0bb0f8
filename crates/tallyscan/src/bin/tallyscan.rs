//! Command-line front end: submit documents, poll jobs, recover orphans.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use tallyscan::ai::{HttpGenerator, StructuredExtractor};
use tallyscan::config::{load_config, resolve_api_key, Config};
use tallyscan::db::{default_database_path, Database, SqliteStore};
use tallyscan::intake::{job_status_view, validate_upload, Dispatcher, UploadedFile};
use tallyscan::jobs::DocumentKind;
use tallyscan::logging::{self, LogFormat};
use tallyscan::materialize::Materializer;
use tallyscan::pipeline::Pipeline;
use tallyscan::processor::{LopdfParser, OcrExtractor, PdfExtractor, PdftoppmRenderer, TesseractEngine};
use tallyscan::worker::WorkerPool;

#[derive(Parser, Debug)]
#[command(
    name = "tallyscan",
    version,
    about = "Extract transactions from receipts and bank statements"
)]
struct Cli {
    /// JSON config file; built-in defaults when omitted.
    #[arg(short, long, env = "TALLYSCAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the config.
    #[arg(long, env = "TALLYSCAN_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a receipt or statement and process it to completion.
    Submit {
        file: PathBuf,

        #[arg(long)]
        owner: String,

        /// receipt, pdf_statement or image_statement
        #[arg(long, default_value = "receipt")]
        kind: DocumentKind,

        /// Also print the final job status. Processing runs in this process,
        /// so the command returns only after the job finishes either way.
        #[arg(long)]
        wait: bool,
    },

    /// Show a job's status.
    Status {
        job_id: String,

        #[arg(long)]
        owner: String,
    },

    /// Re-run jobs left in `processing` by an earlier run.
    Recover,
}

struct Services {
    dispatcher: Dispatcher,
    upload_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    logging::init(format, "info").context("Failed to initialise logging")?;

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    let configured = cli
        .database
        .clone()
        .or_else(|| config.database_path.clone().map(PathBuf::from));
    let db_path = match configured {
        Some(path) => path,
        None => default_database_path().context("Could not determine home directory")?,
    };
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let store = SqliteStore::new(db);

    match cli.command {
        Command::Submit {
            file,
            owner,
            kind,
            wait,
        } => {
            let services = build_services(&config, &store, &db_path)?;
            let upload = stage_upload(&file, &services.upload_dir)?;
            validate_upload(&upload, kind).inspect_err(|_| {
                let _ = std::fs::remove_file(&upload.path);
            })?;

            let job_id = services
                .dispatcher
                .submit_document(upload, &owner, kind)
                .await?;
            println!("{}", job_id);

            // Queued work finishes before the pool stops.
            services.dispatcher.shutdown().await;

            if wait {
                print_status(&store, &job_id, &owner)?;
            }
        }
        Command::Status { job_id, owner } => {
            print_status(&store, &job_id, &owner)?;
        }
        Command::Recover => {
            let services = build_services(&config, &store, &db_path)?;
            let report = services.dispatcher.recover_orphaned_jobs().await?;
            services.dispatcher.shutdown().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Wires collaborators into a pipeline and a dispatcher.
fn build_services(config: &Config, store: &SqliteStore, db_path: &Path) -> Result<Services> {
    let api_key = resolve_api_key(&config.ai)?;
    let generator = HttpGenerator::new(&config.ai, api_key)?;

    let ocr = OcrExtractor::new(Arc::new(TesseractEngine::new(&config.ocr)), &config.ocr);
    let pdf = PdfExtractor::new(
        Arc::new(LopdfParser),
        Arc::new(PdftoppmRenderer::new(&config.pdf)),
        ocr.clone(),
        &config.pdf,
    );
    let extractor = StructuredExtractor::new(Arc::new(generator), &config.ai);
    let materializer = Materializer::new(Arc::new(store.clone()), &config.materializer);
    let pipeline = Pipeline::new(ocr, pdf, extractor, materializer, Arc::new(store.clone()));

    let pool = WorkerPool::start(Arc::new(pipeline), config.worker_count, config.queue_capacity);
    let dispatcher = Dispatcher::new(pool, Arc::new(store.clone()), Arc::new(store.clone()))
        .with_orphan_after(config.orphan_after_secs);

    let upload_dir = db_path
        .parent()
        .map(|p| p.join("uploads"))
        .unwrap_or_else(|| PathBuf::from("uploads"));

    Ok(Services {
        dispatcher,
        upload_dir,
    })
}

/// Copies the user's file into the upload directory under a fresh name, the
/// way an upload handler stores a multipart body.
fn stage_upload(file: &Path, upload_dir: &Path) -> Result<UploadedFile> {
    if !file.is_file() {
        bail!("{} is not a file", file.display());
    }
    let original_filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("File has no name")?;

    std::fs::create_dir_all(upload_dir)
        .with_context(|| format!("Failed to create {}", upload_dir.display()))?;

    let extension = file
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default();
    let stored = upload_dir.join(format!("{}{}", uuid::Uuid::new_v4(), extension));
    std::fs::copy(file, &stored)
        .with_context(|| format!("Failed to copy {}", file.display()))?;
    info!(original = %original_filename, "upload staged");

    Ok(UploadedFile::from_path(&stored, &original_filename)?)
}

fn print_status(store: &SqliteStore, job_id: &str, owner: &str) -> Result<()> {
    let view = job_status_view(store, store, job_id, owner)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}
