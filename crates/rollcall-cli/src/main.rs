use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::accounts::CsvAccountDirectory;
use rollcall_core::log_store::{AttendanceLogStore, CsvLogStore};
use rollcall_core::{
    database, report, AnnotatedFrame, CaptureError, DatabaseError, EmbeddingDatabase,
    EuclideanMatcher, FrameProcessor, Session, SessionError, SessionRunner, SessionSummary,
};
use rollcall_hw::{Camera, ImageDirectorySource};
use rollcall_vision::{OnnxFaceEncoder, RecognizerConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-recognition attendance")]
struct Cli {
    /// TOML config file (default: $ROLLCALL_CONFIG, else built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the embedding database from the enrollment photos
    Enroll,
    /// Run an attendance session until Ctrl-C or end of input
    Run {
        /// Replay images from a directory instead of opening the camera
        #[arg(long)]
        replay: Option<PathBuf>,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
        /// Write the latest annotated frame to this image path
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// List attendance logs, or show one day's log
    Logs {
        /// Day to show (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List V4L2 capture devices
    Devices,
    /// Show configuration and database status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Enroll => enroll(&config),
        Commands::Run {
            replay,
            max_frames,
            snapshot,
        } => run(config, replay, max_frames, snapshot).await,
        Commands::Logs { date } => logs(&config, date),
        Commands::Devices => {
            devices();
            Ok(())
        }
        Commands::Status => {
            status(&config);
            Ok(())
        }
    }
}

fn load_encoder(config: &Config) -> Result<OnnxFaceEncoder> {
    OnnxFaceEncoder::load(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
        config.detector_confidence,
        RecognizerConfig {
            input_size: config.recognizer_input_size,
            embedding_dim: config.embedding_dim,
        },
    )
    .context("failed to load face models")
}

fn enroll(config: &Config) -> Result<()> {
    let mut encoder = load_encoder(config)?;
    let report = EmbeddingDatabase::build(&config.enrollment_dir, &mut encoder)
        .context("enrollment failed")?;
    database::save(&config.database_path, &report.database)
        .context("failed to save embedding database")?;

    for skip in &report.skipped {
        println!("  skipped {} ({}): {}", skip.path.display(), skip.user_id, skip.reason);
    }
    println!(
        "Enrolled {} embeddings for {} users in {:.1}s ({} photos skipped)",
        report.database.len(),
        report.database.user_count(),
        report.elapsed.as_secs_f32(),
        report.skipped.len()
    );
    println!("Saved to {}", config.database_path.display());
    Ok(())
}

async fn run(
    config: Config,
    replay: Option<PathBuf>,
    max_frames: Option<u64>,
    snapshot: Option<PathBuf>,
) -> Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    let signal_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("stop requested");
            signal_stop.store(true, Ordering::SeqCst);
        }
    });

    // The encoder and its sessions stay on the blocking thread.
    let summary = tokio::task::spawn_blocking(move || {
        run_blocking(&config, replay, max_frames, snapshot, &stop)
    })
    .await
    .context("session thread panicked")??;

    println!(
        "Session {} ended ({:?}): {} frames, {} faces, {} users marked, {} records written",
        summary.session_id,
        summary.stop_reason,
        summary.frames,
        summary.faces,
        summary.marked,
        summary.written
    );
    if summary.frame_errors > 0 {
        println!("  {} frames failed processing", summary.frame_errors);
    }
    Ok(())
}

fn run_blocking(
    config: &Config,
    replay: Option<PathBuf>,
    max_frames: Option<u64>,
    snapshot: Option<PathBuf>,
    stop: &AtomicBool,
) -> Result<SessionSummary> {
    let encoder = load_encoder(config)?;
    let processor = FrameProcessor::new(
        Box::new(encoder),
        Box::new(EuclideanMatcher),
        Box::new(CsvAccountDirectory::new(&config.users_file)),
        config.tolerance,
    );
    let mut runner = SessionRunner::new(
        processor,
        Box::new(CsvLogStore::new(&config.log_dir)),
        &config.database_path,
    )
    .with_max_frames(max_frames);
    let mut session = Session::new();

    let present = |frame: &AnnotatedFrame| {
        for user_id in &frame.newly_marked {
            println!("Marked present: {user_id}");
        }
        if let Some(path) = &snapshot {
            if let Err(e) = frame.image.save(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to write snapshot");
            }
        }
    };

    let result = match replay {
        Some(dir) => runner.run(
            &mut session,
            || ImageDirectorySource::open(&dir),
            stop,
            present,
        ),
        None => runner.run(
            &mut session,
            || {
                Camera::open(&config.camera_device, config.camera_width, config.camera_height)
                    .map_err(CaptureError::from)
            },
            stop,
            present,
        ),
    };

    match result {
        Ok(summary) => Ok(summary),
        Err(SessionError::Flush {
            mut summary,
            pending,
            source,
        }) => {
            tracing::warn!(pending, error = %source, "attendance flush failed; retrying once");
            summary.written = session
                .stop(runner.store())
                .with_context(|| format!("{pending} attendance records could not be written"))?;
            Ok(summary)
        }
        Err(e) => {
            // A capture failure can also leave records behind.
            if !session.recorder().is_empty() {
                if let Err(retry) = session.stop(runner.store()) {
                    tracing::error!(
                        pending = session.recorder().len(),
                        error = %retry,
                        "attendance records lost"
                    );
                }
            }
            Err(anyhow::Error::new(e).context("attendance session failed"))
        }
    }
}

fn logs(config: &Config, date: Option<NaiveDate>) -> Result<()> {
    let store = CsvLogStore::new(&config.log_dir);

    let Some(date) = date else {
        let dates = store.dates().context("failed to list attendance logs")?;
        if dates.is_empty() {
            println!("No attendance logs in {}", store.dir().display());
        }
        for date in dates {
            println!("{date}  {}", store.path_for(date).display());
        }
        return Ok(());
    };

    let records = store
        .read(date)
        .with_context(|| format!("failed to read attendance for {date}"))?;
    for r in &records {
        println!(
            "{:<16} {:<24} {} {} {} {}",
            r.user_id, r.display_name, r.date, r.time, r.status, r.method
        );
    }

    let summary = report::summarize(&records);
    println!("Total records: {}", summary.total_records);
    println!("Unique users:  {}", summary.unique_users);
    match summary.first_check_in {
        Some(time) => println!("First check-in: {time}"),
        None => println!("First check-in: -"),
    }
    Ok(())
}

fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for d in devices {
        println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
    }
}

fn status(config: &Config) {
    println!("Enrollment dir: {}", config.enrollment_dir.display());
    println!("Database:       {}", config.database_path.display());
    println!("Attendance logs: {}", config.log_dir.display());
    println!("Users file:     {}", config.users_file.display());
    println!("Camera:         {}", config.camera_device);
    println!("Detector:       {}", config.detector_model_path().display());
    println!("Recognizer:     {}", config.recognizer_model_path().display());
    println!("Tolerance:      {}", config.tolerance);

    match database::load(&config.database_path) {
        Ok(db) => println!(
            "Database status: {} embeddings, {} users, dimension {}",
            db.len(),
            db.user_count(),
            db.dimension().unwrap_or(0)
        ),
        Err(DatabaseError::NotFound(_)) => {
            println!("Database status: not built (run `rollcall enroll`)")
        }
        Err(e) => println!("Database status: unreadable ({e})"),
    }
}
