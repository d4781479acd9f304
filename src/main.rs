use snipper::config::{Config, ConfigError};
use snipper::db::Database;
use snipper::library::{ExportError, ExportService, FfmpegTranscoder};
use snipper::playback::PlaybackHandle;
use snipper::snippet_text::decode_text;
use snipper::waveform::{SessionError, WaveformHandle};
use snipper::{LibraryError, LibraryManager, PersistenceGateway, WaveformBridge};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Library(#[from] LibraryError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("snipper");

    if args.len() < 2 {
        print_usage(program);
        std::process::exit(1);
    }

    if let Err(e) = run(&args[1..]).await {
        error!("{}", e);
        if matches!(e, CliError::Usage(_)) {
            print_usage(program);
        }
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<(), CliError> {
    let config = Config::load()?;

    if let Some(parent) = config.database_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let database = Database::new(&config.database_path.to_string_lossy()).await?;
    let library = Arc::new(LibraryManager::new(database));

    // Retention runs once per start
    match library.purge_older_than(config.retention()).await {
        Ok(purged) if !purged.is_empty() => info!("Purged expired tracks: {:?}", purged),
        Ok(_) => {}
        Err(e) => warn!("Retention purge failed: {}", e),
    }

    let command = args[0].as_str();
    let rest = &args[1..];

    match command {
        "tracks" => {
            for track in library.list_tracks().await? {
                println!(
                    "{}\t{}\t{} bytes\t{}{}",
                    track.id,
                    track.file_name,
                    track.size_bytes,
                    track.upload_time.format("%Y-%m-%d %H:%M:%S"),
                    if track.is_active { "\t(active)" } else { "" }
                );
            }
        }
        "add-track" => {
            let path = PathBuf::from(positional(rest, 0, "add-track <path>")?);
            let data = tokio::fs::read(&path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| CliError::Usage(format!("Not a file: {}", path.display())))?;
            let id = library.add_track(&file_name, data).await?;
            println!("{}", id);
        }
        "delete-track" => {
            let id = track_id(rest)?;
            library.delete_track(id).await?;
            println!("Deleted track {}", id);
        }
        "snippets" => {
            let id = track_id(rest)?;
            let snippets = library.list_snippets_for_track(id).await?;
            if rest.iter().any(|a| a == "--json") {
                println!("{}", serde_json::to_string_pretty(&snippets)?);
            } else {
                for snippet in snippets {
                    println!(
                        "{}\t{:.3}\t{:.3}\t{}{}",
                        snippet.region_id,
                        snippet.start_time,
                        snippet.end_time,
                        snippet.name,
                        if snippet.is_active { "\t(active)" } else { "" }
                    );
                }
            }
        }
        "export-text" => {
            let bridge = open_session(library.clone(), track_id(rest)?).await?;
            println!("{}", bridge.export_snippets());
        }
        "import-text" => {
            let id = track_id(rest)?;
            let path = positional(rest, 1, "import-text <track-id> <file>")?;
            let text = decode_text(&tokio::fs::read(path).await?);

            let mut bridge = open_session(library.clone(), id).await?;
            let report = bridge.import_snippets(&text).await?;
            for skipped in &report.skipped {
                warn!("Line {} skipped: {}", skipped.line_number, skipped.reason);
            }
            println!(
                "Imported {} snippets, skipped {} lines",
                report.imported.len(),
                report.skipped.len()
            );
        }
        "trim" => {
            let id = track_id(rest)?;
            let region_id = positional(rest, 1, "trim <track-id> <region-id>")?;
            let out_dir = flag_value(rest, "--out")?
                .map(PathBuf::from)
                .unwrap_or_else(|| config.export_dir.clone());

            let bridge = open_session(library.clone(), id).await?;
            let transcoder = FfmpegTranscoder::new(config.ffmpeg_path.clone());
            let clip = bridge.export_region(region_id, &transcoder).await?;
            let path = ExportService::write_clip(&clip, Path::new(&out_dir)).await?;
            println!("{}", path.display());
        }
        "purge" => {
            let age = match flag_value(rest, "--days")? {
                Some(days) => chrono::Duration::days(
                    days.parse::<i64>()
                        .map_err(|_| CliError::Usage(format!("Invalid --days: {}", days)))?,
                ),
                None => config.retention(),
            };
            let purged = library.purge_older_than(age).await?;
            println!("Purged {} tracks", purged.len());
        }
        other => return Err(CliError::Usage(format!("Unknown command: {}", other))),
    }

    Ok(())
}

/// Load a track into a headless session; view and transport commands are dropped
async fn open_session(library: Arc<LibraryManager>, id: i64) -> Result<WaveformBridge, CliError> {
    let (view, _) = WaveformHandle::channel();
    let (transport, _) = PlaybackHandle::channel();
    let mut bridge = WaveformBridge::new(library, view, transport);
    bridge.activate_track(id).await?;
    Ok(bridge)
}

fn positional<'a>(args: &'a [String], index: usize, usage: &str) -> Result<&'a str, CliError> {
    args.iter()
        .filter(|a| !a.starts_with("--"))
        .nth(index)
        .map(String::as_str)
        .ok_or_else(|| CliError::Usage(format!("Expected: {}", usage)))
}

fn track_id(args: &[String]) -> Result<i64, CliError> {
    let raw = positional(args, 0, "<track-id>")?;
    raw.parse()
        .map_err(|_| CliError::Usage(format!("Invalid track id: {}", raw)))
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>, CliError> {
    match args.iter().position(|a| a == flag) {
        Some(i) => args
            .get(i + 1)
            .map(|v| Some(v.as_str()))
            .ok_or_else(|| CliError::Usage(format!("{} requires a value", flag))),
        None => Ok(None),
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <command> [args]", program);
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  tracks                                   List stored tracks");
    eprintln!("  add-track <path>                         Upload a track and make it active");
    eprintln!("  delete-track <id>                        Delete a track and its snippets");
    eprintln!("  snippets <track-id> [--json]             List stored snippets");
    eprintln!("  export-text <track-id>                   Print snippets as share text");
    eprintln!("  import-text <track-id> <file>            Add snippets from share text");
    eprintln!("  trim <track-id> <region-id> [--out DIR]  Write one snippet as an audio clip");
    eprintln!("  purge [--days N]                         Delete tracks older than N days");
    eprintln!();
    eprintln!("Environment: SNIPPER_DATABASE_PATH, SNIPPER_EXPORT_DIR,");
    eprintln!("             SNIPPER_RETENTION_DAYS, SNIPPER_FFMPEG_PATH, RUST_LOG");
}
