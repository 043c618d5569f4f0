use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::oneshot;
use tracing::{info, warn};

use vodpipe::config::{AppConfig, StoreBackend};
use vodpipe::database::{
    self,
    repositories::{FileVideoRepository, SqlxVideoRepository, VideoRepository},
};
use vodpipe::downloader::HttpSegmentOpener;
use vodpipe::player::{CommandDecoderHost, PlaybackState};
use vodpipe::resolver::ManifestResolver;
use vodpipe::session::{SessionContext, VideoSession};
use vodpipe::utils::http_client::build_client;
use vodpipe::{logging, utils::format::format_bytes};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding one sub-directory per video
    #[arg(long, env = "VODPIPE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Persistent store backend: sqlite or files
    #[arg(long)]
    store: Option<StoreBackend>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch every segment to disk without playing it
    Download { url: String },
    /// Stream the video to the decoder, saving it on the way
    Play { url: String },
    /// Print the stored record of a video
    Status { url: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    if let Some(store) = cli.store {
        config.store_backend = store;
    }

    let _log_guard = logging::init_logging(config.log_dir.as_deref())?;
    if let Some(dir) = config.log_dir.as_deref() {
        if let Err(e) = logging::prune_old_logs(dir, logging::LOG_RETENTION_DAYS).await {
            warn!(error = %e, "Failed to prune old logs");
        }
    }

    let store: Arc<dyn VideoRepository> = match config.store_backend {
        StoreBackend::Sqlite => {
            let pool = database::init_pool(&config.database_url)
                .await
                .with_context(|| format!("Failed to open {}", config.database_url))?;
            database::run_migrations(&pool).await?;
            Arc::new(SqlxVideoRepository::new(pool))
        }
        StoreBackend::Files => Arc::new(FileVideoRepository::new(&config.output_dir)),
    };

    let client = build_client(&config.user_agent, config.http_connect_timeout)?;
    let ctx = SessionContext {
        store,
        resolver: Arc::new(ManifestResolver::new(client.clone())),
        opener: Arc::new(HttpSegmentOpener::new(client)),
        output_dir: config.output_dir.clone(),
        pipeline: config.pipeline.clone(),
    };

    match cli.command {
        Command::Download { url } => {
            let session = Arc::new(VideoSession::new(ctx, &url)?);
            let task = {
                let session = session.clone();
                tokio::spawn(async move { session.download_only().await })
            };
            tokio::pin!(task);

            let summary = tokio::select! {
                joined = &mut task => joined?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, cancelling download...");
                    session.cancel();
                    task.await?
                }
            }?;
            println!("{summary}");
        }
        Command::Play { url } => {
            let session = VideoSession::new(ctx, &url)?;
            let host = CommandDecoderHost::new(&config.decoder);
            match host.version() {
                Some(version) => info!(decoder = %version, "Decoder available"),
                None => warn!(
                    program = %config.decoder.program,
                    "Decoder did not report a version"
                ),
            }

            let (after_tx, after_rx) = oneshot::channel();
            let controller = Arc::new(session.get_player(Arc::new(host), Some(after_tx)).await?);
            info!(
                title = %controller.title(),
                uploader = %controller.uploader(),
                duration_secs = controller.duration(),
                mode = %controller.mode(),
                "Playing"
            );

            let run = {
                let controller = controller.clone();
                tokio::spawn(async move { controller.run().await })
            };
            tokio::pin!(run);

            let report = tokio::select! {
                joined = &mut run => joined?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, stopping playback...");
                    controller.stop();
                    run.await?
                }
            }?;

            if let Ok(finished) = after_rx.await {
                info!(state = %finished.state, "Playback completion delivered");
            }
            match report.state {
                PlaybackState::Done => println!(
                    "played {} segments ({})",
                    report.summaries.len(),
                    format_bytes(report.bytes())
                ),
                state => println!("playback {state} after {} segments", report.summaries.len()),
            }
        }
        Command::Status { url } => {
            let session = VideoSession::new(ctx, &url)?;
            match session.record().await? {
                Some(record) => {
                    let playing = if record.playing { " (playing)" } else { "" };
                    println!("{}: {}{playing}", record.video_id, record.status);
                    if let Some(meta) = &record.metadata {
                        println!("{meta}");
                    }
                    for segment in &record.segments {
                        println!("  {}: {segment}", segment.order);
                    }
                }
                None => println!("{}: not downloaded", session.video_id()),
            }
        }
    }

    Ok(())
}
