use anyhow::{Context, bail};
use clap::Parser;
use dotenvy::dotenv;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hiura_media_core::modules::transcode::{ContentType, JobStatus, MonitorState};
use hiura_media_core::{AppConfig, AppState};

/// Follow a transcoding job until it completes or fails.
#[derive(Debug, Parser)]
#[command(name = "hiura-watch", version)]
struct Args {
    /// movie, series or episode
    content_type: ContentType,
    /// Task id returned by the upload endpoint
    task_id: String,
    /// Override POLL_INTERVAL_MS
    #[arg(long)]
    interval_ms: Option<u64>,
    /// Print every state change as a JSON line
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = AppConfig::new().context("failed to load configuration")?;
    if let Some(interval_ms) = args.interval_ms {
        config.poller.interval_ms = interval_ms;
    }

    let state = AppState::connect(config).context("failed to build status client")?;
    let monitor = state.job_monitor();
    let mut rx = monitor.subscribe();

    monitor.monitor(args.task_id.as_str(), args.content_type);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = rx.borrow_and_update().clone();
                report(&current, args.json)?;
                if current.status.is_terminal() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                monitor.cancel();
                warn!("Interrupted, stopped watching {}", args.task_id);
                return Ok(());
            }
        }
    }

    let last = monitor.state();
    match last.status {
        JobStatus::Completed => {
            info!("✅ {} {} is ready", args.content_type, args.task_id);
            Ok(())
        }
        JobStatus::Failed => bail!(last.error.unwrap_or_else(|| "job failed".to_string())),
        other => bail!("stopped watching while job was {:?}", other),
    }
}

fn report(state: &MonitorState, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(state)?);
    } else if state.status != JobStatus::Idle {
        info!("[{:>3}%] {}", state.progress, state.message);
    }
    Ok(())
}
