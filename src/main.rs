use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tokio::io::BufReader;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use session_limiter::config::LimiterConfig;
use session_limiter::gate::{serve_lines, RateLimitGate};
use session_limiter::persistence::{FileStore, PersistenceMirror};
use session_limiter::ratelimit::RateLimiter;

/// Line-oriented admission gate: one session id in, one JSON decision out.
#[derive(Parser, Debug)]
#[command(name = "session-limiter", version)]
#[command(about = "Per-session minute/hour/day admission guard")]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file receiving mirrored counters (overrides the config file)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(args));
    // A pending stdin read sits on a blocking thread; don't wait for it.
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    info!("Starting Session Limiter");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => LimiterConfig::from_file(path)?,
        None => LimiterConfig::default(),
    };
    if let Some(store) = args.store {
        config.persistence.store_path = Some(store);
    }
    info!(
        per_minute = config.limits.per_minute,
        per_hour = config.limits.per_hour,
        per_day = config.limits.per_day,
        "Configuration loaded"
    );

    // One limiter for the whole process, shared by handle.
    let mut limiter = RateLimiter::with_limits(config.limits);
    let mirror = match &config.persistence.store_path {
        Some(path) => {
            let store = Arc::new(FileStore::open(path).await?);
            let mirror = PersistenceMirror::spawn(store);
            limiter = limiter.with_mirror(mirror.handle());
            Some(mirror)
        }
        None => None,
    };
    let limiter = Arc::new(limiter);
    info!("Rate limiter initialized");

    let sweeper = config.eviction.idle_after().map(|idle| {
        let limiter = limiter.clone();
        let mut ticker = tokio::time::interval(config.eviction.sweep_interval());
        info!(idle_secs = idle.as_secs(), "Idle session eviction enabled");
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                limiter.evict_idle_at(Utc::now(), idle);
            }
        })
    });

    let gate = RateLimitGate::new(limiter);

    let stdin = BufReader::new(tokio::io::stdin());
    let served = tokio::select! {
        result = serve_lines(&gate, stdin, tokio::io::stdout()) => result,
        _ = shutdown_signal() => Ok(()),
    };

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    if let Some(mirror) = mirror {
        mirror.shutdown().await;
    }

    info!("Session Limiter stopped");
    served?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
