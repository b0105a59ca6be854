//! Vigil filter (vigil-filter) - Main entry point
//!
//! Runs one detection filter: loads the backend named by `--filter` from its
//! JSON configuration, then serves newline-delimited JSON requests on a Unix
//! socket until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vigil_common::alert::LogAlertSink;
use vigil_common::config::{ConfigDocument, TomlSettings, DEFAULT_CACHE_SIZE, DEFAULT_THRESHOLD};
use vigil_common::context::MAX_CERTITUDE;
use vigil_common::session::SessionManager;
use vigil_common::FilterContext;
use vigil_filters::monitor::{self, MonitorState};
use vigil_filters::{server, FilterKind, Generator};

/// Command-line arguments for vigil-filter
#[derive(Parser, Debug)]
#[command(name = "vigil-filter")]
#[command(about = "Threat-detection filter process")]
#[command(version)]
struct Args {
    /// Backend to run: hostlookup, sofa or user_agent
    #[arg(short, long, env = "VIGIL_FILTER")]
    filter: Option<String>,

    /// Unix socket to listen on
    #[arg(short, long, env = "VIGIL_SOCKET")]
    socket: Option<PathBuf>,

    /// Filter configuration (JSON)
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Result cache capacity (0 disables the cache)
    #[arg(long, env = "VIGIL_CACHE_SIZE")]
    cache_size: Option<usize>,

    /// Minimum certitude raising an alert
    #[arg(short, long, env = "VIGIL_THRESHOLD")]
    threshold: Option<u32>,

    /// Comma-separated alert tags (backend defaults when empty)
    #[arg(long, env = "VIGIL_TAGS")]
    tags: Option<String>,

    /// Address of the monitoring endpoint (disabled when unset)
    #[arg(short, long, env = "VIGIL_MONITOR")]
    monitor: Option<SocketAddr>,

    /// Log filter directive, e.g. `info` or `vigil_filters=debug`
    #[arg(long, env = "VIGIL_LOG_LEVEL")]
    log_level: Option<String>,

    /// TOML settings file providing defaults for the options above
    #[arg(long, env = "VIGIL_SETTINGS")]
    settings: Option<PathBuf>,
}

/// Options after merging command line, settings file and defaults
#[derive(Debug)]
struct Options {
    kind: FilterKind,
    socket: PathBuf,
    config: PathBuf,
    cache_size: usize,
    threshold: u32,
    tags: String,
    monitor: Option<SocketAddr>,
    log_level: Option<String>,
}

impl Options {
    fn resolve(args: Args, settings: TomlSettings) -> Result<Self> {
        let kind = args
            .filter
            .or(settings.filter)
            .ok_or_else(|| anyhow!("no filter given (--filter or `filter` in settings)"))?
            .parse::<FilterKind>()
            .map_err(|e| anyhow!(e))?;
        let socket = args
            .socket
            .or(settings.socket)
            .ok_or_else(|| anyhow!("no socket given (--socket or `socket` in settings)"))?;
        let config = args
            .config
            .or(settings.config)
            .ok_or_else(|| anyhow!("no configuration given (--config or `config` in settings)"))?;

        let threshold = args
            .threshold
            .or(settings.threshold)
            .unwrap_or(DEFAULT_THRESHOLD);
        if threshold > MAX_CERTITUDE {
            bail!("threshold must be between 0 and {}, got {}", MAX_CERTITUDE, threshold);
        }

        let monitor = match args.monitor {
            Some(addr) => Some(addr),
            None => settings
                .monitor
                .map(|addr| addr.parse::<SocketAddr>())
                .transpose()
                .context("Invalid `monitor` address in settings")?,
        };

        Ok(Self {
            kind,
            socket,
            config,
            cache_size: args
                .cache_size
                .or(settings.cache_size)
                .unwrap_or(DEFAULT_CACHE_SIZE),
            threshold,
            tags: args.tags.or(settings.tags).unwrap_or_default(),
            monitor,
            log_level: args.log_level.or(settings.log_level),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = TomlSettings::load_or_default(args.settings.as_deref())
        .context("Failed to read settings file")?;
    let options = Options::resolve(args, settings)?;

    // Initialize tracing
    let filter = match &options.log_level {
        Some(directive) => tracing_subscriber::EnvFilter::try_new(directive)
            .with_context(|| format!("Invalid log level '{}'", directive))?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "vigil_filters=info,vigil_common=info,vigil::alert=warn".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting vigil filter '{}'", options.kind);
    info!("Configuration: {}", options.config.display());

    let ctx = FilterContext::new(options.kind.as_str(), Arc::new(LogAlertSink), options.threshold);
    let mut generator = Generator::new(options.kind, ctx, options.cache_size);

    let document = ConfigDocument::load(&options.config)
        .context("Failed to read filter configuration")?;
    generator
        .load_config(&document)
        .context("Failed to initialize generator")?;
    generator
        .configure_alerting(&options.tags)
        .context("Failed to configure alerting")?;

    let sessions = Arc::new(SessionManager::new());

    let monitor_handle = match options.monitor {
        Some(addr) => {
            let state = MonitorState::new(
                options.kind.as_str(),
                Arc::clone(&sessions),
                Arc::clone(generator.cache()),
            );
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .context("Failed to bind monitoring address")?;
            info!("Monitoring endpoint on {}", addr);
            let token = sessions.shutdown_token();
            Some(tokio::spawn(async move {
                let shutdown = async move { token.cancelled().await };
                if let Err(e) = axum::serve(listener, monitor::build_router(state))
                    .with_graceful_shutdown(shutdown)
                    .await
                {
                    error!("Monitoring server error: {}", e);
                }
            }))
        }
        None => None,
    };

    let listener = server::bind_socket(&options.socket)
        .with_context(|| format!("Failed to bind {}", options.socket.display()))?;
    server::accept_loop(listener, &generator, &sessions, shutdown_signal()).await;

    generator.teardown();
    server::remove_socket(&options.socket).context("Failed to remove socket file")?;

    if let Some(handle) = monitor_handle {
        if let Err(e) = handle.await {
            error!("Monitoring task failed: {}", e);
        }
    }

    info!("Filter shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
