//! Main application entry point.
//!
//! This module handles:
//! * Command line argument parsing
//! * Logging configuration
//! * Configuration loading and overrides
//! * Session lifecycle and graceful shutdown
//!
//! # Exit Codes
//!
//! * `0` - any successful completion, even with per-item failures
//! * `1` - configuration or authentication errors
//!
//! # Shutdown Behavior
//!
//! SIGINT/SIGTERM set a shared cancellation token. Workers finish their
//! in-flight task checks and exit; remaining queued work is dropped and
//! the session reports what it completed.

use std::{path::PathBuf, process};

use clap::{Parser, Subcommand, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio_util::sync::CancellationToken;

use ripstream::{
    client::{MediaKind, Source},
    config::Config,
    error::Result,
    session::Session,
};

/// Build profile indicator for logging.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";

/// Build profile indicator for logging.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
///
/// All options can be set via environment variables with the
/// `RIPSTREAM_` prefix.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    ///
    /// Defaults to config.toml in the OS configuration directory.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "RIPSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Download folder, overriding the configuration
    #[arg(short, long, value_name = "DIR", value_hint = ValueHint::DirPath, env = "RIPSTREAM_FOLDER")]
    folder: Option<PathBuf>,

    /// Show what would be downloaded without downloading anything
    #[arg(long, default_value_t = false, env = "RIPSTREAM_DRY_RUN")]
    dry_run: bool,

    /// Disable progress bars
    #[arg(long, default_value_t = false, env = "RIPSTREAM_NO_PROGRESS")]
    no_progress: bool,

    /// Suppress all output except warnings and errors
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING, env = "RIPSTREAM_QUIET")]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Use -v for debug logging
    /// Use -vv for trace logging
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING, env = "RIPSTREAM_VERBOSE")]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Download one or more URLs
    Url {
        /// Provider URLs to download
        #[arg(required = true, value_hint = ValueHint::Url)]
        urls: Vec<String>,
    },

    /// Download every URL listed in a file, one per line
    File {
        /// Path to the URL list
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },

    /// Download a provider object by id
    Id {
        /// Provider (qobuz, tidal, deezer, soundcloud)
        source: Source,

        /// Object kind (track, album, artist, label, playlist)
        kind: String,

        /// Provider identifier
        id: String,
    },

    /// Search a provider and download interactively
    Search {
        /// Take the top hit without prompting
        #[arg(long, default_value_t = false)]
        first: bool,

        /// Write results to a JSON file instead of downloading
        #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
        output: Option<PathBuf>,

        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Provider (qobuz, tidal, deezer, soundcloud)
        source: Source,

        /// Object kind (track, album, artist, playlist)
        kind: String,

        /// Search query
        query: String,
    },

    /// Download the tracks of a Last.fm playlist
    Lastfm {
        /// Last.fm playlist URL
        #[arg(value_hint = ValueHint::Url)]
        url: String,
    },
}

/// Initialize logging system.
///
/// * `-q` sets Warning level
/// * `-v` sets Debug level
/// * `-vv` sets Trace level
/// * `RUST_LOG` environment variable provides defaults
/// * External crates are limited to Error level unless tracing
fn init_logger(args: &Args) {
    let mut logger = env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let mut external_level = LevelFilter::Error;
    if args.quiet || args.verbose > 0 {
        let level = match args.verbose {
            // Quiet and verbose are mutually exclusive, and `verbose`
            // is 0 by default. So this arm means: quiet mode.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::max(),
        };

        logger.filter_module(module_path!(), level);
        logger.filter_module("ripstream", level);

        if level == LevelFilter::Trace {
            external_level = LevelFilter::max();
        }
    }

    for external_module in ["reqwest", "sqlx", "hyper_util", "governor"] {
        logger.filter_module(external_module, external_level);
    }

    logger.init();
}

/// Runs one session for the parsed command.
async fn run(args: Args) -> Result<()> {
    let config = {
        let mut config = match &args.config {
            Some(path) => Config::load(path)?,
            None => Config::load_default()?,
        };
        if let Some(folder) = args.folder {
            config.downloads.folder = folder;
        }
        if args.dry_run {
            config.cli.dry_run = true;
        }
        if args.no_progress {
            config.cli.progress_bars = false;
        }
        config
    };

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let received = shutdown_signal().await;
            info!("received {received}, shutting down");
            shutdown.cancel();
        });
    }

    let mut session = Session::new(config, shutdown.clone()).await?;

    if let Err(e) = queue_command(&mut session, args.command).await {
        session.finish().await;
        return Err(e);
    }

    tokio::select! {
        () = session.process_pending() => {}
        () = shutdown.cancelled() => {
            info!("shutdown requested, abandoning remaining work");
        }
    }

    session.finish().await;
    Ok(())
}

/// Waits for a shutdown request: Ctrl-C anywhere, SIGTERM on Unix.
///
/// Both mean the same thing to a download session: stop taking work and
/// let the workers wind down. There is no reload signal; a session has
/// no long-lived configuration to swap out mid-run.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => "Ctrl+C",
                    _ = sigterm.recv() => "SIGTERM",
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
                "Ctrl+C"
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    }
}

/// Translates the CLI command into queued session work.
async fn queue_command(session: &mut Session, command: Command) -> Result<()> {
    match command {
        Command::Url { urls } => session.add_all(&urls).await,
        Command::File { path } => {
            let contents = std::fs::read_to_string(&path)?;
            let urls: Vec<String> = contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect();
            session.add_all(&urls).await
        }
        Command::Id { source, kind, id } => {
            let kind: MediaKind = kind.parse()?;
            session.add_by_id(source, kind, &id).await
        }
        Command::Search {
            first,
            output,
            limit,
            source,
            kind,
            query,
        } => {
            let kind: MediaKind = kind.parse()?;
            if let Some(path) = output {
                session
                    .search_output_file(source, kind, &query, &path, limit)
                    .await
            } else if first {
                session.search_take_first(source, kind, &query).await
            } else {
                session.search_interactive(source, kind, &query).await
            }
        }
        Command::Lastfm { url } => session.add_lastfm(&url).await,
    }
}

/// Application entry point.
///
/// Exits with status code:
/// - 0 for any successful completion (even with per-item failures)
/// - 1 if a configuration or authentication error occurs
#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {args:#?}");

    info!(
        "starting {}/{}; {BUILD_PROFILE}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    match run(args).await {
        Ok(()) => {
            info!("shut down gracefully");
            process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    }
}
