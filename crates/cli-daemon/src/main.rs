//! CLI entry point for tvsync
//!
//! Parses command line arguments, installs logging and starts the service.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tvsync::{App, Config};

/// tvsync - keep a TV library in step with what has aired
#[derive(Parser, Debug)]
#[command(name = "tvsync")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Library root containing one folder per show
    ///
    /// Falls back to `library.root` from the config file or TVSYNC_LIBRARY_ROOT.
    root: Option<PathBuf>,

    /// Path to a configuration file (config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the download daemon reachability check
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::from_env(),
    };

    init_logging(&config.logging.filter);

    let Some(root) = args.root.clone().or_else(|| config.library.root.clone()) else {
        eprintln!("error: no library root given\n\nUsage: tvsync <ROOT> [--config <CONFIG>] [--skip-checks]");
        return ExitCode::FAILURE;
    };

    info!(root = %root.display(), bind = %config.server.bind, "tvsync starting");
    if args.skip_checks {
        warn!("Skipping download daemon check (--skip-checks enabled)");
    }

    let app = match App::new(config, root) {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to initialize");
            return ExitCode::FAILURE;
        }
    };
    info!(max_concurrent = app.plan.max_concurrent, "Scan concurrency");

    if let Err(e) = app.run(args.skip_checks).await {
        error!(error = %e, "tvsync stopped");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
