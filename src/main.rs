use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use anchorkeeper::{AutotrustAnchors, AutotrustConfig};

/// Load RFC 5011 trust anchor files and report their state
#[derive(Parser, Debug)]
#[command(name = "anchorkeeper", version)]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Trust anchor file to manage, in addition to ANCHORKEEPER_ANCHOR_FILES
    #[arg(short = 'c', long = "anchor-file", value_name = "FILE")]
    anchor_files: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut config = match AutotrustConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    config.anchor_files.extend(args.anchor_files);

    if config.anchor_files.is_empty() {
        error!("No trust anchor files given; use -c FILE or ANCHORKEEPER_ANCHOR_FILES");
        return ExitCode::FAILURE;
    }

    let anchors = AutotrustAnchors::new(config);
    let report = anchors.load_configured();
    info!(
        "Loaded {} trust points, {} files without state, {} failed",
        report.loaded.len(),
        report.empty.len(),
        report.failed.len()
    );
    anchors.debug_print();

    if report.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
