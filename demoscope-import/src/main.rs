//! `demoscope`: import event-log files and print the reconciled matches.
//!
//! ```text
//! demoscope --config demoscope.toml --pretty demos/*.json > report.json
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use demoscope_import::{import_files, ImportConfig};

#[derive(Parser, Debug)]
#[command(name = "demoscope")]
#[command(about = "Reconstruct scores, ratings and win probability from match event logs")]
struct Args {
    /// Event-log JSON files to import
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Importer configuration (TOML)
    #[arg(long, env = "DEMOSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the per-file timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Override the number of files parsed at once
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// Write the report to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long, default_value = "false")]
    pretty: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "DEMOSCOPE_JSON_LOGS", default_value = "false")]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "demoscope=info,demoscope_import=info,demoscope_core=info".into());
    let plain = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let structured = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = match &args.config {
        Some(path) => ImportConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ImportConfig::default(),
    };
    if let Some(ms) = args.timeout_ms {
        config.timeout_ms = ms;
    }
    if let Some(n) = args.max_concurrency {
        config.max_concurrency = n;
    }

    let report = import_files(args.paths, Arc::new(config)).await;

    let body = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    match &args.output {
        Some(path) => {
            tokio::fs::write(path, body)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{body}"),
    }

    if report.succeeded() == 0 {
        anyhow::bail!("none of the {} input files could be imported", report.failed());
    }
    Ok(())
}
