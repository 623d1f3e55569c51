//! CLI entry point for the index mirror.

use anyhow::{Context, Result};
use clap::Parser;
use index_mirror::crawl::{Mirror, MirrorReport};
use tracing::{debug, info};

mod cli;

use cli::Args;

fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let config = args.to_config();
    config.validate()?;
    let root = config.root_url()?;
    let workers = config.worker_threads();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
        .context("failed to build async runtime")?;
    info!(workers, root = %root, destination = %config.destination.display(), "index-mirror starting");

    let outcome = runtime.block_on(async {
        let mirror = Mirror::from_config(&config)?;
        mirror.run(&root).await
    });
    runtime.shutdown_background();
    let report = outcome?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &MirrorReport) {
    if report.files.is_empty() {
        println!("No files were uploaded");
        return;
    }
    println!("{} files were uploaded:", report.files.len());
    for path in &report.files {
        println!("\t{}", path.display());
    }
}
