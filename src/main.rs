//! badger - cluster photos by date, and sort by blurriness

use badger::config::{ClusterOpts, CopyOpts, MediaFilter};
use badger::services::{run_cluster, run_copy, ConsolePrompter, RunReport};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Cluster and grade large photo libraries
#[derive(Parser, Debug)]
#[command(name = "badger", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cluster photos by date, and sort by blurriness
    Cluster {
        /// Source glob
        #[arg(long, value_name = "srcglob")]
        from: String,

        /// Target directory
        #[arg(long, value_name = "dstdir")]
        to: PathBuf,

        /// Max seconds photos can be apart in order to cluster them together
        #[arg(short = 's', long, value_name = "num", default_value_t = 9.0)]
        max_seconds_diff: f64,

        /// Minimum number of media to cluster
        #[arg(short = 'm', long, value_name = "num", default_value_t = 2)]
        min_points: usize,

        /// Complete copy without manual prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Copy media matching a set of filters into a target folder
    Copy {
        /// Source glob
        #[arg(long, value_name = "srcglob")]
        from: String,

        /// Target directory
        #[arg(long, value_name = "dstdir")]
        to: PathBuf,

        /// Media kind to copy
        #[arg(long, value_enum, default_value = "all")]
        media: MediaFilter,

        /// Maximum iso for images to copy
        #[arg(long, value_name = "iso")]
        max_iso: Option<i64>,

        /// Minimum shutter speed for images to copy
        #[arg(long, value_name = "speed")]
        min_shutter_speed: Option<String>,

        /// Complete copy without manual prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here with a zero status.
            let _ = e.print();
            return if e.use_stderr() { 1 } else { 0 };
        }
    };

    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("badger={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let outcome = match cli.command {
        Command::Cluster {
            from,
            to,
            max_seconds_diff,
            min_points,
            yes,
        } => {
            let mut opts = ClusterOpts::new(from, to);
            opts.max_seconds_diff = max_seconds_diff;
            opts.min_points = min_points;
            opts.assume_yes = yes;
            run_cluster(&opts, &ConsolePrompter).await
        }
        Command::Copy {
            from,
            to,
            media,
            max_iso,
            min_shutter_speed,
            yes,
        } => {
            let mut opts = CopyOpts::new(from, to);
            opts.media = media;
            opts.max_iso = max_iso;
            opts.min_shutter_speed = min_shutter_speed;
            opts.assume_yes = yes;
            run_copy(&opts, &ConsolePrompter).await
        }
    };

    match outcome {
        Ok(report) => {
            summarise(&report);
            0
        }
        Err(e) => {
            eprintln!("badger: {}", e);
            1
        }
    }
}

fn summarise(report: &RunReport) {
    if report.declined {
        info!("nothing copied");
        return;
    }
    info!(
        copied = report.copied_files,
        bytes = report.copied_bytes,
        already_copied = report.already_copied,
        clusters = report.clusters,
        "run complete"
    );
}
