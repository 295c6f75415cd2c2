//! galsync - command-line entry point
//!
//! `match` runs the incremental catalog matching, `align` the offline
//! name alignment, and `run` both in sequence. The remaining subcommands
//! are spreadsheet maintenance helpers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use galsync::aligner::{self, AlignPaths};
use galsync::pipeline::MatchPipeline;
use galsync::transforms::{self, alias, score_filter};
use galsync_common::AppConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for galsync
#[derive(Parser, Debug)]
#[command(name = "galsync")]
#[command(about = "Match a local game catalog against the YMGal archive")]
#[command(version)]
struct Args {
    /// Config file (overrides GALSYNC_CONFIG and the per-user config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Match source records against the archive, resuming from earlier output
    Match(MatchArgs),

    /// Align matched records with a local catalog by name similarity
    Align(AlignArgs),

    /// Match, then align
    Run {
        #[command(flatten)]
        matching: MatchArgs,
        #[command(flatten)]
        align: AlignArgs,
    },

    /// Replace a table's alias columns with aliases from another table
    MergeAliases {
        /// Table to update
        main: PathBuf,
        /// Table providing the aliases
        source: PathBuf,
        /// Appended to the main table's file stem
        #[arg(long, default_value = alias::DEFAULT_MERGE_SUFFIX)]
        suffix: String,
    },

    /// Keep rows whose score is above a threshold
    Filter {
        #[arg(default_value = "ymgames_matched_new.csv")]
        input: PathBuf,
        #[arg(long, default_value_t = score_filter::DEFAULT_SCORE_THRESHOLD)]
        threshold: f64,
    },

    /// Extract low-score rows that carry aliases, one alias per column
    SplitAliases {
        input: PathBuf,
        #[arg(long, default_value_t = alias::DEFAULT_SCORE_LIMIT)]
        score_limit: f64,
    },

    /// Print the effective configuration as TOML
    PrintConfig,
}

#[derive(clap::Args, Debug)]
struct MatchArgs {
    /// Source table
    #[arg(long, env = "GALSYNC_SOURCE")]
    source: Option<PathBuf>,

    /// Matched output table
    #[arg(long)]
    matched: Option<PathBuf>,

    /// Unmatched output table
    #[arg(long)]
    unmatched: Option<PathBuf>,

    /// Organization output table
    #[arg(long)]
    organizations: Option<PathBuf>,

    /// Pause between records, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,
}

#[derive(clap::Args, Debug)]
struct AlignArgs {
    /// Local catalog table to align against
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Aligned output table
    #[arg(long)]
    output: Option<PathBuf>,

    /// Minimum similarity to accept
    #[arg(long)]
    align_threshold: Option<f64>,
}

impl MatchArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(path) = self.source {
            config.files.source = path;
        }
        if let Some(path) = self.matched {
            config.align.matched = path.clone();
            config.files.matched = path;
        }
        if let Some(path) = self.unmatched {
            config.files.unmatched = path;
        }
        if let Some(path) = self.organizations {
            config.files.organizations = path;
        }
        if let Some(delay) = self.delay_ms {
            config.matching.request_delay_ms = delay;
        }
    }
}

impl AlignArgs {
    fn apply(self, config: &mut AppConfig) {
        if let Some(path) = self.catalog {
            config.align.catalog = path;
        }
        if let Some(path) = self.output {
            config.align.output = path;
        }
        if let Some(threshold) = self.align_threshold {
            config.align.threshold = threshold;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "galsync=info,galsync_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = AppConfig::load(args.config.as_deref());

    match args.command {
        Command::Match(matching) => {
            matching.apply(&mut config);
            run_match(&config).await?;
        }
        Command::Align(align) => {
            align.apply(&mut config);
            run_align(&config)?;
        }
        Command::Run { matching, align } => {
            matching.apply(&mut config);
            align.apply(&mut config);
            run_match(&config).await?;
            run_align(&config)?;
        }
        Command::MergeAliases {
            main,
            source,
            suffix,
        } => {
            let output = transforms::merge_alias_files(&main, &source, &suffix)
                .with_context(|| format!("Failed to merge aliases into {}", main.display()))?;
            info!("Updated table written to {}", output.display());
        }
        Command::Filter { input, threshold } => {
            let now = chrono::Local::now();
            match transforms::filter_file(&input, threshold, &now)
                .with_context(|| format!("Failed to filter {}", input.display()))?
            {
                Some(output) => info!("Filtered table written to {}", output.display()),
                None => info!("No rows above {}; nothing written", threshold),
            }
        }
        Command::SplitAliases { input, score_limit } => {
            let now = chrono::Local::now();
            match transforms::process_alias_file(&input, score_limit, &now)
                .with_context(|| format!("Failed to process aliases in {}", input.display()))?
            {
                Some(output) => info!("Alias table written to {}", output.display()),
                None => info!("No qualifying rows; nothing written"),
            }
        }
        Command::PrintConfig => {
            println!("{}", config.to_toml().context("Failed to serialize config")?);
        }
    }

    Ok(())
}

async fn run_match(config: &AppConfig) -> Result<()> {
    info!("Source table: {}", config.files.source.display());
    let pipeline =
        MatchPipeline::from_config(config).context("Failed to initialize catalog clients")?;
    let summary = pipeline.run().await.context("Matching run failed")?;
    info!(
        "All results saved: {} matched, {} unmatched, {} skipped of {}",
        summary.matched, summary.unmatched, summary.skipped, summary.total
    );
    Ok(())
}

fn run_align(config: &AppConfig) -> Result<()> {
    let paths = AlignPaths::from(&config.align);
    let rows = aligner::run_alignment(&paths, config.align.threshold)
        .with_context(|| format!("Failed to align {}", paths.matched.display()))?;
    info!("Alignment saved to {} ({} rows)", paths.output.display(), rows);
    Ok(())
}
