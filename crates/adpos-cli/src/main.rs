use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adpos_pipeline::{summarize_recent_runs, AnalysisPipeline, PipelineConfig, RunInputs};

#[derive(Debug, Parser)]
#[command(name = "adpos")]
#[command(about = "Match detected ad airings to broadcast schedule positions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one analysis over an ad log and its two schedule tables.
    Run(RunArgs),
    /// Summarize the most recent runs in the workspace.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
        #[arg(long, env = "ADPOS_WORKSPACE", default_value = ".")]
        workspace: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Detected ad events table.
    #[arg(long, env = "ADPOS_ADS")]
    ads: PathBuf,
    /// Slot-level (inclusive) schedule table.
    #[arg(long, env = "ADPOS_INCLUSIVE")]
    inclusive: PathBuf,
    /// Content-level (exclusive) schedule table.
    #[arg(long, env = "ADPOS_EXCLUSIVE")]
    exclusive: PathBuf,
    #[arg(long, env = "ADPOS_OFFSET_SECONDS", allow_negative_numbers = true)]
    offset_seconds: Option<String>,
    #[arg(long, env = "ADPOS_BUFFER_SECONDS")]
    buffer_seconds: Option<String>,
    /// Minutes to look ahead when an ad falls between slots; `off` disables.
    #[arg(long, env = "ADPOS_GAP_TOLERANCE_MINUTES")]
    gap_tolerance_minutes: Option<String>,
    /// Broadcast-day start cutoff, `HH:MM`.
    #[arg(long, env = "ADPOS_DAY_START")]
    day_start: Option<String>,
    /// Comma separated Non-PR keywords; an empty value disables the filter.
    #[arg(long, env = "ADPOS_NON_PR_KEYWORDS")]
    keywords: Option<String>,
    #[arg(long, env = "ADPOS_WORKSPACE", default_value = ".")]
    workspace: PathBuf,
}

impl RunArgs {
    /// Flag values keyed the way the environment layer names them.
    fn setting(&self, key: &str) -> Option<String> {
        match key {
            "ADPOS_OFFSET_SECONDS" => self.offset_seconds.clone(),
            "ADPOS_BUFFER_SECONDS" => self.buffer_seconds.clone(),
            "ADPOS_GAP_TOLERANCE_MINUTES" => self.gap_tolerance_minutes.clone(),
            "ADPOS_DAY_START" => self.day_start.clone(),
            "ADPOS_NON_PR_KEYWORDS" => self.keywords.clone(),
            _ => None,
        }
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        PipelineConfig::from_lookup(&self.workspace, |key| self.setting(key))
    }

    fn inputs(&self) -> RunInputs {
        RunInputs {
            ads: self.ads.clone(),
            inclusive: self.inclusive.clone(),
            exclusive: self.exclusive.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adpos_core=info,adpos_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let config = args.pipeline_config()?;
            info!(
                workspace = %config.workspace_root.display(),
                offset_seconds = config.match_config.offset_seconds,
                buffer_seconds = config.match_config.boundary_buffer_seconds,
                "starting analysis run"
            );
            let summary = AnalysisPipeline::new(config)?
                .run_once(&args.inputs())
                .await?;
            println!(
                "run complete: run_id={} date={} rows={} reports={}",
                summary.run_id, summary.reference_date, summary.rows, summary.reports_dir
            );
            println!(
                "needs review={} non_pr={} placeholders={}",
                summary.stats.unmatched, summary.stats.non_pr, summary.stats.synthesized
            );
        }
        Commands::Report { runs, workspace } => {
            let digest = summarize_recent_runs(runs, &workspace.join("reports"))?;
            println!("{digest}");
        }
    }

    Ok(())
}
