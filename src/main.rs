use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use etl_pipeline::logging;
use etl_pipeline::stages::{CsvFileSource, RecordSource, SampleSource};
use etl_pipeline::{EtlPipeline, PipelineConfig, PipelineRun, StageStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "etl_pipeline")]
#[command(about = "Extract, transform, load and validate customer purchase data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Pipeline configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "etl_pipeline.toml")]
    config: PathBuf,

    /// Override the data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run extract -> transform -> load -> validate once
    Run {
        /// Extract from this CSV file instead of the built-in sample customers
        #[arg(long)]
        source: Option<PathBuf>,
    },
    /// Print the stage dependency layers
    Graph,
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?
        .apply_env_overrides()
        .context("applying environment overrides")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    Ok(config)
}

fn print_summary(run: &PipelineRun) {
    println!("\n📊 Run {} of {}:", run.run_id, run.pipeline);
    for stage in &run.stages {
        let icon = match stage.status {
            StageStatus::Succeeded => "✅",
            StageStatus::Failed => "❌",
            StageStatus::Skipped => "⏭️ ",
        };
        let records = stage
            .records
            .map(|n| format!(", {n} records"))
            .unwrap_or_default();
        println!(
            "   {} {} ({} attempt(s){}) {}",
            icon, stage.stage_id, stage.attempts, records, stage.message
        );
        if let Some(err) = &stage.error {
            println!("      {}", err);
        }
    }
    for (key, entry) in &run.metadata {
        println!("   {} = {} (from {})", key, entry.value, entry.stage_id);
    }
    let elapsed = run.finished_at - run.started_at;
    println!("   Finished in {} ms", elapsed.num_milliseconds());
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let _guard = logging::init_logging(&config.data_dir.join("logs"));

    match &cli.command {
        Commands::Run { source } => {
            let source: Arc<dyn RecordSource> = match source {
                Some(path) => Arc::new(CsvFileSource::new(path)),
                None => Arc::new(SampleSource),
            };
            let pipeline =
                EtlPipeline::new(config, source).context("building the ETL pipeline")?;

            println!("🚀 Running {}...", pipeline.config().name);
            let run = pipeline.run().await;
            print_summary(&run);

            if !run.is_validated() {
                error!("Pipeline run {} failed", run.run_id);
                let summary = run.failure_summary().unwrap_or_default();
                anyhow::bail!("pipeline run failed:\n{summary}");
            }
            info!("Pipeline run {} validated", run.run_id);
            println!("✅ All record counts match");
        }
        Commands::Graph => {
            let pipeline = EtlPipeline::with_sample_data(config)?;
            for (i, layer) in pipeline.graph().layers().iter().enumerate() {
                println!("{}: {}", i, layer.join(", "));
            }
        }
        Commands::ShowConfig => {
            let rendered = toml::to_string_pretty(&config).context("rendering config")?;
            print!("{rendered}");
        }
    }
    Ok(())
}
