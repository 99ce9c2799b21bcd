use anyhow::Result;
use clap::Parser;
use promo_shorts::config::{Config, DEFAULT_CONFIG_FILE};
use promo_shorts::{generator, init};
use std::path::PathBuf;
use tracing::{info, warn};

/// Runs a JSON list of promo-shorts requests one after another.
#[derive(Debug, Parser)]
#[command(name = "promo-shorts-batch", version)]
struct Args {
    /// JSON array of run requests.
    #[arg(long, default_value = "runs.json")]
    list: PathBuf,

    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Pause between runs, in seconds. Values under the 5 s minimum are raised to it.
    #[arg(long, default_value_t = 60)]
    delay_secs: u64,

    #[arg(long, default_value = "batch_report.json")]
    report: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = Config::locate(&args.config).unwrap_or_else(|| args.config.clone());
    let cfg = Config::load(&config_path).await?;
    promo_shorts::init_logging(&cfg.log_level);

    if !init::check_ffmpeg().await {
        warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let requests = generator::load_run_requests(&args.list).await?;
    info!("Loaded {} run(s) from {}", requests.len(), args.list.display());

    let client = generator::build_http_client(&cfg)?;
    let delay = generator::batch_delay(args.delay_secs);
    let entries = generator::run_batch(&cfg, &client, &requests, delay).await;

    print!("{}", generator::batch_summary(&entries));
    generator::write_batch_report(&entries, &args.report).await?;
    info!("Batch report written to {}", args.report.display());

    let failed = entries
        .iter()
        .filter(|e| e.status == generator::BatchStatus::Failed)
        .count();
    std::process::exit(if failed == 0 { 0 } else { 1 });
}
