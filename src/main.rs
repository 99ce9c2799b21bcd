use clap::Parser;
use promo_shorts::config::{Config, DEFAULT_CONFIG_FILE};
use promo_shorts::generator::{self, RunRequest};
use promo_shorts::init;
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Generates one promotional short: script, voiceover, visuals, captions.
#[derive(Debug, Parser)]
#[command(name = "promo-shorts", version)]
struct Args {
    /// Project directory to create or reuse.
    #[arg(long)]
    name: String,

    /// Opening hook video.
    #[arg(long)]
    hook: PathBuf,

    /// Product name and description.
    #[arg(long)]
    product: String,

    #[arg(long)]
    product_image: Option<PathBuf>,

    #[arg(long)]
    product_video: Option<PathBuf>,

    #[arg(long, default_value = "")]
    topic: String,

    #[arg(long, default_value = "French")]
    language: String,

    /// Use this voiceover instead of text-to-speech (needs --voiceover-srt).
    #[arg(long, requires = "voiceover_srt")]
    voiceover: Option<PathBuf>,

    #[arg(long, requires = "voiceover")]
    voiceover_srt: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config_path = Config::locate(&args.config).unwrap_or_else(|| args.config.clone());
    let cfg = match Config::load(&config_path).await {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("[ERROR] {:#}", err);
            std::process::exit(1);
        }
    };
    promo_shorts::init_logging(&cfg.log_level);

    if !init::check_ffmpeg().await {
        error!("FFmpeg not found in PATH. Please install FFmpeg.");
        std::process::exit(1);
    }

    let client = match generator::build_http_client(&cfg) {
        Ok(client) => client,
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(1);
        }
    };

    let request = RunRequest {
        project_name: args.name,
        hook_video: args.hook,
        product_info: args.product,
        product_image: args.product_image,
        product_video: args.product_video,
        topic: args.topic,
        language: args.language,
        voiceover_audio: args.voiceover,
        voiceover_srt: args.voiceover_srt,
    };

    match generator::run_pipeline(&cfg, &client, &request).await {
        Ok(outcome) if outcome.is_full_success() => {
            info!("Final video: {}", outcome.final_video.display());
        }
        Ok(outcome) => {
            warn!(
                "Final video (degraded: {}): {}",
                outcome.degraded.join("; "),
                outcome.final_video.display()
            );
        }
        Err(err) => {
            error!("Run failed: {:#}", err);
            std::process::exit(1);
        }
    }
}
