use tracing_subscriber::EnvFilter;

pub mod api;
pub mod captions;
pub mod compose;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod generator;
pub mod hook;
pub mod images;
pub mod init;
pub mod keys;
pub mod overlay;
pub mod resolver;
pub mod script;
pub mod srt;
pub mod stock;
pub mod subtitle;
pub mod timing;

/// Installs the fmt subscriber. `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "ERROR" => tracing::error!(tag, "{}", message),
        "WARN" => tracing::warn!(tag, "{}", message),
        _ => tracing::info!(tag, "{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}

pub(crate) fn loge(message: impl AsRef<str>) {
    logv("ERROR", message.as_ref());
}
