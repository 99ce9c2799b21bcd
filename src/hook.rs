use crate::api::openai;
use crate::config::Config;
use crate::ffmpeg;
use crate::{logi, logok, logw};
use reqwest::Client;
use std::path::{Path, PathBuf};
use tokio::fs;

const FRAME_AT_SECONDS: f64 = 1.0;
const DESCRIBE_PROMPT: &str = "This frame comes from a video used as the opening hook of a TikTok video. \
Describe the key visual elements, actions and overall mood in one or two concise sentences. \
Focus on what makes it engaging.";

pub fn description_cache_path(hook: &Path) -> PathBuf {
    hook.with_extension("txt")
}

async fn read_cached(cache: &Path) -> Option<String> {
    let text = fs::read_to_string(cache).await.ok()?;
    let text = text.trim();
    if text.is_empty() {
        logw(format!("Cached hook description {} is empty; describing again", cache.display()));
        return None;
    }
    Some(text.to_string())
}

/// One-sentence description of the hook video, cached beside it as `<hook>.txt`.
/// `None` when the hook is missing or could not be described.
pub async fn get_hook_description(client: &Client, cfg: &Config, hook: &Path) -> Option<String> {
    if !fs::metadata(hook).await.map(|m| m.is_file()).unwrap_or(false) {
        logw(format!("Hook video not found: {}", hook.display()));
        return None;
    }

    let cache = description_cache_path(hook);
    if let Some(text) = read_cached(&cache).await {
        logi(format!("Hook description loaded from {}", cache.display()));
        return Some(text);
    }

    let frame = std::env::temp_dir().join(format!("promo_shorts_hook_{}.jpg", std::process::id()));
    let extracted = match ffmpeg::ffmpeg_extract_frame(hook, FRAME_AT_SECONDS, &frame).await {
        Ok(true) => true,
        // Very short hooks have no frame at 1 s.
        _ => ffmpeg::ffmpeg_extract_frame(hook, 0.0, &frame).await.unwrap_or(false),
    };
    if !extracted {
        logw(format!("Could not extract a frame from {}", hook.display()));
        return None;
    }
    let jpeg = fs::read(&frame).await;
    let _ = fs::remove_file(&frame).await;
    let jpeg = match jpeg {
        Ok(jpeg) => jpeg,
        Err(err) => {
            logw(format!("Could not read extracted frame: {}", err));
            return None;
        }
    };

    let reply = openai::openai_describe_image(client, cfg, DESCRIBE_PROMPT, &jpeg).await;
    let description = match reply {
        Ok(Some(text)) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            logw("Hook description came back empty");
            return None;
        }
        Err(err) => {
            logw(format!("Hook description failed: {:#}", err));
            return None;
        }
    };

    match fs::write(&cache, &description).await {
        Ok(()) => logok(format!("Hook description cached: {}", cache.display())),
        Err(err) => logw(format!("Could not cache hook description {}: {}", cache.display(), err)),
    }
    Some(description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_sits_beside_the_hook() {
        assert_eq!(
            description_cache_path(Path::new("/media/hooks/splash.mp4")),
            PathBuf::from("/media/hooks/splash.txt")
        );
    }

    #[tokio::test]
    async fn cached_description_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let hook = dir.path().join("hook.mp4");
        fs::write(&hook, b"not really a video").await.unwrap();
        fs::write(description_cache_path(&hook), "  A splash of water.\n").await.unwrap();

        let cfg: Config = serde_json::from_str(r#"{"openai_api_key": "k", "elevenlabs_api_key": "e"}"#).unwrap();
        let described = get_hook_description(&Client::new(), &cfg, &hook).await;
        assert_eq!(described.as_deref(), Some("A splash of water."));
    }

    #[tokio::test]
    async fn missing_hook_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Config = serde_json::from_str(r#"{"openai_api_key": "k", "elevenlabs_api_key": "e"}"#).unwrap();
        let missing = dir.path().join("nope.mp4");
        assert!(get_hook_description(&Client::new(), &cfg, &missing).await.is_none());
    }
}
