use crate::config::Config;
use crate::resolver::AiImageQueue;
use crate::script::ImagePrompt;
use crate::timing::write_json;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tokio::fs;

const GENERATIONS_URL: &str = "https://api.together.xyz/v1/images/generations";
const MODEL: &str = "black-forest-labs/FLUX.1-schnell";
const IMAGE_WIDTH: u32 = 1008;
const IMAGE_HEIGHT: u32 = 1792;
const STEPS: u32 = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptFile {
    pub prompts: Vec<String>,
}

/// Writes the non-empty prompts as `{"prompts": [...]}`.
pub async fn save_image_prompts(prompts: &[ImagePrompt], path: &Path) -> Result<PromptFile> {
    let file = PromptFile {
        prompts: prompts
            .iter()
            .map(|p| p.prompt.trim())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
    };
    write_json(path, &file).await?;
    Ok(file)
}

#[derive(Debug, Clone, PartialEq)]
enum ImagePayload {
    Url(String),
    Inline(Vec<u8>),
}

fn image_payload(root: &Value) -> Option<ImagePayload> {
    let first = root.get("data")?.as_array()?.first()?;
    if let Some(url) = first.get("url").and_then(|v| v.as_str()).filter(|u| !u.is_empty()) {
        return Some(ImagePayload::Url(url.to_string()));
    }
    let encoded = first.get("b64_json").and_then(|v| v.as_str())?;
    STANDARD.decode(encoded.as_bytes()).ok().map(ImagePayload::Inline)
}

async fn generate_one(client: &Client, key: &str, prompt: &str) -> Result<Option<Vec<u8>>> {
    let body = json!({
        "model": MODEL,
        "prompt": prompt,
        "steps": STEPS,
        "n": 1,
        "width": IMAGE_WIDTH,
        "height": IMAGE_HEIGHT,
    });

    let resp = client
        .post(GENERATIONS_URL)
        .bearer_auth(key)
        .header("accept", "application/json")
        .json(&body)
        .timeout(std::time::Duration::from_secs(60))
        .send()
        .await
        .context("Together request failed")?;
    if !resp.status().is_success() {
        logw(format!("Together image HTTP {}", resp.status().as_u16()));
        return Ok(None);
    }
    let root: Value = resp.json().await.context("Together response read failed")?;

    match image_payload(&root) {
        Some(ImagePayload::Inline(bytes)) => Ok(Some(bytes)),
        Some(ImagePayload::Url(url)) => {
            let image = client
                .get(&url)
                .timeout(std::time::Duration::from_secs(60))
                .send()
                .await
                .context("image download failed")?;
            if !image.status().is_success() {
                logw(format!("Image download HTTP {}", image.status().as_u16()));
                return Ok(None);
            }
            Ok(Some(image.bytes().await.context("image body read failed")?.to_vec()))
        }
        None => {
            logw("Together response carried no image");
            Ok(None)
        }
    }
}

/// Generates one image per prompt into `out_dir/<n>.jpeg`, n counting from 1 in prompt
/// order. The queue keeps one slot per prompt; a slot stays empty when its prompt was
/// blank or its generation failed.
pub async fn generate_images(
    client: &Client,
    cfg: &Config,
    prompts: &[ImagePrompt],
    out_dir: &Path,
) -> Result<AiImageQueue> {
    if prompts.is_empty() {
        return Ok(AiImageQueue::default());
    }
    let Some(key) = cfg.together_key() else {
        logw("No together_api_key configured; ai_image scenes will use placeholders.");
        return Ok(AiImageQueue::from_slots(vec![None; prompts.len()]));
    };
    fs::create_dir_all(out_dir)
        .await
        .with_context(|| format!("Failed to create dir {}", out_dir.display()))?;

    let mut slots: Vec<Option<PathBuf>> = Vec::with_capacity(prompts.len());
    let mut made = 0usize;
    for (i, prompt) in prompts.iter().enumerate() {
        let n = i + 1;
        if prompt.prompt.trim().is_empty() {
            logw(format!("Scene {}: empty image prompt, skipping", prompt.scene_number));
            slots.push(None);
            continue;
        }

        logi(format!("Generating image {}/{} (scene {})", n, prompts.len(), prompt.scene_number));
        let bytes = match generate_one(client, key, &prompt.prompt).await {
            Ok(Some(bytes)) if !bytes.is_empty() => bytes,
            Ok(_) => {
                slots.push(None);
                continue;
            }
            Err(err) => {
                logw(format!("Image {} failed: {:#}", n, err));
                slots.push(None);
                continue;
            }
        };

        let path = out_dir.join(format!("{}.jpeg", n));
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        made += 1;
        slots.push(Some(path));
    }

    logok(format!("Images generated: {}/{}", made, prompts.len()));
    Ok(AiImageQueue::from_slots(slots))
}
