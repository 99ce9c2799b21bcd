use crate::config::Config;
use crate::{logi, logw};
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde_json::{Value, json};

const RESPONSES_URL: &str = "https://api.openai.com/v1/responses";
const REQUEST_TIMEOUT_SECS: u64 = 600;
const RAW_SNIPPET_CHARS: usize = 800;

pub(crate) fn openai_extract_output_text(resp_json: &str) -> Option<String> {
    let root: Value = serde_json::from_str(resp_json).ok()?;

    if let Some(err) = root.get("error").filter(|e| !e.is_null()) {
        for field in ["message", "type", "code"] {
            if let Some(value) = err.get(field).and_then(|v| v.as_str()) {
                logw(format!("OpenAI error {}: {}", field, value));
            }
        }
        return None;
    }

    let output = root.get("output")?.as_array()?;
    for item in output {
        let Some(content) = item.get("content").and_then(|v| v.as_array()) else {
            continue;
        };
        for entry in content {
            let typ = entry.get("type").and_then(|v| v.as_str());
            if typ != Some("output_text") {
                continue;
            }
            if let Some(text) = entry.get("text").and_then(|v| v.as_str()) {
                return Some(text.to_string());
            }
        }
    }

    None
}

fn log_raw_body(raw: &str) {
    if !raw.is_empty() {
        let snippet = raw.chars().take(RAW_SNIPPET_CHARS).collect::<String>();
        logw(format!("OpenAI raw body: {}", snippet));
    }
}

async fn send_responses_request(
    client: &Client,
    cfg: &Config,
    body: &Value,
) -> Result<Option<String>> {
    let resp = client
        .post(RESPONSES_URL)
        .bearer_auth(&cfg.openai_key)
        .json(body)
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .send()
        .await
        .context("OpenAI request failed")?;

    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();

    if !status.is_success() {
        logw(format!("OpenAI HTTP {}", status.as_u16()));
        log_raw_body(&raw);
        return Ok(None);
    }

    let text = openai_extract_output_text(&raw);
    if text.is_none() {
        logw("OpenAI response parse failed.");
        log_raw_body(&raw);
    }
    Ok(text)
}

/// Sends one prompt and returns the model's text. With `json_mode` the model is asked
/// for a single JSON object.
pub async fn openai_generate_text(
    client: &Client,
    cfg: &Config,
    prompt: &str,
    json_mode: bool,
) -> Result<Option<String>> {
    let system = if json_mode {
        "You are a helpful assistant designed to output JSON."
    } else {
        "You are a helpful assistant."
    };
    let mut body = json!({
        "model": cfg.openai_model,
        "input": [
            {"role": "system", "content": system},
            {"role": "user", "content": prompt},
        ],
    });
    if json_mode {
        body["text"] = json!({"format": {"type": "json_object"}});
    }

    logi(format!("OpenAI request ({} chars, model {})", prompt.len(), cfg.openai_model));
    send_responses_request(client, cfg, &body).await
}

pub async fn openai_describe_image(
    client: &Client,
    cfg: &Config,
    prompt: &str,
    jpeg: &[u8],
) -> Result<Option<String>> {
    let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg));
    let body = json!({
        "model": cfg.openai_model,
        "input": [{
            "role": "user",
            "content": [
                {"type": "input_text", "text": prompt},
                {"type": "input_image", "image_url": data_url},
            ],
        }],
    });

    logi(format!("OpenAI image description request ({} bytes)", jpeg.len()));
    send_responses_request(client, cfg, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_output_text() {
        let raw = r#"{"output": [
            {"type": "reasoning", "content": []},
            {"type": "message", "content": [{"type": "output_text", "text": "{\"ok\":true}"}]}
        ]}"#;
        assert_eq!(openai_extract_output_text(raw).as_deref(), Some("{\"ok\":true}"));
    }

    #[test]
    fn error_payload_yields_none() {
        let raw = r#"{"error": {"message": "bad key", "type": "invalid_request_error"}}"#;
        assert_eq!(openai_extract_output_text(raw), None);
        assert_eq!(openai_extract_output_text("not json"), None);
    }
}
