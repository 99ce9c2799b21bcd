use crate::config::Config;
use crate::timing::TimedWord;
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use tokio::fs;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE_SECS: u64 = 2;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CharacterAlignment {
    #[serde(default)]
    pub characters: Vec<String>,
    #[serde(default)]
    pub character_start_times_seconds: Vec<f64>,
    #[serde(default)]
    pub character_end_times_seconds: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct TimestampedSpeech {
    audio_base64: String,
    #[serde(default)]
    alignment: Option<CharacterAlignment>,
    #[serde(default)]
    normalized_alignment: Option<CharacterAlignment>,
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Folds per-character timings into words split on whitespace.
pub fn alignment_to_words(alignment: &CharacterAlignment) -> Vec<TimedWord> {
    let count = alignment
        .characters
        .len()
        .min(alignment.character_start_times_seconds.len())
        .min(alignment.character_end_times_seconds.len());

    let mut words = Vec::new();
    let mut text = String::new();
    let mut start = 0.0f64;
    let mut end = 0.0f64;

    let mut flush = |text: &mut String, start: f64, end: f64| {
        if !text.is_empty() {
            words.push(TimedWord::new(
                std::mem::take(text),
                round3(start),
                round3(end.max(start)),
            ));
        }
    };

    for i in 0..count {
        let ch = &alignment.characters[i];
        if ch.trim().is_empty() {
            flush(&mut text, start, end);
            continue;
        }
        if text.is_empty() {
            start = alignment.character_start_times_seconds[i];
        }
        text.push_str(ch);
        end = alignment.character_end_times_seconds[i];
    }
    flush(&mut text, start, end);

    words
}

async fn request_speech(
    client: &Client,
    cfg: &Config,
    text: &str,
) -> Result<Option<TimestampedSpeech>> {
    let url = format!(
        "https://api.elevenlabs.io/v1/text-to-speech/{}/with-timestamps?output_format=mp3_44100_128",
        cfg.eleven_voice_id
    );

    let body = serde_json::json!({
        "text": text,
        "model_id": cfg.eleven_model_id,
    });

    let resp = client
        .post(url)
        .header("Content-Type", "application/json")
        .header("xi-api-key", &cfg.elevenlabs_key)
        .json(&body)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
        .context("ElevenLabs request failed")?;

    if !resp.status().is_success() {
        logw(format!("ElevenLabs TTS failed HTTP {}", resp.status().as_u16()));
        return Ok(None);
    }

    let speech = resp
        .json::<TimestampedSpeech>()
        .await
        .context("ElevenLabs response read failed")?;
    Ok(Some(speech))
}

/// Synthesizes `text` into `out_mp3_path` and returns the spoken words with their timing.
/// `None` after every attempt failed.
pub async fn elevenlabs_tts_with_timestamps(
    client: &Client,
    cfg: &Config,
    text: &str,
    out_mp3_path: &Path,
) -> Result<Option<Vec<TimedWord>>> {
    for attempt in 1..=MAX_ATTEMPTS {
        logi(format!("ElevenLabs TTS attempt {}/{}", attempt, MAX_ATTEMPTS));
        let speech = match request_speech(client, cfg, text).await {
            Ok(Some(speech)) => speech,
            Ok(None) => {
                pause_before_retry(attempt).await;
                continue;
            }
            Err(err) => {
                logw(format!("ElevenLabs attempt {} failed: {:#}", attempt, err));
                pause_before_retry(attempt).await;
                continue;
            }
        };

        let audio = match STANDARD.decode(speech.audio_base64.as_bytes()) {
            Ok(audio) if !audio.is_empty() => audio,
            _ => {
                logw("ElevenLabs returned no decodable audio");
                pause_before_retry(attempt).await;
                continue;
            }
        };

        let alignment = speech
            .alignment
            .or(speech.normalized_alignment)
            .unwrap_or_default();
        let words = alignment_to_words(&alignment);
        if words.is_empty() {
            logw("ElevenLabs returned no character alignment");
            pause_before_retry(attempt).await;
            continue;
        }

        if let Some(parent) = out_mp3_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(out_mp3_path, &audio)
            .await
            .with_context(|| format!("write {}", out_mp3_path.display()))?;

        logok(format!(
            "Voiceover saved: {} ({} words)",
            out_mp3_path.display(),
            words.len()
        ));
        return Ok(Some(words));
    }

    Ok(None)
}

async fn pause_before_retry(attempt: u32) {
    if attempt < MAX_ATTEMPTS {
        tokio::time::sleep(std::time::Duration::from_secs(RETRY_PAUSE_SECS)).await;
    }
}
