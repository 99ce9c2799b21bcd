use crate::api::{elevenlabs, openai};
use crate::captions::{CaptionBlock, CaptionGrouper};
use crate::compose;
use crate::config::Config;
use crate::error::StageError;
use crate::hook;
use crate::images;
use crate::init::{self, ProjectLayout};
use crate::overlay::{self, CaptionStyle};
use crate::resolver::{self, FfprobeMedia, MediaPools};
use crate::script::{ScriptDocument, ScriptRequest};
use crate::srt;
use crate::stock::StockFinder;
use crate::subtitle::{self, AlignmentOptions};
use crate::timing::{self, TimedWord};
use crate::{loge, logi, logok, logw};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use rand::SeedableRng;
use rand::rngs::StdRng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

const SCRIPT_ATTEMPTS: u32 = 2;
/// Shortest pause the batch runner accepts between two runs.
pub const MIN_BATCH_DELAY_SECS: u64 = 5;

pub fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn file_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

fn default_language() -> String {
    "French".to_string()
}

/// Everything one run needs from its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub project_name: String,
    pub hook_video: PathBuf,
    pub product_info: String,
    #[serde(default)]
    pub product_image: Option<PathBuf>,
    #[serde(default)]
    pub product_video: Option<PathBuf>,
    #[serde(default)]
    pub topic: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// A ready-made voiceover; TTS is skipped when both this and `voiceover_srt` are set.
    #[serde(default)]
    pub voiceover_audio: Option<PathBuf>,
    #[serde(default)]
    pub voiceover_srt: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub final_video: PathBuf,
    pub captioned: bool,
    /// Stages that completed with reduced quality.
    pub degraded: Vec<String>,
}

impl PipelineOutcome {
    pub fn is_full_success(&self) -> bool {
        self.captioned && self.degraded.is_empty()
    }
}

pub fn build_http_client(cfg: &Config) -> Result<Client> {
    let mut builder = Client::builder()
        .cookie_store(true)
        .connect_timeout(Duration::from_secs(30));
    if let Some(proxy) = cfg.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        let proxy_cfg =
            reqwest::Proxy::all(proxy).with_context(|| format!("Invalid proxy: {}", proxy))?;
        builder = builder.proxy(proxy_cfg);
        logi(format!("Using proxy {}", proxy));
    }
    builder.build().context("Failed to build HTTP client")
}

async fn generate_script(
    client: &Client,
    cfg: &Config,
    request: &RunRequest,
    hook_description: Option<&str>,
) -> Result<ScriptDocument> {
    let prompt = ScriptRequest {
        product_info: &request.product_info,
        topic: &request.topic,
        hook_description,
        language: &request.language,
        target_duration_seconds: cfg.render.target_duration_seconds,
    }
    .prompt();

    let mut last_problem = String::from("no response");
    for attempt in 1..=SCRIPT_ATTEMPTS {
        logi(format!("Requesting script ({}/{})", attempt, SCRIPT_ATTEMPTS));
        let reply = match openai::openai_generate_text(client, cfg, &prompt, true).await {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(err) => {
                last_problem = format!("{:#}", err);
                logw(format!("Script request failed: {}", last_problem));
                continue;
            }
        };
        match ScriptDocument::from_llm_response(&reply) {
            Ok(doc) => return Ok(doc),
            Err(err) => {
                last_problem = format!("{:#}", err);
                logw(format!("Script rejected: {}", last_problem));
            }
        }
    }
    Err(StageError::script(last_problem).into())
}

/// Produces `voiceover.mp3` and the spoken words, either by TTS or from a supplied
/// audio file plus SRT.
async fn produce_voiceover(
    client: &Client,
    cfg: &Config,
    request: &RunRequest,
    script: &ScriptDocument,
    layout: &ProjectLayout,
) -> Result<Vec<TimedWord>> {
    let audio = layout.voiceover_mp3();
    let words_json = layout.timed_words_json();

    let supplied = (&request.voiceover_audio, &request.voiceover_srt);
    if let (Some(supplied_audio), Some(supplied_srt)) = supplied {
        logi(format!(
            "Using supplied voiceover {} with subtitles {}",
            supplied_audio.display(),
            supplied_srt.display()
        ));
        fs::copy(supplied_audio, &audio)
            .await
            .map_err(|err| {
                StageError::voiceover(format!("{}: {}", supplied_audio.display(), err))
            })?;
        if !srt::convert_srt_to_timed_words(supplied_srt, &words_json).await? {
            let problem = format!("{} yielded no words", supplied_srt.display());
            return Err(StageError::timed_words(problem).into());
        }
        let (words, diagnostics) = timing::read_timed_words(&words_json).await?;
        for d in &diagnostics {
            logw(format!("Timed words: {}", d));
        }
        return Ok(words);
    }

    let words = elevenlabs::elevenlabs_tts_with_timestamps(client, cfg, &script.script, &audio)
        .await?
        .ok_or_else(|| StageError::voiceover("text-to-speech failed after every attempt"))?;
    timing::write_json(&words_json, &words).await?;
    logok(format!("Timed words saved: {} ({} words)", words_json.display(), words.len()));
    Ok(words)
}

/// Writes `voiceover.srt` aligned to the script text. Returns a note when the result
/// is degraded or missing.
async fn write_voiceover_subtitles(
    words: &[TimedWord],
    script: &ScriptDocument,
    layout: &ProjectLayout,
) -> Option<String> {
    let srt_path = layout.voiceover_srt();
    let doc = match subtitle::align(words, &script.script, &AlignmentOptions::default()) {
        Ok(doc) => doc,
        Err(err) => {
            logw(format!("Voiceover subtitles skipped: {}", err));
            return Some(format!("voiceover subtitles unavailable: {}", err));
        }
    };
    if let Err(err) = doc.write(&srt_path).await {
        logw(format!("Could not write {}: {:#}", srt_path.display(), err));
        return Some("voiceover subtitles not written".to_string());
    }
    if doc.is_degraded() {
        for warning in &doc.warnings {
            logw(format!("Subtitle alignment: {}", warning));
        }
        return Some(format!("voiceover subtitles best-effort ({} warnings)", doc.warnings.len()));
    }
    logok(format!("Voiceover subtitles: {} ({} entries)", srt_path.display(), doc.entries.len()));
    None
}

async fn group_captions(words: &[TimedWord], layout: &ProjectLayout) -> Result<Vec<CaptionBlock>> {
    let grouping = CaptionGrouper::default().group(words);
    if grouping.blocks.is_empty() {
        return Err(StageError::timed_words("no caption blocks could be formed").into());
    }
    timing::write_json(&layout.caption_blocks_json(), &grouping.blocks).await?;
    logok(format!(
        "Caption blocks: {} ({} blocks)",
        layout.caption_blocks_json().display(),
        grouping.blocks.len()
    ));
    Ok(grouping.blocks)
}

/// Runs one project end to end. Stage-fatal problems come back as `Err` (usually a
/// [`StageError`]); anything recoverable is logged and listed in `degraded`.
pub async fn run_pipeline(
    cfg: &Config,
    client: &Client,
    request: &RunRequest,
) -> Result<PipelineOutcome> {
    let layout = init::create_project_structure(Path::new(&request.project_name)).await?;
    let mut degraded = Vec::new();
    let mut rng = StdRng::seed_from_u64(now_seed());

    logi(format!("=== Project: {} ===", request.project_name));
    if !file_exists(&request.hook_video).await {
        logw(format!("Hook video not found: {}", request.hook_video.display()));
    }

    let hook_description = hook::get_hook_description(client, cfg, &request.hook_video).await;
    if hook_description.is_none() {
        degraded.push("hook description unavailable".to_string());
    }

    let script = generate_script(client, cfg, request, hook_description.as_deref()).await?;
    script.save(&layout.script_json()).await?;
    logok(format!(
        "Script saved: {} ({} scenes, {:.1}s)",
        layout.script_json().display(),
        script.scenes.len(),
        script.scene_duration_sum()
    ));

    let prompts = script.image_prompts();
    images::save_image_prompts(&prompts, &layout.image_prompts_json()).await?;
    let ai_images = images::generate_images(client, cfg, &prompts, &layout.images_dir()).await?;

    let stock = StockFinder::new(client, cfg)
        .find_and_download(
            &script.scenes,
            &request.product_info,
            &layout.stock_cache_dir(),
            &mut rng,
        )
        .await?;

    let words = produce_voiceover(client, cfg, request, &script, &layout).await?;
    if words.is_empty() {
        return Err(StageError::timed_words("the voiceover has no timed words").into());
    }
    if let Some(note) = write_voiceover_subtitles(&words, &script, &layout).await {
        degraded.push(note);
    }
    let blocks = group_captions(&words, &layout).await?;

    let pools = MediaPools {
        hook_clip: Some(request.hook_video.clone()),
        product_image: request.product_image.clone(),
        product_video: request.product_video.clone(),
        stock,
        ai_images,
    };
    let resolution = resolver::resolve(&script.scenes, &pools, &FfprobeMedia, &mut rng).await;
    for note in &resolution.diagnostics {
        logw(note.clone());
    }
    let placeholders = resolution.iter().filter(|m| m.placeholder.is_some()).count();
    if placeholders > 0 {
        degraded.push(format!("{} scene(s) rendered as placeholders", placeholders));
    }
    if !resolution.has_usable_scene() {
        return Err(StageError::composition("no scene resolved to usable media").into());
    }

    let composed = layout.video_no_captions();
    let ok = compose::compose_final_video(
        &resolution,
        &layout.voiceover_mp3(),
        &layout.render_dir(),
        &cfg.render,
        &composed,
    )
    .await?;
    if !ok || !file_exists(&composed).await {
        let problem = format!("{} was not produced", composed.display());
        return Err(StageError::composition(problem).into());
    }

    let final_video = layout.video_with_captions();
    let outcome = overlay::add_captions_to_video(
        &composed,
        &blocks,
        &layout.caption_blocks_srt(),
        &final_video,
        &CaptionStyle::default(),
    )
    .await;
    let captioned = outcome.is_captioned();
    if !captioned {
        logw("Captions could not be burned; the final video has none.");
        fs::copy(outcome.path(), &final_video)
            .await
            .map_err(|err| StageError::output(format!("{}: {}", final_video.display(), err)))?;
        degraded.push("captions unavailable".to_string());
    }

    let result = PipelineOutcome {
        final_video,
        captioned,
        degraded,
    };
    if result.is_full_success() {
        logok(format!("DONE: {}", result.final_video.display()));
    } else {
        logw(format!(
            "DONE (degraded: {}): {}",
            result.degraded.join("; "),
            result.final_video.display()
        ));
    }
    Ok(result)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Success,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub project_name: String,
    pub status: BatchStatus,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_video: Option<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn load_run_requests(path: &Path) -> Result<Vec<RunRequest>> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("read run list: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parse run list: {}", path.display()))
}

/// Pause between batch runs. Requests below `MIN_BATCH_DELAY_SECS` are raised to it.
pub fn batch_delay(requested_secs: u64) -> Duration {
    if requested_secs < MIN_BATCH_DELAY_SECS {
        logw(format!(
            "Batch delay of {}s is below the {}s minimum; using {}s",
            requested_secs, MIN_BATCH_DELAY_SECS, MIN_BATCH_DELAY_SECS
        ));
        return Duration::from_secs(MIN_BATCH_DELAY_SECS);
    }
    Duration::from_secs(requested_secs)
}

/// Runs `requests` one after another through `run`, sleeping `delay` between runs but
/// not after the last one.
pub async fn run_batch_with<F, Fut>(
    requests: &[RunRequest],
    delay: Duration,
    mut run: F,
) -> Vec<BatchEntry>
where
    F: FnMut(RunRequest) -> Fut,
    Fut: Future<Output = Result<PipelineOutcome>>,
{
    let mut entries = Vec::with_capacity(requests.len());
    for (i, request) in requests.iter().enumerate() {
        logi(format!("Batch run {}/{}: {}", i + 1, requests.len(), request.project_name));
        let started_at = Local::now();
        let result = run(request.clone()).await;
        let finished_at = Local::now();

        let entry = match result {
            Ok(outcome) => BatchEntry {
                project_name: request.project_name.clone(),
                status: if outcome.is_full_success() {
                    BatchStatus::Success
                } else {
                    BatchStatus::Degraded
                },
                started_at,
                finished_at,
                final_video: Some(outcome.final_video),
                degraded: outcome.degraded,
                error: None,
            },
            Err(err) => {
                loge(format!("FAILED: {}: {:#}", request.project_name, err));
                BatchEntry {
                    project_name: request.project_name.clone(),
                    status: BatchStatus::Failed,
                    started_at,
                    finished_at,
                    final_video: None,
                    degraded: Vec::new(),
                    error: Some(format!("{:#}", err)),
                }
            }
        };
        entries.push(entry);

        if i + 1 < requests.len() && !delay.is_zero() {
            logi(format!("Waiting {}s before the next run", delay.as_secs()));
            tokio::time::sleep(delay).await;
        }
    }
    entries
}

pub async fn run_batch(
    cfg: &Config,
    client: &Client,
    requests: &[RunRequest],
    delay: Duration,
) -> Vec<BatchEntry> {
    run_batch_with(requests, delay, |request| async move {
        run_pipeline(cfg, client, &request).await
    })
    .await
}

pub fn batch_summary(entries: &[BatchEntry]) -> String {
    let count = |status: BatchStatus| entries.iter().filter(|e| e.status == status).count();
    let mut out = format!(
        "Batch finished: {} run(s), {} succeeded, {} degraded, {} failed\n",
        entries.len(),
        count(BatchStatus::Success),
        count(BatchStatus::Degraded),
        count(BatchStatus::Failed)
    );
    for entry in entries {
        let detail = match (&entry.final_video, &entry.error) {
            (Some(video), _) => video.display().to_string(),
            (None, Some(err)) => err.clone(),
            (None, None) => String::new(),
        };
        out.push_str(&format!("  [{:?}] {}: {}\n", entry.status, entry.project_name, detail));
    }
    out
}

pub async fn write_batch_report(entries: &[BatchEntry], path: &Path) -> Result<()> {
    timing::write_json(path, entries).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn failed(err: StageError) -> Result<PipelineOutcome> {
        Err(err.into())
    }

    fn request(name: &str) -> RunRequest {
        serde_json::from_value(serde_json::json!({
            "project_name": name,
            "hook_video": "hooks/splash.mp4",
            "product_info": "Hydra serum",
        }))
        .unwrap()
    }

    #[test]
    fn batch_delay_never_drops_below_the_minimum() {
        let floor = Duration::from_secs(MIN_BATCH_DELAY_SECS);
        assert_eq!(batch_delay(0), floor);
        assert_eq!(batch_delay(MIN_BATCH_DELAY_SECS - 1), floor);
        assert_eq!(batch_delay(MIN_BATCH_DELAY_SECS), floor);
        assert_eq!(batch_delay(60), Duration::from_secs(60));
    }

    #[test]
    fn run_request_defaults() {
        let req = request("a");
        assert_eq!(req.language, "French");
        assert!(req.product_image.is_none());
        assert!(req.topic.is_empty());
    }

    #[tokio::test]
    async fn batch_runs_in_order_and_records_failures() {
        let requests = vec![request("one"), request("two"), request("three")];
        let started = Instant::now();
        let entries = run_batch_with(&requests, Duration::from_millis(20), |req| async move {
            match req.project_name.as_str() {
                "two" => failed(StageError::script("no scenes")),
                "three" => Ok(PipelineOutcome {
                    final_video: PathBuf::from("three/output/final_video_with_captions.mp4"),
                    captioned: false,
                    degraded: vec!["captions unavailable".to_string()],
                }),
                _ => Ok(PipelineOutcome {
                    final_video: PathBuf::from("one/output/final_video_with_captions.mp4"),
                    captioned: true,
                    degraded: Vec::new(),
                }),
            }
        })
        .await;

        assert!(started.elapsed() >= Duration::from_millis(40));
        let statuses: Vec<_> = entries.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![BatchStatus::Success, BatchStatus::Failed, BatchStatus::Degraded]
        );
        assert!(entries[1].error.as_deref().unwrap().contains("script stage failed"));
        assert!(entries.iter().all(|e| e.finished_at >= e.started_at));

        let summary = batch_summary(&entries);
        assert!(summary.contains("3 run(s), 1 succeeded, 1 degraded, 1 failed"));
    }

    #[tokio::test]
    async fn report_is_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_report.json");
        let entries = run_batch_with(&[request("solo")], Duration::from_secs(3600), |_| async {
            failed(StageError::voiceover("tts down"))
        })
        .await;
        write_batch_report(&entries, &path).await.unwrap();

        let body = fs::read_to_string(&path).await.unwrap();
        let raw: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(raw[0]["status"], "failed");
        assert_eq!(raw[0]["project_name"], "solo");
        assert!(raw[0].get("final_video").is_none());
    }
}
