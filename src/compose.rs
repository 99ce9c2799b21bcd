use crate::config::RenderSettings;
use crate::ffmpeg;
use crate::resolver::{PlaceholderReason, Resolution};
use crate::{loge, logi, logok, logw};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

const AV_DRIFT_WARN_SECONDS: f64 = 0.5;

pub async fn clear_directory_contents(dir: &Path) -> Result<bool> {
    if fs::metadata(dir).await.is_err() {
        fs::create_dir_all(dir).await?;
        return Ok(true);
    }

    let mut ok = true;
    for entry in WalkDir::new(dir).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => {
                ok = false;
                continue;
            }
        };
        let path = entry.path();
        let removed = if entry.file_type().is_dir() {
            fs::remove_dir(path).await
        } else {
            fs::remove_file(path).await
        };
        if removed.is_err() {
            ok = false;
        }
    }
    Ok(ok)
}

/// Concat-demuxer list naming each clip relative to the list's own directory.
pub fn concat_list(list_dir: &Path, clips: &[PathBuf]) -> String {
    let mut out = String::new();
    for clip in clips {
        let name = pathdiff::diff_paths(clip, list_dir).unwrap_or_else(|| clip.clone());
        let name = name.to_string_lossy().replace('\\', "/").replace('\'', "'\\''");
        out.push_str(&format!("file '{}'\n", name));
    }
    out
}

/// Renders every resolved scene, joins them in scene order and lays the voiceover under
/// the result. Returns `Ok(false)` when no usable video came out.
pub async fn compose_final_video(
    resolution: &Resolution,
    audio: &Path,
    work_dir: &Path,
    render: &RenderSettings,
    out_mp4: &Path,
) -> Result<bool> {
    if resolution.media.is_empty() {
        loge("No scenes to compose.");
        return Ok(false);
    }

    if !clear_directory_contents(work_dir).await? {
        logw(format!("Could not fully clear {} (continuing anyway)", work_dir.display()));
    }

    let mut clips = Vec::with_capacity(resolution.media.len());
    let mut errored = 0usize;
    for media in resolution.iter() {
        let clip = work_dir.join(format!("scene_{:03}.mp4", media.scene_number));
        logi(format!(
            "Rendering scene {} ({:.2}s) -> {}",
            media.scene_number,
            media.duration_seconds,
            clip.display()
        ));

        let rendered = match ffmpeg::ffmpeg_render_scene(media, render, &clip).await {
            Ok(done) => done,
            Err(err) => {
                logw(format!("Scene {} render failed: {}", media.scene_number, err));
                false
            }
        };

        if media.is_error() || !rendered {
            errored += 1;
        }
        if !rendered {
            let fallback = ffmpeg::ffmpeg_render_placeholder(
                media.duration_seconds,
                PlaceholderReason::Error,
                render,
                &clip,
            )
            .await
            .with_context(|| format!("placeholder for scene {}", media.scene_number))?;
            if !fallback {
                anyhow::bail!(
                    "could not render even a placeholder for scene {}",
                    media.scene_number
                );
            }
        }
        clips.push(clip);
    }

    if errored == clips.len() {
        loge("Every scene failed; refusing to assemble an all-error video.");
        return Ok(false);
    }

    let list_path = work_dir.join("concat_list.txt");
    let mut listf = fs::File::create(&list_path).await?;
    listf.write_all(concat_list(work_dir, &clips).as_bytes()).await?;
    listf.flush().await?;

    let silent = work_dir.join("concat_silent.mp4");
    logi(format!("Concatenating {} scenes -> {}", clips.len(), silent.display()));
    if !ffmpeg::ffmpeg_concat_videos(&list_path, &silent).await? {
        loge("Scene concat failed.");
        return Ok(false);
    }

    let video_dur = ffmpeg::ffprobe_duration_seconds(&silent)
        .await
        .unwrap_or_else(|_| resolution.total_duration());
    match ffmpeg::ffprobe_duration_seconds(audio).await {
        Ok(audio_dur) if (audio_dur - video_dur).abs() > AV_DRIFT_WARN_SECONDS => logw(format!(
            "Video ({:.2}s) and voiceover ({:.2}s) lengths differ; the video length is kept",
            video_dur, audio_dur
        )),
        Ok(_) => {}
        Err(err) => logw(format!("Could not probe voiceover length: {}", err)),
    }

    if let Some(parent) = out_mp4.parent() {
        fs::create_dir_all(parent).await?;
    }
    if !ffmpeg::ffmpeg_mux_audio(&silent, audio, video_dur, out_mp4).await? {
        loge("Muxing voiceover failed.");
        return Ok(false);
    }

    logok(format!(
        "Composed {} scenes ({} with errors), {:.2}s -> {}",
        clips.len(),
        errored,
        video_dur,
        out_mp4.display()
    ));
    Ok(true)
}
