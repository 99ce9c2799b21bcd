use crate::config::{ReframeMode, RenderSettings};
use crate::resolver::{MediaKind, PlaceholderReason, ResolvedMedia};
use crate::timing::ClipFit;
use crate::{logi, logw};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

const PLACEHOLDER_COLOR: &str = "black";
const ERROR_COLOR: &str = "0x8b0000";

async fn run_cmd(args: &[String]) -> Result<()> {
    run_cmd_in(args, None).await
}

async fn run_cmd_in(args: &[String], dir: Option<&Path>) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }
    if let Some(dir) = dir {
        cmd.current_dir(dir);
    }

    let status = cmd.status().await.context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

fn base_args() -> Vec<String> {
    ["ffmpeg", "-y", "-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn push_video_encode(args: &mut Vec<String>) {
    args.extend(
        [
            "-c:v", "libx264", "-pix_fmt", "yuv420p", "-preset", "veryfast", "-crf", "22",
        ]
        .into_iter()
        .map(str::to_string),
    );
}

fn secs(v: f64) -> String {
    format!("{:.3}", v)
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

pub async fn ffmpeg_extract_frame(video: &Path, at_seconds: f64, out_jpg: &Path) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-ss".to_string(),
        secs(at_seconds.max(0.0)),
        "-i".to_string(),
        video.display().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        out_jpg.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_jpg.exists())
}

/// Filter chain from `[0:v]` to a `width`x`height` frame, without the input/output labels.
pub fn reframe_filter(render: &RenderSettings) -> String {
    let (w, h) = (render.width, render.height);
    match render.reframe {
        ReframeMode::Letterbox => format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1"
        ),
        ReframeMode::BlurredBackground => format!(
            "split=2[bg][fg];[bg]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},gblur=sigma={sigma}[bgb];\
             [fg]scale={w}:{h}:force_original_aspect_ratio=decrease[fgs];[bgb][fgs]overlay=(W-w)/2:(H-h)/2,setsar=1",
            sigma = render.blur_sigma
        ),
    }
}

fn ken_burns_filter(render: &RenderSettings, seconds: f64) -> String {
    let frames = ((seconds * render.fps as f64).round() as u64).max(1);
    format!(
        "zoompan=z='1+{:.4}*on/{}':x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)':d=1:s={}x{}:fps={}",
        render.ken_burns_zoom - 1.0,
        frames,
        render.width,
        render.height,
        render.fps
    )
}

/// Arguments that render one resolved scene to a silent clip of exactly its slot length.
pub fn scene_render_args(
    media: &ResolvedMedia,
    render: &RenderSettings,
    out_mp4: &Path,
) -> Vec<String> {
    let source = media
        .source_path
        .as_ref()
        .filter(|_| media.kind != MediaKind::Placeholder);
    let Some(source) = source else {
        let reason = media.placeholder.unwrap_or(PlaceholderReason::Missing);
        return placeholder_args(media.duration_seconds, reason, render, out_mp4);
    };
    let source = source.display().to_string();
    let slot = media.duration_seconds;

    let mut args = base_args();
    let mut chain = reframe_filter(render);
    match media.fit {
        ClipFit::Trim { play } => {
            args.extend(["-t".to_string(), secs(play), "-i".to_string(), source]);
        }
        ClipFit::Loop { .. } => {
            args.extend([
                "-stream_loop".to_string(),
                media.fit.extra_loops().to_string(),
                "-i".to_string(),
                source,
            ]);
        }
        ClipFit::Still { seconds } => {
            args.extend([
                "-loop".to_string(),
                "1".to_string(),
                "-framerate".to_string(),
                render.fps.to_string(),
                "-t".to_string(),
                secs(seconds),
                "-i".to_string(),
                source,
            ]);
            if render.ken_burns {
                chain.push(',');
                chain.push_str(&ken_burns_filter(render, seconds));
            }
        }
        ClipFit::Blank { .. } => {
            return placeholder_args(slot, PlaceholderReason::Missing, render, out_mp4);
        }
    }

    let hold = media.hold_seconds();
    if hold > 0.0005 {
        chain.push_str(&format!(",tpad=stop_mode=clone:stop_duration={}", secs(hold)));
    }
    chain.push_str(&format!(",fps={}", render.fps));

    args.extend([
        "-filter_complex".to_string(),
        format!("[0:v]{}[v]", chain),
        "-map".to_string(),
        "[v]".to_string(),
        "-an".to_string(),
        "-t".to_string(),
        secs(slot),
    ]);
    push_video_encode(&mut args);
    args.push(out_mp4.display().to_string());
    args
}

pub fn placeholder_args(
    seconds: f64,
    reason: PlaceholderReason,
    render: &RenderSettings,
    out_mp4: &Path,
) -> Vec<String> {
    let color = match reason {
        PlaceholderReason::Missing => PLACEHOLDER_COLOR,
        PlaceholderReason::Error => ERROR_COLOR,
    };
    let mut args = base_args();
    args.extend([
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "color=c={}:s={}x{}:r={}:d={}",
            color,
            render.width,
            render.height,
            render.fps,
            secs(seconds)
        ),
        "-an".to_string(),
        "-t".to_string(),
        secs(seconds),
    ]);
    push_video_encode(&mut args);
    args.push(out_mp4.display().to_string());
    args
}

pub async fn ffmpeg_render_scene(
    media: &ResolvedMedia,
    render: &RenderSettings,
    out_mp4: &Path,
) -> Result<bool> {
    let args = scene_render_args(media, render, out_mp4);
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

pub async fn ffmpeg_render_placeholder(
    seconds: f64,
    reason: PlaceholderReason,
    render: &RenderSettings,
    out_mp4: &Path,
) -> Result<bool> {
    let args = placeholder_args(seconds, reason, render, out_mp4);
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, out_mp4: &Path) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-an".to_string(),
    ]);
    push_video_encode(&mut args);
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Lays the voiceover under the video. The video's length wins.
pub async fn ffmpeg_mux_audio(
    video_in: &Path,
    audio_in: &Path,
    video_seconds: f64,
    out_mp4: &Path,
) -> Result<bool> {
    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        video_in.display().to_string(),
        "-i".to_string(),
        audio_in.display().to_string(),
        "-map".to_string(),
        "0:v:0".to_string(),
        "-map".to_string(),
        "1:a:0".to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-t".to_string(),
        secs(video_seconds),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ]);
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

/// Escapes a value for use inside a single-quoted filter option.
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '\'' | ':') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Burns an SRT file into the video. ffmpeg runs from the subtitle's directory so the
/// filter only sees a bare file name.
pub async fn ffmpeg_burn_subtitles(
    video_in: &Path,
    srt: &Path,
    force_style: &str,
    out_mp4: &Path,
) -> Result<bool> {
    let srt_dir = srt
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let srt_name = srt
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("subtitle path has no file name")?;
    let video_abs = std::path::absolute(video_in).context("resolve input video path")?;
    let out_abs = std::path::absolute(out_mp4).context("resolve output video path")?;

    let filter = format!(
        "subtitles=filename='{}':force_style='{}'",
        escape_filter_value(&srt_name),
        escape_filter_value(force_style)
    );

    let mut args = base_args();
    args.extend([
        "-i".to_string(),
        video_abs.display().to_string(),
        "-vf".to_string(),
        filter,
    ]);
    push_video_encode(&mut args);
    args.extend([
        "-c:a".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_abs.display().to_string(),
    ]);

    logi(format!("Burning subtitles {} -> {}", srt.display(), out_mp4.display()));
    if let Err(err) = run_cmd_in(&args, Some(srt_dir)).await {
        logw(format!("Subtitle burn failed: {}", err));
        return Ok(false);
    }
    Ok(out_mp4.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn media(kind: MediaKind, fit: ClipFit, slot: f64) -> ResolvedMedia {
        ResolvedMedia {
            scene_number: 1,
            source_path: Some(PathBuf::from("in.mp4")),
            kind,
            fit,
            duration_seconds: slot,
            placeholder: None,
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn loop_fit_uses_stream_loop_and_exact_length() {
        let render = RenderSettings::default();
        let m = media(MediaKind::Video, ClipFit::Loop { source: 5.0, target: 8.0 }, 8.0);
        let args = scene_render_args(&m, &render, Path::new("out.mp4"));
        assert_eq!(value_after(&args, "-stream_loop"), Some("1"));
        assert_eq!(args.iter().rev().nth(9).map(String::as_str), Some("8.000"));
        assert!(args.iter().any(|a| a == "-an"));
        assert!(!args.iter().any(|a| a.contains("tpad")));
    }

    #[test]
    fn short_hook_holds_its_last_frame() {
        let render = RenderSettings::default();
        let m = media(MediaKind::Video, ClipFit::Trim { play: 2.5 }, 4.0);
        let args = scene_render_args(&m, &render, Path::new("out.mp4"));
        assert_eq!(value_after(&args, "-t"), Some("2.500"));
        let filter = value_after(&args, "-filter_complex").unwrap();
        assert!(filter.contains("tpad=stop_mode=clone:stop_duration=1.500"));
        assert!(filter.starts_with("[0:v]scale=1080:1920"));
    }

    #[test]
    fn still_gets_ken_burns_when_enabled() {
        let render = RenderSettings::default();
        let m = media(MediaKind::Image, ClipFit::Still { seconds: 3.0 }, 3.0);
        let args = scene_render_args(&m, &render, Path::new("out.mp4"));
        assert_eq!(value_after(&args, "-loop"), Some("1"));
        let filter = value_after(&args, "-filter_complex").unwrap();
        assert!(filter.contains("zoompan=z='1+0.1500*on/90'"));
    }

    #[test]
    fn placeholders_use_color_source() {
        let render = RenderSettings::default();
        let m = ResolvedMedia {
            scene_number: 2,
            source_path: None,
            kind: MediaKind::Placeholder,
            fit: ClipFit::Blank { seconds: 3.0 },
            duration_seconds: 3.0,
            placeholder: Some(PlaceholderReason::Error),
        };
        let args = scene_render_args(&m, &render, Path::new("out.mp4"));
        let source = value_after(&args, "-i").unwrap();
        assert_eq!(source, "color=c=0x8b0000:s=1080x1920:r=30:d=3.000");
    }

    #[test]
    fn blurred_reframe_overlays_on_blurred_fill() {
        let render = RenderSettings {
            reframe: ReframeMode::BlurredBackground,
            ..RenderSettings::default()
        };
        let filter = reframe_filter(&render);
        assert!(filter.contains("gblur=sigma=25"));
        assert!(filter.contains("overlay=(W-w)/2:(H-h)/2"));
    }

    #[test]
    fn escapes_filter_values() {
        assert_eq!(escape_filter_value("a:b'c\\d"), "a\\:b\\'c\\\\d");
    }
}
