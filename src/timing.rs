//! Word-timing model shared by the caption grouper, the subtitle formatter and the
//! scene resolver.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Marks that close a caption group or a subtitle segment.
pub const TERMINAL_PUNCTUATION: &[char] = &[
    '.', ',', '!', '?', ';', ':', '。', '，', '、', '？', '！', '；', '：',
];

/// Longest stretch of the hook clip that opens a video.
pub const HOOK_MAX_SECONDS: f64 = 4.0;

const FIT_EPSILON: f64 = 1e-3;

pub fn ends_with_terminal_punctuation(text: &str) -> bool {
    text.trim_end()
        .chars()
        .next_back()
        .is_some_and(|c| TERMINAL_PUNCTUATION.contains(&c))
}

/// Anything carrying a piece of text and a time span in seconds.
pub trait TimedText {
    fn text(&self) -> &str;
    fn start(&self) -> f64;
    fn end(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedWord {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl TimedWord {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

impl TimedText for TimedWord {
    fn text(&self) -> &str {
        &self.text
    }

    fn start(&self) -> f64 {
        self.start
    }

    fn end(&self) -> f64 {
        self.end
    }
}

/// A word as found on disk, before any field has been checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTimedWord {
    pub text: Option<String>,
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl RawTimedWord {
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self {
            text: value.get("text").and_then(|v| v.as_str()).map(str::to_string),
            start: value.get("start").and_then(|v| v.as_f64()),
            end: value.get("end").and_then(|v| v.as_f64()),
        }
    }
}

/// Something recovered from while reading a word stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub index: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "word {}: {}", self.index, self.message)
    }
}

/// Turns raw words into well-formed ones. Every input yields exactly one output word;
/// bad fields are clamped and reported instead of rejected.
pub fn sanitize_words(raw: &[RawTimedWord]) -> (Vec<TimedWord>, Vec<Diagnostic>) {
    let mut words = Vec::with_capacity(raw.len());
    let mut diagnostics = Vec::new();
    let mut previous_end = 0.0f64;

    for (index, item) in raw.iter().enumerate() {
        let text = match &item.text {
            Some(text) => text.clone(),
            None => {
                diagnostics.push(Diagnostic::new(index, "missing text"));
                String::new()
            }
        };

        let end_hint = item.end.filter(|v| v.is_finite());
        let mut start = match item.start.filter(|v| v.is_finite()) {
            Some(start) => start,
            None => {
                diagnostics.push(Diagnostic::new(index, "missing or invalid start"));
                end_hint.unwrap_or(previous_end)
            }
        };
        if start < 0.0 {
            diagnostics.push(Diagnostic::new(index, format!("negative start {start}")));
            start = 0.0;
        }

        let end = match end_hint {
            Some(end) if end >= start => end,
            Some(end) => {
                diagnostics.push(Diagnostic::new(
                    index,
                    format!("end {end} before start {start}"),
                ));
                start
            }
            None => {
                diagnostics.push(Diagnostic::new(index, "missing or invalid end"));
                start
            }
        };

        previous_end = end;
        words.push(TimedWord { start, end, text });
    }

    (words, diagnostics)
}

pub async fn read_timed_words(path: &Path) -> Result<(Vec<TimedWord>, Vec<Diagnostic>)> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("read timed words: {}", path.display()))?;
    let values: Vec<serde_json::Value> = serde_json::from_str(&content)
        .with_context(|| format!("timed words are not a JSON list: {}", path.display()))?;
    let raw: Vec<RawTimedWord> = values.iter().map(RawTimedWord::from_json).collect();
    Ok(sanitize_words(&raw))
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create dir {}", parent.display()))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body)
        .await
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// How a source is stretched or cut to fill a scene slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipFit {
    /// Play the source from its first frame for `play` seconds.
    Trim { play: f64 },
    /// Repeat a `source`-second clip until exactly `target` seconds are covered.
    Loop { source: f64, target: f64 },
    /// Hold a still image.
    Still { seconds: f64 },
    /// Solid-color filler.
    Blank { seconds: f64 },
}

impl ClipFit {
    pub fn output_seconds(&self) -> f64 {
        match *self {
            ClipFit::Trim { play } => play,
            ClipFit::Loop { target, .. } => target,
            ClipFit::Still { seconds } | ClipFit::Blank { seconds } => seconds,
        }
    }

    /// Extra passes needed after the first play-through, as ffmpeg's `-stream_loop` wants.
    pub fn extra_loops(&self) -> u32 {
        match *self {
            ClipFit::Loop { source, target } if source > 0.0 => {
                ((target / source).ceil() as u32).saturating_sub(1).max(1)
            }
            _ => 0,
        }
    }
}

/// Trim when the source covers the target, loop otherwise.
pub fn fit_to_duration(source: f64, target: f64) -> ClipFit {
    if source + FIT_EPSILON >= target {
        ClipFit::Trim { play: target }
    } else {
        ClipFit::Loop { source, target }
    }
}

pub fn hook_take(scene_seconds: f64, clip_seconds: f64) -> f64 {
    scene_seconds.min(clip_seconds).min(HOOK_MAX_SECONDS).max(0.0)
}
