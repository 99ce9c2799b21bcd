use crate::logw;
use crate::timing::{TimedWord, write_json};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// Renders seconds as `HH:MM:SS,mmm`. Float noise is snapped to the microsecond before the
/// milliseconds are truncated; negatives clamp to zero and hours grow past 24.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let total_us = (seconds * 1_000_000.0).round() as u64;
    let total_ms = total_us / 1_000;
    let ms = total_ms % 1_000;
    let total_s = total_ms / 1_000;
    let s = total_s % 60;
    let m = (total_s / 60) % 60;
    let h = total_s / 3_600;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Parses `HH:MM:SS,mmm` (a `.` before the milliseconds is tolerated).
pub fn parse_timestamp(ts: &str) -> Option<f64> {
    let mut parts = ts.trim().split([':', ',', '.']);
    let hh: u64 = parts.next()?.trim().parse().ok()?;
    let mm: u64 = parts.next()?.trim().parse().ok()?;
    let ss: u64 = parts.next()?.trim().parse().ok()?;
    let ms_text = parts.next().unwrap_or("0").trim();
    if parts.next().is_some() {
        return None;
    }
    let ms: u64 = ms_text.parse().ok()?;
    let ms_scaled = match ms_text.len() {
        1 => ms * 100,
        2 => ms * 10,
        _ => ms,
    };
    Some((hh * 3_600 + mm * 60 + ss) as f64 + ms_scaled as f64 / 1_000.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SrtBlock {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

fn strip_italics(input: &str) -> String {
    input.replace("<i>", "").replace("</i>", "")
}

fn parse_time_line(line: &str) -> Option<(f64, f64)> {
    let (a, b) = line.split_once("-->")?;
    Some((parse_timestamp(a)?, parse_timestamp(b)?))
}

/// Reads blocks separated by blank lines. Blocks without a valid time line are skipped.
pub fn parse_srt(input: &str) -> Vec<SrtBlock> {
    let cleaned = strip_italics(input).replace("\r\n", "\n");
    let mut blocks = Vec::new();

    for chunk in cleaned.split("\n\n") {
        let lines: Vec<&str> = chunk.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        let Some(time_pos) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };
        let Some((start, end)) = parse_time_line(lines[time_pos]) else {
            continue;
        };
        let index = lines[..time_pos]
            .first()
            .and_then(|l| l.parse::<usize>().ok())
            .unwrap_or(blocks.len() + 1);
        let text = lines[time_pos + 1..].join(" ");
        blocks.push(SrtBlock {
            index,
            start,
            end,
            text,
        });
    }

    blocks
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Spreads each block's span evenly across its words.
pub fn blocks_to_timed_words(blocks: &[SrtBlock]) -> Vec<TimedWord> {
    let mut words = Vec::new();
    for block in blocks {
        let duration = block.end - block.start;
        if duration <= 0.0 {
            logw(format!("Skipping SRT block {} with non-positive duration", block.index));
            continue;
        }
        let parts: Vec<&str> = block.text.split_whitespace().collect();
        if parts.is_empty() {
            continue;
        }
        let per_word = duration / parts.len() as f64;
        for (i, part) in parts.iter().enumerate() {
            let start = block.start + per_word * i as f64;
            words.push(TimedWord::new(*part, round3(start), round3(start + per_word)));
        }
    }
    words
}

pub async fn convert_srt_to_timed_words(input_srt: &Path, output_json: &Path) -> Result<bool> {
    let input = fs::read_to_string(input_srt)
        .await
        .with_context(|| format!("read srt: {}", input_srt.display()))?;

    let words = blocks_to_timed_words(&parse_srt(&input));
    if words.is_empty() {
        logw(format!("No timed words recovered from {}", input_srt.display()));
        return Ok(false);
    }

    write_json(output_json, &words).await?;
    Ok(true)
}
