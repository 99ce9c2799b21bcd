//! SRT documents built from timed words or caption blocks, and alignment of a spoken word
//! stream against the script text it was synthesized from.

use crate::error::SubtitleError;
use crate::srt::format_timestamp;
use crate::timing::{TERMINAL_PUNCTUATION, TimedText};
use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;
use tokio::fs;

pub const DEFAULT_LINE_WORD_TARGET: usize = 5;
pub const DEFAULT_SEGMENT_WORD_CAP: usize = 8;

/// Whether an entry's timing came from the words it shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    Timed,
    BestEffort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleEntry {
    pub index: usize,
    pub start: f64,
    pub end: f64,
    pub lines: Vec<String>,
    pub confidence: Confidence,
}

impl SubtitleEntry {
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleDocument {
    pub entries: Vec<SubtitleEntry>,
    pub warnings: Vec<String>,
}

impl SubtitleDocument {
    fn push(
        &mut self,
        start: f64,
        end: f64,
        text: &str,
        line_word_target: usize,
        confidence: Confidence,
    ) {
        let start = if start.is_finite() { start.max(0.0) } else { 0.0 };
        let end = if end.is_finite() { end.max(start) } else { start };
        self.entries.push(SubtitleEntry {
            index: self.entries.len() + 1,
            start,
            end,
            lines: wrap_lines(text, line_word_target),
            confidence,
        });
    }

    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
            || self.entries.iter().any(|e| e.confidence == Confidence::BestEffort)
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
        fs::write(path, self.render())
            .await
            .with_context(|| format!("write srt: {}", path.display()))?;
        Ok(())
    }
}

impl fmt::Display for SubtitleDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}", entry.index)?;
            writeln!(
                f,
                "{} --> {}",
                format_timestamp(entry.start),
                format_timestamp(entry.end)
            )?;
            for line in &entry.lines {
                writeln!(f, "{}", line)?;
            }
        }
        Ok(())
    }
}

/// Breaks text into lines of at most `target` words.
pub fn wrap_lines(text: &str, target: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words
        .chunks(target.max(1))
        .map(|chunk| chunk.join(" "))
        .collect()
}

/// One entry per item with non-blank text, in input order.
pub fn format<T: TimedText>(
    items: &[T],
    line_word_target: usize,
) -> Result<SubtitleDocument, SubtitleError> {
    if items.is_empty() {
        return Err(SubtitleError::EmptyInput);
    }

    let mut doc = SubtitleDocument::default();
    for item in items {
        let text = item.text().trim();
        if text.is_empty() {
            continue;
        }
        doc.push(item.start(), item.end(), text, line_word_target, Confidence::Timed);
    }

    if doc.entries.is_empty() {
        return Err(SubtitleError::NoEntries);
    }
    Ok(doc)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentOptions {
    /// Words consumed before a segment is emitted regardless of punctuation.
    pub segment_word_cap: usize,
    pub line_word_target: usize,
    pub punctuation: Vec<char>,
}

impl Default for AlignmentOptions {
    fn default() -> Self {
        Self {
            segment_word_cap: DEFAULT_SEGMENT_WORD_CAP,
            line_word_target: DEFAULT_LINE_WORD_TARGET,
            punctuation: TERMINAL_PUNCTUATION.to_vec(),
        }
    }
}

impl AlignmentOptions {
    fn ends_with_mark(&self, text: &str) -> bool {
        text.trim_end()
            .chars()
            .next_back()
            .is_some_and(|c| self.punctuation.contains(&c))
    }
}

/// Drops brackets and collapses runs of whitespace.
pub fn normalize_reference(text: &str) -> String {
    let unbracketed: String = text
        .chars()
        .map(|c| match c {
            '[' | ']' | '(' | ')' | '{' | '}' | '【' | '】' | '（' | '）' => ' ',
            other => other,
        })
        .collect();
    unbracketed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits after each punctuation mark. A mark sitting between two digits (`3.5`, `10:30`)
/// does not split.
pub fn split_reference(text: &str, punctuation: &[char]) -> Vec<String> {
    let normalized = normalize_reference(text);
    let chars: Vec<char> = normalized.chars().collect();
    let mut segments = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        current.push(c);
        if !punctuation.contains(&c) {
            continue;
        }
        let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
        let next_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        if prev_digit && next_digit {
            continue;
        }
        if chars.get(i + 1).is_some_and(|n| punctuation.contains(n)) {
            continue;
        }
        let segment = current.trim();
        if !segment.is_empty() {
            segments.push(segment.to_string());
        }
        current.clear();
    }

    let tail = current.trim();
    if !tail.is_empty() {
        segments.push(tail.to_string());
    }
    segments
}

/// Times the reference text's segments with the spoken words. The displayed text always
/// comes from the reference; the words only supply timing.
pub fn align<T: TimedText>(
    words: &[T],
    reference: &str,
    options: &AlignmentOptions,
) -> Result<SubtitleDocument, SubtitleError> {
    let spoken: Vec<&T> = words.iter().filter(|w| !w.text().trim().is_empty()).collect();
    if spoken.is_empty() {
        return Err(SubtitleError::EmptyInput);
    }
    let segments = split_reference(reference, &options.punctuation);
    if segments.is_empty() {
        return Err(SubtitleError::EmptyReference);
    }

    let cap = options.segment_word_cap.max(1);
    let mut doc = SubtitleDocument::default();
    let mut segment = 0usize;
    let mut run_start: Option<f64> = None;
    let mut run_words = 0usize;
    let mut consumed = 0usize;

    for (i, word) in spoken.iter().enumerate() {
        if segment >= segments.len() {
            break;
        }
        consumed = i + 1;
        let start = *run_start.get_or_insert(word.start());
        run_words += 1;

        let is_last = i + 1 == spoken.len();
        let phrase_end =
            options.ends_with_mark(word.text()) && options.ends_with_mark(&segments[segment]);
        if run_words >= cap || phrase_end || is_last {
            doc.push(
                start,
                word.end(),
                &segments[segment],
                options.line_word_target,
                Confidence::Timed,
            );
            segment += 1;
            run_start = None;
            run_words = 0;
        }
    }

    if segment < segments.len() {
        let leftover = segments.len() - segment;
        let last = spoken[spoken.len() - 1];
        let text = segments[segment..].join(" ");
        doc.push(last.start(), last.end(), &text, options.line_word_target, Confidence::BestEffort);
        doc.warnings.push(format!(
            "{} reference segment(s) outlasted the word stream and share the last word's timing",
            leftover
        ));
    }
    if consumed < spoken.len() {
        doc.warnings.push(format!(
            "{} timed word(s) remained after the reference text ran out",
            spoken.len() - consumed
        ));
    }

    if doc.entries.is_empty() {
        return Err(SubtitleError::NoEntries);
    }
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::TimedWord;

    fn w(text: &str, start: f64, end: f64) -> TimedWord {
        TimedWord::new(text, start, end)
    }

    #[test]
    fn formats_entries_with_wrapped_lines() {
        let words = vec![
            w("one two three four five six seven", 0.0, 2.5),
            w("  ", 2.5, 2.6),
            w("end", 3725.256, 3726.0),
        ];
        let doc = format(&words, 5).unwrap();
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.entries[1].index, 2);
        assert_eq!(
            doc.render(),
            "1\n00:00:00,000 --> 00:00:02,500\none two three four five\nsix seven\n\n\
             2\n01:02:05,256 --> 01:02:06,000\nend\n"
        );
        assert!(!doc.is_degraded());
    }

    #[test]
    fn format_rejects_empty_and_blank_input() {
        let empty: Vec<TimedWord> = Vec::new();
        assert_eq!(format(&empty, 5), Err(SubtitleError::EmptyInput));
        assert_eq!(format(&[w(" ", 0.0, 1.0)], 5), Err(SubtitleError::NoEntries));
    }

    #[test]
    fn format_clamps_bad_times() {
        let doc = format(&[w("x", -1.0, -2.0)], 5).unwrap();
        assert_eq!(doc.entries[0].start, 0.0);
        assert_eq!(doc.entries[0].end, 0.0);
    }

    #[test]
    fn reference_is_normalized_and_split_after_marks() {
        let segments = split_reference(
            "Voici [pause]  notre   produit. Il coûte 3.5 euros, vraiment?! Oui",
            TERMINAL_PUNCTUATION,
        );
        assert_eq!(
            segments,
            vec!["Voici pause notre produit.", "Il coûte 3.5 euros,", "vraiment?!", "Oui"]
        );
    }

    #[test]
    fn aligns_segments_on_punctuation() {
        let words = vec![
            w("Bonjour", 0.0, 0.4),
            w("à", 0.4, 0.5),
            w("tous.", 0.5, 1.0),
            w("Achetez", 1.2, 1.6),
            w("maintenant.", 1.6, 2.2),
        ];
        let reference = "Bonjour à tous. Achetez maintenant.";
        let doc = align(&words, reference, &AlignmentOptions::default()).unwrap();
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.entries[0].text(), "Bonjour à tous.");
        assert_eq!((doc.entries[0].start, doc.entries[0].end), (0.0, 1.0));
        assert_eq!((doc.entries[1].start, doc.entries[1].end), (1.2, 2.2));
        assert!(!doc.is_degraded());
    }

    #[test]
    fn cap_forces_emission_without_punctuation() {
        let words: Vec<_> = (0..4).map(|i| w("mot", i as f64, i as f64 + 0.5)).collect();
        let options = AlignmentOptions {
            segment_word_cap: 2,
            ..AlignmentOptions::default()
        };
        let doc = align(&words, "Premier. Second.", &options).unwrap();
        assert_eq!(doc.entries.len(), 2);
        assert_eq!((doc.entries[0].start, doc.entries[0].end), (0.0, 1.5));
        assert_eq!((doc.entries[1].start, doc.entries[1].end), (2.0, 3.5));
    }

    #[test]
    fn leftover_segments_are_best_effort() {
        let words = vec![w("Salut.", 0.0, 0.6)];
        let doc = align(&words, "Salut. Encore. Fin.", &AlignmentOptions::default()).unwrap();
        assert_eq!(doc.entries.len(), 2);
        assert_eq!(doc.entries[1].text(), "Encore. Fin.");
        assert_eq!(doc.entries[1].confidence, Confidence::BestEffort);
        assert_eq!((doc.entries[1].start, doc.entries[1].end), (0.0, 0.6));
        assert!(doc.is_degraded());
    }

    #[test]
    fn surplus_words_are_reported() {
        let words = vec![w("Un.", 0.0, 0.3), w("Deux.", 0.4, 0.8)];
        let doc = align(&words, "Un.", &AlignmentOptions::default()).unwrap();
        assert_eq!(doc.entries.len(), 1);
        assert_eq!(doc.warnings.len(), 1);
    }

    #[test]
    fn alignment_failures_are_values() {
        let empty: Vec<TimedWord> = Vec::new();
        let options = AlignmentOptions::default();
        assert_eq!(align(&empty, "Texte.", &options), Err(SubtitleError::EmptyInput));
        assert_eq!(
            align(&[w("a", 0.0, 1.0)], " [ ] ", &options),
            Err(SubtitleError::EmptyReference)
        );
    }
}
