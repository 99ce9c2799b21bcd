use crate::logw;
use crate::timing::{Diagnostic, TimedText, TimedWord, ends_with_terminal_punctuation};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_WORDS: usize = 4;
pub const DEFAULT_MAX_DURATION: f64 = 4.0;

/// A run of consecutive words shown on screen together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionBlock {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(skip)]
    pub words: Vec<TimedWord>,
}

impl TimedText for CaptionBlock {
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

#[derive(Debug, Clone, Default)]
pub struct Grouping {
    pub blocks: Vec<CaptionBlock>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptionGrouper {
    pub max_words: usize,
    pub max_duration: f64,
}

impl Default for CaptionGrouper {
    fn default() -> Self {
        Self {
            max_words: DEFAULT_MAX_WORDS,
            max_duration: DEFAULT_MAX_DURATION,
        }
    }
}

impl CaptionGrouper {
    pub fn new(max_words: usize, max_duration: f64) -> Self {
        Self {
            max_words: max_words.max(1),
            max_duration,
        }
    }

    /// Scans the words left to right, closing a block before a word that would break a
    /// limit and after a word that ends a phrase.
    pub fn group(&self, words: &[TimedWord]) -> Grouping {
        let mut grouping = Grouping::default();
        let mut open: Vec<TimedWord> = Vec::new();
        let mut clock = WordClock::default();

        for (index, word) in words.iter().enumerate() {
            let text = word.text.trim();
            if text.is_empty() {
                continue;
            }
            let word = clamp_word(index, word, text, &mut clock, &mut grouping.diagnostics);

            if let Some(first) = open.first() {
                let full = open.len() >= self.max_words;
                let too_long = word.end - first.start > self.max_duration;
                if full || too_long {
                    grouping.blocks.push(close_block(&mut open));
                }
            }

            let closes_phrase = ends_with_terminal_punctuation(&word.text);
            open.push(word);
            if closes_phrase {
                grouping.blocks.push(close_block(&mut open));
            }
        }

        if !open.is_empty() {
            grouping.blocks.push(close_block(&mut open));
        }

        for diagnostic in &grouping.diagnostics {
            logw(format!("Caption grouping: {}", diagnostic));
        }
        grouping
    }
}

/// Start and end of the last word accepted, so neither ever moves backwards.
#[derive(Debug, Clone, Copy, Default)]
struct WordClock {
    start: f64,
    end: f64,
}

fn clamp_word(
    index: usize,
    word: &TimedWord,
    text: &str,
    clock: &mut WordClock,
    diagnostics: &mut Vec<Diagnostic>,
) -> TimedWord {
    let mut start = if word.start.is_finite() {
        word.start.max(0.0)
    } else {
        diagnostics.push(Diagnostic::new(index, "non-finite start"));
        clock.start
    };
    if start < clock.start {
        diagnostics.push(Diagnostic::new(
            index,
            format!("start {start} precedes previous start {}", clock.start),
        ));
        start = clock.start;
    }

    let mut end = if word.end.is_finite() && word.end >= start {
        word.end
    } else {
        diagnostics.push(Diagnostic::new(index, format!("end {} clamped to {start}", word.end)));
        start
    };
    if end < clock.end {
        diagnostics.push(Diagnostic::new(
            index,
            format!("end {end} precedes previous end {}", clock.end),
        ));
        end = clock.end;
    }

    *clock = WordClock { start, end };
    TimedWord::new(text, start, end)
}

fn close_block(open: &mut Vec<TimedWord>) -> CaptionBlock {
    let words = std::mem::take(open);
    let start = words.first().map(|w| w.start).unwrap_or(0.0);
    let end = words.last().map(|w| w.end).unwrap_or(start).max(start);
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    CaptionBlock {
        start,
        end,
        text,
        words,
    }
}

/// Groups with the default limits of four words and four seconds.
pub fn group(words: &[TimedWord]) -> Vec<CaptionBlock> {
    CaptionGrouper::default().group(words).blocks
}

pub fn flatten(blocks: &[CaptionBlock]) -> Vec<TimedWord> {
    blocks.iter().flat_map(|b| b.words.iter().cloned()).collect()
}
