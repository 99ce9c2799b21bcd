use thiserror::Error;

/// Why no subtitle document could be built.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SubtitleError {
    #[error("no timed words to build subtitles from")]
    EmptyInput,

    #[error("reference text has no segments to align")]
    EmptyReference,

    #[error("no subtitle entries could be produced")]
    NoEntries,
}

/// A pipeline stage whose failure stops the run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("script stage failed: {0}")]
    Script(String),

    #[error("voiceover stage failed: {0}")]
    Voiceover(String),

    #[error("timed words unavailable: {0}")]
    TimedWords(String),

    #[error("composition stage failed: {0}")]
    Composition(String),

    #[error("final video missing: {0}")]
    Output(String),
}

impl StageError {
    pub fn script(msg: impl Into<String>) -> Self {
        Self::Script(msg.into())
    }

    pub fn voiceover(msg: impl Into<String>) -> Self {
        Self::Voiceover(msg.into())
    }

    pub fn timed_words(msg: impl Into<String>) -> Self {
        Self::TimedWords(msg.into())
    }

    pub fn composition(msg: impl Into<String>) -> Self {
        Self::Composition(msg.into())
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }
}
