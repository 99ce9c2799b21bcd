use crate::captions::CaptionBlock;
use crate::ffmpeg;
use crate::subtitle;
use crate::{logi, logok, logw};
use std::path::{Path, PathBuf};

/// What the caption pass produced. `Uncaptioned` carries the untouched input video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptionOutcome {
    Captioned(PathBuf),
    Uncaptioned(PathBuf),
}

impl CaptionOutcome {
    pub fn path(&self) -> &Path {
        match self {
            CaptionOutcome::Captioned(p) | CaptionOutcome::Uncaptioned(p) => p,
        }
    }

    pub fn is_captioned(&self) -> bool {
        matches!(self, CaptionOutcome::Captioned(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionStyle {
    pub font: String,
    pub font_size: u32,
    /// ASS colour, `&HAABBGGRR`.
    pub primary_colour: String,
    pub outline_colour: String,
    pub outline: f64,
    /// ASS numpad alignment; 5 is the middle of the frame.
    pub alignment: u8,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font: "Arial".to_string(),
            font_size: 18,
            primary_colour: "&H0000FFFF".to_string(),
            outline_colour: "&H00000000".to_string(),
            outline: 2.0,
            alignment: 5,
        }
    }
}

impl CaptionStyle {
    pub fn force_style(&self) -> String {
        format!(
            "Fontname={},Fontsize={},PrimaryColour={},OutlineColour={},BorderStyle=1,Outline={},Shadow=0,Alignment={}",
            self.font,
            self.font_size,
            self.primary_colour,
            self.outline_colour,
            self.outline,
            self.alignment
        )
    }
}

/// Burns the caption blocks into `video`. Any problem leaves the video as it was and
/// reports `Uncaptioned`.
pub async fn add_captions_to_video(
    video: &Path,
    blocks: &[CaptionBlock],
    srt_path: &Path,
    out_mp4: &Path,
    style: &CaptionStyle,
) -> CaptionOutcome {
    let uncaptioned = || CaptionOutcome::Uncaptioned(video.to_path_buf());

    let shown: Vec<CaptionBlock> = blocks.iter().filter(|b| b.end > b.start).cloned().collect();
    if shown.len() < blocks.len() {
        logw(format!(
            "Skipping {} caption block(s) with zero duration",
            blocks.len() - shown.len()
        ));
    }

    let doc = match subtitle::format(&shown, usize::MAX) {
        Ok(doc) => doc,
        Err(err) => {
            logw(format!("No captions to burn: {}", err));
            return uncaptioned();
        }
    };
    if let Err(err) = doc.write(srt_path).await {
        logw(format!("Could not write caption subtitles: {:#}", err));
        return uncaptioned();
    }

    logi(format!("Adding {} captions to {}", doc.entries.len(), video.display()));
    match ffmpeg::ffmpeg_burn_subtitles(video, srt_path, &style.force_style(), out_mp4).await {
        Ok(true) => {
            logok(format!("Captioned video: {}", out_mp4.display()));
            CaptionOutcome::Captioned(out_mp4.to_path_buf())
        }
        Ok(false) => uncaptioned(),
        Err(err) => {
            logw(format!("Caption burn failed: {:#}", err));
            uncaptioned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_is_yellow_outlined_centered() {
        let style = CaptionStyle::default().force_style();
        assert!(style.contains("PrimaryColour=&H0000FFFF"));
        assert!(style.contains("Outline=2"));
        assert!(style.ends_with("Alignment=5"));
    }

    #[tokio::test]
    async fn nothing_to_show_is_uncaptioned() {
        let dir = tempfile::tempdir().unwrap();
        let video = dir.path().join("in.mp4");
        let blocks = vec![CaptionBlock {
            start: 1.0,
            end: 1.0,
            text: "flash".to_string(),
            words: vec![],
        }];
        let outcome = add_captions_to_video(
            &video,
            &blocks,
            &dir.path().join("c.srt"),
            &dir.path().join("out.mp4"),
            &CaptionStyle::default(),
        )
        .await;
        assert_eq!(outcome, CaptionOutcome::Uncaptioned(video.clone()));
        assert!(!outcome.is_captioned());
        assert_eq!(outcome.path(), video.as_path());
    }
}
