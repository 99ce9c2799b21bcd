use crate::logi;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

const PROJECT_DIRS: &[&str] = &[
    "audio",
    "images",
    "stock_videos",
    "stock_videos/stock_videos_cache",
    "captions",
    "output",
];

/// Where every artifact of one project lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn stock_cache_dir(&self) -> PathBuf {
        self.root.join("stock_videos").join("stock_videos_cache")
    }

    pub fn captions_dir(&self) -> PathBuf {
        self.root.join("captions")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn script_json(&self) -> PathBuf {
        self.root.join("script.json")
    }

    pub fn image_prompts_json(&self) -> PathBuf {
        self.root.join("image_prompts.json")
    }

    pub fn voiceover_mp3(&self) -> PathBuf {
        self.audio_dir().join("voiceover.mp3")
    }

    pub fn voiceover_srt(&self) -> PathBuf {
        self.audio_dir().join("voiceover.srt")
    }

    pub fn timed_words_json(&self) -> PathBuf {
        self.captions_dir().join("captions.json")
    }

    pub fn caption_blocks_json(&self) -> PathBuf {
        self.captions_dir().join("caption_blocks.json")
    }

    pub fn caption_blocks_srt(&self) -> PathBuf {
        self.captions_dir().join("caption_blocks.srt")
    }

    /// Scratch space for per-scene renders; cleared at the start of each composition.
    pub fn render_dir(&self) -> PathBuf {
        self.output_dir().join(".render")
    }

    pub fn video_no_captions(&self) -> PathBuf {
        self.output_dir().join("final_video_no_captions.mp4")
    }

    pub fn video_with_captions(&self) -> PathBuf {
        self.output_dir().join("final_video_with_captions.mp4")
    }
}

/// Creates `<name>/` and its artifact directories. Existing directories are left alone.
pub async fn create_project_structure(name: &Path) -> Result<ProjectLayout> {
    let layout = ProjectLayout::new(name);
    for dir in PROJECT_DIRS {
        let path = layout.root.join(dir);
        if !path.exists() {
            fs::create_dir_all(&path)
                .await
                .with_context(|| format!("Failed to create dir {}", path.display()))?;
            logi(format!("Created directory: {}", path.display()));
        }
    }
    Ok(layout)
}

pub async fn check_ffmpeg() -> bool {
    match tokio::process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_every_artifact_directory() {
        let dir = tempfile::tempdir().unwrap();
        let layout = create_project_structure(&dir.path().join("serum_launch")).await.unwrap();
        for path in [
            layout.audio_dir(),
            layout.images_dir(),
            layout.stock_cache_dir(),
            layout.captions_dir(),
            layout.output_dir(),
        ] {
            assert!(path.is_dir(), "{} missing", path.display());
        }
        // A second call is a no-op.
        create_project_structure(&layout.root).await.unwrap();
    }

    #[test]
    fn artifact_paths() {
        let layout = ProjectLayout::new("p");
        assert_eq!(layout.voiceover_srt(), Path::new("p/audio/voiceover.srt"));
        assert_eq!(layout.timed_words_json(), Path::new("p/captions/captions.json"));
        assert_eq!(
            layout.video_with_captions(),
            Path::new("p/output/final_video_with_captions.mp4")
        );
    }
}
