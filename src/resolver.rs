//! Chooses the asset that fills each scene of a script and plans how it is cut to the
//! scene's duration. Resolution never fails: a scene whose asset is missing or broken is
//! filled with a solid-color placeholder of the declared duration.

use crate::ffmpeg;
use crate::script::{Scene, VisualType};
use crate::timing::{ClipFit, fit_to_duration, hook_take};
use crate::{logi, logw};
use anyhow::Result;
use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Answers the two questions the resolver asks about a media file.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<f64>;

    async fn is_file(&self, path: &Path) -> bool {
        fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
    }
}

/// Probes real files with ffprobe.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeMedia;

#[async_trait]
impl MediaProbe for FfprobeMedia {
    async fn duration_seconds(&self, path: &Path) -> Result<f64> {
        ffmpeg::ffprobe_duration_seconds(path).await
    }
}

/// Ordered AI image slots, one per `ai_image` scene. An empty slot is an image that
/// failed to generate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiImageQueue {
    slots: Vec<Option<PathBuf>>,
}

impl AiImageQueue {
    pub fn from_slots(slots: Vec<Option<PathBuf>>) -> Self {
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl<P: Into<PathBuf>> FromIterator<P> for AiImageQueue {
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self {
            slots: iter.into_iter().map(|p| Some(p.into())).collect(),
        }
    }
}

/// Everything a run has gathered that scenes can draw from.
#[derive(Debug, Clone, Default)]
pub struct MediaPools {
    pub hook_clip: Option<PathBuf>,
    pub product_image: Option<PathBuf>,
    pub product_video: Option<PathBuf>,
    pub stock: BTreeMap<u32, Vec<PathBuf>>,
    pub ai_images: AiImageQueue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderReason {
    /// The scene had nothing to draw from.
    Missing,
    /// The scene's asset existed but could not be used.
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub scene_number: u32,
    pub source_path: Option<PathBuf>,
    pub kind: MediaKind,
    pub fit: ClipFit,
    /// Length of the scene's slot on the timeline.
    pub duration_seconds: f64,
    pub placeholder: Option<PlaceholderReason>,
}

impl ResolvedMedia {
    fn placeholder(scene_number: u32, duration_seconds: f64, reason: PlaceholderReason) -> Self {
        Self {
            scene_number,
            source_path: None,
            kind: MediaKind::Placeholder,
            fit: ClipFit::Blank {
                seconds: duration_seconds,
            },
            duration_seconds,
            placeholder: Some(reason),
        }
    }

    pub fn is_error(&self) -> bool {
        self.placeholder == Some(PlaceholderReason::Error)
    }

    /// Seconds of frozen last frame needed after the source runs out.
    pub fn hold_seconds(&self) -> f64 {
        (self.duration_seconds - self.fit.output_seconds()).max(0.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub media: BTreeMap<u32, ResolvedMedia>,
    pub diagnostics: Vec<String>,
}

impl Resolution {
    /// True when at least one scene ended up with something other than an error placeholder.
    pub fn has_usable_scene(&self) -> bool {
        self.media.values().any(|m| !m.is_error())
    }

    pub fn total_duration(&self) -> f64 {
        self.media.values().map(|m| m.duration_seconds).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedMedia> {
        self.media.values()
    }

    fn note(&mut self, message: String) {
        logw(&message);
        self.diagnostics.push(message);
    }
}

enum Outcome {
    Media(PathBuf, MediaKind, ClipFit),
    Missing(String),
    Failed(String),
}

/// Resolves every scene, in ascending `scene_number`. Later scenes that reuse a number
/// already seen are dropped with a diagnostic.
pub async fn resolve<P, R>(
    scenes: &[Scene],
    pools: &MediaPools,
    probe: &P,
    rng: &mut R,
) -> Resolution
where
    P: MediaProbe + ?Sized,
    R: Rng + ?Sized,
{
    let mut ordered: Vec<&Scene> = scenes.iter().collect();
    ordered.sort_by_key(|s| s.scene_number);

    let mut resolution = Resolution::default();
    let mut seen = HashSet::new();
    let mut images = pools.ai_images.slots.iter();

    for scene in ordered {
        let number = scene.scene_number;
        if !seen.insert(number) {
            resolution.note(format!("Scene {}: duplicate scene number ignored", number));
            continue;
        }

        let duration = scene.duration_seconds;
        if !duration.is_finite() || duration <= 0.0 {
            resolution.note(format!("Scene {}: invalid duration {}", number, duration));
            resolution.media.insert(
                number,
                ResolvedMedia::placeholder(number, 0.0, PlaceholderReason::Error),
            );
            continue;
        }

        let outcome = match &scene.visual_type {
            VisualType::Hook => resolve_hook(pools, probe, duration).await,
            VisualType::AiImage => match images.next() {
                None => Outcome::Missing("AI image queue exhausted".to_string()),
                Some(None) => Outcome::Missing("AI image slot is empty".to_string()),
                Some(Some(path)) => resolve_still(path, probe, duration, "AI image").await,
            },
            VisualType::StockVideo => resolve_stock(number, pools, probe, duration, rng).await,
            VisualType::ProductShot => match &pools.product_image {
                Some(path) => resolve_still(path, probe, duration, "product image").await,
                None => Outcome::Missing("no product image supplied".to_string()),
            },
            VisualType::ProductVideo => resolve_product_video(pools, probe, duration).await,
            VisualType::Unknown(raw) => Outcome::Missing(format!("unrecognized type '{}'", raw)),
        };

        let media = match outcome {
            Outcome::Media(path, kind, fit) => {
                logi(format!(
                    "Scene {} ({}): {} {:?}",
                    number,
                    scene.visual_type,
                    path.display(),
                    fit
                ));
                ResolvedMedia {
                    scene_number: number,
                    source_path: Some(path),
                    kind,
                    fit,
                    duration_seconds: duration,
                    placeholder: None,
                }
            }
            Outcome::Missing(reason) => {
                resolution.note(format!(
                    "Scene {} ({}): {}; using placeholder",
                    number, scene.visual_type, reason
                ));
                ResolvedMedia::placeholder(number, duration, PlaceholderReason::Missing)
            }
            Outcome::Failed(reason) => {
                resolution.note(format!(
                    "Scene {} ({}): {}; using error placeholder",
                    number, scene.visual_type, reason
                ));
                ResolvedMedia::placeholder(number, duration, PlaceholderReason::Error)
            }
        };
        resolution.media.insert(number, media);
    }

    resolution
}

async fn resolve_hook<P>(pools: &MediaPools, probe: &P, duration: f64) -> Outcome
where
    P: MediaProbe + ?Sized,
{
    let Some(path) = &pools.hook_clip else {
        return Outcome::Missing("no hook clip supplied".to_string());
    };
    if !probe.is_file(path).await {
        return Outcome::Missing(format!("hook clip not found: {}", path.display()));
    }
    match probe.duration_seconds(path).await {
        Ok(clip) => Outcome::Media(
            path.clone(),
            MediaKind::Video,
            ClipFit::Trim {
                play: hook_take(duration, clip),
            },
        ),
        Err(err) => Outcome::Missing(format!("hook clip unreadable: {}", err)),
    }
}

async fn resolve_still<P>(path: &Path, probe: &P, duration: f64, what: &str) -> Outcome
where
    P: MediaProbe + ?Sized,
{
    if probe.is_file(path).await {
        Outcome::Media(
            path.to_path_buf(),
            MediaKind::Image,
            ClipFit::Still { seconds: duration },
        )
    } else {
        Outcome::Missing(format!("{} not found: {}", what, path.display()))
    }
}

async fn resolve_stock<P, R>(
    number: u32,
    pools: &MediaPools,
    probe: &P,
    duration: f64,
    rng: &mut R,
) -> Outcome
where
    P: MediaProbe + ?Sized,
    R: Rng + ?Sized,
{
    let Some(path) = pools.stock.get(&number).and_then(|clips| clips.choose(rng)) else {
        return Outcome::Missing("no stock clip downloaded".to_string());
    };
    if !probe.is_file(path).await {
        return Outcome::Failed(format!("stock clip vanished: {}", path.display()));
    }
    match probe.duration_seconds(path).await {
        Ok(clip) => Outcome::Media(path.clone(), MediaKind::Video, fit_to_duration(clip, duration)),
        Err(err) => Outcome::Failed(format!("stock clip unreadable {}: {}", path.display(), err)),
    }
}

async fn resolve_product_video<P>(pools: &MediaPools, probe: &P, duration: f64) -> Outcome
where
    P: MediaProbe + ?Sized,
{
    let Some(path) = &pools.product_video else {
        return Outcome::Missing("no product video supplied".to_string());
    };
    if !probe.is_file(path).await {
        return Outcome::Missing(format!("product video not found: {}", path.display()));
    }
    match probe.duration_seconds(path).await {
        Ok(clip) => Outcome::Media(path.clone(), MediaKind::Video, fit_to_duration(clip, duration)),
        Err(err) => Outcome::Missing(format!("product video unreadable: {}", err)),
    }
}
