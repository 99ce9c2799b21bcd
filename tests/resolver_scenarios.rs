use anyhow::{Result, anyhow};
use async_trait::async_trait;
use promo_shorts::resolver::{
    self, AiImageQueue, MediaKind, MediaPools, MediaProbe, PlaceholderReason,
};
use promo_shorts::script::{Scene, VisualType};
use promo_shorts::timing::ClipFit;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Files that "exist" map to their duration; `None` means present but unreadable.
#[derive(Default)]
struct FakeProbe {
    files: HashMap<PathBuf, Option<f64>>,
}

impl FakeProbe {
    fn with(mut self, path: &str, duration: Option<f64>) -> Self {
        self.files.insert(PathBuf::from(path), duration);
        self
    }
}

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn duration_seconds(&self, path: &Path) -> Result<f64> {
        self.files
            .get(path)
            .copied()
            .flatten()
            .ok_or_else(|| anyhow!("cannot probe {}", path.display()))
    }

    async fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

fn scene(number: u32, visual_type: VisualType, duration: f64) -> Scene {
    Scene {
        scene_number: number,
        visual_type,
        visual_description: String::new(),
        voiceover_text: String::new(),
        duration_seconds: duration,
        search_keywords: Vec::new(),
    }
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

#[tokio::test]
async fn short_stock_clip_loops_to_the_scene_length() {
    let probe = FakeProbe::default().with("stock/a.mp4", Some(5.0));
    let mut stock = BTreeMap::new();
    stock.insert(2, vec![PathBuf::from("stock/a.mp4")]);
    let pools = MediaPools {
        stock,
        ..Default::default()
    };

    let scenes = [scene(2, VisualType::StockVideo, 8.0)];
    let resolution = resolver::resolve(&scenes, &pools, &probe, &mut rng()).await;
    let media = &resolution.media[&2];
    assert_eq!(media.kind, MediaKind::Video);
    assert_eq!(media.fit, ClipFit::Loop { source: 5.0, target: 8.0 });
    assert_eq!(media.fit.output_seconds(), 8.0);
    assert_eq!(media.fit.extra_loops(), 1);
    assert_eq!(media.hold_seconds(), 0.0);
}

#[tokio::test]
async fn empty_image_queue_gives_a_placeholder_of_the_scene_length() {
    let pools = MediaPools::default();
    let resolution = resolver::resolve(
        &[scene(3, VisualType::AiImage, 2.5)],
        &pools,
        &FakeProbe::default(),
        &mut rng(),
    )
    .await;
    let media = &resolution.media[&3];
    assert_eq!(media.kind, MediaKind::Placeholder);
    assert_eq!(media.placeholder, Some(PlaceholderReason::Missing));
    assert_eq!(media.duration_seconds, 2.5);
    assert_eq!(media.fit, ClipFit::Blank { seconds: 2.5 });
}

#[tokio::test]
async fn every_scene_resolves_exactly_once_in_order() {
    let probe = FakeProbe::default()
        .with("hook.mp4", Some(10.0))
        .with("img/1.jpeg", None)
        .with("product.png", None)
        .with("stock/broken.mp4", None);
    let mut stock = BTreeMap::new();
    stock.insert(4, vec![PathBuf::from("stock/broken.mp4")]);
    let pools = MediaPools {
        hook_clip: Some(PathBuf::from("hook.mp4")),
        product_image: Some(PathBuf::from("product.png")),
        product_video: None,
        stock,
        ai_images: AiImageQueue::from_slots(vec![Some(PathBuf::from("img/1.jpeg")), None]),
    };
    let scenes = vec![
        scene(6, VisualType::Unknown("hologram".to_string()), 2.0),
        scene(1, VisualType::Hook, 6.0),
        scene(2, VisualType::AiImage, 3.0),
        scene(3, VisualType::AiImage, 3.0),
        scene(4, VisualType::StockVideo, 5.0),
        scene(5, VisualType::ProductShot, 3.0),
        scene(7, VisualType::ProductVideo, 15.0),
        scene(8, VisualType::StockVideo, 0.0),
    ];

    let resolution = resolver::resolve(&scenes, &pools, &probe, &mut rng()).await;
    let numbers: Vec<u32> = resolution.iter().map(|m| m.scene_number).collect();
    assert_eq!(numbers, (1..=8).collect::<Vec<_>>());
    let unique: HashSet<u32> = numbers.iter().copied().collect();
    assert_eq!(unique.len(), scenes.len());

    let m = &resolution.media;
    // Hook capped at four seconds, last frame held for the rest of the slot.
    assert_eq!(m[&1].fit, ClipFit::Trim { play: 4.0 });
    assert_eq!(m[&1].hold_seconds(), 2.0);
    assert_eq!(m[&2].fit, ClipFit::Still { seconds: 3.0 });
    assert_eq!(m[&3].placeholder, Some(PlaceholderReason::Missing));
    assert_eq!(m[&4].placeholder, Some(PlaceholderReason::Error));
    assert_eq!(m[&5].kind, MediaKind::Image);
    assert_eq!(m[&6].placeholder, Some(PlaceholderReason::Missing));
    assert_eq!(m[&7].placeholder, Some(PlaceholderReason::Missing));
    assert_eq!(m[&8].placeholder, Some(PlaceholderReason::Error));
    assert_eq!(m[&8].duration_seconds, 0.0);

    assert!(resolution.has_usable_scene());
    assert!(!resolution.diagnostics.is_empty());
}

#[tokio::test]
async fn duplicate_scene_numbers_keep_the_first() {
    let probe = FakeProbe::default().with("p.png", None);
    let pools = MediaPools {
        product_image: Some(PathBuf::from("p.png")),
        ..Default::default()
    };
    let scenes = vec![
        scene(1, VisualType::ProductShot, 2.0),
        scene(1, VisualType::AiImage, 9.0),
    ];
    let resolution = resolver::resolve(&scenes, &pools, &probe, &mut rng()).await;
    assert_eq!(resolution.media.len(), 1);
    assert_eq!(resolution.media[&1].duration_seconds, 2.0);
}

#[tokio::test]
async fn only_error_placeholders_is_not_usable() {
    let probe = FakeProbe::default().with("gone.mp4", None);
    let mut stock = BTreeMap::new();
    stock.insert(1, vec![PathBuf::from("gone.mp4")]);
    let pools = MediaPools {
        stock,
        ..Default::default()
    };
    let scenes = [scene(1, VisualType::StockVideo, 4.0)];
    let resolution = resolver::resolve(&scenes, &pools, &probe, &mut rng()).await;
    assert!(!resolution.has_usable_scene());
}

#[tokio::test]
async fn product_video_loops_when_short_and_trims_when_long() {
    let probe = FakeProbe::default()
        .with("demo/short.mp4", Some(10.0))
        .with("demo/long.mp4", Some(20.0));
    let scenes = [scene(1, VisualType::ProductVideo, 15.0)];

    let short = MediaPools {
        product_video: Some(PathBuf::from("demo/short.mp4")),
        ..Default::default()
    };
    let resolution = resolver::resolve(&scenes, &short, &probe, &mut rng()).await;
    let media = &resolution.media[&1];
    assert_eq!(media.kind, MediaKind::Video);
    assert_eq!(media.fit, ClipFit::Loop { source: 10.0, target: 15.0 });
    assert_eq!(media.fit.output_seconds(), 15.0);

    let long = MediaPools {
        product_video: Some(PathBuf::from("demo/long.mp4")),
        ..Default::default()
    };
    let resolution = resolver::resolve(&scenes, &long, &probe, &mut rng()).await;
    let media = &resolution.media[&1];
    assert_eq!(media.kind, MediaKind::Video);
    assert_eq!(media.fit, ClipFit::Trim { play: 15.0 });
    assert_eq!(media.hold_seconds(), 0.0);
}

#[tokio::test]
async fn hook_that_is_absent_or_unreadable_becomes_a_missing_placeholder() {
    let scenes = [scene(1, VisualType::Hook, 3.0)];
    let pools = MediaPools {
        hook_clip: Some(PathBuf::from("hooks/splash.mp4")),
        ..Default::default()
    };

    let absent = FakeProbe::default();
    let resolution = resolver::resolve(&scenes, &pools, &absent, &mut rng()).await;
    let media = &resolution.media[&1];
    assert_eq!(media.kind, MediaKind::Placeholder);
    assert_eq!(media.placeholder, Some(PlaceholderReason::Missing));
    assert_eq!(media.duration_seconds, 3.0);

    let unreadable = FakeProbe::default().with("hooks/splash.mp4", None);
    let resolution = resolver::resolve(&scenes, &pools, &unreadable, &mut rng()).await;
    let media = &resolution.media[&1];
    assert_eq!(media.kind, MediaKind::Placeholder);
    assert_eq!(media.placeholder, Some(PlaceholderReason::Missing));
    assert_eq!(media.duration_seconds, 3.0);
    assert!(!resolution.diagnostics.is_empty());
}

#[tokio::test]
async fn stock_scene_picks_one_of_its_downloaded_clips() {
    let candidates = [PathBuf::from("stock/x.mp4"), PathBuf::from("stock/y.mp4")];
    let probe = FakeProbe::default()
        .with("stock/x.mp4", Some(12.0))
        .with("stock/y.mp4", Some(12.0));
    let mut stock = BTreeMap::new();
    stock.insert(3, candidates.to_vec());
    let pools = MediaPools {
        stock,
        ..Default::default()
    };
    let scenes = [scene(3, VisualType::StockVideo, 6.0)];

    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(seed);
        let resolution = resolver::resolve(&scenes, &pools, &probe, &mut rng).await;
        let media = &resolution.media[&3];
        let chosen = media.source_path.as_ref().unwrap();
        assert!(candidates.contains(chosen), "{} was never offered", chosen.display());
        assert_eq!(media.fit, ClipFit::Trim { play: 6.0 });
    }
}
