use crate::api::openai;
use crate::config::{Config, StockProvider};
use crate::keys::KeyRing;
use crate::script::{Scene, VisualType};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use rand::Rng;
use rand::seq::SliceRandom;
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;

const TARGET_SIZE: (u64, u64) = (1080, 1920);
const PEXELS_PER_PAGE: u32 = 10;
const PIXABAY_PER_PAGE: u32 = 20;
const MIN_CACHED_BYTES: u64 = 1024;
const USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Clone, PartialEq)]
pub struct StockCandidate {
    pub provider: StockProvider,
    pub url: String,
    pub duration: f64,
}

/// Portrait Pexels results at least `min_duration` long, each with its best rendition:
/// an exact 1080x1920 file when offered, the largest portrait file otherwise.
pub fn parse_pexels_videos(root: &Value, min_duration: f64) -> Vec<StockCandidate> {
    let Some(videos) = root.get("videos").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for video in videos {
        let duration = video.get("duration").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if duration < min_duration {
            continue;
        }
        let files = video.get("video_files").and_then(|v| v.as_array());
        let mut best: Option<&str> = None;
        let mut best_area = 0u64;
        for file in files.into_iter().flatten() {
            let (Some(w), Some(h), Some(link)) = (
                file.get("width").and_then(|v| v.as_u64()),
                file.get("height").and_then(|v| v.as_u64()),
                file.get("link").and_then(|v| v.as_str()),
            ) else {
                continue;
            };
            if h <= w {
                continue;
            }
            if (w, h) == TARGET_SIZE {
                best = Some(link);
                break;
            }
            if w * h > best_area {
                best = Some(link);
                best_area = w * h;
            }
        }
        if let Some(link) = best {
            out.push(StockCandidate {
                provider: StockProvider::Pexels,
                url: link.to_string(),
                duration,
            });
        }
    }
    out
}

/// Portrait Pixabay hits at least `min_duration` long, using the large rendition or the
/// medium one when large is missing.
pub fn parse_pixabay_videos(root: &Value, min_duration: f64) -> Vec<StockCandidate> {
    let Some(hits) = root.get("hits").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for hit in hits {
        let duration = hit.get("duration").and_then(|v| v.as_f64()).unwrap_or(0.0);
        if duration < min_duration {
            continue;
        }
        let renditions = hit.get("videos");
        let rendition = ["large", "medium"].into_iter().find_map(|size| {
            renditions
                .and_then(|r| r.get(size))
                .filter(|r| r.get("url").and_then(|u| u.as_str()).is_some_and(|u| !u.is_empty()))
        });
        let Some(rendition) = rendition else {
            continue;
        };
        let dims = |v: &Value| {
            (
                v.get("width").and_then(|w| w.as_u64()).unwrap_or(0),
                v.get("height").and_then(|h| h.as_u64()).unwrap_or(0),
            )
        };
        let (mut w, mut h) = dims(rendition);
        if w == 0 || h == 0 {
            (w, h) = dims(hit);
        }
        if h <= w {
            continue;
        }
        if let Some(url) = rendition.get("url").and_then(|u| u.as_str()) {
            out.push(StockCandidate {
                provider: StockProvider::Pixabay,
                url: url.to_string(),
                duration,
            });
        }
    }
    out
}

fn bracket_list_regex() -> Result<&'static Regex> {
    static LIST_RE: OnceCell<Regex> = OnceCell::new();
    LIST_RE.get_or_try_init(|| {
        Regex::new(r"(?s)\[(.*?)\]").context("failed to compile keyword list regex")
    })
}

/// Reads `['a', "b", c]` out of a free-form LLM reply.
pub fn parse_keyword_list(response: &str) -> Vec<String> {
    let Some(inner) = bracket_list_regex()
        .ok()
        .and_then(|re| re.captures(response))
        .and_then(|caps| caps.get(1))
    else {
        return Vec::new();
    };
    inner
        .as_str()
        .split(',')
        .map(|k| k.trim_matches(|c: char| c.is_whitespace() || c == '\'' || c == '"'))
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn alternative_keywords_prompt(scene: &Scene, product_info: &str, count: usize) -> String {
    let mut prompt = format!(
        "No stock video was found for the search keywords {:?}. Propose {} new, different and broader \
         ENGLISH search terms to illustrate this scene in a stock video library (Pexels/Pixabay). \
         Each term has 1 to 3 words. Answer only with a list, for example: ['term1', 'term2', 'term3'].\n\
         Scene description: {}\n",
        scene.search_keywords, count, scene.visual_description
    );
    if !product_info.trim().is_empty() {
        prompt.push_str(&format!("Product: {}\n", product_info));
    }
    prompt
}

/// `vid-<provider>-<sha256 of the url without query>.mp4`
pub fn cache_file_name(url: &str) -> String {
    let base = url.split('?').next().unwrap_or(url);
    let provider = if url.contains("pexels.com") {
        "pexels"
    } else if url.contains("pixabay.com") {
        "pixabay"
    } else {
        "generic"
    };
    let digest = Sha256::digest(base.as_bytes());
    format!("vid-{}-{:x}.mp4", provider, digest)
}

async fn cached_size(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

/// Downloads into `dir`, reusing a cached copy. `None` when the download failed or came
/// back suspiciously small.
pub async fn save_video(client: &Client, url: &str, dir: &Path) -> Result<Option<PathBuf>> {
    fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create dir {}", dir.display()))?;
    let path = dir.join(cache_file_name(url));

    if cached_size(&path).await > MIN_CACHED_BYTES {
        logi(format!("Stock video already cached: {}", path.display()));
        return Ok(Some(path));
    }

    logi(format!("Downloading stock video {} -> {}", url, path.display()));
    let resp = match client
        .get(url)
        .header("User-Agent", USER_AGENT)
        .timeout(std::time::Duration::from_secs(300))
        .send()
        .await
    {
        Ok(resp) => resp,
        Err(err) => {
            logw(format!("Stock download failed {}: {}", url, err));
            return Ok(None);
        }
    };
    if !resp.status().is_success() {
        logw(format!("Stock download HTTP {} for {}", resp.status().as_u16(), url));
        return Ok(None);
    }
    let bytes = match resp.bytes().await {
        Ok(bytes) => bytes,
        Err(err) => {
            logw(format!("Stock download interrupted {}: {}", url, err));
            return Ok(None);
        }
    };
    fs::write(&path, &bytes)
        .await
        .with_context(|| format!("write {}", path.display()))?;

    if cached_size(&path).await <= MIN_CACHED_BYTES {
        logw(format!("Downloaded file too small, discarding: {}", path.display()));
        let _ = fs::remove_file(&path).await;
        return Ok(None);
    }
    Ok(Some(path))
}

/// Searches the stock providers on behalf of one run. Owns the key rings it rotates.
pub struct StockFinder<'a> {
    client: &'a Client,
    cfg: &'a Config,
    pexels: KeyRing,
    pixabay: KeyRing,
}

impl<'a> StockFinder<'a> {
    pub fn new(client: &'a Client, cfg: &'a Config) -> Self {
        let pexels = KeyRing::new(cfg.pexels_api_keys.to_vec());
        let pixabay = KeyRing::new(cfg.pixabay_api_keys.to_vec());
        if pexels.is_empty() && pixabay.is_empty() {
            logw("No Pexels or Pixabay API keys configured; stock scenes will use placeholders.");
        }
        Self {
            client,
            cfg,
            pexels,
            pixabay,
        }
    }

    async fn get_json(
        &self,
        request: reqwest::RequestBuilder,
        provider: StockProvider,
    ) -> Option<Value> {
        let resp = match request
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(err) => {
                logw(format!("{} search request failed: {}", provider.name(), err));
                return None;
            }
        };
        if !resp.status().is_success() {
            logw(format!("{} search HTTP {}", provider.name(), resp.status().as_u16()));
            return None;
        }
        match resp.json::<Value>().await {
            Ok(value) => Some(value),
            Err(err) => {
                logw(format!("{} search response unreadable: {}", provider.name(), err));
                None
            }
        }
    }

    async fn search_pexels(&mut self, term: &str, min_duration: f64) -> Vec<StockCandidate> {
        let Some(key) = self.pexels.next_key().map(str::to_string) else {
            return Vec::new();
        };
        let per_page = PEXELS_PER_PAGE.to_string();
        let request = self
            .client
            .get("https://api.pexels.com/videos/search")
            .header("Authorization", key)
            .header("User-Agent", USER_AGENT)
            .query(&[
                ("query", term),
                ("per_page", per_page.as_str()),
                ("orientation", "portrait"),
            ]);
        let found = self
            .get_json(request, StockProvider::Pexels)
            .await
            .map(|root| parse_pexels_videos(&root, min_duration))
            .unwrap_or_default();
        logi(format!("Pexels '{}': {} portrait videos", term, found.len()));
        found
    }

    async fn search_pixabay(&mut self, term: &str, min_duration: f64) -> Vec<StockCandidate> {
        let Some(key) = self.pixabay.next_key().map(str::to_string) else {
            return Vec::new();
        };
        let per_page = PIXABAY_PER_PAGE.to_string();
        let request = self.client.get("https://pixabay.com/api/videos/").query(&[
            ("key", key.as_str()),
            ("q", term),
            ("video_type", "film"),
            ("orientation", "vertical"),
            ("per_page", per_page.as_str()),
        ]);
        let found = self
            .get_json(request, StockProvider::Pixabay)
            .await
            .map(|root| parse_pixabay_videos(&root, min_duration))
            .unwrap_or_default();
        logi(format!("Pixabay '{}': {} portrait videos", term, found.len()));
        found
    }

    async fn search_provider(
        &mut self,
        provider: StockProvider,
        term: &str,
        min_duration: f64,
    ) -> Vec<StockCandidate> {
        match provider {
            StockProvider::Pexels => self.search_pexels(term, min_duration).await,
            StockProvider::Pixabay => self.search_pixabay(term, min_duration).await,
        }
    }

    /// Preferred provider first; the other one only when the first found nothing.
    async fn search_keyword(&mut self, term: &str, min_duration: f64) -> Vec<StockCandidate> {
        let preferred = self.cfg.stock.preferred_source;
        let found = self.search_provider(preferred, term, min_duration).await;
        if !found.is_empty() {
            return found;
        }
        self.search_provider(preferred.other(), term, min_duration).await
    }

    async fn search_keywords(
        &mut self,
        keywords: &[String],
        min_duration: f64,
    ) -> Vec<StockCandidate> {
        for keyword in keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            let found = self.search_keyword(keyword, min_duration).await;
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    async fn alternative_keywords(&self, scene: &Scene, product_info: &str) -> Vec<String> {
        let count = self.cfg.stock.alternative_keywords;
        let prompt = alternative_keywords_prompt(scene, product_info, count);
        match openai::openai_generate_text(self.client, self.cfg, &prompt, false).await {
            Ok(Some(reply)) => {
                let mut keywords = parse_keyword_list(&reply);
                keywords.truncate(count);
                keywords
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                logw(format!("Alternative keyword request failed: {:#}", err));
                Vec::new()
            }
        }
    }

    /// Candidates for one scene: its own keywords in order, then LLM-proposed ones.
    pub async fn find_for_scene(
        &mut self,
        scene: &Scene,
        product_info: &str,
    ) -> Vec<StockCandidate> {
        let found = self
            .search_keywords(&scene.search_keywords, scene.duration_seconds)
            .await;
        if !found.is_empty() {
            return found;
        }

        logw(format!(
            "Scene {}: no stock video for {:?}; asking for broader keywords",
            scene.scene_number, scene.search_keywords
        ));
        let alternatives = self.alternative_keywords(scene, product_info).await;
        if alternatives.is_empty() {
            return Vec::new();
        }
        logi(format!("Scene {}: trying {:?}", scene.scene_number, alternatives));
        self.search_keywords(&alternatives, scene.duration_seconds).await
    }

    /// Downloads up to `videos_per_scene` clips for every `stock_video` scene.
    pub async fn find_and_download<R: Rng + ?Sized>(
        &mut self,
        scenes: &[Scene],
        product_info: &str,
        cache_dir: &Path,
        rng: &mut R,
    ) -> Result<BTreeMap<u32, Vec<PathBuf>>> {
        let mut pool = BTreeMap::new();
        let wanted = self.cfg.stock.videos_per_scene.max(1);

        for scene in scenes.iter().filter(|s| s.visual_type == VisualType::StockVideo) {
            let mut candidates = self.find_for_scene(scene, product_info).await;
            if candidates.is_empty() {
                logw(format!("Scene {}: no stock video found", scene.scene_number));
                continue;
            }
            candidates.shuffle(rng);

            let mut saved = Vec::new();
            for candidate in &candidates {
                if saved.len() >= wanted {
                    break;
                }
                if let Some(path) = save_video(self.client, &candidate.url, cache_dir).await? {
                    saved.push(path);
                }
            }
            if saved.is_empty() {
                logw(format!("Scene {}: every stock download failed", scene.scene_number));
                continue;
            }
            logok(format!("Scene {}: {} stock clip(s) ready", scene.scene_number, saved.len()));
            pool.insert(scene.scene_number, saved);
        }

        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pexels_prefers_exact_portrait_then_largest() {
        let root = json!({"videos": [
            {"duration": 12, "video_files": [
                {"width": 1920, "height": 1080, "link": "https://x/landscape"},
                {"width": 720, "height": 1280, "link": "https://x/small"},
                {"width": 1080, "height": 1920, "link": "https://x/exact"},
                {"width": 2160, "height": 3840, "link": "https://x/huge"}
            ]},
            {"duration": 9, "video_files": [
                {"width": 540, "height": 960, "link": "https://x/a"},
                {"width": 720, "height": 1280, "link": "https://x/b"},
                {"width": 720, "link": "https://x/broken"}
            ]},
            {"duration": 3, "video_files": [{"width": 1080, "height": 1920, "link": "https://x/short"}]}
        ]});
        let found = parse_pexels_videos(&root, 5.0);
        let urls: Vec<_> = found.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(urls, vec!["https://x/exact", "https://x/b"]);
        assert_eq!(found[0].duration, 12.0);
    }

    #[test]
    fn pixabay_falls_back_to_medium_and_skips_landscape() {
        let root = json!({"hits": [
            {"duration": 10, "videos": {"large": {"url": "", "width": 0, "height": 0},
                                        "medium": {"url": "https://p/m", "width": 720, "height": 1280}}},
            {"duration": 10, "videos": {"large": {"url": "https://p/wide", "width": 1920, "height": 1080}}},
            {"duration": 2, "videos": {"large": {"url": "https://p/short", "width": 1080, "height": 1920}}}
        ]});
        let found = parse_pixabay_videos(&root, 4.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://p/m");
        assert_eq!(found[0].provider, StockProvider::Pixabay);
    }

    #[test]
    fn keyword_lists_are_read_from_replies() {
        assert_eq!(
            parse_keyword_list("Sure: ['happy feet', \"foot care\", spa ]"),
            vec!["happy feet", "foot care", "spa"]
        );
        assert!(parse_keyword_list("nothing useful").is_empty());
    }

    #[test]
    fn cache_names_ignore_query_and_name_provider() {
        let a = cache_file_name("https://videos.pexels.com/v/1.mp4?token=a");
        let b = cache_file_name("https://videos.pexels.com/v/1.mp4?token=b");
        assert_eq!(a, b);
        assert!(a.starts_with("vid-pexels-"));
        assert!(a.ends_with(".mp4"));
        assert_eq!(a.len(), "vid-pexels-".len() + 64 + ".mp4".len());
        assert!(cache_file_name("https://cdn.pixabay.com/x.mp4").starts_with("vid-pixabay-"));
    }

    #[tokio::test]
    async fn cached_file_is_reused_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let url = "https://videos.pexels.com/v/cached.mp4";
        let path = dir.path().join(cache_file_name(url));
        fs::write(&path, vec![0u8; 2048]).await.unwrap();

        let client = Client::new();
        let saved = save_video(&client, url, dir.path()).await.unwrap();
        assert_eq!(saved, Some(path));
    }
}
