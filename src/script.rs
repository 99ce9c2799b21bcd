use crate::logw;
use crate::timing::write_json;
use anyhow::{Context, Result, bail};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tokio::fs;

pub const DEFAULT_TARGET_DURATION: u32 = 25;
const DURATION_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VisualType {
    Hook,
    StockVideo,
    AiImage,
    ProductShot,
    ProductVideo,
    Unknown(String),
}

impl VisualType {
    pub fn as_str(&self) -> &str {
        match self {
            VisualType::Hook => "hook",
            VisualType::StockVideo => "stock_video",
            VisualType::AiImage => "ai_image",
            VisualType::ProductShot => "product_shot",
            VisualType::ProductVideo => "product_video",
            VisualType::Unknown(raw) => raw,
        }
    }
}

impl From<String> for VisualType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hook" => VisualType::Hook,
            "stock_video" => VisualType::StockVideo,
            "ai_image" => VisualType::AiImage,
            "product_shot" => VisualType::ProductShot,
            "product_video" => VisualType::ProductVideo,
            _ => VisualType::Unknown(raw),
        }
    }
}

impl From<VisualType> for String {
    fn from(value: VisualType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for VisualType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    pub visual_type: VisualType,
    #[serde(default)]
    pub visual_description: String,
    #[serde(default)]
    pub voiceover_text: String,
    pub duration_seconds: f64,
    #[serde(default)]
    pub search_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_title_suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_hashtags: Vec<String>,
    pub script: String,
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub total_duration_estimated: Option<serde_json::Value>,
}

fn fenced_json_regex() -> Result<&'static Regex> {
    static FENCE_RE: OnceCell<Regex> = OnceCell::new();
    FENCE_RE.get_or_try_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```")
            .context("failed to compile fenced json regex")
    })
}

/// Picks the JSON object out of an LLM reply: a fenced block first, then the outermost
/// pair of braces.
pub fn locate_json(response: &str) -> Option<&str> {
    if let Some(caps) = fenced_json_regex().ok().and_then(|re| re.captures(response)) {
        if let Some(m) = caps.get(1) {
            return Some(m.as_str().trim());
        }
    }
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| response[start..=end].trim())
}

impl ScriptDocument {
    pub fn from_llm_response(response: &str) -> Result<Self> {
        let Some(json) = locate_json(response) else {
            bail!("no JSON object found in script response");
        };
        let doc: ScriptDocument =
            serde_json::from_str(json).context("script response is not a valid script document")?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> Result<()> {
        if self.script.trim().is_empty() {
            bail!("script text is empty");
        }
        if self.scenes.is_empty() {
            bail!("script has no scenes");
        }

        let mut seen = HashSet::new();
        for scene in &self.scenes {
            if !scene.duration_seconds.is_finite() || scene.duration_seconds <= 0.0 {
                bail!(
                    "scene {} has invalid duration {}",
                    scene.scene_number,
                    scene.duration_seconds
                );
            }
            if !seen.insert(scene.scene_number) {
                bail!("scene number {} appears twice", scene.scene_number);
            }
            match &scene.visual_type {
                VisualType::ProductVideo if !scene.search_keywords.is_empty() => logw(format!(
                    "Scene {} (product_video) carries search keywords that will be ignored",
                    scene.scene_number
                )),
                VisualType::Unknown(raw) => logw(format!(
                    "Scene {} has unrecognized visual type '{}'",
                    scene.scene_number, raw
                )),
                _ => {}
            }
        }

        if let Some(estimate) = self.estimated_total() {
            let sum = self.scene_duration_sum();
            if (estimate - sum).abs() > DURATION_TOLERANCE {
                logw(format!(
                    "Estimated total duration {:.1}s differs from scene sum {:.1}s",
                    estimate, sum
                ));
            }
        }
        Ok(())
    }

    /// The estimate as a number; LLMs sometimes send it as a string.
    pub fn estimated_total(&self) -> Option<f64> {
        match self.total_duration_estimated.as_ref()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn scene_duration_sum(&self) -> f64 {
        self.scenes.iter().map(|s| s.duration_seconds).sum()
    }

    /// Scenes in ascending `scene_number`.
    pub fn ordered_scenes(&self) -> Vec<&Scene> {
        let mut scenes: Vec<&Scene> = self.scenes.iter().collect();
        scenes.sort_by_key(|s| s.scene_number);
        scenes
    }

    /// One prompt per `ai_image` scene, in scene order. A scene without a description
    /// still gets an entry so the image queue stays in step with the scenes.
    pub fn image_prompts(&self) -> Vec<ImagePrompt> {
        self.ordered_scenes()
            .into_iter()
            .filter(|s| s.visual_type == VisualType::AiImage)
            .map(|s| ImagePrompt {
                scene_number: s.scene_number,
                prompt: s.visual_description.trim().to_string(),
            })
            .collect()
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self).await
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("read script: {}", path.display()))?;
        let doc: ScriptDocument = serde_json::from_str(&content)
            .with_context(|| format!("parse script: {}", path.display()))?;
        doc.validate()?;
        Ok(doc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePrompt {
    pub scene_number: u32,
    pub prompt: String,
}

/// Inputs for the script-writing prompt.
#[derive(Debug, Clone)]
pub struct ScriptRequest<'a> {
    pub product_info: &'a str,
    pub topic: &'a str,
    pub hook_description: Option<&'a str>,
    pub language: &'a str,
    pub target_duration_seconds: u32,
}

impl ScriptRequest<'_> {
    pub fn prompt(&self) -> String {
        let hook = self
            .hook_description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or("(no hook video description available; invent a strong visual opener)");
        let topic = if self.topic.trim().is_empty() {
            "general"
        } else {
            self.topic
        };

        format!(
            "ROLE: You write viral short-form vertical (9:16) marketing videos that drive clicks and sales.\n\
             GOAL: Write a JSON script for a video of about {duration} seconds centered on the product '{product}'.\n\n\
             INPUTS:\n- Product: {product}\n- Topic / angle: {topic}\n- Opening hook video: {hook}\n- Target duration: {duration} seconds\n\
             - Voiceover language: {language}\n\n\
             STRUCTURE: hook, then two or three quick tips or reveals tied to the product, then a clear call to action.\n\n\
             Return ONLY a JSON object with this shape:\n\
             {{\"video_title_suggestion\": \"...\", \"suggested_hashtags\": [\"#...\"], \"script\": \"FULL VOICEOVER TEXT in {language}, naming '{product}' at least twice\",\n \
             \"scenes\": [{{\"scene_number\": 1, \"visual_type\": \"hook\", \"visual_description\": \"...\", \"search_keywords\": [\"...\"], \"voiceover_text\": \"...\", \"duration_seconds\": 4}}],\n \
             \"total_duration_estimated\": <integer sum of duration_seconds>}}\n\n\
             RULES:\n\
             - visual_type must be one of: hook, stock_video, ai_image, product_shot, product_video.\n\
             - Durations: hook exactly 4 s, stock_video at most 8 s, product_video 15 s, product_shot and ai_image at most 3 s.\n\
             - search_keywords: 1 to 3 broad ENGLISH terms matching the visual description; [] for product_video.\n\
             - scene_number starts at 1 and increases by one.\n\
             - The final call-to-action scene shows the product (product_shot or product_video).\n\
             - voiceover_text of all scenes read in order equals the script text.\n\
             - No text before or after the JSON.\n",
            duration = self.target_duration_seconds,
            product = self.product_info,
            topic = topic,
            hook = hook,
            language = self.language,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str = r##"Here you go:
```json
{
  "video_title_suggestion": "Glow up",
  "suggested_hashtags": ["#glow"],
  "script": "Tu connais ce sérum ? Le sérum Lumi change tout.",
  "scenes": [
    {"scene_number": 2, "visual_type": "stock_video", "visual_description": "woman mirror",
     "search_keywords": ["skin care"], "voiceover_text": "Le sérum Lumi change tout.", "duration_seconds": 6},
    {"scene_number": 1, "visual_type": "hook", "visual_description": "pov", "search_keywords": [],
     "voiceover_text": "Tu connais ce sérum ?", "duration_seconds": 4},
    {"scene_number": 3, "visual_type": "ai_image", "visual_description": "glowing bottle on marble",
     "search_keywords": ["serum"], "voiceover_text": "", "duration_seconds": 2.5},
    {"scene_number": 4, "visual_type": "hologram", "duration_seconds": 3}
  ],
  "total_duration_estimated": "16"
}
```
Enjoy!"##;

    #[test]
    fn parses_fenced_reply() {
        let doc = ScriptDocument::from_llm_response(REPLY).unwrap();
        assert_eq!(doc.scenes.len(), 4);
        assert_eq!(doc.estimated_total(), Some(16.0));
        let order: Vec<u32> = doc.ordered_scenes().iter().map(|s| s.scene_number).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(
            doc.scenes[3].visual_type,
            VisualType::Unknown("hologram".to_string())
        );
        assert_eq!(
            doc.image_prompts(),
            vec![ImagePrompt {
                scene_number: 3,
                prompt: "glowing bottle on marble".to_string()
            }]
        );
    }

    #[test]
    fn falls_back_to_outer_braces() {
        let reply = "Sure! {\"script\": \"Hi.\", \"scenes\": [{\"scene_number\": 1, \"visual_type\": \"product_shot\", \"duration_seconds\": 3}]} Bye";
        let doc = ScriptDocument::from_llm_response(reply).unwrap();
        assert_eq!(doc.scenes[0].visual_type, VisualType::ProductShot);
        assert!(doc.scenes[0].search_keywords.is_empty());
    }

    #[test]
    fn rejects_invalid_documents() {
        let no_scenes = r#"{"script": "x", "scenes": []}"#;
        assert!(ScriptDocument::from_llm_response(no_scenes).is_err());

        let zero = r#"{"script": "x", "scenes": [{"scene_number": 1, "visual_type": "hook", "duration_seconds": 0}]}"#;
        assert!(ScriptDocument::from_llm_response(zero).is_err());

        let dup = r#"{"script": "x", "scenes": [
            {"scene_number": 1, "visual_type": "hook", "duration_seconds": 2},
            {"scene_number": 1, "visual_type": "ai_image", "duration_seconds": 2}]}"#;
        assert!(ScriptDocument::from_llm_response(dup).is_err());

        let bad_keywords = r#"{"script": "x", "scenes": [{"scene_number": 1, "visual_type": "hook", "duration_seconds": 2, "search_keywords": "beach"}]}"#;
        assert!(ScriptDocument::from_llm_response(bad_keywords).is_err());

        assert!(ScriptDocument::from_llm_response("no json here").is_err());
    }

    #[test]
    fn visual_type_serializes_back_to_its_name() {
        let scene = Scene {
            scene_number: 1,
            visual_type: VisualType::Unknown("Hologram".to_string()),
            visual_description: String::new(),
            voiceover_text: String::new(),
            duration_seconds: 1.0,
            search_keywords: vec![],
        };
        let json = serde_json::to_value(&scene).unwrap();
        assert_eq!(json["visual_type"], "Hologram");
        let stock: VisualType = serde_json::from_str("\"Stock_Video\"").unwrap();
        assert_eq!(stock, VisualType::StockVideo);
    }

    #[test]
    fn prompt_mentions_inputs() {
        let request = ScriptRequest {
            product_info: "Lumi serum",
            topic: "",
            hook_description: Some("a woman gasps at the mirror"),
            language: "French",
            target_duration_seconds: 30,
        };
        let prompt = request.prompt();
        assert!(prompt.contains("Lumi serum"));
        assert!(prompt.contains("a woman gasps at the mirror"));
        assert!(prompt.contains("30 seconds"));
        assert!(prompt.contains("Topic / angle: general"));
    }

    #[tokio::test]
    async fn save_and_load_keep_scenes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.json");
        let doc = ScriptDocument::from_llm_response(REPLY).unwrap();
        doc.save(&path).await.unwrap();
        let loaded = ScriptDocument::load(&path).await.unwrap();
        assert_eq!(loaded.scenes, doc.scenes);
    }
}
