//! Web tools: URL extraction, page scraping, and a keyword sweep over news
//! sites for candidate events.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use url::Url;

use crate::error::ToolError;
use crate::tools::{require_str, Tool, ToolCallContent, ToolSpec};

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"'\)\]]+"#).expect("static regex"));
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
static META_DESC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]+(?:name="description"|property="og:description")[^>]+content="([^"]*)""#)
        .expect("static regex")
});
static OG_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<meta[^>]+property="og:image"[^>]+content="([^"]*)""#).expect("static regex")
});
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("static regex"));

/// Extracts URLs from free text. With `normalize`, each URL is reparsed so the
/// scheme and host are canonical; with `remove_duplicates`, later repeats are
/// dropped while order of first appearance is kept. Idempotent: running the
/// output through again yields the same list.
pub fn extract_urls(text: &str, normalize: bool, remove_duplicates: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in URL_RE.find_iter(text) {
        let raw = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
        let candidate = if normalize {
            match Url::parse(raw) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            }
        } else {
            raw.to_string()
        };
        if !remove_duplicates || !out.contains(&candidate) {
            out.push(candidate);
        }
    }
    out
}

pub struct ExtractUrlsTool;

#[async_trait]
impl Tool for ExtractUrlsTool {
    fn name(&self) -> &str {
        "extract_urls"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some("Extract URLs from text; optionally normalise and deduplicate.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "text": {"type": "string"},
                    "normalize": {"type": "boolean", "default": true},
                    "remove_duplicates": {"type": "boolean", "default": true}
                },
                "required": ["text"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let text = require_str(&args, "text")?;
        let normalize = args
            .get("normalize")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let remove_duplicates = args
            .get("remove_duplicates")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let urls = extract_urls(text, normalize, remove_duplicates);
        Ok(ToolCallContent::json(json!({"urls": urls})))
    }
}

fn shared_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent("valet-assistant/0.1")
        .build()
        .unwrap_or_default()
}

/// Scrapes one page: title, description, social image and optionally the
/// visible text.
pub struct ScrapeWebContentTool {
    client: reqwest::Client,
}

impl ScrapeWebContentTool {
    pub fn new() -> Self {
        Self {
            client: shared_client(),
        }
    }
}

impl Default for ScrapeWebContentTool {
    fn default() -> Self {
        Self::new()
    }
}

fn first_capture(re: &Regex, html: &str) -> Option<String> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn visible_text(html: &str) -> String {
    let stripped = TAG_RE.replace_all(html, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl Tool for ScrapeWebContentTool {
    fn name(&self) -> &str {
        "scrape_web_content"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some(
                "Fetch a URL and extract title, description and social image; optionally the page text."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "extract_image": {"type": "boolean", "default": true},
                    "extract_text": {"type": "boolean", "default": false}
                },
                "required": ["url"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let raw_url = require_str(&args, "url")?;
        let url = Url::parse(raw_url)
            .map_err(|e| ToolError::InvalidArguments(format!("bad url {raw_url}: {e}")))?;
        let extract_image = args
            .get("extract_image")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        let extract_text = args
            .get("extract_text")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ToolError::Application(format!(
                "HTTP {} fetching {url}",
                resp.status()
            )));
        }
        let html = resp
            .text()
            .await
            .map_err(|e| ToolError::Transport(e.to_string()))?;

        let mut value = json!({
            "url": url.to_string(),
            "title": first_capture(&TITLE_RE, &html),
            "description": first_capture(&META_DESC_RE, &html),
        });
        if extract_image {
            value["image"] = json!(first_capture(&OG_IMAGE_RE, &html));
        }
        if extract_text {
            let mut text = visible_text(&html);
            text.truncate(8_000);
            value["text"] = json!(text);
        }
        Ok(ToolCallContent::json(value))
    }
}

/// Sweeps news sites for lines matching the given keywords and reports
/// candidate events (title, url, matched keyword, snippet).
pub struct ScrapeNewsForEventsTool {
    client: reqwest::Client,
}

impl ScrapeNewsForEventsTool {
    pub fn new() -> Self {
        Self {
            client: shared_client(),
        }
    }
}

impl Default for ScrapeNewsForEventsTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ScrapeNewsForEventsTool {
    fn name(&self) -> &str {
        "scrape_news_for_events"
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: Some(
                "Scan news sites for keyword matches and return candidate events.".to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sites": {"type": "array", "items": {"type": "string"}},
                    "keywords": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["sites", "keywords"]
            }),
        }
    }

    async fn call(&self, args: serde_json::Value) -> Result<ToolCallContent, ToolError> {
        let str_list = |key: &str| -> Result<Vec<String>, ToolError> {
            args.get(key)
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .ok_or_else(|| ToolError::InvalidArguments(format!("missing field: {key}")))
        };
        let sites = str_list("sites")?;
        let keywords: Vec<String> = str_list("keywords")?
            .into_iter()
            .map(|k| k.to_lowercase())
            .collect();

        let mut candidates = Vec::new();
        for site in &sites {
            let Ok(url) = Url::parse(site) else { continue };
            let resp = match self.client.get(url.clone()).send().await {
                Ok(r) if r.status().is_success() => r,
                _ => continue,
            };
            let Ok(html) = resp.text().await else { continue };
            let page_title = first_capture(&TITLE_RE, &html);
            let text = visible_text(&html);
            for sentence in text.split(['.', '\n']) {
                let lower = sentence.to_lowercase();
                if let Some(keyword) = keywords.iter().find(|k| lower.contains(k.as_str())) {
                    candidates.push(json!({
                        "site": url.to_string(),
                        "title": page_title,
                        "keyword": keyword,
                        "snippet": sentence.trim().chars().take(280).collect::<String>(),
                    }));
                }
                if candidates.len() >= 50 {
                    break;
                }
            }
        }
        Ok(ToolCallContent::json(json!({"candidates": candidates})))
    }
}
