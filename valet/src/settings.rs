//! Typed, immutable settings snapshot read once from the environment.
//!
//! The `config` crate layers `.env` and XDG TOML into the environment before
//! this runs; `Settings::from_env` is the single read point and fails fast on
//! invalid values. The snapshot is passed by value into the service container
//! and never mutated afterwards.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// One MCP server endpoint, keyed by server id in [`Settings::mcp_servers`].
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum McpServerConfig {
    /// Child process speaking newline-delimited JSON-RPC on stdio.
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// HTTP endpoint; responses may arrive as JSON or as an SSE stream.
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// A `tool_name -> (server_id, remote_tool_name)` route for the execution facade.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct McpRoute {
    pub server_id: String,
    pub remote_name: String,
}

/// Process-wide configuration, immutable after startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: String,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub llm_model: String,
    pub embedding_model: String,

    pub stt_base_url: Option<String>,
    pub stt_api_key: Option<String>,
    pub tts_base_url: Option<String>,

    pub smtp_host: Option<String>,
    pub mail_api_url: Option<String>,
    pub whatsapp_api_url: Option<String>,
    pub calendly_api_url: Option<String>,
    pub whatsapp_token: Option<String>,
    pub whatsapp_app_secret: Option<String>,
    pub calendly_token: Option<String>,
    pub calendly_webhook_key: Option<String>,

    /// `server_id -> endpoint` for the MCP pool, from `MCP_SERVERS` (JSON).
    pub mcp_servers: HashMap<String, McpServerConfig>,
    /// `tool_name -> route` for the execution facade, from `MCP_TOOL_ROUTES` (JSON).
    pub mcp_tool_routes: HashMap<String, McpRoute>,

    pub mock_mode: bool,
    pub dev_mode: bool,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_max_size: usize,
    pub max_iterations: u32,
    /// Inclusive start hour, exclusive end hour for scheduled events.
    pub working_hours: (u32, u32),
    pub max_lookahead_days: i64,
    pub request_deadline: Duration,
    pub tool_call_timeout: Duration,
    pub tts_first_chunk_timeout: Duration,
}

fn var(key: &'static str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, SettingsError> {
    match var(key) {
        None => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|_| SettingsError::Invalid { key, value: v }),
    }
}

fn parse_bool(key: &'static str, default: bool) -> Result<bool, SettingsError> {
    match var(key).as_deref() {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(v) => Err(SettingsError::Invalid {
            key,
            value: v.to_string(),
        }),
    }
}

fn parse_working_hours(key: &'static str) -> Result<(u32, u32), SettingsError> {
    let raw = match var(key) {
        None => return Ok((9, 19)),
        Some(v) => v,
    };
    let invalid = || SettingsError::Invalid {
        key,
        value: raw.clone(),
    };
    let (start, end) = raw.split_once('-').ok_or_else(invalid)?;
    let start: u32 = start.trim().parse().map_err(|_| invalid())?;
    let end: u32 = end.trim().parse().map_err(|_| invalid())?;
    if start >= end || end > 24 {
        return Err(invalid());
    }
    Ok((start, end))
}

impl Settings {
    /// Reads the full snapshot. Any invalid value is a hard error so the
    /// process refuses to start on broken configuration.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mcp_servers = match var("MCP_SERVERS") {
            None => HashMap::new(),
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|_| SettingsError::Invalid {
                    key: "MCP_SERVERS",
                    value: raw,
                })?
            }
        };
        let mcp_tool_routes = match var("MCP_TOOL_ROUTES") {
            None => HashMap::new(),
            Some(raw) => {
                serde_json::from_str(&raw).map_err(|_| SettingsError::Invalid {
                    key: "MCP_TOOL_ROUTES",
                    value: raw,
                })?
            }
        };

        Ok(Self {
            database_path: var("DATABASE_PATH").unwrap_or_else(|| "valet.db".to_string()),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL"),
            llm_model: var("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            embedding_model: var("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            stt_base_url: var("STT_BASE_URL"),
            stt_api_key: var("STT_API_KEY"),
            tts_base_url: var("TTS_BASE_URL"),
            smtp_host: var("SMTP_HOST"),
            mail_api_url: var("MAIL_API_URL"),
            whatsapp_api_url: var("WHATSAPP_API_URL"),
            calendly_api_url: var("CALENDLY_API_URL"),
            whatsapp_token: var("WHATSAPP_TOKEN"),
            whatsapp_app_secret: var("WHATSAPP_APP_SECRET"),
            calendly_token: var("CALENDLY_TOKEN"),
            calendly_webhook_key: var("CALENDLY_WEBHOOK_KEY"),
            mcp_servers,
            mcp_tool_routes,
            mock_mode: parse_bool("MOCK_MODE", false)?,
            dev_mode: parse_bool("DEV_MODE", false)?,
            cache_enabled: parse_bool("CACHE_ENABLED", true)?,
            cache_ttl: Duration::from_secs(parse_var("CACHE_TTL", 3600u64)?),
            cache_max_size: parse_var("CACHE_MAX_SIZE", 1000usize)?,
            max_iterations: parse_var("MAX_ITERATIONS", 5u32)?,
            working_hours: parse_working_hours("WORKING_HOURS")?,
            max_lookahead_days: parse_var("MAX_LOOKAHEAD_DAYS", 90i64)?,
            request_deadline: Duration::from_secs(parse_var("REQUEST_DEADLINE_SECS", 30u64)?),
            tool_call_timeout: Duration::from_secs(parse_var("TOOL_CALL_TIMEOUT_SECS", 20u64)?),
            tts_first_chunk_timeout: Duration::from_millis(parse_var(
                "TTS_FIRST_CHUNK_TIMEOUT_MS",
                2000u64,
            )?),
        })
    }

    /// Defaults suitable for tests: mock mode, in-memory-ish paths, no keys.
    pub fn for_tests() -> Self {
        Self {
            database_path: ":memory:".to_string(),
            openai_api_key: None,
            openai_base_url: None,
            llm_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            stt_base_url: None,
            stt_api_key: None,
            tts_base_url: None,
            smtp_host: None,
            mail_api_url: None,
            whatsapp_api_url: None,
            calendly_api_url: None,
            whatsapp_token: None,
            whatsapp_app_secret: None,
            calendly_token: None,
            calendly_webhook_key: None,
            mcp_servers: HashMap::new(),
            mcp_tool_routes: HashMap::new(),
            mock_mode: true,
            dev_mode: false,
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            cache_max_size: 1000,
            max_iterations: 5,
            working_hours: (9, 19),
            max_lookahead_days: 90,
            request_deadline: Duration::from_secs(30),
            tool_call_timeout: Duration::from_secs(20),
            tts_first_chunk_timeout: Duration::from_millis(2000),
        }
    }
}
