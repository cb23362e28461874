//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.concierge/config.json`) and environment.
//! The raw [`Config`] is permissive; [`Config::validate`] turns it into [`Settings`] or fails
//! with every missing or malformed value at once, so the process never starts half-configured.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Inbound HTTP server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Completion API (OpenAI chat completions).
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Context store (Airtable) holding property records.
    #[serde(default)]
    pub airtable: AirtableConfig,

    /// Delivery webhook that relays replies back into the messaging channel.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Pipeline behaviour (validation strictness, property matching, autopilot).
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Gateway bind, port, webhook path and optional inbound secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8787).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// Path of the inbound webhook (default "/webhook").
    #[serde(default = "default_webhook_path")]
    pub path: String,

    /// Shared secret expected in `X-Webhook-Secret`. Overridden by MAKE_WEBHOOK_SECRET env.
    pub inbound_secret: Option<String>,
}

fn default_gateway_port() -> u16 {
    8787
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            path: default_webhook_path(),
            inbound_secret: None,
        }
    }
}

/// OpenAI chat completions settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAiConfig {
    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,
    /// API base including the version segment (default "https://api.openai.com/v1").
    pub base_url: Option<String>,
    /// Model identifier (default "gpt-4-0125-preview").
    pub model: Option<String>,
    /// Request timeout in seconds (default 10).
    pub timeout_secs: Option<u64>,
}

/// Airtable settings for the property table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirtableConfig {
    /// Personal access token. Overridden by AIRTABLE_API_KEY env.
    pub api_key: Option<String>,
    /// Base id (e.g. "appXXXXXXXX"). Overridden by AIRTABLE_BASE_ID env.
    pub base_id: Option<String>,
    /// API root (default "https://api.airtable.com").
    pub base_url: Option<String>,
    /// Table name (default "Properties").
    pub table: Option<String>,
    /// View used for listing (default "Grid view").
    pub view: Option<String>,
    /// Field holding the guest contact used by sender matching. Unset disables sender matching.
    pub sender_field: Option<String>,
    /// Request timeout in seconds (default 10).
    pub timeout_secs: Option<u64>,
}

/// Delivery webhook settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryConfig {
    /// Outbound webhook URL. No default. Overridden by MAKE_WEBHOOK_URL env.
    pub webhook_url: Option<String>,
    /// Request timeout in seconds (default 10).
    pub timeout_secs: Option<u64>,
}

/// How strictly the inbound payload is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Every field must be a non-empty JSON string.
    #[default]
    Strict,
    /// Missing or empty fields are rejected; number and boolean scalars are accepted as text.
    Lenient,
}

/// How the property for a sender is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// First record in store order, sender ignored.
    #[default]
    First,
    /// Exact lookup on the normalized value of `airtable.senderField`.
    Sender,
}

/// Relay pipeline options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default)]
    pub validation: ValidationMode,
    #[serde(default)]
    pub matching: MatchingStrategy,
    /// When false, messages are acknowledged without generating or sending a reply.
    #[serde(default = "default_autopilot")]
    pub autopilot: bool,
}

fn default_autopilot() -> bool {
    true
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            validation: ValidationMode::default(),
            matching: MatchingStrategy::default(),
            autopilot: default_autopilot(),
        }
    }
}

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-0125-preview";
pub const DEFAULT_AIRTABLE_BASE_URL: &str = "https://api.airtable.com";
pub const DEFAULT_AIRTABLE_TABLE: &str = "Properties";
pub const DEFAULT_AIRTABLE_VIEW: &str = "Grid view";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Validated configuration. Every required value is present and well-formed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway: GatewaySettings,
    pub openai: OpenAiSettings,
    pub airtable: AirtableSettings,
    pub delivery: DeliverySettings,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub bind: String,
    pub port: u16,
    pub path: String,
    pub inbound_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AirtableSettings {
    pub api_key: String,
    pub base_id: String,
    pub base_url: String,
    pub table: String,
    pub view: String,
    pub sender_field: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub webhook_url: reqwest::Url,
    pub timeout: Duration,
}

/// Configuration rejected at startup. Lists every problem found.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {}", .0.join("; "))]
pub struct ConfigError(pub Vec<String>);

/// Trimmed, non-empty value or None.
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Env var (trimmed, non-empty) overrides the config value.
fn env_or(key: &str, fallback: Option<&String>) -> Option<String> {
    non_empty(std::env::var(key).ok().as_deref()).or_else(|| non_empty(fallback.map(String::as_str)))
}

fn timeout(secs: Option<u64>) -> Duration {
    Duration::from_secs(secs.filter(|s| *s > 0).unwrap_or(DEFAULT_TIMEOUT_SECS))
}

fn trim_base(url: Option<&String>, default: &str) -> String {
    non_empty(url.map(String::as_str))
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

impl Config {
    /// Apply environment overrides (OPENAI_API_KEY, AIRTABLE_API_KEY, AIRTABLE_BASE_ID,
    /// MAKE_WEBHOOK_URL, MAKE_WEBHOOK_SECRET). Empty env values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        self.openai.api_key = env_or("OPENAI_API_KEY", self.openai.api_key.as_ref());
        self.airtable.api_key = env_or("AIRTABLE_API_KEY", self.airtable.api_key.as_ref());
        self.airtable.base_id = env_or("AIRTABLE_BASE_ID", self.airtable.base_id.as_ref());
        self.delivery.webhook_url = env_or("MAKE_WEBHOOK_URL", self.delivery.webhook_url.as_ref());
        self.gateway.inbound_secret =
            env_or("MAKE_WEBHOOK_SECRET", self.gateway.inbound_secret.as_ref());
        self
    }

    /// Check required values and build [`Settings`]. Does not read the environment; call
    /// [`Config::with_env_overrides`] first when env should apply.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let mut problems = Vec::new();

        let openai_key = non_empty(self.openai.api_key.as_deref());
        if openai_key.is_none() {
            problems.push("openai.apiKey is required (or OPENAI_API_KEY)".to_string());
        }
        let airtable = self.airtable_settings(&mut problems);
        let webhook_url = match non_empty(self.delivery.webhook_url.as_deref()) {
            None => {
                problems.push("delivery.webhookUrl is required (or MAKE_WEBHOOK_URL)".to_string());
                None
            }
            Some(raw) => match reqwest::Url::parse(&raw) {
                Ok(u) if u.scheme() == "http" || u.scheme() == "https" => Some(u),
                Ok(u) => {
                    problems.push(format!(
                        "delivery.webhookUrl must be http or https, got scheme {}",
                        u.scheme()
                    ));
                    None
                }
                Err(e) => {
                    problems.push(format!("delivery.webhookUrl must be a valid URL: {}", e));
                    None
                }
            },
        };
        if self.relay.matching == MatchingStrategy::Sender
            && non_empty(self.airtable.sender_field.as_deref()).is_none()
        {
            problems.push("relay.matching \"sender\" requires airtable.senderField".to_string());
        }
        let path = self.gateway.path.trim();
        if !path.starts_with('/') {
            problems.push(format!("gateway.path must start with '/', got {:?}", path));
        }

        let (Some(openai_key), Some(airtable), Some(webhook_url), true) =
            (openai_key, airtable, webhook_url, problems.is_empty())
        else {
            return Err(ConfigError(problems));
        };

        Ok(Settings {
            gateway: GatewaySettings {
                bind: self.gateway.bind.trim().to_string(),
                port: self.gateway.port,
                path: path.to_string(),
                inbound_secret: non_empty(self.gateway.inbound_secret.as_deref()),
            },
            openai: OpenAiSettings {
                api_key: openai_key,
                base_url: trim_base(self.openai.base_url.as_ref(), DEFAULT_OPENAI_BASE_URL),
                model: non_empty(self.openai.model.as_deref())
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                timeout: timeout(self.openai.timeout_secs),
            },
            airtable,
            delivery: DeliverySettings {
                webhook_url,
                timeout: timeout(self.delivery.timeout_secs),
            },
            relay: self.relay.clone(),
        })
    }

    /// Check only the `airtable` section. Used by the property admin commands, which never
    /// touch the completion API or the delivery webhook.
    pub fn validate_airtable(&self) -> Result<AirtableSettings, ConfigError> {
        let mut problems = Vec::new();
        self.airtable_settings(&mut problems)
            .ok_or(ConfigError(problems))
    }

    fn airtable_settings(&self, problems: &mut Vec<String>) -> Option<AirtableSettings> {
        let api_key = non_empty(self.airtable.api_key.as_deref());
        if api_key.is_none() {
            problems.push("airtable.apiKey is required (or AIRTABLE_API_KEY)".to_string());
        }
        let base_id = non_empty(self.airtable.base_id.as_deref());
        if base_id.is_none() {
            problems.push("airtable.baseId is required (or AIRTABLE_BASE_ID)".to_string());
        }
        Some(AirtableSettings {
            api_key: api_key?,
            base_id: base_id?,
            base_url: trim_base(self.airtable.base_url.as_ref(), DEFAULT_AIRTABLE_BASE_URL),
            table: non_empty(self.airtable.table.as_deref())
                .unwrap_or_else(|| DEFAULT_AIRTABLE_TABLE.to_string()),
            view: non_empty(self.airtable.view.as_deref())
                .unwrap_or_else(|| DEFAULT_AIRTABLE_VIEW.to_string()),
            sender_field: non_empty(self.airtable.sender_field.as_deref()),
            timeout: timeout(self.airtable.timeout_secs),
        })
    }
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("CONCIERGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".concierge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, CONCIERGE_CONFIG_PATH, or the default. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Load, apply env overrides and validate. The one startup routine the CLI calls.
pub fn load_settings(path: Option<PathBuf>) -> Result<(Settings, PathBuf)> {
    let (config, path) = load_config(path)?;
    let settings = config
        .with_env_overrides()
        .validate()
        .with_context(|| format!("validating config from {}", path.display()))?;
    Ok((settings, path))
}

/// Load, apply env overrides and validate only the `airtable` section.
pub fn load_airtable_settings(path: Option<PathBuf>) -> Result<(AirtableSettings, PathBuf)> {
    let (config, path) = load_config(path)?;
    let settings = config
        .with_env_overrides()
        .validate_airtable()
        .with_context(|| format!("validating airtable config from {}", path.display()))?;
    Ok((settings, path))
}
