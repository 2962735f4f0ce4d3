use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_BIND: &str = "127.0.0.1";
/// Minimum accepted length for the admin shared secret.
pub const MIN_ADMIN_KEY_LEN: usize = 32;

/// Top-level config (folio.toml + FOLIO_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolioConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub env: Environment,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Comma-separated list of allowed CORS origins. Empty disables CORS.
    #[serde(default)]
    pub cors_origins: String,
    /// Salt mixed into the per-client address hash.
    #[serde(default = "default_ip_salt")]
    pub ip_salt: String,
    /// When true the process logs that telemetry export is not bundled.
    /// Recognised for config compatibility; no exporter ships with the core.
    #[serde(default)]
    pub telemetry: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            env: Environment::Development,
            port: default_port(),
            bind: default_bind(),
            cors_origins: String::new(),
            ip_salt: default_ip_salt(),
            telemetry: false,
        }
    }
}

impl ServerConfig {
    /// Split `cors_origins` into trimmed, non-empty entries.
    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Shared admin secret, compared in constant time. Must be at least
    /// [`MIN_ADMIN_KEY_LEN`] characters — enforced by [`FolioConfig::validate`].
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Shared cache backend selection. The in-process map is used when `url`
/// is unset; a remote KV backend is recognised but not bundled.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider label used in logs and upstream error payloads.
    #[serde(default = "default_provider")]
    pub provider: String,
    pub api_key: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Per-request timeout for the chat-completions call.
    #[serde(default = "default_llm_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Burst size of the token bucket.
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    /// Tokens restored per second.
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,
    /// Bucket lifetime in the shared cache.
    #[serde(default = "default_limiter_ttl")]
    pub ttl_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_rate: default_refill_rate(),
            ttl_secs: default_limiter_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// How many persisted messages are replayed into the prompt.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
    /// End-to-end deadline for one chat request, retries and tool loops
    /// included.
    #[serde(default = "default_chat_deadline_ms")]
    pub deadline_ms: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            history_window: default_history_window(),
            max_message_chars: default_max_message_chars(),
            deadline_ms: default_chat_deadline_ms(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_ip_salt() -> String {
    "folio-ip-salt".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.folio/folio.db", home)
}
fn default_provider() -> String {
    "openai".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_temperature() -> f32 {
    0.7
}
fn default_llm_timeout_ms() -> u64 {
    30_000
}
fn default_max_retries() -> u32 {
    3
}
fn default_capacity() -> f64 {
    10.0
}
fn default_refill_rate() -> f64 {
    0.5
}
fn default_limiter_ttl() -> u64 {
    300
}
fn default_system_prompt() -> String {
    "You are the assistant for a personal portfolio site. Answer questions \
     about the portfolio owner's projects, experience, education, and skills \
     using the available tools. Be concise and factual."
        .to_string()
}
fn default_history_window() -> usize {
    20
}
fn default_max_message_chars() -> usize {
    2000
}
fn default_chat_deadline_ms() -> u64 {
    60_000
}

impl FolioConfig {
    /// Load config from a TOML file with FOLIO_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ./folio.toml
    ///
    /// Env keys use a double underscore as the section separator so field
    /// names may contain single underscores: `FOLIO_LIMITER__REFILL_RATE`
    /// maps to `limiter.refill_rate`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("folio.toml");

        let config: FolioConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("FOLIO_").split("__"))
            .extract()
            .map_err(|e| crate::error::FolioError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot serve traffic safely.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.admin.api_key.len() < MIN_ADMIN_KEY_LEN {
            return Err(crate::error::FolioError::Config(format!(
                "admin.api_key must be at least {MIN_ADMIN_KEY_LEN} characters"
            )));
        }
        if self.limiter.capacity < 1.0 {
            return Err(crate::error::FolioError::Config(
                "limiter.capacity must be at least 1".to_string(),
            ));
        }
        if self.limiter.refill_rate <= 0.0 {
            return Err(crate::error::FolioError::Config(
                "limiter.refill_rate must be positive".to_string(),
            ));
        }
        if let Some(url) = &self.cache.url {
            return Err(crate::error::FolioError::Config(format!(
                "cache.url is set ({url}) but no remote cache backend is \
                 bundled; unset it to use the in-process cache"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> FolioConfig {
        FolioConfig {
            server: ServerConfig::default(),
            admin: AdminConfig {
                api_key: "0123456789abcdef0123456789abcdef".to_string(),
            },
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            llm: LlmConfig {
                provider: default_provider(),
                api_key: "test-key".to_string(),
                base_url: default_llm_base_url(),
                model: default_model(),
                max_tokens: default_max_tokens(),
                temperature: default_temperature(),
                timeout_ms: default_llm_timeout_ms(),
                max_retries: default_max_retries(),
            },
            limiter: LimiterConfig::default(),
            chat: ChatConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn short_admin_key_rejected() {
        let mut cfg = base_config();
        cfg.admin.api_key = "short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_refill_rate_rejected() {
        let mut cfg = base_config();
        cfg.limiter.refill_rate = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn remote_cache_url_rejected() {
        let mut cfg = base_config();
        cfg.cache.url = Some("redis://localhost".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn cors_origin_list_splits_and_trims() {
        let mut cfg = base_config();
        cfg.server.cors_origins = "https://a.example, https://b.example ,".to_string();
        assert_eq!(
            cfg.server.cors_origin_list(),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
