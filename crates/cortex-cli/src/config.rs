//! Configuration Vault – reads/writes `~/.cortex/config.toml` (§10.3).

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use zeroize::Zeroize;

/// Supported AI provider choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    #[default]
    Ollama,
    OpenAI,
    Anthropic,
}

impl std::fmt::Display for AiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AiProvider::Ollama => write!(f, "ollama"),
            AiProvider::OpenAI => write!(f, "openai"),
            AiProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Persisted user configuration stored in `~/.cortex/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP/WebSocket port for the bundled cockpit surface.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Chosen AI provider.
    #[serde(default)]
    pub ai_provider: AiProvider,

    /// Active model name (e.g. "llama3", "gpt-4o").
    #[serde(default = "default_model")]
    pub active_model: String,

    /// Base URL of the Ollama-compatible endpoint.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Requests-per-minute rate limit applied to the LM client.
    #[serde(default = "default_rate_limit_rpm")]
    pub rate_limit_rpm: u32,

    /// Cumulative token budget before the LM client's circuit breaker trips.
    #[serde(default = "default_token_budget")]
    pub token_budget: u64,

    /// Path to the SQLite checkpoint database.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// OpenAI API key (stored as plain text – the config file itself is
    /// hardened to `0o600`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub openai_api_key: String,

    /// Anthropic API key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub anthropic_api_key: String,
}

impl Drop for Config {
    fn drop(&mut self) {
        self.openai_api_key.zeroize();
        self.anthropic_api_key.zeroize();
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("http_port", &self.http_port)
            .field("ai_provider", &self.ai_provider)
            .field("active_model", &self.active_model)
            .field("ollama_url", &self.ollama_url)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("token_budget", &self.token_budget)
            .field("db_path", &self.db_path)
            .field(
                "openai_api_key",
                if self.openai_api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field(
                "anthropic_api_key",
                if self.anthropic_api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .finish()
    }
}

fn default_http_port() -> u16 {
    8080
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_rate_limit_rpm() -> u32 {
    20
}
fn default_token_budget() -> u64 {
    100_000
}
fn default_db_path() -> String {
    "cortex.sqlite3".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            ai_provider: AiProvider::default(),
            active_model: default_model(),
            ollama_url: default_ollama_url(),
            rate_limit_rpm: default_rate_limit_rpm(),
            token_budget: default_token_budget(),
            db_path: default_db_path(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
        }
    }
}

/// Return the path to `~/.cortex/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".cortex").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `CORTEX_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `CORTEX_OLLAMA_URL` | `ollama_url` |
/// | `CORTEX_MODEL` | `active_model` |
/// | `CORTEX_HTTP_PORT` | `http_port` |
/// | `CORTEX_RATE_LIMIT_RPM` | `rate_limit_rpm` |
/// | `CORTEX_TOKEN_BUDGET` | `token_budget` |
/// | `CORTEX_DB_PATH` | `db_path` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("CORTEX_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("CORTEX_MODEL") {
        cfg.active_model = v;
    }
    if let Ok(v) = std::env::var("CORTEX_HTTP_PORT")
        && let Ok(port) = v.parse::<u16>() {
            cfg.http_port = port;
        }
    if let Ok(v) = std::env::var("CORTEX_RATE_LIMIT_RPM")
        && let Ok(rpm) = v.parse::<u32>() {
            cfg.rate_limit_rpm = rpm;
        }
    if let Ok(v) = std::env::var("CORTEX_TOKEN_BUDGET")
        && let Ok(budget) = v.parse::<u64>() {
            cfg.token_budget = budget;
        }
    if let Ok(v) = std::env::var("CORTEX_DB_PATH") {
        cfg.db_path = v;
    }
}

/// Save the config to disk, creating `~/.cortex/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
