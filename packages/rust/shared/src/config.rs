//! Application configuration for SchoolForge.
//!
//! User config lives at `~/.schoolforge/schoolforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchoolForgeError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "schoolforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".schoolforge";

// ---------------------------------------------------------------------------
// Config structs (matching schoolforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Record store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Fetch politeness/retry settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Batch planning settings.
    #[serde(default)]
    pub batch: BatchConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the local libSQL database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "var/schoolforge.db".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Lower bound for the randomized pre-request delay (ms).
    #[serde(default = "default_politeness_min")]
    pub politeness_min_ms: u64,

    /// Upper bound for the randomized pre-request delay (ms).
    #[serde(default = "default_politeness_max")]
    pub politeness_max_ms: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempt ceiling for a single fetch (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff delay between retries (ms), doubled per attempt.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Backoff cap (ms).
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    /// Randomize backoff delays.
    #[serde(default = "default_true")]
    pub jitter: bool,

    /// Maximum concurrent in-flight requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            politeness_min_ms: default_politeness_min(),
            politeness_max_ms: default_politeness_max(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_base_ms: default_retry_base_ms(),
            retry_max_ms: default_retry_max_ms(),
            jitter: true,
            concurrency: default_concurrency(),
        }
    }
}

fn default_politeness_min() -> u64 {
    2_000
}
fn default_politeness_max() -> u64 {
    5_000
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_base_ms() -> u64 {
    2_000
}
fn default_retry_max_ms() -> u64 {
    10_000
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> u32 {
    4
}

/// `[batch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Schools per batch window.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Token budget per batch.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    /// Hard ceiling on schools considered per run.
    #[serde(default = "default_max_schools")]
    pub max_schools: usize,

    /// Cap on the missing-field list in a simplified record.
    #[serde(default = "default_field_cap")]
    pub field_cap: usize,

    /// Model name handed to the token-count collaborator.
    #[serde(default = "default_model")]
    pub model: String,

    /// Topic string carried as batch context.
    #[serde(default = "default_topic")]
    pub topic: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_tokens: default_max_tokens(),
            max_schools: default_max_schools(),
            field_cap: default_field_cap(),
            model: default_model(),
            topic: default_topic(),
        }
    }
}

fn default_batch_size() -> usize {
    2
}
fn default_max_tokens() -> u64 {
    30_000
}
fn default_max_schools() -> usize {
    10
}
fn default_field_cap() -> usize {
    10
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_topic() -> String {
    "school data enrichment".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.schoolforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| SchoolForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.schoolforge/schoolforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| SchoolForgeError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        SchoolForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| SchoolForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| SchoolForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| SchoolForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject configurations the pipeline cannot run with.
fn validate(config: &AppConfig) -> Result<()> {
    if config.fetch.politeness_min_ms > config.fetch.politeness_max_ms {
        return Err(SchoolForgeError::config(
            "fetch.politeness_min_ms must not exceed fetch.politeness_max_ms",
        ));
    }
    if config.fetch.max_attempts == 0 {
        return Err(SchoolForgeError::config("fetch.max_attempts must be >= 1"));
    }
    if config.batch.batch_size == 0 {
        return Err(SchoolForgeError::config("batch.batch_size must be >= 1"));
    }
    Ok(())
}
