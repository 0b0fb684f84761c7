//! Application configuration for Arxivist.
//!
//! User config lives at `~/.arxivist/arxivist.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ArxivistError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "arxivist.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".arxivist";

// ---------------------------------------------------------------------------
// Config structs (matching arxivist.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Literature search settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Vector index settings.
    #[serde(default)]
    pub pinecone: PineconeConfig,

    /// Workspace/notes store settings.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Completion service settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Content extraction settings.
    #[serde(default)]
    pub firecrawl: FirecrawlConfig,

    /// Data and output directories.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Subprocess lifecycle timeouts.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default topic to search for.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Maximum number of papers to ingest per run.
    #[serde(default = "default_max_papers")]
    pub max_papers: usize,

    /// arXiv category filters (e.g. `cs.CL`). Empty means all categories.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            max_papers: default_max_papers(),
            categories: Vec::new(),
        }
    }
}

fn default_topic() -> String {
    "Higgs Boson production in association with a single top quark".into()
}
fn default_max_papers() -> usize {
    10
}

/// `[pinecone]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PineconeConfig {
    /// Target index name.
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Store-side embedding model used when the index is created.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding dimension used when the index is created.
    #[serde(default = "default_dimension")]
    pub dimension: u32,

    /// Similarity metric used when the index is created.
    #[serde(default = "default_metric")]
    pub metric: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_pinecone_key_env")]
    pub api_key_env: String,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            embedding_model: default_embedding_model(),
            dimension: default_dimension(),
            metric: default_metric(),
            api_key_env: default_pinecone_key_env(),
        }
    }
}

fn default_index_name() -> String {
    "arxiv-papers".into()
}
fn default_embedding_model() -> String {
    "llama-text-embed-v2".into()
}
fn default_dimension() -> u32 {
    1024
}
fn default_metric() -> String {
    "cosine".into()
}
fn default_pinecone_key_env() -> String {
    "PINECONE_API_KEY".into()
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// Database that receives interaction log pages. Empty disables logging;
    /// the `NOTION_DATABASE_ID` env var overrides this value.
    #[serde(default)]
    pub database_id: String,

    /// Name of the env var holding the integration token.
    #[serde(default = "default_notion_token_env")]
    pub token_env: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            database_id: String::new(),
            token_env: default_notion_token_env(),
        }
    }
}

fn default_notion_token_env() -> String {
    "NOTION_TOKEN".into()
}

/// `[completion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Executable that launches the completion MCP server.
    #[serde(default = "default_completion_command")]
    pub command: String,

    /// Arguments for the completion server executable.
    #[serde(default = "default_completion_args")]
    pub args: Vec<String>,

    /// Model requested for answer synthesis.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for answer synthesis.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Output token budget for answer synthesis.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Name of the env var holding the API key.
    #[serde(default = "default_completion_key_env")]
    pub api_key_env: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            command: default_completion_command(),
            args: default_completion_args(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key_env: default_completion_key_env(),
        }
    }
}

fn default_completion_command() -> String {
    "npx".into()
}
fn default_completion_args() -> Vec<String> {
    vec!["-y".into(), "openai-completion-mcp".into()]
}
fn default_model() -> String {
    "gpt-4".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_completion_key_env() -> String {
    "OPENAI_API_KEY".into()
}

/// `[firecrawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirecrawlConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_firecrawl_key_env")]
    pub api_key_env: String,
}

impl Default for FirecrawlConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_firecrawl_key_env(),
        }
    }
}

fn default_firecrawl_key_env() -> String {
    "FIRECRAWL_API_KEY".into()
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where downloaded papers are stored.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Sandbox root the file-store collaborator may write into.
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            outputs_dir: default_outputs_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.arxivist/data".into()
}
fn default_outputs_dir() -> String {
    "~/.arxivist/outputs".into()
}

/// `[timeouts]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Per-server handshake timeout in seconds.
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// Timeout for the whole connect phase in seconds.
    #[serde(default = "default_connect_all_secs")]
    pub connect_all_secs: u64,

    /// Per-session release timeout in seconds during cleanup.
    #[serde(default = "default_release_secs")]
    pub release_secs: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            connect_all_secs: default_connect_all_secs(),
            release_secs: default_release_secs(),
        }
    }
}

fn default_connect_secs() -> u64 {
    30
}
fn default_connect_all_secs() -> u64 {
    120
}
fn default_release_secs() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.arxivist/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArxivistError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.arxivist/arxivist.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| ArxivistError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ArxivistError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArxivistError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArxivistError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArxivistError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that every collaborator credential env var is set and non-empty.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    let required = [
        config.completion.api_key_env.as_str(),
        config.pinecone.api_key_env.as_str(),
        config.notion.token_env.as_str(),
        config.firecrawl.api_key_env.as_str(),
    ];

    let missing: Vec<&str> = required
        .into_iter()
        .filter(|name| std::env::var(name).map(|v| v.is_empty()).unwrap_or(true))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ArxivistError::config(format!(
            "missing required environment variables: {}",
            missing.join(", ")
        )))
    }
}

/// Resolve the Notion database id, preferring the environment over the config file.
/// Returns `None` when neither source provides one (interaction logging is skipped).
pub fn notion_database_id(config: &AppConfig) -> Option<String> {
    let env_value = std::env::var("NOTION_DATABASE_ID").ok();
    resolve_database_id(env_value.as_deref(), &config.notion.database_id)
}

fn resolve_database_id(env_value: Option<&str>, config_value: &str) -> Option<String> {
    match env_value {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ if !config_value.is_empty() => Some(config_value.to_string()),
        _ => None,
    }
}

/// Expand a leading `~` in a configured path to the user's home directory.
pub fn resolve_path(raw: &str) -> Result<PathBuf> {
    if raw == "~" {
        return config_home();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return Ok(config_home()?.join(rest));
    }
    Ok(PathBuf::from(raw))
}

fn config_home() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| ArxivistError::config("could not determine home directory"))
}
