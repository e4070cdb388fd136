//! Configuration management for delve.
//!
//! Loads configuration from ${DELVE_HOME}/config.toml with sensible defaults.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::research::extract::ExtractFormat;
use crate::research::search::Freshness;

/// The commented `default_config.toml` shipped inside the binary.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// Overlays the user's file onto the shipped template.
///
/// New comments and sections from the template stay present while the
/// user's values win.
fn merge_with_template(user_config: &str) -> Result<String> {
    use toml_edit::DocumentMut;

    let mut doc: DocumentMut = default_config_template()
        .parse()
        .context("Failed to parse default config template")?;
    let user_doc: DocumentMut = user_config.parse().context("Failed to parse user config")?;

    merge_items(doc.as_table_mut(), user_doc.as_table());

    Ok(doc.to_string())
}

/// Copies every key of `source` into `target`, descending into tables.
fn merge_items(target: &mut toml_edit::Table, source: &toml_edit::Table) {
    use toml_edit::Item;

    for (key, value) in source.iter() {
        match value {
            Item::Value(v) => {
                target[key] = Item::Value(v.clone());
            }
            Item::Table(src_table) => {
                if let Some(Item::Table(target_table)) = target.get_mut(key) {
                    merge_items(target_table, src_table);
                } else {
                    target[key] = Item::Table(src_table.clone());
                }
            }
            Item::ArrayOfTables(src_arr) => {
                target[key] = Item::ArrayOfTables(src_arr.clone());
            }
            Item::None => {}
        }
    }
}

pub mod paths {
    //! Path resolution for delve configuration and data directories.
    //!
    //! DELVE_HOME resolution order:
    //! 1. DELVE_HOME environment variable (if set)
    //! 2. ~/.config/delve (default)

    use std::path::PathBuf;

    /// Returns the delve home directory.
    pub fn delve_home() -> PathBuf {
        if let Ok(home) = std::env::var("DELVE_HOME")
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".delve"),
            |h| h.join(".config").join("delve"),
        )
    }

    /// `$DELVE_HOME/config.toml`.
    pub fn config_path() -> PathBuf {
        delve_home().join("config.toml")
    }

    /// Returns the directory for rolling log files.
    pub fn logs_dir() -> PathBuf {
        delve_home().join("logs")
    }
}

/// Wire protocol of a model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// api.openai.com (env overrides: `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL`)
    #[serde(rename = "openai")]
    OpenAI,
    /// Any OpenAI-compatible endpoint; `base_url` and `model` are required.
    Custom,
}

/// One `[providers.<name>]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Protocol; defaults to `openai` for the provider named "openai", `custom` otherwise.
    pub kind: Option<ProviderKind>,
    pub model: Option<String>,
    /// Optional API base URL (for proxies and custom servers).
    pub base_url: Option<String>,
    /// Takes precedence over the provider's key variable.
    pub api_key: Option<String>,
    pub max_tokens: Option<u32>,
}

impl ProviderConfig {
    fn openai_default() -> Self {
        Self {
            kind: Some(ProviderKind::OpenAI),
            model: Some(Config::DEFAULT_OPENAI_MODEL.to_string()),
            ..Self::default()
        }
    }

    pub fn effective_kind(&self, name: &str) -> ProviderKind {
        self.kind.unwrap_or(if name == "openai" {
            ProviderKind::OpenAI
        } else {
            ProviderKind::Custom
        })
    }

    /// Configured key, ignoring blank values.
    pub fn effective_api_key(&self) -> Option<&str> {
        trimmed(self.api_key.as_deref())
    }

    /// Configured base URL, ignoring blank values.
    pub fn effective_base_url(&self) -> Option<&str> {
        trimmed(self.base_url.as_deref())
    }

    pub fn effective_model(&self) -> Option<&str> {
        trimmed(self.model.as_deref())
    }

    /// Environment variable consulted when no `api_key` is configured.
    pub fn api_key_env(&self, name: &str) -> String {
        match self.effective_kind(name) {
            ProviderKind::OpenAI => "OPENAI_API_KEY".to_string(),
            ProviderKind::Custom => format!("{}_API_KEY", name.to_uppercase().replace('-', "_")),
        }
    }
}

fn trimmed(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Defaults for reasoning sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Step ceiling for decomposition.
    pub max_steps: usize,
    /// Retries per subtask after an incomplete verdict.
    pub max_retries: usize,
    pub temperature: f32,
    /// Temperature for completion checks.
    pub validation_temperature: f32,
    pub max_tokens: Option<u32>,
    /// Session-wide timeout in seconds. 0 disables.
    pub timeout_secs: u64,
    pub web_search: bool,
}

impl ReasoningConfig {
    /// Returns the session timeout, or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_steps: 3,
            max_retries: 3,
            temperature: 0.7,
            validation_temperature: 0.1,
            max_tokens: None,
            timeout_secs: 600,
            web_search: false,
        }
    }
}

/// Web search (Bocha) settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Optional API key (falls back to `BOCHA_API_KEY`).
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub freshness: Freshness,
    pub count: u32,
}

impl SearchConfig {
    pub fn effective_api_key(&self) -> Option<&str> {
        trimmed(self.api_key.as_deref())
    }

    pub fn effective_base_url(&self) -> Option<&str> {
        trimmed(self.base_url.as_deref())
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            freshness: Freshness::NoLimit,
            count: 10,
        }
    }
}

/// Which content extractor to use for selected URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractProvider {
    /// Plain HTTP fetch with local HTML conversion.
    #[default]
    Direct,
    /// Parallel extract API (needs `PARALLEL_API_KEY`).
    Parallel,
}

/// URL content extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractConfig {
    pub provider: ExtractProvider,
    pub format: ExtractFormat,
    /// Extracted content longer than this is truncated with a marker.
    pub max_chars: usize,
    /// Optional API key for `parallel` (falls back to `PARALLEL_API_KEY`).
    pub api_key: Option<String>,
}

impl ExtractConfig {
    pub fn effective_api_key(&self) -> Option<&str> {
        trimmed(self.api_key.as_deref())
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            provider: ExtractProvider::Direct,
            format: ExtractFormat::Markdown,
            max_chars: 4000,
            api_key: None,
        }
    }
}

/// Limits for user-supplied files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilesConfig {
    /// Files longer than this contribute only their first chunk.
    pub max_chars: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_chars: 16_000,
            chunk_size: 4000,
            chunk_overlap: 200,
        }
    }
}

/// Interactive chat settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    /// Approximate token budget for retained history.
    pub token_limit: usize,
    pub system_prompt: Option<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            token_limit: 4000,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Write logs to a daily rolling file under `$DELVE_HOME/logs`.
    pub file: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub default_provider: String,
    pub providers: BTreeMap<String, ProviderConfig>,
    pub reasoning: ReasoningConfig,
    pub search: SearchConfig,
    pub extract: ExtractConfig,
    pub files: FilesConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
}

impl Config {
    const DEFAULT_PROVIDER: &str = "openai";
    const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

    /// Loads `$DELVE_HOME/config.toml`.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads `path`, falling back to defaults when it is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Writes the shipped template to `path`.
    ///
    /// # Errors
    /// Fails when `path` already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Returns the named provider.
    ///
    /// The built-in "openai" entry is always available, even when the user's
    /// `[providers]` table does not list it.
    pub fn provider(&self, name: &str) -> Option<ProviderConfig> {
        self.providers.get(name).cloned().or_else(|| {
            (name == Self::DEFAULT_PROVIDER).then(ProviderConfig::openai_default)
        })
    }

    /// Sorted names of every available provider.
    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        if !self.providers.contains_key(Self::DEFAULT_PROVIDER) {
            names.push(Self::DEFAULT_PROVIDER.to_string());
            names.sort();
        }
        names
    }

    /// Saves only the `default_provider` field to the config file.
    pub fn save_default_provider(name: &str) -> Result<()> {
        Self::save_default_provider_to(&paths::config_path(), name)
    }

    /// Saves only the `default_provider` field to a specific config file path.
    ///
    /// Creates the file with the default template if it doesn't exist.
    /// Otherwise merges the user's values into the latest template.
    pub fn save_default_provider_to(path: &Path, name: &str) -> Result<()> {
        use toml_edit::{DocumentMut, value};

        let contents = if path.exists() {
            let user_config = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            merge_with_template(&user_config)?
        } else {
            default_config_template().to_string()
        };

        let mut doc: DocumentMut = contents
            .parse()
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        doc["default_provider"] = value(name);

        Self::write_config(path, &doc.to_string())
    }

    /// Writes through a `.toml.tmp` sibling and renames it into place.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: Self::DEFAULT_PROVIDER.to_string(),
            providers: BTreeMap::from([(
                Self::DEFAULT_PROVIDER.to_string(),
                ProviderConfig::openai_default(),
            )]),
            reasoning: ReasoningConfig::default(),
            search: SearchConfig::default(),
            extract: ExtractConfig::default(),
            files: FilesConfig::default(),
            chat: ChatConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
