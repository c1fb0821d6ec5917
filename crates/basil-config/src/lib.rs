//! Site configuration for basil.
//!
//! Parses `basil.toml` in the site root with serde. An optional
//! `basil.local.toml` next to it is deep-merged on top, which keeps
//! credentials out of the shared file. A missing file yields defaults.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! Credential fields accept `${VAR}` and `${VAR:-default}` references to
//! the environment.

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

/// CLI settings that override configuration file values.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the persistent cache TTL in seconds.
    pub ttl: Option<u64>,
}

/// Configuration filename looked up in the site root.
pub const CONFIG_FILENAME: &str = "basil.toml";

/// Local overlay merged on top of [`CONFIG_FILENAME`].
pub const LOCAL_CONFIG_FILENAME: &str = "basil.local.toml";

/// Site configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site title, exposed to templates as `site.title`.
    pub title: String,
    /// Site language code.
    pub lang: String,
    /// Content file extension, always with a leading dot after loading.
    pub ext: String,
    /// Persistent cache TTL in seconds. Zero disables expiry.
    pub ttl: u64,
    /// Width in pixels requested for media-repository thumbnails.
    pub embed_width: u32,
    /// Embed name to URL pattern.
    pub embeds: BTreeMap<String, String>,
    /// Patterns for top-level `output/` entries that survive cleaning.
    pub output_exclude: Vec<String>,
    /// Photo-service credentials.
    pub flickr: Option<FlickrConfig>,
    /// Media-repository query service credentials.
    pub commons: CommonsConfig,

    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "Untitled site".to_owned(),
            lang: "en".to_owned(),
            ext: ".md".to_owned(),
            ttl: 300,
            embed_width: 800,
            embeds: BTreeMap::new(),
            output_exclude: Vec::new(),
            flickr: None,
            commons: CommonsConfig::default(),
            config_path: None,
        }
    }
}

/// Photo-service API credentials.
#[derive(Debug, Deserialize)]
pub struct FlickrConfig {
    /// API key.
    pub api_key: String,
    /// API secret.
    #[serde(default)]
    pub api_secret: String,
}

impl FlickrConfig {
    /// Validate that the API key is set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.api_key, "flickr.api_key")
    }
}

/// Media-repository query service settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommonsConfig {
    /// Auth token sent as the `wcqsOauth` cookie.
    pub wcqs_auth_token: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// TOML parsing error.
    #[error("TOML parse error in {}: {source}", path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`flickr.api_key`").
        field: String,
        /// Error message (e.g., "${`FLICKR_KEY`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn compile_pattern(pattern: &str, field: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern)
        .map_err(|e| ConfigError::Validation(format!("{field} is not a valid pattern: {e}")))
}

impl Config {
    /// Load the configuration of the site rooted at `site_root`.
    ///
    /// CLI settings are applied after loading, so CLI arguments take precedence
    /// over config file values.
    pub fn load(site_root: &Path, cli_settings: Option<&CliSettings>) -> Result<Self, ConfigError> {
        let main_path = site_root.join(CONFIG_FILENAME);
        let local_path = site_root.join(LOCAL_CONFIG_FILENAME);

        let mut table = read_table(&main_path)?.unwrap_or_default();
        if let Some(local) = read_table(&local_path)? {
            merge_tables(&mut table, local);
        }

        // Round-trip through text so parse errors carry TOML positions.
        let merged = toml::to_string(&table)
            .map_err(|e| ConfigError::Validation(format!("unable to merge configuration: {e}")))?;
        let mut config: Self = toml::from_str(&merged).map_err(|source| ConfigError::Parse {
            path: main_path.clone(),
            source,
        })?;

        expand::expand_credentials(&mut config)?;
        config.normalize();
        if main_path.exists() {
            config.config_path = Some(main_path);
        }

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(ttl) = settings.ttl {
            self.ttl = ttl;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ext.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Validation("ext cannot be empty".to_owned()));
        }
        if let Some(flickr) = &self.flickr {
            flickr.validate()?;
        }
        self.embed_patterns()?;
        self.output_exclude_patterns()?;
        Ok(())
    }

    /// Compiled embed patterns, in embed name order.
    pub fn embed_patterns(&self) -> Result<Vec<(String, Regex)>, ConfigError> {
        self.embeds
            .iter()
            .map(|(name, pattern)| {
                let regex = compile_pattern(pattern, &format!("embeds.{name}"))?;
                Ok((name.clone(), regex))
            })
            .collect()
    }

    /// Compiled output exclusion patterns.
    pub fn output_exclude_patterns(&self) -> Result<Vec<Regex>, ConfigError> {
        self.output_exclude
            .iter()
            .map(|pattern| compile_pattern(pattern, "output_exclude"))
            .collect()
    }

    /// Ensure the extension carries exactly one leading dot.
    fn normalize(&mut self) {
        let trimmed = self.ext.trim().trim_start_matches('.');
        self.ext = format!(".{trimmed}");
    }
}

/// Read and parse a TOML file, returning `None` when it does not exist.
fn read_table(path: &Path) -> Result<Option<toml::Table>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(table))
}

/// Deep-merge `overlay` into `base`. Nested tables merge; everything else is replaced.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
