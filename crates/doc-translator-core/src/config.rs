use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Language codes as understood by the translation service (e.g. "fr", "zh-Hans")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lang(pub String);

impl Lang {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Suffix appended to translated filenames.
    ///
    /// Chinese variants map to their region code; everything else is the
    /// upper-cased language code.
    pub fn filename_suffix(&self) -> String {
        match self.0.as_str() {
            "zh-Hans" => "CN".to_string(),
            "zh-Hant" => "TW".to_string(),
            other => other.to_uppercase(),
        }
    }
}

impl std::fmt::Display for Lang {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Lang {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Lang {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Blob storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Azure storage connection string (`AccountName=...;AccountKey=...`)
    pub connection_string: Option<String>,

    /// Container used for temporary source and output blobs
    #[serde(default = "default_container_name")]
    pub container_name: String,
}

fn default_container_name() -> String {
    "doc-translator".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            container_name: default_container_name(),
        }
    }
}

/// Document translation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Resource endpoint, e.g. `https://<name>.cognitiveservices.azure.com`
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Resource region, sent only when set
    pub region: Option<String>,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Delay between status polls of a running translation
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Give up waiting after this many seconds (unset = wait indefinitely)
    pub poll_timeout_secs: Option<u64>,
    /// Public endpoint listing the supported languages
    #[serde(default = "default_languages_endpoint")]
    pub languages_endpoint: String,
}

impl TranslatorConfig {
    /// Create a new translator config
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }
}

const fn default_retry_count() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

const fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_languages_endpoint() -> String {
    "https://api.cognitive.microsofttranslator.com".to_string()
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            region: None,
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_secs: None,
            languages_endpoint: default_languages_endpoint(),
        }
    }
}

/// Validity window of generated access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u32,

    /// Start time is back-dated by this much to tolerate clock skew
    #[serde(default = "default_clock_skew_minutes")]
    pub clock_skew_minutes: u32,
}

const fn default_expiry_hours() -> u32 {
    1
}

const fn default_clock_skew_minutes() -> u32 {
    15
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            expiry_hours: default_expiry_hours(),
            clock_skew_minutes: default_clock_skew_minutes(),
        }
    }
}

/// Batch execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Tasks in flight at once; 1 runs the batch strictly sequentially
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
}

const fn default_max_concurrent_tasks() -> usize {
    1
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: default_max_concurrent_tasks(),
        }
    }
}

/// In-memory batch result store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultStoreConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// Result TTL in seconds (0 = no expiry)
    #[serde(default)]
    pub ttl_seconds: u64,
}

const fn default_max_entries() -> u64 {
    256
}

impl Default for ResultStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_seconds: 0,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub translator: TranslatorConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub results: ResultStoreConfig,

    /// Locale used for language display names
    #[serde(default = "default_display_locale")]
    pub display_locale: String,
}

fn default_display_locale() -> String {
    "ko".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            translator: TranslatorConfig::default(),
            signing: SigningConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            results: ResultStoreConfig::default(),
            display_locale: default_display_locale(),
        }
    }
}

/// Environment variables honoured on top of any config file
pub const ENV_STORAGE_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const ENV_CONTAINER_NAME: &str = "AZURE_BLOB_CONTAINER_NAME";
pub const ENV_TRANSLATOR_KEY: &str = "AZURE_TRANSLATOR_KEY";
pub const ENV_TRANSLATOR_ENDPOINT: &str = "AZURE_TRANSLATOR_ENDPOINT";

impl AppConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::ConfigLoad(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigLoad(format!("Failed to parse config: {e}")))
    }

    /// Layer ~/.config/doc-translator/config.toml, ./config.toml and
    /// `DOC_TRANSLATOR__SECTION__KEY` environment variables, later sources winning.
    pub fn load_layered() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(config_dir) = crate::util::config_dir() {
            let user_config = config_dir.join("doc-translator").join("config.toml");
            builder = builder.add_source(config::File::from(user_config).required(false));
        }

        builder = builder
            .add_source(config::File::from(PathBuf::from("config.toml")).required(false))
            .add_source(
                config::Environment::with_prefix("DOC_TRANSLATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder
            .build()
            .and_then(|c| c.try_deserialize::<Self>())
            .map_err(|e| Error::ConfigLoad(e.to_string()))
    }

    /// Load from default locations, falling back to defaults, then apply the
    /// well-known `AZURE_*` environment variables.
    pub fn load() -> Self {
        let mut config = match Self::load_layered() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load layered config: {}", e);
                Self::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Override credentials from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override credentials from an arbitrary key lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_STORAGE_CONNECTION_STRING) {
            self.storage.connection_string = Some(v);
        }
        if let Some(v) = get(ENV_CONTAINER_NAME) {
            self.storage.container_name = v;
        }
        if let Some(v) = get(ENV_TRANSLATOR_KEY) {
            self.translator.api_key = Some(v);
        }
        if let Some(v) = get(ENV_TRANSLATOR_ENDPOINT) {
            self.translator.endpoint = Some(v);
        }
    }

    /// Check that the credentials needed for a real batch are present
    pub fn validate(&self) -> Result<()> {
        if self.storage.connection_string.is_none() {
            return Err(Error::ConfigMissing(ENV_STORAGE_CONNECTION_STRING.to_string()));
        }
        if self.translator.api_key.is_none() {
            return Err(Error::ConfigMissing(ENV_TRANSLATOR_KEY.to_string()));
        }
        if self.translator.endpoint.is_none() {
            return Err(Error::ConfigMissing(ENV_TRANSLATOR_ENDPOINT.to_string()));
        }
        if self.storage.container_name.trim().is_empty() {
            return Err(Error::ConfigInvalid {
                field: "storage.container_name".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.orchestrator.max_concurrent_tasks == 0 {
            return Err(Error::ConfigInvalid {
                field: "orchestrator.max_concurrent_tasks".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
