//! Service configuration
//!
//! Layered with the `config` crate, lowest priority first: built-in defaults,
//! an optional TOML file, the flat variables of older deployments
//! (`TRELLO_API_KEY`, `PORT`, ...), and `TRELLO_MIRROR_*` variables with `__`
//! separating nested keys (`TRELLO_MIRROR_SYNC__PACING_DELAY_MS`).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::integrations::trello::{TrelloConfig, TRELLO_API_URL};
use crate::integrations::webhooks::WebhookConfig;
use crate::mirror::EngineConfig;

/// File picked up when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "trello-mirror.toml";

const ENV_PREFIX: &str = "TRELLO_MIRROR";

/// Flat variables understood for compatibility, with the key each one sets
const LEGACY_ENV: [(&str, &str); 6] = [
    ("TRELLO_API_KEY", "api_key"),
    ("TRELLO_TOKEN", "token"),
    ("TRELLO_BOARD_ID", "board_id"),
    ("TRELLO_MASTER_LIST_ID", "master_list_id"),
    ("WEBHOOK_URL", "callback_url"),
    ("PORT", "server.port"),
];

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    #[error("missing required setting: {0}")]
    MissingKey(&'static str),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("failed to parse configuration: {0}")]
    ParseError(#[from] config::ConfigError),
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Timing and behavior of the mirror engine and Trello client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub list_cache_ttl_secs: u64,
    pub suppression_window_secs: u64,
    pub rate_limit_backoff_ms: u64,
    pub pacing_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Delete mirrors whose label is gone when the master card changes
    pub prune_removed_labels: bool,
    /// Reconcile one master card at a time
    pub serialize_per_card: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            list_cache_ttl_secs: 30,
            suppression_window_secs: 30,
            rate_limit_backoff_ms: 1000,
            pacing_delay_ms: 100,
            request_timeout_secs: 30,
            prune_removed_labels: true,
            serialize_per_card: true,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub board_id: String,
    /// List whose cards are mirrored
    #[serde(default)]
    pub master_list_id: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Public URL Trello should deliver notifications to
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

fn default_api_base_url() -> String {
    TRELLO_API_URL.to_string()
}

impl MirrorConfig {
    /// Load from `path` (or the default file if present) and the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Load using `env` in place of the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(file) = resolve_file(path)? {
            let path_str = file
                .to_str()
                .ok_or_else(|| ConfigError::InvalidPath(file.display().to_string()))?;
            builder = builder.add_source(File::new(path_str, FileFormat::Toml));
        }

        // Flat variables yield to their TRELLO_MIRROR_* counterpart.
        for (var, key) in LEGACY_ENV {
            if env.contains_key(&prefixed_var(key)) {
                continue;
            }
            builder = builder.set_override_option(key, env.get(var).cloned())?;
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check the settings every command needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("api_key", &self.api_key),
            ("token", &self.token),
            ("board_id", &self.board_id),
            ("master_list_id", &self.master_list_id),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingKey(key));
            }
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue {
                key: "api_base_url",
                reason: format!("expected an http(s) URL, got {:?}", self.api_base_url),
            });
        }
        Ok(())
    }

    /// Callback URL, required only for webhook registration
    pub fn require_callback_url(&self) -> Result<&str, ConfigError> {
        self.callback_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingKey("callback_url"))
    }

    pub fn trello_config(&self) -> TrelloConfig {
        TrelloConfig::new(&self.api_key, &self.token)
            .with_base_url(&self.api_base_url)
            .with_rate_limit_backoff(Duration::from_millis(self.sync.rate_limit_backoff_ms))
            .with_pacing_delay(Duration::from_millis(self.sync.pacing_delay_ms))
            .with_request_timeout(Duration::from_secs(self.sync.request_timeout_secs))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.board_id, &self.master_list_id)
            .with_list_cache_ttl(Duration::from_secs(self.sync.list_cache_ttl_secs))
            .with_suppression_window(Duration::from_secs(self.sync.suppression_window_secs))
            .with_prune_removed_labels(self.sync.prune_removed_labels)
            .with_serialize_per_card(self.sync.serialize_per_card)
    }

    pub fn webhook_config(&self) -> WebhookConfig {
        WebhookConfig::new(self.server.port).with_bind_address(&self.server.bind_address)
    }
}

/// `server.port` -> `TRELLO_MIRROR_SERVER__PORT`
fn prefixed_var(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.to_uppercase().replace('.', "__"))
}

fn resolve_file(path: Option<&Path>) -> Result<Option<&Path>, ConfigError> {
    match path {
        Some(path) if path.exists() => Ok(Some(path)),
        Some(path) => Err(ConfigError::FileNotFound(path.display().to_string())),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            Ok(default.exists().then_some(default))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn toml_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const FULL: &str = r#"
        api_key = "key"
        token = "tok"
        board_id = "board-1"
        master_list_id = "master"
        callback_url = "https://mirror.example.com/api/webhook"

        [server]
        port = 8080

        [sync]
        pacing_delay_ms = 0
        prune_removed_labels = false
    "#;

    #[test]
    fn test_defaults_without_sources() {
        let config = MirrorConfig::load_with_env(None, HashMap::new()).unwrap();

        assert_eq!(config.api_base_url, TRELLO_API_URL);
        assert_eq!(config.server, ServerSettings::default());
        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.sync.list_cache_ttl_secs, 30);
        assert!(config.sync.serialize_per_card);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingKey("api_key"))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let file = toml_file(FULL);
        let config = MirrorConfig::load_with_env(Some(file.path()), HashMap::new()).unwrap();

        assert_eq!(config.board_id, "board-1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.sync.pacing_delay_ms, 0);
        assert!(!config.sync.prune_removed_labels);
        assert_eq!(config.sync.suppression_window_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = MirrorConfig::load_with_env(
            Some(Path::new("/nonexistent/trello-mirror.toml")),
            HashMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_legacy_env_overrides_file() {
        let file = toml_file(FULL);
        let config = MirrorConfig::load_with_env(
            Some(file.path()),
            env(&[("TRELLO_BOARD_ID", "board-2"), ("PORT", "9000")]),
        )
        .unwrap();

        assert_eq!(config.board_id, "board-2");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_prefixed_env_wins_over_legacy() {
        let config = MirrorConfig::load_with_env(
            None,
            env(&[
                ("TRELLO_MASTER_LIST_ID", "legacy"),
                ("TRELLO_MIRROR_MASTER_LIST_ID", "prefixed"),
                ("TRELLO_MIRROR_SYNC__SUPPRESSION_WINDOW_SECS", "5"),
                ("TRELLO_MIRROR_SYNC__SERIALIZE_PER_CARD", "false"),
            ]),
        )
        .unwrap();

        assert_eq!(config.master_list_id, "prefixed");
        assert_eq!(config.sync.suppression_window_secs, 5);
        assert!(!config.sync.serialize_per_card);
    }

    #[test]
    fn test_validate_rejects_blank_and_bad_url() {
        let file = toml_file(FULL);
        let mut config = MirrorConfig::load_with_env(Some(file.path()), HashMap::new()).unwrap();

        config.master_list_id = "  ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingKey("master_list_id"))
        ));

        config.master_list_id = "master".to_string();
        config.api_base_url = "api.trello.com".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "api_base_url",
                ..
            })
        ));
    }

    #[test]
    fn test_callback_url_required_for_registration() {
        let config = MirrorConfig::load_with_env(None, HashMap::new()).unwrap();
        assert!(matches!(
            config.require_callback_url(),
            Err(ConfigError::MissingKey("callback_url"))
        ));

        let file = toml_file(FULL);
        let config = MirrorConfig::load_with_env(Some(file.path()), HashMap::new()).unwrap();
        assert_eq!(
            config.require_callback_url().unwrap(),
            "https://mirror.example.com/api/webhook"
        );
    }

    #[test]
    fn test_conversions() {
        let file = toml_file(FULL);
        let config = MirrorConfig::load_with_env(Some(file.path()), HashMap::new()).unwrap();

        let trello = config.trello_config();
        assert_eq!(trello.api_key, "key");
        assert_eq!(trello.pacing_delay, Duration::ZERO);
        assert_eq!(trello.rate_limit_backoff, Duration::from_secs(1));

        let engine = config.engine_config();
        assert_eq!(engine.master_list_id, "master");
        assert_eq!(engine.list_cache_ttl, Duration::from_secs(30));
        assert!(!engine.prune_removed_labels);

        assert_eq!(config.webhook_config().socket_addr(), "0.0.0.0:8080");
    }
}
