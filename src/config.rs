// Configuration loading and parsing (relay.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub relay: RelayConfig,
    pub telegram: TelegramConfig,
    pub credentials: CredentialsConfig,
    pub db_path: String,
}

// ---------------------------------------------------------------------------
// relay.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire relay.toml file.
#[derive(Debug, Clone, Deserialize)]
struct RelayFile {
    relay: RelaySection,
    telegram: TelegramSection,
    database: DatabaseSection,
}

#[derive(Debug, Clone, Deserialize)]
struct RelaySection {
    accounts: Vec<String>,
    poll_interval_minutes: u64,
    #[serde(default = "default_feed_page_size")]
    feed_page_size: u32,
}

fn default_feed_page_size() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
struct TelegramSection {
    channel_id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

/// The public relay config assembled from the relay.toml sections.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Account handles to monitor, without a leading `@`.
    pub accounts: Vec<String>,
    pub poll_interval_minutes: u64,
    /// How many recent posts to request per poll. Only the newest one is
    /// acted on; the window just guards against sparse feeds.
    pub feed_page_size: u32,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Channel the relay publishes to (`@name` or a numeric chat id).
    pub channel_id: String,
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub twitter_bearer_token: String,
    pub telegram_bot_token: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/relay.toml` and
/// `config/credentials.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub(crate) fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- relay.toml (required) ---
    let relay_path = config_dir.join("relay.toml");
    let relay_text = read_file(&relay_path)?;
    let relay_file: RelayFile =
        toml::from_str(&relay_text).map_err(|e| ConfigError::ParseError {
            path: relay_path.clone(),
            source: e,
        })?;

    let relay = RelayConfig {
        accounts: relay_file.relay.accounts,
        poll_interval_minutes: relay_file.relay.poll_interval_minutes,
        feed_page_size: relay_file.relay.feed_page_size,
    };
    let telegram = TelegramConfig {
        channel_id: relay_file.telegram.channel_id,
    };
    let db_path = relay_file.database.path;

    // --- credentials.toml (required) ---
    let credentials_path = config_dir.join("credentials.toml");
    let cred_text = read_file(&credentials_path)?;
    let credentials: CredentialsConfig =
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?;

    let config = Config {
        relay,
        telegram,
        credentials,
        db_path,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        // If config/ also doesn't exist, the app will fail to load config.
        // Return an error with a clear message about the missing defaults directory.
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        // Skip non-files and entries without a file name
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };

        // Skip .example template files
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // File already exists in config/, skip it
            }
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.relay.accounts.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "relay.accounts".into(),
            message: "at least one account handle is required".into(),
        });
    }

    for handle in &config.relay.accounts {
        if handle.is_empty() {
            return Err(ConfigError::ValidationError {
                field: "relay.accounts".into(),
                message: "account handles must not be empty".into(),
            });
        }
        if handle.starts_with('@') {
            return Err(ConfigError::ValidationError {
                field: "relay.accounts".into(),
                message: format!("account handle `{handle}` must not include a leading @"),
            });
        }
    }

    if config.relay.poll_interval_minutes == 0 {
        return Err(ConfigError::ValidationError {
            field: "relay.poll_interval_minutes".into(),
            message: "must be greater than 0".into(),
        });
    }

    // The upstream timeline endpoint rejects page sizes outside 5..=100.
    if !(5..=100).contains(&config.relay.feed_page_size) {
        return Err(ConfigError::ValidationError {
            field: "relay.feed_page_size".into(),
            message: format!(
                "must be between 5 and 100 inclusive, got {}",
                config.relay.feed_page_size
            ),
        });
    }

    if config.telegram.channel_id.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "telegram.channel_id".into(),
            message: "must not be empty".into(),
        });
    }

    if config.db_path.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    if config.credentials.twitter_bearer_token.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "credentials.twitter_bearer_token".into(),
            message: "must not be empty".into(),
        });
    }

    if config.credentials.telegram_bot_token.is_empty() {
        return Err(ConfigError::ValidationError {
            field: "credentials.telegram_bot_token".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
