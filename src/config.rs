//! Configuration management for deepseek-chat.
//!
//! Settings are loaded from `~/.config/deepseek-chat/config.toml` and then
//! overridden by `DEEPSEEK_*` environment variables. Every recognized option
//! is listed once in [`OPTIONS`], which validates file values and env
//! overrides alike and drives the settings menu.

use crate::locale::Language;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const APP_DIR: &str = "deepseek-chat";

/// Errors from reading, writing or changing settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown setting `{0}`")]
    UnknownKey(String),
    #[error("invalid value `{value}` for {key}: expected {expected}")]
    Validation {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Typed application settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// API key for the chat completions endpoint (prefer DEEPSEEK_API_KEY).
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Upper bound on generated tokens per reply.
    pub max_tokens: u32,
    /// Write conversations to the history directory.
    pub save_history: bool,
    /// Prefix chat labels with the time of day.
    pub show_timestamps: bool,
    /// UI language.
    pub language: Language,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://inference.baseten.co/v1".to_string(),
            model: "deepseek-ai/DeepSeek-R1-0528".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            save_history: true,
            show_timestamps: true,
            language: Language::En,
        }
    }
}

impl Settings {
    /// API key shortened for display, or `None` when it is too short to mask.
    pub fn masked_api_key(&self) -> Option<String> {
        let key = &self.api_key;
        if key.chars().count() <= 10 {
            return None;
        }
        let head: String = key.chars().take(5).collect();
        let tail: String = key
            .chars()
            .rev()
            .take(5)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        Some(format!("{}...{}", head, tail))
    }
}

/// One recognized setting.
pub struct OptionSpec {
    /// Key in the settings file and in `ConfigStore::set`.
    pub key: &'static str,
    /// Environment variable that overrides the file value.
    pub env: &'static str,
    /// Human-readable description of accepted values.
    pub expected: &'static str,
    /// Parses and validates `raw`, assigning it only when valid.
    apply: fn(&mut Settings, &str) -> Option<()>,
}

/// Declarative table of every recognized setting.
pub const OPTIONS: &[OptionSpec] = &[
    OptionSpec {
        key: "api_key",
        env: "DEEPSEEK_API_KEY",
        expected: "a string",
        apply: |s, raw| {
            s.api_key = raw.trim().to_string();
            Some(())
        },
    },
    OptionSpec {
        key: "base_url",
        env: "DEEPSEEK_BASE_URL",
        expected: "an http(s) URL",
        apply: |s, raw| {
            let url = raw.trim();
            (url.starts_with("http://") || url.starts_with("https://"))
                .then(|| s.base_url = url.trim_end_matches('/').to_string())
        },
    },
    OptionSpec {
        key: "model",
        env: "DEEPSEEK_MODEL",
        expected: "a model name",
        apply: |s, raw| {
            let model = raw.trim();
            (!model.is_empty()).then(|| s.model = model.to_string())
        },
    },
    OptionSpec {
        key: "temperature",
        env: "DEEPSEEK_TEMPERATURE",
        expected: "a number between 0.0 and 2.0",
        apply: |s, raw| {
            let value: f64 = raw.trim().parse().ok()?;
            (0.0..=2.0).contains(&value).then(|| s.temperature = value)
        },
    },
    OptionSpec {
        key: "max_tokens",
        env: "DEEPSEEK_MAX_TOKENS",
        expected: "a positive integer",
        apply: |s, raw| {
            let value: u32 = raw.trim().parse().ok()?;
            (value > 0).then(|| s.max_tokens = value)
        },
    },
    OptionSpec {
        key: "save_history",
        env: "DEEPSEEK_SAVE_HISTORY",
        expected: "true or false",
        apply: |s, raw| {
            s.save_history = parse_flag(raw)?;
            Some(())
        },
    },
    OptionSpec {
        key: "show_timestamps",
        env: "DEEPSEEK_SHOW_TIMESTAMPS",
        expected: "true or false",
        apply: |s, raw| {
            s.show_timestamps = parse_flag(raw)?;
            Some(())
        },
    },
    OptionSpec {
        key: "language",
        env: "DEEPSEEK_LANGUAGE",
        expected: "one of en, fr, ar",
        apply: |s, raw| {
            s.language = Language::from_code(raw)?;
            Some(())
        },
    },
];

/// Find the option spec for a settings key.
pub fn option(key: &str) -> Option<&'static OptionSpec> {
    OPTIONS.iter().find(|spec| spec.key == key)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "on" | "1" => Some(true),
        "false" | "no" | "n" | "off" | "0" => Some(false),
        _ => None,
    }
}

impl OptionSpec {
    fn apply_to(&self, settings: &mut Settings, raw: &str) -> Result<(), ConfigError> {
        (self.apply)(settings, raw).ok_or_else(|| ConfigError::Validation {
            key: self.key,
            value: raw.to_string(),
            expected: self.expected,
        })
    }
}

/// Settings merged from the settings file and the environment.
///
/// Keeps the file values apart from the effective values so that saving never
/// writes env-provided secrets back to disk.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    exists: bool,
    persisted: Settings,
    effective: Settings,
    overridden: Vec<&'static str>,
}

impl ConfigStore {
    /// Load settings from `path`, overridden by process environment variables.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// Load settings from `path`, reading overrides through `env`.
    pub fn load_with_env<F>(path: impl Into<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.into();
        let (persisted, exists) = read_settings_file(&path)?;

        let mut effective = persisted.clone();
        let mut overridden = Vec::new();
        for spec in OPTIONS {
            let Some(raw) = env(spec.env).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            match spec.apply_to(&mut effective, &raw) {
                Ok(()) => {
                    debug!("{} overridden by {}", spec.key, spec.env);
                    overridden.push(spec.key);
                }
                Err(e) => warn!("Ignoring {}: {}", spec.env, e),
            }
        }

        Ok(Self {
            path,
            exists,
            persisted,
            effective,
            overridden,
        })
    }

    /// The effective settings.
    pub fn settings(&self) -> &Settings {
        &self.effective
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the settings file existed when it was loaded or has been saved.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Env var currently overriding `key`, if any.
    pub fn env_override(&self, key: &str) -> Option<&'static str> {
        self.overridden
            .iter()
            .find(|k| **k == key)
            .and_then(|k| option(k))
            .map(|spec| spec.env)
    }

    /// Validate and set one option. On error the previous value is kept.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let spec = option(key).ok_or_else(|| ConfigError::UnknownKey(key.to_string()))?;

        let mut candidate = self.effective.clone();
        spec.apply_to(&mut candidate, value)?;
        spec.apply_to(&mut self.persisted, value)?;
        self.effective = candidate;
        self.overridden.retain(|k| *k != spec.key);
        Ok(())
    }

    /// Write the file values (including changes made with `set`) atomically.
    pub fn save(&mut self) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(&self.persisted)?;
        write_atomic(&self.path, contents.as_bytes()).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.exists = true;
        Ok(())
    }
}

fn read_settings_file(path: &Path) -> Result<(Settings, bool), ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok((Settings::default(), false));
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let table: toml::Table = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    // Each value goes through the option table; bad ones keep the default.
    let mut settings = Settings::default();
    for (key, value) in &table {
        let Some(spec) = option(key) else {
            warn!("Ignoring unknown setting `{}` in {}", key, path.display());
            continue;
        };
        let raw = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(_) | toml::Value::Float(_) | toml::Value::Boolean(_) => {
                value.to_string()
            }
            other => {
                warn!(
                    "Ignoring {} in {}: expected {}, found {}",
                    key,
                    path.display(),
                    spec.expected,
                    other.type_str()
                );
                continue;
            }
        };
        if let Err(e) = spec.apply_to(&mut settings, &raw) {
            warn!("Ignoring {} in {}: {}", key, path.display(), e);
        }
    }
    Ok((settings, true))
}

/// Write `contents` to `path` through a sibling temp file and a rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name")
    })?;
    let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(contents)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(e);
    }
    Ok(())
}

/// Get the config directory path.
pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_DIR))
        .context("Could not determine config directory")
}

/// Get the default settings file path.
pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Get the default conversation history directory.
pub fn default_history_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .map(|p| p.join(APP_DIR).join("chat_history"))
        .context("Could not determine data directory")
}
