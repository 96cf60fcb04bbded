//! Application Configuration Module
//!
//! Settings come from the environment (optionally seeded by `./.env`), with
//! the Gemini key additionally looked up in the credentials file that
//! `mindflow configure` writes into the data directory.

use mindflow_core::gemini::{DEFAULT_CHAT_MODEL, DEFAULT_TTS_MODEL, DEFAULT_VOICE};
use secrecy::SecretString;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
/// Name of the credentials file kept in the data directory.
pub const CREDENTIALS_FILE: &str = "mindflow.env";

/// Holds all configuration loaded from the environment.
#[derive(Debug)]
pub struct Config {
    pub api_key: Option<SecretString>,
    pub data_dir: PathBuf,
    pub chat_model: String,
    pub tts_model: String,
    pub voice: String,
    pub prompts_dir: Option<PathBuf>,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "No Gemini API key configured. Run `mindflow configure`, set {API_KEY_VAR}, or pass --api-key. (looked in {0})"
    )]
    MissingApiKey(PathBuf),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Could not determine a data directory; set MINDFLOW_DATA_DIR")]
    NoDataDir,
    #[error("Failed to read credentials file {0}: {1}")]
    CredentialsFile(PathBuf, #[source] dotenvy::Error),
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    // *   `GEMINI_API_KEY`: API key, unless given on the command line.
    // *   `MINDFLOW_DATA_DIR`: (Optional) Where progress and credentials live.
    // *   `CHAT_MODEL`, `TTS_MODEL`, `TTS_VOICE`: (Optional) Model overrides.
    // *   `PROMPTS_DIR`: (Optional) Directory of `*.md` prompt overrides.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env(api_key_flag: Option<String>) -> Result<Self, ConfigError> {
        // Load .env file. Variables already set in the process win.
        dotenvy::dotenv().ok();
        Self::from_lookup(api_key_flag, |name| env::var(name).ok(), dirs::data_dir())
    }

    fn from_lookup(
        api_key_flag: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
        default_data_root: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let data_dir = match lookup("MINDFLOW_DATA_DIR") {
            Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => default_data_root
                .map(|root| root.join("mindflow"))
                .ok_or(ConfigError::NoDataDir)?,
        };

        let api_key = match non_empty(api_key_flag).or_else(|| non_empty(lookup(API_KEY_VAR))) {
            Some(key) => Some(key),
            None => read_stored_api_key(&data_dir.join(CREDENTIALS_FILE))?,
        };

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            api_key: api_key.map(SecretString::from),
            chat_model: lookup("CHAT_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            tts_model: lookup("TTS_MODEL").unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            voice: lookup("TTS_VOICE").unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            prompts_dir: lookup("PROMPTS_DIR").map(PathBuf::from),
            data_dir,
            log_level,
        })
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir.join(CREDENTIALS_FILE)
    }

    /// Moves the key out, or fails with the error that sends the user to
    /// `mindflow configure`.
    pub fn take_api_key(&mut self) -> Result<SecretString, ConfigError> {
        self.api_key
            .take()
            .ok_or_else(|| ConfigError::MissingApiKey(self.credentials_path()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn read_stored_api_key(path: &Path) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let entries = dotenvy::from_path_iter(path)
        .map_err(|e| ConfigError::CredentialsFile(path.to_path_buf(), e))?;
    for entry in entries {
        let (name, value) = entry.map_err(|e| ConfigError::CredentialsFile(path.to_path_buf(), e))?;
        if name == API_KEY_VAR {
            return Ok(non_empty(Some(value)));
        }
    }
    Ok(None)
}

/// Stores `api_key` in the data directory's credentials file.
pub fn write_api_key(data_dir: &Path, api_key: &str) -> anyhow::Result<PathBuf> {
    use anyhow::Context;

    fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let path = data_dir.join(CREDENTIALS_FILE);
    fs::write(&path, format!("{API_KEY_VAR}=\"{}\"\n", api_key.trim()))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}
