use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crypto::KeyRing;
use crate::error::Error;

pub const DEFAULT_PUBLIC_KEY: &str = "public.syncrypt.key";
pub const DEFAULT_PRIVATE_KEY: &str = "private.syncrypt.key";
pub const DEFAULT_LEDGER_PATH: &str = "syncrypt.sqlite";
pub const MIN_INTERVAL_MS: u64 = 1000;

/// Level written to the main log file. Errors always go to the error log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub key_path: PathBuf,
    pub public_key: String,
    pub private_key: String,
    pub passphrase: String,
    pub interval_ms: u64,
    pub propagate_deletions: bool,
    pub ledger_path: PathBuf,
    pub log_dir: PathBuf,
    pub ignore_patterns: Vec<String>,
    pub log_level: LogLevel,
    pub quiet: bool,
    pub very_quiet: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            output_dir: None,
            key_path: PathBuf::from("."),
            public_key: DEFAULT_PUBLIC_KEY.to_string(),
            private_key: DEFAULT_PRIVATE_KEY.to_string(),
            passphrase: String::new(),
            interval_ms: 60_000,
            propagate_deletions: false,
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            log_dir: PathBuf::from("logs"),
            ignore_patterns: Vec::new(),
            log_level: LogLevel::Error,
            quiet: false,
            very_quiet: false,
        }
    }
}

/// Load `Syncrypt.{toml,json,yaml,..}` from the working directory if present,
/// then layer `SYNCRYPT_*` environment variables on top.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Syncrypt").required(false))
        .add_source(Environment::with_prefix("SYNCRYPT").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

impl AppConfig {
    /// Daemon interval, floored to one second.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(MIN_INTERVAL_MS))
    }

    pub fn public_key_path(&self) -> PathBuf {
        self.key_path.join(&self.public_key)
    }

    pub fn private_key_path(&self) -> PathBuf {
        self.key_path.join(&self.private_key)
    }

    pub fn key_ring(&self) -> KeyRing {
        KeyRing {
            public_key: self.public_key_path(),
            private_key: self.private_key_path(),
            passphrase: self.passphrase.clone(),
        }
    }

    /// Both roots are required for any pass over a tree.
    pub fn roots(&self) -> Result<(&Path, &Path), Error> {
        let input = self
            .input_dir
            .as_deref()
            .ok_or(Error::MissingSetting("input_dir"))?;
        let output = self
            .output_dir
            .as_deref()
            .ok_or(Error::MissingSetting("output_dir"))?;
        Ok((input, output))
    }

    /// Copy suitable for display; the passphrase never leaves the process.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if !copy.passphrase.is_empty() {
            copy.passphrase = "********".to_string();
        }
        copy
    }
}
