use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::JournalError;

const DEV_APP_SECRET: &str = "integrity-journal-development-secret";

/// Argon2 cost parameters used to turn `secret + password` into a cipher key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests; never use for real data.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: 64,
            iterations: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JournalConfig {
    pub data_dir: PathBuf,
    pub app_secret: String,
    pub save_debounce: Duration,
    pub kdf: KdfParams,
}

impl JournalConfig {
    pub fn new(data_dir: impl Into<PathBuf>, app_secret: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            app_secret: app_secret.into(),
            save_debounce: Duration::from_millis(1000),
            kdf: KdfParams::default(),
        }
    }

    pub fn with_save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce = debounce;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn from_env() -> crate::Result<Self> {
        let data_dir = std::env::var("INTEGRITY_JOURNAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::default_data_dir());

        let app_secret = match std::env::var("INTEGRITY_JOURNAL_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("INTEGRITY_JOURNAL_SECRET not set, using the development secret");
                DEV_APP_SECRET.to_string()
            }
        };

        let mut config = Self::new(data_dir, app_secret);
        if let Some(ms) = parse_env_u64("INTEGRITY_JOURNAL_SAVE_DEBOUNCE_MS")? {
            config.save_debounce = Duration::from_millis(ms);
        }
        if let Some(kib) = parse_env_u64("INTEGRITY_JOURNAL_KDF_MEMORY_KIB")? {
            config.kdf.memory_kib = u32::try_from(kib).map_err(|_| {
                JournalError::Configuration(format!("KDF memory cost too large: {}", kib))
            })?;
        }
        Ok(config)
    }

    pub fn default_data_dir() -> PathBuf {
        if cfg!(target_os = "windows") {
            std::env::var("LOCALAPPDATA")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("integrity-journal")
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("Library/Application Support/integrity-journal")
        } else {
            std::env::var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(".local/share/integrity-journal")
        }
    }

    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join("users.json")
    }

    pub fn credentials_file(&self) -> PathBuf {
        self.data_dir.join("session.json")
    }
}

fn parse_env_u64(key: &str) -> crate::Result<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| JournalError::Configuration(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}
