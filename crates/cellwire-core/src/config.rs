//! Configuration for cellwire writers, scans and bulk mutators.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CELLWIRE_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/cellwire/config.toml
//!   3. ~/.config/cellwire/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::writer::{CellsWriter, Growth};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellwireConfig {
    pub writer: WriterConfig,
    pub scan: ScanConfig,
    pub mutator: MutatorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Bytes preallocated by a new writer.
    pub initial_capacity: usize,
    /// Grow past `initial_capacity` instead of refusing cells.
    pub grow: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Server-side size of one chunked-scan buffer.
    pub next_threshold: usize,
    /// Fetches allowed per scan before it is declared runaway.
    pub max_fetches: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutatorConfig {
    /// Submit the pending buffer once it grows past this many bytes.
    pub flush_bytes: usize,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for CellwireConfig {
    fn default() -> Self {
        Self {
            writer: WriterConfig::default(),
            scan: ScanConfig::default(),
            mutator: MutatorConfig::default(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 32 * 1024,
            grow: true,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            next_threshold: 128 * 1024,
            max_fetches: 1 << 20,
        }
    }
}

impl Default for MutatorConfig {
    fn default() -> Self {
        Self {
            flush_bytes: 4 * 1024 * 1024,
        }
    }
}

impl WriterConfig {
    /// A writer built from this configuration.
    pub fn build(&self) -> CellsWriter {
        CellsWriter::with_growth(self.initial_capacity, Growth::from(self.grow))
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("cellwire")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl CellwireConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            CellwireConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse one config file without consulting the environment.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CELLWIRE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&CellwireConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CELLWIRE_* overrides. Unparseable values are ignored.
    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("CELLWIRE_WRITER__INITIAL_CAPACITY") {
            if let Ok(n) = v.parse() {
                self.writer.initial_capacity = n;
            }
        }
        if let Some(v) = var("CELLWIRE_WRITER__GROW") {
            self.writer.grow = v == "true" || v == "1";
        }
        if let Some(v) = var("CELLWIRE_SCAN__NEXT_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.scan.next_threshold = n;
            }
        }
        if let Some(v) = var("CELLWIRE_SCAN__MAX_FETCHES") {
            if let Ok(n) = v.parse() {
                self.scan.max_fetches = n;
            }
        }
        if let Some(v) = var("CELLWIRE_MUTATOR__FLUSH_BYTES") {
            if let Ok(n) = v.parse() {
                self.mutator.flush_bytes = n;
            }
        }
    }
}
