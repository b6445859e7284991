//! `revchain.toml`: optional file defaults, overridden by flags.

use crate::cli::StoreArgs;
use revchain_store::{StoreKind, StoreOptions};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "revchain.toml";
pub const DEFAULT_STORE_PATH: &str = "migrations/versions";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid toml at {path}: {source}")]
    ParseToml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreSection,
    pub log: LogSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub kind: Option<StoreKind>,
    pub path: Option<PathBuf>,
    pub backup_dir: Option<PathBuf>,
    pub backups: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// `tracing` filter directive, e.g. `info` or `revchain_kernel=debug`.
    pub level: Option<String>,
}

impl Config {
    /// Load `explicit`, else `./revchain.toml` if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.is_file() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: path.display().to_string(),
            source,
        })
    }

    /// Store selection with flags taking precedence over the file.
    pub fn store_options(&self, args: &StoreArgs) -> StoreOptions {
        StoreOptions {
            kind: args.store.or(self.store.kind).unwrap_or_default(),
            path: args
                .path
                .clone()
                .or_else(|| self.store.path.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH)),
            backup_dir: args
                .backup_dir
                .clone()
                .or_else(|| self.store.backup_dir.clone()),
            backups: !args.no_backup && self.store.backups.unwrap_or(true),
        }
    }
}
