//! # revchain store
//!
//! File-backed [`RevisionStore`] adapters.
//!
//! - [`VersionsDirStore`]: an Alembic `versions/` directory, one revision per `*.py` file
//! - [`JsonlStore`]: a revision ledger, one JSON record per line
//!
//! Both hold an advisory lock for their whole lifetime, fingerprint every
//! record at `list()`, and rewrite at most one file per edit through a
//! temp-file-and-rename.

pub mod alembic;
pub mod atomic;
pub mod backup;
pub mod fingerprint;
pub mod jsonl;
pub mod lint;
pub mod lock;

pub use alembic::VersionsDirStore;
pub use backup::Backups;
pub use jsonl::JsonlStore;
pub use lint::{TableConflict, duplicate_tables};
pub use lock::StoreLock;

use revchain_kernel::{RevisionStore, StoreError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Name of the backup directory created next to the store path.
pub const DEFAULT_BACKUP_DIR: &str = "migration_backups";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    /// A directory is a versions directory, anything else a ledger.
    #[default]
    Auto,
    VersionsDir,
    Jsonl,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "auto" => Ok(StoreKind::Auto),
            "versions-dir" => Ok(StoreKind::VersionsDir),
            "jsonl" => Ok(StoreKind::Jsonl),
            other => Err(format!(
                "unknown store kind {other:?} (expected auto, versions-dir or jsonl)"
            )),
        }
    }
}

impl StoreKind {
    pub fn resolve(self, path: &Path) -> StoreKind {
        match self {
            StoreKind::Auto if path.is_dir() => StoreKind::VersionsDir,
            StoreKind::Auto => StoreKind::Jsonl,
            explicit => explicit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub kind: StoreKind,
    pub path: PathBuf,
    /// Backup directory; `None` falls back to `<path>/../migration_backups`.
    pub backup_dir: Option<PathBuf>,
    pub backups: bool,
}

impl StoreOptions {
    pub fn resolved_backup_dir(&self) -> Option<PathBuf> {
        if !self.backups {
            return None;
        }
        Some(self.backup_dir.clone().unwrap_or_else(|| {
            self.path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .join(DEFAULT_BACKUP_DIR)
        }))
    }
}

/// Open the adapter `options` select, taking its lock.
pub fn open_store(options: &StoreOptions) -> Result<Box<dyn RevisionStore>, StoreError> {
    let backups = Backups::new(options.resolved_backup_dir());
    match options.kind.resolve(&options.path) {
        StoreKind::Jsonl => Ok(Box::new(JsonlStore::open(&options.path, backups)?)),
        StoreKind::VersionsDir | StoreKind::Auto => {
            Ok(Box::new(VersionsDirStore::open(&options.path, backups)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kind_parses_cli_names() {
        assert_eq!("versions-dir".parse::<StoreKind>(), Ok(StoreKind::VersionsDir));
        assert_eq!("jsonl".parse::<StoreKind>(), Ok(StoreKind::Jsonl));
        assert!("sqlite".parse::<StoreKind>().is_err());
    }

    #[test]
    fn backup_dir_defaults_next_to_store() {
        let options = StoreOptions {
            kind: StoreKind::Auto,
            path: PathBuf::from("migrations/versions"),
            backup_dir: None,
            backups: true,
        };
        assert_eq!(
            options.resolved_backup_dir(),
            Some(PathBuf::from("migrations/migration_backups"))
        );

        let disabled = StoreOptions {
            backups: false,
            ..options
        };
        assert_eq!(disabled.resolved_backup_dir(), None);
    }
}
