//! One backup copy per modified file per run.

use chrono::Local;
use revchain_kernel::StoreError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Backups {
    dir: Option<PathBuf>,
    stamp: String,
    saved: BTreeSet<PathBuf>,
}

impl Backups {
    /// `None` disables backups.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            stamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            saved: BTreeSet::new(),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Copy `path` to `<dir>/<stem>_<stamp><ext>` unless this run already did.
    pub fn save(&mut self, path: &Path, record: &str) -> Result<Option<PathBuf>, StoreError> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        if self.saved.contains(path) {
            return Ok(None);
        }

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| record.to_string());
        let ext = path
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();
        let target = dir.join(format!("{stem}_{}{ext}", self.stamp));

        let failed = |message: String| StoreError::Write {
            record: record.to_string(),
            location: path.display().to_string(),
            message,
        };
        fs::create_dir_all(dir)
            .map_err(|e| failed(format!("cannot create backup dir {}: {e}", dir.display())))?;
        fs::copy(path, &target)
            .map_err(|e| failed(format!("cannot back up to {}: {e}", target.display())))?;

        tracing::info!(source = %path.display(), backup = %target.display(), "backed up");
        self.saved.insert(path.to_path_buf());
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "revchain-backup-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("temp dir should be created");
        dir
    }

    #[test]
    fn file_is_backed_up_once_per_run() {
        let root = temp_dir("once");
        let source = root.join("a1b2c3d4e5f6_add_users.py");
        fs::write(&source, "revision = 'a1b2c3d4e5f6'\n").expect("fixture");

        let mut backups = Backups::new(Some(root.join("migration_backups")));
        let first = backups
            .save(&source, "a1b2c3d4e5f6")
            .expect("backup should succeed")
            .expect("first save copies");
        let name = first.file_name().expect("name").to_string_lossy().to_string();
        assert!(name.starts_with("a1b2c3d4e5f6_add_users_"));
        assert!(name.ends_with(".py"));
        assert!(backups.save(&source, "a1b2c3d4e5f6").expect("second").is_none());

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn disabled_backups_copy_nothing() {
        let mut backups = Backups::disabled();
        assert!(backups
            .save(Path::new("missing.py"), "aaaaaaaaaaaa")
            .expect("disabled is a no-op")
            .is_none());
    }
}
