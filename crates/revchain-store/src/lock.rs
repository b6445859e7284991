//! Advisory run lock: a `create_new` lock file removed on drop.

use chrono::Utc;
use revchain_kernel::StoreError;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DIR_LOCK_NAME: &str = ".revchain.lock";

/// `<file>.lock` for a ledger file.
pub fn file_lock_path(path: &Path) -> PathBuf {
    let mut lock: OsString = path.as_os_str().to_os_string();
    lock.push(".lock");
    PathBuf::from(lock)
}

/// `<dir>/.revchain.lock` for a versions directory.
pub fn dir_lock_path(dir: &Path) -> PathBuf {
    dir.join(DIR_LOCK_NAME)
}

#[derive(Debug)]
pub struct StoreLock {
    lock_path: PathBuf,
    _file: File,
}

impl StoreLock {
    pub fn acquire(lock_path: PathBuf, location: &str) -> Result<Self, StoreError> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "pid={}\nutc={}",
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                tracing::debug!(lock = %lock_path.display(), "store lock acquired");
                Ok(Self {
                    lock_path,
                    _file: file,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(StoreError::Locked {
                    location: location.to_string(),
                    lock_path: lock_path.display().to_string(),
                })
            }
            Err(err) => Err(StoreError::Unavailable {
                location: location.to_string(),
                message: format!("cannot create lock {}: {err}", lock_path.display()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(prefix: &str) -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "revchain-lock-{prefix}-{}-{unique}.jsonl",
            std::process::id()
        ))
    }

    #[test]
    fn second_acquire_is_busy_until_first_drops() {
        let lock_path = file_lock_path(&temp_path("busy"));
        let first = StoreLock::acquire(lock_path.clone(), "ledger").expect("first lock");
        let err = StoreLock::acquire(lock_path.clone(), "ledger").expect_err("lock must be busy");
        assert!(matches!(err, StoreError::Locked { .. }));

        drop(first);
        assert!(!lock_path.exists());
        let again = StoreLock::acquire(lock_path.clone(), "ledger").expect("lock after release");
        assert_eq!(again.path(), lock_path.as_path());
    }
}
