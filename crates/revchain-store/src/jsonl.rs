//! JSONL revision ledger: one `RevisionRecord` per line.
//!
//! Blank lines and `#` comments are kept verbatim across rewrites; an edit
//! replaces exactly one line.

use crate::atomic::{decode_text, write_atomic};
use crate::backup::Backups;
use crate::fingerprint::Fingerprints;
use crate::lock::{StoreLock, file_lock_path};
use revchain_kernel::{RepairEdit, RevisionRecord, RevisionStore, StoreError};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct JsonlStore {
    path: PathBuf,
    location: String,
    fingerprints: Fingerprints,
    backups: Backups,
    _lock: StoreLock,
}

struct LedgerLine {
    index: usize,
    text: String,
    record: RevisionRecord,
}

impl JsonlStore {
    pub fn open(path: impl AsRef<Path>, backups: Backups) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let location = path.display().to_string();
        if !path.is_file() {
            return Err(StoreError::Unavailable {
                location,
                message: "ledger file does not exist".to_string(),
            });
        }
        let lock = StoreLock::acquire(file_lock_path(&path), &location)?;
        Ok(Self {
            path,
            location,
            fingerprints: Fingerprints::default(),
            backups,
            _lock: lock,
        })
    }

    fn read_lines(&self) -> Result<Vec<String>, StoreError> {
        let bytes = fs::read(&self.path).map_err(|e| StoreError::Unavailable {
            location: self.location.clone(),
            message: e.to_string(),
        })?;
        let text = decode_text(&self.path, bytes).map_err(|message| StoreError::Malformed {
            record: "ledger".to_string(),
            location: self.location.clone(),
            message,
        })?;
        Ok(text.lines().map(str::to_string).collect())
    }

    fn parse(&self, lines: &[String]) -> Result<Vec<LedgerLine>, StoreError> {
        let mut parsed = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let record: RevisionRecord =
                serde_json::from_str(trimmed).map_err(|e| StoreError::Malformed {
                    record: format!("line {}", index + 1),
                    location: self.location.clone(),
                    message: e.to_string(),
                })?;
            parsed.push(LedgerLine {
                index,
                text: trimmed.to_string(),
                record,
            });
        }
        Ok(parsed)
    }

    fn commit(&mut self, edit: RepairEdit) -> Result<(), StoreError> {
        let mut lines = self.read_lines()?;
        let parsed = self.parse(&lines)?;

        let mut candidates = parsed.into_iter().filter(|line| match &edit {
            RepairEdit::Relabel { payload_ref, .. } => line.record.payload_ref == *payload_ref,
            RepairEdit::Relink { record, .. } => line.record.id == *record,
        });
        let target_name = match &edit {
            RepairEdit::Relabel { old_id, .. } => old_id.clone(),
            RepairEdit::Relink { record, .. } => record.clone(),
        };
        let Some(mut target) = candidates.next() else {
            return Err(StoreError::RecordNotFound {
                record: target_name,
                location: self.location.clone(),
            });
        };
        if candidates.next().is_some() {
            return Err(StoreError::Malformed {
                record: target_name,
                location: self.location.clone(),
                message: "edit target is not unique in the ledger".to_string(),
            });
        }

        let payload_ref = target.record.payload_ref.clone();
        self.fingerprints.verify(
            &payload_ref,
            target.text.as_bytes(),
            &target_name,
            &self.location,
        )?;
        edit.apply_to(std::slice::from_mut(&mut target.record), &self.location)?;

        let text = serde_json::to_string(&target.record).map_err(|e| StoreError::Write {
            record: target_name.clone(),
            location: self.location.clone(),
            message: e.to_string(),
        })?;
        self.backups.save(&self.path, &target_name)?;
        lines[target.index] = text.clone();
        let mut content = lines.join("\n");
        content.push('\n');
        write_atomic(&self.path, content.as_bytes()).map_err(|e| StoreError::Write {
            record: target_name,
            location: self.location.clone(),
            message: e.to_string(),
        })?;
        self.fingerprints.record(&payload_ref, text.as_bytes());
        Ok(())
    }
}

impl RevisionStore for JsonlStore {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn list(&mut self) -> Result<Vec<RevisionRecord>, StoreError> {
        let lines = self.read_lines()?;
        let parsed = self.parse(&lines)?;

        self.fingerprints.clear();
        let mut seen = BTreeSet::new();
        let mut records = Vec::with_capacity(parsed.len());
        for line in parsed {
            if !seen.insert(line.record.payload_ref.clone()) {
                return Err(StoreError::Malformed {
                    record: line.record.id,
                    location: self.location.clone(),
                    message: format!(
                        "payload_ref {} appears on more than one line",
                        line.record.payload_ref
                    ),
                });
            }
            self.fingerprints
                .record(&line.record.payload_ref, line.text.as_bytes());
            records.push(line.record);
        }
        tracing::debug!(location = %self.location, records = records.len(), "ledger listed");
        Ok(records)
    }

    fn apply_relabel(
        &mut self,
        payload_ref: &str,
        old_id: &str,
        new_id: &str,
    ) -> Result<(), StoreError> {
        self.commit(RepairEdit::Relabel {
            old_id: old_id.to_string(),
            new_id: new_id.to_string(),
            payload_ref: payload_ref.to_string(),
        })
    }

    fn apply_relink(
        &mut self,
        record: &str,
        old_parent: Option<&str>,
        new_parent: Option<&str>,
    ) -> Result<(), StoreError> {
        self.commit(RepairEdit::Relink {
            record: record.to_string(),
            old_parent: old_parent.map(str::to_string),
            new_parent: new_parent.map(str::to_string),
        })
    }
}
