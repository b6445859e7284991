//! The Revision Store Adapter boundary and an in-process implementation.

use crate::error::StoreError;
use crate::planner::RepairEdit;
use crate::revision::RevisionRecord;
use std::collections::BTreeMap;

/// Persistence behind the kernel.
///
/// `list` captures a content fingerprint per record; an edit whose target no
/// longer matches its fingerprint fails with [`StoreError::WriteConflict`].
/// Each edit is applied as one all-or-nothing write.
pub trait RevisionStore {
    /// Human-readable location used in messages (directory, ledger path).
    fn location(&self) -> String;

    fn list(&mut self) -> Result<Vec<RevisionRecord>, StoreError>;

    /// Non-fatal findings from the last `list()`, one line each.
    fn warnings(&self) -> Vec<String> {
        Vec::new()
    }

    fn apply_relabel(&mut self, payload_ref: &str, old_id: &str, new_id: &str)
    -> Result<(), StoreError>;

    fn apply_relink(
        &mut self,
        record: &str,
        old_parent: Option<&str>,
        new_parent: Option<&str>,
    ) -> Result<(), StoreError>;

    fn apply(&mut self, edit: &RepairEdit) -> Result<(), StoreError> {
        match edit {
            RepairEdit::Relabel {
                old_id,
                new_id,
                payload_ref,
            } => self.apply_relabel(payload_ref, old_id, new_id),
            RepairEdit::Relink {
                record,
                old_parent,
                new_parent,
            } => self.apply_relink(record, old_parent.as_deref(), new_parent.as_deref()),
        }
    }
}

const MEMORY_LOCATION: &str = "memory";

/// Vector-backed store. Fingerprints are the listed records themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryRevisionStore {
    records: Vec<RevisionRecord>,
    listed: Option<BTreeMap<String, RevisionRecord>>,
    writes: usize,
    fail_at: Option<usize>,
}

impl MemoryRevisionStore {
    pub fn new(records: Vec<RevisionRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Fail the write with zero-based index `index` (counted across the store's life).
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn records(&self) -> &[RevisionRecord] {
        &self.records
    }

    /// Direct access that bypasses fingerprints, standing in for a concurrent writer.
    pub fn records_mut(&mut self) -> &mut Vec<RevisionRecord> {
        &mut self.records
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    fn commit(&mut self, edit: RepairEdit) -> Result<(), StoreError> {
        if self.fail_at == Some(self.writes) {
            return Err(StoreError::Write {
                record: edit_target(&edit),
                location: MEMORY_LOCATION.to_string(),
                message: "injected write failure".to_string(),
            });
        }

        let payload_ref = match &edit {
            RepairEdit::Relabel { payload_ref, .. } => payload_ref.clone(),
            RepairEdit::Relink { record, .. } => self
                .records
                .iter()
                .find(|r| r.id == *record)
                .map(|r| r.payload_ref.clone())
                .ok_or_else(|| StoreError::RecordNotFound {
                    record: record.clone(),
                    location: MEMORY_LOCATION.to_string(),
                })?,
        };
        let current = self.records.iter().find(|r| r.payload_ref == payload_ref);
        if let Some(listed) = &self.listed
            && listed.get(&payload_ref) != current
        {
            return Err(StoreError::WriteConflict {
                record: edit_target(&edit),
                location: MEMORY_LOCATION.to_string(),
            });
        }

        edit.apply_to(&mut self.records, MEMORY_LOCATION)?;
        self.writes += 1;
        if let Some(listed) = &mut self.listed
            && let Some(updated) = self.records.iter().find(|r| r.payload_ref == payload_ref)
        {
            listed.insert(payload_ref, updated.clone());
        }
        Ok(())
    }
}

fn edit_target(edit: &RepairEdit) -> String {
    match edit {
        RepairEdit::Relabel { old_id, .. } => old_id.clone(),
        RepairEdit::Relink { record, .. } => record.clone(),
    }
}

impl RevisionStore for MemoryRevisionStore {
    fn location(&self) -> String {
        MEMORY_LOCATION.to_string()
    }

    fn list(&mut self) -> Result<Vec<RevisionRecord>, StoreError> {
        self.listed = Some(
            self.records
                .iter()
                .map(|record| (record.payload_ref.clone(), record.clone()))
                .collect(),
        );
        Ok(self.records.clone())
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    fn store() -> MemoryRevisionStore {
        MemoryRevisionStore::new(vec![
            RevisionRecord::new("aaaaaaaaaaaa", None, at(1), "a.py"),
            RevisionRecord::new("bbbbbbbbbbbb", None, at(2), "b.py"),
        ])
    }

    #[test]
    fn relink_rewrites_the_addressed_pointer() {
        let mut store = store();
        store.list().expect("list");
        store
            .apply_relink("bbbbbbbbbbbb", None, Some("aaaaaaaaaaaa"))
            .expect("relink should apply");
        assert_eq!(
            store.records()[1].down_revision.as_deref(),
            Some("aaaaaaaaaaaa")
        );
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn stale_pointer_is_a_mismatch() {
        let mut store = store();
        store.list().expect("list");
        let err = store
            .apply_relink("bbbbbbbbbbbb", Some("ffffffffffff"), Some("aaaaaaaaaaaa"))
            .expect_err("pointer does not exist");
        assert!(matches!(err, StoreError::PointerMismatch { .. }));
    }

    #[test]
    fn concurrent_change_is_a_write_conflict() {
        let mut store = store();
        store.list().expect("list");
        store.records_mut()[1].down_revision = Some("aaaaaaaaaaaa".to_string());
        let err = store
            .apply_relabel("b.py", "bbbbbbbbbbbb", "cccccccccccc")
            .expect_err("record changed since list");
        assert!(matches!(err, StoreError::WriteConflict { record, .. } if record == "bbbbbbbbbbbb"));
    }

    #[test]
    fn injected_failure_leaves_the_record_untouched() {
        let mut store = store().fail_at(0);
        store.list().expect("list");
        let err = store
            .apply_relabel("b.py", "bbbbbbbbbbbb", "cccccccccccc")
            .expect_err("injected failure");
        assert!(matches!(err, StoreError::Write { .. }));
        assert_eq!(store.records()[1].id, "bbbbbbbbbbbb");
    }
}
