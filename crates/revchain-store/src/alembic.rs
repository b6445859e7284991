//! Alembic versions directory: one revision per `*.py` file.
//!
//! The file name is the payload reference. Identifiers come from the module
//! assignments (`revision`, `down_revision`); the docstring headers
//! (`Revision ID:`, `Revises:`) are kept in step when a file is rewritten.
//! `Create Date:` supplies the creation time, falling back to the file's
//! modification time.

use crate::atomic::{decode_text, restore_modified, write_atomic};
use crate::backup::Backups;
use crate::fingerprint::Fingerprints;
use crate::lint::duplicate_tables;
use crate::lock::{StoreLock, dir_lock_path};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use revchain_kernel::{RepairEdit, RevisionRecord, RevisionStore, StoreError};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

fn revision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^revision[ \t]*(?::[^=\n]*)?=[ \t]*\(?[ \t]*['"]([^'"\n]*)['"]"#)
            .expect("revision regex must compile")
    })
}

fn down_revision_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^down_revision[ \t]*(?::[^=\n]*)?=[ \t]*")
            .expect("down_revision regex must compile")
    })
}

fn quoted_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"['"]([^'"\n]*)['"]"#).expect("quoted regex must compile"))
}

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(Revision ID|Revises|Create Date):[ \t]*([^\n]*?)[ \t\r]*$")
            .expect("header regex must compile")
    })
}

const REVISION_ID_HEADER: &str = "Revision ID";
const REVISES_HEADER: &str = "Revises";
const CREATE_DATE_HEADER: &str = "Create Date";
const CREATE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Where the parent pointers live in a revision file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParentSlot {
    span: Range<usize>,
    parents: Vec<String>,
}

/// A revision file parsed far enough to rewrite it.
#[derive(Debug, Clone)]
pub struct RevisionSource {
    pub record: RevisionRecord,
    text: String,
    id_span: Range<usize>,
    parent_slot: Option<ParentSlot>,
    /// `created_at` came from a `Create Date:` header, not the file's mtime.
    dated: bool,
}

impl RevisionSource {
    /// Parse `text`; `Ok(None)` when it has no `revision` assignment.
    pub fn parse(
        payload_ref: &str,
        text: String,
        modified: DateTime<Utc>,
    ) -> Result<Option<Self>, String> {
        let Some(caps) = revision_re().captures(&text) else {
            return Ok(None);
        };
        let Some(id_match) = caps.get(1) else {
            return Ok(None);
        };
        let id = id_match.as_str().to_string();
        let id_span = id_match.range();

        let parent_slot = parse_parent_slot(&text)?;
        let mut parents = parent_slot
            .as_ref()
            .map(|slot| slot.parents.clone())
            .unwrap_or_default();
        let down_revision = if parents.is_empty() {
            None
        } else {
            Some(parents.remove(0))
        };

        let header_date = header_value(&text, CREATE_DATE_HEADER).and_then(|raw| {
            match NaiveDateTime::parse_from_str(&raw, CREATE_DATE_FORMAT) {
                Ok(naive) => Some(naive.and_utc()),
                Err(err) => {
                    tracing::warn!(file = payload_ref, value = %raw, error = %err, "unreadable Create Date; using modification time");
                    None
                }
            }
        });
        let dated = header_date.is_some();
        let created_at = header_date.unwrap_or(modified);

        let record = RevisionRecord {
            id,
            down_revision,
            merge_parents: parents,
            created_at,
            payload_ref: payload_ref.to_string(),
        };
        Ok(Some(Self {
            record,
            text,
            id_span,
            parent_slot,
            dated,
        }))
    }

    /// Whether the creation time is read from the file rather than its mtime.
    pub fn is_dated(&self) -> bool {
        self.dated
    }

    /// Source text carrying `updated`'s identifier and parents.
    pub fn render(&self, updated: &RevisionRecord) -> Result<String, String> {
        let mut replacements: Vec<(Range<usize>, String)> = Vec::new();

        if updated.id != self.record.id {
            replacements.push((self.id_span.clone(), updated.id.clone()));
            if let Some(span) = header_span(&self.text, REVISION_ID_HEADER) {
                replacements.push((span, updated.id.clone()));
            }
        }

        let parents: Vec<&str> = updated.parents().collect();
        let current: Vec<&str> = self.record.parents().collect();
        if parents != current {
            let slot = self
                .parent_slot
                .as_ref()
                .ok_or_else(|| "file has no down_revision assignment to rewrite".to_string())?;
            replacements.push((slot.span.clone(), render_parents(&parents)));
            if let Some(span) = header_span(&self.text, REVISES_HEADER) {
                replacements.push((span, parents.join(", ")));
            }
        }

        replacements.sort_by(|a, b| b.0.start.cmp(&a.0.start));
        let mut text = self.text.clone();
        for (span, value) in replacements {
            text.replace_range(span, &value);
        }
        Ok(text)
    }
}

fn header_span(text: &str, name: &str) -> Option<Range<usize>> {
    header_re()
        .captures_iter(text)
        .find(|caps| &caps[1] == name)
        .and_then(|caps| caps.get(2))
        .map(|m| m.range())
}

fn header_value(text: &str, name: &str) -> Option<String> {
    header_span(text, name)
        .map(|span| text[span].to_string())
        .filter(|value| !value.is_empty())
}

/// `None`, `'abc'`, or a (possibly multi-line) tuple of quoted identifiers.
fn parse_parent_slot(text: &str) -> Result<Option<ParentSlot>, String> {
    let Some(assignment) = down_revision_re().find(text) else {
        return Ok(None);
    };
    let start = assignment.end();
    let rest = &text[start..];

    if rest.starts_with("None") {
        return Ok(Some(ParentSlot {
            span: start..start + "None".len(),
            parents: Vec::new(),
        }));
    }
    if rest.starts_with('\'') || rest.starts_with('"') {
        let caps = quoted_re()
            .captures(rest)
            .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0))
            .ok_or_else(|| "unterminated down_revision string".to_string())?;
        let whole = caps.get(0).map(|m| m.end()).unwrap_or_default();
        return Ok(Some(ParentSlot {
            span: start..start + whole,
            parents: vec![caps[1].to_string()],
        }));
    }
    if rest.starts_with('(') {
        let close = rest
            .find(')')
            .ok_or_else(|| "unterminated down_revision tuple".to_string())?;
        let parents: Vec<String> = quoted_re()
            .captures_iter(&rest[1..close])
            .map(|caps| caps[1].to_string())
            .collect();
        if parents.is_empty() {
            return Err("empty down_revision tuple".to_string());
        }
        return Ok(Some(ParentSlot {
            span: start..start + close + 1,
            parents,
        }));
    }

    let line = rest.lines().next().unwrap_or_default();
    Err(format!("unsupported down_revision value {line:?}"))
}

fn render_parents(parents: &[&str]) -> String {
    match parents {
        [] => "None".to_string(),
        [single] => format!("'{single}'"),
        many => format!(
            "({})",
            many.iter()
                .map(|p| format!("'{p}'"))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

#[derive(Debug)]
pub struct VersionsDirStore {
    dir: PathBuf,
    location: String,
    fingerprints: Fingerprints,
    backups: Backups,
    warnings: Vec<String>,
    _lock: StoreLock,
}

struct ScannedFile {
    path: PathBuf,
    bytes: Vec<u8>,
    source: RevisionSource,
}

impl VersionsDirStore {
    pub fn open(dir: impl AsRef<Path>, backups: Backups) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let location = dir.display().to_string();
        if !dir.is_dir() {
            return Err(StoreError::Unavailable {
                location,
                message: "versions directory does not exist".to_string(),
            });
        }
        let lock = StoreLock::acquire(dir_lock_path(&dir), &location)?;
        Ok(Self {
            dir,
            location,
            fingerprints: Fingerprints::default(),
            backups,
            warnings: Vec::new(),
            _lock: lock,
        })
    }

    fn unavailable(&self, message: String) -> StoreError {
        StoreError::Unavailable {
            location: self.location.clone(),
            message,
        }
    }

    fn revision_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| self.unavailable(e.to_string()))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.unavailable(e.to_string()))?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if path.is_file() && name.ends_with(".py") && !name.starts_with("__") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Read one file; `Ok(None)` for files that declare no revision.
    fn read(&self, path: &Path) -> Result<Option<(Vec<u8>, RevisionSource)>, StoreError> {
        let name = payload_name(path);
        let bytes = fs::read(path).map_err(|e| self.unavailable(format!("{name}: {e}")))?;
        let modified = fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .map_err(|e| self.unavailable(format!("{name}: {e}")))?;
        let malformed = |message: String| StoreError::Malformed {
            record: name.clone(),
            location: path.display().to_string(),
            message,
        };
        let text = decode_text(path, bytes.clone()).map_err(malformed)?;
        let source = RevisionSource::parse(&name, text, modified).map_err(malformed)?;
        Ok(source.map(|source| (bytes, source)))
    }

    /// Parsed revision files, plus the names of files declaring no revision.
    fn scan(&self) -> Result<(Vec<ScannedFile>, Vec<String>), StoreError> {
        let mut files = Vec::new();
        let mut skipped = Vec::new();
        for path in self.revision_paths()? {
            match self.read(&path)? {
                Some((bytes, source)) => files.push(ScannedFile {
                    path,
                    bytes,
                    source,
                }),
                None => skipped.push(payload_name(&path)),
            }
        }
        Ok((files, skipped))
    }

    fn commit(&mut self, edit: RepairEdit) -> Result<(), StoreError> {
        let (path, target_name) = match &edit {
            RepairEdit::Relabel {
                old_id,
                payload_ref,
                ..
            } => (self.dir.join(payload_ref), old_id.clone()),
            RepairEdit::Relink { record, .. } => {
                let (files, _) = self.scan()?;
                let mut matches = files
                    .into_iter()
                    .filter(|file| file.source.record.id == *record)
                    .map(|file| file.path);
                let path = matches.next().ok_or_else(|| StoreError::RecordNotFound {
                    record: record.clone(),
                    location: self.location.clone(),
                })?;
                if matches.next().is_some() {
                    return Err(StoreError::Malformed {
                        record: record.clone(),
                        location: self.location.clone(),
                        message: "relink target identifier is declared by several files"
                            .to_string(),
                    });
                }
                (path, record.clone())
            }
        };

        let (bytes, source) = self.read(&path)?.ok_or_else(|| StoreError::RecordNotFound {
            record: target_name.clone(),
            location: path.display().to_string(),
        })?;
        let payload_ref = source.record.payload_ref.clone();
        self.fingerprints
            .verify(&payload_ref, &bytes, &target_name, &self.location)?;

        let mut updated = source.record.clone();
        edit.apply_to(std::slice::from_mut(&mut updated), &self.location)?;
        let text = source.render(&updated).map_err(|message| StoreError::Write {
            record: target_name.clone(),
            location: path.display().to_string(),
            message,
        })?;

        let write_failed = |e: std::io::Error| StoreError::Write {
            record: target_name.clone(),
            location: path.display().to_string(),
            message: e.to_string(),
        };
        // Undated files are ordered by mtime, which a rewrite must not move.
        let modified = if source.is_dated() {
            None
        } else {
            Some(fs::metadata(&path).and_then(|meta| meta.modified()).map_err(write_failed)?)
        };

        self.backups.save(&path, &target_name)?;
        write_atomic(&path, text.as_bytes()).map_err(write_failed)?;
        if let Some(modified) = modified {
            restore_modified(&path, modified).map_err(write_failed)?;
        }
        self.fingerprints.record(&payload_ref, text.as_bytes());
        Ok(())
    }
}

fn payload_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

impl RevisionStore for VersionsDirStore {
    fn location(&self) -> String {
        self.location.clone()
    }

    fn list(&mut self) -> Result<Vec<RevisionRecord>, StoreError> {
        let (files, skipped) = self.scan()?;

        self.warnings.clear();
        for name in skipped {
            tracing::warn!(file = %name, "no revision assignment; skipped");
            self.warnings
                .push(format!("{name}: no revision assignment, skipped"));
        }
        for file in files.iter().filter(|file| !file.source.is_dated()) {
            let name = &file.source.record.payload_ref;
            tracing::warn!(file = %name, "no Create Date header; ordered by modification time");
            self.warnings.push(format!(
                "{name}: no Create Date header, ordered by modification time"
            ));
        }
        self.fingerprints.clear();
        for file in &files {
            self.fingerprints
                .record(&file.source.record.payload_ref, &file.bytes);
        }
        let payloads = files
            .iter()
            .map(|file| (file.source.record.payload_ref.as_str(), file.source.text.as_str()));
        for conflict in duplicate_tables(payloads) {
            tracing::warn!(table = %conflict.table, files = ?conflict.files, "table created by several revisions");
            self.warnings.push(conflict.message());
        }

        tracing::debug!(
            location = %self.location,
            records = files.len(),
            "versions directory listed"
        );
        Ok(files.into_iter().map(|file| file.source.record).collect())
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.clone()
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
