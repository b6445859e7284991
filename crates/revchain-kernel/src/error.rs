//! Error types for revision-chain operations.

use crate::diagnostics::Issue;
use crate::planner::RepairEdit;

/// Failures raised by a revision store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing location cannot be read.
    #[error("revision store unavailable at {location}: {message}")]
    Unavailable { location: String, message: String },

    /// A persisted record cannot be parsed into a revision record.
    #[error("malformed revision record {record} in {location}: {message}")]
    Malformed {
        record: String,
        location: String,
        message: String,
    },

    /// The record changed on disk after `list()` captured its fingerprint.
    #[error("revision {record} changed since it was listed ({location})")]
    WriteConflict { record: String, location: String },

    /// An edit addressed a record the store does not hold.
    #[error("revision {record} not found in {location}")]
    RecordNotFound { record: String, location: String },

    /// An edit addressed a parent pointer the record does not carry.
    #[error("revision {record} has no parent pointer {pointer} ({location})")]
    PointerMismatch {
        record: String,
        pointer: String,
        location: String,
    },

    /// Writing the edited record failed; the record was left untouched.
    #[error("failed to write revision {record} to {location}: {message}")]
    Write {
        record: String,
        location: String,
        message: String,
    },

    /// Another run holds the advisory lock.
    #[error("revision store {location} is locked by another run: {lock_path}")]
    Locked { location: String, lock_path: String },
}

/// Errors raised by the kernel pipeline.
///
/// Structural problems are not errors: they come back as [`Issue`] values.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// An identifier or parent field is not a well-formed revision id.
    #[error("malformed revision record {record} ({location}): {reason}")]
    MalformedRecord {
        record: String,
        location: String,
        reason: String,
    },

    /// The planner declines to guess; nothing was mutated.
    #[error("repair declined: {reason} [{}]", .identifiers.join(", "))]
    UnplannableConflict {
        reason: String,
        identifiers: Vec<String>,
    },

    /// Store failure outside edit application (listing, locking).
    #[error(transparent)]
    Store(StoreError),

    /// An edit failed mid-run. `applied` edits are committed; `failed` is not.
    #[error("edit {} of the plan failed after {} committed edit(s): {failed}: {source}", .applied.len() + 1, .applied.len())]
    EditFailed {
        applied: Vec<RepairEdit>,
        failed: RepairEdit,
        #[source]
        source: StoreError,
    },

    /// The store still violates invariants after every edit applied.
    #[error("repair verification failed after {applied} edit(s): {}", render_issues(.issues))]
    RepairVerificationFailed { applied: usize, issues: Vec<Issue> },
}

impl From<StoreError> for ChainError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Malformed {
                record,
                location,
                message,
            } => ChainError::MalformedRecord {
                record,
                location,
                reason: message,
            },
            other => ChainError::Store(other),
        }
    }
}

fn render_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(Issue::message)
        .collect::<Vec<_>>()
        .join("; ")
}
