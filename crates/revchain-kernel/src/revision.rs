//! Revision records: the unit the graph is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of a revision identifier, in lowercase hex characters.
pub const REVISION_ID_WIDTH: usize = 12;

/// Whether `id` is a fixed-width lowercase hexadecimal revision token.
pub fn is_well_formed_id(id: &str) -> bool {
    id.len() == REVISION_ID_WIDTH && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// One schema-migration revision as read from a store.
///
/// Only `id` and the parent pointers may be rewritten by a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub id: String,
    /// Primary ("down") parent. `None` marks a root.
    #[serde(default)]
    pub down_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merge_parents: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Opaque address owned by the store adapter.
    pub payload_ref: String,
}

/// Total creation order: timestamp, then identifier, then payload reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OrderKey<'a> {
    pub created_at: DateTime<Utc>,
    pub id: &'a str,
    pub payload_ref: &'a str,
}

impl RevisionRecord {
    pub fn new(
        id: impl Into<String>,
        down_revision: Option<&str>,
        created_at: DateTime<Utc>,
        payload_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            down_revision: down_revision.map(str::to_string),
            merge_parents: Vec::new(),
            created_at,
            payload_ref: payload_ref.into(),
        }
    }

    pub fn with_merge_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.merge_parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_root(&self) -> bool {
        self.down_revision.is_none()
    }

    pub fn order_key(&self) -> OrderKey<'_> {
        OrderKey {
            created_at: self.created_at,
            id: &self.id,
            payload_ref: &self.payload_ref,
        }
    }

    /// Primary parent first, then merge parents in declaration order.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.down_revision
            .as_deref()
            .into_iter()
            .chain(self.merge_parents.iter().map(String::as_str))
    }

    pub fn has_parent(&self, id: &str) -> bool {
        self.parents().any(|parent| parent == id)
    }

    /// Retarget the pointer currently equal to `old_parent`.
    ///
    /// `old_parent = None` addresses an empty primary pointer. `new_parent =
    /// None` clears the primary pointer and is refused while merge parents
    /// remain. Returns `false` when no pointer matches.
    pub fn retarget_parent(&mut self, old_parent: Option<&str>, new_parent: Option<&str>) -> bool {
        match old_parent {
            None => {
                if self.down_revision.is_some() {
                    return false;
                }
                self.down_revision = new_parent.map(str::to_string);
                true
            }
            Some(old) if self.down_revision.as_deref() == Some(old) => {
                if new_parent.is_none() && !self.merge_parents.is_empty() {
                    return false;
                }
                self.down_revision = new_parent.map(str::to_string);
                true
            }
            Some(old) => match self.merge_parents.iter().position(|parent| parent == old) {
                Some(index) => {
                    match new_parent {
                        Some(new) => self.merge_parents[index] = new.to_string(),
                        None => {
                            self.merge_parents.remove(index);
                        }
                    }
                    true
                }
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    #[test]
    fn well_formed_ids_are_twelve_lowercase_hex() {
        assert!(is_well_formed_id("a1b2c3d4e5f6"));
        assert!(!is_well_formed_id("A1B2C3D4E5F6"));
        assert!(!is_well_formed_id("a1b2c3d4e5f"));
        assert!(!is_well_formed_id("a1b2c3d4e5fg"));
        assert!(!is_well_formed_id("add_users_tb"));
    }

    #[test]
    fn order_key_breaks_timestamp_ties_by_identifier() {
        let a = RevisionRecord::new("bbbbbbbbbbbb", None, at(10), "b.py");
        let b = RevisionRecord::new("aaaaaaaaaaaa", None, at(10), "a.py");
        let c = RevisionRecord::new("000000000000", None, at(5), "c.py");
        let mut records = vec![a, b, c];
        records.sort_by(|x, y| x.order_key().cmp(&y.order_key()));
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["000000000000", "aaaaaaaaaaaa", "bbbbbbbbbbbb"]);
    }

    #[test]
    fn retarget_replaces_matching_merge_parent() {
        let mut record = RevisionRecord::new("cccccccccccc", Some("aaaaaaaaaaaa"), at(3), "c.py")
            .with_merge_parents(["bbbbbbbbbbbb"]);
        assert!(record.retarget_parent(Some("bbbbbbbbbbbb"), Some("dddddddddddd")));
        assert_eq!(record.merge_parents, vec!["dddddddddddd".to_string()]);
        assert_eq!(record.down_revision.as_deref(), Some("aaaaaaaaaaaa"));
    }

    #[test]
    fn retarget_refuses_unknown_pointer_and_orphaning_a_merge() {
        let mut record = RevisionRecord::new("cccccccccccc", Some("aaaaaaaaaaaa"), at(3), "c.py")
            .with_merge_parents(["bbbbbbbbbbbb"]);
        assert!(!record.retarget_parent(Some("eeeeeeeeeeee"), Some("dddddddddddd")));
        assert!(!record.retarget_parent(None, Some("dddddddddddd")));
        assert!(!record.retarget_parent(Some("aaaaaaaaaaaa"), None));
    }

    #[test]
    fn record_round_trips_through_json_with_defaults() {
        let raw = r#"{"id":"a1b2c3d4e5f6","created_at":"2025-08-22T21:11:51Z","payload_ref":"a1b2_init.py"}"#;
        let record: RevisionRecord = serde_json::from_str(raw).expect("record should parse");
        assert!(record.is_root());
        assert!(record.merge_parents.is_empty());
    }
}
