//! Payload lint: tables created by more than one revision.
//!
//! Informational only. Two revisions creating the same table usually means a
//! branch was merged twice, but the chain itself may still be consistent.

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn create_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"create_table\(\s*['"]([^'"]+)['"]"#).expect("create_table regex must compile")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConflict {
    pub table: String,
    /// Payload references creating `table`, in input order.
    pub files: Vec<String>,
}

impl TableConflict {
    pub fn message(&self) -> String {
        format!(
            "table {} is created by {} revisions: {}",
            self.table,
            self.files.len(),
            self.files.join(", ")
        )
    }
}

/// Table names passed to `create_table(...)` in `source`.
pub fn created_tables(source: &str) -> Vec<String> {
    create_table_re()
        .captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Tables created by more than one `(payload_ref, source)` pair, by table name.
pub fn duplicate_tables<'a>(
    payloads: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Vec<TableConflict> {
    let mut creators: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (payload_ref, source) in payloads {
        for table in created_tables(source) {
            let files = creators.entry(table).or_default();
            if !files.iter().any(|f| f == payload_ref) {
                files.push(payload_ref.to_string());
            }
        }
    }
    creators
        .into_iter()
        .filter(|(_, files)| files.len() > 1)
        .map(|(table, files)| TableConflict { table, files })
        .collect()
}
