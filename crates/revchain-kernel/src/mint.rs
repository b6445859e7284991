//! Deterministic revision identifiers for renamed duplicates.

use crate::revision::REVISION_ID_WIDTH;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const MINT_DOMAIN: &str = "revchain.mint.v1";

/// Mint an identifier for the record at `payload_ref` created at `created_at`.
///
/// The same inputs always produce the same identifier. A salt is bumped until
/// the candidate is absent from `taken`.
pub fn mint_revision_id(
    payload_ref: &str,
    created_at: &DateTime<Utc>,
    taken: &BTreeSet<String>,
) -> String {
    let mut salt: u64 = 0;
    loop {
        let candidate = candidate_id(payload_ref, created_at, salt);
        if !taken.contains(&candidate) {
            return candidate;
        }
        salt += 1;
    }
}

fn candidate_id(payload_ref: &str, created_at: &DateTime<Utc>, salt: u64) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in [
        ("domain", MINT_DOMAIN.to_string()),
        ("payload_ref", payload_ref.to_string()),
        ("created_at", created_at.to_rfc3339()),
        ("salt", salt.to_string()),
    ] {
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
        hasher.update(value.as_bytes());
        hasher.update(b"\0");
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..REVISION_ID_WIDTH].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::is_well_formed_id;
    use chrono::TimeZone;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    #[test]
    fn minting_is_deterministic_and_well_formed() {
        let taken = BTreeSet::new();
        let first = mint_revision_id("a1b2_add_users.py", &at(100), &taken);
        let second = mint_revision_id("a1b2_add_users.py", &at(100), &taken);
        assert_eq!(first, second);
        assert!(is_well_formed_id(&first));
    }

    #[test]
    fn minting_depends_on_payload_and_creation_time() {
        let taken = BTreeSet::new();
        let base = mint_revision_id("a.py", &at(100), &taken);
        assert_ne!(base, mint_revision_id("b.py", &at(100), &taken));
        assert_ne!(base, mint_revision_id("a.py", &at(101), &taken));
    }

    #[test]
    fn minting_skips_taken_identifiers() {
        let mut taken = BTreeSet::new();
        let first = mint_revision_id("a.py", &at(100), &taken);
        taken.insert(first.clone());
        let second = mint_revision_id("a.py", &at(100), &taken);
        assert_ne!(first, second);
        assert!(is_well_formed_id(&second));
    }
}
