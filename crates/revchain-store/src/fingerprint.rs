//! Content fingerprints captured at `list()` and checked before each write.

use revchain_kernel::StoreError;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 of each record's persisted form, keyed by payload reference.
#[derive(Debug, Clone, Default)]
pub struct Fingerprints {
    digests: BTreeMap<String, String>,
}

impl Fingerprints {
    pub fn clear(&mut self) {
        self.digests.clear();
    }

    pub fn record(&mut self, payload_ref: &str, bytes: &[u8]) {
        self.digests
            .insert(payload_ref.to_string(), fingerprint(bytes));
    }

    /// Fail with `WriteConflict` unless `bytes` are what `list()` saw.
    pub fn verify(
        &self,
        payload_ref: &str,
        bytes: &[u8],
        record: &str,
        location: &str,
    ) -> Result<(), StoreError> {
        match self.digests.get(payload_ref) {
            Some(expected) if *expected == fingerprint(bytes) => Ok(()),
            _ => Err(StoreError::WriteConflict {
                record: record.to_string(),
                location: location.to_string(),
            }),
        }
    }
}
