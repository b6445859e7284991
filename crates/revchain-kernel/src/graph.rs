//! Graph Builder: flat revision records to an indexed parent/child graph.
//!
//! Records are sorted by creation order key and addressed by slot, so every
//! derived fact is independent of the order the store enumerated them in.
//! Cross-record invariants are not validated here; see `diagnostics`.

use crate::error::ChainError;
use crate::revision::{RevisionRecord, is_well_formed_id};
use std::collections::{BTreeMap, BTreeSet};

/// Position of a record in creation order.
pub type Slot = usize;

/// How one parent pointer resolved against the record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLink {
    /// The pointer is null (primary pointer of a root).
    Root,
    Resolved(Slot),
    Missing,
}

impl ParentLink {
    pub fn slot(self) -> Option<Slot> {
        match self {
            ParentLink::Resolved(slot) => Some(slot),
            ParentLink::Root | ParentLink::Missing => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RevisionGraph {
    records: Vec<RevisionRecord>,
    by_id: BTreeMap<String, Vec<Slot>>,
    primary: Vec<ParentLink>,
    merges: Vec<Vec<ParentLink>>,
    children: Vec<Vec<Slot>>,
    roots: Vec<Slot>,
    heads: Vec<Slot>,
    reachable: Vec<bool>,
}

impl RevisionGraph {
    /// Build the graph, rejecting records whose identifiers are malformed.
    pub fn build(records: impl IntoIterator<Item = RevisionRecord>) -> Result<Self, ChainError> {
        let mut records: Vec<RevisionRecord> = records.into_iter().collect();
        for record in &records {
            validate_record(record)?;
        }
        records.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let mut by_id: BTreeMap<String, Vec<Slot>> = BTreeMap::new();
        for (slot, record) in records.iter().enumerate() {
            by_id.entry(record.id.clone()).or_default().push(slot);
        }

        let resolve = |child: Slot, parent_id: &str| -> ParentLink {
            match by_id.get(parent_id) {
                Some(members) => ParentLink::Resolved(attribute(members, child)),
                None => ParentLink::Missing,
            }
        };

        let mut primary = Vec::with_capacity(records.len());
        let mut merges = Vec::with_capacity(records.len());
        let mut children: Vec<Vec<Slot>> = vec![Vec::new(); records.len()];
        for (slot, record) in records.iter().enumerate() {
            let link = match record.down_revision.as_deref() {
                Some(parent) => resolve(slot, parent),
                None => ParentLink::Root,
            };
            let merge_links: Vec<ParentLink> = record
                .merge_parents
                .iter()
                .map(|parent| resolve(slot, parent))
                .collect();
            for parent in std::iter::once(link).chain(merge_links.iter().copied()) {
                if let Some(parent_slot) = parent.slot()
                    && !children[parent_slot].contains(&slot)
                {
                    children[parent_slot].push(slot);
                }
            }
            primary.push(link);
            merges.push(merge_links);
        }

        let roots: Vec<Slot> = (0..records.len())
            .filter(|slot| records[*slot].is_root())
            .collect();
        let heads: Vec<Slot> = (0..records.len())
            .filter(|slot| children[*slot].is_empty())
            .collect();

        let mut reachable = vec![false; records.len()];
        for root in &roots {
            let mut stack = vec![*root];
            while let Some(slot) = stack.pop() {
                if reachable[slot] {
                    continue;
                }
                reachable[slot] = true;
                stack.extend(children[slot].iter().copied().filter(|c| !reachable[*c]));
            }
        }

        Ok(Self {
            records,
            by_id,
            primary,
            merges,
            children,
            roots,
            heads,
            reachable,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in creation order.
    pub fn records(&self) -> &[RevisionRecord] {
        &self.records
    }

    pub fn record(&self, slot: Slot) -> &RevisionRecord {
        &self.records[slot]
    }

    pub fn id(&self, slot: Slot) -> &str {
        &self.records[slot].id
    }

    /// Slots carrying `id`, earliest first.
    pub fn slots_of(&self, id: &str) -> &[Slot] {
        self.by_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.by_id.keys().map(String::as_str)
    }

    /// Identifier groups with more than one member, in identifier order.
    pub fn duplicate_groups(&self) -> impl Iterator<Item = (&str, &[Slot])> {
        self.by_id
            .iter()
            .filter(|(_, slots)| slots.len() > 1)
            .map(|(id, slots)| (id.as_str(), slots.as_slice()))
    }

    pub fn primary_parent(&self, slot: Slot) -> ParentLink {
        self.primary[slot]
    }

    pub fn merge_parents(&self, slot: Slot) -> &[ParentLink] {
        &self.merges[slot]
    }

    /// Resolved parent slots, primary first.
    pub fn parent_slots(&self, slot: Slot) -> impl Iterator<Item = Slot> + '_ {
        std::iter::once(self.primary[slot])
            .chain(self.merges[slot].iter().copied())
            .filter_map(ParentLink::slot)
    }

    /// Declared parent identifiers of `slot` with their resolution, primary first.
    pub fn pointers(&self, slot: Slot) -> impl Iterator<Item = (&str, ParentLink)> + '_ {
        let record = &self.records[slot];
        record
            .down_revision
            .as_deref()
            .map(|parent| (parent, self.primary[slot]))
            .into_iter()
            .chain(
                record
                    .merge_parents
                    .iter()
                    .map(String::as_str)
                    .zip(self.merges[slot].iter().copied()),
            )
    }

    pub fn children(&self, slot: Slot) -> &[Slot] {
        &self.children[slot]
    }

    pub fn roots(&self) -> &[Slot] {
        &self.roots
    }

    pub fn heads(&self) -> &[Slot] {
        &self.heads
    }

    pub fn is_reachable(&self, slot: Slot) -> bool {
        self.reachable[slot]
    }

    pub fn unreachable(&self) -> Vec<Slot> {
        (0..self.len()).filter(|slot| !self.reachable[*slot]).collect()
    }

    /// `slot` and every record it descends from, through any parent pointer.
    pub fn ancestors(&self, slot: Slot) -> BTreeSet<Slot> {
        self.closure(slot, |s| self.parent_slots(s).collect())
    }

    /// `slot` and every record descending from it.
    pub fn descendants(&self, slot: Slot) -> BTreeSet<Slot> {
        self.closure(slot, |s| self.children[s].clone())
    }

    fn closure(&self, start: Slot, next: impl Fn(Slot) -> Vec<Slot>) -> BTreeSet<Slot> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(slot) = stack.pop() {
            if seen.insert(slot) {
                stack.extend(next(slot));
            }
        }
        seen
    }
}

/// Which member of a duplicate group a child's parent reference belongs to:
/// the latest member created strictly before the child, else the earliest.
fn attribute(members: &[Slot], child: Slot) -> Slot {
    members
        .iter()
        .rev()
        .copied()
        .find(|member| *member < child)
        .unwrap_or(members[0])
}

fn validate_record(record: &RevisionRecord) -> Result<(), ChainError> {
    let malformed = |reason: String| ChainError::MalformedRecord {
        record: record.id.clone(),
        location: record.payload_ref.clone(),
        reason,
    };

    if !is_well_formed_id(&record.id) {
        return Err(malformed(format!(
            "identifier {:?} is not a 12-character lowercase hex token",
            record.id
        )));
    }
    let mut seen = BTreeSet::new();
    for parent in record.parents() {
        if !is_well_formed_id(parent) {
            return Err(malformed(format!(
                "parent identifier {parent:?} is not a 12-character lowercase hex token"
            )));
        }
        if !seen.insert(parent) {
            return Err(malformed(format!("parent {parent} is listed more than once")));
        }
    }
    if record.merge_parents.contains(&record.id) {
        return Err(malformed(format!(
            "revision {} lists itself as a merge parent",
            record.id
        )));
    }
    if record.down_revision.is_none() && !record.merge_parents.is_empty() {
        return Err(malformed(
            "merge parents declared without a primary parent".to_string(),
        ));
    }
    Ok(())
}
