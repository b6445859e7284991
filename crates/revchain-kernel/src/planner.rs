//! Repair Planner: a staged, deterministic edit plan for a diagnosed graph.
//!
//! Stages always run in declaration order of [`RepairStage`]: identifiers are
//! made unique before any relinking, because relinking addresses records by
//! identifier. Each planned edit is applied to a working copy of the records
//! and the graph is rebuilt, so later stages see earlier stages' results.
//! Revision records are never removed.

use crate::diagnostics::{Issue, IssueKind, diagnose};
use crate::error::{ChainError, StoreError};
use crate::graph::{ParentLink, RevisionGraph, Slot};
use crate::mint::mint_revision_id;
use crate::revision::RevisionRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One composable slice of the repair policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStage {
    /// Keep the earliest record of each duplicate group; mint ids for the rest.
    Duplicates,
    /// Thread records with missing parents onto their chronological predecessor.
    Orphans,
    /// Serialize divergent branches until one head remains.
    Heads,
    /// Hang every root but the earliest under its chronological predecessor.
    Roots,
}

impl RepairStage {
    pub const ALL: [RepairStage; 4] = [
        RepairStage::Duplicates,
        RepairStage::Orphans,
        RepairStage::Heads,
        RepairStage::Roots,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RepairStage::Duplicates => "duplicates",
            RepairStage::Orphans => "orphans",
            RepairStage::Heads => "heads",
            RepairStage::Roots => "roots",
        }
    }

    /// Issue kind this stage is responsible for resolving.
    pub fn owns(self, kind: IssueKind) -> bool {
        matches!(
            (self, kind),
            (RepairStage::Duplicates, IssueKind::DuplicateIdentifier)
                | (RepairStage::Orphans, IssueKind::DanglingReference)
                | (RepairStage::Heads, IssueKind::MultipleHeads)
                | (RepairStage::Roots, IssueKind::MultipleRoots)
        )
    }
}

/// One atomic change to the revision store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RepairEdit {
    /// Give the record at `payload_ref` currently named `old_id` a new identifier.
    Relabel {
        old_id: String,
        new_id: String,
        payload_ref: String,
    },
    /// Retarget the parent pointer of `record` currently equal to `old_parent`.
    /// `old_parent = None` addresses an empty primary pointer; `new_parent =
    /// None` makes the record a root.
    Relink {
        record: String,
        old_parent: Option<String>,
        new_parent: Option<String>,
    },
}

impl fmt::Display for RepairEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepairEdit::Relabel {
                old_id,
                new_id,
                payload_ref,
            } => write!(f, "relabel {old_id} -> {new_id} ({payload_ref})"),
            RepairEdit::Relink {
                record,
                old_parent,
                new_parent,
            } => write!(
                f,
                "relink {record}: parent {} -> {}",
                old_parent.as_deref().unwrap_or("<none>"),
                new_parent.as_deref().unwrap_or("<none>")
            ),
        }
    }
}

impl RepairEdit {
    /// Apply this edit to an in-memory record set.
    pub fn apply_to(&self, records: &mut [RevisionRecord], location: &str) -> Result<(), StoreError> {
        match self {
            RepairEdit::Relabel {
                old_id,
                new_id,
                payload_ref,
            } => {
                let record = records
                    .iter_mut()
                    .find(|r| r.id == *old_id && r.payload_ref == *payload_ref)
                    .ok_or_else(|| StoreError::RecordNotFound {
                        record: format!("{old_id} ({payload_ref})"),
                        location: location.to_string(),
                    })?;
                record.id = new_id.clone();
                Ok(())
            }
            RepairEdit::Relink {
                record,
                old_parent,
                new_parent,
            } => {
                let mut matches = records.iter_mut().filter(|r| r.id == *record);
                let target = matches.next().ok_or_else(|| StoreError::RecordNotFound {
                    record: record.clone(),
                    location: location.to_string(),
                })?;
                if matches.next().is_some() {
                    return Err(StoreError::Malformed {
                        record: record.clone(),
                        location: location.to_string(),
                        message: "relink target identifier is not unique".to_string(),
                    });
                }
                if target.retarget_parent(old_parent.as_deref(), new_parent.as_deref()) {
                    Ok(())
                } else {
                    Err(StoreError::PointerMismatch {
                        record: record.clone(),
                        pointer: old_parent.clone().unwrap_or_else(|| "<none>".to_string()),
                        location: location.to_string(),
                    })
                }
            }
        }
    }
}

/// Ordered edits plus what they are expected to achieve.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairPlan {
    pub stages: Vec<RepairStage>,
    pub edits: Vec<RepairEdit>,
    /// Input issues owned by the selected stages.
    pub resolved: Vec<Issue>,
    /// Issues the simulated result still has; never owned by the stages.
    pub residual: Vec<Issue>,
    /// Records after simulating every edit.
    #[serde(skip)]
    pub projected: Vec<RevisionRecord>,
}

impl RepairPlan {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Whether issues of `kind` must be gone once the plan is applied.
    pub fn owns(&self, kind: IssueKind) -> bool {
        stages_own(&self.stages, kind)
    }
}

fn stages_own(stages: &[RepairStage], kind: IssueKind) -> bool {
    kind == IssueKind::Cycle || stages.iter().any(|stage| stage.owns(kind))
}

const PLAN_LOCATION: &str = "repair plan";

/// Plan the edits resolving every issue owned by `stages`.
pub fn plan_repair(
    graph: &RevisionGraph,
    issues: &[Issue],
    stages: &[RepairStage],
) -> Result<RepairPlan, ChainError> {
    let mut stages = stages.to_vec();
    stages.sort();
    stages.dedup();

    if let Some(Issue::Cycle { identifiers }) = issues.iter().find(|i| i.kind() == IssueKind::Cycle)
    {
        return Err(ChainError::UnplannableConflict {
            reason: "parent cycle; the intended order cannot be recovered automatically"
                .to_string(),
            identifiers: identifiers.clone(),
        });
    }
    if !stages.contains(&RepairStage::Duplicates)
        && let Some(Issue::DuplicateIdentifier { id, records }) = issues
            .iter()
            .find(|i| i.kind() == IssueKind::DuplicateIdentifier)
    {
        return Err(ChainError::UnplannableConflict {
            reason: format!(
                "identifier {id} is declared by {}; chain repair needs unique identifiers (resolve duplicates first)",
                records.join(", ")
            ),
            identifiers: vec![id.clone()],
        });
    }

    let mut planner = Planner {
        records: graph.records().to_vec(),
        edits: Vec::new(),
    };
    for stage in &stages {
        let span = tracing::debug_span!("repair_stage", stage = stage.name());
        let _enter = span.enter();
        let before = planner.edits.len();
        match stage {
            RepairStage::Duplicates => planner.resolve_duplicates()?,
            RepairStage::Orphans => planner.resolve_orphans()?,
            RepairStage::Heads => planner.resolve_heads()?,
            RepairStage::Roots => planner.resolve_roots()?,
        }
        tracing::debug!(edits = planner.edits.len() - before, "stage planned");
    }

    let projected_graph = RevisionGraph::build(planner.records.clone())?;
    let residual = diagnose(&projected_graph);
    if let Some(issue) = residual.iter().find(|i| stages_own(&stages, i.kind())) {
        return Err(ChainError::UnplannableConflict {
            reason: format!("plan would leave {} unresolved: {}", issue.class(), issue.message()),
            identifiers: issue.identifiers().into_iter().map(str::to_string).collect(),
        });
    }

    let resolved = issues
        .iter()
        .filter(|issue| stages_own(&stages, issue.kind()))
        .cloned()
        .collect();
    Ok(RepairPlan {
        stages,
        edits: planner.edits,
        resolved,
        residual,
        projected: planner.records,
    })
}

struct Planner {
    records: Vec<RevisionRecord>,
    edits: Vec<RepairEdit>,
}

impl Planner {
    fn graph(&self) -> Result<RevisionGraph, ChainError> {
        RevisionGraph::build(self.records.clone())
    }

    fn push(&mut self, edit: RepairEdit) -> Result<(), ChainError> {
        edit.apply_to(&mut self.records, PLAN_LOCATION)?;
        tracing::debug!(%edit, "planned edit");
        self.edits.push(edit);
        Ok(())
    }

    fn resolve_duplicates(&mut self) -> Result<(), ChainError> {
        let graph = self.graph()?;
        let mut taken: BTreeSet<String> = graph.ids().map(str::to_string).collect();
        let mut renamed: BTreeMap<Slot, String> = BTreeMap::new();
        let mut relabels = Vec::new();

        for (id, slots) in graph.duplicate_groups() {
            for pair in slots.windows(2) {
                let (first, second) = (graph.record(pair[0]), graph.record(pair[1]));
                if first.created_at == second.created_at {
                    return Err(ChainError::UnplannableConflict {
                        reason: format!(
                            "{} and {} share identifier {id} and creation time {}; the original cannot be told from the copy",
                            first.payload_ref,
                            second.payload_ref,
                            first.created_at.to_rfc3339()
                        ),
                        identifiers: vec![id.to_string()],
                    });
                }
            }
            for &slot in &slots[1..] {
                let record = graph.record(slot);
                let new_id = mint_revision_id(&record.payload_ref, &record.created_at, &taken);
                taken.insert(new_id.clone());
                renamed.insert(slot, new_id.clone());
                relabels.push(RepairEdit::Relabel {
                    old_id: id.to_string(),
                    new_id,
                    payload_ref: record.payload_ref.clone(),
                });
            }
        }

        // References follow the member they were attributed to at build time.
        let mut relinks = Vec::new();
        for child in 0..graph.len() {
            let child_id = renamed
                .get(&child)
                .cloned()
                .unwrap_or_else(|| graph.id(child).to_string());
            for (parent, link) in graph.pointers(child) {
                if let Some(new_parent) = link.slot().and_then(|slot| renamed.get(&slot)) {
                    relinks.push(RepairEdit::Relink {
                        record: child_id.clone(),
                        old_parent: Some(parent.to_string()),
                        new_parent: Some(new_parent.clone()),
                    });
                }
            }
        }

        for edit in relabels.into_iter().chain(relinks) {
            self.push(edit)?;
        }
        Ok(())
    }

    fn resolve_orphans(&mut self) -> Result<(), ChainError> {
        loop {
            let graph = self.graph()?;
            let Some(orphan) =
                (0..graph.len()).find(|slot| graph.primary_parent(*slot) == ParentLink::Missing)
            else {
                break;
            };
            let record = graph.record(orphan);
            let target = chronological_predecessor(&graph, orphan, |candidate| {
                !record.has_parent(graph.id(candidate))
            });
            if target.is_none() && !record.merge_parents.is_empty() {
                return Err(ChainError::UnplannableConflict {
                    reason: format!(
                        "merge revision {} ({}) lost its primary parent and has no earlier revision to thread onto",
                        record.id, record.payload_ref
                    ),
                    identifiers: record.parents().map(str::to_string).collect(),
                });
            }
            let new_parent = target.map(|slot| graph.id(slot).to_string());
            tracing::info!(
                record = %record.id,
                missing = record.down_revision.as_deref().unwrap_or_default(),
                stranded = graph.descendants(orphan).len() - 1,
                onto = new_parent.as_deref().unwrap_or("<root>"),
                "threading orphan"
            );
            self.push(RepairEdit::Relink {
                record: record.id.clone(),
                old_parent: record.down_revision.clone(),
                new_parent,
            })?;
        }

        loop {
            let graph = self.graph()?;
            let found = (0..graph.len()).find_map(|slot| {
                graph
                    .pointers(slot)
                    .skip(1)
                    .find(|(_, link)| *link == ParentLink::Missing)
                    .map(|(parent, _)| (slot, parent.to_string()))
            });
            let Some((slot, missing)) = found else {
                break;
            };
            let record = graph.record(slot);
            let target = chronological_predecessor(&graph, slot, |candidate| {
                !record.has_parent(graph.id(candidate))
            })
            .ok_or_else(|| ChainError::UnplannableConflict {
                reason: format!(
                    "merge parent {missing} of {} ({}) is missing and no earlier revision can stand in",
                    record.id, record.payload_ref
                ),
                identifiers: vec![record.id.clone(), missing.clone()],
            })?;
            self.push(RepairEdit::Relink {
                record: record.id.clone(),
                old_parent: Some(missing),
                new_parent: Some(graph.id(target).to_string()),
            })?;
        }
        Ok(())
    }

    /// Interleave divergent branches into one chain in creation order.
    ///
    /// The two earliest heads are taken pairwise. Both branches are cut at
    /// their fork point (or their roots when they share none), the cut
    /// segments are sorted by creation key, and every record whose primary
    /// parent is not its predecessor in that order is relinked onto it.
    fn resolve_heads(&mut self) -> Result<(), ChainError> {
        let mut rounds = 0;
        loop {
            let graph = self.graph()?;
            let heads = graph.heads();
            if heads.len() <= 1 {
                break;
            }
            rounds += 1;
            if rounds > graph.len() {
                return Err(ChainError::UnplannableConflict {
                    reason: "divergent heads do not converge".to_string(),
                    identifiers: ids(&graph, heads),
                });
            }
            let (tip, next) = (heads[0], heads[1]);

            let tip_history = graph.ancestors(tip);
            let (branch, fork) =
                primary_segment(&graph, next, |parent| tip_history.contains(&parent))?;
            let fork_history = fork.map(|slot| graph.ancestors(slot)).unwrap_or_default();
            let (trunk, _) =
                primary_segment(&graph, tip, |parent| fork_history.contains(&parent))?;

            let mut merged: Vec<Slot> = trunk.into_iter().chain(branch).collect();
            merged.sort_unstable();
            tracing::info!(
                head = graph.id(next),
                onto = graph.id(tip),
                fork = fork.map(|slot| graph.id(slot)).unwrap_or("<root>"),
                records = merged.len(),
                "serializing branches"
            );

            let mut relinks = Vec::new();
            for pair in merged.windows(2) {
                let (previous, slot) = (pair[0], pair[1]);
                if graph.primary_parent(slot) == ParentLink::Resolved(previous) {
                    continue;
                }
                let record = graph.record(slot);
                let previous_id = graph.id(previous);
                if record.has_parent(previous_id) {
                    return Err(ChainError::UnplannableConflict {
                        reason: format!(
                            "merge revision {} ({}) already merges {previous_id}; serializing would list it twice",
                            record.id, record.payload_ref
                        ),
                        identifiers: vec![record.id.clone(), previous_id.to_string()],
                    });
                }
                relinks.push(RepairEdit::Relink {
                    record: record.id.clone(),
                    old_parent: record.down_revision.clone(),
                    new_parent: Some(previous_id.to_string()),
                });
            }
            for edit in relinks {
                self.push(edit)?;
            }
        }
        Ok(())
    }

    fn resolve_roots(&mut self) -> Result<(), ChainError> {
        loop {
            let graph = self.graph()?;
            let roots = graph.roots();
            if roots.len() <= 1 {
                break;
            }
            let root = roots[1];
            let target = chronological_predecessor(&graph, root, |_| true).ok_or_else(|| {
                ChainError::UnplannableConflict {
                    reason: format!("root {} has no earlier revision to hang under", graph.id(root)),
                    identifiers: vec![graph.id(root).to_string()],
                }
            })?;
            tracing::info!(root = graph.id(root), onto = graph.id(target), "threading root");
            self.push(RepairEdit::Relink {
                record: graph.id(root).to_string(),
                old_parent: None,
                new_parent: Some(graph.id(target).to_string()),
            })?;
        }
        Ok(())
    }
}

fn ids(graph: &RevisionGraph, slots: &[Slot]) -> Vec<String> {
    slots.iter().map(|slot| graph.id(*slot).to_string()).collect()
}

/// `from` and its primary ancestors, newest first, up to the first record
/// whose parent satisfies `stop`. Returns that parent, or `None` at a root.
fn primary_segment(
    graph: &RevisionGraph,
    from: Slot,
    stop: impl Fn(Slot) -> bool,
) -> Result<(Vec<Slot>, Option<Slot>), ChainError> {
    let mut segment = vec![from];
    let mut current = from;
    loop {
        match graph.primary_parent(current) {
            ParentLink::Resolved(parent) if stop(parent) => return Ok((segment, Some(parent))),
            ParentLink::Resolved(parent) => {
                if segment.len() >= graph.len() {
                    return Err(ChainError::UnplannableConflict {
                        reason: format!("branch of {} does not terminate", graph.id(from)),
                        identifiers: vec![graph.id(from).to_string()],
                    });
                }
                segment.push(parent);
                current = parent;
            }
            ParentLink::Root => return Ok((segment, None)),
            ParentLink::Missing => {
                return Err(ChainError::UnplannableConflict {
                    reason: format!("branch of {} reaches a missing parent", graph.id(from)),
                    identifiers: vec![graph.id(from).to_string(), graph.id(current).to_string()],
                });
            }
        }
    }
}

/// The latest record created before `slot` that is reachable from a root,
/// does not descend from `slot`, and passes `accept`.
fn chronological_predecessor(
    graph: &RevisionGraph,
    slot: Slot,
    accept: impl Fn(Slot) -> bool,
) -> Option<Slot> {
    let descendants = graph.descendants(slot);
    (0..slot)
        .rev()
        .find(|candidate| {
            graph.is_reachable(*candidate) && !descendants.contains(candidate) && accept(*candidate)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    fn rev(id: &str, parent: Option<&str>, seconds: i64) -> RevisionRecord {
        RevisionRecord::new(id, parent, at(seconds), format!("{id}_{seconds}.py"))
    }

    fn plan(records: Vec<RevisionRecord>, stages: &[RepairStage]) -> Result<RepairPlan, ChainError> {
        let graph = RevisionGraph::build(records).expect("graph should build");
        let issues = diagnose(&graph);
        plan_repair(&graph, &issues, stages)
    }

    /// Creation seconds along the single head's primary chain, oldest first.
    fn chain_times(records: Vec<RevisionRecord>) -> Vec<i64> {
        let graph = RevisionGraph::build(records).expect("projected graph");
        assert_eq!(graph.heads().len(), 1);
        let mut times = Vec::new();
        let mut current = Some(graph.heads()[0]);
        while let Some(slot) = current {
            times.push(graph.record(slot).created_at.timestamp());
            current = graph.primary_parent(slot).slot();
        }
        times.reverse();
        times
    }

    fn relink(record: &str, old: Option<&str>, new: Option<&str>) -> RepairEdit {
        RepairEdit::Relink {
            record: record.to_string(),
            old_parent: old.map(str::to_string),
            new_parent: new.map(str::to_string),
        }
    }

    #[test]
    fn clean_graph_plans_nothing() {
        let plan = plan(
            vec![
                rev("aaaaaaaaaaaa", None, 1),
                rev("bbbbbbbbbbbb", Some("aaaaaaaaaaaa"), 2),
            ],
            &RepairStage::ALL,
        )
        .expect("plan should succeed");
        assert!(plan.is_empty());
        assert!(plan.residual.is_empty());
    }

    #[test]
    fn later_root_is_hung_under_earlier_root() {
        let plan = plan(
            vec![rev("aaaaaaaaaaaa", None, 1), rev("bbbbbbbbbbbb", None, 2)],
            &[RepairStage::Orphans, RepairStage::Heads, RepairStage::Roots],
        )
        .expect("plan should succeed");
        assert_eq!(
            plan.edits,
            vec![relink("bbbbbbbbbbbb", None, Some("aaaaaaaaaaaa"))]
        );
    }

    #[test]
    fn orphan_threads_onto_chronological_predecessor() {
        let plan = plan(
            vec![
                rev("aaaaaaaaaaaa", None, 1),
                rev("bbbbbbbbbbbb", Some("aaaaaaaaaaaa"), 2),
                rev("cccccccccccc", Some("ffffffffffff"), 3),
                rev("dddddddddddd", Some("cccccccccccc"), 4),
            ],
            &[RepairStage::Orphans, RepairStage::Heads, RepairStage::Roots],
        )
        .expect("plan should succeed");
        assert_eq!(
            plan.edits,
            vec![relink("cccccccccccc", Some("ffffffffffff"), Some("bbbbbbbbbbbb"))]
        );
    }

    #[test]
    fn earliest_orphan_without_root_is_promoted() {
        let plan = plan(
            vec![
                rev("bbbbbbbbbbbb", Some("ffffffffffff"), 2),
                rev("cccccccccccc", Some("bbbbbbbbbbbb"), 3),
            ],
            &[RepairStage::Orphans, RepairStage::Heads, RepairStage::Roots],
        )
        .expect("plan should succeed");
        assert_eq!(
            plan.edits,
            vec![relink("bbbbbbbbbbbb", Some("ffffffffffff"), None)]
        );
    }

    #[test]
    fn divergent_branches_are_interleaved_in_creation_order() {
        // base <- a1 (t2) <- a2 (t4); base <- b1 (t3) <- b2 (t5)
        let plan = plan(
            vec![
                rev("000000000000", None, 1),
                rev("a1a1a1a1a1a1", Some("000000000000"), 2),
                rev("b1b1b1b1b1b1", Some("000000000000"), 3),
                rev("a2a2a2a2a2a2", Some("a1a1a1a1a1a1"), 4),
                rev("b2b2b2b2b2b2", Some("b1b1b1b1b1b1"), 5),
            ],
            &[RepairStage::Orphans, RepairStage::Heads, RepairStage::Roots],
        )
        .expect("plan should succeed");
        assert_eq!(
            plan.edits,
            vec![
                relink("b1b1b1b1b1b1", Some("000000000000"), Some("a1a1a1a1a1a1")),
                relink("a2a2a2a2a2a2", Some("a1a1a1a1a1a1"), Some("b1b1b1b1b1b1")),
                relink("b2b2b2b2b2b2", Some("b1b1b1b1b1b1"), Some("a2a2a2a2a2a2")),
            ]
        );
        let projected = RevisionGraph::build(plan.projected).expect("projected graph");
        assert_eq!(projected.heads().len(), 1);
        assert_eq!(projected.id(projected.heads()[0]), "b2b2b2b2b2b2");
    }

    #[test]
    fn earlier_starting_branch_is_not_hung_under_later_one() {
        // base <- b1 (t2) <- b2 (t5); base <- a1 (t3), an earlier head
        let plan = plan(
            vec![
                rev("000000000000", None, 1),
                rev("b1b1b1b1b1b1", Some("000000000000"), 2),
                rev("a1a1a1a1a1a1", Some("000000000000"), 3),
                rev("b2b2b2b2b2b2", Some("b1b1b1b1b1b1"), 5),
            ],
            &[RepairStage::Orphans, RepairStage::Heads, RepairStage::Roots],
        )
        .expect("plan should succeed");
        assert_eq!(
            plan.edits,
            vec![
                relink("a1a1a1a1a1a1", Some("000000000000"), Some("b1b1b1b1b1b1")),
                relink("b2b2b2b2b2b2", Some("b1b1b1b1b1b1"), Some("a1a1a1a1a1a1")),
            ]
        );
        assert_eq!(
            chain_times(plan.projected),
            vec![1, 2, 3, 5],
            "chain must follow creation order"
        );
    }

    #[test]
    fn chain_repair_refuses_duplicate_identifiers() {
        let err = plan(
            vec![
                rev("aaaaaaaaaaaa", None, 1),
                rev("aaaaaaaaaaaa", Some("aaaaaaaaaaaa"), 2),
            ],
            &[RepairStage::Orphans, RepairStage::Heads, RepairStage::Roots],
        )
        .expect_err("duplicates must block chain repair");
        assert!(matches!(
            err,
            ChainError::UnplannableConflict { identifiers, .. } if identifiers == vec!["aaaaaaaaaaaa".to_string()]
        ));
    }

    #[test]
    fn duplicates_with_equal_creation_time_are_unplannable() {
        let err = plan(
            vec![
                RevisionRecord::new("aaaaaaaaaaaa", None, at(1), "one.py"),
                RevisionRecord::new("aaaaaaaaaaaa", None, at(1), "two.py"),
            ],
            &RepairStage::ALL,
        )
        .expect_err("tied duplicates must be refused");
        assert!(matches!(err, ChainError::UnplannableConflict { reason, .. } if reason.contains("one.py")));
    }

    #[test]
    fn renamed_duplicate_keeps_its_own_children() {
        // aaaa(t1) <- bbbb(t2) <- aaaa'(t3) <- cccc(t4, attributed to aaaa')
        let plan = plan(
            vec![
                rev("aaaaaaaaaaaa", None, 1),
                rev("bbbbbbbbbbbb", Some("aaaaaaaaaaaa"), 2),
                rev("aaaaaaaaaaaa", Some("bbbbbbbbbbbb"), 3),
                rev("cccccccccccc", Some("aaaaaaaaaaaa"), 4),
            ],
            &[RepairStage::Duplicates],
        )
        .expect("plan should succeed");

        let RepairEdit::Relabel { new_id, payload_ref, .. } = &plan.edits[0] else {
            panic!("first edit must relabel, got {:?}", plan.edits[0]);
        };
        assert_eq!(payload_ref, "aaaaaaaaaaaa_3.py");
        assert_eq!(
            plan.edits[1],
            relink("cccccccccccc", Some("aaaaaaaaaaaa"), Some(new_id.as_str()))
        );
        assert_eq!(plan.edits.len(), 2);
        assert!(plan.residual.is_empty());
    }

    #[test]
    fn edit_display_is_readable() {
        let edit = relink("bbbbbbbbbbbb", None, Some("aaaaaaaaaaaa"));
        insta::assert_snapshot!(edit.to_string(), @"relink bbbbbbbbbbbb: parent <none> -> aaaaaaaaaaaa");
    }
}
