//! Diagnostics Engine: classify every structural anomaly of a revision graph.
//!
//! Pure and deterministic. Issues are ordered by kind priority (cycle first,
//! multiple heads last), then by the identifiers they implicate.

use crate::graph::{ParentLink, RevisionGraph, Slot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const CHECK_KIND: &str = "revchain.check.v1";

/// Issue kinds in repair priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Cycle,
    DuplicateIdentifier,
    DanglingReference,
    MultipleRoots,
    MultipleHeads,
}

impl IssueKind {
    pub fn class(self) -> &'static str {
        match self {
            IssueKind::Cycle => "chain.cycle",
            IssueKind::DuplicateIdentifier => "chain.duplicate_identifier",
            IssueKind::DanglingReference => "chain.dangling_reference",
            IssueKind::MultipleRoots => "chain.multiple_roots",
            IssueKind::MultipleHeads => "chain.multiple_heads",
        }
    }
}

/// One invariant violation, with enough context to drive a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Issue {
    /// Members of a parent cycle (primary or merge links), in traversal order.
    Cycle { identifiers: Vec<String> },
    /// Payload references of every record sharing `id`, earliest first.
    DuplicateIdentifier { id: String, records: Vec<String> },
    /// `record` points at a parent that does not exist. `stranded` lists the
    /// descendants cut off from every root by this break.
    DanglingReference {
        record: String,
        payload_ref: String,
        missing_parent: String,
        stranded: Vec<String>,
    },
    /// Root count is not one. Empty `ids` means there is no root at all.
    MultipleRoots { ids: Vec<String> },
    MultipleHeads { ids: Vec<String> },
}

impl Issue {
    pub fn kind(&self) -> IssueKind {
        match self {
            Issue::Cycle { .. } => IssueKind::Cycle,
            Issue::DuplicateIdentifier { .. } => IssueKind::DuplicateIdentifier,
            Issue::DanglingReference { .. } => IssueKind::DanglingReference,
            Issue::MultipleRoots { .. } => IssueKind::MultipleRoots,
            Issue::MultipleHeads { .. } => IssueKind::MultipleHeads,
        }
    }

    pub fn class(&self) -> &'static str {
        self.kind().class()
    }

    /// Revision identifiers this issue implicates.
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            Issue::Cycle { identifiers } => identifiers.iter().map(String::as_str).collect(),
            Issue::DuplicateIdentifier { id, .. } => vec![id.as_str()],
            Issue::DanglingReference {
                record,
                missing_parent,
                ..
            } => vec![record.as_str(), missing_parent.as_str()],
            Issue::MultipleRoots { ids } | Issue::MultipleHeads { ids } => {
                ids.iter().map(String::as_str).collect()
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            Issue::Cycle { identifiers } => {
                format!("parent cycle through {}", identifiers.join(" -> "))
            }
            Issue::DuplicateIdentifier { id, records } => format!(
                "identifier {id} is declared by {} records: {}",
                records.len(),
                records.join(", ")
            ),
            Issue::DanglingReference {
                record,
                payload_ref,
                missing_parent,
                stranded,
            } => {
                let mut message =
                    format!("revision {record} ({payload_ref}) references missing parent {missing_parent}");
                if !stranded.is_empty() {
                    message.push_str(&format!(
                        "; stranded descendants: {}",
                        stranded.join(", ")
                    ));
                }
                message
            }
            Issue::MultipleRoots { ids } if ids.is_empty() => "no root revision".to_string(),
            Issue::MultipleRoots { ids } => format!("multiple roots: {}", ids.join(", ")),
            Issue::MultipleHeads { ids } if ids.is_empty() => "no head revision".to_string(),
            Issue::MultipleHeads { ids } => format!("multiple heads: {}", ids.join(", ")),
        }
    }

    fn sort_key(&self) -> (IssueKind, String) {
        (self.kind(), self.identifiers().join(","))
    }
}

/// Diagnose every invariant violation of `graph`.
pub fn diagnose(graph: &RevisionGraph) -> Vec<Issue> {
    let mut issues = Vec::new();

    for cycle in parent_cycles(graph) {
        issues.push(Issue::Cycle {
            identifiers: cycle.iter().map(|slot| graph.id(*slot).to_string()).collect(),
        });
    }

    for (id, slots) in graph.duplicate_groups() {
        issues.push(Issue::DuplicateIdentifier {
            id: id.to_string(),
            records: slots
                .iter()
                .map(|slot| graph.record(*slot).payload_ref.clone())
                .collect(),
        });
    }

    for slot in 0..graph.len() {
        let record = graph.record(slot);
        for (parent, link) in graph.pointers(slot) {
            if link != ParentLink::Missing {
                continue;
            }
            let stranded = graph
                .descendants(slot)
                .into_iter()
                .filter(|s| *s != slot && !graph.is_reachable(*s))
                .map(|s| graph.id(s).to_string())
                .collect();
            issues.push(Issue::DanglingReference {
                record: record.id.clone(),
                payload_ref: record.payload_ref.clone(),
                missing_parent: parent.to_string(),
                stranded,
            });
        }
    }

    if !graph.is_empty() {
        if graph.roots().len() != 1 {
            issues.push(Issue::MultipleRoots {
                ids: ids_of(graph, graph.roots()),
            });
        }
        if graph.heads().len() != 1 {
            issues.push(Issue::MultipleHeads {
                ids: ids_of(graph, graph.heads()),
            });
        }
    }

    issues.sort_by_key(Issue::sort_key);
    issues
}

fn ids_of(graph: &RevisionGraph, slots: &[Slot]) -> Vec<String> {
    slots.iter().map(|slot| graph.id(*slot).to_string()).collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Three-color depth-first walk over every parent link, primary first.
///
/// An edge into a gray slot closes a cycle made of the path suffix from it.
fn parent_cycles(graph: &RevisionGraph) -> Vec<Vec<Slot>> {
    let parents_of = |slot: Slot| -> Vec<Slot> {
        let mut parents: Vec<Slot> = graph.parent_slots(slot).collect();
        parents.reverse();
        parents
    };
    let mut color = vec![Color::White; graph.len()];
    let mut cycles = Vec::new();

    for start in 0..graph.len() {
        if color[start] != Color::White {
            continue;
        }
        color[start] = Color::Gray;
        let mut path = vec![start];
        let mut pending = vec![parents_of(start)];
        while let Some(next) = pending.last_mut() {
            match next.pop() {
                Some(parent) => match color[parent] {
                    Color::White => {
                        color[parent] = Color::Gray;
                        path.push(parent);
                        pending.push(parents_of(parent));
                    }
                    Color::Gray => {
                        if let Some(pos) = path.iter().position(|s| *s == parent) {
                            cycles.push(path[pos..].to_vec());
                        }
                    }
                    Color::Black => {}
                },
                None => {
                    pending.pop();
                    if let Some(done) = path.pop() {
                        color[done] = Color::Black;
                    }
                }
            }
        }
    }

    cycles
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSummary {
    pub record_count: usize,
    pub root_count: usize,
    pub head_count: usize,
    pub unreachable_count: usize,
    pub issue_count: usize,
    pub roots: Vec<String>,
    pub heads: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub check_kind: String,
    pub result: String,
    pub issue_classes: Vec<String>,
    pub issues: Vec<Issue>,
    pub summary: DiagnosticSummary,
}

impl DiagnosticReport {
    pub fn accepted(&self) -> bool {
        self.result == "accepted"
    }
}

pub fn diagnostic_report(graph: &RevisionGraph, issues: Vec<Issue>) -> DiagnosticReport {
    let issue_classes = issues
        .iter()
        .map(|issue| issue.class().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let result = if issues.is_empty() {
        "accepted".to_string()
    } else {
        "rejected".to_string()
    };
    let summary = DiagnosticSummary {
        record_count: graph.len(),
        root_count: graph.roots().len(),
        head_count: graph.heads().len(),
        unreachable_count: graph.unreachable().len(),
        issue_count: issues.len(),
        roots: ids_of(graph, graph.roots()),
        heads: ids_of(graph, graph.heads()),
    };

    DiagnosticReport {
        check_kind: CHECK_KIND.to_string(),
        result,
        issue_classes,
        issues,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::RevisionRecord;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    fn rev(id: &str, parent: Option<&str>, seconds: i64) -> RevisionRecord {
        RevisionRecord::new(id, parent, at(seconds), format!("{id}_{seconds}.py"))
    }

    fn graph(records: Vec<RevisionRecord>) -> RevisionGraph {
        RevisionGraph::build(records).expect("graph should build")
    }

    #[test]
    fn clean_chain_is_accepted() {
        let graph = graph(vec![
            rev("aaaaaaaaaaaa", None, 1),
            rev("bbbbbbbbbbbb", Some("aaaaaaaaaaaa"), 2),
        ]);
        let report = diagnostic_report(&graph, diagnose(&graph));
        assert!(report.accepted());
        assert_eq!(report.summary.heads, vec!["bbbbbbbbbbbb".to_string()]);
    }

    #[test]
    fn empty_graph_is_clean() {
        assert!(diagnose(&graph(Vec::new())).is_empty());
    }

    #[test]
    fn two_node_cycle_is_reported_in_traversal_order() {
        let graph = graph(vec![
            rev("aaaaaaaaaaaa", None, 1),
            rev("111111111111", Some("222222222222"), 2),
            rev("222222222222", Some("111111111111"), 3),
        ]);
        let issues = diagnose(&graph);
        assert_eq!(
            issues[0],
            Issue::Cycle {
                identifiers: vec!["111111111111".to_string(), "222222222222".to_string()]
            }
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let graph = graph(vec![rev("aaaaaaaaaaaa", Some("aaaaaaaaaaaa"), 1)]);
        let issues = diagnose(&graph);
        assert_eq!(issues[0].kind(), IssueKind::Cycle);
        assert!(
            issues
                .iter()
                .any(|issue| *issue == Issue::MultipleRoots { ids: Vec::new() })
        );
    }

    #[test]
    fn cycle_through_merge_parent_is_reported() {
        // bbbb merges cccc, whose primary parent is bbbb.
        let graph = graph(vec![
            rev("aaaaaaaaaaaa", None, 1),
            rev("bbbbbbbbbbbb", Some("aaaaaaaaaaaa"), 2).with_merge_parents(["cccccccccccc"]),
            rev("cccccccccccc", Some("bbbbbbbbbbbb"), 3),
        ]);
        assert!(graph.heads().is_empty());

        let issues = diagnose(&graph);
        assert_eq!(
            issues,
            vec![
                Issue::Cycle {
                    identifiers: vec!["bbbbbbbbbbbb".to_string(), "cccccccccccc".to_string()]
                },
                Issue::MultipleHeads { ids: Vec::new() },
            ]
        );
        assert_eq!(issues[1].message(), "no head revision");
        assert!(!diagnostic_report(&graph, issues).accepted());
    }

    #[test]
    fn issues_are_ordered_by_kind_priority() {
        let graph = graph(vec![
            rev("aaaaaaaaaaaa", None, 1),
            rev("bbbbbbbbbbbb", None, 2),
            rev("cccccccccccc", Some("ffffffffffff"), 3),
            rev("aaaaaaaaaaaa", Some("bbbbbbbbbbbb"), 4),
        ]);
        let kinds: Vec<IssueKind> = diagnose(&graph).iter().map(Issue::kind).collect();
        assert_eq!(
            kinds,
            vec![
                IssueKind::DuplicateIdentifier,
                IssueKind::DanglingReference,
                IssueKind::MultipleRoots,
                IssueKind::MultipleHeads,
            ]
        );
    }

    #[test]
    fn dangling_reference_lists_stranded_descendants() {
        let graph = graph(vec![
            rev("aaaaaaaaaaaa", None, 1),
            rev("bbbbbbbbbbbb", Some("ffffffffffff"), 2),
            rev("cccccccccccc", Some("bbbbbbbbbbbb"), 3),
        ]);
        let dangling = diagnose(&graph)
            .into_iter()
            .find(|issue| issue.kind() == IssueKind::DanglingReference)
            .expect("dangling issue");
        assert_eq!(
            dangling,
            Issue::DanglingReference {
                record: "bbbbbbbbbbbb".to_string(),
                payload_ref: "bbbbbbbbbbbb_2.py".to_string(),
                missing_parent: "ffffffffffff".to_string(),
                stranded: vec!["cccccccccccc".to_string()],
            }
        );
    }

    #[test]
    fn missing_merge_parent_is_dangling() {
        let graph = graph(vec![
            rev("aaaaaaaaaaaa", None, 1),
            rev("bbbbbbbbbbbb", Some("aaaaaaaaaaaa"), 2).with_merge_parents(["eeeeeeeeeeee"]),
        ]);
        let issues = diagnose(&graph);
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            &issues[0],
            Issue::DanglingReference { missing_parent, stranded, .. }
                if missing_parent == "eeeeeeeeeeee" && stranded.is_empty()
        ));
    }

    #[test]
    fn issue_serializes_with_kind_tag() {
        let issue = Issue::DanglingReference {
            record: "bbbbbbbbbbbb".to_string(),
            payload_ref: "b.py".to_string(),
            missing_parent: "ffffffffffff".to_string(),
            stranded: Vec::new(),
        };
        let value = serde_json::to_value(&issue).expect("issue should serialize");
        assert_eq!(value["kind"], "dangling_reference");
        assert_eq!(value["missingParent"], "ffffffffffff");
    }
}
