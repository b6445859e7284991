//! Check and repair commands over a [`RevisionStore`].

use crate::diagnostics::{DiagnosticReport, Issue, diagnose, diagnostic_report};
use crate::error::ChainError;
use crate::executor::execute_plan;
use crate::graph::RevisionGraph;
use crate::planner::{RepairEdit, RepairPlan, RepairStage, plan_repair};
use crate::store::RevisionStore;
use serde::Serialize;

pub const REPAIR_KIND: &str = "revchain.repair.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairCommand {
    FixChain,
    FixDuplicates,
    FixAll,
}

impl RepairCommand {
    pub fn stages(self) -> &'static [RepairStage] {
        match self {
            RepairCommand::FixChain => &[
                RepairStage::Orphans,
                RepairStage::Heads,
                RepairStage::Roots,
            ],
            RepairCommand::FixDuplicates => &[RepairStage::Duplicates],
            RepairCommand::FixAll => &RepairStage::ALL,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            RepairCommand::FixChain => "fix-chain",
            RepairCommand::FixDuplicates => "fix-duplicates",
            RepairCommand::FixAll => "fix-all",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepairOptions {
    /// Plan only; the store is listed but never written.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairOutcome {
    pub repair_kind: String,
    pub command: RepairCommand,
    pub dry_run: bool,
    pub before: DiagnosticReport,
    pub plan: RepairPlan,
    /// Edits committed to the store; empty on a dry run.
    pub applied: Vec<RepairEdit>,
    /// Issues outside the command's scope still present (projected on a dry run).
    pub remaining: Vec<Issue>,
}

impl RepairOutcome {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Read the store fresh and diagnose it.
pub fn run_check(store: &mut dyn RevisionStore) -> Result<DiagnosticReport, ChainError> {
    let graph = RevisionGraph::build(store.list()?)?;
    let issues = diagnose(&graph);
    tracing::info!(
        location = %store.location(),
        records = graph.len(),
        issues = issues.len(),
        "check complete"
    );
    Ok(diagnostic_report(&graph, issues))
}

/// Diagnose, plan with the command's stages, and (unless dry) execute.
pub fn run_repair(
    store: &mut dyn RevisionStore,
    command: RepairCommand,
    options: RepairOptions,
) -> Result<RepairOutcome, ChainError> {
    let span = tracing::info_span!("repair", command = command.name(), dry_run = options.dry_run);
    let _enter = span.enter();

    let graph = RevisionGraph::build(store.list()?)?;
    let issues = diagnose(&graph);
    let plan = plan_repair(&graph, &issues, command.stages())?;
    tracing::info!(
        edits = plan.edits.len(),
        resolved = plan.resolved.len(),
        residual = plan.residual.len(),
        "plan ready"
    );
    let before = diagnostic_report(&graph, issues);

    let (applied, remaining) = if options.dry_run || plan.is_empty() {
        (Vec::new(), plan.residual.clone())
    } else {
        let report = execute_plan(store, &plan)?;
        (report.applied, report.remaining)
    };

    Ok(RepairOutcome {
        repair_kind: REPAIR_KIND.to_string(),
        command,
        dry_run: options.dry_run,
        before,
        plan,
        applied,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revision::RevisionRecord;
    use crate::store::MemoryRevisionStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    fn two_roots() -> MemoryRevisionStore {
        MemoryRevisionStore::new(vec![
            RevisionRecord::new("aaaaaaaaaaaa", None, at(1), "a.py"),
            RevisionRecord::new("bbbbbbbbbbbb", None, at(2), "b.py"),
        ])
    }

    #[test]
    fn dry_run_never_writes() {
        let mut store = two_roots();
        let outcome = run_repair(
            &mut store,
            RepairCommand::FixAll,
            RepairOptions { dry_run: true },
        )
        .expect("dry run should plan");
        assert_eq!(outcome.plan.edits.len(), 1);
        assert!(!outcome.changed());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn fix_duplicates_leaves_chain_issues_alone() {
        let mut store = two_roots();
        let outcome = run_repair(
            &mut store,
            RepairCommand::FixDuplicates,
            RepairOptions::default(),
        )
        .expect("nothing to do is success");
        assert!(outcome.plan.is_empty());
        assert!(
            outcome
                .remaining
                .iter()
                .any(|issue| issue.class() == "chain.multiple_roots")
        );
    }

    #[test]
    fn check_reports_rejected_graph() {
        let mut store = two_roots();
        let report = run_check(&mut store).expect("check should run");
        assert!(!report.accepted());
        assert_eq!(
            report.issue_classes,
            vec![
                "chain.multiple_heads".to_string(),
                "chain.multiple_roots".to_string()
            ]
        );
    }
}
