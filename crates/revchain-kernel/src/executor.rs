//! Repair Executor: apply a plan edit by edit, then verify.

use crate::diagnostics::{Issue, diagnose};
use crate::error::ChainError;
use crate::graph::RevisionGraph;
use crate::planner::{RepairEdit, RepairPlan};
use crate::store::RevisionStore;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub applied: Vec<RepairEdit>,
    /// Issues left after re-reading the store; none owned by the plan.
    pub remaining: Vec<Issue>,
}

/// Apply `plan` to `store` in order.
///
/// Stops at the first failing edit with [`ChainError::EditFailed`]; edits
/// before it stay committed. Once every edit is in, the store is re-listed and
/// re-diagnosed: an issue the plan owns, or one its simulation did not
/// predict, fails with [`ChainError::RepairVerificationFailed`].
pub fn execute_plan(
    store: &mut dyn RevisionStore,
    plan: &RepairPlan,
) -> Result<ExecutionReport, ChainError> {
    let mut applied = Vec::with_capacity(plan.edits.len());
    for edit in &plan.edits {
        if let Err(source) = store.apply(edit) {
            tracing::error!(%edit, error = %source, committed = applied.len(), "edit failed");
            return Err(ChainError::EditFailed {
                applied,
                failed: edit.clone(),
                source,
            });
        }
        tracing::info!(%edit, "applied edit");
        applied.push(edit.clone());
    }

    let graph = RevisionGraph::build(store.list()?)?;
    let remaining = diagnose(&graph);
    let failed: Vec<Issue> = remaining
        .iter()
        .filter(|issue| plan.owns(issue.kind()) || !plan.residual.contains(issue))
        .cloned()
        .collect();
    if !failed.is_empty() {
        tracing::error!(issues = failed.len(), location = %store.location(), "verification failed");
        return Err(ChainError::RepairVerificationFailed {
            applied: applied.len(),
            issues: failed,
        });
    }

    tracing::info!(
        applied = applied.len(),
        remaining = remaining.len(),
        "repair verified"
    );
    Ok(ExecutionReport { applied, remaining })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{RepairStage, plan_repair};
    use crate::revision::RevisionRecord;
    use crate::store::MemoryRevisionStore;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    fn plan_for(store: &mut MemoryRevisionStore) -> RepairPlan {
        let graph = RevisionGraph::build(store.list().expect("list")).expect("graph");
        plan_repair(&graph, &diagnose(&graph), &RepairStage::ALL).expect("plan")
    }

    #[test]
    fn verified_execution_reports_applied_edits() {
        let mut store = MemoryRevisionStore::new(vec![
            RevisionRecord::new("aaaaaaaaaaaa", None, at(1), "a.py"),
            RevisionRecord::new("bbbbbbbbbbbb", None, at(2), "b.py"),
        ]);
        let plan = plan_for(&mut store);
        let report = execute_plan(&mut store, &plan).expect("execution should verify");
        assert_eq!(report.applied, plan.edits);
        assert!(report.remaining.is_empty());
    }

    #[test]
    fn tampered_store_fails_verification() {
        let mut store = MemoryRevisionStore::new(vec![
            RevisionRecord::new("aaaaaaaaaaaa", None, at(1), "a.py"),
            RevisionRecord::new("bbbbbbbbbbbb", None, at(2), "b.py"),
        ]);
        let plan = plan_for(&mut store);
        store
            .records_mut()
            .push(RevisionRecord::new("cccccccccccc", None, at(3), "c.py"));

        let err = execute_plan(&mut store, &plan).expect_err("new root must be caught");
        assert!(matches!(
            err,
            ChainError::RepairVerificationFailed { applied: 1, .. }
        ));
    }
}
