//! # revchain kernel
//!
//! Structural integrity for schema-migration revision chains: a set of
//! revision records is read as a directed graph, diagnosed against its
//! invariants, and repaired with a deterministic edit plan.
//!
//! The kernel never touches files. Records come from, and edits go back to,
//! a [`RevisionStore`] adapter (see `revchain-store` for the file-backed ones).
//!
//! ## Architecture
//!
//! ```text
//! RevisionStore::list       ← fresh records, every invocation
//!     │
//! RevisionGraph::build      ← slots, parent attribution, roots, heads, reachability
//!     │
//! diagnose                  ← ordered Issue set (check stops here)
//!     │
//! plan_repair               ← staged RepairEdit list, simulated before use
//!     │
//! execute_plan              ← one scoped edit at a time, then re-list + re-diagnose
//! ```

pub mod diagnostics;
pub mod error;
pub mod executor;
pub mod graph;
pub mod mint;
pub mod planner;
pub mod repair;
pub mod revision;
pub mod store;

pub use diagnostics::{
    CHECK_KIND, DiagnosticReport, DiagnosticSummary, Issue, IssueKind, diagnose, diagnostic_report,
};
pub use error::{ChainError, StoreError};
pub use executor::{ExecutionReport, execute_plan};
pub use graph::{ParentLink, RevisionGraph, Slot};
pub use mint::mint_revision_id;
pub use planner::{RepairEdit, RepairPlan, RepairStage, plan_repair};
pub use repair::{REPAIR_KIND, RepairCommand, RepairOptions, RepairOutcome, run_check, run_repair};
pub use revision::{REVISION_ID_WIDTH, RevisionRecord, is_well_formed_id};
pub use store::{MemoryRevisionStore, RevisionStore};
