use clap::{ArgAction, Args, Parser, Subcommand};
use revchain_store::StoreKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "revchain",
    about = "revchain: check and repair schema-migration revision chains",
    version
)]
pub struct Cli {
    /// Config file (defaults to ./revchain.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG wins
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where revisions live and how rewritten files are backed up.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Versions directory or JSONL ledger [default: migrations/versions]
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Store adapter: auto, versions-dir, or jsonl
    #[arg(long)]
    pub store: Option<StoreKind>,

    /// Backup directory [default: <path>/../migration_backups]
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    /// Rewrite files without backing them up first
    #[arg(long)]
    pub no_backup: bool,
}

#[derive(Args, Debug, Clone, Copy, Default)]
pub struct RepairArgs {
    /// Print the plan without modifying the store
    #[arg(long)]
    pub dry_run: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Diagnose the revision graph and report every integrity issue
    Check {
        #[command(flatten)]
        store: StoreArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Repair broken links, extra roots and divergent heads
    FixChain {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        repair: RepairArgs,
    },

    /// Give later duplicate revisions fresh identifiers
    FixDuplicates {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        repair: RepairArgs,
    },

    /// Repair duplicates, then the chain
    FixAll {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        repair: RepairArgs,
    },
}
