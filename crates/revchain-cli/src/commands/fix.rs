use crate::cli::{RepairArgs, StoreArgs};
use crate::config::Config;
use crate::support::{fail, issue_lines, open_store_or_exit, print_block, print_json, with_fields};
use revchain_kernel::{RepairCommand, RepairOptions, run_repair};
use serde_json::json;

pub fn run(config: &Config, command: RepairCommand, store_args: StoreArgs, args: RepairArgs) {
    let options = config.store_options(&store_args);
    let mut store = open_store_or_exit(&options);
    let result = run_repair(
        store.as_mut(),
        command,
        RepairOptions {
            dry_run: args.dry_run,
        },
    );
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            drop(store);
            fail(e)
        }
    };
    tracing::info!(
        command = command.name(),
        dry_run = outcome.dry_run,
        applied = outcome.applied.len(),
        remaining = outcome.remaining.len(),
        "repair finished"
    );
    let warnings = store.warnings();
    let backup_dir = options
        .resolved_backup_dir()
        .filter(|_| outcome.changed())
        .map(|dir| dir.display().to_string());

    if args.json {
        let payload = serde_json::to_value(&outcome).expect("json serialization");
        print_json(&with_fields(
            payload,
            json!({
                "schema": 1,
                "store": store.location(),
                "backupDir": backup_dir,
                "warnings": warnings,
            }),
        ));
        return;
    }

    let mode = if outcome.dry_run { " (dry run)" } else { "" };
    println!("revchain {} {}{mode}", command.name(), store.location());
    println!("  Issues before: {}", outcome.before.issues.len());
    if outcome.plan.is_empty() {
        println!("  Nothing to repair.");
    }
    let planned: Vec<String> = outcome.plan.edits.iter().map(ToString::to_string).collect();
    print_block("Planned edits", &planned);
    if outcome.dry_run {
        println!("  Nothing written.");
    } else if outcome.changed() {
        println!("  Applied: {} edit(s), verified", outcome.applied.len());
    }
    if let Some(dir) = &backup_dir {
        println!("  Backups: {dir}");
    }
    print_block("Remaining issues", &issue_lines(&outcome.remaining));
    print_block("Warnings", &warnings);
}
