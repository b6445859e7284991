use crate::cli::StoreArgs;
use crate::config::Config;
use crate::support::{
    EXIT_REJECTED, fail, issue_lines, open_store_or_exit, print_block, print_json, with_fields,
};
use revchain_kernel::run_check;
use serde_json::json;

pub fn run(config: &Config, store_args: StoreArgs, json_output: bool) {
    let options = config.store_options(&store_args);
    let mut store = open_store_or_exit(&options);
    let result = run_check(store.as_mut());
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            // Exiting skips destructors; release the store lock first.
            drop(store);
            fail(e)
        }
    };
    let warnings = store.warnings();

    if json_output {
        let payload = serde_json::to_value(&report).expect("json serialization");
        print_json(&with_fields(
            payload,
            json!({
                "schema": 1,
                "store": store.location(),
                "warnings": warnings,
            }),
        ));
    } else {
        println!("revchain check {}", store.location());
        println!("  Records: {}", report.summary.record_count);
        println!("  Roots: {}", report.summary.roots.join(", "));
        println!("  Heads: {}", report.summary.heads.join(", "));
        println!("  Result: {}", report.result);
        print_block("Issues", &issue_lines(&report.issues));
        print_block("Warnings", &warnings);
    }

    if !report.accepted() {
        drop(store);
        std::process::exit(EXIT_REJECTED);
    }
}
