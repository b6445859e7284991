use revchain_kernel::{ChainError, Issue, RevisionStore};
use revchain_store::{StoreOptions, open_store};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// `check` found issues, or a repair was declined.
pub const EXIT_REJECTED: i32 = 1;
/// Store, parse, execution or verification failure.
pub const EXIT_FAILURE: i32 = 2;

const DEFAULT_LOG_LEVEL: &str = "warn";

/// Logs go to stderr; stdout carries command output only.
pub fn init_logging(verbose: u8, configured: Option<&str>) {
    let directive = match verbose {
        0 => configured.unwrap_or(DEFAULT_LOG_LEVEL),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

pub fn open_store_or_exit(options: &StoreOptions) -> Box<dyn RevisionStore> {
    let store = open_store(options).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(EXIT_FAILURE);
    });
    tracing::info!(
        store = %store.location(),
        kind = ?options.kind.resolve(&options.path),
        backups = options.backups,
        "revision store opened"
    );
    store
}

pub fn exit_code(error: &ChainError) -> i32 {
    match error {
        ChainError::UnplannableConflict { .. } => EXIT_REJECTED,
        ChainError::MalformedRecord { .. }
        | ChainError::Store(_)
        | ChainError::EditFailed { .. }
        | ChainError::RepairVerificationFailed { .. } => EXIT_FAILURE,
    }
}

/// Report `error` with its specifics and exit.
pub fn fail(error: ChainError) -> ! {
    eprintln!("error: {error}");
    match &error {
        ChainError::EditFailed { applied, .. } if !applied.is_empty() => {
            eprintln!("  committed before the failure:");
            for edit in applied {
                eprintln!("    - {edit}");
            }
        }
        ChainError::RepairVerificationFailed { issues, .. } => {
            eprintln!("  unresolved after repair:");
            for issue in issues {
                eprintln!("    - [{}] {}", issue.class(), issue.message());
            }
        }
        _ => {}
    }
    std::process::exit(exit_code(&error));
}

pub fn print_json(payload: &Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(payload).expect("json serialization")
    );
}

pub fn print_block(title: &str, lines: &[String]) {
    if lines.is_empty() {
        return;
    }
    println!("  {title} ({}):", lines.len());
    for line in lines {
        println!("    - {line}");
    }
}

pub fn issue_lines(issues: &[Issue]) -> Vec<String> {
    issues
        .iter()
        .map(|issue| format!("[{}] {}", issue.class(), issue.message()))
        .collect()
}

/// Merge `extra` into a serialized report object.
pub fn with_fields(mut payload: Value, extra: Value) -> Value {
    if let (Value::Object(target), Value::Object(fields)) = (&mut payload, extra) {
        for (key, value) in fields {
            target.insert(key, value);
        }
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declined_repairs_and_failures_use_distinct_codes() {
        let declined = ChainError::UnplannableConflict {
            reason: "cycle".to_string(),
            identifiers: Vec::new(),
        };
        let failed = ChainError::RepairVerificationFailed {
            applied: 2,
            issues: Vec::new(),
        };
        assert_eq!(exit_code(&declined), EXIT_REJECTED);
        assert_eq!(exit_code(&failed), EXIT_FAILURE);
    }

    #[test]
    fn with_fields_adds_keys() {
        let merged = with_fields(json!({"result": "accepted"}), json!({"schema": 1}));
        assert_eq!(merged, json!({"result": "accepted", "schema": 1}));
    }
}
