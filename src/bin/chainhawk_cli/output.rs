//! Output formatting for analysis outcomes and errors.

use serde::Serialize;
use std::fmt::Write as _;

use chainhawk_core::{AnalysisOutcome, Verdict};

fn status_label(status: Verdict) -> &'static str {
    match status {
        Verdict::VulnerabilityFound => "\x1b[31mVULNERABILITY FOUND\x1b[0m",
        Verdict::Completed => "\x1b[32mCOMPLETED\x1b[0m",
        Verdict::Error => "\x1b[31mERROR\x1b[0m",
    }
}

/// Human-readable outcome report.
pub fn format_outcome(outcome: &AnalysisOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "[{}] {}", status_label(outcome.status), outcome.message);
    match (&outcome.contract_name, &outcome.contract_address) {
        (Some(name), Some(address)) => {
            let _ = writeln!(out, "  contract: {} @ {}", name, address);
        }
        (None, Some(address)) => {
            let _ = writeln!(out, "  contract: {}", address);
        }
        _ => {}
    }
    if let Some(stage) = outcome.failed_stage {
        let _ = writeln!(out, "  failed stage: {}", stage);
    }
    if outcome.timed_out {
        let _ = writeln!(out, "  timed out: yes");
    }
    for warning in &outcome.warnings {
        let _ = writeln!(out, "  \x1b[33mwarning:\x1b[0m {}", warning);
    }
    if let Some(details) = &outcome.details {
        out.push('\n');
        out.push_str(details.trim_end());
        out.push('\n');
    }
    out
}

pub fn print_outcome(outcome: &AnalysisOutcome, json_output: bool) {
    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(outcome).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", format_outcome(outcome));
    }
}

/// Format an error with its cause chain.
pub fn format_error(error: &anyhow::Error, json_output: bool) -> String {
    if json_output {
        #[derive(Serialize)]
        struct ErrorJson {
            status: Verdict,
            error: String,
            #[serde(skip_serializing_if = "Vec::is_empty")]
            causes: Vec<String>,
        }

        let err = ErrorJson {
            status: Verdict::Error,
            error: error.to_string(),
            causes: error.chain().skip(1).map(|e| e.to_string()).collect(),
        };
        serde_json::to_string_pretty(&err).unwrap_or_else(|_| "{}".to_string())
    } else {
        let mut out = format!("\x1b[31mError:\x1b[0m {}\n", error);
        let mut causes = error.chain().skip(1).peekable();
        if causes.peek().is_some() {
            out.push_str("Caused by:\n");
            for (idx, cause) in causes.enumerate() {
                out.push_str(&format!("  {}: {}\n", idx + 1, cause));
            }
        }
        out
    }
}
