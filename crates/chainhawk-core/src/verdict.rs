//! Tri-state classification of engine output.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

pub const KEYWORDS: &[&str] = &["vulnerability", "bug", "violation", "exploit"];

/// stderr noise docker emits on an otherwise clean run.
pub const BENIGN_MARKERS: &[&str] = &[
    "Unable to find image",
    "Pulling from",
    "Pull complete",
    "Digest: sha256:",
    "Status: Downloaded newer image",
    "WARNING: The requested image's platform",
];

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = KEYWORDS.join("|");
    Regex::new(&format!(r"(?i)({})", alternatives)).expect("static regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    VulnerabilityFound,
    Completed,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::VulnerabilityFound => "vulnerability_found",
            Verdict::Completed => "completed",
            Verdict::Error => "error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub verdict: Verdict,
    pub message: String,
    /// Lowercased keyword that triggered a finding.
    pub keyword: Option<String>,
}

/// First keyword occurrence anywhere in `text` (identifiers included), lowercased.
pub fn find_keyword(text: &str) -> Option<String> {
    KEYWORD_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

fn has_benign_marker(stderr: &str) -> bool {
    BENIGN_MARKERS.iter().any(|m| stderr.contains(m))
}

/// Classify captured engine output. Total over all inputs.
pub fn classify(stdout: &str, stderr: &str) -> Classification {
    if let Some(keyword) = find_keyword(stdout).or_else(|| find_keyword(stderr)) {
        return Classification {
            verdict: Verdict::VulnerabilityFound,
            message: format!("Potential vulnerability reported (matched \"{}\")", keyword),
            keyword: Some(keyword),
        };
    }
    let blank = stdout.trim().is_empty() && stderr.trim().is_empty();
    let message = if blank || has_benign_marker(stderr) {
        "Fuzzing completed, no issues reported".to_string()
    } else {
        "Fuzzing completed".to_string()
    };
    Classification {
        verdict: Verdict::Completed,
        message,
        keyword: None,
    }
}

/// A run cut short by the wall-clock budget. Partial output is still scanned.
pub fn classify_timeout(stdout: &str, stderr: &str, budget_secs: u64) -> Classification {
    let mut c = classify(stdout, stderr);
    if c.verdict == Verdict::Completed {
        c.message = format!("Fuzzing timed out after {}s, no issues reported", budget_secs);
    } else {
        c.message = format!("{} before timing out after {}s", c.message, budget_secs);
    }
    c
}
