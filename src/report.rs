//! Report rendering for finished scans.
//!
//! Pure data-to-markdown: a summary of per-status counts followed by one
//! block per result. Persistence and state transitions live in the
//! reporter worker.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::models::{Scan, ScanResult};

/// Truncate a string to `cap` bytes (UTF-8 safe) with a trailing marker.
pub fn truncate_evidence(text: &str, cap: usize) -> String {
    if text.len() <= cap {
        return text.to_string();
    }
    let mut end = cap;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &text[..end])
}

/// Per-status result counts, sorted by status name.
pub fn summarize_statuses(results: &[ScanResult]) -> BTreeMap<&'static str, usize> {
    let mut summary = BTreeMap::new();
    for result in results {
        *summary.entry(result.status.as_str()).or_insert(0) += 1;
    }
    summary
}

fn format_evidence(evidence: Option<&str>, max_chars: usize) -> String {
    let Some(evidence) = evidence else {
        return "  - Evidence: (none)".to_string();
    };
    let truncated = truncate_evidence(evidence, max_chars);
    let lines: Vec<&str> = truncated.lines().filter(|l| !l.trim().is_empty()).collect();
    match lines.as_slice() {
        [] => "  - Evidence: (none)".to_string(),
        [single] => format!("  - Evidence: {}", single),
        many => format!("  - Evidence:\n\n```text\n{}\n```\n", many.join("\n")),
    }
}

fn render_result(result: &ScanResult, max_evidence_chars: usize) -> String {
    format!(
        "- Result ID: {}\n  - Status: {}\n  - Compliance Item: {}\n  - Reasoning: {}\n{}\n",
        result.id,
        result.status.as_str(),
        result.compliance_item_id,
        result.reasoning.as_deref().unwrap_or("(none)"),
        format_evidence(result.evidence.as_deref(), max_evidence_chars),
    )
}

/// Render the markdown report for a finished scan.
pub fn render_report(scan: &Scan, results: &[ScanResult], max_evidence_chars: usize) -> String {
    let mut lines = vec![
        "# Compliance Scan Report".to_string(),
        String::new(),
        format!("- Scan ID: {}", scan.id),
        format!("- Repo URL: {}", scan.repo_url),
        format!("- Generated At: {}", Utc::now().to_rfc3339()),
        String::new(),
        "## Summary".to_string(),
        String::new(),
    ];

    for (status, count) in summarize_statuses(results) {
        lines.push(format!("- {}: {}", status, count));
    }

    lines.push(String::new());
    lines.push("## Results".to_string());
    lines.push(String::new());
    for result in results {
        lines.push(render_result(result, max_evidence_chars));
    }

    let mut content = lines.join("\n").trim_end().to_string();
    content.push('\n');
    content
}
