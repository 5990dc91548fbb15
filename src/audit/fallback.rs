//! Fallback strategy classification for relations that exhaust retries.
//!
//! The redistribution pass inspects each failure's error text and picks a
//! cheaper evaluation strategy. Each fallback runs at most once; relations
//! that still fail stay FAILED and are surfaced in the result.

/// Cheaper evaluation strategy substituted after retry exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Re-run with structural extraction disabled.
    TextOnly,
    /// Re-run over critical/high-severity rules only.
    ReducedScope,
    /// Mark rules not applicable and skip evaluation.
    SkipRule,
}

/// Map an error message to a fallback strategy.
pub fn classify_failure(error: &str) -> FallbackStrategy {
    let lowered = error.to_lowercase();

    if lowered.contains("syntax") || lowered.contains("parse") || lowered.contains("ast") {
        return FallbackStrategy::TextOnly;
    }
    if lowered.contains("timeout") || lowered.contains("rate limit") {
        return FallbackStrategy::ReducedScope;
    }
    if lowered.contains("not found") || lowered.contains("missing") {
        return FallbackStrategy::SkipRule;
    }

    // Text analysis is the safest default
    FallbackStrategy::TextOnly
}
