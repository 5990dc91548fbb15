//! Evidence extraction and the content-addressed evidence cache.
//!
//! Evidence is keyed by (artifact identity, content fingerprint), never by
//! relation: two relations over the same unchanged artifact reuse the same
//! extraction. A changed artifact gets a new fingerprint and a fresh pass;
//! old entries are left in place.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// One extracted snippet supporting rule evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub id: String,
    /// Where it came from (artifact name or path).
    pub source: String,
    pub content: String,
    pub line_number: u32,
    /// Set when the snippet spans more than one line.
    pub line_end: Option<u32>,
    /// The check point text that matched.
    pub matched_query: String,
}

impl Evidence {
    /// Human-readable citation for reports.
    pub fn citation(&self) -> String {
        match self.line_end {
            Some(end) if end != self.line_number => {
                format!("{}:{}-{}", self.source, self.line_number, end)
            }
            _ => format!("{}:{}", self.source, self.line_number),
        }
    }
}

/// SHA-256 fingerprint of artifact bytes, hex-encoded.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Extraction tuning for one pass over an artifact.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Capture surrounding lines as a structured snippet. The text-only
    /// fallback disables this and records single matching lines.
    pub structured: bool,
    /// Total hit cap across all queries.
    pub max_hits: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            structured: true,
            max_hits: 50,
        }
    }
}

fn evidence_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ev-{}", &hex[..8])
}

/// Keyword search over artifact text, one evidence item per matching line.
///
/// A line matches a query when it contains any significant word of the
/// query (case-insensitive). Structured extraction widens each hit to a
/// small window of surrounding lines.
pub fn extract_evidence(
    source: &str,
    text: &str,
    queries: &[String],
    options: &ExtractOptions,
) -> Vec<Evidence> {
    let lines: Vec<&str> = text.lines().collect();
    let mut collected = Vec::new();
    let mut seen_lines: Vec<bool> = vec![false; lines.len()];

    for query in queries {
        let words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .map(|w| w.to_string())
            .collect();
        if words.is_empty() {
            continue;
        }

        for (index, line) in lines.iter().enumerate() {
            if collected.len() >= options.max_hits {
                return collected;
            }
            if seen_lines[index] {
                continue;
            }
            let lowered = line.to_lowercase();
            if !words.iter().any(|w| lowered.contains(w)) {
                continue;
            }
            seen_lines[index] = true;

            let line_number = (index + 1) as u32;
            if options.structured {
                let start = index.saturating_sub(1);
                let end = (index + 2).min(lines.len());
                let snippet = lines[start..end].join("\n");
                collected.push(Evidence {
                    id: evidence_id(),
                    source: source.to_string(),
                    content: snippet,
                    line_number: (start + 1) as u32,
                    line_end: Some(end as u32),
                    matched_query: query.clone(),
                });
            } else {
                collected.push(Evidence {
                    id: evidence_id(),
                    source: source.to_string(),
                    content: line.trim().to_string(),
                    line_number,
                    line_end: None,
                    matched_query: query.clone(),
                });
            }
        }
    }

    collected
}

/// Content-addressed evidence cache.
///
/// Lookups and writes are best-effort: a failing backend degrades to fresh
/// extraction, never to a failed relation.
#[async_trait]
pub trait EvidenceCache: Send + Sync {
    async fn load(&self, artifact_id: &str, fingerprint: &str) -> Option<Vec<Evidence>>;
    async fn save(&self, artifact_id: &str, fingerprint: &str, evidence: &[Evidence]);
}

/// In-memory cache for single audit runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceCache {
    entries: Mutex<HashMap<(String, String), Vec<Evidence>>>,
}

#[async_trait]
impl EvidenceCache for InMemoryEvidenceCache {
    async fn load(&self, artifact_id: &str, fingerprint: &str) -> Option<Vec<Evidence>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(artifact_id.to_string(), fingerprint.to_string()))
            .cloned()
    }

    async fn save(&self, artifact_id: &str, fingerprint: &str, evidence: &[Evidence]) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(
                (artifact_id.to_string(), fingerprint.to_string()),
                evidence.to_vec(),
            );
    }
}
