//! Rule sets and artifacts for in-process audit runs.
//!
//! Lookups go through injected catalog traits rather than global tables, so
//! tests and the CLI can swap in-memory data for store-backed data.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Severity attached to a rule; drives the reduced-scope fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl RuleSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSeverity::Critical => "CRITICAL",
            RuleSeverity::High => "HIGH",
            RuleSeverity::Medium => "MEDIUM",
            RuleSeverity::Low => "LOW",
        }
    }

    /// Critical and high severity rules survive a reduced-scope pass.
    pub fn is_priority(&self) -> bool {
        matches!(self, RuleSeverity::Critical | RuleSeverity::High)
    }
}

/// One auditable rule. Rule content is opaque data to the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub severity: RuleSeverity,
    /// Concrete things to look for; the heuristic evaluator scores coverage
    /// of these against collected evidence.
    #[serde(default)]
    pub check_points: Vec<String>,
}

/// A named, versioned collection of rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Rules to evaluate for the given scope.
    pub fn rules_in_scope(&self, critical_only: bool) -> Vec<&Rule> {
        if critical_only {
            self.rules.iter().filter(|r| r.severity.is_priority()).collect()
        } else {
            self.rules.iter().collect()
        }
    }
}

/// A source artifact to audit. Bytes are read at evaluation time so the
/// fingerprint always reflects current content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
}

impl Artifact {
    /// Wrap a filesystem path as an artifact; the path doubles as its ID.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Artifact {
            id: path.display().to_string(),
            name,
            path: path.to_path_buf(),
        }
    }
}

/// Resolve rule sets by ID.
#[async_trait]
pub trait RuleSetCatalog: Send + Sync {
    async fn get(&self, id: &str) -> Option<RuleSet>;
}

/// Resolve artifacts by ID.
#[async_trait]
pub trait ArtifactCatalog: Send + Sync {
    async fn get(&self, id: &str) -> Option<Artifact>;
}

/// In-memory rule set catalog used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRuleSets {
    sets: HashMap<String, RuleSet>,
}

impl InMemoryRuleSets {
    pub fn from_sets(sets: Vec<RuleSet>) -> Self {
        Self {
            sets: sets.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}

#[async_trait]
impl RuleSetCatalog for InMemoryRuleSets {
    async fn get(&self, id: &str) -> Option<RuleSet> {
        self.sets.get(id).cloned()
    }
}

/// In-memory artifact catalog used by the CLI and tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArtifacts {
    artifacts: HashMap<String, Artifact>,
}

impl InMemoryArtifacts {
    pub fn from_artifacts(artifacts: Vec<Artifact>) -> Self {
        Self {
            artifacts: artifacts.into_iter().map(|a| (a.id.clone(), a)).collect(),
        }
    }
}

#[async_trait]
impl ArtifactCatalog for InMemoryArtifacts {
    async fn get(&self, id: &str) -> Option<Artifact> {
        self.artifacts.get(id).cloned()
    }
}

/// Parse rule sets from a JSON document (an array of rule sets).
pub fn parse_rule_sets(json: &str) -> Result<Vec<RuleSet>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> RuleSet {
        RuleSet {
            id: "rs-1".to_string(),
            name: "Data Handling".to_string(),
            version: "1.0".to_string(),
            rules: vec![
                Rule {
                    id: "r-1".to_string(),
                    title: "Encrypt at rest".to_string(),
                    description: String::new(),
                    severity: RuleSeverity::Critical,
                    check_points: vec!["encryption".to_string()],
                },
                Rule {
                    id: "r-2".to_string(),
                    title: "Log retention".to_string(),
                    description: String::new(),
                    severity: RuleSeverity::Low,
                    check_points: vec![],
                },
            ],
        }
    }

    #[test]
    fn test_scope_filter() {
        let set = sample_set();
        assert_eq!(set.rules_in_scope(false).len(), 2);
        let priority = set.rules_in_scope(true);
        assert_eq!(priority.len(), 1);
        assert_eq!(priority[0].id, "r-1");
    }

    #[tokio::test]
    async fn test_in_memory_catalogs() {
        let rules = InMemoryRuleSets::from_sets(vec![sample_set()]);
        assert!(rules.get("rs-1").await.is_some());
        assert!(rules.get("rs-2").await.is_none());

        let artifact = Artifact::from_path(Path::new("src/handler.rs"));
        assert_eq!(artifact.name, "handler.rs");
        let artifacts = InMemoryArtifacts::from_artifacts(vec![artifact.clone()]);
        assert!(artifacts.get(&artifact.id).await.is_some());
    }

    #[test]
    fn test_parse_rule_sets() {
        let json = r#"[{
            "id": "rs-9",
            "name": "Access Control",
            "rules": [
                {"id": "r-9", "title": "MFA required", "severity": "HIGH"}
            ]
        }]"#;
        let sets = parse_rule_sets(json).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].rules[0].severity, RuleSeverity::High);
        assert!(sets[0].rules[0].check_points.is_empty());
    }
}
