//! In-process audit scheduling.
//!
//! One `audit` call evaluates every (rule set × artifact) pair for a run:
//! bounded-concurrency or sequential execution, per-relation retry with
//! backoff through the shared primitive, and a one-shot fallback
//! redistribution pass for relations that exhaust retries.

pub mod agent;
pub mod catalog;
pub mod evidence;
pub mod fallback;
pub mod finding;
pub mod relation;
pub mod scheduler;

pub use agent::{AgentError, AuditAgent, EvaluationMode};
pub use catalog::{
    parse_rule_sets, Artifact, ArtifactCatalog, InMemoryArtifacts, InMemoryRuleSets, Rule,
    RuleSet, RuleSetCatalog, RuleSeverity,
};
pub use evidence::{
    extract_evidence, fingerprint, Evidence, EvidenceCache, ExtractOptions, InMemoryEvidenceCache,
};
pub use fallback::{classify_failure, FallbackStrategy};
pub use finding::{Finding, FindingStatus, FindingSummary};
pub use relation::{build_relations, AuditRelation, AuditStatus, RunConfig};
pub use scheduler::{AuditResult, AuditScheduler};
