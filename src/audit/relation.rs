//! Audit relations: the ephemeral (rule set × artifact) unit of work.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::evidence::Evidence;
use super::finding::Finding;

/// Lifecycle of one relation inside a scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Immutable configuration shared by every relation in a batch.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Max evaluator round-trips per relation.
    pub max_iterations: u32,
    /// Per-relation evaluation timeout.
    pub timeout: Duration,
    /// Findings below this confidence require review.
    pub confidence_threshold: f64,
    /// Use the external judgment service; heuristic scoring otherwise.
    pub use_llm: bool,
    /// Optional model override passed to the judgment service.
    pub model: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            timeout: Duration::from_secs(300),
            confidence_threshold: 0.7,
            use_llm: true,
            model: None,
        }
    }
}

/// One (rule set, artifact) pair being evaluated. Created at scheduler
/// invocation and discarded after the run; never persisted.
#[derive(Debug, Clone)]
pub struct AuditRelation {
    pub id: String,
    pub ruleset_id: String,
    pub artifact_id: String,
    pub status: AuditStatus,
    pub run_config: Arc<RunConfig>,
    pub evidence_collected: Vec<Evidence>,
    pub findings: Vec<Finding>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl AuditRelation {
    pub fn new(id: String, ruleset_id: String, artifact_id: String, config: Arc<RunConfig>) -> Self {
        AuditRelation {
            id,
            ruleset_id,
            artifact_id,
            status: AuditStatus::Pending,
            run_config: config,
            evidence_collected: Vec::new(),
            findings: Vec::new(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    /// Mark running. Clears prior output so a retry or fallback pass starts
    /// from a clean slate.
    pub fn start(&mut self) {
        self.status = AuditStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
        self.error_message = None;
        self.evidence_collected.clear();
        self.findings.clear();
    }

    pub fn complete(&mut self) {
        self.status = AuditStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = AuditStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(error.into());
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.status, AuditStatus::Completed | AuditStatus::Failed)
    }
}

/// Cartesian product of rule set and artifact IDs, sharing one config.
pub fn build_relations(
    ruleset_ids: &[String],
    artifact_ids: &[String],
    config: RunConfig,
) -> Vec<AuditRelation> {
    let config = Arc::new(config);
    let mut relations = Vec::with_capacity(ruleset_ids.len() * artifact_ids.len());
    let mut n = 0;
    for ruleset_id in ruleset_ids {
        for artifact_id in artifact_ids {
            n += 1;
            relations.push(AuditRelation::new(
                format!("rel-{:03}", n),
                ruleset_id.clone(),
                artifact_id.clone(),
                config.clone(),
            ));
        }
    }
    relations
}
