//! In-process audit scheduler.
//!
//! Fans (rule set × artifact) pairs out as relations, runs them with
//! bounded concurrency or strictly sequentially, retries each through the
//! shared backoff primitive, and redistributes exhausted failures to a
//! cheaper strategy exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::retry::{retry_with_backoff, RetryConfig};

use super::agent::{AgentError, AuditAgent, EvaluationMode};
use super::fallback::{classify_failure, FallbackStrategy};
use super::finding::FindingSummary;
use super::relation::{build_relations, AuditRelation, AuditStatus, RunConfig};

const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Aggregate outcome of one `audit` call.
#[derive(Debug)]
pub struct AuditResult {
    pub relations: Vec<AuditRelation>,
    /// relation_id -> summary
    pub summaries: HashMap<String, FindingSummary>,
    pub total_findings: usize,
    pub total_passed: usize,
    pub total_failed: usize,
    pub total_review: usize,
    pub failed_relations: usize,
}

impl AuditResult {
    pub fn from_relations(relations: Vec<AuditRelation>) -> Self {
        let mut summaries = HashMap::new();
        let mut total_findings = 0;
        let mut total_passed = 0;
        let mut total_failed = 0;
        let mut total_review = 0;
        let mut failed_relations = 0;

        for relation in &relations {
            if relation.status == AuditStatus::Failed {
                failed_relations += 1;
            }
            let summary = FindingSummary::from_findings(&relation.id, &relation.findings);
            total_findings += summary.total;
            total_passed += summary.passed;
            total_failed += summary.failed;
            total_review += summary.review;
            summaries.insert(relation.id.clone(), summary);
        }

        AuditResult {
            relations,
            summaries,
            total_findings,
            total_passed,
            total_failed,
            total_review,
            failed_relations,
        }
    }

    /// No failed findings, nothing pending review, no failed relations.
    pub fn is_compliant(&self) -> bool {
        self.total_failed == 0 && self.total_review == 0 && self.failed_relations == 0
    }

    pub fn needs_review(&self) -> bool {
        self.total_review > 0 || self.total_failed > 0
    }
}

/// Schedules relation evaluation for one audit run.
pub struct AuditScheduler {
    agent: AuditAgent,
    retry: RetryConfig,
    parallel: bool,
    max_concurrency: usize,
}

impl AuditScheduler {
    pub fn new(agent: AuditAgent, retry: RetryConfig) -> Self {
        Self {
            agent,
            retry,
            parallel: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Deterministic mode for debugging and small batches.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Evaluate the Cartesian product of rule sets and artifacts.
    pub async fn audit(
        &self,
        ruleset_ids: &[String],
        artifact_ids: &[String],
        run_config: RunConfig,
    ) -> AuditResult {
        let relations = build_relations(ruleset_ids, artifact_ids, run_config);
        info!(
            "Starting audit: {} rule sets x {} artifacts = {} relations",
            ruleset_ids.len(),
            artifact_ids.len(),
            relations.len()
        );

        let mut completed = if self.parallel && relations.len() > 1 {
            self.run_parallel(relations).await
        } else {
            self.run_sequential(relations).await
        };

        self.redistribute_failures(&mut completed).await;

        let result = AuditResult::from_relations(completed);
        info!(
            "Audit complete: {} passed, {} failed, {} review, {} relations failed",
            result.total_passed, result.total_failed, result.total_review, result.failed_relations
        );
        result
    }

    async fn run_parallel(&self, relations: Vec<AuditRelation>) -> Vec<AuditRelation> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut set = JoinSet::new();

        for relation in relations {
            let agent = self.agent.clone();
            let retry = self.per_relation_retry(&relation);
            let semaphore = semaphore.clone();
            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let mut failed = relation;
                        failed.fail("scheduler shut down before evaluation");
                        return failed;
                    }
                };
                run_relation(&agent, &retry, relation).await
            });
        }

        let mut completed = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(relation) => completed.push(relation),
                Err(join_error) => error!("relation task panicked: {}", join_error),
            }
        }
        // Stable output order regardless of completion order
        completed.sort_by(|a, b| a.id.cmp(&b.id));
        completed
    }

    async fn run_sequential(&self, relations: Vec<AuditRelation>) -> Vec<AuditRelation> {
        let mut completed = Vec::with_capacity(relations.len());
        for relation in relations {
            let retry = self.per_relation_retry(&relation);
            completed.push(run_relation(&self.agent, &retry, relation).await);
        }
        completed
    }

    /// Retry budget per relation, additionally capped by the run config's
    /// iteration limit (attempts <= max_iterations).
    fn per_relation_retry(&self, relation: &AuditRelation) -> RetryConfig {
        let mut retry = self.retry.clone();
        let cap = relation.run_config.max_iterations.saturating_sub(1);
        retry.max_retries = retry.max_retries.min(cap);
        retry
    }

    /// One-shot fallback pass over the failure set. No nested retries;
    /// relations that still fail stay FAILED and are surfaced.
    async fn redistribute_failures(&self, completed: &mut [AuditRelation]) {
        let failure_count = completed
            .iter()
            .filter(|r| r.status == AuditStatus::Failed)
            .count();
        if failure_count == 0 {
            return;
        }
        info!("Redistributing {} failed relations", failure_count);

        for slot in completed.iter_mut() {
            if slot.status != AuditStatus::Failed {
                continue;
            }
            let error = slot.error_message.clone().unwrap_or_default();
            let strategy = classify_failure(&error);
            let mode = match strategy {
                FallbackStrategy::TextOnly => EvaluationMode::TextOnly,
                FallbackStrategy::ReducedScope => EvaluationMode::CriticalOnly,
                FallbackStrategy::SkipRule => EvaluationMode::NotApplicable,
            };
            info!(
                "Fallback {:?} for relation {} ({})",
                strategy, slot.id, error
            );

            let timeout = slot.run_config.timeout;
            match tokio::time::timeout(timeout, self.agent.evaluate(slot.clone(), mode)).await {
                Ok(Ok(recovered)) => {
                    info!("Fallback succeeded for relation {}", recovered.id);
                    *slot = recovered;
                }
                Ok(Err(fallback_error)) => {
                    warn!(
                        "Fallback failed for relation {}: {}",
                        slot.id, fallback_error
                    );
                }
                Err(_) => {
                    warn!("Fallback timed out for relation {}", slot.id);
                }
            }
        }
    }
}

/// Run one relation through the shared retry wrapper, honoring its timeout.
async fn run_relation(
    agent: &AuditAgent,
    retry: &RetryConfig,
    relation: AuditRelation,
) -> AuditRelation {
    let timeout = relation.run_config.timeout;
    let label = format!("relation {}", relation.id);

    let outcome = retry_with_backoff(retry, &label, || {
        let attempt_relation = relation.clone();
        async move {
            match tokio::time::timeout(
                timeout,
                agent.evaluate(attempt_relation, EvaluationMode::Full),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AgentError::Timeout(timeout.as_secs())),
            }
        }
    })
    .await;

    match outcome {
        Ok(done) => done,
        Err(err) => {
            let mut failed = relation;
            failed.fail(err.to_string());
            failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::catalog::{
        Artifact, InMemoryArtifacts, InMemoryRuleSets, Rule, RuleSet, RuleSeverity,
    };
    use crate::audit::evidence::InMemoryEvidenceCache;
    use std::io::Write;

    fn fixture(dir: &tempfile::TempDir) -> (AuditAgent, String, String) {
        let path = dir.path().join("service.rs");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"let key = load_encryption_key();\nretention_days = 30;\n")
            .unwrap();

        let artifact = Artifact::from_path(&path);
        let artifact_id = artifact.id.clone();
        let rule_set = RuleSet {
            id: "rs-1".to_string(),
            name: "Data Handling".to_string(),
            version: "1.0".to_string(),
            rules: vec![
                Rule {
                    id: "r-1".to_string(),
                    title: "Encrypt at rest".to_string(),
                    description: String::new(),
                    severity: RuleSeverity::Critical,
                    check_points: vec!["encryption key".to_string()],
                },
                Rule {
                    id: "r-2".to_string(),
                    title: "Retention policy".to_string(),
                    description: String::new(),
                    severity: RuleSeverity::Low,
                    check_points: vec!["retention days".to_string()],
                },
            ],
        };

        let agent = AuditAgent::new(
            Arc::new(InMemoryRuleSets::from_sets(vec![rule_set])),
            Arc::new(InMemoryArtifacts::from_artifacts(vec![artifact])),
            None,
            Arc::new(InMemoryEvidenceCache::default()),
        );
        (agent, "rs-1".to_string(), artifact_id)
    }

    fn offline_config() -> RunConfig {
        RunConfig {
            use_llm: false,
            ..RunConfig::default()
        }
    }

    #[tokio::test]
    async fn test_parallel_and_sequential_agree() {
        let dir = tempfile::tempdir().unwrap();
        let (agent, ruleset_id, artifact_id) = fixture(&dir);

        let parallel = AuditScheduler::new(agent.clone(), RetryConfig::immediate(1));
        let sequential = AuditScheduler::new(agent, RetryConfig::immediate(1)).sequential();

        let inputs = (vec![ruleset_id], vec![artifact_id]);
        let a = parallel.audit(&inputs.0, &inputs.1, offline_config()).await;
        let b = sequential.audit(&inputs.0, &inputs.1, offline_config()).await;

        assert_eq!(a.total_findings, b.total_findings);
        assert_eq!(a.total_passed, b.total_passed);
        assert_eq!(a.total_failed, b.total_failed);
        assert_eq!(a.total_review, b.total_review);
        assert!(a.relations.iter().all(|r| r.is_complete()));
    }

    #[tokio::test]
    async fn test_result_aggregation() {
        let dir = tempfile::tempdir().unwrap();
        let (agent, ruleset_id, artifact_id) = fixture(&dir);
        let scheduler = AuditScheduler::new(agent, RetryConfig::immediate(0));

        let result = scheduler
            .audit(&[ruleset_id], &[artifact_id], offline_config())
            .await;
        assert_eq!(result.relations.len(), 1);
        assert_eq!(result.total_findings, 2);
        // Both check points are covered by the fixture content
        assert_eq!(result.total_passed, 2);
        assert!(result.is_compliant());
        assert!(!result.needs_review());
    }

    #[tokio::test]
    async fn test_missing_artifact_falls_back_to_skip() {
        let dir = tempfile::tempdir().unwrap();
        let (agent, ruleset_id, _) = fixture(&dir);
        let scheduler = AuditScheduler::new(agent, RetryConfig::immediate(0));

        let result = scheduler
            .audit(
                &[ruleset_id],
                &["no-such-artifact".to_string()],
                offline_config(),
            )
            .await;

        // "not found" classifies to the skip fallback, which completes the
        // relation with NOT_APPLICABLE findings
        assert_eq!(result.failed_relations, 0);
        let relation = &result.relations[0];
        assert_eq!(relation.status, AuditStatus::Completed);
        assert_eq!(result.total_findings, 2);
        assert_eq!(result.total_passed, 0);
        assert!(result.is_compliant());
    }
}
