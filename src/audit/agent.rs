//! Per-relation evaluation: resolve inputs, collect evidence, judge rules.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::evaluator::{Evaluator, Verdict};

use super::catalog::{Artifact, ArtifactCatalog, Rule, RuleSet, RuleSetCatalog};
use super::evidence::{extract_evidence, fingerprint, Evidence, EvidenceCache, ExtractOptions};
use super::finding::{Finding, FindingStatus};
use super::relation::AuditRelation;

/// How a relation is evaluated. Fallback modes trade accuracy for cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Structured extraction, full rule scope, judgment service when enabled.
    Full,
    /// Structural extraction disabled; deterministic heuristic scoring only.
    TextOnly,
    /// Critical/high-severity rules only.
    CriticalOnly,
    /// Emit NOT_APPLICABLE findings without evaluation.
    NotApplicable,
}

impl EvaluationMode {
    fn structured(&self) -> bool {
        matches!(self, EvaluationMode::Full | EvaluationMode::CriticalOnly)
    }

    fn critical_only(&self) -> bool {
        matches!(self, EvaluationMode::CriticalOnly)
    }

    /// The text-only fallback also bypasses the judgment service; retry
    /// exhaustion usually means the service itself is the problem.
    fn uses_judge(&self) -> bool {
        matches!(self, EvaluationMode::Full | EvaluationMode::CriticalOnly)
    }
}

/// Errors from one relation evaluation. The message text feeds fallback
/// classification, so wording matters.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("rule set '{0}' not found")]
    RuleSetNotFound(String),
    #[error("artifact '{0}' not found")]
    ArtifactNotFound(String),
    #[error("failed to read artifact '{path}': {message}")]
    Read { path: PathBuf, message: String },
    #[error("evaluator failed: {0}")]
    Evaluator(String),
    #[error("evaluation timeout after {0}s")]
    Timeout(u64),
}

/// Evaluates one (rule set, artifact) relation end to end.
///
/// All lookups go through injected catalogs; there is no global registry.
#[derive(Clone)]
pub struct AuditAgent {
    rule_sets: Arc<dyn RuleSetCatalog>,
    artifacts: Arc<dyn ArtifactCatalog>,
    evaluator: Option<Arc<dyn Evaluator>>,
    cache: Arc<dyn EvidenceCache>,
    max_search_hits: usize,
}

impl AuditAgent {
    pub fn new(
        rule_sets: Arc<dyn RuleSetCatalog>,
        artifacts: Arc<dyn ArtifactCatalog>,
        evaluator: Option<Arc<dyn Evaluator>>,
        cache: Arc<dyn EvidenceCache>,
    ) -> Self {
        Self {
            rule_sets,
            artifacts,
            evaluator,
            cache,
            max_search_hits: 50,
        }
    }

    pub fn with_max_search_hits(mut self, max_search_hits: usize) -> Self {
        self.max_search_hits = max_search_hits;
        self
    }

    /// Run one evaluation pass over a relation.
    ///
    /// The relation is returned completed on success; on error the caller
    /// owns marking its copy failed.
    pub async fn evaluate(
        &self,
        mut relation: AuditRelation,
        mode: EvaluationMode,
    ) -> Result<AuditRelation, AgentError> {
        relation.start();

        if mode == EvaluationMode::NotApplicable {
            self.skip_relation(&mut relation).await;
            return Ok(relation);
        }

        let rule_set = self
            .rule_sets
            .get(&relation.ruleset_id)
            .await
            .ok_or_else(|| AgentError::RuleSetNotFound(relation.ruleset_id.clone()))?;
        let artifact = self
            .artifacts
            .get(&relation.artifact_id)
            .await
            .ok_or_else(|| AgentError::ArtifactNotFound(relation.artifact_id.clone()))?;

        let evidence = self.collect_evidence(&rule_set, &artifact, mode).await?;
        relation.evidence_collected = evidence.clone();

        let threshold = relation.run_config.confidence_threshold;
        let rules = rule_set.rules_in_scope(mode.critical_only());
        if mode.critical_only() {
            debug!(
                "Reduced scope for {}: {}/{} rules",
                relation.id,
                rules.len(),
                rule_set.rules.len()
            );
        }

        let use_judge =
            mode.uses_judge() && relation.run_config.use_llm && self.evaluator.is_some();
        let mut findings = Vec::with_capacity(rules.len());
        for rule in rules {
            let finding = if use_judge {
                self.judge_rule(rule, &evidence, threshold).await?
            } else {
                heuristic_evaluate(rule, &evidence, threshold)
            };
            findings.push(finding);
        }
        relation.findings = findings;

        relation.complete();
        debug!(
            "Relation {} completed with {} findings",
            relation.id,
            relation.findings.len()
        );
        Ok(relation)
    }

    /// Skip fallback: one NOT_APPLICABLE finding per rule, no evaluation.
    /// A missing rule set yields an empty but still completed relation.
    async fn skip_relation(&self, relation: &mut AuditRelation) {
        if let Some(rule_set) = self.rule_sets.get(&relation.ruleset_id).await {
            let threshold = relation.run_config.confidence_threshold;
            relation.findings = rule_set
                .rules
                .iter()
                .map(|rule| {
                    Finding::new(
                        &rule.id,
                        FindingStatus::NotApplicable,
                        1.0,
                        "Skipped after fallback: rule marked not applicable",
                        threshold,
                    )
                })
                .collect();
        }
        relation.complete();
    }

    /// Read artifact bytes, consult the cache by fingerprint, extract on miss.
    async fn collect_evidence(
        &self,
        rule_set: &RuleSet,
        artifact: &Artifact,
        mode: EvaluationMode,
    ) -> Result<Vec<Evidence>, AgentError> {
        let bytes = tokio::fs::read(&artifact.path)
            .await
            .map_err(|e| AgentError::Read {
                path: artifact.path.clone(),
                message: e.to_string(),
            })?;
        let content_hash = fingerprint(&bytes);

        if let Some(cached) = self.cache.load(&artifact.id, &content_hash).await {
            debug!("Evidence cache hit for {}", artifact.id);
            return Ok(cached);
        }

        let text = String::from_utf8_lossy(&bytes);
        let queries: Vec<String> = rule_set
            .rules
            .iter()
            .flat_map(|rule| rule.check_points.iter().cloned())
            .collect();
        let options = ExtractOptions {
            structured: mode.structured(),
            max_hits: self.max_search_hits,
        };
        let evidence = extract_evidence(&artifact.name, &text, &queries, &options);

        self.cache.save(&artifact.id, &content_hash, &evidence).await;
        debug!(
            "Extracted {} evidence items from {}",
            evidence.len(),
            artifact.name
        );
        Ok(evidence)
    }

    /// Ask the judgment service about one rule.
    async fn judge_rule(
        &self,
        rule: &Rule,
        evidence: &[Evidence],
        threshold: f64,
    ) -> Result<Finding, AgentError> {
        let evaluator = self
            .evaluator
            .as_ref()
            .ok_or_else(|| AgentError::Evaluator("no evaluator configured".to_string()))?;

        let context = build_judge_context(evidence);
        let requirement = build_requirement_text(rule);
        let evaluation = evaluator
            .evaluate(&context, &requirement)
            .await
            .map_err(|e| AgentError::Evaluator(e.to_string()))?;

        let refs: Vec<String> = evidence.iter().map(|e| e.id.clone()).collect();
        let finding = match evaluation.status {
            Verdict::Pass => Finding::new(
                &rule.id,
                FindingStatus::Pass,
                0.9,
                evaluation.reasoning,
                threshold,
            ),
            Verdict::Fail => Finding::new(
                &rule.id,
                FindingStatus::Fail,
                0.85,
                evaluation.reasoning,
                threshold,
            )
            .with_recommendation(format!("Review and address: {}", rule.title)),
            Verdict::Error => {
                warn!("Judge returned ERROR for rule {}", rule.id);
                Finding::new(
                    &rule.id,
                    FindingStatus::Review,
                    0.5,
                    evaluation.reasoning,
                    threshold,
                )
            }
        };
        Ok(finding.with_evidence_refs(refs))
    }
}

fn build_judge_context(evidence: &[Evidence]) -> String {
    if evidence.is_empty() {
        return "(no evidence extracted)".to_string();
    }
    evidence
        .iter()
        .map(|e| format!("{}: {}", e.citation(), e.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_requirement_text(rule: &Rule) -> String {
    let mut text = format!("{}: {}", rule.id, rule.title);
    if !rule.description.is_empty() {
        text.push('\n');
        text.push_str(&rule.description);
    }
    if !rule.check_points.is_empty() {
        text.push_str("\nCheck points:");
        for point in &rule.check_points {
            text.push_str("\n- ");
            text.push_str(point);
        }
    }
    text
}

/// Deterministic check-point coverage scoring, used when the judgment
/// service is unavailable or bypassed by a fallback.
fn heuristic_evaluate(rule: &Rule, evidence: &[Evidence], threshold: f64) -> Finding {
    let refs: Vec<String> = evidence.iter().map(|e| e.id.clone()).collect();

    if evidence.is_empty() {
        return Finding::new(
            &rule.id,
            FindingStatus::Review,
            0.5,
            "Insufficient evidence to evaluate this rule",
            threshold,
        );
    }

    if rule.check_points.is_empty() {
        return Finding::new(
            &rule.id,
            FindingStatus::Review,
            0.6,
            "Rule has no check points; requires human judgment",
            threshold,
        )
        .with_evidence_refs(refs);
    }

    let mut covered = 0usize;
    for check_point in &rule.check_points {
        let lowered = check_point.to_lowercase();
        let hit = evidence.iter().any(|ev| {
            let content = ev.content.to_lowercase();
            lowered
                .split_whitespace()
                .filter(|w| w.len() > 2)
                .any(|word| content.contains(word))
        });
        if hit {
            covered += 1;
        }
    }

    let coverage = covered as f64 / rule.check_points.len() as f64;
    let reasoning = format!(
        "Evidence covers {}/{} check points",
        covered,
        rule.check_points.len()
    );

    if coverage >= 0.8 {
        Finding::new(
            &rule.id,
            FindingStatus::Pass,
            0.8 + coverage * 0.15,
            reasoning,
            threshold,
        )
        .with_evidence_refs(refs)
    } else if coverage >= 0.5 {
        Finding::new(
            &rule.id,
            FindingStatus::Review,
            0.6 + coverage * 0.1,
            format!("Partial coverage: {}", reasoning),
            threshold,
        )
        .with_evidence_refs(refs)
    } else {
        Finding::new(
            &rule.id,
            FindingStatus::Review,
            0.6,
            "Evidence found but requires human review for final judgment",
            threshold,
        )
        .with_evidence_refs(refs)
    }
}
