//! Findings produced by relation evaluation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of evaluating one rule against one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Pass,
    Fail,
    Review,
    NotApplicable,
}

impl FindingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingStatus::Pass => "PASS",
            FindingStatus::Fail => "FAIL",
            FindingStatus::Review => "REVIEW",
            FindingStatus::NotApplicable => "NOT_APPLICABLE",
        }
    }
}

/// One rule judgment with its supporting evidence references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub rule_id: String,
    pub status: FindingStatus,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub reasoning: String,
    pub recommendation: Option<String>,
    /// Evidence IDs supporting this judgment.
    pub evidence_refs: Vec<String>,
    pub requires_review: bool,
}

impl Finding {
    /// Build a finding; review is required for FAIL, explicit REVIEW, or
    /// confidence below the configured threshold.
    pub fn new(
        rule_id: &str,
        status: FindingStatus,
        confidence: f64,
        reasoning: impl Into<String>,
        confidence_threshold: f64,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let requires_review = matches!(status, FindingStatus::Fail | FindingStatus::Review)
            || (status != FindingStatus::NotApplicable && confidence < confidence_threshold);
        let hex = Uuid::new_v4().simple().to_string();
        Finding {
            id: format!("find-{}", &hex[..8]),
            rule_id: rule_id.to_string(),
            status,
            confidence,
            reasoning: reasoning.into(),
            recommendation: None,
            evidence_refs: Vec::new(),
            requires_review,
        }
    }

    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn with_evidence_refs(mut self, refs: Vec<String>) -> Self {
        self.evidence_refs = refs;
        self
    }
}

/// Aggregate view over the findings of one relation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingSummary {
    pub relation_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub review: usize,
    pub not_applicable: usize,
    pub pending_review: usize,
    pub avg_confidence: f64,
}

impl FindingSummary {
    pub fn from_findings(relation_id: &str, findings: &[Finding]) -> Self {
        let mut summary = FindingSummary {
            relation_id: relation_id.to_string(),
            total: findings.len(),
            ..Default::default()
        };
        if findings.is_empty() {
            return summary;
        }

        let mut confidence_sum = 0.0;
        for finding in findings {
            confidence_sum += finding.confidence;
            match finding.status {
                FindingStatus::Pass => summary.passed += 1,
                FindingStatus::Fail => summary.failed += 1,
                FindingStatus::Review => summary.review += 1,
                FindingStatus::NotApplicable => summary.not_applicable += 1,
            }
            if finding.requires_review {
                summary.pending_review += 1;
            }
        }
        summary.avg_confidence = confidence_sum / findings.len() as f64;
        summary
    }

    /// (pass) / (total - not_applicable); 1.0 when nothing is applicable.
    pub fn compliance_rate(&self) -> f64 {
        let applicable = self.total - self.not_applicable;
        if applicable == 0 {
            return 1.0;
        }
        self.passed as f64 / applicable as f64
    }

    pub fn is_compliant(&self) -> bool {
        self.failed == 0 && self.review == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_review_triggers() {
        let fail = Finding::new("r-1", FindingStatus::Fail, 0.9, "violation", 0.7);
        assert!(fail.requires_review);

        let review = Finding::new("r-1", FindingStatus::Review, 0.9, "unsure", 0.7);
        assert!(review.requires_review);

        let low_confidence = Finding::new("r-1", FindingStatus::Pass, 0.5, "weak", 0.7);
        assert!(low_confidence.requires_review);

        let confident_pass = Finding::new("r-1", FindingStatus::Pass, 0.9, "clear", 0.7);
        assert!(!confident_pass.requires_review);

        let not_applicable = Finding::new("r-1", FindingStatus::NotApplicable, 0.0, "skip", 0.7);
        assert!(!not_applicable.requires_review);
    }

    #[test]
    fn test_confidence_clamped() {
        let finding = Finding::new("r-1", FindingStatus::Pass, 1.7, "overflow", 0.7);
        assert_eq!(finding.confidence, 1.0);
    }

    #[test]
    fn test_summary_counts_and_rate() {
        let findings = vec![
            Finding::new("r-1", FindingStatus::Pass, 0.9, "ok", 0.7),
            Finding::new("r-2", FindingStatus::Fail, 0.85, "bad", 0.7),
            Finding::new("r-3", FindingStatus::Review, 0.6, "unsure", 0.7),
            Finding::new("r-4", FindingStatus::NotApplicable, 0.0, "skip", 0.7),
        ];
        let summary = FindingSummary::from_findings("rel-1", &findings);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.review, 1);
        assert_eq!(summary.not_applicable, 1);
        assert_eq!(summary.pending_review, 2);
        // 1 pass out of 3 applicable
        assert!((summary.compliance_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert!(!summary.is_compliant());
    }

    #[test]
    fn test_empty_summary() {
        let summary = FindingSummary::from_findings("rel-1", &[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.compliance_rate(), 1.0);
        assert!(summary.is_compliant());
    }
}
