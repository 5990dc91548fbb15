//! External judgment service seam.
//!
//! The pipeline treats rule evaluation as an opaque, potentially slow,
//! potentially failing remote call behind the [`Evaluator`] trait. The HTTP
//! client lives in [`client`]; scripted doubles below let tests drive the
//! workers and scheduler without a network.

pub mod client;

pub use client::{JudgeClient, JudgeConfig};

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Verdict returned by the judgment service for one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
    Error,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Error => "ERROR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PASS" => Some(Verdict::Pass),
            "FAIL" => Some(Verdict::Fail),
            "ERROR" => Some(Verdict::Error),
            _ => None,
        }
    }
}

/// One judgment: verdict plus supporting reasoning and evidence lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub status: Verdict,
    pub reasoning: String,
    pub evidence: Vec<String>,
}

impl Evaluation {
    pub fn new(status: Verdict, reasoning: impl Into<String>) -> Self {
        Self {
            status,
            reasoning: reasoning.into(),
            evidence: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// Errors from the judgment service.
#[derive(Debug, Error)]
pub enum EvaluatorError {
    /// Failed to reach the service.
    #[error("connection error: {0}")]
    Connection(String),
    /// Service returned a non-success response.
    #[error("api error: {0}")]
    Api(String),
    /// Response did not match the expected verdict grammar.
    #[error("parse error: {0}")]
    Parse(String),
    /// Evaluation is disabled by configuration.
    #[error("evaluator is disabled")]
    Disabled,
}

/// The external judgment call: artifact context plus one requirement in,
/// verdict out.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        artifact_context: &str,
        requirement_text: &str,
    ) -> Result<Evaluation, EvaluatorError>;
}

/// Test double that replays a fixed sequence of outcomes.
pub struct ScriptedEvaluator {
    script: Mutex<VecDeque<Result<Evaluation, String>>>,
}

impl ScriptedEvaluator {
    pub fn new(outcomes: Vec<Evaluation>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().map(Ok).collect()),
        }
    }

    /// Mixed script: `Err` entries become `EvaluatorError::Api` failures.
    pub fn from_results(outcomes: Vec<Result<Evaluation, String>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        _artifact_context: &str,
        _requirement_text: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        let next = self
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front();
        match next {
            Some(Ok(evaluation)) => Ok(evaluation),
            Some(Err(message)) => Err(EvaluatorError::Api(message)),
            None => Err(EvaluatorError::Api("script exhausted".to_string())),
        }
    }
}

/// Test double that always fails with a fixed message.
pub struct FailingEvaluator {
    message: String,
}

impl FailingEvaluator {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Evaluator for FailingEvaluator {
    async fn evaluate(
        &self,
        _artifact_context: &str,
        _requirement_text: &str,
    ) -> Result<Evaluation, EvaluatorError> {
        Err(EvaluatorError::Api(self.message.clone()))
    }
}
