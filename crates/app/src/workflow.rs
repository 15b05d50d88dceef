//! Minimal compensating workflow (saga) helper.
//!
//! Steps run in order; when one fails, the compensations of every previously
//! completed step run in reverse order. The caller gets the original failure
//! plus any compensation failures in one error value, so a half-undone state
//! is never silent.

use corpus_agent_ports::BoxFuture;
use corpus_agent_shared::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;
use std::future::Future;

type StepFn = Box<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// One workflow step with an optional compensation.
pub struct WorkflowStep {
    name: String,
    execute: StepFn,
    compensate: Option<StepFn>,
}

impl WorkflowStep {
    /// Build a step from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            execute: Box::new(move || Box::pin(execute())),
            compensate: None,
        }
    }

    /// Attach the compensation run when a later step fails.
    #[must_use]
    pub fn with_compensation<F, Fut>(mut self, compensate: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.compensate = Some(Box::new(move || Box::pin(compensate())));
        self
    }

    /// Step name used in error reporting.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("has_compensation", &self.compensate.is_some())
            .finish()
    }
}

/// Execution failure plus the outcome of rolling back.
#[derive(Debug)]
pub struct CompensationError {
    /// Name of the step whose execution failed.
    pub failed_step: String,
    /// The original execution error.
    pub cause: ErrorEnvelope,
    /// Compensations that themselves failed, in the order they ran.
    pub compensation_failures: Vec<(String, ErrorEnvelope)>,
}

impl CompensationError {
    /// Collapse into a single envelope.
    ///
    /// A clean rollback passes the original error through; a dirty one gets
    /// the dedicated compensation code with every failure enumerated.
    #[must_use]
    pub fn into_envelope(self) -> ErrorEnvelope {
        if self.compensation_failures.is_empty() {
            return self.cause;
        }
        let mut envelope = ErrorEnvelope::unexpected(
            ErrorCode::new("app", "compensation_failed"),
            format!(
                "step {} failed and {} compensation(s) also failed: {}",
                self.failed_step,
                self.compensation_failures.len(),
                self.cause.message
            ),
            self.cause.class,
        );
        envelope = envelope.with_metadata("failed_step", self.failed_step);
        for (name, error) in &self.compensation_failures {
            envelope = envelope.with_metadata(format!("compensate_{name}"), error.to_string());
        }
        envelope
    }
}

impl fmt::Display for CompensationError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "step {} failed: {} ({} compensation failures)",
            self.failed_step,
            self.cause,
            self.compensation_failures.len()
        )
    }
}

impl std::error::Error for CompensationError {}

/// An ordered list of compensatable steps.
#[derive(Debug, Default)]
pub struct Workflow {
    steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Empty workflow.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Run all steps; on failure, compensate completed steps in reverse.
    pub async fn run(&self) -> Result<(), CompensationError> {
        for (index, step) in self.steps.iter().enumerate() {
            let Err(cause) = (step.execute)().await else {
                continue;
            };
            let mut compensation_failures = Vec::new();
            for done in self.steps[..index].iter().rev() {
                if let Some(compensate) = &done.compensate {
                    if let Err(error) = compensate().await {
                        compensation_failures.push((done.name.clone(), error));
                    }
                }
            }
            return Err(CompensationError {
                failed_step: step.name.clone(),
                cause,
                compensation_failures,
            });
        }
        Ok(())
    }
}
