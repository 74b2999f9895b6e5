//! Ordered step list and the driver that runs it

use std::fmt::Write as _;
use std::time::Instant;

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};

use crate::deploy::step::{Step, StepContext, StepOutcome};
use crate::errors::DeployError;
use crate::utils::generate_uuid;

/// How a recorded step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Satisfied,
    Applied,
    Failed,
}

impl From<StepOutcome> for StepStatus {
    fn from(outcome: StepOutcome) -> Self {
        match outcome {
            StepOutcome::Satisfied => StepStatus::Satisfied,
            StepOutcome::Applied => StepStatus::Applied,
        }
    }
}

/// One executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Aggregated record of a pipeline run, kept on success and failure alike
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLog {
    pub pipeline: String,
    pub run_id: String,
    pub records: Vec<StepRecord>,
}

impl StepLog {
    pub fn new(pipeline: &str) -> Self {
        Self {
            pipeline: pipeline.to_string(),
            run_id: generate_uuid(),
            records: Vec::new(),
        }
    }

    fn push(&mut self, step: &str, status: StepStatus, started_at: DateTime<Utc>, started: Instant) {
        self.records.push(StepRecord {
            step: step.to_string(),
            status,
            started_at,
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
    }

    /// Status of a step by name, if it ran
    pub fn status_of(&self, step: &str) -> Option<&StepStatus> {
        self.records
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.status)
    }

    /// Names of the steps that made a change
    pub fn applied(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.status == StepStatus::Applied)
            .map(|r| r.step.as_str())
            .collect()
    }

    /// The step the run stopped at, if it failed
    pub fn failed_step(&self) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.status == StepStatus::Failed)
            .map(|r| r.step.as_str())
    }

    /// Human-readable summary table
    pub fn render(&self) -> String {
        let short_id = self.run_id.get(..8).unwrap_or(&self.run_id);
        let mut out = format!("{} (run {})\n", self.pipeline.bold(), short_id);
        let width = self.records.iter().map(|r| r.step.len()).max().unwrap_or(0);
        for record in &self.records {
            let status = match record.status {
                StepStatus::Satisfied => "ok".green(),
                StepStatus::Applied => "changed".yellow(),
                StepStatus::Failed => "FAILED".red().bold(),
            };
            let _ = writeln!(
                out,
                "  {:<width$}  {:<8} {:>7}ms",
                record.step,
                status,
                record.elapsed_ms,
                width = width
            );
        }
        out
    }
}

/// A named, ordered list of steps.
///
/// The driver runs steps strictly in order and stops at the first failure.
/// Because every step is idempotent, re-running the whole pipeline resumes
/// from wherever the previous run stopped.
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn Step>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order
    pub async fn run(&self, ctx: &StepContext<'_>) -> Result<StepLog, DeployError> {
        let mut log = StepLog::new(&self.name);
        let span = info_span!("pipeline", name = %self.name, run_id = %log.run_id);

        async move {
            info!("Starting pipeline with {} steps", self.steps.len());

            for step in &self.steps {
                let started_at = Utc::now();
                let started = Instant::now();
                let result = step
                    .reconcile(ctx)
                    .instrument(info_span!("step", name = step.name()))
                    .await;

                match result {
                    Ok(outcome) => {
                        info!(
                            step = step.name(),
                            outcome = ?outcome,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "Step finished"
                        );
                        log.push(step.name(), outcome.into(), started_at, started);
                    }
                    Err(e) => {
                        error!(step = step.name(), "Step failed: {}", e);
                        log.push(step.name(), StepStatus::Failed, started_at, started);
                        return Err(DeployError::StepFailed {
                            step: step.name().to_string(),
                            log,
                            source: Box::new(e),
                        });
                    }
                }
            }

            info!("Pipeline finished, {} step(s) changed", log.applied().len());
            Ok(log)
        }
        .instrument(span)
        .await
    }
}
