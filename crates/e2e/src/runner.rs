//! Scenario runner: executes the steps of one scenario in order

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backend::PageSnapshot;
use crate::context::ExecutionContext;
use crate::error::{E2eError, E2eResult, ErrorKind};
use crate::spec::{Scenario, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Why a scenario failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub reason: String,
    /// Zero-based index of the failing step, if a step was running
    pub step_index: Option<usize>,
    pub step_name: Option<String>,
    pub elapsed_ms: u64,
    pub snapshot: PageSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail(Failure),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(failure) => Some(failure),
        }
    }
}

/// Runs one scenario against its context, stopping at the first failing step.
pub struct ScenarioRunner<'a> {
    scenario: &'a Scenario,
    steps: Vec<StepRecord>,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(scenario: &'a Scenario) -> Self {
        Self {
            scenario,
            steps: Vec::with_capacity(scenario.steps.len()),
        }
    }

    /// Records of the steps executed so far. After a cancelled run the step
    /// that was in progress is the one at `steps().len()`.
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<StepRecord> {
        self.steps
    }

    /// Index of the step that has not finished yet, if any.
    pub fn current_step(&self) -> Option<usize> {
        let next = self.steps.len();
        (next < self.scenario.steps.len()).then_some(next)
    }

    pub async fn run(&mut self, ctx: &mut ExecutionContext) -> Verdict {
        debug!("Running scenario: {}", self.scenario.name);
        self.steps.clear();

        for (index, step) in self.scenario.steps.iter().enumerate() {
            let started = Instant::now();
            let result = execute_step(ctx, step).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    debug!("  step {} {} ok ({} ms)", index + 1, step.name(), duration_ms);
                    self.steps.push(StepRecord {
                        index,
                        name: step.name(),
                        status: StepStatus::Passed,
                        duration_ms,
                        error: None,
                    });
                }
                Err(err) => {
                    ctx.note(format!("step {} {} failed: {}", index + 1, step.name(), err));
                    self.steps.push(StepRecord {
                        index,
                        name: step.name(),
                        status: StepStatus::Failed,
                        duration_ms,
                        error: Some(err.to_string()),
                    });
                    self.skip_rest(index + 1);
                    return Verdict::Fail(fail_at(ctx, self.scenario, Some(index), &err).await);
                }
            }
        }
        Verdict::Pass
    }

    /// Record the interrupted step as failed and the rest as skipped, after the
    /// run future was dropped mid-step.
    pub fn abort(&mut self, reason: &E2eError) -> Option<usize> {
        let current = self.current_step()?;
        self.steps.push(StepRecord {
            index: current,
            name: self.scenario.steps[current].name(),
            status: StepStatus::Failed,
            duration_ms: 0,
            error: Some(reason.to_string()),
        });
        self.skip_rest(current + 1);
        Some(current)
    }

    /// Mark every step from `from` on as skipped.
    pub fn skip_rest(&mut self, from: usize) {
        for (index, step) in self.scenario.steps.iter().enumerate().skip(from) {
            self.steps.push(StepRecord {
                index,
                name: step.name(),
                status: StepStatus::Skipped,
                duration_ms: 0,
                error: None,
            });
        }
    }
}

/// Build a failure for `err`, capturing the page as it is now.
pub(crate) async fn fail_at(
    ctx: &mut ExecutionContext,
    scenario: &Scenario,
    step_index: Option<usize>,
    err: &E2eError,
) -> Failure {
    let snapshot = ctx.snapshot(step_index.unwrap_or(0)).await;
    Failure {
        kind: err.kind(),
        reason: err.to_string(),
        step_index,
        step_name: step_index.and_then(|i| scenario.steps.get(i)).map(Step::name),
        elapsed_ms: ctx.elapsed().as_millis() as u64,
        snapshot,
    }
}

async fn execute_step(ctx: &mut ExecutionContext, step: &Step) -> E2eResult<()> {
    match step {
        Step::Navigate { url } => ctx.driver.navigate(url).await,
        Step::Fill { locator, value } => ctx.driver.fill(locator, value).await,
        Step::Click { locator } => ctx.driver.click(locator).await,
        Step::WaitForSettled { until, timeout_ms } => {
            let budget = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(ctx.default_timeout);
            ctx.waits.settle(&mut ctx.driver, until, budget).await
        }
        Step::AssertVisible { locator } => {
            ctx.assertions.assert_visible(&mut ctx.driver, locator).await
        }
        Step::AssertText { locator, pattern } => {
            ctx.assertions
                .assert_text_contains(&mut ctx.driver, locator, pattern)
                .await
        }
        Step::AssertTableRow {
            table,
            row_text,
            fields,
        } => {
            ctx.assertions
                .assert_table_row_contains(&mut ctx.driver, table, row_text, fields)
                .await
        }
        Step::Screenshot { name } => ctx.save_screenshot(name).await.map(|_| ()),
        Step::Log { message } => {
            info!("  {}", message);
            ctx.note(message.clone());
            Ok(())
        }
    }
}
