//! Test suite: scenario registration, per-scenario setup/teardown and reporting

use futures::future::FutureExt;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info};

use crate::backend::{PageFactory, PageSnapshot};
use crate::config::SuiteConfig;
use crate::context::{ExecutionContext, LogEntry};
use crate::error::{E2eError, E2eResult, ErrorKind};
use crate::runner::{fail_at, Failure, ScenarioRunner, StepRecord, Verdict};
use crate::spec::Scenario;

/// Result of one scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub name: String,
    pub verdict: Verdict,
    pub duration_ms: u64,
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl ScenarioResult {
    pub fn passed(&self) -> bool {
        self.verdict.is_pass()
    }
}

/// Result of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub scenarios: Vec<ScenarioResult>,
}

impl Report {
    pub fn from_results(scenarios: Vec<ScenarioResult>, duration: Duration) -> Self {
        let passed = scenarios.iter().filter(|s| s.passed()).count();
        Self {
            total: scenarios.len(),
            passed,
            failed: scenarios.len() - passed,
            duration_ms: duration.as_millis() as u64,
            scenarios,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Failure)> {
        self.scenarios
            .iter()
            .filter_map(|s| s.verdict.failure().map(|f| (s.name.as_str(), f)))
    }

    /// Write `test-results.json` into `dir`
    pub fn write_json(&self, dir: &std::path::Path) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("test-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

pub struct TestSuite {
    config: SuiteConfig,
    factory: Arc<dyn PageFactory>,
    scenarios: Vec<Arc<Scenario>>,
}

impl TestSuite {
    pub fn new(config: SuiteConfig, factory: Arc<dyn PageFactory>) -> Self {
        Self {
            config,
            factory,
            scenarios: Vec::new(),
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Add a scenario. Rejects invalid scenarios and duplicate names.
    pub fn register(&mut self, scenario: Scenario) -> E2eResult<()> {
        scenario.validate()?;
        if self.scenarios.iter().any(|s| s.name == scenario.name) {
            return Err(E2eError::SpecParse(format!(
                "duplicate scenario name: {}",
                scenario.name
            )));
        }
        debug!("Registered scenario {} ({} steps)", scenario.name, scenario.steps.len());
        self.scenarios.push(Arc::new(scenario));
        Ok(())
    }

    pub fn register_all(&mut self, scenarios: impl IntoIterator<Item = Scenario>) -> E2eResult<()> {
        scenarios.into_iter().try_for_each(|s| self.register(s))
    }

    pub fn scenarios(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }

    /// Keep only scenarios carrying `tag`
    pub fn retain_tagged(&mut self, tag: &str) {
        self.scenarios.retain(|s| s.has_tag(tag));
    }

    /// Keep only scenarios whose name contains `pattern`
    pub fn retain_named(&mut self, pattern: &str) {
        self.scenarios.retain(|s| s.name.contains(pattern));
    }

    /// Run every registered scenario and aggregate the report.
    ///
    /// Results are in registration order whatever the parallelism.
    pub async fn run(&self) -> Report {
        let start = Instant::now();
        let parallelism = self.config.parallelism.max(1);
        info!(
            "Running {} scenario(s) against {} (parallelism {})...",
            self.scenarios.len(),
            self.config.base_url,
            parallelism
        );

        let results = if parallelism == 1 {
            let mut results = Vec::with_capacity(self.scenarios.len());
            for scenario in &self.scenarios {
                results.push(self.run_one(scenario).await);
            }
            results
        } else {
            let mut indexed: Vec<(usize, ScenarioResult)> =
                stream::iter(self.scenarios.iter().enumerate())
                    .map(|(i, scenario)| async move { (i, self.run_one(scenario).await) })
                    .buffer_unordered(parallelism)
                    .collect()
                    .await;
            indexed.sort_by_key(|(i, _)| *i);
            indexed.into_iter().map(|(_, r)| r).collect()
        };

        let report = Report::from_results(results, start.elapsed());
        info!("");
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            report.passed, report.failed, report.duration_ms
        );
        report
    }

    /// Run one scenario in a fresh context and always release the context.
    pub async fn run_one(&self, scenario: &Scenario) -> ScenarioResult {
        let start = Instant::now();
        let viewport = scenario.viewport.unwrap_or(self.config.viewport);

        let backend = match self.factory.open_page(viewport).await {
            Ok(backend) => backend,
            Err(e) => {
                error!("✗ {} - {}", scenario.name, e);
                return ScenarioResult {
                    name: scenario.name.clone(),
                    verdict: Verdict::Fail(Failure {
                        kind: ErrorKind::Infrastructure,
                        reason: e.to_string(),
                        step_index: None,
                        step_name: None,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                        snapshot: PageSnapshot::default(),
                    }),
                    duration_ms: start.elapsed().as_millis() as u64,
                    steps: Vec::new(),
                    log: Vec::new(),
                };
            }
        };

        let mut ctx = ExecutionContext::new(backend, &self.config, scenario);
        let mut runner = ScenarioRunner::new(scenario);
        let budget = scenario
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.config.timeouts.scenario_timeout());

        let outcome = timeout(budget, AssertUnwindSafe(runner.run(&mut ctx)).catch_unwind()).await;
        let verdict = match outcome {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(panic)) => {
                let err = E2eError::Browser(format!("scenario panicked: {}", panic_message(&*panic)));
                let step = runner.abort(&err);
                Verdict::Fail(self.cancelled(&mut ctx, scenario, step, &err).await)
            }
            Err(_) => {
                let err = E2eError::Timeout {
                    what: format!("scenario {}", scenario.name),
                    waited_ms: budget.as_millis() as u64,
                };
                let step = runner.abort(&err);
                Verdict::Fail(self.cancelled(&mut ctx, scenario, step, &err).await)
            }
        };

        ctx.close().await;

        let duration_ms = start.elapsed().as_millis() as u64;
        match verdict.failure() {
            None => info!("✓ {} ({} ms)", scenario.name, duration_ms),
            Some(failure) => error!("✗ {} - {}", scenario.name, failure.reason),
        }

        ScenarioResult {
            name: scenario.name.clone(),
            verdict,
            duration_ms,
            steps: runner.into_steps(),
            log: ctx.take_log(),
        }
    }

    /// Failure for a run that was cut short. The page may be wedged, so the
    /// snapshot gets its own bounded budget.
    async fn cancelled(
        &self,
        ctx: &mut ExecutionContext,
        scenario: &Scenario,
        step: Option<usize>,
        err: &E2eError,
    ) -> Failure {
        let elapsed_ms = ctx.elapsed().as_millis() as u64;
        let budget = self.config.timeouts.navigation_timeout();
        match timeout(budget, fail_at(ctx, scenario, step, err)).await {
            Ok(failure) => failure,
            Err(_) => Failure {
                kind: err.kind(),
                reason: err.to_string(),
                step_index: step,
                step_name: step.and_then(|i| scenario.steps.get(i)).map(|s| s.name()),
                elapsed_ms,
                snapshot: PageSnapshot::default(),
            },
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
