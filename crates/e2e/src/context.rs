//! Per-scenario execution context
//!
//! One context owns one tab for the lifetime of one scenario run. It is passed
//! explicitly to every step; nothing in the engine holds a page globally.

use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::assertions::{truncate, AssertionEngine};
use crate::backend::{PageBackend, PageSnapshot};
use crate::config::{SuiteConfig, Viewport};
use crate::driver::PageDriver;
use crate::error::E2eResult;
use crate::spec::{Locator, Scenario};
use crate::wait::WaitStrategy;

/// One line of the diagnostic log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Milliseconds since the scenario started
    pub at_ms: u64,
    pub message: String,
}

pub struct ExecutionContext {
    pub driver: PageDriver,
    pub waits: WaitStrategy,
    pub assertions: AssertionEngine,
    pub viewport: Viewport,
    pub default_timeout: Duration,
    pub navigation_timeout: Duration,
    scenario: String,
    banner_selectors: Vec<String>,
    capture_screenshots: bool,
    artifacts_dir: PathBuf,
    text_limit: usize,
    started: Instant,
    log: Vec<LogEntry>,
    closed: bool,
}

impl ExecutionContext {
    pub fn new(backend: Box<dyn PageBackend>, config: &SuiteConfig, scenario: &Scenario) -> Self {
        let timeouts = &config.timeouts;
        Self {
            driver: PageDriver::new(backend, config),
            waits: WaitStrategy::from(timeouts),
            assertions: AssertionEngine::new(
                timeouts.default_timeout(),
                timeouts.poll_interval(),
                config.diagnostic_text_limit,
            ),
            viewport: scenario.viewport.unwrap_or(config.viewport),
            default_timeout: timeouts.default_timeout(),
            navigation_timeout: timeouts.navigation_timeout(),
            scenario: scenario.name.clone(),
            banner_selectors: config.banner_selectors.clone(),
            capture_screenshots: config.capture_screenshots,
            artifacts_dir: config.output_dir.join("screenshots"),
            text_limit: config.diagnostic_text_limit,
            started: Instant::now(),
            log: Vec::new(),
            closed: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Append to the diagnostic log
    pub fn note(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("[{}] {}", self.scenario, message);
        self.log.push(LogEntry {
            at_ms: self.elapsed().as_millis() as u64,
            message,
        });
    }

    pub fn take_log(&mut self) -> Vec<LogEntry> {
        std::mem::take(&mut self.log)
    }

    /// Write a screenshot to `<output>/screenshots/<scenario>-<name>.png`.
    pub async fn save_screenshot(&mut self, name: &str) -> E2eResult<PathBuf> {
        let png = self.driver.screenshot().await?;
        std::fs::create_dir_all(&self.artifacts_dir)?;
        let path = self
            .artifacts_dir
            .join(format!("{}-{}.png", file_stem(&self.scenario), file_stem(name)));
        std::fs::write(&path, png)?;
        self.note(format!("screenshot saved to {}", path.display()));
        Ok(path)
    }

    /// Last-known page state for a failure report.
    ///
    /// Every part is best effort; a page that cannot answer leaves the field empty.
    pub async fn snapshot(&mut self, failed_step: usize) -> PageSnapshot {
        let mut snapshot = PageSnapshot {
            url: self.driver.current_url().await.ok().flatten(),
            ..Default::default()
        };

        for selector in self.banner_selectors.clone() {
            if let Ok(matches) = self.driver.query(&Locator::css(&selector)).await {
                snapshot.banners.extend(
                    matches
                        .into_iter()
                        .filter(|m| m.visible && !m.text.trim().is_empty())
                        .map(|m| truncate(&m.text, self.text_limit)),
                );
            }
        }

        if let Ok(text) = self.driver.body_text().await {
            snapshot.dom_excerpt = truncate(&text, self.text_limit);
        }

        if self.capture_screenshots {
            match self.save_screenshot(&format!("failure-step{}", failed_step + 1)).await {
                Ok(path) => snapshot.screenshot = Some(path),
                Err(e) => warn!("[{}] failure screenshot not captured: {}", self.scenario, e),
            }
        }
        snapshot
    }

    /// Release the tab. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.driver.close().await {
            warn!("[{}] closing page: {}", self.scenario, e);
        }
    }
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}
