//! Page driver: navigation and element interaction with timeouts
//!
//! Wraps a [`PageBackend`] and gives every backend the same location rules:
//! poll until the element shows up or the budget runs out, refuse ambiguous
//! matches when strict selectors are enabled, and refuse to act on hidden or
//! disabled elements.

use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::backend::{text_matches, ElementState, NetworkStatus, PageBackend};
use crate::config::{SuiteConfig, TimeoutConfig};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Locator, RowScope};

/// How one locator resolved against the current DOM
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Resolution {
    Missing,
    Ambiguous(usize),
    Found(usize, ElementState),
}

/// Pick the element a locator designates among its matches.
///
/// Several matches are only an error when strict selectors are on and the
/// locator neither opts into `first` nor is row-scoped.
pub(crate) fn resolve(locator: &Locator, matches: Vec<ElementState>, strict: bool) -> Resolution {
    let count = matches.len();
    match matches.into_iter().next() {
        None => Resolution::Missing,
        Some(_) if count > 1 && strict && !locator.first && locator.within.is_none() => {
            Resolution::Ambiguous(count)
        }
        Some(state) => Resolution::Found(0, state),
    }
}

pub struct PageDriver {
    backend: Box<dyn PageBackend>,
    config: SuiteConfig,
    timeouts: TimeoutConfig,
    strict: bool,
    last_action: Instant,
}

impl PageDriver {
    pub fn new(backend: Box<dyn PageBackend>, config: &SuiteConfig) -> Self {
        Self {
            backend,
            config: config.clone(),
            timeouts: config.timeouts.clone(),
            strict: config.strict_selectors,
            last_action: Instant::now(),
        }
    }

    pub fn timeouts(&self) -> &TimeoutConfig {
        &self.timeouts
    }

    /// When the last navigation or click was issued
    pub fn last_action(&self) -> Instant {
        self.last_action
    }

    /// Load a URL, relative to the base URL unless absolute.
    pub async fn navigate(&mut self, url: &str) -> E2eResult<()> {
        let target = self.config.resolve_url(url)?;
        let budget = self.timeouts.navigation_timeout();
        self.last_action = Instant::now();

        match timeout(budget, self.backend.goto(&target)).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::Navigation {
                url: target,
                reason: format!("no response within {} ms", budget.as_millis()),
            }),
        }
    }

    /// Replace the value of the single element the locator designates.
    pub async fn fill(&mut self, locator: &Locator, value: &str) -> E2eResult<()> {
        let (index, _) = self.locate_actionable(locator).await?;
        debug!("fill {} = {:?}", locator, value);
        self.backend.fill(locator, index, value).await
    }

    pub async fn click(&mut self, locator: &Locator) -> E2eResult<()> {
        let (index, _) = self.locate_actionable(locator).await?;
        debug!("click {}", locator);
        self.last_action = Instant::now();
        self.backend.click(locator, index).await
    }

    /// Scope for the first `root_selector` element containing `text_filter`.
    ///
    /// Polls for the row within the operation budget.
    pub async fn locate_scoped(&mut self, root_selector: &str, text_filter: &str) -> E2eResult<RowScope> {
        let deadline = Instant::now() + self.timeouts.default_timeout();
        self.scoped_until(root_selector, text_filter, deadline).await
    }

    async fn scoped_until(
        &mut self,
        root_selector: &str,
        text_filter: &str,
        deadline: Instant,
    ) -> E2eResult<RowScope> {
        let rows = Locator::css(root_selector);
        let start = Instant::now();
        loop {
            let found = self
                .backend
                .query(&rows)
                .await?
                .iter()
                .any(|row| text_matches(&row.text, text_filter));
            if found {
                return Ok(RowScope {
                    root: root_selector.to_string(),
                    has_text: text_filter.to_string(),
                });
            }
            if !self.pause_until(deadline).await {
                return Err(E2eError::ElementNotFound {
                    selector: format!("{}:has-text({:?})", root_selector, text_filter),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
        }
    }

    /// One-shot read of every element the locator matches.
    pub async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementState>> {
        self.backend.query(locator).await
    }

    /// One-shot resolution of a locator under the driver's uniqueness rules.
    pub(crate) async fn resolve_once(&mut self, locator: &Locator) -> E2eResult<Resolution> {
        let matches = self.backend.query(locator).await?;
        Ok(resolve(locator, matches, self.strict))
    }

    async fn locate_actionable(&mut self, locator: &Locator) -> E2eResult<(usize, ElementState)> {
        let start = Instant::now();
        let deadline = start + self.timeouts.default_timeout();
        // A missing row is reported as the row, not as the control inside it.
        if let Some(scope) = &locator.within {
            self.scoped_until(&scope.root, &scope.has_text, deadline).await?;
        }

        loop {
            let last = match self.resolve_once(locator).await? {
                Resolution::Ambiguous(count) => {
                    return Err(E2eError::AmbiguousSelector {
                        selector: locator.to_string(),
                        count,
                    });
                }
                Resolution::Found(index, state) if state.visible && state.enabled => {
                    return Ok((index, state));
                }
                Resolution::Found(_, state) => Some(state),
                Resolution::Missing => None,
            };

            if !self.pause_until(deadline).await {
                let waited_ms = start.elapsed().as_millis() as u64;
                return Err(match last {
                    Some(state) => E2eError::ElementNotInteractable {
                        selector: locator.to_string(),
                        state: if !state.visible { "hidden" } else { "disabled" }.to_string(),
                    },
                    None => E2eError::ElementNotFound {
                        selector: locator.to_string(),
                        waited_ms,
                    },
                });
            }
        }
    }

    /// Sleep one poll interval, capped at the deadline. Returns false once the
    /// deadline has passed.
    pub(crate) async fn pause_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let step = self.timeouts.poll_interval().min(deadline - now);
        sleep(step).await;
        true
    }

    pub async fn network_status(&mut self) -> E2eResult<NetworkStatus> {
        self.backend.network_status().await
    }

    pub async fn current_url(&mut self) -> E2eResult<Option<String>> {
        self.backend.current_url().await
    }

    pub async fn body_text(&mut self) -> E2eResult<String> {
        self.backend.body_text().await
    }

    pub async fn screenshot(&mut self) -> E2eResult<Vec<u8>> {
        self.backend.screenshot().await
    }

    /// Close the tab. Bounded so a wedged browser cannot stall teardown.
    pub async fn close(&mut self) -> E2eResult<()> {
        match timeout(Duration::from_secs(10), self.backend.close()).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::Timeout {
                what: "page close".to_string(),
                waited_ms: 10_000,
            }),
        }
    }
}
