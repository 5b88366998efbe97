//! Settle detection
//!
//! Every wait polls the driver at the configured interval and gives up with
//! [`E2eError::Timeout`] once its budget is spent.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::config::TimeoutConfig;
use crate::driver::{PageDriver, Resolution};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Locator, SettleStrategy};

#[derive(Debug, Clone, Copy)]
pub struct WaitStrategy {
    /// Network must stay quiet this long to count as idle
    pub quiet: Duration,
    pub poll: Duration,
}

impl Default for WaitStrategy {
    fn default() -> Self {
        Self {
            quiet: Duration::from_millis(500),
            poll: Duration::from_millis(100),
        }
    }
}

impl From<&TimeoutConfig> for WaitStrategy {
    fn from(timeouts: &TimeoutConfig) -> Self {
        Self {
            quiet: timeouts.idle_quiet(),
            poll: timeouts.poll_interval(),
        }
    }
}

impl WaitStrategy {
    /// Wait until the document is loaded and no request has been in flight for
    /// the quiet window.
    ///
    /// The window is measured from the later of the last network event and the
    /// driver's last navigation or click, so a click whose request has not been
    /// issued yet does not read as idle.
    pub async fn wait_for_idle(&self, driver: &mut PageDriver, budget: Duration) -> E2eResult<()> {
        let start = Instant::now();
        loop {
            let status = driver.network_status().await?;
            let quiet_since = status.last_activity.max(driver.last_action());
            let now = Instant::now();
            if status.inflight == 0 && status.document_ready && now >= quiet_since + self.quiet {
                debug!("network idle after {} ms", start.elapsed().as_millis());
                return Ok(());
            }
            if !self.pause(start, budget).await {
                return Err(E2eError::Timeout {
                    what: format!(
                        "network idle ({} request(s) in flight, document {})",
                        status.inflight,
                        if status.document_ready { "loaded" } else { "loading" }
                    ),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
        }
    }

    /// Wait until the locator designates a visible element.
    pub async fn wait_for_visible(
        &self,
        driver: &mut PageDriver,
        locator: &Locator,
        budget: Duration,
    ) -> E2eResult<()> {
        let start = Instant::now();
        loop {
            match driver.resolve_once(locator).await? {
                Resolution::Found(_, state) if state.visible => return Ok(()),
                Resolution::Ambiguous(count) => {
                    return Err(E2eError::AmbiguousSelector {
                        selector: locator.to_string(),
                        count,
                    })
                }
                _ => {}
            }
            if !self.pause(start, budget).await {
                return Err(E2eError::Timeout {
                    what: format!("{} to become visible", locator),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
        }
    }

    /// Wait for `document.readyState == "complete"`.
    pub async fn wait_for_load(&self, driver: &mut PageDriver, budget: Duration) -> E2eResult<()> {
        let start = Instant::now();
        loop {
            if driver.network_status().await?.document_ready {
                return Ok(());
            }
            if !self.pause(start, budget).await {
                return Err(E2eError::Timeout {
                    what: "document load".to_string(),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
        }
    }

    pub async fn settle(
        &self,
        driver: &mut PageDriver,
        strategy: &SettleStrategy,
        budget: Duration,
    ) -> E2eResult<()> {
        match strategy {
            SettleStrategy::NetworkIdle => self.wait_for_idle(driver, budget).await,
            SettleStrategy::Load => self.wait_for_load(driver, budget).await,
            SettleStrategy::Visible(locator) => self.wait_for_visible(driver, locator, budget).await,
        }
    }

    async fn pause(&self, start: Instant, budget: Duration) -> bool {
        let deadline = start + budget;
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(self.poll.min(deadline - now)).await;
        true
    }
}
