//! Expected-vs-actual checks against the rendered page
//!
//! Assertions only read the page. Each one polls until it holds or its budget
//! runs out, then reports what it saw.

use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::backend::text_matches;
use crate::driver::{PageDriver, Resolution};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Locator, TextPattern};

#[derive(Debug, Clone, Copy)]
pub struct AssertionEngine {
    pub timeout: Duration,
    pub poll: Duration,
    /// Maximum characters of observed text quoted in a failure
    pub text_limit: usize,
}

impl AssertionEngine {
    pub fn new(timeout: Duration, poll: Duration, text_limit: usize) -> Self {
        Self {
            timeout,
            poll,
            text_limit,
        }
    }

    pub async fn assert_visible(&self, driver: &mut PageDriver, locator: &Locator) -> E2eResult<()> {
        let start = Instant::now();
        let mut seen = "no matching element".to_string();
        loop {
            match driver.resolve_once(locator).await? {
                Resolution::Found(_, state) if state.visible => return Ok(()),
                Resolution::Found(..) => seen = "element present but hidden".to_string(),
                Resolution::Ambiguous(count) => {
                    return Err(E2eError::AmbiguousSelector {
                        selector: locator.to_string(),
                        count,
                    })
                }
                Resolution::Missing => {}
            }
            if !self.pause(start).await {
                return Err(E2eError::AssertionFailure {
                    selector: locator.to_string(),
                    expected: "visible".to_string(),
                    actual: format!("{} after {} ms", seen, start.elapsed().as_millis()),
                });
            }
        }
    }

    pub async fn assert_text_contains(
        &self,
        driver: &mut PageDriver,
        locator: &Locator,
        pattern: &TextPattern,
    ) -> E2eResult<()> {
        let start = Instant::now();
        loop {
            let actual = match driver.resolve_once(locator).await? {
                Resolution::Found(_, state) => {
                    if pattern.matches(&state.text)? {
                        return Ok(());
                    }
                    Some(state.text)
                }
                Resolution::Ambiguous(count) => {
                    return Err(E2eError::AmbiguousSelector {
                        selector: locator.to_string(),
                        count,
                    })
                }
                Resolution::Missing => None,
            };
            if !self.pause(start).await {
                return Err(E2eError::AssertionFailure {
                    selector: locator.to_string(),
                    expected: format!("text matching {}", pattern),
                    actual: match actual {
                        Some(text) => format!("{:?}", truncate(&text, self.text_limit)),
                        None => "no matching element".to_string(),
                    },
                });
            }
        }
    }

    /// Find the row of `table` containing `row_text` and check it contains
    /// every field.
    pub async fn assert_table_row_contains(
        &self,
        driver: &mut PageDriver,
        table: &str,
        row_text: &str,
        fields: &[String],
    ) -> E2eResult<()> {
        let rows = Locator::css(format!("{} tr", table));
        let selector = format!("{} tr:has-text({:?})", table, row_text);
        let start = Instant::now();
        let mut last: Option<(String, Vec<&String>)> = None;
        loop {
            let row = driver
                .query(&rows)
                .await?
                .into_iter()
                .find(|row| text_matches(&row.text, row_text));
            if let Some(row) = row {
                let missing: Vec<&String> = fields
                    .iter()
                    .filter(|field| !text_matches(&row.text, field))
                    .collect();
                if missing.is_empty() {
                    return Ok(());
                }
                last = Some((row.text, missing));
            }
            if !self.pause(start).await {
                return Err(match last {
                    Some((text, missing)) => E2eError::AssertionFailure {
                        selector,
                        expected: format!(
                            "fields {}",
                            missing
                                .iter()
                                .map(|f| format!("{:?}", f))
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                        actual: format!("row {:?}", truncate(&text, self.text_limit)),
                    },
                    None => E2eError::AssertionFailure {
                        selector,
                        expected: format!("a row containing {:?}", row_text),
                        actual: format!("no such row after {} ms", start.elapsed().as_millis()),
                    },
                });
            }
        }
    }

    async fn pause(&self, start: Instant) -> bool {
        let deadline = start + self.timeout;
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        sleep(self.poll.min(deadline - now)).await;
        true
    }
}

/// Cut `text` to at most `limit` characters, marking the cut with `...`.
pub fn truncate(text: &str, limit: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(limit) {
        Some((end, _)) => format!("{}...", &collapsed[..end]),
        None => collapsed,
    }
}
