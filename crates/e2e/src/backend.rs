//! Browser backend seam
//!
//! A `PageBackend` is one live tab. It performs single-shot operations only;
//! waiting, polling, uniqueness rules and error classification live in
//! [`crate::driver::PageDriver`] so every backend behaves the same way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::time::Instant;

use crate::config::Viewport;
use crate::error::E2eResult;
use crate::spec::Locator;

/// Observed state of one matched element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementState {
    pub visible: bool,
    pub enabled: bool,
    /// Rendered text (`innerText`)
    pub text: String,
}

/// Network activity of the page
#[derive(Debug, Clone, Copy)]
pub struct NetworkStatus {
    /// Requests started but neither finished nor failed
    pub inflight: usize,
    /// Last time a request started or ended
    pub last_activity: Instant,
    /// `document.readyState == "complete"`
    pub document_ready: bool,
}

/// Last-known page state attached to a failure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: Option<String>,
    /// Text of visible flash/alert banners
    pub banners: Vec<String>,
    /// Leading part of the page's rendered text
    pub dom_excerpt: String,
    pub screenshot: Option<PathBuf>,
}

/// One browser tab
#[async_trait]
pub trait PageBackend: Send {
    /// Load a URL and return once the main response has completed.
    async fn goto(&mut self, url: &str) -> E2eResult<()>;

    /// All elements currently matching the locator, in document order.
    ///
    /// A row-scoped locator searches only inside the first matching row and
    /// yields nothing when no row matches.
    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementState>>;

    /// Replace the value of the `index`-th match.
    async fn fill(&mut self, locator: &Locator, index: usize, value: &str) -> E2eResult<()>;

    /// Click the `index`-th match.
    async fn click(&mut self, locator: &Locator, index: usize) -> E2eResult<()>;

    async fn network_status(&mut self) -> E2eResult<NetworkStatus>;

    async fn current_url(&mut self) -> E2eResult<Option<String>>;

    /// Rendered text of the page body.
    async fn body_text(&mut self) -> E2eResult<String>;

    /// PNG screenshot of the full page.
    async fn screenshot(&mut self) -> E2eResult<Vec<u8>>;

    /// Close the tab and release its browser context. Must be idempotent.
    async fn close(&mut self) -> E2eResult<()>;
}

/// Opens isolated tabs, one per scenario
#[async_trait]
pub trait PageFactory: Send + Sync {
    async fn open_page(&self, viewport: Viewport) -> E2eResult<Box<dyn PageBackend>>;
}

/// Case-insensitive, whitespace-normalised substring test used by `has-text`
/// filters and `text=` targets.
pub fn text_matches(haystack: &str, needle: &str) -> bool {
    normalize(haystack).contains(&normalize(needle))
}

fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
