//! Chromium backend over the Chrome DevTools Protocol
//!
//! One Chromium process is shared by the suite. Every scenario gets its own
//! browser context (separate cookies, storage and cache) holding a single tab,
//! so scenarios cannot observe each other's session state.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::{ElementState, NetworkStatus, PageBackend, PageFactory};
use crate::config::{SuiteConfig, Viewport};
use crate::error::{E2eError, E2eResult};
use crate::spec::{Locator, Target};

/// Returns the elements matched by a locator spec, in document order.
const RESOLVE_JS: &str = r#"(spec) => {
  const norm = (s) => (s || '').replace(/\s+/g, ' ').trim().toLowerCase();
  const textOf = (el) => (el.innerText !== undefined ? el.innerText : el.textContent);
  let scope = document;
  if (spec.root) {
    const wanted = norm(spec.hasText);
    scope = Array.from(document.querySelectorAll(spec.root))
      .find((row) => norm(textOf(row)).includes(wanted));
    if (!scope) return [];
  }
  if (spec.css) {
    let found = Array.from(scope.querySelectorAll(spec.css));
    if (spec.filter) {
      const wanted = norm(spec.filter);
      found = found.filter((el) => norm(textOf(el)).includes(wanted));
    }
    return found;
  }
  const wanted = norm(spec.text);
  const skip = new Set(['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE', 'HEAD', 'TITLE']);
  const hits = Array.from(scope.querySelectorAll('*'))
    .filter((el) => !skip.has(el.tagName) && norm(el.textContent).includes(wanted));
  return hits.filter((el) =>
    !Array.from(el.children).some((child) => norm(child.textContent).includes(wanted)));
}"#;

const QUERY_JS: &str = r#"(() => {
  const resolve = __RESOLVE__;
  const visible = (el) => {
    const style = window.getComputedStyle(el);
    if (style.visibility === 'hidden' || style.display === 'none') return false;
    const rect = el.getBoundingClientRect();
    return rect.width > 0 && rect.height > 0;
  };
  return resolve(__SPEC__).map((el) => ({
    visible: visible(el),
    enabled: !el.disabled,
    text: ((el.innerText !== undefined ? el.innerText : el.textContent) || '').trim(),
  }));
})()"#;

const FILL_JS: &str = r#"(() => {
  const resolve = __RESOLVE__;
  const spec = __SPEC__;
  const el = resolve(spec)[spec.index];
  if (!el) return false;
  el.focus();
  const proto = el instanceof HTMLTextAreaElement
    ? HTMLTextAreaElement.prototype
    : el instanceof HTMLSelectElement
      ? HTMLSelectElement.prototype
      : HTMLInputElement.prototype;
  Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, spec.value);
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
})()"#;

const MARK_JS: &str = r#"(() => {
  const resolve = __RESOLVE__;
  const spec = __SPEC__;
  const el = resolve(spec)[spec.index];
  if (!el) return false;
  document.querySelectorAll('[data-shelfwalk-target]')
    .forEach((e) => e.removeAttribute('data-shelfwalk-target'));
  el.setAttribute('data-shelfwalk-target', spec.mark);
  el.scrollIntoView({ block: 'center', inline: 'center' });
  return true;
})()"#;

fn script(template: &str, spec: &serde_json::Value) -> String {
    template
        .replace("__RESOLVE__", RESOLVE_JS)
        .replace("__SPEC__", &spec.to_string())
}

fn locator_spec(locator: &Locator) -> serde_json::Value {
    let (css, filter, text) = match &locator.target {
        Target::Css(css) => (Some(css.as_str()), None, None),
        Target::CssWithText { css, text } => (Some(css.as_str()), Some(text.as_str()), None),
        Target::Text(text) => (None, None, Some(text.as_str())),
    };
    serde_json::json!({
        "css": css,
        "filter": filter,
        "text": text,
        "root": locator.within.as_ref().map(|s| s.root.as_str()),
        "hasText": locator.within.as_ref().map(|s| s.has_text.as_str()),
    })
}

/// Shared Chromium process
pub struct CdpBrowser {
    browser: Arc<Browser>,
    handler: JoinHandle<()>,
    _profile_dir: TempDir,
}

impl CdpBrowser {
    /// Launch Chromium with the suite's browser settings
    pub async fn launch(config: &SuiteConfig) -> E2eResult<Self> {
        let profile_dir = tempfile::tempdir()?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir.path())
            .window_size(config.viewport.width, config.viewport.height)
            .request_timeout(config.timeouts.navigation_timeout())
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-dev-shm-usage");
        if !config.browser.headless {
            builder = builder.with_head();
        }
        if config.browser.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &config.browser.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if config.ignore_https_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }
        for arg in &config.browser.extra_args {
            builder = builder.arg(arg.as_str());
        }
        let browser_config = builder.build().map_err(E2eError::Browser)?;

        info!("Launching Chromium (headless: {})", config.browser.headless);
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(E2eError::browser)?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            handler,
            _profile_dir: profile_dir,
        })
    }

    /// Close the browser process. Pages must be closed first.
    pub async fn shutdown(self) {
        let CdpBrowser {
            browser,
            handler,
            _profile_dir,
        } = self;
        match Arc::try_unwrap(browser) {
            Ok(mut browser) => {
                if let Err(e) = browser.close().await {
                    warn!("Error closing browser: {}", e);
                }
            }
            Err(_) => warn!("Browser still referenced by open pages; it is killed on drop"),
        }
        handler.abort();
    }

    async fn dispose_context(browser: &Browser, id: BrowserContextId) {
        if let Err(e) = browser.execute(DisposeBrowserContextParams::new(id)).await {
            warn!("Failed to dispose browser context: {}", e);
        }
    }
}

#[async_trait]
impl PageFactory for CdpBrowser {
    async fn open_page(&self, viewport: Viewport) -> E2eResult<Box<dyn PageBackend>> {
        let context_id = self
            .browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(E2eError::browser)?
            .result
            .browser_context_id;

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id.clone())
            .build()
            .map_err(E2eError::Browser)?;

        let page = match self.browser.new_page(target).await {
            Ok(page) => page,
            Err(e) => {
                Self::dispose_context(&self.browser, context_id).await;
                return Err(E2eError::browser(e));
            }
        };

        let mut backend = CdpPage {
            browser: Arc::clone(&self.browser),
            page: Some(page),
            context_id: Some(context_id),
            network: None,
            next_mark: 0,
        };
        if let Err(e) = backend.prepare(viewport).await {
            let _ = backend.close().await;
            return Err(e);
        }
        Ok(Box::new(backend))
    }
}

#[derive(Debug)]
struct NetworkState {
    inflight: HashSet<String>,
    last_activity: Instant,
}

enum NetEvent {
    Started(String),
    Ended(String),
}

struct NetworkTracker {
    state: Arc<Mutex<NetworkState>>,
    task: JoinHandle<()>,
}

impl NetworkTracker {
    async fn attach(page: &Page) -> E2eResult<Self> {
        page.execute(EnableParams::default())
            .await
            .map_err(E2eError::browser)?;

        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(E2eError::browser)?
            .map(|ev| NetEvent::Started(ev.request_id.inner().clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(E2eError::browser)?
            .map(|ev| NetEvent::Ended(ev.request_id.inner().clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(E2eError::browser)?
            .map(|ev| NetEvent::Ended(ev.request_id.inner().clone()));

        let state = Arc::new(Mutex::new(NetworkState {
            inflight: HashSet::new(),
            last_activity: Instant::now(),
        }));

        let shared = Arc::clone(&state);
        let mut events = Box::pin(futures::stream::select(
            started,
            futures::stream::select(finished, failed),
        ));
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let mut state = shared.lock();
                match event {
                    NetEvent::Started(id) => {
                        state.inflight.insert(id);
                    }
                    NetEvent::Ended(id) => {
                        state.inflight.remove(&id);
                    }
                }
                state.last_activity = Instant::now();
            }
        });

        Ok(Self { state, task })
    }

    fn snapshot(&self) -> (usize, Instant) {
        let state = self.state.lock();
        (state.inflight.len(), state.last_activity)
    }
}

impl Drop for NetworkTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One tab inside its own browser context
pub struct CdpPage {
    browser: Arc<Browser>,
    page: Option<Page>,
    context_id: Option<BrowserContextId>,
    network: Option<NetworkTracker>,
    next_mark: u64,
}

impl CdpPage {
    async fn prepare(&mut self, viewport: Viewport) -> E2eResult<()> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(E2eError::Browser)?;
        let page = self.page()?;
        page.execute(metrics).await.map_err(E2eError::browser)?;
        self.network = Some(NetworkTracker::attach(page).await?);
        Ok(())
    }

    fn page(&self) -> E2eResult<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| E2eError::Browser("page already closed".to_string()))
    }

    async fn eval<T: DeserializeOwned>(&self, expression: &str) -> E2eResult<T> {
        self.page()?
            .evaluate(expression)
            .await
            .map_err(E2eError::browser)?
            .into_value::<T>()
            .map_err(E2eError::browser)
    }
}

#[async_trait]
impl PageBackend for CdpPage {
    async fn goto(&mut self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        self.page()?
            .goto(url)
            .await
            .map_err(|e| E2eError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn query(&mut self, locator: &Locator) -> E2eResult<Vec<ElementState>> {
        self.eval(&script(QUERY_JS, &locator_spec(locator))).await
    }

    async fn fill(&mut self, locator: &Locator, index: usize, value: &str) -> E2eResult<()> {
        let mut spec = locator_spec(locator);
        spec["index"] = index.into();
        spec["value"] = value.into();
        let filled: bool = self.eval(&script(FILL_JS, &spec)).await?;
        if !filled {
            return Err(E2eError::ElementNotFound {
                selector: locator.to_string(),
                waited_ms: 0,
            });
        }
        Ok(())
    }

    async fn click(&mut self, locator: &Locator, index: usize) -> E2eResult<()> {
        self.next_mark += 1;
        let mark = self.next_mark.to_string();

        let mut spec = locator_spec(locator);
        spec["index"] = index.into();
        spec["mark"] = mark.clone().into();
        let marked: bool = self.eval(&script(MARK_JS, &spec)).await?;
        if !marked {
            return Err(E2eError::ElementNotFound {
                selector: locator.to_string(),
                waited_ms: 0,
            });
        }

        let element = self
            .page()?
            .find_element(format!("[data-shelfwalk-target=\"{}\"]", mark))
            .await
            .map_err(E2eError::browser)?;
        element.click().await.map_err(|e| E2eError::ElementNotInteractable {
            selector: locator.to_string(),
            state: format!("not clickable ({})", e),
        })?;
        Ok(())
    }

    async fn network_status(&mut self) -> E2eResult<NetworkStatus> {
        let (inflight, last_activity) = self
            .network
            .as_ref()
            .map(NetworkTracker::snapshot)
            .unwrap_or((0, Instant::now()));
        // Evaluation fails while a navigation swaps the execution context.
        let document_ready = self
            .eval::<String>("document.readyState")
            .await
            .map(|state| state == "complete")
            .unwrap_or(false);
        Ok(NetworkStatus {
            inflight,
            last_activity,
            document_ready,
        })
    }

    async fn current_url(&mut self) -> E2eResult<Option<String>> {
        self.page()?.url().await.map_err(E2eError::browser)
    }

    async fn body_text(&mut self) -> E2eResult<String> {
        self.eval("document.body ? document.body.innerText : ''").await
    }

    async fn screenshot(&mut self) -> E2eResult<Vec<u8>> {
        self.page()?
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(E2eError::browser)
    }

    async fn close(&mut self) -> E2eResult<()> {
        self.network = None;
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!("Failed to close page: {}", e);
            }
        }
        if let Some(id) = self.context_id.take() {
            CdpBrowser::dispose_context(&self.browser, id).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locator_spec_row_scoped_filter() {
        let locator = Locator::css("button:has-text('Borrow')").within_row("tr", "Dune");
        let spec = locator_spec(&locator);
        assert_eq!(spec["css"], "button");
        assert_eq!(spec["filter"], "Borrow");
        assert_eq!(spec["root"], "tr");
        assert_eq!(spec["hasText"], "Dune");
        assert!(spec["text"].is_null());
    }

    #[test]
    fn test_script_inlines_resolver_and_spec() {
        let spec = locator_spec(&Locator::text("Catalog"));
        let js = script(QUERY_JS, &spec);
        assert!(!js.contains("__RESOLVE__"));
        assert!(!js.contains("__SPEC__"));
        assert!(js.contains(r#""text":"Catalog""#));
    }
}
