//! Suite configuration
//!
//! Values come from (lowest to highest precedence) the built-in defaults, an
//! optional TOML file, `SHELFWALK_*` environment variables and finally CLI flags
//! applied by the binary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// Suite configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Browser viewport for every scenario that does not override it
    pub viewport: Viewport,

    /// Accept self-signed or otherwise invalid TLS certificates
    pub ignore_https_errors: bool,

    /// Operation, navigation and scenario budgets
    pub timeouts: TimeoutConfig,

    /// Reject selectors that match several elements without `first` or a row scope
    pub strict_selectors: bool,

    /// Number of scenarios run at once (1 = serial)
    pub parallelism: usize,

    /// Maximum length of observed text quoted in failure messages
    pub diagnostic_text_limit: usize,

    /// Selectors whose visible text is captured into failure snapshots
    pub banner_selectors: Vec<String>,

    /// Capture a screenshot when a scenario fails
    pub capture_screenshots: bool,

    /// Where reports and screenshots are written
    pub output_dir: PathBuf,

    /// Browser process settings
    pub browser: BrowserSettings,

    /// Application process to start before the run (None = already running)
    pub server: Option<ServerSettings>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            viewport: Viewport::default(),
            ignore_https_errors: true,
            timeouts: TimeoutConfig::default(),
            strict_selectors: true,
            parallelism: 1,
            diagnostic_text_limit: 200,
            banner_selectors: vec![
                ".flash-success".to_string(),
                ".flash-error".to_string(),
                ".flash-danger".to_string(),
                ".alert".to_string(),
            ],
            capture_screenshots: true,
            output_dir: PathBuf::from("test-results"),
            browser: BrowserSettings::default(),
            server: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { width: 1280, height: 720 }
    }
}

/// Timeout budgets, all in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Element location, waits and assertions
    pub default_ms: u64,

    /// Page loads
    pub navigation_ms: u64,

    /// Whole scenario; exceeding it cancels the scenario
    pub scenario_ms: u64,

    /// How long the network must stay quiet to count as idle
    pub idle_quiet_ms: u64,

    /// Polling interval for element and idle checks
    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: 15_000,
            navigation_ms: 15_000,
            scenario_ms: 120_000,
            idle_quiet_ms: 500,
            poll_interval_ms: 100,
        }
    }
}

impl TimeoutConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_millis(self.scenario_ms)
    }

    pub fn idle_quiet(&self) -> Duration {
        Duration::from_millis(self.idle_quiet_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Chromium launch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,

    /// Chromium binary (None = auto-detect)
    pub chrome_path: Option<PathBuf>,

    /// Disable the Chromium sandbox (containers, CI)
    pub no_sandbox: bool,

    /// Extra command-line switches passed to Chromium
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            no_sandbox: true,
            extra_args: Vec::new(),
        }
    }
}

/// How to launch the application under test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Program and arguments, e.g. `["python", "app.py"]`
    pub command: Vec<String>,

    #[serde(default)]
    pub workdir: Option<PathBuf>,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Path polled until it answers with a success status
    #[serde(default = "default_health_path")]
    pub health_path: String,

    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,
}

fn default_health_path() -> String {
    "/".to_string()
}

fn default_startup_timeout_ms() -> u64 {
    30_000
}

impl SuiteConfig {
    /// Parse a configuration from TOML; missing keys keep their defaults.
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        let config: SuiteConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        debug!("Loading suite config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply `SHELFWALK_*` environment overrides from the process environment.
    pub fn with_env(self) -> E2eResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Recognised keys: `SHELFWALK_BASE_URL`, `SHELFWALK_TIMEOUT_MS`,
    /// `SHELFWALK_NAVIGATION_TIMEOUT_MS`, `SHELFWALK_SCENARIO_TIMEOUT_MS`,
    /// `SHELFWALK_PARALLELISM`, `SHELFWALK_HEADLESS`,
    /// `SHELFWALK_IGNORE_HTTPS_ERRORS`, `SHELFWALK_CHROME`.
    pub fn with_overrides<F>(mut self, lookup: F) -> E2eResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SHELFWALK_BASE_URL") {
            debug!("Override base_url from env: {}", url);
            self.base_url = url;
        }
        if let Some(ms) = parse_override(&lookup, "SHELFWALK_TIMEOUT_MS")? {
            self.timeouts.default_ms = ms;
        }
        if let Some(ms) = parse_override(&lookup, "SHELFWALK_NAVIGATION_TIMEOUT_MS")? {
            self.timeouts.navigation_ms = ms;
        }
        if let Some(ms) = parse_override(&lookup, "SHELFWALK_SCENARIO_TIMEOUT_MS")? {
            self.timeouts.scenario_ms = ms;
        }
        if let Some(n) = parse_override(&lookup, "SHELFWALK_PARALLELISM")? {
            self.parallelism = n;
        }
        if let Some(headless) = parse_override(&lookup, "SHELFWALK_HEADLESS")? {
            self.browser.headless = headless;
        }
        if let Some(ignore) = parse_override(&lookup, "SHELFWALK_IGNORE_HTTPS_ERRORS")? {
            self.ignore_https_errors = ignore;
        }
        if let Some(path) = lookup("SHELFWALK_CHROME") {
            self.browser.chrome_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> E2eResult<()> {
        let url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| E2eError::Config(format!("base_url {:?}: {}", self.base_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(E2eError::Config(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.parallelism == 0 {
            return Err(E2eError::Config("parallelism must be at least 1".to_string()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(E2eError::Config("viewport dimensions must be non-zero".to_string()));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(E2eError::Config("poll_interval_ms must be non-zero".to_string()));
        }
        if let Some(server) = &self.server {
            if server.command.is_empty() {
                return Err(E2eError::Config("server.command must name a program".to_string()));
            }
        }
        Ok(())
    }

    /// Resolve a scenario URL against the base URL. Absolute URLs pass through.
    pub fn resolve_url(&self, url: &str) -> E2eResult<String> {
        let base = reqwest::Url::parse(&self.base_url)
            .map_err(|e| E2eError::Config(format!("base_url {:?}: {}", self.base_url, e)))?;
        let resolved = base.join(url).map_err(|e| E2eError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(resolved.to_string())
    }
}

fn parse_override<T, F>(lookup: &F, key: &str) -> E2eResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| E2eError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(None),
    }
}
