//! Run Command

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use shelfwalk_e2e::server::preflight;
use shelfwalk_e2e::{AppServer, CdpBrowser, Report, SuiteConfig, TestSuite};
use tracing::{debug, info, warn};

use super::ScenarioArgs;
use crate::output::{print_report, print_warning, OutputFormat};

const PREFLIGHT_BUDGET: Duration = Duration::from_secs(5);

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub scenarios: ScenarioArgs,

    /// Suite configuration file (TOML)
    #[arg(short, long, env = "SHELFWALK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Base URL of the application under test
    #[arg(long)]
    pub base_url: Option<String>,

    /// Scenarios run at once
    #[arg(long)]
    pub parallel: Option<usize>,

    #[arg(long)]
    pub viewport_width: Option<u32>,

    #[arg(long)]
    pub viewport_height: Option<u32>,

    /// Element, wait and assertion timeout
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    #[arg(long)]
    pub navigation_timeout_ms: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Chromium binary
    #[arg(long)]
    pub chrome: Option<PathBuf>,

    /// Report and screenshot directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// File, then environment, then flags.
    pub fn load_config(&self) -> Result<SuiteConfig> {
        let config = match &self.config {
            Some(path) => SuiteConfig::from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SuiteConfig::default(),
        };
        let mut config = config.with_env()?;

        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(n) = self.parallel {
            config.parallelism = n;
        }
        if let Some(width) = self.viewport_width {
            config.viewport.width = width;
        }
        if let Some(height) = self.viewport_height {
            config.viewport.height = height;
        }
        if let Some(ms) = self.timeout_ms {
            config.timeouts.default_ms = ms;
        }
        if let Some(ms) = self.navigation_timeout_ms {
            config.timeouts.navigation_ms = ms;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(chrome) = &self.chrome {
            config.browser.chrome_path = Some(chrome.clone());
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Run the selected scenarios. Errors are infrastructure failures; scenario
/// failures are reported in the returned `Report`.
pub async fn execute(args: RunArgs, format: OutputFormat) -> Result<Report> {
    let config = args.load_config()?;
    let scenarios = args.scenarios.select()?;
    if scenarios.is_empty() {
        print_warning("No scenarios matched the selection");
    }
    debug!("Suite config: {:?}", config);

    let mut server = match &config.server {
        Some(settings) => {
            let server = AppServer::spawn(settings, &config.base_url).await?;
            info!("Application running at {} (pid {})", server.base_url(), server.pid());
            Some(server)
        }
        None => {
            preflight(&config.base_url, PREFLIGHT_BUDGET).await?;
            None
        }
    };

    let report = run_suite(config, scenarios).await;

    if let Some(server) = server.as_mut() {
        server.stop();
    }
    let report = report?;

    print_report(&report, format);
    Ok(report)
}

async fn run_suite(config: SuiteConfig, scenarios: Vec<shelfwalk_e2e::Scenario>) -> Result<Report> {
    let browser = Arc::new(CdpBrowser::launch(&config).await?);

    let mut suite = TestSuite::new(config.clone(), browser.clone());
    let registered = suite.register_all(scenarios);
    let report = match registered {
        Ok(()) => Ok(suite.run().await),
        Err(e) => Err(e),
    };
    drop(suite);

    match Arc::try_unwrap(browser) {
        Ok(browser) => browser.shutdown().await,
        Err(_) => warn!("Browser still referenced after the run; leaving it to drop"),
    }

    let report = report?;
    report.write_json(&config.output_dir)?;
    Ok(report)
}
