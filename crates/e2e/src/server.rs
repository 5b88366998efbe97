//! Application server management: optional spawning and health checking

use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ServerSettings;
use crate::error::{E2eError, E2eResult};

/// Handle to a running application process. Stopped on drop.
pub struct AppServer {
    child: Child,
    base_url: String,
}

impl AppServer {
    /// Start the application and wait until it answers on `base_url`.
    pub async fn spawn(settings: &ServerSettings, base_url: &str) -> E2eResult<Self> {
        let (program, args) = settings
            .command
            .split_first()
            .ok_or_else(|| E2eError::ServerStartup("empty server command".to_string()))?;

        info!("Starting application: {}", settings.command.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&settings.env)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(dir) = &settings.workdir {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| E2eError::ServerStartup(format!("Failed to spawn {}: {}", program, e)))?;

        let mut server = AppServer {
            child,
            base_url: base_url.to_string(),
        };

        let health_url = join(base_url, &settings.health_path)?;
        let budget = Duration::from_millis(settings.startup_timeout_ms);
        if let Err(e) = wait_for_healthy(&health_url, budget, Some(&mut server.child)).await {
            server.stop();
            return Err(e);
        }

        info!("Application is healthy at {}", base_url);
        Ok(server)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// SIGTERM, a short grace period, then kill.
    pub fn stop(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        info!("Stopping application (pid: {})", self.child.id());

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join(base_url: &str, path: &str) -> E2eResult<String> {
    reqwest::Url::parse(base_url)
        .and_then(|base| base.join(path))
        .map(|url| url.to_string())
        .map_err(|e| E2eError::Config(format!("{} + {}: {}", base_url, path, e)))
}

/// Poll `url` every 100 ms until it returns a success status.
///
/// Fails early when `child` exits before becoming healthy.
pub async fn wait_for_healthy(url: &str, budget: Duration, mut child: Option<&mut Child>) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .danger_accept_invalid_certs(true)
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    while start.elapsed() < budget {
        attempts += 1;

        if let Some(child) = child.as_deref_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                return Err(E2eError::ServerStartup(format!(
                    "application exited during startup ({})",
                    status
                )));
            }
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => warn!("Health check returned {}", resp.status()),
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for application at {}...", url);
                }
                if !e.is_connect() {
                    warn!("Health check error: {}", e);
                }
            }
        }

        sleep(Duration::from_millis(100)).await;
    }

    Err(E2eError::ServerHealthCheck(attempts))
}

/// Check the application answers before launching any browser.
pub async fn preflight(base_url: &str, budget: Duration) -> E2eResult<()> {
    debug!("Preflight check of {}", base_url);
    wait_for_healthy(base_url, budget, None).await.map_err(|e| match e {
        E2eError::ServerHealthCheck(_) => E2eError::ServerStartup(format!(
            "{} is not reachable; start the application or configure [server]",
            base_url
        )),
        other => other,
    })
}
