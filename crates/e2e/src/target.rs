//! The application under test: a remote deployment, or a locally served build

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};
use crate::retry::RetryPolicy;

/// Configuration for reaching (and optionally serving) the app
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub base_url: String,

    /// Shell command that serves the app locally, e.g. `npm run dev`
    pub serve_command: Option<String>,

    /// Timeout for the app to start answering
    pub startup_timeout: Duration,

    /// Poll schedule while waiting
    pub poll: RetryPolicy,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "https://qa-todo.ranger.net/".to_string(),
            serve_command: None,
            startup_timeout: Duration::from_secs(30),
            poll: RetryPolicy {
                max_retries: 60,
                initial_backoff_ms: 100,
                multiplier: 1.5,
                max_backoff_ms: 1000,
            },
        }
    }
}

/// Handle to a reachable app, owning the local server process if one was spawned
pub struct AppTarget {
    child: Option<Child>,
    base_url: String,
}

impl AppTarget {
    /// Spawn the app if configured, then wait until it answers
    pub async fn connect(config: TargetConfig) -> E2eResult<Self> {
        config.poll.validate()?;

        let child = match &config.serve_command {
            Some(command) => {
                info!("Serving app with `{}`", command);
                let child = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::inherit())
                    .spawn()
                    .map_err(|e| E2eError::TargetStartup(format!("failed to spawn `{}`: {}", command, e)))?;
                Some(child)
            }
            None => None,
        };

        let mut target = AppTarget {
            child,
            base_url: config.base_url.clone(),
        };

        if let Err(e) = target.wait_until_reachable(&config).await {
            let _ = target.stop();
            return Err(e);
        }

        info!("App is reachable at {}", target.base_url);
        Ok(target)
    }

    /// Poll the base URL until it responds
    async fn wait_until_reachable(&mut self, config: &TargetConfig) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = Instant::now();
        let url = self.base_url.clone();
        let mut attempts = 0;

        let result = config
            .poll
            .run("app reachability", |attempt| {
                attempts = attempt as usize + 1;
                let client = &client;
                let url = &url;
                let exited = self.exited();
                async move {
                    if let Some(status) = exited {
                        return Err(E2eError::TargetStartup(format!("serve command exited with {}", status)));
                    }
                    if start.elapsed() > config.startup_timeout {
                        return Err(E2eError::TargetUnreachable {
                            url: url.clone(),
                            attempts: attempt as usize,
                        });
                    }
                    match client.get(url.as_str()).send().await {
                        // any HTTP answer means the server is up
                        Ok(resp) => {
                            if !resp.status().is_success() {
                                warn!("{} answered {}", url, resp.status());
                            }
                            Ok(Some(()))
                        }
                        Err(e) => {
                            if attempt == 0 {
                                info!("Waiting for {}...", url);
                            }
                            // Connection refused is expected while a local server is starting
                            if !e.is_connect() {
                                warn!("Poll error: {}", e);
                            }
                            Ok(None)
                        }
                    }
                }
            })
            .await;

        match result {
            Err(E2eError::RetryExhausted { .. }) => Err(E2eError::TargetUnreachable { url, attempts }),
            other => other,
        }
    }

    fn exited(&mut self) -> Option<std::process::ExitStatus> {
        self.child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    /// Get the base URL for this target
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_local(&self) -> bool {
        self.child.is_some()
    }

    /// Stop the local server, if any
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping local app (pid: {})", child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = child.kill();
        let _ = child.wait();

        Ok(())
    }
}

impl Drop for AppTarget {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
