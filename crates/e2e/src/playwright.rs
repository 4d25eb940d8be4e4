//! Playwright browser automation

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command as TokioCommand;
use tracing::{debug, error, info, warn};

use crate::config::Secrets;
use crate::error::{E2eError, E2eResult};
use crate::script::{build_script, ScriptOptions};
use crate::spec::{SessionMode, TestSpec, ViewportMode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(E2eError::InvalidConfig(format!("unknown browser: {}", other))),
        }
    }
}

/// Why a scenario stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Something the scenario needs was missing before it could start
    Precondition,
    Timeout,
    Assertion,
    /// An expected network exchange never happened
    Network,
    RetryExhausted,
    /// Script crashed or the protocol broke
    Script,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Precondition => "precondition",
            FailureKind::Timeout => "timeout",
            FailureKind::Assertion => "assertion",
            FailureKind::Network => "network",
            FailureKind::RetryExhausted => "retry_exhausted",
            FailureKind::Script => "script",
        }
    }
}

/// One line of script output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScriptEvent {
    Step {
        index: usize,
        duration_ms: u64,
    },
    Capture {
        name: String,
        value: serde_json::Value,
    },
    Log {
        #[serde(default)]
        level: Option<String>,
        message: String,
    },
    Done,
    Failed {
        index: Option<usize>,
        kind: FailureKind,
        error: String,
    },
}

impl ScriptEvent {
    /// Parse a stdout line; non-protocol output yields `None`
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Where and why a scenario failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub step: Option<String>,
    pub message: String,
}

/// Everything a script run reported
#[derive(Debug, Clone, Default)]
pub struct ScriptOutcome {
    pub steps: Vec<StepResult>,
    pub captures: serde_json::Map<String, serde_json::Value>,
    pub failure: Option<Failure>,
    pub completed: bool,
}

impl ScriptOutcome {
    /// Fold a script event into the outcome
    pub fn apply(&mut self, spec: &TestSpec, event: ScriptEvent) {
        match event {
            ScriptEvent::Step { index, duration_ms } => {
                self.steps.push(StepResult {
                    success: true,
                    step_name: step_name(spec, Some(index)),
                    duration_ms,
                    error: None,
                });
            }
            ScriptEvent::Capture { name, value } => {
                debug!("Captured {} = {}", name, value);
                self.captures.insert(name, value);
            }
            ScriptEvent::Log { level, message } => match level.as_deref() {
                Some("warn") => warn!("[{}] {}", spec.name, message),
                Some("error") => error!("[{}] {}", spec.name, message),
                Some("debug") => debug!("[{}] {}", spec.name, message),
                _ => info!("[{}] {}", spec.name, message),
            },
            ScriptEvent::Done => self.completed = true,
            ScriptEvent::Failed { index, kind, error } => {
                let name = index.map(|i| step_name(spec, Some(i)));
                self.steps.push(StepResult {
                    success: false,
                    step_name: name.clone().unwrap_or_else(|| "setup".to_string()),
                    duration_ms: 0,
                    error: Some(error.clone()),
                });
                self.failure = Some(Failure {
                    kind,
                    step: name,
                    message: error,
                });
            }
        }
    }

    /// Reconcile the outcome with how the process exited
    pub fn finish(&mut self, exit_ok: bool, stderr: &str) {
        if self.failure.is_some() {
            return;
        }
        if !exit_ok || !self.completed {
            let message = if stderr.trim().is_empty() {
                "script exited without reporting completion".to_string()
            } else {
                format!("script exited without reporting completion:\n{}", stderr.trim())
            };
            self.failure = Some(Failure {
                kind: FailureKind::Script,
                step: None,
                message,
            });
        }
    }

    pub fn success(&self) -> bool {
        self.completed && self.failure.is_none()
    }
}

fn step_name(spec: &TestSpec, index: Option<usize>) -> String {
    index
        .and_then(|i| spec.steps.get(i))
        .map(|s| s.name())
        .unwrap_or_else(|| format!("step#{}", index.unwrap_or_default()))
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub base_url: String,
    pub browser: Browser,
    pub headless: bool,
    /// Default viewport for specs that do not set one
    pub viewport: ViewportMode,
    /// `node_modules` directory holding `playwright` and `@playwright/test`
    pub node_modules: PathBuf,
    /// Failure screenshots land here
    pub artifacts_dir: PathBuf,
    /// Working directory for the node process; relative paths in steps resolve against it
    pub work_dir: PathBuf,
}

impl PlaywrightConfig {
    /// Resolve `path` the way the node process sees it
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            base_url: "https://qa-todo.ranger.net/".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport: ViewportMode::default(),
            node_modules: PathBuf::from("node_modules"),
            artifacts_dir: PathBuf::from("test-results/artifacts"),
            work_dir: PathBuf::from("."),
        }
    }
}

/// Playwright browser handle
pub struct PlaywrightHandle {
    config: PlaywrightConfig,
    version: String,
}

impl PlaywrightHandle {
    /// Create a new Playwright handle
    pub fn new(config: PlaywrightConfig) -> E2eResult<Self> {
        let version = Self::check_playwright_installed()?;
        info!("Using Playwright {}", version);

        std::fs::create_dir_all(&config.artifacts_dir)?;

        Ok(Self { config, version })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn config(&self) -> &PlaywrightConfig {
        &self.config
    }

    pub fn set_base_url(&mut self, base_url: &str) {
        self.config.base_url = base_url.to_string();
    }

    /// Check if Playwright is installed and return its version
    fn check_playwright_installed() -> E2eResult<String> {
        let output = Command::new("npx")
            .args(["--no-install", "playwright", "--version"])
            .stdin(Stdio::null())
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let stdout = String::from_utf8_lossy(&out.stdout);
                Ok(parse_version(&stdout).unwrap_or_else(|| stdout.trim().to_string()))
            }
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    /// Options for compiling `spec`, including session reuse
    pub fn script_options(&self, spec: &TestSpec, storage_state: Option<&Path>) -> ScriptOptions {
        let storage_state = match (spec.session, storage_state.map(|p| self.config.resolve(p))) {
            // absolute, since node runs inside `work_dir`
            (SessionMode::Reuse, Some(path)) if path.exists() => {
                Some(std::fs::canonicalize(&path).unwrap_or(path))
            }
            (SessionMode::Reuse, Some(path)) => {
                warn!(
                    "No saved session at {}; '{}' starts with an empty context",
                    path.display(),
                    spec.name
                );
                None
            }
            _ => None,
        };

        ScriptOptions {
            browser: self.config.browser,
            headless: self.config.headless,
            base_url: self.config.base_url.clone(),
            viewport: spec.viewport.unwrap_or(self.config.viewport),
            storage_state,
            failure_screenshot: Some(
                self.config
                    .artifacts_dir
                    .join(format!("{}-failure.png", sanitize(&spec.name))),
            ),
        }
    }

    /// Compile and run a whole spec in one browser context
    pub async fn run_spec(&self, spec: &TestSpec, storage_state: Option<&Path>) -> E2eResult<ScriptOutcome> {
        let options = self.script_options(spec, storage_state);
        let script = build_script(spec, &options);
        self.run_script(spec, &script, &spec.secrets).await
    }

    /// Execute a script via node, streaming its events
    pub async fn run_script(&self, spec: &TestSpec, script: &str, secrets: &Secrets) -> E2eResult<ScriptOutcome> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join(format!("{}.js", sanitize(&spec.name)));
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let node_modules = std::fs::canonicalize(&self.config.node_modules)
            .unwrap_or_else(|_| self.config.node_modules.clone());

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .current_dir(&self.config.work_dir)
            .env("NODE_PATH", node_modules)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in secrets.iter() {
            cmd.env(key, value);
        }

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| E2eError::Playwright(format!("failed to spawn node: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Playwright("node stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| E2eError::Playwright("node stderr not captured".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut outcome = ScriptOutcome::default();
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            match ScriptEvent::parse(&line) {
                Some(event) => outcome.apply(spec, event),
                None if !line.trim().is_empty() => debug!("[{}] {}", spec.name, line),
                None => {}
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        outcome.finish(status.success(), &stderr);

        debug!(
            "Script for '{}' exited with {} after {} ms",
            spec.name,
            status,
            start.elapsed().as_millis()
        );

        Ok(outcome)
    }
}

/// Extract `1.45.0` from `Version 1.45.0`
pub fn parse_version(output: &str) -> Option<String> {
    let re = Regex::new(r"(\d+\.\d+\.\d+)").ok()?;
    re.captures(output).map(|c| c[1].to_string())
}

/// File-name-safe form of a spec name
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
