//! Main test runner that orchestrates the target app, Playwright and results

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{E2eError, E2eResult};
use crate::playwright::{Failure, FailureKind, PlaywrightConfig, PlaywrightHandle, StepResult};
use crate::scenarios::{Scenario, ScenarioContext};
use crate::spec::{TestSpec, TestStep};
use crate::target::{AppTarget, TargetConfig};

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub captures: serde_json::Map<String, serde_json::Value>,
    pub failure: Option<Failure>,
}

impl TestResult {
    /// A test that never reached the browser
    fn not_started(name: &str, kind: FailureKind, message: String) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            started_at: Utc::now(),
            duration_ms: 0,
            steps: vec![],
            captures: Default::default(),
            failure: Some(Failure {
                kind,
                step: None,
                message,
            }),
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }
}

/// Result of running all tests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl TestSuiteResult {
    pub fn from_results(results: Vec<TestResult>, duration_ms: u64) -> Self {
        let passed = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms,
            results,
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Main E2E test runner
pub struct TestRunner {
    target_config: TargetConfig,
    playwright_config: PlaywrightConfig,
    target: Option<AppTarget>,
    playwright: Option<PlaywrightHandle>,
    context: ScenarioContext,
    /// Extra YAML specs directory
    specs_dir: PathBuf,
    /// Output directory for results
    output_dir: PathBuf,
}

impl TestRunner {
    /// Create a new test runner with default configuration
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    /// Create a test runner with custom configuration
    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            target_config: config.target,
            playwright_config: config.playwright,
            target: None,
            playwright: None,
            context: config.context,
            specs_dir: config.specs_dir,
            output_dir: config.output_dir,
        }
    }

    pub fn context(&self) -> &ScenarioContext {
        &self.context
    }

    /// Make sure the app answers (spawning it locally if configured)
    pub async fn connect_target(&mut self) -> E2eResult<()> {
        if self.target.is_some() {
            return Ok(());
        }

        let target = AppTarget::connect(self.target_config.clone()).await?;
        self.playwright_config.base_url = target.base_url().to_string();
        if let Some(playwright) = self.playwright.as_mut() {
            playwright.set_base_url(target.base_url());
        }
        self.target = Some(target);
        Ok(())
    }

    /// Stop a locally served app
    pub fn disconnect_target(&mut self) -> E2eResult<()> {
        if let Some(mut target) = self.target.take() {
            target.stop()?;
        }
        Ok(())
    }

    /// Check that Playwright is installed, returning its version
    pub fn ensure_playwright(&mut self) -> E2eResult<&str> {
        Ok(self.playwright()?.version())
    }

    fn playwright(&mut self) -> E2eResult<&PlaywrightHandle> {
        if self.playwright.is_none() {
            self.playwright = Some(PlaywrightHandle::new(self.playwright_config.clone())?);
        }
        self.playwright
            .as_ref()
            .ok_or_else(|| E2eError::Playwright("handle unavailable".to_string()))
    }

    /// Build and run scenarios in order
    pub async fn run_scenarios(&mut self, scenarios: &[Scenario]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        info!("Running {} scenario(s)...", scenarios.len());

        let mut results = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let result = settle(scenario.name(), self.run_scenario(*scenario).await)?;
            report(&result);
            results.push(result);
        }

        Ok(self.summarize(results, start))
    }

    /// Build and run one scenario; build failures never reach the browser
    pub async fn run_scenario(&mut self, scenario: Scenario) -> E2eResult<TestResult> {
        match scenario.build(&self.context) {
            Ok(spec) => self.run_spec(&spec).await,
            Err(e) if e.is_precondition() => {
                Ok(TestResult::not_started(scenario.name(), FailureKind::Precondition, e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Run all YAML specs in the specs directory
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run YAML specs matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        let filtered: Vec<TestSpec> = TestSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific YAML spec by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestResult> {
        let specs = TestSpec::load_all(&self.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Test not found: {}", name)))?;

        self.run_spec(&spec).await
    }

    /// Run a list of test specs
    pub async fn run_specs(&mut self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let start = Instant::now();
        info!("Running {} test(s)...", specs.len());

        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            let result = settle(&spec.name, self.run_spec(spec).await)?;
            report(&result);
            results.push(result);
        }

        Ok(self.summarize(results, start))
    }

    /// Run a single test spec
    pub async fn run_spec(&mut self, spec: &TestSpec) -> E2eResult<TestResult> {
        let started_at = Utc::now();
        let start = Instant::now();
        debug!("Running test: {}", spec.name);

        self.prepare_outputs(spec)?;

        let storage_state = self.context.storage_state.clone();
        let outcome = self.playwright()?.run_spec(spec, Some(&storage_state)).await?;

        let success = outcome.success();
        Ok(TestResult {
            name: spec.name.clone(),
            success,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            steps: outcome.steps,
            captures: outcome.captures,
            failure: outcome.failure,
        })
    }

    /// Create parent directories for files the spec writes
    fn prepare_outputs(&self, spec: &TestSpec) -> E2eResult<()> {
        for step in &spec.steps {
            if let TestStep::SaveStorageState { path } = step {
                let path = self.playwright_config.resolve(path);
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }

    fn summarize(&self, results: Vec<TestResult>, start: Instant) -> TestSuiteResult {
        let suite = TestSuiteResult::from_results(results, start.elapsed().as_millis() as u64);
        info!("");
        info!(
            "Test Results: {} passed, {} failed ({} ms)",
            suite.passed, suite.failed, suite.duration_ms
        );
        suite
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Default for TestRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        let _ = self.disconnect_target();
    }
}

/// Turn a per-test error into a failed result so the rest of the run goes on.
///
/// A missing Playwright install still aborts: every later test would fail the same way.
fn settle(name: &str, result: E2eResult<TestResult>) -> E2eResult<TestResult> {
    match result {
        Ok(result) => Ok(result),
        Err(E2eError::PlaywrightNotFound) => Err(E2eError::PlaywrightNotFound),
        Err(e) => {
            error!("{} could not run: {}", name, e);
            Ok(TestResult::not_started(name, FailureKind::Script, e.to_string()))
        }
    }
}

fn report(result: &TestResult) {
    if result.success {
        info!("✓ {} ({} ms)", result.name, result.duration_ms);
    } else {
        let kind = result
            .failure
            .as_ref()
            .map(|f| f.kind.as_str())
            .unwrap_or("unknown");
        error!(
            "✗ {} [{}] - {}",
            result.name,
            kind,
            result.error().unwrap_or("unknown error")
        );
    }
}

/// Configuration for the test runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub target: TargetConfig,
    pub playwright: PlaywrightConfig,
    pub context: ScenarioContext,
    pub specs_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            playwright: PlaywrightConfig::default(),
            context: ScenarioContext::default(),
            specs_dir: PathBuf::from("crates/e2e/specs"),
            output_dir: PathBuf::from("test-results"),
        }
    }
}
