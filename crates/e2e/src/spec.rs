//! Test specifications: the step model shared by built-in scenarios and YAML specs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::Secrets;
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::retry::RetryPolicy;

/// A complete test specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Viewport override; the runner default applies when unset
    #[serde(default)]
    pub viewport: Option<ViewportMode>,

    /// Whether to seed the browser context with a saved session
    #[serde(default)]
    pub session: SessionMode,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,

    /// Values exposed to the script as environment variables
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewportMode {
    Fixed { width: u32, height: u32 },
    /// Size the viewport to the browser's reported screen
    Screen,
}

impl Default for ViewportMode {
    fn default() -> Self {
        ViewportMode::Fixed {
            width: 1440,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// Load the saved storage state if the file exists
    #[default]
    Reuse,
    /// Always start from an empty context
    Fresh,
}

/// A single step in a test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to a URL (relative to base, or absolute)
    Navigate {
        url: String,
        #[serde(default)]
        wait_until: Option<LoadState>,
    },

    /// Reload the current page
    Reload {
        #[serde(default)]
        wait_until: Option<LoadState>,
    },

    WaitForLoadState {
        state: LoadState,
    },

    /// Fill an input field
    Fill {
        locator: Locator,
        value: InputValue,
        #[serde(default)]
        clear_first: bool,
    },

    /// Click an element
    Click {
        locator: Locator,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    ScrollIntoView {
        locator: Locator,
    },

    /// Wait for an element to reach a state
    Wait {
        locator: Locator,
        #[serde(default)]
        state: WaitState,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
        /// Carry on after a timeout instead of failing
        #[serde(default)]
        optional: bool,
    },

    /// Web-first assertion, retried by Playwright until the timeout
    Expect {
        locator: Locator,
        assertion: Assertion,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    /// Read a value off the page and report it
    Capture {
        name: String,
        locator: Locator,
        kind: CaptureKind,
    },

    /// Check a previously captured value
    CheckCapture {
        name: String,
        check: CaptureCheck,
        /// Report failure as an unmet precondition rather than a mismatch
        #[serde(default)]
        precondition: bool,
    },

    /// Answer matching requests with a fixed response
    Route {
        pattern: String,
        response: MockResponse,
    },

    /// Click while waiting for a response matching `pattern`
    ClickExpectingResponse {
        locator: Locator,
        pattern: String,
        #[serde(default = "default_wait_timeout")]
        timeout_ms: u64,
    },

    /// Remove list rows one at a time until none remain
    Drain(DrainStep),

    /// Persist cookies and local storage for later contexts
    SaveStorageState {
        path: PathBuf,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

fn default_wait_timeout() -> u64 {
    5000 // 5 seconds default
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
    Load,
    DomContentLoaded,
    NetworkIdle,
}

impl LoadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadState::Load => "load",
            LoadState::DomContentLoaded => "domcontentloaded",
            LoadState::NetworkIdle => "networkidle",
        }
    }
}

/// Text typed into an input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Literal(String),
    /// Read from the script's environment at run time
    Env { env: String },
}

impl InputValue {
    pub fn env(key: impl Into<String>) -> Self {
        InputValue::Env { env: key.into() }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Literal(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assertion {
    Visible,
    Hidden,
    Enabled,
    Checked,
    Unchecked,
    ContainsText(String),
    HasCount(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureKind {
    /// Trimmed text of every match
    AllTexts,
    /// Trimmed text of the single match
    Text,
    Count,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureCheck {
    Equals(serde_json::Value),
    NonEmpty,
    /// Number, or array length, is at least this
    AtLeast(usize),
    HasLength(usize),
    /// String contains the text, or array has it as an element
    Contains(String),
    /// Like `contains`, with the needle taken from another capture
    ContainsCapture(String),
    LastEqualsCapture(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub body: serde_json::Value,
}

fn default_status() -> u16 {
    200
}

fn default_content_type() -> String {
    "application/json".to_string()
}

impl MockResponse {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: default_status(),
            content_type: default_content_type(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainStep {
    /// Rows to remove
    pub items: Locator,

    /// CSS selector of the remove control, relative to a row
    pub remove_control: String,

    #[serde(default = "default_drain_timeout")]
    pub visible_timeout_ms: u64,

    #[serde(default = "default_drain_timeout")]
    pub detach_timeout_ms: u64,

    /// Hard cap on removals so a list that refills cannot loop forever
    #[serde(default = "default_max_removals")]
    pub max_removals: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Capture name for the number of removed rows
    #[serde(default)]
    pub capture: Option<String>,
}

fn default_drain_timeout() -> u64 {
    2000
}

fn default_max_removals() -> usize {
    200
}

impl TestStep {
    /// Short label used in logs and results
    pub fn name(&self) -> String {
        match self {
            TestStep::Navigate { url, .. } => format!("navigate:{}", url),
            TestStep::Reload { .. } => "reload".to_string(),
            TestStep::WaitForLoadState { state } => format!("load_state:{}", state.as_str()),
            TestStep::Fill { locator, .. } => format!("fill:{}", locator),
            TestStep::Click { locator, .. } => format!("click:{}", locator),
            TestStep::ScrollIntoView { locator } => format!("scroll:{}", locator),
            TestStep::Wait { locator, state, .. } => format!("wait:{}:{}", locator, state.as_str()),
            TestStep::Expect { locator, assertion, .. } => format!("expect:{}:{:?}", locator, assertion),
            TestStep::Capture { name, .. } => format!("capture:{}", name),
            TestStep::CheckCapture { name, .. } => format!("check:{}", name),
            TestStep::Route { pattern, .. } => format!("route:{}", pattern),
            TestStep::ClickExpectingResponse { locator, pattern, .. } => {
                format!("click:{}:await:{}", locator, pattern)
            }
            TestStep::Drain(drain) => format!("drain:{}", drain.items),
            TestStep::SaveStorageState { path } => format!("save_storage:{}", path.display()),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        serde_yaml::from_str(yaml).map_err(E2eError::from)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, sorted by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.has_tag(tag)).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_spec() {
        let yaml = r#"
name: heading-smoke
description: The app shell renders its heading
tags:
  - smoke
steps:
  - action: navigate
    url: /
    wait_until: networkidle
  - action: fill
    locator:
      placeholder: make coffee
    value: buy milk
    clear_first: true
  - action: expect
    locator:
      css: h1
      refine:
        - first
    assertion:
      contains_text: Todo List.
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.name, "heading-smoke");
        assert_eq!(spec.steps.len(), 3);
        assert_eq!(spec.session, SessionMode::Reuse);
        assert!(spec.viewport.is_none());
        assert_eq!(
            spec.steps[1],
            TestStep::Fill {
                locator: Locator::placeholder("make coffee"),
                value: InputValue::from("buy milk"),
                clear_first: true,
            }
        );
    }

    #[test]
    fn test_parse_route_and_drain() {
        let yaml = r#"
name: mocked
session: fresh
viewport:
  mode: screen
steps:
  - action: route
    pattern: '**/api/random'
    response:
      body: { ten: true }
  - action: drain
    items:
      css: '[data-type="todo"]'
    remove_control: button
    retry:
      max_retries: 2
      initial_backoff_ms: 50
      max_backoff_ms: 200
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.session, SessionMode::Fresh);
        assert_eq!(spec.viewport, Some(ViewportMode::Screen));

        match &spec.steps[0] {
            TestStep::Route { response, .. } => {
                assert_eq!(response.status, 200);
                assert_eq!(response.content_type, "application/json");
                assert_eq!(response.body, serde_json::json!({ "ten": true }));
            }
            other => panic!("unexpected step: {other:?}"),
        }
        match &spec.steps[1] {
            TestStep::Drain(drain) => {
                assert_eq!(drain.detach_timeout_ms, 2000);
                assert_eq!(drain.max_removals, 200);
                assert_eq!(drain.retry.multiplier, 2.0);
                assert_eq!(drain.retry.max_retries, 2);
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_env_input_value() {
        let yaml = r#"
name: login-like
steps:
  - action: fill
    locator:
      placeholder: Your password
    value:
      env: PASSWORD
"#;
        let spec = TestSpec::from_yaml(yaml).unwrap();
        match &spec.steps[0] {
            TestStep::Fill { value, .. } => assert_eq!(value, &InputValue::env("PASSWORD")),
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn test_step_names() {
        let step = TestStep::Wait {
            locator: Locator::test_id("dice-roll"),
            state: WaitState::Detached,
            timeout_ms: 2000,
            optional: false,
        };
        assert_eq!(step.name(), "wait:testid=dice-roll:detached");
        assert_eq!(TestStep::Sleep { ms: 100 }.name(), "sleep:100ms");
    }
}
