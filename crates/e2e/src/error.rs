//! Error types for E2E testing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Missing configuration: {key} is not set")]
    MissingConfig { key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Target failed to start: {0}")]
    TargetStartup(String),

    #[error("Target {url} unreachable after {attempts} attempts")]
    TargetUnreachable { url: String, attempts: usize },

    #[error("Playwright not found. Install with: npm i -D @playwright/test && npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Retries exhausted after {attempts} attempts: {what}")]
    RetryExhausted { what: String, attempts: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl E2eError {
    /// Errors raised before a scenario touches the browser.
    pub fn is_precondition(&self) -> bool {
        matches!(self, E2eError::MissingConfig { .. } | E2eError::InvalidConfig(_))
    }
}

pub type E2eResult<T> = Result<T, E2eError>;
