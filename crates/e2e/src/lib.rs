//! qa-todo E2E Test Framework
//!
//! Browser-driven verification of the qa-todo web application:
//! - Models locators, steps and assertions as typed Rust values
//! - Compiles each scenario into one Playwright program and runs it with node
//! - Streams a JSON line protocol back for step results, captures and failures
//! - Reuses the session saved by the login scenario in later contexts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    E2E Test Runner (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestRunner                                                 │
//! │    ├── connect_target() -> AppTarget                        │
//! │    ├── run_scenarios([Scenario]) -> TestSuiteResult         │
//! │    │     └── Scenario::build(ctx) -> TestSpec               │
//! │    ├── run_spec(spec) -> TestResult                         │
//! │    │     └── PlaywrightHandle::run_spec -> ScriptOutcome    │
//! │    └── write_results(suite)                                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TestSpec (Rust or YAML)                                    │
//! │    ├── name, tags, viewport, session                        │
//! │    └── steps: [TestStep]                                    │
//! │          ├── navigate / reload / fill / click               │
//! │          ├── expect { locator, assertion }                  │
//! │          ├── capture + check_capture                        │
//! │          ├── route / click_expecting_response               │
//! │          ├── drain { items, retry }                         │
//! │          └── save_storage_state { path }                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod locator;
pub mod playwright;
pub mod retry;
pub mod runner;
pub mod scenarios;
pub mod script;
pub mod spec;
pub mod target;

pub use config::{CredentialSource, Credentials};
pub use error::{E2eError, E2eResult};
pub use locator::Locator;
pub use retry::RetryPolicy;
pub use runner::{RunnerConfig, TestRunner, TestSuiteResult};
pub use scenarios::{Scenario, ScenarioContext};
pub use spec::{TestSpec, TestStep};
