//! Command-line options for the live harness

use std::path::PathBuf;
use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{Parser, ValueEnum};

use crate::config::CredentialSource;
use crate::error::E2eResult;
use crate::playwright::{Browser, PlaywrightConfig};
use crate::runner::RunnerConfig;
use crate::scenarios::{Scenario, ScenarioContext};
use crate::spec::ViewportMode;
use crate::target::TargetConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Viewport {
    /// Fixed width x height
    Fixed,
    /// The browser's reported screen size
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "qa-todo-e2e")]
#[command(about = "E2E test runner for the qa-todo app")]
pub struct HarnessArgs {
    /// Base URL of the app under test
    #[arg(long, env = "BASE_URL", default_value = "https://qa-todo.ranger.net/")]
    pub base_url: String,

    /// Run only these scenarios (repeatable)
    #[arg(short, long)]
    pub scenario: Vec<String>,

    /// Run only scenarios or specs carrying this tag
    #[arg(short, long)]
    pub tag: Option<String>,

    /// Also run YAML specs from this directory
    #[arg(long)]
    pub specs: Option<PathBuf>,

    /// Shell command that serves the app locally
    #[arg(long, env = "SERVE_CMD")]
    pub serve_cmd: Option<String>,

    /// Seconds to wait for the app to answer
    #[arg(long, default_value = "30")]
    pub startup_timeout: u64,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    pub browser: String,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    #[arg(long, value_enum, default_value = "fixed")]
    pub viewport: Viewport,

    /// Viewport width
    #[arg(long, default_value = "1440")]
    pub viewport_width: u32,

    /// Viewport height
    #[arg(long, default_value = "1080")]
    pub viewport_height: u32,

    /// Session file written by login and reused by other scenarios
    #[arg(long, default_value = "auth/login.json")]
    pub storage_state: PathBuf,

    /// node_modules holding playwright and @playwright/test
    #[arg(long, env = "PLAYWRIGHT_NODE_MODULES", default_value = "node_modules")]
    pub node_modules: PathBuf,

    /// Actually drive the browser; without it the harness only lists what it would run
    #[arg(long, env = "QA_TODO_LIVE", value_parser = FalseyValueParser::new())]
    pub live: bool,

    /// Fail instead of skipping when Playwright is not installed
    #[arg(long)]
    pub require_browser: bool,

    /// Output directory for results
    #[arg(short, long, default_value = "test-results")]
    pub output: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

impl HarnessArgs {
    /// Scenarios to run, in run order with `login` first
    pub fn selected_scenarios(&self) -> E2eResult<Vec<Scenario>> {
        let mut scenarios: Vec<Scenario> = if self.scenario.is_empty() {
            Scenario::ALL.to_vec()
        } else {
            self.scenario
                .iter()
                .map(|name| name.parse())
                .collect::<E2eResult<_>>()?
        };

        if let Some(tag) = &self.tag {
            scenarios.retain(|s| s.has_tag(tag));
        }

        // login first so the others can pick up its session
        scenarios.sort_by_key(|s| Scenario::ALL.iter().position(|a| a == s));
        scenarios.dedup();
        Ok(scenarios)
    }

    pub fn viewport_mode(&self) -> ViewportMode {
        match self.viewport {
            Viewport::Fixed => ViewportMode::Fixed {
                width: self.viewport_width,
                height: self.viewport_height,
            },
            Viewport::Screen => ViewportMode::Screen,
        }
    }

    pub fn runner_config(&self) -> E2eResult<RunnerConfig> {
        let browser: Browser = self.browser.parse()?;

        Ok(RunnerConfig {
            target: TargetConfig {
                base_url: self.base_url.clone(),
                serve_command: self.serve_cmd.clone(),
                startup_timeout: Duration::from_secs(self.startup_timeout),
                ..Default::default()
            },
            playwright: PlaywrightConfig {
                base_url: self.base_url.clone(),
                browser,
                headless: !self.headed,
                viewport: self.viewport_mode(),
                node_modules: self.node_modules.clone(),
                artifacts_dir: self.output.join("artifacts"),
                ..Default::default()
            },
            context: ScenarioContext {
                storage_state: self.storage_state.clone(),
                credentials: CredentialSource::Env,
            },
            specs_dir: self
                .specs
                .clone()
                .unwrap_or_else(|| PathBuf::from("crates/e2e/specs")),
            output_dir: self.output.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> HarnessArgs {
        HarnessArgs::try_parse_from(std::iter::once("qa-todo-e2e").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_live_accepts_numeric_env_values() {
        std::env::set_var("QA_TODO_LIVE", "1");
        let on = HarnessArgs::try_parse_from(["qa-todo-e2e"]);
        std::env::set_var("QA_TODO_LIVE", "0");
        let off = HarnessArgs::try_parse_from(["qa-todo-e2e"]);
        std::env::set_var("QA_TODO_LIVE", "true");
        let word = HarnessArgs::try_parse_from(["qa-todo-e2e"]);
        std::env::remove_var("QA_TODO_LIVE");

        assert!(on.unwrap().live);
        assert!(!off.unwrap().live);
        assert!(word.unwrap().live);
    }

    #[test]
    fn test_live_flag() {
        assert!(parse(&["--live"]).live);
    }

    #[test]
    fn test_scenarios_run_login_first() {
        let args = parse(&["-s", "roll-ten-yahoo", "-s", "login", "-s", "login"]);
        assert_eq!(
            args.selected_scenarios().unwrap(),
            vec![Scenario::Login, Scenario::RollTenYahoo]
        );
    }

    #[test]
    fn test_tag_narrows_scenarios() {
        let args = parse(&["--tag", "todo"]);
        assert_eq!(
            args.selected_scenarios().unwrap(),
            vec![Scenario::AlphabeticalSort, Scenario::CompletedLast]
        );
    }

    #[test]
    fn test_unknown_scenario_is_rejected() {
        assert!(parse(&["-s", "nope"]).selected_scenarios().is_err());
    }

    #[test]
    fn test_runner_config_from_flags() {
        let args = parse(&[
            "--base-url",
            "http://127.0.0.1:5173/",
            "--browser",
            "webkit",
            "--headed",
            "--viewport",
            "screen",
            "-o",
            "out",
        ]);
        let config = args.runner_config().unwrap();
        assert_eq!(config.target.base_url, "http://127.0.0.1:5173/");
        assert_eq!(config.playwright.browser, Browser::Webkit);
        assert!(!config.playwright.headless);
        assert_eq!(config.playwright.viewport, ViewportMode::Screen);
        assert_eq!(config.playwright.artifacts_dir, PathBuf::from("out/artifacts"));
    }

    #[test]
    fn test_bad_browser_is_invalid_config() {
        let err = parse(&["--browser", "lynx"]).runner_config().unwrap_err();
        assert!(err.is_precondition());
    }
}
