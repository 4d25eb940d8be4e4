//! The qa-todo scenarios, expressed as step plans
//!
//! Each scenario compiles to a [`TestSpec`] that runs in its own browser
//! context. `login` produces the saved session the others may reuse.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use icu_collator::{Collator, CollatorOptions};
use serde_json::json;
use tracing::warn;

use crate::config::{CredentialSource, EMAIL_VAR, PASSWORD_VAR};
use crate::error::{E2eError, E2eResult};
use crate::locator::Locator;
use crate::retry::RetryPolicy;
use crate::spec::{
    Assertion, CaptureCheck, CaptureKind, DrainStep, InputValue, LoadState, MockResponse,
    SessionMode, TestSpec, TestStep, WaitState,
};

pub const LOGIN_URL: &str = "https://qa-todo.ranger.net/";
pub const RANDOM_API_PATTERN: &str = "**/api/random";
pub const YAHOO_MESSAGE: &str = "Yahoo! You rolled 10!";

/// Labels added by the sort scenario, in insertion order
pub const SORT_LABELS: [&str; 4] = [
    "Prepare Lunch",
    "Complete Assessment",
    "Clean Home",
    "Grocery Shopping",
];

/// Index of the row the completion scenario marks done
pub const COMPLETED_INDEX: usize = 1;

/// Selectors for the todo page
pub mod todo_page {
    use crate::locator::Locator;

    pub const ROW: &str = r#"[data-type="todo"]"#;
    pub const ROW_LABEL: &str = r#"[data-type="todo"] .text-sm"#;

    pub fn input() -> Locator {
        Locator::placeholder("make coffee")
    }

    pub fn add_button() -> Locator {
        Locator::test_id("add-todo")
    }

    pub fn rows() -> Locator {
        Locator::css(ROW)
    }

    pub fn labels() -> Locator {
        Locator::css(ROW_LABEL)
    }

    pub fn label_with_text(text: &str) -> Locator {
        labels().has_text(text)
    }

    pub fn row(index: usize) -> Locator {
        rows().nth(index)
    }

    pub fn checkbox(row: Locator) -> Locator {
        row.locator(r#"input[type="checkbox"]"#)
    }

    pub fn label(row: Locator) -> Locator {
        row.locator(".text-sm")
    }

    pub fn dice_section() -> Locator {
        Locator::test_id("dice-roll")
    }

    pub fn roll_button() -> Locator {
        dice_section().locator(r#"button[type="submit"]"#)
    }

    pub fn heading() -> Locator {
        Locator::css("h1").first()
    }
}

fn collator() -> Option<Collator> {
    match Collator::try_new(&Default::default(), CollatorOptions::new()) {
        Ok(collator) => Some(collator),
        Err(e) => {
            warn!("Collation data unavailable ({}); sorting by case-folded text", e);
            None
        }
    }
}

fn compare(collator: Option<&Collator>, a: &str, b: &str) -> Ordering {
    match collator {
        Some(collator) => collator.compare(a, b),
        None => a
            .to_lowercase()
            .cmp(&b.to_lowercase())
            .then_with(|| b.cmp(a)),
    }
}

/// Root-locale collation, as `localeCompare` does it: letters first, then
/// accents, then case with lowercase first
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    compare(collator().as_ref(), a, b)
}

/// Sorted copy of `labels`, the order the app renders after a reload
pub fn locale_sorted<S: AsRef<str>>(labels: &[S]) -> Vec<String> {
    let collator = collator();
    let mut sorted: Vec<String> = labels.iter().map(|s| s.as_ref().to_string()).collect();
    sorted.sort_by(|a, b| compare(collator.as_ref(), a, b));
    sorted
}

/// Inputs shared by every scenario
#[derive(Debug, Clone)]
pub struct ScenarioContext {
    /// Session file written by `login` and read by the others
    pub storage_state: PathBuf,
    pub credentials: CredentialSource,
}

impl Default for ScenarioContext {
    fn default() -> Self {
        Self {
            storage_state: PathBuf::from("auth/login.json"),
            credentials: CredentialSource::Env,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scenario {
    Login,
    AlphabeticalSort,
    CompletedLast,
    RollTenYahoo,
}

impl Scenario {
    /// Run order: `login` first so its session exists for the rest
    pub const ALL: [Scenario; 4] = [
        Scenario::Login,
        Scenario::AlphabeticalSort,
        Scenario::CompletedLast,
        Scenario::RollTenYahoo,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Login => "login",
            Scenario::AlphabeticalSort => "alphabetical-sort",
            Scenario::CompletedLast => "completed-last",
            Scenario::RollTenYahoo => "roll-ten-yahoo",
        }
    }

    pub fn tags(&self) -> &'static [&'static str] {
        match self {
            Scenario::Login => &["auth"],
            Scenario::AlphabeticalSort | Scenario::CompletedLast => &["todo"],
            Scenario::RollTenYahoo => &["dice", "mocked"],
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|t| *t == tag)
    }

    /// Compile this scenario; fails before touching the browser if inputs are missing
    pub fn build(&self, ctx: &ScenarioContext) -> E2eResult<TestSpec> {
        match self {
            Scenario::Login => login(ctx),
            Scenario::AlphabeticalSort => Ok(alphabetical_sort()),
            Scenario::CompletedLast => Ok(completed_last()),
            Scenario::RollTenYahoo => Ok(roll_ten_yahoo()),
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .into_iter()
            .find(|sc| sc.name() == s)
            .ok_or_else(|| E2eError::UnknownScenario(s.to_string()))
    }
}

fn base_spec(scenario: Scenario, description: &str, steps: Vec<TestStep>) -> TestSpec {
    TestSpec {
        name: scenario.name().to_string(),
        description: description.to_string(),
        tags: scenario.tags().iter().map(|t| t.to_string()).collect(),
        viewport: None,
        session: SessionMode::Reuse,
        steps,
        secrets: Default::default(),
    }
}

fn open_home() -> TestStep {
    TestStep::Navigate {
        url: "/".to_string(),
        wait_until: Some(LoadState::NetworkIdle),
    }
}

fn reload() -> TestStep {
    TestStep::Reload {
        wait_until: Some(LoadState::NetworkIdle),
    }
}

fn expect(locator: Locator, assertion: Assertion, timeout_ms: Option<u64>) -> TestStep {
    TestStep::Expect {
        locator,
        assertion,
        timeout_ms,
    }
}

fn capture(name: &str, locator: Locator, kind: CaptureKind) -> TestStep {
    TestStep::Capture {
        name: name.to_string(),
        locator,
        kind,
    }
}

fn check(name: &str, check: CaptureCheck) -> TestStep {
    TestStep::CheckCapture {
        name: name.to_string(),
        check,
        precondition: false,
    }
}

fn require(name: &str, check: CaptureCheck) -> TestStep {
    TestStep::CheckCapture {
        name: name.to_string(),
        check,
        precondition: true,
    }
}

/// Steps that add one item and wait for it to render before returning
pub fn add_todo_steps(text: &str) -> Vec<TestStep> {
    vec![
        TestStep::Fill {
            locator: todo_page::input(),
            value: InputValue::from(text),
            clear_first: true,
        },
        TestStep::Click {
            locator: todo_page::add_button(),
            timeout_ms: None,
        },
        expect(todo_page::label_with_text(text), Assertion::Visible, Some(5000)),
        TestStep::Log {
            message: format!("Added TODO \"{}\"", text),
        },
    ]
}

/// Items render in insertion order, then sorted alphabetically after a reload
pub fn alphabetical_sort() -> TestSpec {
    alphabetical_sort_with(&SORT_LABELS)
}

pub fn alphabetical_sort_with<S: AsRef<str>>(labels: &[S]) -> TestSpec {
    let inserted: Vec<String> = labels.iter().map(|s| s.as_ref().to_string()).collect();
    let sorted = locale_sorted(&inserted);

    let mut steps = vec![open_home()];
    for label in &inserted {
        steps.extend(add_todo_steps(label));
    }
    steps.extend([
        capture("initial_order", todo_page::labels(), CaptureKind::AllTexts),
        check("initial_order", CaptureCheck::Equals(json!(inserted))),
        reload(),
        expect(todo_page::labels().first(), Assertion::Visible, Some(5000)),
        capture("reloaded_order", todo_page::labels(), CaptureKind::AllTexts),
        check("reloaded_order", CaptureCheck::Equals(json!(sorted))),
        check("reloaded_order", CaptureCheck::HasLength(inserted.len())),
        // nothing changed since, so a second reload must not reorder
        reload(),
        expect(todo_page::labels().first(), Assertion::Visible, Some(5000)),
        capture("second_reload_order", todo_page::labels(), CaptureKind::AllTexts),
        check("second_reload_order", CaptureCheck::Equals(json!(sorted))),
    ]);

    base_spec(
        Scenario::AlphabeticalSort,
        "Todos are initially shown in the order added but alphabetically sorted on page reload",
        steps,
    )
}

/// A completed item sorts after every uncompleted one; then the list is emptied
pub fn completed_last() -> TestSpec {
    let target = todo_page::row(COMPLETED_INDEX);
    let checkbox = todo_page::checkbox(target.clone());

    let steps = vec![
        open_home(),
        // an empty list must surface as the row-count precondition, not a timeout
        TestStep::Wait {
            locator: todo_page::rows().first(),
            state: WaitState::Visible,
            timeout_ms: 6000,
            optional: true,
        },
        capture("row_count", todo_page::rows(), CaptureKind::Count),
        require("row_count", CaptureCheck::AtLeast(COMPLETED_INDEX + 1)),
        expect(todo_page::rows().first(), Assertion::Visible, None),
        capture("initial_labels", todo_page::labels(), CaptureKind::AllTexts),
        capture("completed_label", todo_page::label(target), CaptureKind::Text),
        require("completed_label", CaptureCheck::NonEmpty),
        expect(checkbox.clone(), Assertion::Visible, Some(5000)),
        expect(checkbox.clone(), Assertion::Enabled, None),
        expect(checkbox.clone(), Assertion::Unchecked, None),
        TestStep::Click {
            locator: checkbox.clone(),
            timeout_ms: None,
        },
        expect(checkbox, Assertion::Checked, None),
        reload(),
        expect(todo_page::labels().first(), Assertion::Visible, Some(6000)),
        capture("reloaded_labels", todo_page::labels(), CaptureKind::AllTexts),
        check("reloaded_labels", CaptureCheck::ContainsCapture("completed_label".into())),
        check("reloaded_labels", CaptureCheck::LastEqualsCapture("completed_label".into())),
        check("reloaded_labels", CaptureCheck::AtLeast(COMPLETED_INDEX + 1)),
        TestStep::Drain(cleanup()),
        expect(todo_page::rows(), Assertion::HasCount(0), Some(2000)),
    ];

    base_spec(
        Scenario::CompletedLast,
        "Todos that are marked as done are sorted after all uncompleted todos",
        steps,
    )
}

/// Delete rows through their remove control until the list is empty
pub fn cleanup() -> DrainStep {
    DrainStep {
        items: todo_page::rows(),
        remove_control: "button".to_string(),
        visible_timeout_ms: 2000,
        detach_timeout_ms: 2000,
        max_removals: 200,
        retry: RetryPolicy::default(),
        capture: Some("removed".to_string()),
    }
}

/// The mocked `/api/random` payload for a roll of ten
pub fn ten_roll() -> MockResponse {
    MockResponse::json(json!({ "ten": true }))
}

/// Rolling a 10 shows the Yahoo message
pub fn roll_ten_yahoo() -> TestSpec {
    let steps = vec![
        TestStep::Route {
            pattern: RANDOM_API_PATTERN.to_string(),
            response: ten_roll(),
        },
        open_home(),
        expect(todo_page::dice_section(), Assertion::Visible, Some(6000)),
        TestStep::ScrollIntoView {
            locator: todo_page::roll_button(),
        },
        expect(todo_page::roll_button(), Assertion::Visible, Some(5000)),
        expect(todo_page::roll_button(), Assertion::Enabled, None),
        TestStep::ClickExpectingResponse {
            locator: todo_page::roll_button(),
            pattern: RANDOM_API_PATTERN.to_string(),
            timeout_ms: 6000,
        },
        expect(
            todo_page::dice_section(),
            Assertion::ContainsText(YAHOO_MESSAGE.to_string()),
            Some(6000),
        ),
        capture("result_text", todo_page::dice_section(), CaptureKind::Text),
        check("result_text", CaptureCheck::Contains("Yahoo!".into())),
        check("result_text", CaptureCheck::Contains("10".into())),
    ];

    base_spec(
        Scenario::RollTenYahoo,
        "When you roll a 10 you get a \"Yahoo!\" message",
        steps,
    )
}

/// Sign in with real credentials and save the session for reuse
pub fn login(ctx: &ScenarioContext) -> E2eResult<TestSpec> {
    let credentials = ctx.credentials.resolve()?;

    let steps = vec![
        TestStep::Navigate {
            url: LOGIN_URL.to_string(),
            wait_until: None,
        },
        TestStep::Fill {
            locator: Locator::placeholder("Your email address"),
            value: InputValue::env(EMAIL_VAR),
            clear_first: false,
        },
        TestStep::Fill {
            locator: Locator::placeholder("Your password"),
            value: InputValue::env(PASSWORD_VAR),
            clear_first: false,
        },
        TestStep::Click {
            locator: Locator::role("button", "Sign in"),
            timeout_ms: None,
        },
        expect(
            todo_page::heading(),
            Assertion::ContainsText("Todo List.".to_string()),
            None,
        ),
        TestStep::SaveStorageState {
            path: ctx.storage_state.clone(),
        },
    ];

    let mut spec = base_spec(Scenario::Login, "Login the TODO app", steps);
    spec.session = SessionMode::Fresh;
    spec.secrets = credentials.to_secrets();
    Ok(spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_expected_sorted_order() {
        assert_eq!(
            locale_sorted(&SORT_LABELS),
            vec!["Clean Home", "Complete Assessment", "Grocery Shopping", "Prepare Lunch"]
        );
    }

    #[test]
    fn test_accented_labels_sort_with_their_base_letter() {
        assert_eq!(
            locale_sorted(&["zebra", "éclair", "apple"]),
            vec!["apple", "éclair", "zebra"]
        );
        assert_eq!(
            locale_sorted(&["Zumba Class", "Éclair Baking", "apple picking"]),
            vec!["apple picking", "Éclair Baking", "Zumba Class"]
        );
    }

    #[test]
    fn test_locale_cmp_ignores_case() {
        assert_eq!(locale_sorted(&["banana", "Apple", "cherry"]), vec!["Apple", "banana", "cherry"]);
        assert_eq!(locale_cmp("apple", "Apple"), Ordering::Less);
    }

    #[test]
    fn test_scenario_names_round_trip() {
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), scenario);
        }
        assert!("nope".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_add_todo_waits_before_next_insert() {
        let steps = add_todo_steps("Clean Home");
        assert!(matches!(steps[0], TestStep::Fill { clear_first: true, .. }));
        assert!(matches!(steps[1], TestStep::Click { .. }));
        assert_eq!(
            steps[2],
            TestStep::Expect {
                locator: todo_page::label_with_text("Clean Home"),
                assertion: Assertion::Visible,
                timeout_ms: Some(5000),
            }
        );
    }

    #[test]
    fn test_login_without_credentials_fails_early() {
        let ctx = ScenarioContext {
            credentials: CredentialSource::Vars(BTreeMap::new()),
            ..Default::default()
        };
        let err = Scenario::Login.build(&ctx).unwrap_err();
        assert!(matches!(err, E2eError::MissingConfig { ref key } if key == "EMAIL"));
    }

    #[test]
    fn test_login_passes_credentials_as_secrets() {
        let mut vars = BTreeMap::new();
        vars.insert("EMAIL".to_string(), "qa@example.com".to_string());
        vars.insert("PASSWORD".to_string(), "hunter2".to_string());
        let ctx = ScenarioContext {
            credentials: CredentialSource::Vars(vars),
            ..Default::default()
        };

        let spec = Scenario::Login.build(&ctx).unwrap();
        assert_eq!(spec.session, SessionMode::Fresh);
        assert!(spec.secrets.contains("EMAIL"));
        assert!(spec.secrets.contains("PASSWORD"));
        let plan = serde_json::to_string(&spec.steps).unwrap();
        assert!(!plan.contains("hunter2"));
        assert_eq!(
            spec.steps.last(),
            Some(&TestStep::SaveStorageState {
                path: PathBuf::from("auth/login.json")
            })
        );
    }
}
