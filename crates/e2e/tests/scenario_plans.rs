//! Scenario plan tests
//!
//! Checks what each scenario compiles to without launching a browser.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::json;
use test_case::test_case;

use qa_todo_e2e::playwright::Browser;
use qa_todo_e2e::scenarios::{
    self, locale_sorted, todo_page, Scenario, ScenarioContext, RANDOM_API_PATTERN, SORT_LABELS,
    YAHOO_MESSAGE,
};
use qa_todo_e2e::script::{build_script, ScriptOptions};
use qa_todo_e2e::spec::{
    Assertion, CaptureCheck, InputValue, SessionMode, TestSpec, TestStep, ViewportMode,
};
use qa_todo_e2e::CredentialSource;

const SORTED: [&str; 4] = [
    "Clean Home",
    "Complete Assessment",
    "Grocery Shopping",
    "Prepare Lunch",
];

fn options() -> ScriptOptions {
    ScriptOptions {
        browser: Browser::Chromium,
        headless: true,
        base_url: "http://127.0.0.1:3000".to_string(),
        viewport: ViewportMode::default(),
        storage_state: None,
        failure_screenshot: None,
    }
}

fn checks<'a>(spec: &'a TestSpec, capture: &str) -> Vec<&'a CaptureCheck> {
    spec.steps
        .iter()
        .filter_map(|step| match step {
            TestStep::CheckCapture { name, check, .. } if name == capture => Some(check),
            _ => None,
        })
        .collect()
}

fn position(spec: &TestSpec, pred: impl Fn(&TestStep) -> bool) -> usize {
    spec.steps
        .iter()
        .position(pred)
        .expect("step should be present")
}

#[test_case(["Prepare Lunch", "Complete Assessment", "Clean Home", "Grocery Shopping"] ; "spec order")]
#[test_case(["Grocery Shopping", "Prepare Lunch", "Clean Home", "Complete Assessment"] ; "shuffled")]
#[test_case(["Prepare Lunch", "Grocery Shopping", "Complete Assessment", "Clean Home"] ; "reversed")]
#[test_case(["Clean Home", "Complete Assessment", "Grocery Shopping", "Prepare Lunch"] ; "already sorted")]
fn sorted_order_is_independent_of_insertion(labels: [&str; 4]) {
    assert_eq!(locale_sorted(&labels), SORTED);

    let spec = scenarios::alphabetical_sort_with(&labels);
    assert_eq!(
        checks(&spec, "initial_order"),
        vec![&CaptureCheck::Equals(json!(labels))]
    );
    assert_eq!(
        checks(&spec, "reloaded_order"),
        vec![&CaptureCheck::Equals(json!(SORTED)), &CaptureCheck::HasLength(4)]
    );
    assert_eq!(
        checks(&spec, "second_reload_order"),
        vec![&CaptureCheck::Equals(json!(SORTED))]
    );
}

#[test]
fn second_reload_keeps_the_sorted_order() {
    let spec = scenarios::alphabetical_sort();

    let reloads: Vec<usize> = spec
        .steps
        .iter()
        .enumerate()
        .filter(|(_, s)| matches!(s, TestStep::Reload { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(reloads.len(), 2);

    let first = position(&spec, |s| matches!(s, TestStep::Capture { name, .. } if name == "reloaded_order"));
    let second = position(&spec, |s| matches!(s, TestStep::Capture { name, .. } if name == "second_reload_order"));
    assert!(reloads[0] < first && first < reloads[1] && reloads[1] < second);

    // nothing mutates the list between the two reloads
    assert!(spec.steps[reloads[0]..reloads[1]]
        .iter()
        .all(|s| !matches!(s, TestStep::Fill { .. } | TestStep::Click { .. } | TestStep::Drain(_))));

    let check = position(&spec, |s| matches!(s, TestStep::CheckCapture { name, .. } if name == "second_reload_order"));
    assert!(check > second);
}

#[test]
fn accented_labels_get_locale_order() {
    let spec = scenarios::alphabetical_sort_with(&["zebra", "éclair", "apple"]);
    assert_eq!(
        checks(&spec, "reloaded_order")[0],
        &CaptureCheck::Equals(json!(["apple", "éclair", "zebra"]))
    );
}

#[test]
fn alphabetical_sort_inserts_sequentially() {
    let spec = scenarios::alphabetical_sort();
    assert_eq!(spec.name, "alphabetical-sort");

    // every insert waits for its own label before the next fill
    let mut last_wait = 0;
    for label in SORT_LABELS {
        let fill = position(&spec, |s| {
            matches!(s, TestStep::Fill { value, .. } if *value == InputValue::from(label))
        });
        let wait = position(&spec, |s| {
            matches!(s, TestStep::Expect { locator, assertion: Assertion::Visible, timeout_ms: Some(5000) }
                if *locator == todo_page::label_with_text(label))
        });
        assert!(fill > last_wait, "fill for {label} should follow the previous wait");
        assert!(wait > fill);
        last_wait = wait;
    }

    let reload = position(&spec, |s| matches!(s, TestStep::Reload { .. }));
    let capture = position(&spec, |s| matches!(s, TestStep::Capture { name, .. } if name == "reloaded_order"));
    assert!(last_wait < reload && reload < capture);
}

#[test]
fn completed_last_checks_precondition_and_position() {
    let spec = scenarios::completed_last();

    let precondition = position(&spec, |s| matches!(
        s,
        TestStep::CheckCapture { name, check: CaptureCheck::AtLeast(2), precondition: true }
            if name == "row_count"
    ));

    // an empty list reaches the precondition instead of timing out first
    let wait = position(&spec, |s| matches!(s, TestStep::Wait { optional: true, timeout_ms: 6000, .. }));
    let count = position(&spec, |s| matches!(s, TestStep::Capture { name, .. } if name == "row_count"));
    assert!(wait < count && count < precondition);
    assert!(spec.steps[..precondition]
        .iter()
        .all(|s| !matches!(s, TestStep::Expect { .. } | TestStep::Wait { optional: false, .. })));

    // the click is bracketed by unchecked / checked assertions
    let unchecked = position(&spec, |s| matches!(s, TestStep::Expect { assertion: Assertion::Unchecked, .. }));
    let click = position(&spec, |s| matches!(s, TestStep::Click { .. }));
    let checked = position(&spec, |s| matches!(s, TestStep::Expect { assertion: Assertion::Checked, .. }));
    assert!(unchecked < click && click < checked);

    assert!(checks(&spec, "reloaded_labels")
        .contains(&&CaptureCheck::LastEqualsCapture("completed_label".into())));

    // cleanup runs last and must leave nothing behind
    let drain = position(&spec, |s| matches!(s, TestStep::Drain(_)));
    assert_eq!(drain, spec.steps.len() - 2);
    assert!(matches!(
        spec.steps.last(),
        Some(TestStep::Expect { assertion: Assertion::HasCount(0), .. })
    ));
}

#[test]
fn cleanup_is_bounded() {
    let drain = scenarios::cleanup();
    assert!(drain.max_removals > 0);
    assert_eq!(drain.detach_timeout_ms, 2000);
    assert_eq!(drain.retry.delays().len(), drain.retry.max_retries as usize);
    assert!(drain.retry.total_backoff().as_millis() < 2000);
}

#[test]
fn roll_ten_routes_before_navigation() {
    let spec = scenarios::roll_ten_yahoo();

    let route = position(&spec, |s| matches!(s, TestStep::Route { .. }));
    let navigate = position(&spec, |s| matches!(s, TestStep::Navigate { .. }));
    let click = position(&spec, |s| matches!(s, TestStep::ClickExpectingResponse { .. }));
    assert!(route < navigate && navigate < click);

    match &spec.steps[route] {
        TestStep::Route { pattern, response } => {
            assert_eq!(pattern, RANDOM_API_PATTERN);
            assert_eq!(response.status, 200);
            assert_eq!(response.body.to_string(), r#"{"ten":true}"#);
        }
        other => panic!("unexpected step: {other:?}"),
    }

    assert_eq!(
        checks(&spec, "result_text"),
        vec![
            &CaptureCheck::Contains("Yahoo!".into()),
            &CaptureCheck::Contains("10".into())
        ]
    );
    assert!(YAHOO_MESSAGE.contains("Yahoo!") && YAHOO_MESSAGE.contains("10"));
}

#[test]
fn every_scenario_compiles_to_a_script() {
    let mut vars = BTreeMap::new();
    vars.insert("EMAIL".to_string(), "qa@example.com".to_string());
    vars.insert("PASSWORD".to_string(), "s3cret-value".to_string());
    let ctx = ScenarioContext {
        storage_state: PathBuf::from("auth/login.json"),
        credentials: CredentialSource::Vars(vars),
    };

    for scenario in Scenario::ALL {
        let spec = scenario.build(&ctx).unwrap();
        let script = build_script(&spec, &options());

        assert_eq!(
            script.matches("finish();").count(),
            spec.steps.len(),
            "{scenario} should report every step"
        );
        assert!(!script.contains("s3cret-value"), "{scenario} leaked a credential");
    }
}

#[test]
fn login_is_fresh_and_others_reuse_session() {
    let mut vars = BTreeMap::new();
    vars.insert("EMAIL".to_string(), "qa@example.com".to_string());
    vars.insert("PASSWORD".to_string(), "pw".to_string());
    let ctx = ScenarioContext {
        credentials: CredentialSource::Vars(vars),
        ..Default::default()
    };

    for scenario in Scenario::ALL {
        let spec = scenario.build(&ctx).unwrap();
        let expected = if scenario == Scenario::Login {
            SessionMode::Fresh
        } else {
            SessionMode::Reuse
        };
        assert_eq!(spec.session, expected, "{scenario}");
    }
}

#[test_case(&[] ; "both missing")]
#[test_case(&[("EMAIL", "qa@example.com")] ; "password missing")]
#[test_case(&[("PASSWORD", "pw")] ; "email missing")]
fn login_aborts_without_credentials(pairs: &[(&str, &str)]) {
    let vars = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let ctx = ScenarioContext {
        credentials: CredentialSource::Vars(vars),
        ..Default::default()
    };
    let err = Scenario::Login.build(&ctx).unwrap_err();
    assert!(err.is_precondition(), "unexpected error: {err}");
}
