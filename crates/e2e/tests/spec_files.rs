//! Checks for the YAML specs shipped with the crate

use std::path::PathBuf;

use qa_todo_e2e::playwright::Browser;
use qa_todo_e2e::script::{build_script, ScriptOptions};
use qa_todo_e2e::spec::{CaptureKind, SessionMode, TestSpec, TestStep, ViewportMode};

fn specs_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs")
}

/// Every shipped spec parses and has a unique name
#[test]
fn shipped_specs_load() {
    let specs = TestSpec::load_all(&specs_dir()).expect("specs should parse");
    assert!(!specs.is_empty());

    let mut names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), specs.len(), "duplicate spec names");

    for spec in &specs {
        assert!(!spec.steps.is_empty(), "{} has no steps", spec.name);
    }
}

/// The smoke spec reuses the saved session and only reads the page
#[test]
fn smoke_spec_is_read_only() {
    let spec = TestSpec::from_file(&specs_dir().join("smoke.yaml")).unwrap();
    assert_eq!(spec.name, "app-shell-smoke");
    assert!(spec.has_tag("smoke"));
    assert_eq!(spec.session, SessionMode::Reuse);
    assert!(spec.viewport.is_none());

    assert!(spec.steps.iter().all(|step| matches!(
        step,
        TestStep::Navigate { .. } | TestStep::Expect { .. } | TestStep::Capture { .. } | TestStep::Log { .. }
    )));
    assert!(spec.steps.iter().any(|step| matches!(
        step,
        TestStep::Capture { name, kind: CaptureKind::Count, .. } if name == "row_count"
    )));
}

/// Session files are only passed to the browser when given
#[test]
fn smoke_script_seeds_storage_state() {
    let spec = TestSpec::from_file(&specs_dir().join("smoke.yaml")).unwrap();
    let mut options = ScriptOptions {
        browser: Browser::Firefox,
        headless: true,
        base_url: "http://127.0.0.1:3000".to_string(),
        viewport: ViewportMode::default(),
        storage_state: None,
        failure_screenshot: None,
    };

    let script = build_script(&spec, &options);
    assert!(script.contains("firefox.launch"));
    assert!(!script.contains("storageState"));

    options.storage_state = Some(PathBuf::from("auth/login.json"));
    let script = build_script(&spec, &options);
    assert!(script.contains("storageState: \"auth/login.json\""));
}

#[test]
fn tag_filter_skips_other_specs() {
    let specs = TestSpec::load_all(&specs_dir()).unwrap();
    assert!(TestSpec::filter_by_tag(&specs, "no-such-tag").is_empty());
    assert!(!TestSpec::filter_by_tag(&specs, "smoke").is_empty());
}
