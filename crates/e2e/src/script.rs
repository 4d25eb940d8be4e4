//! Compiles a [`TestSpec`] into a standalone Playwright program
//!
//! The program reports progress as one JSON object per stdout line
//! (see [`crate::playwright::ScriptEvent`]).

use std::path::PathBuf;

use crate::locator::Locator;
use crate::playwright::Browser;
use crate::spec::{
    Assertion, CaptureCheck, CaptureKind, DrainStep, InputValue, LoadState, TestSpec, TestStep,
    ViewportMode,
};

/// Everything about the browser session that is not a step
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    pub browser: Browser,
    pub headless: bool,
    pub base_url: String,
    pub viewport: ViewportMode,
    /// Existing storage state to seed the context with
    pub storage_state: Option<PathBuf>,
    /// Where to drop a screenshot if a step fails
    pub failure_screenshot: Option<PathBuf>,
}

/// Quote a string as a JavaScript literal
pub fn js_string(s: &str) -> String {
    // JSON string syntax is a subset of JS string syntax
    serde_json::Value::String(s.to_string()).to_string()
}

const PRELUDE: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const { expect } = require('@playwright/test');

const emit = (event) => console.log(JSON.stringify(event));

class StepError extends Error {
  constructor(kind, message) {
    super(message);
    this.kind = kind;
  }
}

const fail = (kind, message) => {
  throw new StepError(kind, message);
};

const classify = (error) => {
  if (error instanceof StepError) return error.kind;
  if (error && error.name === 'TimeoutError') return 'timeout';
  if (error && error.matcherResult) return 'assertion';
  return 'script';
};

const requireEnv = (key) => {
  const value = process.env[key];
  if (!value) fail('precondition', `${key} is not set`);
  return value;
};

const show = (value) => JSON.stringify(value);
const same = (a, b) => JSON.stringify(a) === JSON.stringify(b);
const sizeOf = (value) =>
  Array.isArray(value) || typeof value === 'string' ? value.length : value;

const captured = (captures, name) => {
  if (!(name in captures)) fail('script', `capture '${name}' was never recorded`);
  return captures[name];
};

const includes = (kind, name, value, needle) => {
  if (value === null || typeof value.includes !== 'function') {
    fail(kind, `${name}: cannot search ${show(value)} for ${show(needle)}`);
  }
  if (!value.includes(needle)) fail(kind, `${name}: expected ${show(value)} to contain ${show(needle)}`);
};

const checkCapture = (captures, name, check, arg, kind) => {
  const value = captured(captures, name);
  switch (check) {
    case 'equals':
      if (!same(value, arg)) fail(kind, `${name}: expected ${show(arg)}, got ${show(value)}`);
      break;
    case 'non_empty':
      if (value === null || value === undefined || sizeOf(value) === 0) {
        fail(kind, `${name}: expected a non-empty value, got ${show(value)}`);
      }
      break;
    case 'at_least':
      if (!(sizeOf(value) >= arg)) fail(kind, `${name}: expected at least ${arg}, got ${show(value)}`);
      break;
    case 'has_length':
      if (sizeOf(value) !== arg) fail(kind, `${name}: expected length ${arg}, got ${show(value)}`);
      break;
    case 'contains':
      includes(kind, name, value, arg);
      break;
    case 'contains_capture':
      includes(kind, name, value, captured(captures, arg));
      break;
    case 'last_equals_capture': {
      const expected = captured(captures, arg);
      const last = Array.isArray(value) && value.length > 0 ? value[value.length - 1] : undefined;
      if (!same(last, expected)) {
        fail(kind, `${name}: expected last element ${show(expected)}, got ${show(last)} in ${show(value)}`);
      }
      break;
    }
    default:
      fail('script', `unknown check '${check}'`);
  }
};
"#;

/// Build the full program for a spec
pub fn build_script(spec: &TestSpec, options: &ScriptOptions) -> String {
    let mut script = String::from(PRELUDE);

    let mut context_opts = vec![format!("baseURL: {}", js_string(&options.base_url))];
    if let Some(state) = &options.storage_state {
        context_opts.push(format!("storageState: {}", js_string(&state.to_string_lossy())));
    }

    script.push_str(&format!(
        r#"
(async () => {{
  const browser = await {browser}.launch({{ headless: {headless} }});
  const context = await browser.newContext({{ {context_opts} }});
  const page = await context.newPage();
  const captures = {{}};
  let current = null;
  let started = Date.now();
  const begin = (index) => {{
    current = index;
    started = Date.now();
  }};
  const finish = () => emit({{ event: 'step', index: current, duration_ms: Date.now() - started }});

  try {{
{viewport}
"#,
        browser = options.browser.as_str(),
        headless = options.headless,
        context_opts = context_opts.join(", "),
        viewport = viewport_to_js(options.viewport),
    ));

    for (i, step) in spec.steps.iter().enumerate() {
        script.push_str(&format!(
            "\n    // Step {}: {}\n",
            i + 1,
            step.name().replace(['\n', '\r'], " ")
        ));
        script.push_str(&format!("    begin({});\n    {{\n", i));
        script.push_str(&step_to_js(step));
        script.push_str("\n    }\n    finish();\n");
    }

    let screenshot = options
        .failure_screenshot
        .as_ref()
        .map(|path| {
            format!(
                "\n    await page.screenshot({{ path: {}, fullPage: true }}).catch(() => {{}});",
                js_string(&path.to_string_lossy())
            )
        })
        .unwrap_or_default();

    script.push_str(&format!(
        r#"
    emit({{ event: 'done' }});
  }} catch (error) {{
    emit({{
      event: 'failed',
      index: current,
      kind: classify(error),
      error: String((error && error.message) || error),
    }});{screenshot}
    process.exitCode = 1;
  }} finally {{
    await context.close().catch(() => {{}});
    await browser.close();
  }}
}})();
"#,
        screenshot = screenshot,
    ));

    script
}

fn viewport_to_js(viewport: ViewportMode) -> String {
    match viewport {
        ViewportMode::Fixed { width, height } => format!(
            "    await page.setViewportSize({{ width: {}, height: {} }});",
            width, height
        ),
        ViewportMode::Screen => r#"    const screenSize = await page.evaluate(() => ({
      width: window.screen.width,
      height: window.screen.height,
    }));
    await page.setViewportSize(screenSize);"#
            .to_string(),
    }
}

fn timeout_opts(timeout_ms: Option<u64>) -> String {
    timeout_ms
        .map(|t| format!("{{ timeout: {} }}", t))
        .unwrap_or_default()
}

fn load_state_js(wait_until: Option<LoadState>) -> String {
    wait_until
        .map(|state| format!("\n      await page.waitForLoadState({});", js_string(state.as_str())))
        .unwrap_or_default()
}

fn input_to_js(value: &InputValue) -> String {
    match value {
        InputValue::Literal(text) => js_string(text),
        InputValue::Env { env } => format!("requireEnv({})", js_string(env)),
    }
}

fn page(locator: &Locator) -> String {
    locator.to_js("page")
}

/// Convert a step to JavaScript code
pub fn step_to_js(step: &TestStep) -> String {
    match step {
        TestStep::Navigate { url, wait_until } => {
            format!("      await page.goto({});{}", js_string(url), load_state_js(*wait_until))
        }
        TestStep::Reload { wait_until } => {
            format!("      await page.reload();{}", load_state_js(*wait_until))
        }
        TestStep::WaitForLoadState { state } => {
            format!("      await page.waitForLoadState({});", js_string(state.as_str()))
        }
        TestStep::Fill { locator, value, clear_first } => {
            let mut js = format!("      const input = {};\n", page(locator));
            if *clear_first {
                js.push_str("      await input.clear();\n");
            }
            js.push_str(&format!("      await input.fill({});", input_to_js(value)));
            js
        }
        TestStep::Click { locator, timeout_ms } => {
            format!("      await {}.click({});", page(locator), timeout_opts(*timeout_ms))
        }
        TestStep::ScrollIntoView { locator } => {
            format!("      await {}.scrollIntoViewIfNeeded();", page(locator))
        }
        TestStep::Wait { locator, state, timeout_ms, optional: false } => format!(
            "      await {}.waitFor({{ state: {}, timeout: {} }});",
            page(locator),
            js_string(state.as_str()),
            timeout_ms
        ),
        TestStep::Wait { locator, state, timeout_ms, optional: true } => format!(
            r#"      await {target}.waitFor({{ state: {state}, timeout: {timeout} }}).catch((error) => {{
        if (classify(error) !== 'timeout') throw error;
        emit({{ event: 'log', level: 'debug', message: `no match for {label} within {timeout}ms` }});
      }});"#,
            target = page(locator),
            state = js_string(state.as_str()),
            timeout = timeout_ms,
            label = locator.to_string().replace(['`', '\\', '$'], "_"),
        ),
        TestStep::Expect { locator, assertion, timeout_ms } => {
            let target = format!("expect({})", page(locator));
            let opts = timeout_opts(*timeout_ms);
            let with_arg = |arg: String| {
                if opts.is_empty() {
                    arg
                } else {
                    format!("{}, {}", arg, opts)
                }
            };
            let matcher = match assertion {
                Assertion::Visible => format!("toBeVisible({})", opts),
                Assertion::Hidden => format!("toBeHidden({})", opts),
                Assertion::Enabled => format!("toBeEnabled({})", opts),
                Assertion::Checked => format!("toBeChecked({})", opts),
                Assertion::Unchecked => format!("not.toBeChecked({})", opts),
                Assertion::ContainsText(text) => format!("toContainText({})", with_arg(js_string(text))),
                Assertion::HasCount(n) => format!("toHaveCount({})", with_arg(n.to_string())),
            };
            format!("      await {}.{};", target, matcher)
        }
        TestStep::Capture { name, locator, kind } => {
            let read = match kind {
                CaptureKind::AllTexts => format!(
                    "(await {}.allTextContents()).map((t) => t.trim())",
                    page(locator)
                ),
                CaptureKind::Text => format!("((await {}.textContent()) ?? '').trim()", page(locator)),
                CaptureKind::Count => format!("await {}.count()", page(locator)),
            };
            format!(
                "      const value = {read};\n      captures[{name}] = value;\n      emit({{ event: 'capture', name: {name}, value }});",
                read = read,
                name = js_string(name)
            )
        }
        TestStep::CheckCapture { name, check, precondition } => {
            let kind = if *precondition { "precondition" } else { "assertion" };
            let (check_name, arg) = check_to_js(check);
            format!(
                "      checkCapture(captures, {}, {}, {}, {});",
                js_string(name),
                js_string(check_name),
                arg,
                js_string(kind)
            )
        }
        TestStep::Route { pattern, response } => format!(
            r#"      await page.route({pattern}, async (route) => {{
        emit({{ event: 'log', level: 'info', message: `intercepted ${{route.request().url()}}` }});
        await route.fulfill({{
          status: {status},
          contentType: {content_type},
          body: {body},
        }});
      }});"#,
            pattern = js_string(pattern),
            status = response.status,
            content_type = js_string(&response.content_type),
            body = js_string(&response.body.to_string()),
        ),
        TestStep::ClickExpectingResponse { locator, pattern, timeout_ms } => format!(
            r#"      const pending = page
        .waitForResponse({pattern}, {{ timeout: {timeout} }})
        .then((response) => ({{ response }}), (error) => ({{ error }}));
      await {target}.click();
      const outcome = await pending;
      if (outcome.error) {{
        fail('network', `no response matching ${{{pattern}}} within {timeout}ms: ${{outcome.error.message}}`);
      }}
      emit({{ event: 'log', level: 'info', message: `response ${{outcome.response.status()}} from ${{outcome.response.url()}}` }});"#,
            pattern = js_string(pattern),
            timeout = timeout_ms,
            target = page(locator),
        ),
        TestStep::Drain(drain) => drain_to_js(drain),
        TestStep::SaveStorageState { path } => format!(
            "      await context.storageState({{ path: {} }});",
            js_string(&path.to_string_lossy())
        ),
        TestStep::Sleep { ms } => format!("      await page.waitForTimeout({});", ms),
        TestStep::Log { message } => format!(
            "      emit({{ event: 'log', level: 'info', message: {} }});",
            js_string(message)
        ),
    }
}

fn check_to_js(check: &CaptureCheck) -> (&'static str, String) {
    match check {
        CaptureCheck::Equals(value) => ("equals", value.to_string()),
        CaptureCheck::NonEmpty => ("non_empty", "null".to_string()),
        CaptureCheck::AtLeast(n) => ("at_least", n.to_string()),
        CaptureCheck::HasLength(n) => ("has_length", n.to_string()),
        CaptureCheck::Contains(text) => ("contains", js_string(text)),
        CaptureCheck::ContainsCapture(other) => ("contains_capture", js_string(other)),
        CaptureCheck::LastEqualsCapture(other) => ("last_equals_capture", js_string(other)),
    }
}

fn drain_to_js(drain: &DrainStep) -> String {
    let delays: Vec<String> = drain
        .retry
        .delays()
        .iter()
        .map(|d| d.as_millis().to_string())
        .collect();
    let capture = drain
        .capture
        .as_ref()
        .map(|name| {
            format!(
                "\n      captures[{name}] = removed;\n      emit({{ event: 'capture', name: {name}, value: removed }});",
                name = js_string(name)
            )
        })
        .unwrap_or_default();

    format!(
        r#"      const items = {items};
      const delays = [{delays}];
      let removed = 0;
      while ((await items.count()) > 0) {{
        if (removed >= {max_removals}) {{
          fail('retry_exhausted', `list still has rows after {max_removals} removals`);
        }}
        const before = await items.count();
        const row = items.first();
        const control = row.locator({control});
        await expect(control).toBeVisible({{ timeout: {visible_timeout} }});
        const handle = await row.elementHandle();
        await control.click();
        let gone = await page
          .waitForFunction((el) => !el.isConnected, handle, {{ timeout: {detach_timeout} }})
          .then(() => true, () => false);
        for (let attempt = 0; !gone && attempt < delays.length; attempt++) {{
          emit({{ event: 'log', level: 'warn', message: `row still attached, retry ${{attempt + 1}} in ${{delays[attempt]}}ms` }});
          await page.waitForTimeout(delays[attempt]);
          gone = !(await handle.evaluate((el) => el.isConnected)) || (await items.count()) < before;
        }}
        if (!gone) {{
          fail('retry_exhausted', `row ${{removed + 1}} still attached after ${{delays.length}} retries`);
        }}
        await handle.dispose();
        removed += 1;
      }}
      emit({{ event: 'log', level: 'info', message: `removed ${{removed}} rows` }});{capture}"#,
        items = page(&drain.items),
        delays = delays.join(", "),
        max_removals = drain.max_removals,
        control = js_string(&drain.remove_control),
        visible_timeout = drain.visible_timeout_ms,
        detach_timeout = drain.detach_timeout_ms,
        capture = capture,
    )
}
