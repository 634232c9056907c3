//! JavaScript snippets evaluated in the portal page.
//!
//! Every builder returns a self-contained IIFE.  Absence of the target is
//! reported through the return value (`false` or `null`), never by throwing,
//! so callers can poll the same script until it succeeds or their budget runs
//! out.  Arguments are JSON-escaped before interpolation.

use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::time::{Instant, sleep};

use crate::browser::{DriverError, PortalDriver};
use crate::strategy::Locator;

/// Interval between probe evaluations while waiting on a page condition.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Control roles the portal flow interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRole {
    Button,
    Link,
}

impl ControlRole {
    fn candidates(self) -> &'static str {
        match self {
            ControlRole::Button => r#"button, input[type="button"], [role="button"]"#,
            ControlRole::Link => r#"a[href], [role="link"]"#,
        }
    }
}

fn js_string(value: &str) -> String {
    JsonValue::String(value.to_string()).to_string()
}

/// Click the first visible element of `role` whose trimmed label equals
/// `label`.  Returns `true` once clicked, `false` when no such control exists.
pub fn click_labeled_script(role: ControlRole, label: &str) -> String {
    format!(
        "(function() {{
            const label = {label};
            const candidates = document.querySelectorAll({selector});
            for (const el of candidates) {{
                const text = (el.innerText || el.textContent || el.value || '').trim();
                if (text !== label) {{
                    continue;
                }}
                if (el.getClientRects().length === 0) {{
                    continue;
                }}
                el.click();
                return true;
            }}
            return false;
        }})()",
        label = js_string(label),
        selector = js_string(role.candidates())
    )
}

/// Fill the input named `name` and fire the framework-visible events.
/// Returns `false` when the field is absent.
pub fn fill_named_script(name: &str, value: &str) -> String {
    format!(
        "(function() {{
            const el = document.querySelector('input[name=' + {name} + ']');
            if (!el) {{
                return false;
            }}
            el.focus();
            if ('value' in el) {{
                el.value = {value};
            }}
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()",
        name = js_string(&js_string(name)),
        value = js_string(value)
    )
}

/// Submit the login form: a `button[type=submit]` is preferred, an
/// `input[type=submit]` is the fallback when the button is missing or its
/// click throws.  Returns which control fired, or `false`.
pub fn submit_form_script() -> String {
    r#"(function() {
        let el = document.querySelector('button[type="submit"]');
        if (el) {
            try {
                el.click();
                return "button";
            } catch (err) {}
        }
        el = document.querySelector('input[type="submit"]');
        if (el) {
            el.click();
            return "input";
        }
        return false;
    })()"#
        .to_string()
}

/// Read the trimmed text of the element addressed by `locator`.  Returns
/// `null` when the element is absent or its text is empty.
pub fn read_text_script(locator: &Locator) -> String {
    let lookup = match locator {
        Locator::Css(selector) => format!(
            "document.querySelector({selector})",
            selector = js_string(selector)
        ),
        Locator::XPath(expression) => format!(
            "document.evaluate({expression}, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue",
            expression = js_string(expression)
        ),
    };
    format!(
        "(function() {{
            const el = {lookup};
            if (!el) {{
                return null;
            }}
            const text = (el.innerText || el.textContent || '').trim();
            return text.length ? text : null;
        }})()",
        lookup = lookup
    )
}

/// Evaluate `script` repeatedly until it yields a truthy value or `wait_ms`
/// elapses.  `Ok(None)` means the budget ran out; callers treat that as
/// routing information, not an error.
pub async fn poll_script(
    driver: &dyn PortalDriver,
    script: &str,
    wait_ms: u64,
) -> Result<Option<JsonValue>, DriverError> {
    let deadline = Instant::now() + Duration::from_millis(wait_ms);
    loop {
        let value = driver.evaluate(script).await?;
        if is_truthy(&value) {
            return Ok(Some(value));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL).await;
    }
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(flag) => *flag,
        JsonValue::String(text) => !text.is_empty(),
        JsonValue::Number(number) => number.as_f64().map(|v| v != 0.0).unwrap_or(true),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDriver;

    #[test]
    fn click_script_escapes_label() {
        let script = click_labeled_script(ControlRole::Button, r#"say "yes""#);
        assert!(script.contains(r#""say \"yes\"""#));
        assert!(script.contains("el.click()"));
        assert!(script.contains(r#"input[type=\"button\"]"#));
    }

    #[test]
    fn link_role_targets_anchors() {
        let script = click_labeled_script(ControlRole::Link, "enter");
        assert!(script.contains("a[href]"));
        assert!(!script.contains("input[type"));
    }

    #[test]
    fn fill_script_dispatches_input_events() {
        let script = fill_named_script("username", "member-1");
        assert!(script.contains("'input[name=' +"));
        assert!(script.contains(r#"el.value = "member-1""#));
        assert!(script.contains("new Event('input'"));
        assert!(script.contains("new Event('change'"));
    }

    #[test]
    fn submit_script_prefers_button_control() {
        let script = submit_form_script();
        let button_at = script.find("button[type=").expect("button selector");
        let input_at = script.find("input[type=").expect("input selector");
        assert!(button_at < input_at);
    }

    #[test]
    fn read_text_script_handles_both_dialects() {
        let css = read_text_script(&Locator::Css("h4.total".to_string()));
        assert!(css.contains("document.querySelector(\"h4.total\")"));

        let xpath = read_text_script(&Locator::XPath("//h4[1]".to_string()));
        assert!(xpath.contains("document.evaluate"));
        assert!(xpath.contains("FIRST_ORDERED_NODE_TYPE"));
    }

    #[tokio::test]
    async fn poll_script_returns_first_truthy_value() {
        let driver = ScriptedDriver::with_eval(|_| Ok(JsonValue::String("12.34%".to_string())));
        let value = poll_script(&driver, "probe", 1_000).await.expect("poll");
        assert_eq!(value, Some(JsonValue::String("12.34%".to_string())));
        assert_eq!(driver.evaluation_count(), 1);
    }

    #[tokio::test]
    async fn poll_script_times_out_on_falsy_values() {
        let driver = ScriptedDriver::with_eval(|_| Ok(JsonValue::Bool(false)));
        let value = poll_script(&driver, "probe", 10).await.expect("poll");
        assert_eq!(value, None);
        assert!(driver.evaluation_count() >= 1);
    }

    #[tokio::test]
    async fn poll_script_propagates_driver_errors() {
        let driver =
            ScriptedDriver::with_eval(|_| Err(DriverError::Message("page crashed".to_string())));
        let err = poll_script(&driver, "probe", 1_000)
            .await
            .expect_err("driver error");
        assert!(matches!(err, DriverError::Message(_)));
    }

    #[test]
    fn empty_strings_are_falsy() {
        assert!(!is_truthy(&JsonValue::String(String::new())));
        assert!(!is_truthy(&JsonValue::Null));
        assert!(is_truthy(&JsonValue::String("0.5".to_string())));
    }
}
