//! In-page scripts that fake user input well enough for a reactive front-end to accept it.
//!
//! Reactive frameworks remember the last value they saw on a controlled input and drop `input` events whose value
//! matches it. Assigning `el.value = x` from outside goes through the framework's own property wrapper, which
//! updates that memory, so the event that follows looks like a no-op and the component state never changes. The
//! enforce script therefore pokes the tracker to a sentinel first and writes through the native prototype setter.

use serde::Deserialize;

/// What the enforce script found in the page
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct SynthReport {
	/// The selector matched an element
	pub found: bool,
	/// The element carried a framework value tracker
	pub tracker: bool,
	/// The native value setter was available and used
	pub setter: bool,
}

impl SynthReport {
	/// Element present, but the value assignment had to be skipped
	pub fn degraded(&self) -> bool {
		self.found && !self.setter
	}
}

/// Encode a Rust string as a JS string literal.
pub fn js_str(s: &str) -> String {
	// A JSON string is a valid JS expression; U+2028/9 are legal in both since ES2019.
	serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Focus, reset tracker, native set, `input`, `change`, blur. Returns `JSON.stringify(SynthReport)`.
pub fn enforce_value_script(selector: &str, value: &str) -> String {
	format!(
		r#"
		(function() {{
			const el = document.querySelector({selector});
			if (!el) return JSON.stringify({{ found: false, tracker: false, setter: false }});
			const value = {value};

			el.focus();

			const tracker = el._valueTracker;
			if (tracker) tracker.setValue(value === '' ? ' ' : '');

			const proto = (typeof HTMLTextAreaElement !== 'undefined' && el instanceof HTMLTextAreaElement)
				? HTMLTextAreaElement.prototype
				: HTMLInputElement.prototype;
			const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
			const setter = descriptor && descriptor.set;
			if (setter) setter.call(el, value);

			el.dispatchEvent(new Event('input', {{ bubbles: true, cancelable: true }}));
			el.dispatchEvent(new Event('change', {{ bubbles: true }}));

			el.blur();
			return JSON.stringify({{ found: true, tracker: !!tracker, setter: !!setter }});
		}})()
		"#,
		selector = js_str(selector),
		value = js_str(value),
	)
}

/// Click the first match of `selector`. Returns `true` if something was clicked.
pub fn click_script(selector: &str) -> String {
	format!(
		r#"
		(function() {{
			const el = document.querySelector({selector});
			if (el) {{ el.click(); return true; }}
			return false;
		}})()
		"#,
		selector = js_str(selector),
	)
}

/// Click the `index`-th match of `selector` in document order. Returns `true` if it exists.
pub fn click_nth_script(selector: &str, index: usize) -> String {
	format!(
		r#"
		(function() {{
			const els = document.querySelectorAll({selector});
			const el = els[{index}];
			if (el) {{ el.click(); return true; }}
			return false;
		}})()
		"#,
		selector = js_str(selector),
	)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn enforce_steps_run_in_order() {
		let script = enforce_value_script("#username", "alice");
		let steps = ["el.focus()", "tracker.setValue", "setter.call(el, value)", "new Event('input'", "new Event('change'", "el.blur()"];
		let positions: Vec<usize> = steps.iter().map(|s| script.find(s).unwrap_or_else(|| panic!("missing step {s}"))).collect();
		assert!(positions.windows(2).all(|w| w[0] < w[1]), "steps out of order: {positions:?}");
		assert!(script.contains("bubbles: true, cancelable: true"));
	}

	#[test]
	fn values_are_embedded_as_literals() {
		let script = enforce_value_script(r#"input[name="user"]"#, "pa\"ss'\\word\n");
		assert!(script.contains(r#"document.querySelector("input[name=\"user\"]")"#));
		assert!(script.contains(r#"const value = "pa\"ss'\\word\n";"#));
	}

	#[test]
	fn nth_click_indexes_the_match_list() {
		let script = click_nth_script(".option-card", 3);
		assert!(script.contains(r#"document.querySelectorAll(".option-card")"#));
		assert!(script.contains("els[3]"));
	}

	#[test]
	fn report_flags_missing_setter() {
		let report: SynthReport = serde_json::from_str(r#"{"found":true,"tracker":false,"setter":false}"#).unwrap();
		assert!(report.degraded());
		assert!(!SynthReport::default().degraded());
	}
}
