//! Isolation boundary between the agents and the target UI's markup.
//!
//! The agents only ask semantic questions ("is the password field visible?", "which options are rendered?"). Every
//! selector lives in a [`Selectors`] set, one per target UI version, so selector drift is fixed by adding a set.

use async_trait::async_trait;
use chromiumoxide::Page;
use color_eyre::{Result, eyre::eyre};
use serde::{Deserialize, de::DeserializeOwned};

use crate::synth::{self, SynthReport, js_str};

#[cfg(test)]
pub(crate) mod fake;

/// Selector contract for one version of the target UI
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Selectors {
	pub version: &'static str,
	pub username_field: &'static str,
	pub password_field: &'static str,
	pub login_submit: &'static str,
	pub question_container: &'static str,
	/// Text node inside the container; `None` means the container's own text is the question
	pub question_text: Option<&'static str>,
	pub option_card: &'static str,
	pub option_label: &'static str,
	pub option_text: &'static str,
	pub next_control: &'static str,
}

impl Selectors {
	pub const ACADALLY_V3: Selectors = Selectors {
		version: "acadally-v3",
		username_field: "#username",
		password_field: "#password",
		login_submit: r#"button[type="submit"]"#,
		question_container: ".question",
		question_text: None,
		option_card: ".option-card",
		option_label: ".option-label",
		option_text: ".option-text",
		next_control: ".selected-btn",
	};

	pub const KNOWN: &'static [Selectors] = &[Self::ACADALLY_V3];

	pub fn for_version(version: &str) -> Option<&'static Selectors> {
		Self::KNOWN.iter().find(|s| s.version == version)
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Field {
	Username,
	Password,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct FieldState {
	pub value: String,
	/// Has a rendered box (non-null offset parent)
	pub visible: bool,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ControlState {
	#[default]
	Absent,
	Disabled,
	Enabled,
}

/// One tick's view of the login form
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct LoginObservation {
	pub username: Option<FieldState>,
	pub password: Option<FieldState>,
	pub submit: ControlState,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QuestionProbe {
	/// No question container on the page
	Absent,
	/// Container rendered but its text is missing or blank
	NoText,
	/// Trimmed, non-empty question text
	Text(String),
}

/// An option card as read from the page, before labels are derived
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct RawOption {
	#[serde(default)]
	pub label: Option<String>,
	pub text: String,
}

#[async_trait]
pub trait PageAdapter: Send + Sync {
	async fn observe_login(&self) -> Result<LoginObservation>;
	/// Run the event synthesizer on `field`.
	async fn enforce_value(&self, field: Field, value: &str) -> Result<SynthReport>;
	async fn click_login_submit(&self) -> Result<bool>;

	async fn probe_question(&self) -> Result<QuestionProbe>;
	/// Option cards in document order
	async fn read_options(&self) -> Result<Vec<RawOption>>;
	/// Click the option at `index`. `Ok(false)` if no such card is rendered.
	async fn click_option(&self, index: usize) -> Result<bool>;
	async fn next_control(&self) -> Result<ControlState>;
	async fn click_next(&self) -> Result<bool>;

	/// Full page HTML, when the backend can produce it
	async fn snapshot_html(&self) -> Result<Option<String>> {
		Ok(None)
	}
}

/// [`PageAdapter`] over a live Chromium page
#[derive(Clone, Debug)]
pub struct ChromePage {
	page: Page,
	selectors: &'static Selectors,
}

impl ChromePage {
	pub fn new(page: Page, selectors: &'static Selectors) -> Self {
		Self { page, selectors }
	}

	/// Evaluate a script that returns `JSON.stringify(..)` and decode it. A `null` payload decodes to `None`.
	async fn evaluate_json<T: DeserializeOwned>(&self, script: String, what: &str) -> Result<Option<T>> {
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to {}: {}", what, e))?;
		let Some(json_str) = result.value().and_then(|v| v.as_str()) else {
			return Ok(None);
		};
		let parsed = serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse {} result: {} - raw: '{}'", what, e, json_str))?;
		Ok(Some(parsed))
	}

	async fn evaluate_bool(&self, script: String, what: &str) -> Result<bool> {
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to {}: {}", what, e))?;
		Ok(result.value().and_then(|v| v.as_bool()).unwrap_or(false))
	}

	fn field_selector(&self, field: Field) -> &'static str {
		match field {
			Field::Username => self.selectors.username_field,
			Field::Password => self.selectors.password_field,
		}
	}

	fn control_state_script(selector: &str) -> String {
		format!(
			r#"
			(function() {{
				const btn = document.querySelector({selector});
				if (!btn) return JSON.stringify('absent');
				return JSON.stringify(btn.disabled ? 'disabled' : 'enabled');
			}})()
			"#,
			selector = js_str(selector),
		)
	}

	/// Yields `{present, text}`; `text` is `null` when the container has no text node.
	fn question_script(s: &Selectors) -> String {
		let text_lookup = match s.question_text {
			Some(sel) => format!("container.querySelector({})", js_str(sel)),
			None => "container".to_string(),
		};
		format!(
			r#"
			(function() {{
				const container = document.querySelector({container});
				if (!container) return JSON.stringify({{ present: false, text: null }});
				const textEl = {text_lookup};
				const text = textEl ? (textEl.innerText || textEl.textContent || '') : null;
				return JSON.stringify({{ present: true, text: text }});
			}})()
			"#,
			container = js_str(s.question_container),
		)
	}

	/// One `{label, text}` per card in document order. Cards without a label node give `label: null`, cards without a
	/// text node fall back to the card's own text.
	fn options_script(s: &Selectors) -> String {
		format!(
			r#"
			(function() {{
				const cards = document.querySelectorAll({card});
				return JSON.stringify(Array.from(cards).map((card) => {{
					const labelEl = card.querySelector({label});
					const textEl = card.querySelector({text});
					const label = labelEl ? (labelEl.innerText || labelEl.textContent || '').trim() : '';
					const text = (textEl ? (textEl.innerText || textEl.textContent) : (card.innerText || card.textContent)) || '';
					return {{ label: label || null, text: text.trim() }};
				}}));
			}})()
			"#,
			card = js_str(s.option_card),
			label = js_str(s.option_label),
			text = js_str(s.option_text),
		)
	}
}

#[derive(Debug, Deserialize)]
struct QuestionPayload {
	present: bool,
	text: Option<String>,
}

impl QuestionPayload {
	fn resolve(payload: Option<Self>) -> QuestionProbe {
		match payload {
			None | Some(Self { present: false, .. }) => QuestionProbe::Absent,
			Some(Self { text, .. }) => match text.as_deref().map(str::trim) {
				Some(t) if !t.is_empty() => QuestionProbe::Text(t.to_string()),
				_ => QuestionProbe::NoText,
			},
		}
	}
}

#[async_trait]
impl PageAdapter for ChromePage {
	async fn observe_login(&self) -> Result<LoginObservation> {
		let s = self.selectors;
		let script = format!(
			r#"
			(function() {{
				function field(selector) {{
					const el = document.querySelector(selector);
					if (!el) return null;
					return {{ value: el.value == null ? '' : String(el.value), visible: el.offsetParent !== null }};
				}}
				const btn = document.querySelector({submit});
				return JSON.stringify({{
					username: field({username}),
					password: field({password}),
					submit: !btn ? 'absent' : (btn.disabled ? 'disabled' : 'enabled'),
				}});
			}})()
			"#,
			username = js_str(s.username_field),
			password = js_str(s.password_field),
			submit = js_str(s.login_submit),
		);
		Ok(self.evaluate_json(script, "observe login form").await?.unwrap_or_default())
	}

	async fn enforce_value(&self, field: Field, value: &str) -> Result<SynthReport> {
		let script = synth::enforce_value_script(self.field_selector(field), value);
		Ok(self.evaluate_json(script, "enforce field value").await?.unwrap_or_default())
	}

	async fn click_login_submit(&self) -> Result<bool> {
		self.evaluate_bool(synth::click_script(self.selectors.login_submit), "click login submit").await
	}

	async fn probe_question(&self) -> Result<QuestionProbe> {
		let payload = self.evaluate_json(Self::question_script(self.selectors), "probe question").await?;
		Ok(QuestionPayload::resolve(payload))
	}

	async fn read_options(&self) -> Result<Vec<RawOption>> {
		Ok(self.evaluate_json(Self::options_script(self.selectors), "read options").await?.unwrap_or_default())
	}

	async fn click_option(&self, index: usize) -> Result<bool> {
		self.evaluate_bool(synth::click_nth_script(self.selectors.option_card, index), "click option").await
	}

	async fn next_control(&self) -> Result<ControlState> {
		let script = Self::control_state_script(self.selectors.next_control);
		Ok(self.evaluate_json(script, "inspect next control").await?.unwrap_or_default())
	}

	async fn click_next(&self) -> Result<bool> {
		self.evaluate_bool(synth::click_script(self.selectors.next_control), "click next control").await
	}

	async fn snapshot_html(&self) -> Result<Option<String>> {
		let html = self.page.evaluate("document.documentElement.outerHTML").await.map_err(|e| eyre!("Failed to get page HTML: {}", e))?;
		Ok(html.value().and_then(|v| v.as_str()).map(str::to_string))
	}
}
