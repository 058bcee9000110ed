//! In-memory page for driving the agents in tests.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use color_eyre::Result;

use super::{ControlState, Field, FieldState, LoginObservation, PageAdapter, QuestionProbe, RawOption};
use crate::synth::SynthReport;

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum Action {
	Enforce(Field, String),
	ClickSubmit,
	ClickOption(usize),
	ClickNext,
}

#[derive(Debug)]
pub(crate) struct FakeDom {
	pub username: Option<FieldState>,
	pub password: Option<FieldState>,
	pub submit: ControlState,
	pub question: QuestionProbe,
	pub options: Vec<RawOption>,
	pub next: ControlState,
	pub setter_available: bool,
	/// Runs after every login submit click, to model the UI reacting
	pub on_submit: Option<fn(&mut FakeDom)>,
	pub actions: Vec<Action>,
}

impl Default for FakeDom {
	fn default() -> Self {
		Self {
			username: None,
			password: None,
			submit: ControlState::Absent,
			question: QuestionProbe::Absent,
			options: Vec::new(),
			next: ControlState::Absent,
			setter_available: true,
			on_submit: None,
			actions: Vec::new(),
		}
	}
}

impl FakeDom {
	pub fn count(&self, action: &Action) -> usize {
		self.actions.iter().filter(|a| *a == action).count()
	}

	fn field_mut(&mut self, field: Field) -> Option<&mut FieldState> {
		match field {
			Field::Username => self.username.as_mut(),
			Field::Password => self.password.as_mut(),
		}
	}
}

#[derive(Debug, Default)]
pub(crate) struct FakePage {
	dom: Mutex<FakeDom>,
}

impl FakePage {
	pub fn new(dom: FakeDom) -> Self {
		Self { dom: Mutex::new(dom) }
	}

	pub fn dom(&self) -> MutexGuard<'_, FakeDom> {
		self.dom.lock().unwrap()
	}

	pub fn with_question(text: &str, options: &[(Option<&str>, &str)]) -> Self {
		Self::new(FakeDom {
			question: QuestionProbe::Text(text.to_string()),
			options: options
				.iter()
				.map(|(label, text)| RawOption {
					label: label.map(str::to_string),
					text: text.to_string(),
				})
				.collect(),
			next: ControlState::Enabled,
			..FakeDom::default()
		})
	}
}

pub(crate) fn field(value: &str, visible: bool) -> Option<FieldState> {
	Some(FieldState { value: value.to_string(), visible })
}

#[async_trait]
impl PageAdapter for FakePage {
	async fn observe_login(&self) -> Result<LoginObservation> {
		let dom = self.dom();
		Ok(LoginObservation {
			username: dom.username.clone(),
			password: dom.password.clone(),
			submit: dom.submit,
		})
	}

	async fn enforce_value(&self, field: Field, value: &str) -> Result<SynthReport> {
		let mut dom = self.dom();
		let setter = dom.setter_available;
		let Some(state) = dom.field_mut(field) else {
			return Ok(SynthReport::default());
		};
		if setter {
			state.value = value.to_string();
		}
		dom.actions.push(Action::Enforce(field, value.to_string()));
		Ok(SynthReport { found: true, tracker: true, setter })
	}

	async fn click_login_submit(&self) -> Result<bool> {
		let mut dom = self.dom();
		if dom.submit == ControlState::Absent {
			return Ok(false);
		}
		dom.actions.push(Action::ClickSubmit);
		if let Some(hook) = dom.on_submit {
			hook(&mut *dom);
		}
		Ok(true)
	}

	async fn probe_question(&self) -> Result<QuestionProbe> {
		Ok(self.dom().question.clone())
	}

	async fn read_options(&self) -> Result<Vec<RawOption>> {
		Ok(self.dom().options.clone())
	}

	async fn click_option(&self, index: usize) -> Result<bool> {
		let mut dom = self.dom();
		if index >= dom.options.len() {
			return Ok(false);
		}
		dom.actions.push(Action::ClickOption(index));
		Ok(true)
	}

	async fn next_control(&self) -> Result<ControlState> {
		Ok(self.dom().next)
	}

	async fn click_next(&self) -> Result<bool> {
		let mut dom = self.dom();
		if dom.next == ControlState::Absent {
			return Ok(false);
		}
		dom.actions.push(Action::ClickNext);
		Ok(true)
	}
}
