//! Question detection and answer dispatch.
//!
//! The sampler reports each distinct question once. Repeated ticks over the same rendered question are swallowed by
//! the detection guard until the host resets it or a different question replaces it.

use std::{
	sync::{
		Arc, Mutex, PoisonError,
		atomic::{AtomicBool, Ordering},
	},
	time::Duration,
};

use color_eyre::Result;
use tokio::time::{MissedTickBehavior, interval, sleep};

use crate::{
	Question, QuestionOption,
	adapter::{ControlState, PageAdapter, QuestionProbe, RawOption},
	channel::{Outbound, OutboundMessage},
	position_label,
};

#[derive(Clone, Copy, Debug)]
pub struct SamplerTiming {
	/// Period of the sampling loop. The first pass runs immediately on `start()`, not one period later.
	pub poll_interval: Duration,
	/// Wait between clicking an option and looking for the next control
	pub settle_delay: Duration,
}

impl Default for SamplerTiming {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(1),
			settle_delay: Duration::from_millis(500),
		}
	}
}

/// Host-facing handle; clones share the same guard and page.
pub struct QuestionAgent<A> {
	inner: Arc<Inner<A>>,
}

struct Inner<A> {
	page: Arc<A>,
	out: Outbound,
	timing: SamplerTiming,
	/// Text of the last reported question
	guard: Mutex<Option<String>>,
	started: AtomicBool,
}

impl<A> Clone for QuestionAgent<A> {
	fn clone(&self) -> Self {
		Self { inner: self.inner.clone() }
	}
}

/// Assemble a question from raw cards, deriving missing labels from position.
pub fn build_question(text: &str, raw: Vec<RawOption>) -> Question {
	let options = raw
		.into_iter()
		.enumerate()
		.map(|(index, opt)| {
			let label = opt.label.map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).unwrap_or_else(|| position_label(index));
			QuestionOption::new(index, label, opt.text.trim().to_string())
		})
		.collect();
	Question { text: text.trim().to_string(), options }
}

impl<A: PageAdapter + 'static> QuestionAgent<A> {
	pub fn new(page: Arc<A>, out: Outbound, timing: SamplerTiming) -> Self {
		Self {
			inner: Arc::new(Inner {
				page,
				out,
				timing,
				guard: Mutex::new(None),
				started: AtomicBool::new(false),
			}),
		}
	}

	/// Spawn the sampling loop. Only the first call does anything; the loop runs for the rest of the process.
	pub fn start(&self) -> bool {
		if self.inner.started.swap(true, Ordering::SeqCst) {
			tracing::debug!("Question sampler already running");
			return false;
		}
		let agent = self.clone();
		tokio::spawn(async move { agent.sample().await });
		true
	}

	async fn sample(&self) {
		let mut ticker = interval(self.inner.timing.poll_interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			if let Err(e) = self.check_page().await {
				tracing::warn!("Question check failed: {e}");
			}
		}
	}

	/// One sampling pass. Returns the question if this pass reported it.
	pub async fn check_page(&self) -> Result<Option<Question>> {
		let text = match self.inner.page.probe_question().await? {
			QuestionProbe::Absent | QuestionProbe::NoText => return Ok(None),
			QuestionProbe::Text(text) => text.trim().to_string(),
		};
		if text.is_empty() {
			return Ok(None);
		}
		if self.last_reported().as_deref() == Some(text.as_str()) {
			return Ok(None);
		}

		let raw = self.inner.page.read_options().await?;
		if raw.is_empty() {
			tracing::debug!("Question rendered without options yet: {text}");
			return Ok(None);
		}
		let question = build_question(&text, raw);

		*self.lock_guard() = Some(question.text.clone());
		self.inner.out.log(format!("Question found: {}", question.text));
		self.inner.out.send(OutboundMessage::QuestionFound {
			question: question.text.clone(),
			options: question.options.clone(),
		});
		Ok(Some(question))
	}

	/// Select the option at `index` and advance. Stale indices are logged and ignored.
	pub async fn click_option(&self, index: usize) {
		if let Err(e) = self.try_click_option(index).await {
			self.inner.out.log(format!("Clicking option {index} failed: {e}"));
		}
	}

	async fn try_click_option(&self, index: usize) -> Result<()> {
		let out = &self.inner.out;
		let page = &self.inner.page;

		let rendered = page.read_options().await?.len();
		if index >= rendered {
			out.log(format!("Option index {index} out of range ({rendered} rendered), ignoring"));
			return Ok(());
		}

		out.log(format!("Clicking option index: {index}"));
		if !page.click_option(index).await? {
			out.log(format!("Option {index} disappeared before the click"));
			return Ok(());
		}

		sleep(self.inner.timing.settle_delay).await;

		match page.next_control().await? {
			ControlState::Enabled =>
				if page.click_next().await? {
					out.log("Clicked next control");
				} else {
					out.log("Next control vanished before the click");
				},
			ControlState::Disabled => out.log("Next control is disabled, not advancing"),
			ControlState::Absent => out.log("No next control found, not advancing"),
		}
		Ok(())
	}

	/// Forget the last reported question so the same text can be reported again.
	pub fn reset_processing(&self) {
		if let Some(previous) = self.lock_guard().take() {
			tracing::debug!("Detection guard cleared (was: {previous})");
		}
	}

	pub fn last_reported(&self) -> Option<String> {
		self.lock_guard().clone()
	}

	fn lock_guard(&self) -> std::sync::MutexGuard<'_, Option<String>> {
		self.inner.guard.lock().unwrap_or_else(PoisonError::into_inner)
	}
}
