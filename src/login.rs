//! Two-phase login driver (username, then password) for forms that only reveal the next step after a submit.
//!
//! Nothing tells us when a phase begins, so the form is polled. Each tick re-derives the [`LoginPhase`] from what
//! the page shows, re-enforces any field the UI has wiped, and clicks submit at most once per phase.

use std::{sync::Arc, time::Duration};

use color_eyre::Result;
use tokio::{
	sync::Mutex,
	task::JoinHandle,
	time::{MissedTickBehavior, interval, timeout},
};

use crate::{
	Credential,
	adapter::{ControlState, Field, FieldState, LoginObservation, PageAdapter},
	channel::{Outbound, OutboundMessage},
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LoginPhase {
	/// No login field on the page (not loaded yet, or between phases)
	#[default]
	Idle,
	AwaitingUsername,
	AwaitingPassword,
	/// Password was submitted and the form went away
	Done,
}

impl LoginPhase {
	/// Phase implied by one observation. A visible password field wins over a lingering username field.
	pub fn observe(obs: &LoginObservation, password_submitted: bool) -> Self {
		if obs.password.as_ref().is_some_and(|f| f.visible) {
			LoginPhase::AwaitingPassword
		} else if obs.username.is_some() {
			LoginPhase::AwaitingUsername
		} else if password_submitted {
			LoginPhase::Done
		} else {
			LoginPhase::Idle
		}
	}

	fn owner(&self) -> Option<Field> {
		match self {
			LoginPhase::AwaitingUsername => Some(Field::Username),
			LoginPhase::AwaitingPassword => Some(Field::Password),
			LoginPhase::Idle | LoginPhase::Done => None,
		}
	}
}

#[derive(Clone, Copy, Debug)]
pub struct LoginTiming {
	/// Period of the form poll. The first tick runs immediately on `login()`, not one period later.
	pub poll_interval: Duration,
	/// Hard bound on one `login()` run, success or not
	pub timeout: Duration,
}

impl Default for LoginTiming {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(1),
			timeout: Duration::from_secs(60),
		}
	}
}

/// Host-facing handle. At most one login run is alive per agent.
pub struct LoginAgent<A> {
	page: Arc<A>,
	out: Outbound,
	timing: LoginTiming,
	active: Mutex<Option<JoinHandle<()>>>,
}

impl<A: PageAdapter + 'static> LoginAgent<A> {
	pub fn new(page: Arc<A>, out: Outbound, timing: LoginTiming) -> Self {
		Self {
			page,
			out,
			timing,
			active: Mutex::new(None),
		}
	}

	/// Start a login run, cancelling the previous one first.
	///
	/// Returns once the new run is scheduled; progress and the outcome arrive on the outbound channel.
	pub async fn login(&self, credential: Credential) {
		let mut active = self.active.lock().await;
		if let Some(previous) = active.take() {
			if !previous.is_finished() {
				self.out.log("Superseding previous login run");
				previous.abort();
			}
			// Wait for the abort to land so two runs never touch the form together.
			let _ = previous.await;
		}

		self.out.log(format!("Starting auto-login for {}", credential.username));
		let run = LoginRun::new(self.page.clone(), self.out.clone(), credential);
		*active = Some(tokio::spawn(run.run(self.timing)));
	}

	#[cfg(test)]
	async fn is_running(&self) -> bool {
		self.active.lock().await.as_ref().is_some_and(|h| !h.is_finished())
	}
}

struct LoginRun<A> {
	page: Arc<A>,
	out: Outbound,
	credential: Credential,
	phase: LoginPhase,
	/// Field whose submit was already clicked in the current phase
	latched: Option<Field>,
	password_submitted: bool,
}

impl<A: PageAdapter> LoginRun<A> {
	fn new(page: Arc<A>, out: Outbound, credential: Credential) -> Self {
		Self {
			page,
			out,
			credential,
			phase: LoginPhase::Idle,
			latched: None,
			password_submitted: false,
		}
	}

	async fn run(mut self, timing: LoginTiming) {
		match timeout(timing.timeout, self.poll(timing.poll_interval)).await {
			Ok(()) => {
				self.out.log("Login complete");
				self.out.send(OutboundMessage::LoginComplete);
			}
			Err(_) => {
				self.out.log(format!("Login timed out after {}s (phase: {:?})", timing.timeout.as_secs(), self.phase));
				self.out.send(OutboundMessage::LoginTimeout);
			}
		}
	}

	async fn poll(&mut self, period: Duration) {
		let mut ticker = interval(period);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			match self.tick().await {
				Ok(LoginPhase::Done) => return,
				Ok(_) => {}
				Err(e) => tracing::warn!("Login tick failed: {e}"),
			}
		}
	}

	async fn tick(&mut self) -> Result<LoginPhase> {
		let obs = self.page.observe_login().await?;

		let phase = LoginPhase::observe(&obs, self.password_submitted);
		if phase != self.phase {
			tracing::debug!("Login phase {:?} -> {:?}", self.phase, phase);
			self.phase = phase;
			self.latched = None;
		}
		if phase == LoginPhase::Done {
			return Ok(phase);
		}

		// Not exclusive: during the transition both fields can be on the page at once.
		if let Some(state) = &obs.username {
			self.drive(Field::Username, state, obs.submit).await?;
		}
		if let Some(state) = obs.password.as_ref().filter(|f| f.visible) {
			self.drive(Field::Password, state, obs.submit).await?;
		}
		Ok(phase)
	}

	/// Enforce the field's value, or submit it once if it is already right and this field owns the phase.
	async fn drive(&mut self, field: Field, state: &FieldState, submit: ControlState) -> Result<()> {
		let (name, desired) = match field {
			Field::Username => ("username", self.credential.username.clone()),
			Field::Password => ("password", self.credential.password.clone()),
		};

		if state.value != desired {
			self.out.log(format!("Enforcing {name} value..."));
			let report = self.page.enforce_value(field, &desired).await?;
			if report.degraded() {
				self.out.log(format!("No native value setter on {name} field, assignment skipped"));
			}
			// The UI wiped the field, so an earlier submit did not take.
			if self.latched == Some(field) {
				self.latched = None;
			}
			return Ok(());
		}

		if self.phase.owner() != Some(field) || self.latched == Some(field) {
			return Ok(());
		}
		if submit != ControlState::Enabled {
			tracing::debug!("{name} set, submit control {submit:?}");
			return Ok(());
		}

		self.out.log(format!("{name} set and submit ready, clicking..."));
		if self.page.click_login_submit().await? {
			self.latched = Some(field);
			if field == Field::Password {
				self.password_submitted = true;
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use tokio::time::sleep;

	use super::*;
	use crate::{
		adapter::fake::{Action, FakeDom, FakePage, field},
		channel::outbound,
	};

	fn cred() -> Credential {
		Credential::new("alice".into(), "s3cret".into())
	}

	fn agent(page: &Arc<FakePage>) -> (LoginAgent<FakePage>, crate::channel::OutboundReceiver) {
		let (out, rx) = outbound();
		(LoginAgent::new(page.clone(), out, LoginTiming::default()), rx)
	}

	/// Username submit reveals the password step; password submit leaves the form.
	fn advance_form(dom: &mut FakeDom) {
		if dom.username.is_some() {
			dom.username = None;
			dom.password = field("", true);
		} else {
			dom.password = None;
			dom.submit = ControlState::Absent;
		}
	}

	#[test]
	fn phase_prefers_visible_password() {
		let both = LoginObservation {
			username: field("alice", true),
			password: field("", true),
			submit: ControlState::Enabled,
		};
		assert_eq!(LoginPhase::observe(&both, false), LoginPhase::AwaitingPassword);

		let hidden_password = LoginObservation {
			username: field("", true),
			password: field("", false),
			submit: ControlState::Enabled,
		};
		assert_eq!(LoginPhase::observe(&hidden_password, false), LoginPhase::AwaitingUsername);

		let empty = LoginObservation::default();
		assert_eq!(LoginPhase::observe(&empty, false), LoginPhase::Idle);
		assert_eq!(LoginPhase::observe(&empty, true), LoginPhase::Done);
	}

	#[tokio::test(start_paused = true)]
	async fn full_two_phase_flow_completes() {
		let page = Arc::new(FakePage::new(FakeDom {
			username: field("", true),
			password: field("", false),
			submit: ControlState::Enabled,
			on_submit: Some(advance_form),
			..FakeDom::default()
		}));
		let (agent, mut rx) = agent(&page);

		agent.login(cred()).await;
		sleep(Duration::from_secs(10)).await;

		assert_eq!(
			page.dom().actions,
			vec![
				Action::Enforce(Field::Username, "alice".into()),
				Action::ClickSubmit,
				Action::Enforce(Field::Password, "s3cret".into()),
				Action::ClickSubmit,
			]
		);
		let messages = rx.drain();
		assert!(messages.contains(&OutboundMessage::LoginComplete));
		assert!(!messages.contains(&OutboundMessage::LoginTimeout));
		assert!(!agent.is_running().await);
	}

	#[tokio::test(start_paused = true)]
	async fn submit_clicked_once_per_phase() {
		// The control stays enabled and the field stays: a naive loop would click every tick.
		let page = Arc::new(FakePage::new(FakeDom {
			username: field("alice", true),
			submit: ControlState::Enabled,
			..FakeDom::default()
		}));
		let (agent, _rx) = agent(&page);

		agent.login(cred()).await;
		sleep(Duration::from_secs(5)).await;

		assert_eq!(page.dom().count(&Action::ClickSubmit), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn wiped_field_is_re_enforced_before_next_submit() {
		let page = Arc::new(FakePage::new(FakeDom {
			username: field("", true),
			submit: ControlState::Enabled,
			..FakeDom::default()
		}));
		let (agent, _rx) = agent(&page);

		agent.login(cred()).await;
		// ticks at 0s (enforce) and 1s (submit)
		sleep(Duration::from_millis(1500)).await;
		page.dom().username = field("", true);
		// ticks at 2s (enforce) and 3s (submit)
		sleep(Duration::from_secs(2)).await;

		assert_eq!(
			page.dom().actions,
			vec![
				Action::Enforce(Field::Username, "alice".into()),
				Action::ClickSubmit,
				Action::Enforce(Field::Username, "alice".into()),
				Action::ClickSubmit,
			]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn disabled_submit_is_never_clicked() {
		let page = Arc::new(FakePage::new(FakeDom {
			username: field("alice", true),
			submit: ControlState::Disabled,
			..FakeDom::default()
		}));
		let (agent, _rx) = agent(&page);

		agent.login(cred()).await;
		sleep(Duration::from_secs(5)).await;

		assert!(page.dom().actions.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn hidden_password_is_left_alone_until_visible() {
		let page = Arc::new(FakePage::new(FakeDom {
			password: field("", false),
			submit: ControlState::Enabled,
			..FakeDom::default()
		}));
		let (agent, _rx) = agent(&page);

		agent.login(cred()).await;
		sleep(Duration::from_millis(4500)).await;
		assert!(page.dom().actions.is_empty());

		page.dom().password = field("", true);
		// ticks at 5s (enforce) and 6s (submit)
		sleep(Duration::from_secs(2)).await;
		assert_eq!(
			page.dom().actions,
			vec![Action::Enforce(Field::Password, "s3cret".into()), Action::ClickSubmit]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn run_stops_touching_the_page_after_timeout() {
		// Setter missing: the value never sticks, so the run never gets past enforcing.
		let page = Arc::new(FakePage::new(FakeDom {
			username: field("", true),
			submit: ControlState::Enabled,
			setter_available: false,
			..FakeDom::default()
		}));
		let (agent, mut rx) = agent(&page);

		agent.login(cred()).await;
		sleep(Duration::from_secs(61)).await;

		let attempts = page.dom().actions.len();
		assert!(attempts >= 59, "expected an attempt per tick, got {attempts}");
		assert_eq!(page.dom().count(&Action::ClickSubmit), 0);

		let messages = rx.drain();
		assert!(messages.contains(&OutboundMessage::LoginTimeout));
		assert!(messages.iter().any(|m| matches!(m, OutboundMessage::Log { message } if message.contains("No native value setter"))));

		sleep(Duration::from_secs(30)).await;
		assert_eq!(page.dom().actions.len(), attempts);
		assert!(!agent.is_running().await);
	}

	#[tokio::test(start_paused = true)]
	async fn new_login_supersedes_running_one() {
		let page = Arc::new(FakePage::new(FakeDom {
			username: field("", true),
			submit: ControlState::Disabled,
			setter_available: false,
			..FakeDom::default()
		}));
		let (agent, mut rx) = agent(&page);

		agent.login(cred()).await;
		sleep(Duration::from_millis(1500)).await;
		let before = page.dom().actions.len();
		assert!(before > 0);

		agent.login(Credential::new("bob".into(), "pw".into())).await;
		sleep(Duration::from_secs(3)).await;

		let actions = page.dom().actions.clone();
		assert!(actions[before..].iter().all(|a| *a == Action::Enforce(Field::Username, "bob".into())));
		assert!(actions.len() > before);

		// The cancelled run ends silently; only the surviving run may report.
		sleep(Duration::from_secs(60)).await;
		let timeouts = rx.drain().into_iter().filter(|m| *m == OutboundMessage::LoginTimeout).count();
		assert_eq!(timeouts, 1);
	}
}
