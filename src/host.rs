//! Host side: starts both agents and reacts to what they report.

#[cfg(feature = "xdg")]
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::{Result, eyre::bail};
#[cfg(feature = "xdg")]
use color_eyre::eyre::eyre;
#[cfg(feature = "xdg")]
use v_utils::xdg_state_dir;
use v_utils::{elog, io::confirm, log};

use crate::{
	Credential, Question,
	adapter::PageAdapter,
	channel::{OutboundMessage, OutboundReceiver, outbound},
	config::AppConfig,
	llm::ask_llm_for_choice,
	login::LoginAgent,
	sampler::QuestionAgent,
};

/// Whoever picks the answer for a reported question
#[async_trait]
pub trait Decider: Send + Sync {
	/// `Ok(None)` means the answer is left to the operator.
	async fn decide(&self, question: &Question) -> Result<Option<usize>>;
}

/// Asks the LLM, then the operator unless `auto_submit` is set
pub struct LlmDecider {
	config: AppConfig,
}

impl LlmDecider {
	pub fn new(config: AppConfig) -> Self {
		Self { config }
	}
}

#[async_trait]
impl Decider for LlmDecider {
	async fn decide(&self, question: &Question) -> Result<Option<usize>> {
		let choice = ask_llm_for_choice(question, &self.config).await?;
		let label = question.options.get(choice.idx).map(|o| o.label.as_str()).unwrap_or("?");
		log!("LLM answer: {}. {}", label, choice.text);

		if !self.config.auto_submit && !confirm("Submit this answer?").await {
			log!("Left for manual answer");
			return Ok(None);
		}
		Ok(Some(choice.idx))
	}
}

/// Run the stop hook with a message if configured
pub fn run_stop_hook(config: &AppConfig, message: &str) {
	if let Some(ref hook) = config.stop_hook {
		log!("Running stop hook: {} {:?}", hook, message);
		// Escape single quotes for shell: replace ' with '\''
		let escaped = message.replace('\'', "'\\''");
		let _ = tokio::process::Command::new("sh").arg("-c").arg(format!("{} '{}'", hook, escaped)).spawn();
	}
}

pub struct Host<A, D> {
	config: AppConfig,
	page: Arc<A>,
	login: LoginAgent<A>,
	questions: QuestionAgent<A>,
	rx: OutboundReceiver,
	decider: Option<D>,
	consecutive_failures: u32,
	session_id: String,
}

impl<A: PageAdapter + 'static, D: Decider> Host<A, D> {
	/// `decider: None` only reports questions and never answers them.
	pub fn new(config: AppConfig, page: Arc<A>, decider: Option<D>) -> Self {
		let (out, rx) = outbound();
		let login = LoginAgent::new(page.clone(), out.clone(), config.login_timing());
		let questions = QuestionAgent::new(page.clone(), out, config.sampler_timing());
		let session_id = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs().to_string();
		Self {
			config,
			page,
			login,
			questions,
			rx,
			decider,
			consecutive_failures: 0,
			session_id,
		}
	}

	#[cfg(test)]
	fn questions(&self) -> &QuestionAgent<A> {
		&self.questions
	}

	/// Log in, start sampling, and dispatch outbound messages until a fatal stop.
	pub async fn run(&mut self) -> Result<()> {
		let credential = Credential::new(self.config.username.clone(), self.config.password.clone());
		self.login.login(credential).await;
		self.questions.start();

		while let Some(message) = self.rx.recv_message().await {
			self.handle(message).await?;
		}
		Ok(())
	}

	pub async fn handle(&mut self, message: OutboundMessage) -> Result<()> {
		match message {
			OutboundMessage::Log { message } => tracing::trace!(target: "host", "page: {message}"),
			OutboundMessage::LoginComplete => log!("Login complete"),
			OutboundMessage::LoginTimeout => {
				elog!("Login did not complete in {}s, continuing to watch for questions", self.config.login_timeout_secs);
				run_stop_hook(&self.config, "Login timed out");
			}
			OutboundMessage::QuestionFound { question, options } => {
				let question = Question { text: question, options };
				self.on_question(question).await?;
			}
		}
		Ok(())
	}

	async fn on_question(&mut self, question: Question) -> Result<()> {
		eprintln!("--- Question ---");
		eprint!("{question}");
		eprintln!();

		#[cfg(feature = "xdg")]
		if let Err(e) = self.save_page_html().await {
			elog!("Failed to save question page HTML: {e}");
		}

		let Some(decider) = &self.decider else {
			return Ok(());
		};

		match decider.decide(&question).await {
			Ok(Some(idx)) => {
				self.consecutive_failures = 0;
				self.questions.click_option(idx).await;
			}
			Ok(None) => {}
			Err(e) => {
				self.consecutive_failures += 1;
				elog!("Failed to get an answer: {e} ({}/{})", self.consecutive_failures, self.config.max_consecutive_failures);
				if self.consecutive_failures >= self.config.max_consecutive_failures {
					run_stop_hook(&self.config, &format!("Exceeded {} consecutive answer failures", self.config.max_consecutive_failures));
					bail!("Exceeded {} consecutive answer failures", self.config.max_consecutive_failures);
				}
				// Nothing was clicked; let the sampler report it again.
				self.questions.reset_processing();
			}
		}
		Ok(())
	}

	/// Save the current page's HTML to disk, for chasing selector drift
	#[cfg(feature = "xdg")]
	async fn save_page_html(&self) -> Result<Option<PathBuf>> {
		let Some(html) = self.page.snapshot_html().await? else {
			return Ok(None);
		};
		let html_dir = xdg_state_dir!("persist_htmls").join(&self.session_id);
		std::fs::create_dir_all(&html_dir).map_err(|e| eyre!("Failed to create HTML dir: {}", e))?;

		let timestamp = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis();
		let filepath = html_dir.join(format!("{timestamp}_question.html"));
		std::fs::write(&filepath, html).map_err(|e| eyre!("Failed to write HTML file: {}", e))?;

		tracing::debug!("Saved page HTML to: {}", filepath.display());
		Ok(Some(filepath))
	}
}
