//! Remote decision-maker: hands a reported question to an LLM and gets back an option index.

use ask_llm::{Client as LlmClient, Conversation, Model, Role};
use color_eyre::{Result, eyre::eyre};
use v_utils::elog;

use crate::{Question, config::AppConfig};

/// LLM response for single-choice questions
#[derive(Debug, serde::Deserialize)]
struct LlmSingleAnswer {
	response: String,
	response_number: usize,
}

/// Option picked by the decision-maker
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LlmChoice {
	/// 0-based, ready for `click_option`
	pub idx: usize,
	pub text: String,
}

fn build_prompt(question: &Question) -> String {
	let question_text = &question.text;
	let mut options_text = String::new();
	for (i, option) in question.options.iter().enumerate() {
		options_text.push_str(&format!("{}. ({}) {}\n", i + 1, option.label, option.text));
	}

	format!(
		r#"You are answering a single-choice question. Pick the ONE correct answer.

Question:
{question_text}

Options:
{options_text}
Respond with JSON only, no markdown, in this exact format:
{{"response": "<the text of the correct answer>", "response_number": <the number of the correct answer>}}"#
	)
}

/// Decode and validate the LLM's JSON against the number of options.
fn parse_choice(raw: &str, option_count: usize) -> Result<LlmChoice> {
	let json_str = raw.trim();
	let answer: LlmSingleAnswer = serde_json::from_str(json_str).map_err(|e| eyre!("Failed to parse LLM JSON response: {} - raw: '{}'", e, json_str))?;

	if answer.response_number == 0 || answer.response_number > option_count {
		return Err(eyre!("LLM returned invalid answer index: {} (expected 1-{})", answer.response_number, option_count));
	}

	Ok(LlmChoice {
		idx: answer.response_number - 1,
		text: answer.response,
	})
}

async fn ask_once(question: &Question) -> Result<LlmChoice> {
	let client = LlmClient::new().model(Model::Medium).max_tokens(128).force_json();

	let mut conv = Conversation::new();
	conv.add(Role::User, build_prompt(question));

	let response = client.conversation(&conv).await?;
	tracing::debug!("LLM raw response: {}", response.text);

	parse_choice(&response.text, question.options.len())
}

/// Ask the LLM to pick an option, retrying transient failures with linear backoff.
pub async fn ask_llm_for_choice(question: &Question, config: &AppConfig) -> Result<LlmChoice> {
	let mut attempt = 0;
	loop {
		match ask_once(question).await {
			Ok(choice) => return Ok(choice),
			Err(e) if attempt < config.api_retries => {
				attempt += 1;
				elog!("LLM request failed (attempt {attempt}/{}): {e}", config.api_retries);
				tokio::time::sleep(tokio::time::Duration::from_millis(config.api_retry_delay_ms * attempt as u64)).await;
			}
			Err(e) => return Err(e),
		}
	}
}
