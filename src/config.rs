use std::time::Duration;

use v_utils::macros::{MyConfigPrimitives, Settings};

use crate::{login::LoginTiming, sampler::SamplerTiming};

#[derive(Clone, Debug, Default, MyConfigPrimitives, Settings)]
pub struct AppConfig {
	pub username: String,
	pub password: String,
	/// Page the quiz app lives on; login happens there too
	pub target_url: String,
	/// Selector set to use for the target UI (default: "acadally-v3")
	#[primitives(skip)]
	#[serde(default = "default_ui_version")]
	pub ui_version: String,
	/// Click LLM answers without asking on the terminal
	#[serde(default)]
	pub auto_submit: bool,
	/// Run with visible browser window (non-headless mode)
	#[serde(default)]
	pub visible: bool,
	/// Command to run on login timeout or fatal stop (receives message as argument)
	#[serde(default)]
	pub stop_hook: Option<String>,
	/// Period of both polling loops, in ms (default: 1000)
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	/// Upper bound on one login run, in seconds (default: 60)
	#[serde(default = "default_login_timeout_secs")]
	pub login_timeout_secs: u64,
	/// Wait after clicking an option before looking for the next control, in ms (default: 500)
	#[serde(default = "default_settle_delay_ms")]
	pub settle_delay_ms: u64,
	/// Max consecutive failed answer decisions before stopping; declined answers do not count (default: 5)
	#[serde(default = "default_max_consecutive_failures")]
	pub max_consecutive_failures: u32,
	/// Number of retries for transient API errors (500, rate limit, etc) (default: 3)
	#[serde(default = "default_api_retries")]
	pub api_retries: u32,
	/// Base delay in ms between API retries, multiplied by attempt number (default: 1000)
	#[serde(default = "default_api_retry_delay_ms")]
	pub api_retry_delay_ms: u64,
}

fn default_ui_version() -> String {
	"acadally-v3".to_string()
}

fn default_poll_interval_ms() -> u64 {
	1000
}

fn default_login_timeout_secs() -> u64 {
	60
}

fn default_settle_delay_ms() -> u64 {
	500
}

fn default_max_consecutive_failures() -> u32 {
	5
}

fn default_api_retries() -> u32 {
	3
}

fn default_api_retry_delay_ms() -> u64 {
	1000
}

impl AppConfig {
	pub fn login_timing(&self) -> LoginTiming {
		LoginTiming {
			poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
			timeout: Duration::from_secs(self.login_timeout_secs),
		}
	}

	pub fn sampler_timing(&self) -> SamplerTiming {
		SamplerTiming {
			poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
			settle_delay: Duration::from_millis(self.settle_delay_ms),
		}
	}
}
