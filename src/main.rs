use std::sync::Arc;

use acad_headless::{
	adapter::{ChromePage, Selectors},
	config::{AppConfig, SettingsFlags},
	host::{Host, LlmDecider, run_stop_hook},
};
use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::Parser;
use color_eyre::{Result, eyre::eyre};
use futures::StreamExt;
use tracing_subscriber::EnvFilter;
use v_utils::{elog, log};

#[derive(Parser)]
#[command(name = "acad_headless")]
#[command(about = "Automated quiz login and answering", long_about = None)]
struct Cli {
	/// Report questions but never answer them
	#[arg(long)]
	observe_only: bool,

	#[command(flatten)]
	settings: SettingsFlags,
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

	let cli = Cli::parse();
	let config = AppConfig::try_build(cli.settings).map_err(|e| eyre!("Failed to load config: {}", e))?;

	let selectors = Selectors::for_version(&config.ui_version).ok_or_else(|| {
		let known: Vec<&str> = Selectors::KNOWN.iter().map(|s| s.version).collect();
		eyre!("Unknown ui_version '{}' (known: {})", config.ui_version, known.join(", "))
	})?;
	log!("Using selector set {}", selectors.version);

	// Configure browser based on visibility flag
	let browser_config = if config.visible {
		BrowserConfig::builder()
			.with_head() // Visible browser with UI
			.build()
			.map_err(|e| eyre!("Failed to build browser config: {}", e))?
	} else {
		BrowserConfig::builder()
			.build() // Headless mode
			.map_err(|e| eyre!("Failed to build browser config: {}", e))?
	};

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Spawn a task to handle browser events (suppress errors as they're mostly noise)
	let handle = tokio::spawn(async move {
		while let Some(_event) = handler.next().await {
			// Silently consume events to prevent the browser from hanging
		}
	});

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;

	log!("Navigating to {}", config.target_url);
	page.goto(&config.target_url).await.map_err(|e| eyre!("Failed to navigate: {}", e))?;

	let page = Arc::new(ChromePage::new(page, selectors));
	let decider = (!cli.observe_only).then(|| LlmDecider::new(config.clone()));
	let mut host = Host::new(config.clone(), page, decider);

	let outcome = tokio::select! {
		result = host.run() => result,
		_ = tokio::signal::ctrl_c() => {
			log!("Interrupted, shutting down...");
			Ok(())
		}
	};

	if let Err(e) = &outcome {
		elog!("Stopped: {e}");
		run_stop_hook(&config, &format!("Stopped: {e}"));
	}

	// Clean up
	drop(host);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	drop(browser);
	handle.abort();

	outcome
}
