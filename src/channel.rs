//! Single egress point from the agents towards the host.
//!
//! Messages are serialized to UTF-8 JSON records tagged by `type` and pushed into an unbounded queue. Delivery is
//! fire-and-forget: a dropped receiver or a serialization failure is never reported back to the sender.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::QuestionOption;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
	Log { message: String },
	QuestionFound { question: String, options: Vec<QuestionOption> },
	/// Both login phases were submitted and the form went away
	LoginComplete,
	/// The login run hit its time bound before completing
	LoginTimeout,
}

/// Sending half, cheap to clone into every agent.
#[derive(Clone, Debug)]
pub struct Outbound {
	tx: mpsc::UnboundedSender<String>,
}

#[derive(Debug)]
pub struct OutboundReceiver {
	rx: mpsc::UnboundedReceiver<String>,
}

pub fn outbound() -> (Outbound, OutboundReceiver) {
	let (tx, rx) = mpsc::unbounded_channel();
	(Outbound { tx }, OutboundReceiver { rx })
}

impl Outbound {
	pub fn send(&self, message: OutboundMessage) {
		match serde_json::to_string(&message) {
			Ok(record) => {
				let _ = self.tx.send(record);
			}
			Err(e) => tracing::error!("Failed to encode outbound message: {e}"),
		}
	}

	/// Log locally and forward the line to the host.
	pub fn log(&self, message: impl Into<String>) {
		let message = message.into();
		tracing::info!(target: "outbound", "{message}");
		self.send(OutboundMessage::Log { message });
	}
}

impl OutboundReceiver {
	/// Next record decoded. Records that fail to decode are skipped with a warning.
	pub async fn recv_message(&mut self) -> Option<OutboundMessage> {
		loop {
			let record = self.rx.recv().await?;
			match serde_json::from_str(&record) {
				Ok(message) => return Some(message),
				Err(e) => tracing::warn!("Skipping undecodable outbound record {record:?}: {e}"),
			}
		}
	}

	/// Everything queued right now, decoded. Does not wait.
	pub fn drain(&mut self) -> Vec<OutboundMessage> {
		let mut out = Vec::new();
		while let Ok(record) = self.rx.try_recv() {
			if let Ok(message) = serde_json::from_str(&record) {
				out.push(message);
			}
		}
		out
	}
}
