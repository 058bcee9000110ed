use std::fmt;

use derive_new::new;
use serde::{Deserialize, Serialize};

pub mod adapter;
pub mod channel;
pub mod config;
pub mod host;
pub mod llm;
pub mod login;
pub mod sampler;
pub mod synth;

/// Login credentials for one `login()` invocation. Never persisted.
#[derive(Clone, new)]
pub struct Credential {
	pub username: String,
	pub password: String,
}

impl fmt::Debug for Credential {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credential").field("username", &self.username).field("password", &"<redacted>").finish()
	}
}

/// A choice as rendered on the question card
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, new)]
pub struct QuestionOption {
	/// Position in document order, starting at 0
	pub index: usize,
	/// Explicit label if the card renders one, otherwise derived from `index`
	pub label: String,
	/// Trimmed option text
	pub text: String,
}

/// A displayed question. Two questions are the same iff their trimmed text is.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Question {
	pub text: String,
	pub options: Vec<QuestionOption>,
}

/// Letter label for an option position: A..Z, then AA, AB, ...
pub fn position_label(index: usize) -> String {
	let mut n = index + 1;
	let mut out = Vec::new();
	while n > 0 {
		let rem = (n - 1) % 26;
		out.push(b'A' + rem as u8);
		n = (n - 1) / 26;
	}
	out.reverse();
	String::from_utf8(out).unwrap_or_default()
}

impl fmt::Display for Question {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		writeln!(f, "{}", self.text)?;
		writeln!(f)?;
		for option in &self.options {
			writeln!(f, "( ) {}. {}", option.label, option.text)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn labels_follow_spreadsheet_columns() {
		let labels: Vec<String> = (0..4).map(position_label).collect();
		assert_eq!(labels, ["A", "B", "C", "D"]);
		assert_eq!(position_label(25), "Z");
		assert_eq!(position_label(26), "AA");
		assert_eq!(position_label(27), "AB");
		assert_eq!(position_label(701), "ZZ");
		assert_eq!(position_label(702), "AAA");
	}

	#[test]
	fn credential_debug_hides_password() {
		let cred = Credential::new("alice".into(), "hunter2".into());
		let dbg = format!("{cred:?}");
		assert!(dbg.contains("alice"));
		assert!(!dbg.contains("hunter2"));
	}

	#[test]
	fn display_lists_labelled_options() {
		let q = Question {
			text: "Capital of France?".into(),
			options: vec![QuestionOption::new(0, "A".into(), "Paris".into()), QuestionOption::new(1, "B".into(), "London".into())],
		};
		assert_eq!(q.to_string(), "Capital of France?\n\n( ) A. Paris\n( ) B. London\n");
	}
}
