//! Append-only chat history and its terminal rendering.

use colored::Colorize;
use skooly::{ChatEvent, ChatMessage, Sender};

pub const GREETING: &str = "Hi! I'm the Skooly school sports-facility reservation guide. When you want to exercise, I can help.";

const APOLOGY: &str = "Sorry, I couldn't get an answer right now. Please try again.";

/// One transcript line plus whether it reports a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	pub message: ChatMessage,
	pub failed: bool,
	/// Underlying error text for failed entries.
	pub detail: Option<String>,
}

#[derive(Debug)]
pub struct Transcript {
	entries: Vec<Entry>,
	next_id: u64,
	verbose: bool,
}

impl Transcript {
	/// Starts a transcript that opens with the bot greeting.
	///
	/// With `verbose`, failures show the underlying error after the apology.
	pub fn new(verbose: bool) -> Self {
		let mut transcript = Self {
			entries: Vec::new(),
			next_id: 0,
			verbose,
		};
		transcript.push(Sender::Bot, GREETING, None);
		transcript
	}

	pub fn push_user(&mut self, text: &str) -> &Entry {
		self.push(Sender::User, text, None)
	}

	pub fn push_event(&mut self, event: ChatEvent) -> &Entry {
		match event {
			ChatEvent::Reply { text } => self.push(Sender::Bot, &text, None),
			ChatEvent::Error { message } => self.push(Sender::Bot, APOLOGY, Some(message)),
		}
	}

	pub fn entries(&self) -> &[Entry] {
		&self.entries
	}

	pub fn render(&self, entry: &Entry) -> String {
		let text = &entry.message.text;
		match entry.message.sender {
			Sender::User => format!("{} {text}", "you>".green().bold()),
			Sender::Bot if entry.failed => {
				let mut line = format!("{} {}", "skooly>".cyan().bold(), text.yellow());
				if let (true, Some(detail)) = (self.verbose, entry.detail.as_deref()) {
					line.push_str(&format!(" {}", format!("({detail})").dimmed()));
				}
				line
			}
			Sender::Bot => format!("{} {text}", "skooly>".cyan().bold()),
		}
	}

	fn push(&mut self, sender: Sender, text: &str, detail: Option<String>) -> &Entry {
		self.next_id += 1;
		let id = format!("{}-{}", sender_tag(sender), self.next_id);
		self.entries.push(Entry {
			message: ChatMessage::new(id, sender, text),
			failed: detail.is_some(),
			detail,
		});
		&self.entries[self.entries.len() - 1]
	}
}

fn sender_tag(sender: Sender) -> &'static str {
	match sender {
		Sender::User => "user",
		Sender::Bot => "bot",
	}
}
