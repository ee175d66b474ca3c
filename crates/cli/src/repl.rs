//! Line-oriented chat loop.

use std::io::BufRead;

use anyhow::Context;
use colored::Colorize;
use skooly::{ChatEvent, ChatSession};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::transcript::Transcript;

const HELP: &str = "\
Type a message and press Enter to ask about school sports facilities.

Commands:
  /help       Show this help
  /quick      List quick questions
  /quick N    Ask quick question N
  /close      Disconnect now; the next message reconnects
  /exit       Leave the chat (also Ctrl-D)";

/// Canned questions offered by `/quick`.
pub const QUICK_QUESTIONS: [&str; 3] = [
	"Recommend schools in Seoul where I can play basketball",
	"Recommend a club that suits me",
	"Are there facilities I can use for free?",
];

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input<'a> {
	Empty,
	Help,
	Close,
	Exit,
	QuickList,
	/// A preset from [`QUICK_QUESTIONS`].
	Quick(&'static str),
	/// `/quick` with an argument that names no preset.
	BadQuick(&'a str),
	Unknown(&'a str),
	Message(&'a str),
}

impl<'a> Input<'a> {
	pub fn parse(line: &'a str) -> Self {
		let line = line.trim();
		if let Some(arg) = line.strip_prefix("/quick") {
			if arg.is_empty() {
				return Input::QuickList;
			}
			if arg.starts_with(char::is_whitespace) {
				return Input::quick(arg.trim_start());
			}
		}
		match line {
			"" => Input::Empty,
			"/help" | "/?" => Input::Help,
			"/close" => Input::Close,
			"/exit" | "/quit" => Input::Exit,
			command if command.starts_with('/') => Input::Unknown(command),
			message => Input::Message(message),
		}
	}

	fn quick(arg: &'a str) -> Self {
		match arg.parse::<usize>() {
			Ok(n) if (1..=QUICK_QUESTIONS.len()).contains(&n) => Input::Quick(QUICK_QUESTIONS[n - 1]),
			_ => Input::BadQuick(arg),
		}
	}
}

fn quick_list() -> String {
	let mut out = String::from("Quick questions:");
	for (n, question) in QUICK_QUESTIONS.iter().enumerate() {
		out.push_str(&format!("\n  {}. {question}", n + 1));
	}
	out
}

/// Runs the chat until `/exit` or end of input, then closes the session.
pub async fn run(session: ChatSession, verbose: bool) -> Result<()> {
	let (event_tx, mut events) = mpsc::unbounded_channel::<ChatEvent>();
	let _subscription = session.subscribe(move |event| {
		let _ = event_tx.send(event);
	});

	// Sends run on their own task, in order, so input stays live while a
	// connection is still opening.
	let (outbox, mut queued) = mpsc::unbounded_channel::<String>();
	let sender = tokio::spawn({
		let session = session.clone();
		async move {
			while let Some(text) = queued.recv().await {
				session.send_message(&text).await;
			}
		}
	});

	let mut lines = spawn_stdin_reader()?;
	let mut transcript = Transcript::new(verbose);
	println!("{}", transcript.render(&transcript.entries()[0]));
	println!("{}", "Type /help for commands.".dimmed());

	loop {
		tokio::select! {
			line = lines.recv() => {
				let Some(line) = line else {
					debug!("end of input");
					break;
				};
				match Input::parse(&line) {
					Input::Empty => {}
					Input::Help => println!("{HELP}"),
					Input::Exit => break,
					Input::Close => {
						session.close().await;
						println!("{}", "Disconnected. Your next message reconnects.".dimmed());
					}
					Input::QuickList => println!("{}", quick_list()),
					Input::Quick(text) => {
						let entry = transcript.push_user(text).clone();
						println!("{}", transcript.render(&entry));
						let _ = outbox.send(text.to_string());
					}
					Input::BadQuick(arg) => {
						println!("{}", format!("No quick question {arg}.").yellow());
						println!("{}", quick_list());
					}
					Input::Unknown(command) => {
						println!("{}", format!("Unknown command {command}, try /help.").yellow());
					}
					Input::Message(text) => {
						transcript.push_user(text);
						let _ = outbox.send(text.to_string());
					}
				}
			}
			Some(event) = events.recv() => {
				let entry = transcript.push_event(event).clone();
				println!("{}", transcript.render(&entry));
			}
		}
	}

	drop(outbox);
	sender.abort();
	session.close().await;
	Ok(())
}

/// Reads stdin on a plain thread so a pending read never holds up exit.
fn spawn_stdin_reader() -> Result<mpsc::UnboundedReceiver<String>> {
	let (tx, rx) = mpsc::unbounded_channel();
	std::thread::Builder::new()
		.name("skooly-stdin".to_string())
		.spawn(move || {
			for line in std::io::stdin().lock().lines() {
				let Ok(line) = line else { break };
				if tx.send(line).is_err() {
					break;
				}
			}
		})
		.context("failed to start the input reader")?;
	Ok(rx)
}
