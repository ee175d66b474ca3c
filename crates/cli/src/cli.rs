use clap::Parser;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use skooly::{BASE_URL_ENV, ChatConfig, Identity};

/// Cargo-like help colors.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
}

#[derive(Parser, Debug)]
#[command(name = "skooly")]
#[command(about = "Chat with the Skooly school sports-facility reservation guide")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Chat backend base URL (falls back to $SKOOLY_CHAT_URL)
	#[arg(long, value_name = "URL")]
	pub base_url: Option<String>,

	/// Member id of the signed-in user
	#[arg(long, value_name = "ID")]
	pub id: String,

	/// Display name sent to the chatbot
	#[arg(long, value_name = "NAME", default_value = "guest")]
	pub name: String,

	/// Username or email
	#[arg(long, value_name = "CONTACT", default_value = "")]
	pub contact: String,
}

impl Cli {
	pub fn identity(&self) -> Identity {
		Identity::new(self.id.trim(), self.name.trim(), self.contact.trim())
	}

	/// Resolves the backend from `--base-url`, then the environment, then the
	/// built-in default.
	pub fn config(&self) -> skooly::Result<ChatConfig> {
		let env = std::env::var(BASE_URL_ENV).ok();
		self.config_with_env(env.as_deref())
	}

	fn config_with_env(&self, env: Option<&str>) -> skooly::Result<ChatConfig> {
		ChatConfig::resolve(self.base_url.as_deref(), env)
	}
}
