use clap::Parser;
use colored::Colorize;
use skooly::ChatSession;
use skooly_cli::{cli::Cli, error::Result, logging, repl};
use tracing::info;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run(cli).await {
		eprintln!("{} {err}", "error:".red().bold());
		std::process::exit(err.exit_code());
	}
}

async fn run(cli: Cli) -> Result<()> {
	let config = cli.config()?;
	let identity = cli.identity();
	info!(base_url = config.base_url(), id = %identity.id, name = %identity.display_name, "starting chat");

	let session = ChatSession::connect(config, identity)?;
	repl::run(session, cli.verbose > 0).await
}
