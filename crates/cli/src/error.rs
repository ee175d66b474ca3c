use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
	#[error(transparent)]
	Chat(#[from] skooly::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl CliError {
	/// Process exit code for this failure.
	pub fn exit_code(&self) -> i32 {
		match self {
			// usage problems, like clap's own
			CliError::Chat(skooly::Error::Config(_) | skooly::Error::InvalidIdentity) => 2,
			_ => 1,
		}
	}
}
