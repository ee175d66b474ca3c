//! Terminal front end for the Skooly chat session.

pub mod cli;
pub mod error;
pub mod logging;
pub mod repl;
pub mod transcript;
