//! skooly: chat session for the Skooly school sports-facility reservation guide
//!
//! A [`ChatSession`] connects one signed-in member to the reservation guide
//! bot. It fetches a short-lived credential, opens a WebSocket channel on the
//! first message, and delivers every bot reply or failure to its subscribers
//! as a [`ChatEvent`]. Nothing about credentials, sockets or retries leaks to
//! the caller.
//!
//! ```ignore
//! use skooly::{ChatConfig, ChatEvent, ChatSession, Identity};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = ChatSession::connect(ChatConfig::from_env()?, Identity::new("42", "Jo", "jo@x.com"))?;
//!
//!     session.subscribe(|event| match event {
//!         ChatEvent::Reply { text } => println!("bot: {text}"),
//!         ChatEvent::Error { message } => eprintln!("error: {message}"),
//!     });
//!
//!     session.send_message("Which schools in Seoul have a basketball court I can book?").await;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod handlers;
pub mod session;

pub use handlers::{HandlerId, Subscription};
pub use session::ChatSession;
pub use skooly_protocol::{ChatEvent, ChatMessage, Identity, Sender};
pub use skooly_runtime::{BASE_URL_ENV, ChannelState, ChatConfig, DEFAULT_BASE_URL, Error, Result};
