//! Wire types for the Skooly chat backend.
//!
//! This crate has no I/O. It defines what travels between the chat client and
//! the backend, and the pure functions that translate between the two:
//!
//! - [`Identity`] and [`TokenRequest`] - the identity endpoint request body
//! - [`find_token`] - lenient credential extraction from the identity response
//! - [`encode`] / [`decode`] - outbound frame encoding and inbound frame decoding
//! - [`ChatEvent`] - the closed set of events delivered to subscribers
//! - [`ChatMessage`] - transcript entries kept by the embedding UI

pub mod event;
pub mod frame;
pub mod identity;
pub mod token;

pub use event::{ChatEvent, ChatMessage, Sender};
pub use frame::{EncodeError, decode, encode};
pub use identity::{Identity, TokenRequest};
pub use token::find_token;
