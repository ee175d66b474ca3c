//! Skooly Runtime - credential exchange, duplex channel lifecycle, transport
//!
//! This crate provides the connection machinery under a chat session:
//!
//! - **Credentials**: Exchanging an identity for a short-lived token, cached per session
//! - **Channel**: Single-flight open, orderly close and disconnect handling
//! - **Router**: Turning inbound frames into subscriber events
//! - **Transport**: WebSocket connector behind a small trait seam
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ skooly-chat  │  ChatSession, subscribers
//! └──────┬───────┘
//!        │ implements EventSink
//! ┌──────▼────────┐
//! │ skooly-runtime│  This crate
//! │  ┌─────────┐  │
//! │  │ Channel │  │  Lifecycle state machine
//! │  └─────────┘  │
//! │  ┌─────────┐  │
//! │  │ Cred    │  │  Identity endpoint, token cache
//! │  └─────────┘  │
//! │  ┌─────────┐  │
//! │  │ Trans   │  │  WebSocket
//! │  └─────────┘  │
//! └───────────────┘
//! ```

pub mod channel;
pub mod config;
pub mod credential;
pub mod error;
pub mod router;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use channel::{Channel, ChannelManager, ChannelState};
pub use config::{BASE_URL_ENV, ChatConfig, DEFAULT_BASE_URL};
pub use credential::{Credential, CredentialProvider, CredentialSource, HttpIdentityEndpoint, IdentityEndpoint, IdentityResponse};
pub use error::{Error, Result};
pub use router::EventSink;
pub use transport::{CloseInfo, ConnectError, Connector, Transport, TransportEvent, TransportParts, WebSocketConnector};
