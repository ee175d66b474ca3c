//! Message Router - turns transport events into subscriber events.

use skooly_protocol::{ChatEvent, decode};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::Error;
use crate::transport::{CloseInfo, TransportEvent};

/// Receives every [`ChatEvent`] a session produces, in order.
///
/// Called synchronously from the inbound pump and from the send path, so
/// implementations must not block.
pub trait EventSink: Send + Sync {
	fn emit(&self, event: ChatEvent);
}

impl EventSink for mpsc::UnboundedSender<ChatEvent> {
	fn emit(&self, event: ChatEvent) {
		let _ = self.send(event);
	}
}

/// Routes one inbound transport event.
///
/// Returns the close details once the connection has ended; the caller owns
/// close handling because it needs the channel state.
pub(crate) fn route(sink: &dyn EventSink, event: TransportEvent) -> Option<CloseInfo> {
	match event {
		TransportEvent::Frame(frame) => {
			trace!(%frame, "inbound frame");
			sink.emit(decode(&frame));
			None
		}
		TransportEvent::Malformed(detail) => {
			sink.emit(Error::MalformedFrame(detail).to_event());
			None
		}
		TransportEvent::Closed(info) => Some(info),
	}
}
