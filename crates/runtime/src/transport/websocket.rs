//! WebSocket transport over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use super::{CloseInfo, ConnectError, Connector, Transport, TransportEvent, TransportParts};
use crate::config::redact_token;
use crate::error::{Error, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects with `ws://` or `wss://` (rustls, webpki roots).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
	async fn connect(&self, url: &Url) -> std::result::Result<TransportParts, ConnectError> {
		debug!(url = %redact_token(url), "websocket handshake");

		let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await.map_err(connect_error)?;
		debug!(status = response.status().as_u16(), "websocket handshake complete");

		let (sink, stream) = stream.split();
		let (tx, message_rx) = mpsc::unbounded_channel();
		let reader = tokio::spawn(read_loop(stream, tx));

		Ok(TransportParts {
			sender: Box::new(WebSocketSender { sink, reader }),
			message_rx,
		})
	}
}

fn connect_error(err: WsError) -> ConnectError {
	match err {
		WsError::Http(response) => {
			let status = response.status();
			ConnectError {
				reason: format!("handshake rejected with HTTP {status}"),
				auth_rejected: matches!(status.as_u16(), 401 | 403),
			}
		}
		other => ConnectError {
			reason: other.to_string(),
			auth_rejected: false,
		},
	}
}

/// Forwards inbound frames until the socket ends. Exactly one
/// [`TransportEvent::Closed`] is sent, unless the receiver is gone first.
async fn read_loop(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<TransportEvent>) {
	let info = loop {
		let event = match stream.next().await {
			Some(Ok(Message::Text(text))) => TransportEvent::Frame(text),
			Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
				Ok(text) => TransportEvent::Frame(text),
				Err(e) => TransportEvent::Malformed(format!("binary frame is not UTF-8: {e}")),
			},
			Some(Ok(Message::Close(frame))) => {
				break frame
					.map(|frame| CloseInfo {
						code: Some(u16::from(frame.code)),
						reason: frame.reason.into_owned(),
					})
					.unwrap_or_default();
			}
			Some(Ok(_)) => continue,
			Some(Err(e)) => {
				break CloseInfo {
					code: None,
					reason: e.to_string(),
				};
			}
			None => {
				break CloseInfo {
					code: None,
					reason: "connection closed".to_string(),
				};
			}
		};

		trace!(?event, "websocket inbound");
		if tx.send(event).is_err() {
			return;
		}
	};

	debug!(code = ?info.code, reason = %info.reason, "websocket reader finished");
	let _ = tx.send(TransportEvent::Closed(info));
}

struct WebSocketSender {
	sink: SplitSink<WsStream, Message>,
	reader: JoinHandle<()>,
}

#[async_trait]
impl Transport for WebSocketSender {
	async fn send(&mut self, frame: String) -> Result<()> {
		self.sink.send(Message::Text(frame)).await.map_err(|e| {
			debug!(error = %e, "websocket write failed");
			Error::ChannelNotOpen
		})
	}

	async fn close(&mut self) {
		if let Err(e) = self.sink.send(Message::Close(None)).await {
			trace!(error = %e, "close frame not sent");
		}
		let _ = self.sink.close().await;
		self.reader.abort();
	}
}

impl Drop for WebSocketSender {
	fn drop(&mut self) {
		self.reader.abort();
	}
}
