//! Thin wrapper over the WebSocket library: an outbound writer queue plus an
//! inbound event stream per connection. Both the client coordinator and the
//! server dispatcher sit on top of this.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    tungstenite::protocol::{frame::coding::CloseCode, frame::CloseFrame, Message as WsMessage},
    WebSocketStream,
};
use tracing::trace;

use crate::adapter::transport::Outbound;
use crate::domain::message::ABNORMAL_CLOSURE;

#[cfg(feature = "ws-client")]
use crate::adapter::error::WebSocketClientError;
#[cfg(feature = "ws-server")]
use crate::adapter::error::WebSocketServerError;

/// What the inbound side of a connection observed.
#[derive(Debug)]
pub(crate) enum SocketEvent {
    /// A text frame arrived.
    Message(String),
    /// The read side failed; a `Closed` follows.
    Error(String),
    /// The connection is gone. Carries the peer's close code, or 1006 when
    /// the peer vanished without a close frame.
    Closed(u16),
}

/// One established connection, split into a writer queue and an event stream.
pub(crate) struct Socket {
    pub(crate) outbound: mpsc::Sender<Outbound>,
    pub(crate) events: mpsc::Receiver<SocketEvent>,
}

impl Socket {
    /// Dial a WebSocket URL.
    #[cfg(feature = "ws-client")]
    pub(crate) async fn dial(url: &str) -> Result<Self, WebSocketClientError> {
        let url = url::Url::parse(url)
            .map_err(|e| WebSocketClientError::Connection(format!("invalid URL: {e}")))?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| WebSocketClientError::Connection(e.to_string()))?;
        Ok(Self::spawn_io(stream))
    }

    /// Accept an inbound TCP connection as a WebSocket.
    #[cfg(feature = "ws-server")]
    pub(crate) async fn accept(
        stream: tokio::net::TcpStream,
    ) -> Result<Self, WebSocketServerError> {
        let stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| WebSocketServerError::Connection(format!("handshake failed: {e}")))?;
        Ok(Self::spawn_io(stream))
    }

    /// Split the stream and spawn its writer and reader tasks.
    pub(crate) fn spawn_io<S>(stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sink, mut source) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(64);
        let (event_tx, event_rx) = mpsc::channel::<SocketEvent>(64);

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                match frame {
                    Outbound::Text(text) => {
                        trace!(len = text.len(), "sending text frame");
                        if sink.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Outbound::Close(code) => {
                        let _ = sink
                            .send(WsMessage::Close(Some(CloseFrame {
                                code: CloseCode::from(code),
                                reason: "".into(),
                            })))
                            .await;
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            let mut close_code = None;
            while let Some(next) = source.next().await {
                match next {
                    Ok(WsMessage::Text(text)) => {
                        if event_tx.send(SocketEvent::Message(text)).await.is_err() {
                            return;
                        }
                    }
                    Ok(WsMessage::Close(frame)) => {
                        close_code =
                            Some(frame.map(|f| u16::from(f.code)).unwrap_or(ABNORMAL_CLOSURE));
                        break;
                    }
                    // Binary frames are not part of the protocol; ping/pong
                    // are handled by the library.
                    Ok(_) => {}
                    Err(e) => {
                        let _ = event_tx.send(SocketEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
            let _ = event_tx
                .send(SocketEvent::Closed(close_code.unwrap_or(ABNORMAL_CLOSURE)))
                .await;
        });

        Self {
            outbound: outbound_tx,
            events: event_rx,
        }
    }
}
