//! WebSocket adapter.
//!
//! Only moves text frames. Connection lifecycle decisions (reconnect,
//! backoff, auth rejection) belong to [`ridesync_core::Channel`].

use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, trace};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported for a handshake the backend refused as unauthorized.
const UNAUTHORIZED_CLOSE_CODE: u16 = 4001;

/// Socket transport failure.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// The handshake got an HTTP error response.
    #[error("handshake rejected with status {status}")]
    Rejected {
        /// HTTP status.
        status: u16,
    },

    /// Any other transport failure.
    #[error("socket error: {0}")]
    Transport(#[from] tungstenite::Error),
}

impl SocketError {
    /// Close code equivalent for an auth rejection, so the channel treats
    /// it like an in-band auth close.
    pub fn auth_close_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status: 401 | 403 } => Some(UNAUTHORIZED_CLOSE_CODE),
            _ => None,
        }
    }
}

/// What the reader produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketMessage {
    /// A text frame.
    Frame(String),
    /// The socket closed.
    Closed {
        /// Close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },
}

/// Sending half.
pub struct SocketWriter {
    sink: SplitSink<Stream, Message>,
}

impl std::fmt::Debug for SocketWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketWriter").finish_non_exhaustive()
    }
}

/// Receiving half.
pub struct SocketReader {
    stream: SplitStream<Stream>,
}

impl std::fmt::Debug for SocketReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketReader").finish_non_exhaustive()
    }
}

/// Open a socket to `url`.
///
/// # Errors
///
/// `Rejected` if the backend answered the upgrade with an HTTP error.
pub async fn connect(url: &str) -> Result<(SocketWriter, SocketReader), SocketError> {
    let (stream, _) = connect_async(url).await.map_err(|err| match err {
        tungstenite::Error::Http(response) => {
            SocketError::Rejected { status: response.status().as_u16() }
        },
        other => SocketError::Transport(other),
    })?;
    debug!("socket connected");
    let (sink, stream) = stream.split();
    Ok((SocketWriter { sink }, SocketReader { stream }))
}

impl SocketWriter {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Transport failure; the socket should be considered closed.
    pub async fn send(&mut self, frame: String) -> Result<(), SocketError> {
        trace!(len = frame.len(), "sending frame");
        self.sink.send(Message::Text(frame)).await?;
        Ok(())
    }

    /// Close the socket.
    pub async fn close(&mut self) {
        if let Err(err) = self.sink.close().await {
            debug!(error = %err, "error closing socket");
        }
    }
}

impl SocketReader {
    /// Next frame or close. Pings and binary frames are skipped.
    pub async fn next(&mut self) -> SocketMessage {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return SocketMessage::Frame(text),
                Some(Ok(Message::Close(frame))) => {
                    return match frame {
                        Some(frame) => SocketMessage::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.into_owned(),
                        },
                        None => SocketMessage::Closed { code: None, reason: String::new() },
                    };
                },
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    return SocketMessage::Closed { code: None, reason: err.to_string() };
                },
                None => {
                    return SocketMessage::Closed { code: None, reason: "stream ended".to_string() };
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_rejection_maps_to_close_code() {
        assert_eq!(SocketError::Rejected { status: 401 }.auth_close_code(), Some(4001));
        assert_eq!(SocketError::Rejected { status: 500 }.auth_close_code(), None);
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails() {
        let result = connect("ws://127.0.0.1:9/ws").await;
        assert!(matches!(result, Err(SocketError::Transport(_))));
    }
}
