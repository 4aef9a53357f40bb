//! Streaming socket primitive and its tokio-tungstenite implementation.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::Message;

use crate::error::SocketError;

/// Frame delivered by an open connection. `Closed` and `Failed` are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    Closed { reason: Option<String> },
    Failed { error: String },
}

/// Write half of an open connection. Both calls return without waiting on
/// the network.
pub trait SocketHandle: Send + Sync {
    fn send(&self, text: String) -> Result<(), SocketError>;

    fn close(&self);
}

pub struct SocketConnection {
    pub handle: Arc<dyn SocketHandle>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<SocketConnection, SocketError>;
}

enum Outbound {
    Text(String),
    Close,
}

struct TungsteniteHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle for TungsteniteHandle {
    fn send(&self, text: String) -> Result<(), SocketError> {
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| SocketError::Closed)
    }

    fn close(&self) {
        let _ = self.outbound.send(Outbound::Close);
    }
}

/// WebSocket connector: one writer task fed by a channel, one reader task
/// forwarding frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<SocketConnection, SocketError> {
        let mut request = url
            .into_client_request()
            .map_err(|e| SocketError::InvalidRequest(e.to_string()))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| SocketError::InvalidRequest(e.to_string()))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| SocketError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SocketError::Connect(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(command) = outbound_rx.recv().await {
                match command {
                    Outbound::Text(text) => {
                        if let Err(err) = write.send(Message::Text(text)).await {
                            tracing::debug!(error = %err, "Socket write failed");
                            break;
                        }
                    }
                    Outbound::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let frame = match message {
                    Ok(Message::Text(text)) => InboundFrame::Text(text),
                    Ok(Message::Binary(bytes)) => InboundFrame::Binary(bytes),
                    Ok(Message::Close(frame)) => {
                        let _ = inbound_tx.send(InboundFrame::Closed {
                            reason: frame.map(|f| f.reason.to_string()),
                        });
                        return;
                    }
                    Ok(_) => continue,
                    Err(err) => {
                        let _ = inbound_tx.send(InboundFrame::Failed {
                            error: err.to_string(),
                        });
                        return;
                    }
                };
                if inbound_tx.send(frame).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(InboundFrame::Closed { reason: None });
        });

        Ok(SocketConnection {
            handle: Arc::new(TungsteniteHandle {
                outbound: outbound_tx,
            }),
            inbound: inbound_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_connecting() {
        let result = TungsteniteConnector.connect("not a url", &[]).await;
        assert!(matches!(result, Err(SocketError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_invalid_header_is_rejected() {
        let headers = vec![("bad header".to_string(), "x".to_string())];
        let result = TungsteniteConnector
            .connect("ws://127.0.0.1:9/ws", &headers)
            .await;
        assert!(matches!(result, Err(SocketError::InvalidRequest(_))));
    }
}
