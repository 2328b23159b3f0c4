use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::error::SignalingError;

/// Something that happened on an open transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Message(String),
    Closed,
    Error(String),
}

/// One established transport connection.
///
/// Text pushed into `outbound` is written in order. `inbound` yields received
/// text frames and ends with `Closed` or `Error` (or simply ends).
#[derive(Debug)]
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    async fn dial(&self, url: &Url) -> Result<Link, SignalingError>;
}

/// Dials real WebSocket connections.
#[derive(Debug, Default, Clone)]
pub struct TungsteniteDialer;

#[async_trait]
impl Dialer for TungsteniteDialer {
    async fn dial(&self, url: &Url) -> Result<Link, SignalingError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SignalingError::Transport(e.to_string()))?;
        debug!("Websocket connection established");
        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_receiver) = mpsc::unbounded_channel::<String>();
        let (inbound_sender, inbound) = mpsc::unbounded_channel::<LinkEvent>();

        // create a task to read all incoming websocket messages
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                trace!("Received websocket message: {:?}", msg);
                let event = match msg {
                    Ok(Message::Text(text)) => LinkEvent::Message(text),
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_sender.send(LinkEvent::Error(e.to_string()));
                        return;
                    }
                };
                if inbound_sender.send(event).is_err() {
                    return;
                }
            }
            let _ = inbound_sender.send(LinkEvent::Closed);
        });

        // create a task to handle all outgoing websocket messages
        tokio::spawn(async move {
            while let Some(text) = outbound_receiver.recv().await {
                trace!("Sending websocket message: {}", text);
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!("Failed to write websocket message: {}", e);
                    return;
                }
            }
            let _ = write.close().await;
        });

        Ok(Link { outbound, inbound })
    }
}
