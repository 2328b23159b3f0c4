use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use url::Url;

use super::outbox::Outbox;
use crate::description::SessionDescription;
use crate::signaller::{
    ClientDescription, Dialer, ExchangeId, Link, LinkEvent, SignalEvent, Signaller,
    TungsteniteDialer, RECONNECT_DELAY, SEND_RETRY_INTERVAL,
};
use crate::stream::{QualityTier, StreamId};

/// The writable side of the currently open link.
#[derive(Debug, Clone)]
struct OpenLink {
    outbound: UnboundedSender<String>,
    /// exchanges written on this link and not answered yet, oldest first
    unanswered: Arc<Mutex<VecDeque<ExchangeId>>>,
}

/// state shared with the background tasks
#[derive(Debug)]
struct Shared {
    link: Mutex<Option<OpenLink>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    outbox: Outbox<String>,
    event_sender: UnboundedSender<SignalEvent>,
}

/// Signaller over a persistent WebSocket, redialing forever on a fixed delay.
///
/// The server answers the offers of one connection in the order it received
/// them, which is how answers are matched to their exchange.
pub struct WebSocketSignaller {
    url: Url,
    dialer: Arc<dyn Dialer>,
    sender_task: JoinHandle<()>,
    events: Mutex<UnboundedReceiver<SignalEvent>>,
    shared: Arc<Shared>,
}

impl WebSocketSignaller {
    pub fn new(url: Url) -> Self {
        Self::with_dialer(url, Arc::new(TungsteniteDialer))
    }

    pub fn with_dialer(url: Url, dialer: Arc<dyn Dialer>) -> Self {
        let (event_sender, events) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            link: Mutex::new(None),
            supervisor: Mutex::new(None),
            outbox: Outbox::new(),
            event_sender,
        });
        let sender_task = tokio::spawn(drain_outbox(shared.clone()));
        Self {
            url,
            dialer,
            sender_task,
            events: Mutex::new(events),
            shared,
        }
    }
}

/// Writes the waiting offer as soon as a link is open, checking again every
/// `SEND_RETRY_INTERVAL` while there is none.
async fn drain_outbox(shared: Arc<Shared>) {
    loop {
        shared.outbox.wait().await;
        let link = shared.link.lock().await.clone();
        let Some(link) = link else {
            info!("Waiting for connection to send data...");
            sleep(SEND_RETRY_INTERVAL).await;
            continue;
        };
        let Some((exchange, text)) = shared.outbox.try_take().await else {
            continue;
        };
        link.unanswered.lock().await.push_back(exchange);
        if link.outbound.send(text.clone()).is_err() {
            link.unanswered.lock().await.pop_back();
            shared.outbox.restore(exchange, text).await;
            sleep(SEND_RETRY_INTERVAL).await;
            continue;
        }
        trace!("Offer of exchange {} written", exchange);
        if shared.event_sender.send(SignalEvent::Sent(exchange)).is_err() {
            return;
        }
    }
}

/// Keeps one link open at a time. Every link termination, and every failed
/// dial, is followed by exactly one redial after `RECONNECT_DELAY`.
async fn supervise(url: Url, dialer: Arc<dyn Dialer>, shared: Arc<Shared>) {
    loop {
        info!("Connecting to {}...", url);
        match dialer.dial(&url).await {
            Ok(link) => {
                info!("Connection established");
                if !serve_link(link, &shared).await {
                    return;
                }
                warn!(
                    "Connection closed, retrying connection in {:?}...",
                    RECONNECT_DELAY
                );
            }
            Err(e) => warn!(
                "Connection errored ({}), retrying connection in {:?}...",
                e, RECONNECT_DELAY
            ),
        }
        sleep(RECONNECT_DELAY).await;
    }
}

/// Returns false when nobody listens for events anymore.
async fn serve_link(link: Link, shared: &Shared) -> bool {
    let Link {
        outbound,
        mut inbound,
    } = link;
    let open = OpenLink {
        outbound,
        unanswered: Arc::new(Mutex::new(VecDeque::new())),
    };
    *shared.link.lock().await = Some(open.clone());
    let mut listening = true;
    while let Some(event) = inbound.recv().await {
        match event {
            LinkEvent::Message(text) => match SessionDescription::decode(&text) {
                Ok(description) => match open.unanswered.lock().await.pop_front() {
                    Some(exchange) => {
                        debug!("Received answer to exchange {}", exchange);
                        if shared
                            .event_sender
                            .send(SignalEvent::Answer(exchange, description))
                            .is_err()
                        {
                            listening = false;
                            break;
                        }
                    }
                    None => warn!("Dropping session description nobody asked for"),
                },
                Err(e) => warn!("Dropping signaling message: {}", e),
            },
            LinkEvent::Closed => break,
            LinkEvent::Error(e) => {
                warn!("Websocket error: {}", e);
                break;
            }
        }
    }
    shared.link.lock().await.take();
    listening
}

#[async_trait]
impl Signaller for WebSocketSignaller {
    async fn connect(&self) {
        let mut supervisor = self.shared.supervisor.lock().await;
        if supervisor.is_some() {
            trace!("Signaller already connecting");
            return;
        }
        *supervisor = Some(tokio::spawn(supervise(
            self.url.clone(),
            self.dialer.clone(),
            self.shared.clone(),
        )));
    }

    async fn send_description(
        &self,
        exchange: ExchangeId,
        stream: &StreamId,
        quality: &QualityTier,
        description: &SessionDescription,
    ) {
        info!(
            "Sending local session description for stream {} quality {}",
            stream, quality
        );
        let message = ClientDescription {
            web_rtc_sdp: description.clone(),
            stream: stream.clone(),
            quality: quality.clone(),
        };
        match serde_json::to_string(&message) {
            Ok(text) => self.shared.outbox.put(exchange, text).await,
            Err(e) => error!("Failed to encode signaling message: {}", e),
        }
    }

    async fn withdraw(&self, exchange: ExchangeId) {
        if self.shared.outbox.withdraw(exchange).await {
            debug!("Withdrew unsent offer of exchange {}", exchange);
        }
    }

    async fn recv_event(&self) -> Option<SignalEvent> {
        self.events.lock().await.recv().await
    }

    async fn close(&self) {
        if let Some(supervisor) = self.shared.supervisor.lock().await.take() {
            supervisor.abort();
        }
        self.sender_task.abort();
        self.shared.link.lock().await.take();
    }
}
