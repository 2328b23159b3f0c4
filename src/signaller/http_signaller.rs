use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use super::outbox::Outbox;
use crate::description::SessionDescription;
use crate::error::SignalingError;
use crate::signaller::{ExchangeId, SignalEvent, Signaller};
use crate::stream::{QualityTier, StreamId};

#[derive(Debug)]
struct Request {
    url: Url,
    description: SessionDescription,
}

/// Request/response signaller: each local description is POSTed and the
/// answer is the response body. There is no persistent transport, so there is
/// nothing to reconnect; a failed exchange is logged and dropped.
pub struct HttpSignaller {
    endpoint: Url,
    outbox: Arc<Outbox<Request>>,
    worker: JoinHandle<()>,
    events: Mutex<UnboundedReceiver<SignalEvent>>,
}

impl HttpSignaller {
    /// An exchange not answered within `request_timeout` is failed.
    pub fn new(client: Client, endpoint: Url, request_timeout: Duration) -> Self {
        let outbox = Arc::new(Outbox::new());
        let (event_sender, events) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_exchanges(
            client,
            request_timeout,
            outbox.clone(),
            event_sender,
        ));
        Self {
            endpoint,
            outbox,
            worker,
            events: Mutex::new(events),
        }
    }

    /// `<endpoint>/<stream>?quality=<quality>`
    fn exchange_url(&self, stream: &StreamId, quality: &QualityTier) -> Result<Url, url::ParseError> {
        let mut url = stream.url_under(&self.endpoint, &[])?;
        url.query_pairs_mut().append_pair("quality", quality.as_str());
        Ok(url)
    }
}

/// One exchange at a time, so answers come back in request order.
async fn run_exchanges(
    client: Client,
    request_timeout: Duration,
    outbox: Arc<Outbox<Request>>,
    event_sender: UnboundedSender<SignalEvent>,
) {
    loop {
        let (exchange, request) = outbox.take().await;
        if event_sender.send(SignalEvent::Sent(exchange)).is_err() {
            return;
        }
        match post_description(&client, request_timeout, request).await {
            Ok(answer) => {
                debug!("Received answer to exchange {}", exchange);
                if event_sender.send(SignalEvent::Answer(exchange, answer)).is_err() {
                    return;
                }
            }
            Err(e) => warn!("Signaling exchange {} failed: {}", exchange, e),
        }
    }
}

async fn post_description(
    client: &Client,
    request_timeout: Duration,
    request: Request,
) -> Result<SessionDescription, SignalingError> {
    let body = serde_json::to_string(&request.description)
        .map_err(|e| SignalingError::Protocol(e.to_string()))?;
    trace!("Posting local description to {}: {}", request.url, body);
    let response = client
        .post(request.url)
        .header(CONTENT_TYPE, "application/json")
        .timeout(request_timeout)
        .body(body)
        .send()
        .await
        .map_err(|e| SignalingError::Transport(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(SignalingError::Protocol(format!("server answered {}", status)));
    }
    let text = response
        .text()
        .await
        .map_err(|e| SignalingError::Protocol(e.to_string()))?;
    SessionDescription::decode(&text)
}

#[async_trait]
impl Signaller for HttpSignaller {
    async fn connect(&self) {}

    async fn send_description(
        &self,
        exchange: ExchangeId,
        stream: &StreamId,
        quality: &QualityTier,
        description: &SessionDescription,
    ) {
        let url = match self.exchange_url(stream, quality) {
            Ok(url) => url,
            Err(e) => {
                error!("Cannot build signaling URL for stream {}: {}", stream, e);
                return;
            }
        };
        info!(
            "Sending local session description for stream {} quality {}",
            stream, quality
        );
        let request = Request {
            url,
            description: description.clone(),
        };
        self.outbox.put(exchange, request).await;
    }

    async fn withdraw(&self, exchange: ExchangeId) {
        if self.outbox.withdraw(exchange).await {
            debug!("Withdrew unsent offer of exchange {}", exchange);
        }
    }

    async fn recv_event(&self) -> Option<SignalEvent> {
        self.events.lock().await.recv().await
    }

    async fn close(&self) {
        self.worker.abort();
    }
}
