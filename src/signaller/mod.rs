mod dialer;
mod http_signaller;
mod outbox;
mod websocket_signaller;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::description::SessionDescription;
use crate::stream::{QualityTier, StreamId};

/// Delay before redialing a dropped signaling transport.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// How often a queued message checks whether the transport became writable.
pub const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Identifies one offer/answer exchange. Allocated by the caller, increasing.
pub type ExchangeId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalEvent {
    /// the offer of this exchange was handed to the transport
    Sent(ExchangeId),
    /// the server's answer to this exchange
    Answer(ExchangeId, SessionDescription),
}

#[async_trait]
pub trait Signaller: Send + Sync + 'static {
    /// establish the transport, no-op when already connecting or connected
    async fn connect(&self);
    /// queue the offer of `exchange`, replacing any offer not sent yet;
    /// returns without waiting for delivery
    async fn send_description(
        &self,
        exchange: ExchangeId,
        stream: &StreamId,
        quality: &QualityTier,
        description: &SessionDescription,
    );
    /// forget the offer of `exchange` if it is still waiting to be sent
    async fn withdraw(&self, exchange: ExchangeId);
    /// next delivery or answer, in the order they happened
    async fn recv_event(&self) -> Option<SignalEvent>;
    /// stop reconnecting and release the transport
    async fn close(&self);
}

/// Message sent to the server when asking to watch a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientDescription {
    #[serde(rename = "webRtcSdp")]
    pub web_rtc_sdp: SessionDescription,
    pub stream: StreamId,
    pub quality: QualityTier,
}

pub use dialer::{Dialer, Link, LinkEvent, TungsteniteDialer};
pub use http_signaller::HttpSignaller;
pub use websocket_signaller::WebSocketSignaller;
