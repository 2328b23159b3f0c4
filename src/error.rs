use thiserror::Error;

/// Failures of the signaling channel.
///
/// Neither variant is ever returned to the orchestrator: transport failures are
/// absorbed by the reconnect loop and protocol failures drop the message.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling transport unavailable: {0}")]
    Transport(String),
    #[error("malformed signaling message: {0}")]
    Protocol(String),
}

/// An offer or answer could not be produced or applied.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    WebRtc(#[from] webrtc::Error),
    #[error("peer session rejected description: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("stats request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("stats endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected stats body: {0}")]
    Decode(#[from] serde_json::Error),
}
