use serde::{Deserialize, Serialize};
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::error::{NegotiationError, SignalingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A complete session description as exchanged with the streaming server.
///
/// Encoded the way browsers and the server encode it:
/// `{"type": "offer", "sdp": "v=0\r\n..."}`. Decoding fails on any other shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }

    pub fn decode(text: &str) -> Result<Self, SignalingError> {
        serde_json::from_str(text).map_err(|e| SignalingError::Protocol(e.to_string()))
    }
}

impl TryFrom<RTCSessionDescription> for SessionDescription {
    type Error = NegotiationError;

    fn try_from(description: RTCSessionDescription) -> Result<Self, Self::Error> {
        let kind = match description.sdp_type {
            RTCSdpType::Offer => SdpKind::Offer,
            RTCSdpType::Answer => SdpKind::Answer,
            other => {
                return Err(NegotiationError::Rejected(format!(
                    "unsupported description type {}",
                    other
                )))
            }
        };
        Ok(Self {
            kind,
            sdp: description.sdp,
        })
    }
}

impl TryFrom<SessionDescription> for RTCSessionDescription {
    type Error = NegotiationError;

    fn try_from(description: SessionDescription) -> Result<Self, Self::Error> {
        Ok(match description.kind {
            SdpKind::Offer => RTCSessionDescription::offer(description.sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(description.sdp)?,
        })
    }
}
