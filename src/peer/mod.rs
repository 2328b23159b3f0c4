mod webrtc_peer;

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use strum_macros::IntoStaticStr;
use tokio::sync::mpsc::UnboundedSender;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

use crate::description::SessionDescription;
use crate::error::NegotiationError;

pub use webrtc_peer::{WebRtcPeerFactory, WebRtcPeerSession};

/// Identity of one PeerSession instance.
pub type SessionId = u64;
/// Tag of one negotiation cycle within a PeerSession.
pub type Generation = u64;

/// Simplified view of the ICE connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// A session in a terminal state can only be replaced.
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Failed
    }

    /// Colour of the connection indicator next to the player.
    pub fn indicator_color(self) -> Option<&'static str> {
        match self {
            ConnectionState::Idle => None,
            ConnectionState::Connecting => Some("#ffc107"),
            ConnectionState::Connected => Some("#28a745"),
            ConnectionState::Disconnected | ConnectionState::Failed => Some("#dc3545"),
        }
    }
}

impl From<RTCIceConnectionState> for ConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => {
                ConnectionState::Idle
            }
            RTCIceConnectionState::Checking => ConnectionState::Connecting,
            RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                ConnectionState::Connected
            }
            RTCIceConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCIceConnectionState::Failed | RTCIceConnectionState::Closed => {
                ConnectionState::Failed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    /// `None` for a track of no known kind.
    pub fn of(codec: RTPCodecType) -> Option<Self> {
        match codec {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            RTPCodecType::Unspecified => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerEventKind {
    /// ICE gathering finished; the description carries every candidate.
    LocalDescriptionReady(SessionDescription),
    TrackReceived(TrackKind),
    StateChanged(ConnectionState),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerEvent {
    pub session: SessionId,
    pub generation: Generation,
    pub kind: PeerEventKind,
}

#[async_trait]
pub trait PeerSession: Send + Sync + 'static {
    fn id(&self) -> SessionId;
    /// start a negotiation cycle, superseding any cycle still gathering
    async fn create_offer(&self) -> Result<Generation, NegotiationError>;
    /// apply the server's answer
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError>;
    async fn close(&self);
}

/// Builds fresh PeerSessions; a failed session is never reused.
#[async_trait]
pub trait PeerFactory: Send + Sync + 'static {
    async fn create(
        &self,
        events: UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerSession>, NegotiationError>;
}

/// Monotonic negotiation cycle counter. Results of a cycle are only delivered
/// while it is still the current one.
#[derive(Debug, Default)]
pub struct NegotiationCycles {
    current: AtomicU64,
}

impl NegotiationCycles {
    pub fn begin(&self) -> Generation {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> Generation {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }
}
