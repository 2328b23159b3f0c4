use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use crate::description::SessionDescription;
use crate::error::NegotiationError;
use crate::output::VideoSink;
use crate::peer::{
    Generation, NegotiationCycles, PeerEvent, PeerEventKind, PeerFactory, PeerSession, SessionId,
    TrackKind,
};

type SharedSink = Arc<Mutex<Box<dyn VideoSink>>>;

pub struct WebRtcPeerFactory {
    api: API,
    config: RTCConfiguration,
    sink: SharedSink,
    next_id: AtomicU64,
}

impl WebRtcPeerFactory {
    pub fn make_config(stun_servers: &[String]) -> RTCConfiguration {
        let ice_servers = if stun_servers.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: stun_servers.to_vec(),
                ..Default::default()
            }]
        };
        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }

    pub fn new(
        stun_servers: &[String],
        sink: Box<dyn VideoSink>,
    ) -> Result<Self, NegotiationError> {
        info!("Initializing WebRTC");
        // Create a MediaEngine object to configure the supported codec
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;

        // NACKs, RTCP reports and the other default interceptors
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut m)?;

        Ok(Self {
            api: APIBuilder::new()
                .with_media_engine(m)
                .with_interceptor_registry(registry)
                .build(),
            config: Self::make_config(stun_servers),
            sink: Arc::new(Mutex::new(sink)),
            next_id: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl PeerFactory for WebRtcPeerFactory {
    async fn create(
        &self,
        events: UnboundedSender<PeerEvent>,
    ) -> Result<Box<dyn PeerSession>, NegotiationError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Initializing WebRTC peer session {}", id);
        let peer_connection = Arc::new(self.api.new_peer_connection(self.config.clone()).await?);

        // We want to receive audio and video
        for kind in [RTPCodecType::Video, RTPCodecType::Audio] {
            peer_connection
                .add_transceiver_from_kind(
                    kind,
                    Some(RTCRtpTransceiverInit {
                        direction: RTCRtpTransceiverDirection::Sendrecv,
                        send_encodings: vec![],
                    }),
                )
                .await?;
        }

        let cycles = Arc::new(NegotiationCycles::default());

        let state_events = events.clone();
        let state_cycles = cycles.clone();
        peer_connection.on_ice_connection_state_change(Box::new(
            move |state: RTCIceConnectionState| {
                info!("ICE connection state of session {} changed to {}", id, state);
                let _ = state_events.send(PeerEvent {
                    session: id,
                    generation: state_cycles.current(),
                    kind: PeerEventKind::StateChanged(state.into()),
                });
                Box::pin(async {})
            },
        ));

        let track_events = events.clone();
        let track_cycles = cycles.clone();
        let sink = self.sink.clone();
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let Some(kind) = TrackKind::of(track.kind()) else {
                    warn!("Ignoring track {} of unspecified kind", track.id());
                    return Box::pin(async {});
                };
                info!("New {} track", <&str>::from(kind));
                let _ = track_events.send(PeerEvent {
                    session: id,
                    generation: track_cycles.current(),
                    kind: PeerEventKind::TrackReceived(kind),
                });
                // audio plays from the same stream, only video needs a surface
                if kind == TrackKind::Video {
                    tokio::spawn(forward_video(track, sink.clone()));
                }
                Box::pin(async {})
            },
        ));

        info!("WebRTC peer session {} initialized", id);
        Ok(Box::new(WebRtcPeerSession {
            id,
            peer_connection,
            cycles,
            events,
        }))
    }
}

async fn forward_video(track: Arc<TrackRemote>, sink: SharedSink) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _)) => {
                if let Err(e) = sink.lock().await.write(packet.payload).await {
                    warn!("Video output failed, detaching track: {}", e);
                    return;
                }
            }
            Err(e) => {
                debug!("Video track ended: {}", e);
                return;
            }
        }
    }
}

pub struct WebRtcPeerSession {
    id: SessionId,
    peer_connection: Arc<RTCPeerConnection>,
    cycles: Arc<NegotiationCycles>,
    events: UnboundedSender<PeerEvent>,
}

#[async_trait]
impl PeerSession for WebRtcPeerSession {
    fn id(&self) -> SessionId {
        self.id
    }

    async fn create_offer(&self) -> Result<Generation, NegotiationError> {
        let generation = self.cycles.begin();
        let offer = self.peer_connection.create_offer(None).await?;
        let mut gathered = self.peer_connection.gathering_complete_promise().await;
        self.peer_connection.set_local_description(offer).await?;
        debug!("WebRTC offer created (session {}, cycle {})", self.id, generation);

        // The whole candidate set goes out in one description, so wait for the
        // end of gathering instead of forwarding candidates one by one.
        let peer_connection = self.peer_connection.clone();
        let cycles = self.cycles.clone();
        let events = self.events.clone();
        let id = self.id;
        tokio::spawn(async move {
            let _ = gathered.recv().await;
            if !cycles.is_current(generation) {
                debug!("Dropping superseded offer (session {}, cycle {})", id, generation);
                return;
            }
            let description = match peer_connection.local_description().await {
                Some(description) => description,
                None => {
                    warn!("ICE gathering finished without a local description");
                    return;
                }
            };
            match SessionDescription::try_from(description) {
                Ok(description) => {
                    let _ = events.send(PeerEvent {
                        session: id,
                        generation,
                        kind: PeerEventKind::LocalDescriptionReady(description),
                    });
                }
                Err(e) => warn!("Unusable local description: {}", e),
            }
        });
        Ok(generation)
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), NegotiationError> {
        let description = RTCSessionDescription::try_from(description)?;
        trace!("Received answer: {}", description.sdp);
        self.peer_connection.set_remote_description(description).await?;
        Ok(())
    }

    async fn close(&self) {
        if let Err(e) = self.peer_connection.close().await {
            warn!("Failed to close peer session {}: {}", self.id, e);
        }
    }
}
