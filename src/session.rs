//! The viewer session: keeps one peer session negotiated over one signaller,
//! and replaces the peer session whenever it fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};

use crate::description::SessionDescription;
use crate::peer::{Generation, PeerEvent, PeerEventKind, PeerFactory, PeerSession, SessionId};
use crate::signaller::{ExchangeId, SignalEvent, Signaller, RECONNECT_DELAY};
use crate::stream::{QualityTier, StreamId};
use crate::ui::ViewerUi;

/// How long a written offer may wait for its answer before the peer session is
/// considered failed.
pub const ANSWER_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum Command {
    SetQuality(QualityTier),
    /// build a peer session if there is none
    Rebuild,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Negotiation {
    Idle,
    Gathering(Generation),
    /// offer handed to the signaller, not written yet
    Queued(ExchangeId),
    AwaitingAnswer {
        exchange: ExchangeId,
        deadline: Instant,
    },
    Settled,
}

impl Negotiation {
    /// The exchange whose answer would be applied.
    fn open_exchange(self) -> Option<ExchangeId> {
        match self {
            Negotiation::Queued(exchange) | Negotiation::AwaitingAnswer { exchange, .. } => {
                Some(exchange)
            }
            _ => None,
        }
    }
}

/// Controls a running viewer session.
#[derive(Debug, Clone)]
pub struct ViewerHandle {
    commands: UnboundedSender<Command>,
}

impl ViewerHandle {
    /// Renegotiate with a new quality, even if it is the current one.
    pub fn set_quality(&self, quality: QualityTier) {
        if self.commands.send(Command::SetQuality(quality)).is_err() {
            warn!("Viewer session is gone, ignoring quality change");
        }
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

pub struct ViewerSession {
    stream: StreamId,
    quality: QualityTier,
    signaller: Arc<dyn Signaller>,
    factory: Arc<dyn PeerFactory>,
    ui: Arc<dyn ViewerUi>,
    peer: Option<Box<dyn PeerSession>>,
    negotiation: Negotiation,
    renegotiate_after_answer: bool,
    last_exchange: ExchangeId,
    commands: UnboundedSender<Command>,
    events: UnboundedSender<PeerEvent>,
}

impl ViewerSession {
    /// Connect the signaller, build the first peer session and start
    /// negotiating. Runs until `ViewerHandle::shutdown`.
    pub fn start(
        stream: StreamId,
        quality: QualityTier,
        signaller: Arc<dyn Signaller>,
        factory: Arc<dyn PeerFactory>,
        ui: Arc<dyn ViewerUi>,
    ) -> (ViewerHandle, JoinHandle<()>) {
        let (commands, command_receiver) = mpsc::unbounded_channel();
        let (events, event_receiver) = mpsc::unbounded_channel();
        let session = ViewerSession {
            stream,
            quality,
            signaller,
            factory,
            ui,
            peer: None,
            negotiation: Negotiation::Idle,
            renegotiate_after_answer: false,
            last_exchange: 0,
            commands: commands.clone(),
            events,
        };
        let task = tokio::spawn(session.run(command_receiver, event_receiver));
        (ViewerHandle { commands }, task)
    }

    async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut events: UnboundedReceiver<PeerEvent>,
    ) {
        info!("Starting viewer for stream {} at quality {}", self.stream, self.quality);
        let signaller = self.signaller.clone();
        signaller.connect().await;
        self.rebuild_peer().await;

        loop {
            let deadline = match self.negotiation {
                Negotiation::AwaitingAnswer { deadline, .. } => Some(deadline),
                _ => None,
            };
            tokio::select! {
                Some(command) = commands.recv() => match command {
                    Command::SetQuality(quality) => self.set_quality(quality).await,
                    Command::Rebuild => {
                        if self.peer.is_none() {
                            self.rebuild_peer().await;
                        } else {
                            trace!("Peer session already replaced, ignoring rebuild");
                        }
                    }
                    Command::Shutdown => break,
                },
                Some(event) = events.recv() => self.handle_peer_event(event).await,
                event = signaller.recv_event() => match event {
                    Some(SignalEvent::Sent(exchange)) => self.offer_written(exchange),
                    Some(SignalEvent::Answer(exchange, description)) => {
                        self.apply_remote_description(exchange, description).await
                    }
                    None => {
                        error!("Signaling channel is gone, stopping viewer");
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!("No answer within {:?}, restarting peer session", ANSWER_TIMEOUT);
                    self.fail_peer().await;
                }
            }
        }

        info!("Stopping viewer");
        self.abandon_exchange().await;
        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
        signaller.close().await;
    }

    fn current_id(&self) -> Option<SessionId> {
        self.peer.as_ref().map(|peer| peer.id())
    }

    async fn set_quality(&mut self, quality: QualityTier) {
        info!("Stream quality changed to {}", quality);
        self.quality = quality;
        match self.negotiation {
            Negotiation::AwaitingAnswer { .. } => {
                debug!("Offer in flight, renegotiating once it is answered");
                self.renegotiate_after_answer = true;
            }
            _ => self.negotiate().await,
        }
    }

    /// Start a new negotiation cycle on the current peer session. A cycle still
    /// gathering candidates, or an offer not written yet, is superseded.
    async fn negotiate(&mut self) {
        self.abandon_exchange().await;
        let Some(peer) = self.peer.as_ref() else {
            // the replacement session will negotiate with the current quality
            return;
        };
        match peer.create_offer().await {
            Ok(generation) => self.negotiation = Negotiation::Gathering(generation),
            Err(e) => {
                warn!("Failed to create offer: {}", e);
                self.fail_peer().await;
            }
        }
    }

    /// Forget the current exchange. An offer still waiting in the signaller is
    /// withdrawn; an answer to it arriving later is dropped.
    async fn abandon_exchange(&mut self) {
        if let Negotiation::Queued(exchange) = self.negotiation {
            self.signaller.withdraw(exchange).await;
        }
        self.negotiation = Negotiation::Idle;
    }

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        if self.current_id() != Some(event.session) {
            trace!("Ignoring event from discarded peer session {}", event.session);
            return;
        }
        match event.kind {
            PeerEventKind::LocalDescriptionReady(description) => {
                if self.negotiation != Negotiation::Gathering(event.generation) {
                    debug!("Dropping local description of superseded cycle {}", event.generation);
                    return;
                }
                self.last_exchange += 1;
                let exchange = self.last_exchange;
                info!("Sending session description to server (exchange {})", exchange);
                self.negotiation = Negotiation::Queued(exchange);
                self.signaller
                    .send_description(exchange, &self.stream, &self.quality, &description)
                    .await;
            }
            PeerEventKind::TrackReceived(kind) => {
                let kind: &'static str = kind.into();
                debug!("Peer session {} receives {}", event.session, kind);
            }
            PeerEventKind::StateChanged(state) => {
                self.ui.on_connection_indicator(state);
                if state.is_terminal() {
                    warn!("Connection failed, restarting...");
                    self.fail_peer().await;
                }
            }
        }
    }

    /// The answer deadline only runs once the offer actually left.
    fn offer_written(&mut self, exchange: ExchangeId) {
        if self.negotiation == Negotiation::Queued(exchange) {
            self.negotiation = Negotiation::AwaitingAnswer {
                exchange,
                deadline: Instant::now() + ANSWER_TIMEOUT,
            };
        } else {
            trace!("Offer of abandoned exchange {} written", exchange);
        }
    }

    async fn apply_remote_description(&mut self, exchange: ExchangeId, description: SessionDescription) {
        if self.negotiation.open_exchange() != Some(exchange) {
            warn!("Answer to abandoned exchange {}, dropping it", exchange);
            return;
        }
        let Some(peer) = self.peer.as_ref() else {
            return;
        };
        match peer.set_remote_description(description).await {
            Ok(()) => {
                self.negotiation = Negotiation::Settled;
                if std::mem::take(&mut self.renegotiate_after_answer) {
                    self.negotiate().await;
                }
            }
            Err(e) => {
                warn!("Remote session description rejected: {}", e);
                self.fail_peer().await;
            }
        }
    }

    /// Discard the current peer session and ask for a replacement.
    async fn fail_peer(&mut self) {
        self.abandon_exchange().await;
        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
        self.renegotiate_after_answer = false;
        let _ = self.commands.send(Command::Rebuild);
    }

    async fn rebuild_peer(&mut self) {
        self.abandon_exchange().await;
        if let Some(peer) = self.peer.take() {
            peer.close().await;
        }
        match self.factory.create(self.events.clone()).await {
            Ok(peer) => {
                info!("Peer session {} created", peer.id());
                self.peer = Some(peer);
                self.negotiate().await;
            }
            Err(e) => {
                warn!(
                    "Failed to create peer session ({}), retrying in {:?}",
                    e, RECONNECT_DELAY
                );
                let commands = self.commands.clone();
                tokio::spawn(async move {
                    sleep(RECONNECT_DELAY).await;
                    let _ = commands.send(Command::Rebuild);
                });
            }
        }
    }
}
