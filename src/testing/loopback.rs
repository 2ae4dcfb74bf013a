//! In-memory transport pair for tests and the CLI demo.
//!
//! Transports created by one [`LoopbackNetwork`] find each other through the
//! origin line of their descriptions. Once both sides hold a local and a
//! remote description they link transceivers by position, move to
//! `connected`, and each receiver exposes a remote view of the peer's
//! outgoing track.

use crate::bundle::{IceCandidate, SdpType, SessionDescription};
use crate::errors::{LinkError, Result};
use crate::media::{MediaKind, MediaTrack};
use crate::status::StatusSnapshot;
use crate::transport::{
    Direction, IceConnectionState, IceGatheringState, PeerConnectionState, RtcConfiguration, SignalingState,
    Transceiver, Transport, TransportEvent, TransportFactory, EVENT_CAPACITY,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;

const FIRST_PORT: u16 = 50000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Behavior knobs for transports on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopbackOptions {
    /// Report gathering `complete` after the host candidates. When false,
    /// gathering stays in `gathering` forever.
    pub gather_complete: bool,
    /// Host candidates produced per transport.
    pub host_candidates: usize,
}

impl Default for LoopbackOptions {
    fn default() -> Self {
        Self {
            gather_complete: true,
            host_candidates: 2,
        }
    }
}

struct NetworkInner {
    options: LoopbackOptions,
    peers: Mutex<HashMap<String, Weak<LoopbackTransport>>>,
    next_port: AtomicU16,
}

/// Registry of loopback transports that can reach each other.
#[derive(Clone)]
pub struct LoopbackNetwork {
    inner: Arc<NetworkInner>,
}

impl Default for LoopbackNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::with_options(LoopbackOptions::default())
    }

    pub fn with_options(options: LoopbackOptions) -> Self {
        Self {
            inner: Arc::new(NetworkInner {
                options,
                peers: Mutex::new(HashMap::new()),
                next_port: AtomicU16::new(FIRST_PORT),
            }),
        }
    }

    pub fn options(&self) -> LoopbackOptions {
        self.inner.options
    }

    /// Create a transport registered on this network.
    pub fn transport(&self) -> Arc<LoopbackTransport> {
        let transport = Arc::new(LoopbackTransport::new(Arc::clone(&self.inner)));
        lock(&self.inner.peers).insert(transport.id.clone(), Arc::downgrade(&transport));
        log::debug!("Loopback transport {} registered", transport.id);
        transport
    }

    /// Number of transports that are registered and not closed.
    pub fn live_transports(&self) -> usize {
        lock(&self.inner.peers)
            .values()
            .filter(|weak| weak.upgrade().map(|t| !t.is_closed()).unwrap_or(false))
            .count()
    }
}

impl NetworkInner {
    fn find(&self, id: &str) -> Option<Arc<LoopbackTransport>> {
        lock(&self.peers).get(id).and_then(Weak::upgrade)
    }

    fn remove(&self, id: &str) {
        lock(&self.peers).remove(id);
    }

    fn port(&self) -> u16 {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        if port < FIRST_PORT {
            FIRST_PORT
        } else {
            port
        }
    }
}

#[async_trait]
impl TransportFactory for LoopbackNetwork {
    async fn create(&self, config: &RtcConfiguration) -> Result<Arc<dyn Transport>> {
        log::debug!("Creating loopback transport ({} ICE servers ignored)", config.ice_servers.len());
        let transport: Arc<dyn Transport> = self.transport();
        Ok(transport)
    }
}

struct TransceiverState {
    direction: Direction,
    sender: Option<MediaTrack>,
    peer: Weak<LoopbackTransceiver>,
}

/// Transceiver of a [`LoopbackTransport`].
pub struct LoopbackTransceiver {
    kind: MediaKind,
    state: Mutex<TransceiverState>,
}

impl LoopbackTransceiver {
    fn new(kind: MediaKind, direction: Direction) -> Self {
        Self {
            kind,
            state: Mutex::new(TransceiverState {
                direction,
                sender: None,
                peer: Weak::new(),
            }),
        }
    }

    fn current_direction(&self) -> Direction {
        lock(&self.state).direction
    }

    fn outgoing(&self) -> Option<MediaTrack> {
        let state = lock(&self.state);
        if state.direction.sends() {
            state.sender.clone()
        } else {
            None
        }
    }

    fn incoming(&self) -> Option<MediaTrack> {
        let peer = {
            let state = lock(&self.state);
            if !state.direction.receives() {
                return None;
            }
            state.peer.upgrade()?
        };
        let origin = peer.outgoing()?;
        let view = MediaTrack::remote(origin.kind(), origin.id());
        if !origin.is_live() {
            view.stop();
        }
        Some(view)
    }

    fn link(&self, peer: &Arc<LoopbackTransceiver>) {
        lock(&self.state).peer = Arc::downgrade(peer);
    }

    fn unlink(&self) {
        lock(&self.state).peer = Weak::new();
    }
}

#[async_trait]
impl Transceiver for LoopbackTransceiver {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    async fn direction(&self) -> Direction {
        self.current_direction()
    }

    async fn set_direction(&self, direction: Direction) -> Result<()> {
        lock(&self.state).direction = direction;
        Ok(())
    }

    async fn replace_track(&self, track: Option<MediaTrack>) -> Result<()> {
        if let Some(track) = &track {
            if track.kind() != self.kind {
                return Err(LinkError::transport(format!(
                    "cannot send {} track on {} transceiver",
                    track.kind().as_str(),
                    self.kind.as_str()
                )));
            }
        }
        lock(&self.state).sender = track;
        Ok(())
    }

    async fn sender_track(&self) -> Option<MediaTrack> {
        lock(&self.state).sender.clone()
    }

    async fn receiver_track(&self) -> Option<MediaTrack> {
        self.incoming()
    }
}

#[derive(Default)]
struct PeerState {
    signaling: SignalingState,
    ice: IceConnectionState,
    gathering: IceGatheringState,
    connection: PeerConnectionState,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    remote_peer: Option<String>,
    local_candidates: Vec<IceCandidate>,
    remote_candidates: Vec<IceCandidate>,
    transceivers: Vec<Arc<LoopbackTransceiver>>,
    version: u64,
    linked: bool,
    closed: bool,
}

impl PeerState {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(LinkError::transport("transport is closed"));
        }
        Ok(())
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            signaling_state: self.signaling,
            ice_connection_state: self.ice,
            ice_gathering_state: self.gathering,
            connection_state: self.connection,
        }
    }

    fn media_lines(&self) -> Vec<(MediaKind, Direction)> {
        self.transceivers
            .iter()
            .map(|t| (t.kind, t.current_direction()))
            .collect()
    }

    fn ready_to_link(&self) -> bool {
        !self.closed && !self.linked && self.local.is_some() && self.remote.is_some()
    }
}

/// In-memory [`Transport`].
pub struct LoopbackTransport {
    id: String,
    network: Arc<NetworkInner>,
    state: Mutex<PeerState>,
    events: broadcast::Sender<TransportEvent>,
}

impl LoopbackTransport {
    fn new(network: Arc<NetworkInner>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            id: format!("loopback-{}", uuid::Uuid::new_v4().simple()),
            network,
            state: Mutex::new(PeerState::default()),
            events,
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub fn is_linked(&self) -> bool {
        lock(&self.state).linked
    }

    /// Candidates the peer handed us, in the order they were added.
    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        lock(&self.state).remote_candidates.clone()
    }

    fn emit(&self, event: TransportEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_all(&self, events: Vec<TransportEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    fn gather(&self) {
        let options = self.network.options;
        let mut events = Vec::new();
        {
            let mut state = lock(&self.state);
            if state.gathering != IceGatheringState::New {
                return;
            }
            state.gathering = IceGatheringState::Gathering;
            events.push(TransportEvent::IceGatheringStateChange(IceGatheringState::Gathering));

            for n in 0..options.host_candidates {
                let candidate = IceCandidate::new(
                    format!(
                        "candidate:{} 1 udp 2130706431 127.0.0.1 {} typ host",
                        n + 1,
                        self.network.port()
                    ),
                    Some("0".to_string()),
                    Some(0),
                );
                state.local_candidates.push(candidate.clone());
                events.push(TransportEvent::IceCandidate(candidate));
            }

            if options.gather_complete {
                state.gathering = IceGatheringState::Complete;
                events.push(TransportEvent::IceGatheringStateChange(IceGatheringState::Complete));
            }
        }
        log::debug!("Loopback {} gathered {} candidates", self.id, options.host_candidates);
        self.emit_all(events);
    }

    fn try_connect(&self) {
        let remote_id = {
            let state = lock(&self.state);
            if !state.ready_to_link() {
                return;
            }
            match &state.remote_peer {
                Some(id) => id.clone(),
                None => return,
            }
        };

        let Some(peer) = self.network.find(&remote_id) else {
            log::debug!("Loopback {} has no reachable peer {}", self.id, remote_id);
            return;
        };

        {
            let peer_state = lock(&peer.state);
            if !peer_state.ready_to_link() || peer_state.remote_peer.as_deref() != Some(self.id.as_str()) {
                return;
            }
        }

        let ours = lock(&self.state).transceivers.clone();
        let theirs = lock(&peer.state).transceivers.clone();
        for (a, b) in ours.iter().zip(theirs.iter()) {
            a.link(b);
            b.link(a);
        }

        self.mark_connected();
        peer.mark_connected();
        log::info!("Loopback {} linked with {}", self.id, peer.id);
    }

    fn mark_connected(&self) {
        let transceivers = {
            let mut state = lock(&self.state);
            state.linked = true;
            state.ice = IceConnectionState::Connected;
            state.connection = PeerConnectionState::Connected;
            state.transceivers.clone()
        };

        self.emit(TransportEvent::IceConnectionStateChange(IceConnectionState::Checking));
        self.emit(TransportEvent::ConnectionStateChange(PeerConnectionState::Connecting));
        self.emit(TransportEvent::IceConnectionStateChange(IceConnectionState::Connected));
        self.emit(TransportEvent::ConnectionStateChange(PeerConnectionState::Connected));

        for (index, transceiver) in transceivers.iter().enumerate() {
            if let Some(track) = transceiver.incoming() {
                self.emit(TransportEvent::Track { index, track });
            }
        }
    }

    fn peer_left(&self) {
        let transceivers = {
            let mut state = lock(&self.state);
            if state.closed || !state.linked {
                return;
            }
            state.linked = false;
            state.ice = IceConnectionState::Disconnected;
            state.connection = PeerConnectionState::Disconnected;
            state.transceivers.clone()
        };
        for transceiver in &transceivers {
            transceiver.unlink();
        }
        self.emit(TransportEvent::IceConnectionStateChange(IceConnectionState::Disconnected));
        self.emit(TransportEvent::ConnectionStateChange(PeerConnectionState::Disconnected));
    }
}

fn next_signaling(current: SignalingState, sdp_type: SdpType, local: bool) -> Result<SignalingState> {
    use SignalingState::*;

    let next = match (sdp_type, local, current) {
        (SdpType::Offer, true, Stable | HaveLocalOffer) => HaveLocalOffer,
        (SdpType::Offer, false, Stable | HaveRemoteOffer) => HaveRemoteOffer,
        (SdpType::Answer, true, HaveRemoteOffer) => Stable,
        (SdpType::Answer, false, HaveLocalOffer) => Stable,
        _ => {
            return Err(LinkError::transport(format!(
                "cannot apply {} {} in signaling state {}",
                if local { "local" } else { "remote" },
                sdp_type.as_str(),
                current
            )))
        }
    };
    Ok(next)
}

/// Render a loopback description.
pub fn render_sdp(origin: &str, version: u64, media: &[(MediaKind, Direction)]) -> String {
    let mut sdp = String::new();
    sdp.push_str("v=0\r\n");
    sdp.push_str(&format!("o=loopback {} {} IN IP4 127.0.0.1\r\n", origin, version));
    sdp.push_str("s=-\r\nt=0 0\r\n");

    let mids: Vec<String> = (0..media.len()).map(|i| i.to_string()).collect();
    sdp.push_str(&format!("a=group:BUNDLE {}\r\n", mids.join(" ")));

    for (index, (kind, direction)) in media.iter().enumerate() {
        let payload = match kind {
            MediaKind::Video => 96,
            MediaKind::Audio => 111,
        };
        sdp.push_str(&format!("m={} 9 UDP/TLS/RTP/SAVPF {}\r\n", kind.as_str(), payload));
        sdp.push_str(&format!("a=mid:{}\r\n", index));
        sdp.push_str(&format!("a={}\r\n", direction.as_str()));
    }
    sdp
}

struct ParsedSdp {
    origin: String,
    media: Vec<(MediaKind, Direction)>,
}

fn parse_sdp(sdp: &str) -> Result<ParsedSdp> {
    let mut lines = sdp.lines().map(str::trim).filter(|line| !line.is_empty());
    if lines.next() != Some("v=0") {
        return Err(LinkError::transport("description does not start with v=0"));
    }

    let mut origin = None;
    let mut media: Vec<(MediaKind, Direction)> = Vec::new();
    for line in lines {
        if let Some(rest) = line.strip_prefix("o=") {
            let mut fields = rest.split_whitespace();
            if fields.next() != Some("loopback") {
                return Err(LinkError::transport("description was not produced by a loopback transport"));
            }
            origin = fields.next().map(str::to_string);
        } else if let Some(rest) = line.strip_prefix("m=") {
            let kind = match rest.split_whitespace().next() {
                Some("video") => MediaKind::Video,
                Some("audio") => MediaKind::Audio,
                other => return Err(LinkError::transport(format!("unsupported media line {:?}", other))),
            };
            media.push((kind, Direction::SendRecv));
        } else if let Some(attr) = line.strip_prefix("a=") {
            if let (Some(direction), Some(last)) = (Direction::parse(attr), media.last_mut()) {
                last.1 = direction;
            }
        }
    }

    let origin = origin.ok_or_else(|| LinkError::transport("description has no origin line"))?;
    Ok(ParsedSdp { origin, media })
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let mut state = lock(&self.state);
        state.ensure_open()?;
        state.version += 1;
        log::debug!("Loopback {} creating offer with {} media lines", self.id, state.transceivers.len());
        Ok(SessionDescription::offer(render_sdp(&self.id, state.version, &state.media_lines())))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let mut state = lock(&self.state);
        state.ensure_open()?;
        if state.signaling != SignalingState::HaveRemoteOffer {
            return Err(LinkError::transport(format!(
                "cannot answer in signaling state {}",
                state.signaling
            )));
        }
        state.version += 1;
        Ok(SessionDescription::answer(render_sdp(&self.id, state.version, &state.media_lines())))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let signaling = {
            let mut state = lock(&self.state);
            state.ensure_open()?;
            let next = next_signaling(state.signaling, description.sdp_type, true)?;
            parse_sdp(&description.sdp)?;
            state.signaling = next;
            state.local = Some(description);
            next
        };
        self.emit(TransportEvent::SignalingStateChange(signaling));
        self.gather();

        self.try_connect();
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let parsed = parse_sdp(&description.sdp)?;
        let signaling = {
            let mut state = lock(&self.state);
            state.ensure_open()?;
            let next = next_signaling(state.signaling, description.sdp_type, false)?;

            match description.sdp_type {
                SdpType::Offer => {
                    for (index, (kind, _)) in parsed.media.iter().enumerate() {
                        if index >= state.transceivers.len() {
                            state
                                .transceivers
                                .push(Arc::new(LoopbackTransceiver::new(*kind, Direction::RecvOnly)));
                        } else if state.transceivers[index].kind != *kind {
                            return Err(LinkError::transport(format!(
                                "media line {} is {} but transceiver is {}",
                                index,
                                kind.as_str(),
                                state.transceivers[index].kind.as_str()
                            )));
                        }
                    }
                }
                _ => {
                    if parsed.media.len() != state.transceivers.len() {
                        return Err(LinkError::transport(format!(
                            "answer has {} media lines, offer had {}",
                            parsed.media.len(),
                            state.transceivers.len()
                        )));
                    }
                }
            }

            state.signaling = next;
            state.remote_peer = Some(parsed.origin);
            state.remote = Some(description);
            next
        };
        self.emit(TransportEvent::SignalingStateChange(signaling));

        self.try_connect();
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        lock(&self.state).local.clone()
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = lock(&self.state);
        state.ensure_open()?;
        if state.remote.is_none() {
            return Err(LinkError::transport("remote description not set"));
        }
        // Empty candidate marks end-of-candidates.
        if candidate.candidate.is_empty() {
            return Ok(());
        }
        if !candidate.candidate.starts_with("candidate:") {
            return Err(LinkError::transport(format!("unparseable candidate {:?}", candidate.candidate)));
        }
        log::debug!("Loopback {} added remote candidate {}", self.id, candidate.candidate);
        state.remote_candidates.push(candidate);
        Ok(())
    }

    async fn local_candidates(&self) -> Vec<IceCandidate> {
        lock(&self.state).local_candidates.clone()
    }

    async fn add_transceiver(&self, kind: MediaKind, direction: Direction) -> Result<Arc<dyn Transceiver>> {
        let mut state = lock(&self.state);
        state.ensure_open()?;
        let transceiver = Arc::new(LoopbackTransceiver::new(kind, direction));
        state.transceivers.push(Arc::clone(&transceiver));
        Ok(transceiver)
    }

    async fn transceivers(&self) -> Vec<Arc<dyn Transceiver>> {
        lock(&self.state)
            .transceivers
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn Transceiver>)
            .collect()
    }

    fn status(&self) -> StatusSnapshot {
        lock(&self.state).snapshot()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<()> {
        let (peer_id, transceivers) = {
            let mut state = lock(&self.state);
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.linked = false;
            state.signaling = SignalingState::Closed;
            state.ice = IceConnectionState::Closed;
            state.connection = PeerConnectionState::Closed;
            (state.remote_peer.clone(), state.transceivers.clone())
        };

        for transceiver in &transceivers {
            transceiver.unlink();
        }
        self.network.remove(&self.id);

        self.emit(TransportEvent::SignalingStateChange(SignalingState::Closed));
        self.emit(TransportEvent::IceConnectionStateChange(IceConnectionState::Closed));
        self.emit(TransportEvent::ConnectionStateChange(PeerConnectionState::Closed));

        if let Some(peer) = peer_id.and_then(|id| self.network.find(&id)) {
            peer.peer_left();
        }
        log::info!("Loopback transport {} closed", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected_pair(network: &LoopbackNetwork) -> (Arc<LoopbackTransport>, Arc<LoopbackTransport>) {
        let a = network.transport();
        let b = network.transport();
        a.add_transceiver(MediaKind::Video, Direction::SendRecv).await.unwrap();
        a.add_transceiver(MediaKind::Audio, Direction::SendRecv).await.unwrap();

        let offer = a.create_offer().await.unwrap();
        a.set_local_description(offer.clone()).await.unwrap();
        b.set_remote_description(offer).await.unwrap();
        for t in b.transceivers().await {
            t.set_direction(Direction::SendRecv).await.unwrap();
        }
        let answer = b.create_answer().await.unwrap();
        b.set_local_description(answer.clone()).await.unwrap();
        a.set_remote_description(answer).await.unwrap();
        (a, b)
    }

    #[test]
    fn test_render_and_parse_sdp() {
        let sdp = render_sdp("peer-1", 3, &[(MediaKind::Video, Direction::SendRecv), (MediaKind::Audio, Direction::RecvOnly)]);
        let parsed = parse_sdp(&sdp).unwrap();
        assert_eq!(parsed.origin, "peer-1");
        assert_eq!(
            parsed.media,
            vec![(MediaKind::Video, Direction::SendRecv), (MediaKind::Audio, Direction::RecvOnly)]
        );

        assert!(parse_sdp("garbage").is_err());
        assert!(parse_sdp("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n").is_err());
    }

    #[test]
    fn test_signaling_transitions() {
        use SignalingState::*;
        assert_eq!(next_signaling(Stable, SdpType::Offer, true).unwrap(), HaveLocalOffer);
        assert_eq!(next_signaling(HaveLocalOffer, SdpType::Answer, false).unwrap(), Stable);
        assert_eq!(next_signaling(Stable, SdpType::Offer, false).unwrap(), HaveRemoteOffer);
        assert_eq!(next_signaling(HaveRemoteOffer, SdpType::Answer, true).unwrap(), Stable);
        assert!(next_signaling(Stable, SdpType::Answer, false).is_err());
        assert!(next_signaling(HaveLocalOffer, SdpType::Rollback, true).is_err());
    }

    #[tokio::test]
    async fn test_gathering_emits_candidates_then_complete() {
        let network = LoopbackNetwork::new();
        let a = network.transport();
        let mut events = a.subscribe();

        let offer = a.create_offer().await.unwrap();
        a.set_local_description(offer).await.unwrap();

        assert_eq!(a.status().ice_gathering_state, IceGatheringState::Complete);
        assert_eq!(a.local_candidates().await.len(), 2);

        let mut candidates = 0;
        let mut complete = false;
        while let Ok(event) = events.try_recv() {
            match event {
                TransportEvent::IceCandidate(_) => {
                    assert!(!complete, "candidate after completion");
                    candidates += 1;
                }
                TransportEvent::IceGatheringStateChange(IceGatheringState::Complete) => complete = true,
                _ => {}
            }
        }
        assert_eq!(candidates, 2);
        assert!(complete);
    }

    #[tokio::test]
    async fn test_pair_links_by_position() {
        let network = LoopbackNetwork::new();
        let (a, b) = connected_pair(&network).await;

        assert!(a.is_linked() && b.is_linked());
        assert_eq!(a.status().connection_state, PeerConnectionState::Connected);

        let camera = MediaTrack::device(MediaKind::Video, "cam", "Camera");
        a.transceivers().await[0].replace_track(Some(camera.clone())).await.unwrap();

        let seen = b.transceivers().await[0].receiver_track().await.unwrap();
        assert_eq!(seen.origin_id(), Some(camera.id()));
        assert!(b.transceivers().await[1].receiver_track().await.is_none());
    }

    #[tokio::test]
    async fn test_candidate_requires_remote_description() {
        let network = LoopbackNetwork::new();
        let a = network.transport();
        let candidate = IceCandidate::new("candidate:1 1 udp 1 127.0.0.1 1 typ host", None, None);
        assert!(matches!(a.add_ice_candidate(candidate).await, Err(LinkError::Transport(_))));
    }

    #[tokio::test]
    async fn test_kind_mismatch_on_replace() {
        let network = LoopbackNetwork::new();
        let a = network.transport();
        let video = a.add_transceiver(MediaKind::Video, Direction::SendRecv).await.unwrap();
        assert!(video.replace_track(Some(MediaTrack::silence())).await.is_err());
        assert!(video.replace_track(None).await.is_ok());
    }

    #[tokio::test]
    async fn test_close_disconnects_peer() {
        let network = LoopbackNetwork::new();
        let (a, b) = connected_pair(&network).await;
        assert_eq!(network.live_transports(), 2);

        a.close().await.unwrap();
        a.close().await.unwrap();

        assert_eq!(a.status().signaling_state, SignalingState::Closed);
        assert_eq!(b.status().connection_state, PeerConnectionState::Disconnected);
        assert_eq!(network.live_transports(), 1);
        assert!(a.create_offer().await.is_err());
    }
}
