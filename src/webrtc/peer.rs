//! [`Transport`] over a webrtc-rs peer connection.

use crate::bundle::{IceCandidate, SdpType, SessionDescription};
use crate::errors::{LinkError, Result};
use crate::media::{MediaKind, MediaTrack};
use crate::status::StatusSnapshot;
use crate::transport::{
    BundlePolicy, Direction, IceConnectionState, IceGatheringState, IceServer, IceTransportPolicy,
    PeerConnectionState, RtcConfiguration, SignalingState, Transceiver, Transport, TransportEvent, EVENT_CAPACITY,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use ::webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use ::webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use ::webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use ::webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use ::webrtc::ice_transport::ice_server::RTCIceServer;
use ::webrtc::peer_connection::configuration::RTCConfiguration;
use ::webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use ::webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use ::webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use ::webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use ::webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use ::webrtc::peer_connection::signaling_state::RTCSignalingState;
use ::webrtc::peer_connection::RTCPeerConnection;
use ::webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use ::webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use ::webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use ::webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use ::webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use ::webrtc::track::track_local::TrackLocal;
use ::webrtc::track::track_remote::TrackRemote;

const STREAM_ID: &str = "pixelpair";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl From<IceServer> for RTCIceServer {
    fn from(server: IceServer) -> Self {
        RTCIceServer {
            urls: server.urls,
            username: server.username.unwrap_or_default(),
            credential: server.credential.unwrap_or_default(),
            ..Default::default()
        }
    }
}

impl From<&RtcConfiguration> for RTCConfiguration {
    fn from(config: &RtcConfiguration) -> Self {
        RTCConfiguration {
            ice_servers: config.ice_servers.iter().cloned().map(RTCIceServer::from).collect(),
            ice_transport_policy: match config.ice_transport_policy {
                IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
                IceTransportPolicy::All => RTCIceTransportPolicy::All,
            },
            bundle_policy: match config.bundle_policy {
                BundlePolicy::Balanced => RTCBundlePolicy::Balanced,
                BundlePolicy::MaxCompat => RTCBundlePolicy::MaxCompat,
                BundlePolicy::MaxBundle => RTCBundlePolicy::MaxBundle,
            },
            ..Default::default()
        }
    }
}

impl From<RTCSignalingState> for SignalingState {
    fn from(state: RTCSignalingState) -> Self {
        match state {
            RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
            RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
            RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
            RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }
}

impl From<RTCIceConnectionState> for IceConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Checking => IceConnectionState::Checking,
            RTCIceConnectionState::Connected => IceConnectionState::Connected,
            RTCIceConnectionState::Completed => IceConnectionState::Completed,
            RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
            RTCIceConnectionState::Failed => IceConnectionState::Failed,
            RTCIceConnectionState::Closed => IceConnectionState::Closed,
            _ => IceConnectionState::New,
        }
    }
}

impl From<RTCIceGatheringState> for IceGatheringState {
    fn from(state: RTCIceGatheringState) -> Self {
        match state {
            RTCIceGatheringState::Gathering => IceGatheringState::Gathering,
            RTCIceGatheringState::Complete => IceGatheringState::Complete,
            _ => IceGatheringState::New,
        }
    }
}

impl From<RTCIceGathererState> for IceGatheringState {
    fn from(state: RTCIceGathererState) -> Self {
        match state {
            RTCIceGathererState::Gathering => IceGatheringState::Gathering,
            RTCIceGathererState::Complete => IceGatheringState::Complete,
            _ => IceGatheringState::New,
        }
    }
}

impl From<RTCPeerConnectionState> for PeerConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
            RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
            RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
            RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
            RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
            _ => PeerConnectionState::New,
        }
    }
}

impl From<Direction> for RTCRtpTransceiverDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
            Direction::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            Direction::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
            Direction::Inactive => RTCRtpTransceiverDirection::Inactive,
        }
    }
}

impl From<RTCRtpTransceiverDirection> for Direction {
    fn from(direction: RTCRtpTransceiverDirection) -> Self {
        match direction {
            RTCRtpTransceiverDirection::Sendrecv => Direction::SendRecv,
            RTCRtpTransceiverDirection::Sendonly => Direction::SendOnly,
            RTCRtpTransceiverDirection::Recvonly => Direction::RecvOnly,
            _ => Direction::Inactive,
        }
    }
}

fn codec_type(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Audio => RTPCodecType::Audio,
        MediaKind::Video => RTPCodecType::Video,
    }
}

fn media_kind(codec: RTPCodecType) -> MediaKind {
    match codec {
        RTPCodecType::Audio => MediaKind::Audio,
        _ => MediaKind::Video,
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    let converted = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => return Err(LinkError::transport("rollback descriptions are not supported")),
    };
    converted.map_err(|e| LinkError::transport(format!("invalid SDP: {}", e)))
}

fn from_rtc_description(description: RTCSessionDescription) -> SessionDescription {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => SdpType::Offer,
    };
    SessionDescription {
        sdp_type,
        sdp: description.sdp,
    }
}

/// Local sample track whose id is the producer's id, so the peer's remote
/// track carries it.
fn local_track_for(track: &MediaTrack) -> Arc<dyn TrackLocal + Send + Sync> {
    let codec = match track.kind() {
        MediaKind::Video => RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        MediaKind::Audio => RTCRtpCodecCapability {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
    };
    Arc::new(TrackLocalStaticSample::new(codec, track.id().to_string(), STREAM_ID.to_string()))
}

type RemoteTracks = Arc<Mutex<HashMap<String, MediaTrack>>>;

/// Transceiver of an [`RtcTransport`].
pub struct RtcTransceiver {
    inner: Arc<RTCRtpTransceiver>,
    sender: Mutex<Option<MediaTrack>>,
    remote_tracks: RemoteTracks,
}

impl RtcTransceiver {
    fn mid(&self) -> Option<String> {
        self.inner.mid().map(|mid| mid.to_string())
    }
}

#[async_trait]
impl Transceiver for RtcTransceiver {
    fn kind(&self) -> MediaKind {
        media_kind(self.inner.kind())
    }

    async fn direction(&self) -> Direction {
        self.inner.direction().into()
    }

    async fn set_direction(&self, direction: Direction) -> Result<()> {
        self.inner.set_direction(direction.into()).await;
        Ok(())
    }

    async fn replace_track(&self, track: Option<MediaTrack>) -> Result<()> {
        let local = track.as_ref().map(local_track_for);
        self.inner
            .sender()
            .await
            .replace_track(local)
            .await
            .map_err(|e| LinkError::transport(format!("failed to replace track: {}", e)))?;
        *lock(&self.sender) = track;
        Ok(())
    }

    async fn sender_track(&self) -> Option<MediaTrack> {
        lock(&self.sender).clone()
    }

    async fn receiver_track(&self) -> Option<MediaTrack> {
        let mid = self.mid()?;
        lock(&self.remote_tracks).get(&mid).cloned()
    }
}

/// Peer connection backed by webrtc-rs.
pub struct RtcTransport {
    id: String,
    peer_connection: Arc<RTCPeerConnection>,
    local_candidates: Arc<Mutex<Vec<IceCandidate>>>,
    remote_tracks: RemoteTracks,
    transceivers: tokio::sync::Mutex<Vec<Arc<RtcTransceiver>>>,
    events: broadcast::Sender<TransportEvent>,
}

impl RtcTransport {
    pub(crate) fn new(id: String, peer_connection: Arc<RTCPeerConnection>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let transport = Self {
            id,
            peer_connection,
            local_candidates: Arc::new(Mutex::new(Vec::new())),
            remote_tracks: Arc::new(Mutex::new(HashMap::new())),
            transceivers: tokio::sync::Mutex::new(Vec::new()),
            events,
        };
        transport.install_handlers();
        transport
    }

    fn install_handlers(&self) {
        let pc = &self.peer_connection;

        let candidates = Arc::clone(&self.local_candidates);
        let events = self.events.clone();
        let peer_id = self.id.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => {
                        log::debug!("ICE candidate gathered for {}: {}", peer_id, init.candidate);
                        let mut record = IceCandidate::new(init.candidate, init.sdp_mid, init.sdp_mline_index);
                        record.username_fragment = init.username_fragment;
                        lock(&candidates).push(record.clone());
                        let _ = events.send(TransportEvent::IceCandidate(record));
                    }
                    Err(e) => log::warn!("Dropping unserializable candidate for {}: {}", peer_id, e),
                }
            }
            Box::pin(async {})
        }));

        let events = self.events.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            let _ = events.send(TransportEvent::IceGatheringStateChange(state.into()));
            Box::pin(async {})
        }));

        let events = self.events.clone();
        pc.on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
            let _ = events.send(TransportEvent::SignalingStateChange(state.into()));
            Box::pin(async {})
        }));

        let events = self.events.clone();
        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            let _ = events.send(TransportEvent::IceConnectionStateChange(state.into()));
            Box::pin(async {})
        }));

        let events = self.events.clone();
        let peer_id = self.id.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            log::info!("Peer {} connection state: {}", peer_id, state);
            let _ = events.send(TransportEvent::ConnectionStateChange(state.into()));
            Box::pin(async {})
        }));

        let events = self.events.clone();
        let remote_tracks = Arc::clone(&self.remote_tracks);
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  transceiver: Arc<RTCRtpTransceiver>|
                  -> Pin<Box<dyn Future<Output = ()> + Send>> {
                let Some(mid) = transceiver.mid().map(|mid| mid.to_string()) else {
                    return Box::pin(async {});
                };
                let remote = MediaTrack::remote(media_kind(track.kind()), track.id());
                log::info!("Remote track {} arrived on mid {}", remote.id(), mid);
                lock(&remote_tracks).insert(mid.clone(), remote.clone());
                if let Ok(index) = mid.parse::<usize>() {
                    let _ = events.send(TransportEvent::Track { index, track: remote });
                }
                Box::pin(async {})
            },
        ));
    }

    fn wrap(&self, inner: Arc<RTCRtpTransceiver>) -> Arc<RtcTransceiver> {
        Arc::new(RtcTransceiver {
            inner,
            sender: Mutex::new(None),
            remote_tracks: Arc::clone(&self.remote_tracks),
        })
    }
}

#[async_trait]
impl Transport for RtcTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        log::info!("Creating SDP offer for peer {}", self.id);
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(|e| LinkError::transport(format!("failed to create offer: {}", e)))?;
        Ok(from_rtc_description(offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        log::info!("Creating SDP answer for peer {}", self.id);
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(|e| LinkError::transport(format!("failed to create answer: {}", e)))?;
        Ok(from_rtc_description(answer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.peer_connection
            .set_local_description(description)
            .await
            .map_err(|e| LinkError::transport(format!("failed to set local description: {}", e)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        log::info!("Setting remote description for peer {}", self.id);
        let description = to_rtc_description(description)?;
        self.peer_connection
            .set_remote_description(description)
            .await
            .map_err(|e| LinkError::transport(format!("failed to set remote description: {}", e)))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.peer_connection.local_description().await.map(from_rtc_description)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        log::debug!("Adding ICE candidate for peer {}: {}", self.id, candidate.candidate);
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(|e| LinkError::transport(format!("failed to add ICE candidate: {}", e)))
    }

    async fn local_candidates(&self) -> Vec<IceCandidate> {
        lock(&self.local_candidates).clone()
    }

    async fn add_transceiver(&self, kind: MediaKind, direction: Direction) -> Result<Arc<dyn Transceiver>> {
        let init = RTCRtpTransceiverInit {
            direction: direction.into(),
            send_encodings: vec![],
        };
        let inner = self
            .peer_connection
            .add_transceiver_from_kind(codec_type(kind), Some(init))
            .await
            .map_err(|e| LinkError::transport(format!("failed to add transceiver: {}", e)))?;

        let transceiver = self.wrap(inner);
        self.transceivers.lock().await.push(Arc::clone(&transceiver));
        Ok(transceiver)
    }

    async fn transceivers(&self) -> Vec<Arc<dyn Transceiver>> {
        let current = self.peer_connection.get_transceivers().await;
        let mut known = self.transceivers.lock().await;

        // Transceivers created by a remote offer are wrapped on first sight.
        for inner in current {
            if !known.iter().any(|t| Arc::ptr_eq(&t.inner, &inner)) {
                let wrapped = self.wrap(inner);
                known.push(wrapped);
            }
        }
        known.iter().map(|t| Arc::clone(t) as Arc<dyn Transceiver>).collect()
    }

    fn status(&self) -> StatusSnapshot {
        let pc = &self.peer_connection;
        StatusSnapshot {
            signaling_state: pc.signaling_state().into(),
            ice_connection_state: pc.ice_connection_state().into(),
            ice_gathering_state: pc.ice_gathering_state().into(),
            connection_state: pc.connection_state().into(),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn close(&self) -> Result<()> {
        log::info!("Closing peer connection {}", self.id);
        self.peer_connection
            .close()
            .await
            .map_err(|e| LinkError::transport(format!("failed to close peer connection: {}", e)))
    }
}
