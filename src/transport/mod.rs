//! Contract with the real-time transport that carries the media.
//!
//! The session never talks to a network stack directly. It drives a
//! [`Transport`] created by a [`TransportFactory`], manipulates its
//! [`Transceiver`]s positionally, and listens to its [`TransportEvent`]s.
//! [`crate::testing::LoopbackNetwork`] provides an in-memory implementation;
//! the `webrtc` feature provides one over webrtc-rs.

pub mod config;
pub mod state;

pub use config::{BundlePolicy, IceServer, IceTransportPolicy, RtcConfiguration};
pub use state::{Direction, IceConnectionState, IceGatheringState, PeerConnectionState, SignalingState};

use crate::bundle::{IceCandidate, SessionDescription};
use crate::errors::Result;
use crate::media::{MediaKind, MediaTrack};
use crate::status::StatusSnapshot;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Buffer size for per-transport event broadcasts.
pub const EVENT_CAPACITY: usize = 64;

/// Notifications emitted by a transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    SignalingStateChange(SignalingState),
    IceConnectionStateChange(IceConnectionState),
    IceGatheringStateChange(IceGatheringState),
    ConnectionStateChange(PeerConnectionState),
    /// A local candidate was gathered.
    IceCandidate(IceCandidate),
    /// Remote media started arriving on the transceiver at `index`.
    Track { index: usize, track: MediaTrack },
}

impl TransportEvent {
    /// True for changes on one of the four status axes.
    pub fn is_state_change(&self) -> bool {
        matches!(
            self,
            TransportEvent::SignalingStateChange(_)
                | TransportEvent::IceConnectionStateChange(_)
                | TransportEvent::IceGatheringStateChange(_)
                | TransportEvent::ConnectionStateChange(_)
        )
    }
}

/// One bidirectional media line of a transport.
#[async_trait]
pub trait Transceiver: Send + Sync {
    fn kind(&self) -> MediaKind;

    async fn direction(&self) -> Direction;

    async fn set_direction(&self, direction: Direction) -> Result<()>;

    /// Swap the outgoing producer without renegotiating. `None` sends nothing.
    async fn replace_track(&self, track: Option<MediaTrack>) -> Result<()>;

    /// Current outgoing producer.
    async fn sender_track(&self) -> Option<MediaTrack>;

    /// Current incoming producer, once remote media is flowing.
    async fn receiver_track(&self) -> Option<MediaTrack>;
}

/// A peer connection.
#[async_trait]
pub trait Transport: Send + Sync {
    fn id(&self) -> &str;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn create_answer(&self) -> Result<SessionDescription>;

    /// Apply a local description; starts candidate gathering.
    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn local_description(&self) -> Option<SessionDescription>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Local candidates gathered so far, in gathering order.
    async fn local_candidates(&self) -> Vec<IceCandidate>;

    async fn add_transceiver(&self, kind: MediaKind, direction: Direction) -> Result<Arc<dyn Transceiver>>;

    /// Transceivers in creation order.
    async fn transceivers(&self) -> Vec<Arc<dyn Transceiver>>;

    /// Current value of all four state axes.
    fn status(&self) -> StatusSnapshot;

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    async fn close(&self) -> Result<()>;
}

/// Creates transports for the session.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, config: &RtcConfiguration) -> Result<Arc<dyn Transport>>;
}
