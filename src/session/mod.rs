//! Offer/answer negotiation over four fixed media channels.
//!
//! A [`NegotiationSession`] owns at most one transport at a time. Each
//! negotiation step builds its transport aside and commits it only when the
//! step succeeds, so a failed step leaves the session exactly as it was.
//!
//! ```text
//! Idle --create_offer_bundle--> Offering --accept answer--> Negotiated
//!   \                                                          |
//!    `--accept offer--> Answering                     close ---+--> Closed
//! ```

pub mod slots;

pub use slots::{ChannelRole, ChannelSlot, ChannelSlots};

use crate::bundle::{IceCandidate, NegotiationBundle, SessionDescription};
use crate::config::SessionConfig;
use crate::errors::{LinkError, Result};
use crate::media::MediaTrack;
use crate::status::{StatusObserver, StatusReporter, StatusSnapshot};
use crate::transport::{IceGatheringState, Transport, TransportEvent, TransportFactory};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Where the session is in the offer/answer exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    /// Our offer is out; waiting for the answer.
    Offering,
    /// We answered a remote offer.
    Answering,
    /// The remote answer to our offer has been applied.
    Negotiated,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Offering => "offering",
            SessionState::Answering => "answering",
            SessionState::Negotiated => "negotiated",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Default)]
struct ActiveSession {
    state: SessionState,
    transport: Option<Arc<dyn Transport>>,
    slots: Option<ChannelSlots>,
    reporter: Option<StatusReporter>,
    /// Bumped by every close; a step prepared under an older epoch is stale.
    epoch: u64,
}

/// A transport built by a step that has not been committed yet.
struct Prepared {
    transport: Arc<dyn Transport>,
    reporter: Option<StatusReporter>,
    epoch: u64,
}

/// Drives one peer's side of the negotiation.
pub struct NegotiationSession {
    factory: Arc<dyn TransportFactory>,
    config: SessionConfig,
    observer: Option<Arc<dyn StatusObserver>>,
    active: RwLock<ActiveSession>,
    in_flight: Mutex<()>,
}

impl NegotiationSession {
    pub fn new(factory: Arc<dyn TransportFactory>, config: SessionConfig) -> Self {
        Self {
            factory,
            config,
            observer: None,
            active: RwLock::new(ActiveSession::default()),
            in_flight: Mutex::new(()),
        }
    }

    /// Report status of every transport this session creates to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn state(&self) -> SessionState {
        self.active.read().await.state
    }

    /// Status of the current transport, if any.
    pub async fn status(&self) -> Option<StatusSnapshot> {
        self.active.read().await.transport.as_ref().map(|t| t.status())
    }

    pub async fn transport_id(&self) -> Option<String> {
        self.active.read().await.transport.as_ref().map(|t| t.id().to_string())
    }

    /// Start a negotiation: fresh transport, four placeholder channels, and
    /// an offer carrying every candidate gathered before completion or the
    /// gather timeout.
    ///
    /// Any existing transport is replaced once the offer is ready.
    pub async fn create_offer_bundle(&self) -> Result<NegotiationBundle> {
        let _guard = self.begin()?;
        log::info!("Creating offer bundle");

        let prepared = self.prepare().await?;
        let transport = Arc::clone(&prepared.transport);
        let step = async {
            let slots = ChannelSlots::allocate(&transport).await?;
            slots.attach_placeholders().await?;

            let offer = transport.create_offer().await?;
            transport.set_local_description(offer).await?;
            self.wait_for_gathering(&transport).await;

            let bundle = local_bundle(&transport, true).await?;
            Ok::<_, LinkError>((slots, bundle))
        };

        match step.await {
            Ok((slots, bundle)) => {
                self.commit(SessionState::Offering, prepared, slots).await?;
                log::info!("Offer ready with {} candidates", bundle.candidates().len());
                Ok(bundle)
            }
            Err(e) => {
                self.discard(prepared).await;
                Err(e)
            }
        }
    }

    /// Apply a bundle from the peer.
    ///
    /// An offer is answered on a fresh transport and the answer returned. An
    /// answer completes our own outstanding offer and returns `None`.
    pub async fn accept_bundle(&self, bundle: NegotiationBundle) -> Result<Option<NegotiationBundle>> {
        let _guard = self.begin()?;

        match bundle {
            NegotiationBundle::Offer {
                description,
                candidates,
            } => self.accept_offer(description, candidates).await.map(Some),
            NegotiationBundle::Answer {
                description,
                candidates,
            } => {
                self.accept_answer(description, candidates).await?;
                Ok(None)
            }
        }
    }

    /// [`accept_bundle`](Self::accept_bundle) for bundle JSON text.
    pub async fn accept_bundle_json(&self, text: &str) -> Result<Option<NegotiationBundle>> {
        let bundle = NegotiationBundle::from_json(text)?;
        self.accept_bundle(bundle).await
    }

    async fn accept_offer(
        &self,
        description: SessionDescription,
        candidates: Vec<IceCandidate>,
    ) -> Result<NegotiationBundle> {
        log::info!("Accepting remote offer with {} candidates", candidates.len());

        let prepared = self.prepare().await?;
        let transport = Arc::clone(&prepared.transport);
        let step = async {
            transport
                .set_remote_description(description)
                .await
                .map_err(rejected)?;
            add_candidates(&transport, &candidates).await;

            let slots = ChannelSlots::adopt(&transport).await?;
            slots.attach_placeholders().await?;

            let answer = transport.create_answer().await?;
            transport.set_local_description(answer).await?;
            self.wait_for_gathering(&transport).await;

            let bundle = local_bundle(&transport, false).await?;
            Ok::<_, LinkError>((slots, bundle))
        };

        match step.await {
            Ok((slots, bundle)) => {
                self.commit(SessionState::Answering, prepared, slots).await?;
                log::info!("Answer ready with {} candidates", bundle.candidates().len());
                Ok(bundle)
            }
            Err(e) => {
                self.discard(prepared).await;
                Err(e)
            }
        }
    }

    async fn accept_answer(&self, description: SessionDescription, candidates: Vec<IceCandidate>) -> Result<()> {
        let transport = {
            let active = self.active.read().await;
            match (active.state, &active.transport) {
                (SessionState::Offering, Some(transport)) => Arc::clone(transport),
                _ => return Err(LinkError::protocol("no active offer")),
            }
        };
        log::info!("Accepting remote answer with {} candidates", candidates.len());

        transport
            .set_remote_description(description)
            .await
            .map_err(rejected)?;
        add_candidates(&transport, &candidates).await;

        let mut active = self.active.write().await;
        let same_transport = active
            .transport
            .as_ref()
            .map(|current| Arc::ptr_eq(current, &transport))
            .unwrap_or(false);
        if active.state != SessionState::Offering || !same_transport {
            return Err(LinkError::protocol("session changed while the answer was applied"));
        }
        active.state = SessionState::Negotiated;
        log::info!("Negotiation complete on {}", transport.id());
        Ok(())
    }

    /// Swap the outgoing producer of `role` without renegotiating.
    ///
    /// Does nothing while no channels are allocated.
    pub async fn replace_channel_track(&self, role: ChannelRole, track: Option<MediaTrack>) -> Result<()> {
        let Some(slot) = self.slot(role).await else {
            log::debug!("No channels allocated, ignoring track for {}", role);
            return Ok(());
        };

        if let Some(track) = &track {
            if track.kind() != role.kind() {
                return Err(LinkError::protocol(format!(
                    "{} channel cannot carry a {} track",
                    role,
                    track.kind().as_str()
                )));
            }
        }
        slot.transceiver.replace_track(track).await?;
        log::info!("Replaced outgoing {} track", role);
        Ok(())
    }

    /// Stop the outgoing producer of `role`. The slot stays allocated.
    pub async fn stop_channel_track(&self, role: ChannelRole) -> Result<()> {
        let Some(slot) = self.slot(role).await else {
            return Ok(());
        };
        if let Some(track) = slot.transceiver.sender_track().await {
            track.stop();
        }
        Ok(())
    }

    /// Current outgoing producer of `role`.
    pub async fn local_track(&self, role: ChannelRole) -> Option<MediaTrack> {
        self.slot(role).await?.transceiver.sender_track().await
    }

    /// Current incoming producer of `role`.
    pub async fn remote_track(&self, role: ChannelRole) -> Option<MediaTrack> {
        self.slot(role).await?.transceiver.receiver_track().await
    }

    /// Tear down the transport and release the channels. Valid in any state.
    ///
    /// A step still in flight is abandoned: its transport is closed when it
    /// finishes and the step fails instead of reopening the session.
    pub async fn close(&self) -> Result<()> {
        let (transport, reporter) = {
            let mut active = self.active.write().await;
            active.epoch = active.epoch.wrapping_add(1);
            active.state = SessionState::Closed;
            active.slots = None;
            (active.transport.take(), active.reporter.take())
        };
        drop(reporter);

        let Some(transport) = transport else {
            return Ok(());
        };
        log::info!("Closing session transport {}", transport.id());
        transport.close().await?;

        if let Some(observer) = &self.observer {
            observer.on_status(&transport.status());
        }
        Ok(())
    }

    fn begin(&self) -> Result<MutexGuard<'_, ()>> {
        self.in_flight
            .try_lock()
            .map_err(|_| LinkError::protocol("negotiation already in progress"))
    }

    async fn slot(&self, role: ChannelRole) -> Option<ChannelSlot> {
        let active = self.active.read().await;
        active.slots.as_ref().map(|slots| slots.get(role).clone())
    }

    async fn prepare(&self) -> Result<Prepared> {
        let epoch = self.active.read().await.epoch;
        let transport = self.factory.create(&self.config.rtc).await?;
        log::debug!("Created transport {}", transport.id());
        let reporter = self
            .observer
            .as_ref()
            .map(|observer| StatusReporter::attach(&transport, Arc::clone(observer)));
        Ok(Prepared {
            transport,
            reporter,
            epoch,
        })
    }

    async fn commit(&self, state: SessionState, prepared: Prepared, slots: ChannelSlots) -> Result<()> {
        let previous = {
            let mut active = self.active.write().await;
            if active.epoch != prepared.epoch {
                drop(active);
                log::info!("Session closed while {} was negotiating", prepared.transport.id());
                self.discard(prepared).await;
                return Err(LinkError::protocol("session closed during negotiation"));
            }
            active.state = state;
            active.slots = Some(slots);
            active.reporter = prepared.reporter;
            active.transport.replace(prepared.transport)
        };

        if let Some(previous) = previous {
            log::info!("Replacing transport {}", previous.id());
            if let Err(e) = previous.close().await {
                log::warn!("Failed to close replaced transport {}: {}", previous.id(), e);
            }
        }
        Ok(())
    }

    async fn discard(&self, prepared: Prepared) {
        drop(prepared.reporter);
        if let Err(e) = prepared.transport.close().await {
            log::warn!("Failed to close abandoned transport {}: {}", prepared.transport.id(), e);
        }
    }

    /// Wait for gathering to complete, at most the configured timeout.
    async fn wait_for_gathering(&self, transport: &Arc<dyn Transport>) {
        let mut events = transport.subscribe();
        if transport.status().ice_gathering_state == IceGatheringState::Complete {
            return;
        }

        let complete = async {
            loop {
                match events.recv().await {
                    Ok(TransportEvent::IceGatheringStateChange(IceGatheringState::Complete)) => return,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => {
                        if transport.status().ice_gathering_state == IceGatheringState::Complete {
                            return;
                        }
                    }
                    Err(RecvError::Closed) => return,
                }
            }
        };

        let timeout = self.config.gather_timeout();
        if tokio::time::timeout(timeout, complete).await.is_err() {
            log::warn!(
                "ICE gathering on {} did not complete within {:?}, using candidates gathered so far",
                transport.id(),
                timeout
            );
        }
    }
}

/// Bundle from the transport's local description and a candidate snapshot.
async fn local_bundle(transport: &Arc<dyn Transport>, offer: bool) -> Result<NegotiationBundle> {
    let description = transport
        .local_description()
        .await
        .ok_or_else(|| LinkError::transport("transport has no local description"))?;
    let candidates = transport.local_candidates().await;

    Ok(if offer {
        NegotiationBundle::Offer {
            description,
            candidates,
        }
    } else {
        NegotiationBundle::Answer {
            description,
            candidates,
        }
    })
}

/// Add remote candidates one at a time; failures are logged and skipped.
async fn add_candidates(transport: &Arc<dyn Transport>, candidates: &[IceCandidate]) -> usize {
    let mut added = 0;
    for candidate in candidates {
        match transport.add_ice_candidate(candidate.clone()).await {
            Ok(()) => added += 1,
            Err(e) => log::warn!("Skipping remote candidate {:?}: {}", candidate.candidate, e),
        }
    }
    log::debug!("Added {} of {} remote candidates", added, candidates.len());
    added
}

/// A remote description the transport refused.
fn rejected(err: LinkError) -> LinkError {
    match err {
        LinkError::Transport(_) => err,
        other => LinkError::transport(format!("remote description rejected: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LoopbackNetwork;

    fn session(network: &LoopbackNetwork) -> NegotiationSession {
        NegotiationSession::new(Arc::new(network.clone()), SessionConfig::default())
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let network = LoopbackNetwork::new();
        let session = session(&network);
        assert_eq!(session.state().await, SessionState::Idle);
        assert!(session.status().await.is_none());
        assert!(session.remote_track(ChannelRole::Video).await.is_none());
    }

    #[tokio::test]
    async fn test_track_ops_without_slots_are_noops() {
        let network = LoopbackNetwork::new();
        let session = session(&network);
        session
            .replace_channel_track(ChannelRole::Audio, Some(MediaTrack::silence()))
            .await
            .unwrap();
        session.stop_channel_track(ChannelRole::Video).await.unwrap();
        assert!(session.local_track(ChannelRole::Audio).await.is_none());
    }

    #[tokio::test]
    async fn test_mismatched_track_without_slots_is_noop() {
        let network = LoopbackNetwork::new();
        let session = session(&network);
        session
            .replace_channel_track(ChannelRole::Audio, Some(MediaTrack::black()))
            .await
            .unwrap();

        session.create_offer_bundle().await.unwrap();
        session.close().await.unwrap();
        session
            .replace_channel_track(ChannelRole::ScreenAudio, Some(MediaTrack::black()))
            .await
            .unwrap();
        assert!(session.local_track(ChannelRole::ScreenAudio).await.is_none());
    }

    #[tokio::test]
    async fn test_offer_allocates_placeholders() {
        let network = LoopbackNetwork::new();
        let session = session(&network);
        let offer = session.create_offer_bundle().await.unwrap();

        assert!(offer.is_offer());
        assert_eq!(session.state().await, SessionState::Offering);
        for role in ChannelRole::ALL {
            let track = session.local_track(role).await.unwrap();
            assert!(track.is_placeholder());
            assert_eq!(track.kind(), role.kind());
        }
    }

    #[tokio::test]
    async fn test_wrong_kind_track_is_rejected() {
        let network = LoopbackNetwork::new();
        let session = session(&network);
        session.create_offer_bundle().await.unwrap();

        let result = session
            .replace_channel_track(ChannelRole::ScreenAudio, Some(MediaTrack::black()))
            .await;
        assert!(matches!(result, Err(LinkError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_close_from_idle() {
        let network = LoopbackNetwork::new();
        let session = session(&network);
        session.close().await.unwrap();
        assert_eq!(session.state().await, SessionState::Closed);
    }

    #[test]
    fn test_rejected_keeps_transport_errors() {
        assert!(matches!(rejected(LinkError::transport("x")), LinkError::Transport(m) if m == "x"));
        assert!(matches!(rejected(LinkError::protocol("y")), LinkError::Transport(_)));
    }
}
