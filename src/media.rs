//! Media producers attached to channel slots.
//!
//! Capture and rendering live outside this crate; a [`MediaTrack`] is the
//! handle the negotiation layer passes around. Clones share one underlying
//! producer, so stopping any clone ends them all.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Media kind carried by a track or transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

/// Track ready state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    Live,
    Ended,
}

/// Where a track's media comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    /// Blank video or silent audio held on a slot until a device is chosen.
    Placeholder,
    /// A capture device, by device id.
    Device(String),
    /// A screen or window share, by source id.
    Screen(String),
    /// Media arriving from the peer; `origin` is the id of the peer's
    /// outgoing track.
    Remote { origin: String },
}

struct TrackInner {
    id: String,
    kind: MediaKind,
    label: String,
    source: TrackSource,
    state: watch::Sender<TrackState>,
}

/// Shared handle to a media producer.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(kind: MediaKind, label: impl Into<String>, source: TrackSource) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), kind, label, source)
    }

    fn with_id(id: String, kind: MediaKind, label: impl Into<String>, source: TrackSource) -> Self {
        let (state, _) = watch::channel(TrackState::Live);
        Self {
            inner: Arc::new(TrackInner {
                id,
                kind,
                label: label.into(),
                source,
                state,
            }),
        }
    }

    /// Blank video placeholder.
    pub fn black() -> Self {
        Self::new(MediaKind::Video, "black", TrackSource::Placeholder)
    }

    /// Silent audio placeholder.
    pub fn silence() -> Self {
        Self::new(MediaKind::Audio, "silence", TrackSource::Placeholder)
    }

    /// Placeholder matching `kind`.
    pub fn placeholder(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self::black(),
            MediaKind::Audio => Self::silence(),
        }
    }

    pub fn device(kind: MediaKind, device_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(kind, label, TrackSource::Device(device_id.into()))
    }

    pub fn screen(source_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(MediaKind::Video, label, TrackSource::Screen(source_id.into()))
    }

    /// Incoming track as seen by the receiving peer.
    ///
    /// The id is derived from `origin`, so every view of the same remote
    /// producer carries the same id.
    pub fn remote(kind: MediaKind, origin: impl Into<String>) -> Self {
        let origin = origin.into();
        Self::with_id(
            format!("remote-{}", origin),
            kind,
            format!("remote {}", kind.as_str()),
            TrackSource::Remote { origin },
        )
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn source(&self) -> &TrackSource {
        &self.inner.source
    }

    /// Id of the peer's producer when this is a remote track.
    pub fn origin_id(&self) -> Option<&str> {
        match &self.inner.source {
            TrackSource::Remote { origin } => Some(origin),
            _ => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.inner.source == TrackSource::Placeholder
    }

    pub fn state(&self) -> TrackState {
        *self.inner.state.borrow()
    }

    pub fn is_live(&self) -> bool {
        self.state() == TrackState::Live
    }

    /// End the producer. Idempotent.
    pub fn stop(&self) {
        let previous = self.inner.state.send_replace(TrackState::Ended);
        if previous == TrackState::Live {
            log::debug!("Stopped {} track {} ({})", self.inner.kind.as_str(), self.inner.id, self.inner.label);
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackState> {
        self.inner.state.subscribe()
    }

    /// Resolves once the track has ended.
    pub async fn ended(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel here.
        let _ = rx.wait_for(|state| *state == TrackState::Ended).await;
    }

    /// True when both handles refer to the same producer.
    pub fn same_producer(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("source", &self.inner.source)
            .field("state", &self.state())
            .finish()
    }
}

/// Handle for a running [`monitor_track`] watch.
pub struct TrackMonitor {
    handle: JoinHandle<()>,
}

impl TrackMonitor {
    /// Stop watching without firing the callback.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Call `on_stopped` once when `track` ends.
///
/// Subscribes to the track's state instead of polling it. Must be called from
/// within a tokio runtime.
pub fn monitor_track<F>(track: &MediaTrack, on_stopped: F) -> TrackMonitor
where
    F: FnOnce(MediaTrack) + Send + 'static,
{
    let track = track.clone();
    let handle = tokio::spawn(async move {
        track.ended().await;
        log::info!("Track {} ended", track.id());
        on_stopped(track);
    });
    TrackMonitor { handle }
}
