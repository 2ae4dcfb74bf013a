//! Connection status reporting.
//!
//! A [`StatusReporter`] watches one transport and hands a full
//! [`StatusSnapshot`] to its observer: once synchronously on attach, then
//! again after every change on any of the four state axes.

use crate::transport::{
    IceConnectionState, IceGatheringState, PeerConnectionState, SignalingState, Transport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Value of all four state axes at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub signaling_state: SignalingState,
    pub ice_connection_state: IceConnectionState,
    pub ice_gathering_state: IceGatheringState,
    pub connection_state: PeerConnectionState,
}

impl StatusSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection_state == PeerConnectionState::Connected
    }

    pub fn is_closed(&self) -> bool {
        self.connection_state == PeerConnectionState::Closed || self.signaling_state == SignalingState::Closed
    }
}

/// Receives status snapshots.
pub trait StatusObserver: Send + Sync {
    fn on_status(&self, snapshot: &StatusSnapshot);
}

impl<F> StatusObserver for F
where
    F: Fn(&StatusSnapshot) + Send + Sync,
{
    fn on_status(&self, snapshot: &StatusSnapshot) {
        self(snapshot)
    }
}

/// Observer that forwards snapshots into an unbounded channel.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<StatusSnapshot>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<StatusSnapshot>) -> Self {
        Self { tx }
    }
}

impl StatusObserver for ChannelObserver {
    fn on_status(&self, snapshot: &StatusSnapshot) {
        // Receiver gone means nobody is listening any more.
        let _ = self.tx.send(*snapshot);
    }
}

/// Background watch over one transport's state axes.
///
/// Dropping the reporter stops the watch.
pub struct StatusReporter {
    transport_id: String,
    task: JoinHandle<()>,
}

impl StatusReporter {
    /// Start reporting on `transport`.
    ///
    /// The observer receives the current snapshot before this returns. Must be
    /// called from within a tokio runtime.
    pub fn attach(transport: &Arc<dyn Transport>, observer: Arc<dyn StatusObserver>) -> Self {
        // Subscribe before the first read so no change slips between the two.
        let mut events = transport.subscribe();
        observer.on_status(&transport.status());

        let transport_id = transport.id().to_string();
        let weak = Arc::downgrade(transport);
        let id = transport_id.clone();
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) if event.is_state_change() => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        log::debug!("Status reporter for {} skipped {} events", id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }

                let Some(transport) = weak.upgrade() else {
                    break;
                };
                let snapshot = transport.status();
                log::debug!(
                    "Status {}: signaling={} ice={} gathering={} connection={}",
                    id,
                    snapshot.signaling_state,
                    snapshot.ice_connection_state,
                    snapshot.ice_gathering_state,
                    snapshot.connection_state
                );
                observer.on_status(&snapshot);
            }
            log::debug!("Status reporter for {} finished", id);
        });

        Self { transport_id, task }
    }

    /// Attach with a channel observer and return its receiving end.
    pub fn channel(transport: &Arc<dyn Transport>) -> (Self, mpsc::UnboundedReceiver<StatusSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self::attach(transport, Arc::new(ChannelObserver::new(tx)));
        (reporter, rx)
    }

    pub fn transport_id(&self) -> &str {
        &self.transport_id
    }

    /// Stop reporting.
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = StatusSnapshot {
            signaling_state: SignalingState::HaveLocalOffer,
            ice_gathering_state: IceGatheringState::Complete,
            ..Default::default()
        };
        let value = serde_json::to_value(snapshot).unwrap();
        assert_eq!(value["signalingState"], "have-local-offer");
        assert_eq!(value["iceConnectionState"], "new");
        assert_eq!(value["iceGatheringState"], "complete");
        assert_eq!(value["connectionState"], "new");
    }

    #[test]
    fn test_closure_and_channel_observers() {
        let seen = std::sync::Mutex::new(Vec::new());
        let observer = |s: &StatusSnapshot| seen.lock().unwrap().push(*s);
        observer.on_status(&StatusSnapshot::default());
        assert_eq!(seen.lock().unwrap().len(), 1);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let observer = ChannelObserver::new(tx);
        observer.on_status(&StatusSnapshot::default());
        assert_eq!(rx.try_recv().unwrap(), StatusSnapshot::default());

        // A dropped receiver is ignored.
        drop(rx);
        observer.on_status(&StatusSnapshot::default());
    }
}
