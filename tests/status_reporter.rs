//! Status reporting against loopback transports driven by hand.
//!
//! Run with: cargo test --test status_reporter

use std::sync::{Arc, Mutex};
use std::time::Duration;

use pixelpair::status::{StatusReporter, StatusSnapshot};
use pixelpair::testing::LoopbackNetwork;
use pixelpair::transport::{
    Direction, IceGatheringState, PeerConnectionState, SignalingState, Transport,
};
use pixelpair::MediaKind;
use tokio::sync::mpsc::UnboundedReceiver;

fn pair(network: &LoopbackNetwork) -> (Arc<dyn Transport>, Arc<dyn Transport>) {
    let a: Arc<dyn Transport> = network.transport();
    let b: Arc<dyn Transport> = network.transport();
    (a, b)
}

async fn connect(a: &Arc<dyn Transport>, b: &Arc<dyn Transport>) {
    a.add_transceiver(MediaKind::Video, Direction::SendRecv).await.unwrap();
    a.add_transceiver(MediaKind::Audio, Direction::SendRecv).await.unwrap();

    let offer = a.create_offer().await.unwrap();
    a.set_local_description(offer.clone()).await.unwrap();
    b.set_remote_description(offer).await.unwrap();

    let answer = b.create_answer().await.unwrap();
    b.set_local_description(answer.clone()).await.unwrap();
    a.set_remote_description(answer).await.unwrap();
}

/// Collect snapshots until `done` matches or two seconds pass.
async fn collect_until(
    rx: &mut UnboundedReceiver<StatusSnapshot>,
    done: impl Fn(&StatusSnapshot) -> bool,
) -> Vec<StatusSnapshot> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(snapshot) = rx.recv().await {
            seen.push(snapshot);
            if done(&snapshot) {
                break;
            }
        }
    })
    .await;
    seen
}

#[tokio::test]
async fn test_initial_snapshot_is_synchronous() {
    let network = LoopbackNetwork::new();
    let (a, _b) = pair(&network);

    let (reporter, mut rx) = StatusReporter::channel(&a);
    assert_eq!(reporter.transport_id(), a.id());

    // Delivered before attach returned, no await needed.
    let first = rx.try_recv().unwrap();
    assert_eq!(first, a.status());
    assert_eq!(first.signaling_state, SignalingState::Stable);
    assert_eq!(first.connection_state, PeerConnectionState::New);
}

#[tokio::test]
async fn test_every_change_produces_a_full_snapshot() {
    let network = LoopbackNetwork::new();
    let (a, b) = pair(&network);
    let (_reporter, mut rx) = StatusReporter::channel(&a);

    connect(&a, &b).await;
    let seen = collect_until(&mut rx, StatusSnapshot::is_connected).await;

    let last = seen.last().copied().unwrap();
    assert!(last.is_connected());
    assert_eq!(last.signaling_state, SignalingState::Stable);
    assert_eq!(last.ice_gathering_state, IceGatheringState::Complete);

    assert!(seen
        .iter()
        .any(|s| s.signaling_state == SignalingState::HaveLocalOffer));
    assert!(seen
        .iter()
        .any(|s| s.ice_gathering_state == IceGatheringState::Gathering
            || s.ice_gathering_state == IceGatheringState::Complete));
}

#[tokio::test]
async fn test_closure_observer() {
    let network = LoopbackNetwork::new();
    let (a, b) = pair(&network);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _reporter = StatusReporter::attach(
        &b,
        Arc::new(move |s: &StatusSnapshot| sink.lock().unwrap().push(*s)),
    );
    assert_eq!(seen.lock().unwrap().len(), 1);

    connect(&a, &b).await;
    a.close().await.unwrap();

    let disconnected = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let last = seen.lock().unwrap().last().copied();
            if let Some(s) = last {
                if s.connection_state == PeerConnectionState::Disconnected {
                    return s;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(!disconnected.is_connected());
    assert!(seen.lock().unwrap().iter().any(StatusSnapshot::is_connected));
}

#[tokio::test]
async fn test_detach_stops_reporting() {
    let network = LoopbackNetwork::new();
    let (a, b) = pair(&network);
    let (reporter, mut rx) = StatusReporter::channel(&a);
    assert!(rx.try_recv().is_ok());

    reporter.detach();
    connect(&a, &b).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Sender went away with the aborted task.
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_reporter_ends_when_transport_is_dropped() {
    let network = LoopbackNetwork::new();
    let (a, _b) = pair(&network);
    let (_reporter, mut rx) = StatusReporter::channel(&a);
    assert!(rx.try_recv().is_ok());

    a.close().await.unwrap();
    drop(a);

    let closed = collect_until(&mut rx, StatusSnapshot::is_closed).await;
    assert!(closed.iter().all(|s| s.is_closed()));
    let ended = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert!(ended.is_none());
}
