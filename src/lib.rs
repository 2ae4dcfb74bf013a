//! pixelpair: serverless peer-to-peer media negotiation over still images
//!
//! Two peers set up a direct real-time media connection without a signaling
//! server. Each negotiation step (offer, answer) is a [`NegotiationBundle`]
//! that travels as a picture: scanned from a screen, pasted, or shared as a
//! file.
//!
//! # Features
//! - Three-channel QR multiplex codec (one QR symbol per color channel)
//! - LSB steganography codec with a magic-checked, length-prefixed frame
//! - Offer/answer session over four positional media channels
//!   (video, screen video, screen audio, audio)
//! - Connection status snapshots on every state change
//! - In-memory loopback transport for tests and demos
//! - webrtc-rs transport adapter (feature `webrtc`)
//!
//! # Usage
//! ```rust,no_run
//! use pixelpair::codec::{decode_bundle, encode_bundle, BundleImageOptions, CodecMode};
//! use pixelpair::config::SessionConfig;
//! use pixelpair::testing::LoopbackNetwork;
//! use pixelpair::NegotiationSession;
//! use std::sync::Arc;
//!
//! # async fn run() -> pixelpair::Result<()> {
//! let network = LoopbackNetwork::new();
//! let alice = NegotiationSession::new(Arc::new(network.clone()), SessionConfig::default());
//! let bob = NegotiationSession::new(Arc::new(network), SessionConfig::default());
//!
//! let offer = alice.create_offer_bundle().await?;
//! let picture = encode_bundle(&offer, &BundleImageOptions::qr())?;
//!
//! let scanned = decode_bundle(&picture, CodecMode::QrMultiplex)?;
//! if let Some(answer) = bob.accept_bundle(scanned).await? {
//!     alice.accept_bundle(answer).await?;
//! }
//! # Ok(())
//! # }
//! ```
pub mod bundle;
pub mod codec;
pub mod config;
pub mod errors;
pub mod media;
pub mod session;
pub mod status;
pub mod transport;

// Testing utilities - loopback transport and synthetic data
pub mod testing;

#[cfg(feature = "webrtc")]
pub mod webrtc;

// Re-exports for convenience
pub use bundle::{IceCandidate, NegotiationBundle, SdpType, SessionDescription};
pub use codec::{BundleImageOptions, CodecMode};
pub use config::PixelPairConfig;
pub use errors::{LinkError, Result};
pub use media::{monitor_track, MediaKind, MediaTrack, TrackMonitor};
pub use session::{ChannelRole, NegotiationSession, SessionState};
pub use status::{StatusObserver, StatusReporter, StatusSnapshot};
pub use transport::{Transceiver, Transport, TransportFactory};

/// Initialize logging; `RUST_LOG` overrides the default `pixelpair=info`.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("pixelpair=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
        webrtc_backend: cfg!(feature = "webrtc"),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub webrtc_backend: bool,
}
