//! Testing utilities for pixelpair
//!
//! An in-memory transport for running full negotiations without a network,
//! and synthetic bundles and cover images for codec tests.

pub mod loopback;
pub mod synthetic_data;

pub use loopback::{render_sdp, LoopbackNetwork, LoopbackOptions, LoopbackTransceiver, LoopbackTransport};
pub use synthetic_data::{synthetic_answer, synthetic_candidates, synthetic_offer, synthetic_photo, synthetic_sdp};
