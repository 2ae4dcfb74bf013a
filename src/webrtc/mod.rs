//! webrtc-rs transport backend
//!
//! Enabled with the `webrtc` feature. Each transport gets its own API
//! instance with the default codecs and interceptors registered.

pub mod peer;

pub use peer::{RtcTransceiver, RtcTransport};

use crate::errors::{LinkError, Result};
use crate::transport::{RtcConfiguration, Transport, TransportFactory};
use async_trait::async_trait;
use std::sync::Arc;

use ::webrtc::api::interceptor_registry::register_default_interceptors;
use ::webrtc::api::media_engine::MediaEngine;
use ::webrtc::api::APIBuilder;
use ::webrtc::interceptor::registry::Registry;
use ::webrtc::peer_connection::configuration::RTCConfiguration;

/// Creates [`RtcTransport`]s.
#[derive(Debug, Clone, Default)]
pub struct RtcTransportFactory;

impl RtcTransportFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(&self, config: &RtcConfiguration) -> Result<Arc<dyn Transport>> {
        let id = uuid::Uuid::new_v4().to_string();
        log::info!("Creating peer connection {}", id);

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| LinkError::transport(format!("failed to register codecs: {}", e)))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| LinkError::transport(format!("failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let peer_connection = api
            .new_peer_connection(RTCConfiguration::from(config))
            .await
            .map_err(|e| LinkError::transport(format!("failed to create peer connection: {}", e)))?;

        let transport: Arc<dyn Transport> = Arc::new(RtcTransport::new(id, Arc::new(peer_connection)));
        Ok(transport)
    }
}
