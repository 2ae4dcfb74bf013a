//! The four positional media channels.
//!
//! Both peers allocate the same four transceivers in the same order, so the
//! index alone tells the receiver which role incoming media plays.

use crate::errors::{LinkError, Result};
use crate::media::{MediaKind, MediaTrack};
use crate::transport::{Direction, Transceiver, Transport};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Role of a channel slot, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelRole {
    Video,
    ScreenVideo,
    ScreenAudio,
    Audio,
}

impl ChannelRole {
    /// Every role, in slot order.
    pub const ALL: [ChannelRole; 4] = [
        ChannelRole::Video,
        ChannelRole::ScreenVideo,
        ChannelRole::ScreenAudio,
        ChannelRole::Audio,
    ];

    pub fn index(&self) -> usize {
        match self {
            ChannelRole::Video => 0,
            ChannelRole::ScreenVideo => 1,
            ChannelRole::ScreenAudio => 2,
            ChannelRole::Audio => 3,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn kind(&self) -> MediaKind {
        match self {
            ChannelRole::Video | ChannelRole::ScreenVideo => MediaKind::Video,
            ChannelRole::ScreenAudio | ChannelRole::Audio => MediaKind::Audio,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Video => "video",
            ChannelRole::ScreenVideo => "screen-video",
            ChannelRole::ScreenAudio => "screen-audio",
            ChannelRole::Audio => "audio",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role bound to its transceiver.
#[derive(Clone)]
pub struct ChannelSlot {
    pub role: ChannelRole,
    pub transceiver: Arc<dyn Transceiver>,
}

/// The four slots of one transport.
#[derive(Clone)]
pub struct ChannelSlots {
    slots: [ChannelSlot; 4],
}

impl ChannelSlots {
    /// Offer side: add one send/receive transceiver per role, in order.
    pub async fn allocate(transport: &Arc<dyn Transport>) -> Result<Self> {
        let mut transceivers = Vec::with_capacity(ChannelRole::ALL.len());
        for role in ChannelRole::ALL {
            transceivers.push(transport.add_transceiver(role.kind(), Direction::SendRecv).await?);
        }
        Self::bind(transceivers)
    }

    /// Answer side: take the first four transceivers the remote offer
    /// created and force them to send/receive.
    pub async fn adopt(transport: &Arc<dyn Transport>) -> Result<Self> {
        let transceivers = transport.transceivers().await;
        if transceivers.len() < ChannelRole::ALL.len() {
            return Err(LinkError::protocol(format!(
                "offer carries {} media channels, expected {}",
                transceivers.len(),
                ChannelRole::ALL.len()
            )));
        }
        if transceivers.len() > ChannelRole::ALL.len() {
            log::warn!(
                "Offer carries {} media channels; extra channels are left unused",
                transceivers.len()
            );
        }

        let adopted: Vec<Arc<dyn Transceiver>> = transceivers.into_iter().take(ChannelRole::ALL.len()).collect();
        for (role, transceiver) in ChannelRole::ALL.iter().zip(&adopted) {
            if transceiver.kind() != role.kind() {
                return Err(LinkError::protocol(format!(
                    "channel {} is {} in the offer, expected {}",
                    role.index(),
                    transceiver.kind().as_str(),
                    role.kind().as_str()
                )));
            }
            transceiver.set_direction(Direction::SendRecv).await?;
        }
        Self::bind(adopted)
    }

    fn bind(transceivers: Vec<Arc<dyn Transceiver>>) -> Result<Self> {
        let mut iter = ChannelRole::ALL.into_iter().zip(transceivers);
        let mut next = || {
            iter.next()
                .map(|(role, transceiver)| ChannelSlot { role, transceiver })
                .ok_or_else(|| LinkError::protocol("transport returned too few transceivers"))
        };
        Ok(Self {
            slots: [next()?, next()?, next()?, next()?],
        })
    }

    pub fn get(&self, role: ChannelRole) -> &ChannelSlot {
        &self.slots[role.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelSlot> {
        self.slots.iter()
    }

    /// Put black video or silence on every slot.
    pub async fn attach_placeholders(&self) -> Result<()> {
        for slot in &self.slots {
            slot.transceiver
                .replace_track(Some(MediaTrack::placeholder(slot.role.kind())))
                .await?;
        }
        Ok(())
    }
}
