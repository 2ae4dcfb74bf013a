use serde::{Deserialize, Serialize};
use std::fmt;

/// Offer/answer state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Connectivity check state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IceConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Candidate gathering progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IceGatheringState {
    #[default]
    New,
    Gathering,
    Complete,
}

/// Aggregate peer connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Media flow direction of a transceiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    pub fn sends(&self) -> bool {
        matches!(self, Direction::SendRecv | Direction::SendOnly)
    }

    pub fn receives(&self) -> bool {
        matches!(self, Direction::SendRecv | Direction::RecvOnly)
    }

    /// SDP attribute name, e.g. `sendrecv`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }

    pub fn parse(attr: &str) -> Option<Self> {
        match attr {
            "sendrecv" => Some(Direction::SendRecv),
            "sendonly" => Some(Direction::SendOnly),
            "recvonly" => Some(Direction::RecvOnly),
            "inactive" => Some(Direction::Inactive),
            _ => None,
        }
    }

    /// Direction as seen from the other end of the link.
    pub fn reversed(&self) -> Self {
        match self {
            Direction::SendOnly => Direction::RecvOnly,
            Direction::RecvOnly => Direction::SendOnly,
            other => *other,
        }
    }
}

macro_rules! display_kebab {
    ($($ty:ty => { $($variant:ident => $name:literal),+ $(,)? }),+ $(,)?) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    let name = match self {
                        $(Self::$variant => $name,)+
                    };
                    f.write_str(name)
                }
            }
        )+
    };
}

display_kebab! {
    SignalingState => {
        Stable => "stable",
        HaveLocalOffer => "have-local-offer",
        HaveRemoteOffer => "have-remote-offer",
        HaveLocalPranswer => "have-local-pranswer",
        HaveRemotePranswer => "have-remote-pranswer",
        Closed => "closed",
    },
    IceConnectionState => {
        New => "new",
        Checking => "checking",
        Connected => "connected",
        Completed => "completed",
        Disconnected => "disconnected",
        Failed => "failed",
        Closed => "closed",
    },
    IceGatheringState => {
        New => "new",
        Gathering => "gathering",
        Complete => "complete",
    },
    PeerConnectionState => {
        New => "new",
        Connecting => "connecting",
        Connected => "connected",
        Disconnected => "disconnected",
        Failed => "failed",
        Closed => "closed",
    },
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_serde() {
        let json = serde_json::to_string(&SignalingState::HaveRemoteOffer).unwrap();
        assert_eq!(json, format!("\"{}\"", SignalingState::HaveRemoteOffer));

        let json = serde_json::to_string(&IceGatheringState::Complete).unwrap();
        assert_eq!(json, format!("\"{}\"", IceGatheringState::Complete));
    }

    #[test]
    fn test_direction_parse_and_reverse() {
        for dir in [Direction::SendRecv, Direction::SendOnly, Direction::RecvOnly, Direction::Inactive] {
            assert_eq!(Direction::parse(dir.as_str()), Some(dir));
            assert_eq!(dir.reversed().reversed(), dir);
        }
        assert_eq!(Direction::SendOnly.reversed(), Direction::RecvOnly);
        assert!(Direction::SendRecv.sends() && Direction::SendRecv.receives());
        assert!(!Direction::Inactive.sends());
        assert_eq!(Direction::parse("bogus"), None);
    }
}
