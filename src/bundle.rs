//! Negotiation bundles and their JSON wire shape.
//!
//! A bundle is a session description plus the connectivity candidates
//! gathered for it. On the wire it is a JSON object carrying exactly one of
//! `offer` or `answer`:
//!
//! ```json
//! {"offer": {"type": "offer", "sdp": "v=0..."}, "candidates": [{"candidate": "candidate:..."}]}
//! ```

use crate::errors::{LinkError, Result};
use serde::{Deserialize, Serialize};

/// SDP type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
            SdpType::Pranswer => "pranswer",
            SdpType::Rollback => "rollback",
        }
    }
}

/// Session description, opaque to everything but the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// ICE candidate record.
///
/// Field names follow the browser `RTCIceCandidateInit` JSON. Fields this
/// crate does not know about are kept in `extra` so records pass through
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, sdp_mid: Option<String>, sdp_mline_index: Option<u16>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid,
            sdp_mline_index,
            username_fragment: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// One step of the offer/answer exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BundleWire", into = "BundleWire")]
pub enum NegotiationBundle {
    Offer {
        description: SessionDescription,
        candidates: Vec<IceCandidate>,
    },
    Answer {
        description: SessionDescription,
        candidates: Vec<IceCandidate>,
    },
}

impl NegotiationBundle {
    pub fn description(&self) -> &SessionDescription {
        match self {
            NegotiationBundle::Offer { description, .. } => description,
            NegotiationBundle::Answer { description, .. } => description,
        }
    }

    pub fn candidates(&self) -> &[IceCandidate] {
        match self {
            NegotiationBundle::Offer { candidates, .. } => candidates,
            NegotiationBundle::Answer { candidates, .. } => candidates,
        }
    }

    pub fn is_offer(&self) -> bool {
        matches!(self, NegotiationBundle::Offer { .. })
    }

    /// Parse the JSON wire shape, rejecting anything without exactly one
    /// recognized `offer`/`answer` key.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text.trim()).map_err(|e| LinkError::malformed(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| LinkError::malformed(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| LinkError::malformed(e.to_string()))
    }

    /// UTF-8 JSON bytes, the payload carried by the stego codec.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_json()?.into_bytes())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| LinkError::malformed(format!("bundle is not UTF-8: {}", e)))?;
        Self::from_json(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BundleWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offer: Option<SessionDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    answer: Option<SessionDescription>,
    #[serde(default)]
    candidates: Vec<IceCandidate>,
}

impl TryFrom<BundleWire> for NegotiationBundle {
    type Error = LinkError;

    fn try_from(wire: BundleWire) -> Result<Self> {
        match (wire.offer, wire.answer) {
            (Some(description), None) => {
                if description.sdp_type != SdpType::Offer {
                    return Err(LinkError::malformed(format!(
                        "offer carries a description of type '{}'",
                        description.sdp_type.as_str()
                    )));
                }
                Ok(NegotiationBundle::Offer {
                    description,
                    candidates: wire.candidates,
                })
            }
            (None, Some(description)) => {
                if description.sdp_type != SdpType::Answer {
                    return Err(LinkError::malformed(format!(
                        "answer carries a description of type '{}'",
                        description.sdp_type.as_str()
                    )));
                }
                Ok(NegotiationBundle::Answer {
                    description,
                    candidates: wire.candidates,
                })
            }
            (Some(_), Some(_)) => Err(LinkError::malformed("bundle contains both offer and answer")),
            (None, None) => Err(LinkError::malformed("bundle must contain offer or answer")),
        }
    }
}

impl From<NegotiationBundle> for BundleWire {
    fn from(bundle: NegotiationBundle) -> Self {
        match bundle {
            NegotiationBundle::Offer {
                description,
                candidates,
            } => BundleWire {
                offer: Some(description),
                answer: None,
                candidates,
            },
            NegotiationBundle::Answer {
                description,
                candidates,
            } => BundleWire {
                offer: None,
                answer: Some(description),
                candidates,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host_candidate(port: u16) -> IceCandidate {
        IceCandidate::new(
            format!("candidate:1 1 udp 2130706431 192.168.1.2 {} typ host", port),
            Some("0".to_string()),
            Some(0),
        )
    }

    #[test]
    fn test_offer_wire_shape() {
        let bundle = NegotiationBundle::Offer {
            description: SessionDescription::offer("v=0"),
            candidates: vec![host_candidate(5000)],
        };

        let value: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(value["offer"]["type"], "offer");
        assert_eq!(value["offer"]["sdp"], "v=0");
        assert!(value.get("answer").is_none());
        assert_eq!(value["candidates"][0]["sdpMid"], "0");
        assert_eq!(value["candidates"][0]["sdpMLineIndex"], 0);
    }

    #[test]
    fn test_parse_answer_from_browser_json() {
        let text = r#"{
            "answer": {"type": "answer", "sdp": "v=0\r\n"},
            "candidates": [
                {"candidate": "candidate:2 1 udp 1 10.0.0.1 9 typ host", "sdpMid": "1", "sdpMLineIndex": 1, "usernameFragment": "abcd"}
            ]
        }"#;

        let bundle = NegotiationBundle::from_json(text).unwrap();
        assert!(!bundle.is_offer());
        assert_eq!(bundle.description().sdp, "v=0\r\n");
        assert_eq!(bundle.candidates()[0].username_fragment.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_candidates_keep_order_duplicates_and_unknown_fields() {
        let text = r#"{"offer":{"type":"offer","sdp":"x"},"candidates":[
            {"candidate":"b","sdpMid":null,"network":7},
            {"candidate":"a"},
            {"candidate":"b","sdpMid":null,"network":7}
        ]}"#;

        let bundle = NegotiationBundle::from_json(text).unwrap();
        let names: Vec<&str> = bundle.candidates().iter().map(|c| c.candidate.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert_eq!(bundle.candidates()[0].extra["network"], 7);

        let reparsed = NegotiationBundle::from_json(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, bundle);
    }

    #[test]
    fn test_missing_candidates_is_empty() {
        let bundle = NegotiationBundle::from_json(r#"{"offer":{"type":"offer","sdp":"x"}}"#).unwrap();
        assert!(bundle.candidates().is_empty());
    }

    #[test]
    fn test_empty_object_is_malformed() {
        assert!(matches!(
            NegotiationBundle::from_json("{}"),
            Err(LinkError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_both_keys_is_malformed() {
        let text = r#"{"offer":{"type":"offer","sdp":"x"},"answer":{"type":"answer","sdp":"y"}}"#;
        assert!(matches!(
            NegotiationBundle::from_json(text),
            Err(LinkError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_mismatched_description_type_is_malformed() {
        let text = r#"{"offer":{"type":"answer","sdp":"x"}}"#;
        assert!(matches!(
            NegotiationBundle::from_json(text),
            Err(LinkError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_non_json_is_malformed() {
        for text in ["", "not json", "[]", "42", r#"{"offer": 3}"#] {
            assert!(
                matches!(NegotiationBundle::from_json(text), Err(LinkError::MalformedBundle(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_bytes_roundtrip_and_invalid_utf8() {
        let bundle = NegotiationBundle::Answer {
            description: SessionDescription::answer("v=0"),
            candidates: vec![],
        };
        let bytes = bundle.to_bytes().unwrap();
        assert_eq!(NegotiationBundle::from_bytes(&bytes).unwrap(), bundle);

        assert!(matches!(
            NegotiationBundle::from_bytes(&[0xFF, 0xFE]),
            Err(LinkError::MalformedBundle(_))
        ));
    }
}
