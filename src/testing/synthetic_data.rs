//! Synthetic bundles and cover images for offline tests.
//!
//! Bundles resemble what a browser produces for the four-channel layout:
//! four media sections and a handful of host/srflx candidates.

use crate::bundle::{IceCandidate, NegotiationBundle, SessionDescription};
use image::{Rgba, RgbaImage};

/// Browser-like SDP with the video, screen video, screen audio, audio layout.
pub fn synthetic_sdp(session_id: u64) -> String {
    let mut sdp = format!(
        "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0 1 2 3\r\na=msid-semantic: WMS\r\n",
        session_id
    );
    let sections = [
        ("video", 96, "VP8/90000"),
        ("video", 96, "VP8/90000"),
        ("audio", 111, "opus/48000/2"),
        ("audio", 111, "opus/48000/2"),
    ];
    for (mid, (kind, pt, rtpmap)) in sections.iter().enumerate() {
        sdp.push_str(&format!(
            "m={kind} 9 UDP/TLS/RTP/SAVPF {pt}\r\nc=IN IP4 0.0.0.0\r\na=rtcp:9 IN IP4 0.0.0.0\r\n\
             a=ice-ufrag:Fz2b\r\na=ice-pwd:8d1s0B2ZyWw5u1xk3pQ9tTz7\r\n\
             a=fingerprint:sha-256 4A:1D:55:8F:0C:9B:AE:31:77:20:E8:5C:02:6B:F1:93:D4:42:18:0A:6C:B7:3E:91:5F:28:CC:60:0D:AF:72:E4\r\n\
             a=setup:actpass\r\na=mid:{mid}\r\na=sendrecv\r\na=rtcp-mux\r\na=rtpmap:{pt} {rtpmap}\r\n"
        ));
    }
    sdp
}

/// Candidates in browser JSON form; alternates host and server-reflexive.
pub fn synthetic_candidates(count: usize) -> Vec<IceCandidate> {
    (0..count)
        .map(|i| {
            let line = if i % 2 == 0 {
                format!(
                    "candidate:{} 1 udp 2122260223 192.168.1.{} {} typ host generation 0",
                    1000 + i,
                    10 + i,
                    50000 + i
                )
            } else {
                format!(
                    "candidate:{} 1 udp 1686052607 203.0.113.{} {} typ srflx raddr 192.168.1.{} rport {} generation 0",
                    2000 + i,
                    20 + i,
                    60000 + i,
                    10 + i,
                    50000 + i
                )
            };
            let mut candidate = IceCandidate::new(line, Some("0".to_string()), Some(0));
            candidate.username_fragment = Some("Fz2b".to_string());
            candidate
        })
        .collect()
}

pub fn synthetic_offer(candidates: usize) -> NegotiationBundle {
    NegotiationBundle::Offer {
        description: SessionDescription::offer(synthetic_sdp(4_611_686_018_427_387_904)),
        candidates: synthetic_candidates(candidates),
    }
}

pub fn synthetic_answer(candidates: usize) -> NegotiationBundle {
    NegotiationBundle::Answer {
        description: SessionDescription::answer(synthetic_sdp(8_402_115_532_117_604_321)),
        candidates: synthetic_candidates(candidates),
    }
}

/// Photo-like cover image that varies with `seed`.
pub fn synthetic_photo(seed: u64, width: u32, height: u32) -> RgbaImage {
    let base = (seed % 256) as u8;
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            base.wrapping_add((x % 256) as u8),
            base.wrapping_add((y % 256) as u8),
            base.wrapping_add(((x + y) % 256) as u8),
            255,
        ])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_offer_shape() {
        let offer = synthetic_offer(5);
        assert!(offer.is_offer());
        assert_eq!(offer.candidates().len(), 5);
        assert_eq!(offer.description().sdp.matches("m=").count(), 4);
        assert!(offer.candidates()[1].candidate.contains("typ srflx"));
    }

    #[test]
    fn test_synthetic_photo_varies_with_seed() {
        let a = synthetic_photo(1, 16, 16);
        let b = synthetic_photo(2, 16, 16);
        assert_eq!(a.dimensions(), (16, 16));
        assert_ne!(a, b);
    }
}
