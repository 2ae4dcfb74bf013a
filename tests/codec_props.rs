//! Property-based tests for the bundle image codecs.
//!
//! Run with: cargo test --test codec_props

use proptest::prelude::*;

use pixelpair::codec::{self, qr, stego, BundleImageOptions, CodecMode, QrOptions};
use pixelpair::testing::{synthetic_answer, synthetic_offer, synthetic_photo};
use pixelpair::LinkError;

// ═══════════════════════════════════════════════════════════════════════════
// STEGO INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Any payload that fits comes back byte for byte.
    #[test]
    fn stego_recovers_payload(
        payload in proptest::collection::vec(any::<u8>(), 0..512),
        seed in any::<u64>(),
    ) {
        let carrier = synthetic_photo(seed, 64, 64);
        let encoded = stego::encode(&carrier, &payload).unwrap();
        prop_assert_eq!(stego::decode(&encoded).unwrap(), payload);
    }

    /// Only the low bit of color samples changes; alpha and dimensions never do.
    #[test]
    fn stego_touches_only_color_lsbs(
        payload in proptest::collection::vec(any::<u8>(), 1..256),
        seed in any::<u64>(),
    ) {
        let carrier = synthetic_photo(seed, 48, 48);
        let encoded = stego::encode(&carrier, &payload).unwrap();
        prop_assert_eq!(encoded.dimensions(), carrier.dimensions());

        for (before, after) in carrier.pixels().zip(encoded.pixels()) {
            for channel in 0..3 {
                prop_assert_eq!(before[channel] & 0xFE, after[channel] & 0xFE);
            }
            prop_assert_eq!(before[3], after[3]);
        }
    }

    /// Encoding succeeds exactly when header plus payload fit the carrier.
    #[test]
    fn stego_capacity_boundary(
        width in 5u32..24,
        height in 5u32..24,
        extra in 0usize..4,
    ) {
        let carrier = stego::generate_carrier(width, height);
        let max = stego::max_payload_len(&carrier);

        let fits = vec![0xA5u8; max];
        prop_assert!(stego::encode(&carrier, &fits).is_ok());

        let too_big = vec![0xA5u8; max + 1 + extra];
        let is_capacity_error = matches!(stego::encode(&carrier, &too_big), Err(LinkError::Capacity { .. }));
        prop_assert!(is_capacity_error);
    }

    /// Untouched photos never pass as stego frames.
    #[test]
    fn stego_rejects_plain_photos(seed in any::<u64>()) {
        let photo = synthetic_photo(seed, 32, 32);
        let result = stego::decode(&photo);
        let rejected = matches!(result, Err(LinkError::InvalidHeader(_)) | Err(LinkError::Capacity { .. }));
        prop_assert!(rejected);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// QR MULTIPLEX INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════

proptest! {
    /// Joining the three chunks restores the input and the first two chunks
    /// hold `ceil(n / 3)` characters each whenever the input is long enough.
    #[test]
    fn split_three_partitions_text(text in "[A-Za-z0-9+/=]{0,300}") {
        let [a, b, c] = qr::split_three(&text);
        prop_assert_eq!(format!("{}{}{}", a, b, c), text.clone());

        let n = text.chars().count();
        let chunk = n.div_ceil(3);
        prop_assert_eq!(a.chars().count(), chunk.min(n));
        prop_assert!(b.chars().count() <= chunk);
        prop_assert!(c.chars().count() <= chunk);
    }

    #[test]
    fn deflate_inflate_restores_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..2048)) {
        let compressed = qr::deflate(&bytes).unwrap();
        prop_assert_eq!(qr::inflate(&compressed).unwrap(), bytes);
    }

    /// Low-entropy input inflates far past the compressed size.
    #[test]
    fn inflate_restores_compressible_bytes(bytes in proptest::collection::vec(0u8..4, 0..8192)) {
        let compressed = qr::deflate(&bytes).unwrap();
        prop_assert_eq!(qr::inflate(&compressed).unwrap(), bytes);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    /// Printable text survives render and scan at the default module size.
    #[test]
    fn qr_multiplex_recovers_text(text in "[ -~]{1,1200}") {
        let image = qr::encode(&text, &QrOptions::default()).unwrap();
        prop_assert_eq!(image.width(), image.height());
        prop_assert_eq!(qr::decode(&image).unwrap(), text);
    }

    /// Any UTF-8, multi-byte characters included.
    #[test]
    fn qr_multiplex_recovers_unicode(text in "\\PC{0,300}") {
        let image = qr::encode(&text, &QrOptions::default()).unwrap();
        prop_assert_eq!(qr::decode(&image).unwrap(), text);
    }

    /// Repetitive text compresses well beyond the 4:1 ratio.
    #[test]
    fn qr_multiplex_recovers_repetitive_text(unit in "[a-zé✓ ]{1,20}", times in 1usize..250) {
        let text: String = unit.repeat(times).chars().take(5000).collect();
        let image = qr::encode(&text, &QrOptions::default()).unwrap();
        prop_assert_eq!(qr::decode(&image).unwrap(), text);
    }

    /// Browser-like bundles with several candidates go through QR images intact.
    #[test]
    fn qr_bundle_roundtrip(candidates in 0usize..12, offer in any::<bool>()) {
        let bundle = if offer { synthetic_offer(candidates) } else { synthetic_answer(candidates) };
        let image = codec::encode_bundle(&bundle, &BundleImageOptions::qr()).unwrap();
        prop_assert_eq!(codec::decode_bundle(&image, CodecMode::QrMultiplex).unwrap(), bundle);
    }
}
