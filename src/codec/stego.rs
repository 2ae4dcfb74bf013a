//! LSB steganography with a magic-validated, length-prefixed frame.
//!
//! Frame layout: `[magic: 4 bytes][length: u32 little-endian][payload]`.
//! Frame bits are written one per color sample, pixels in raster order and
//! red, green, blue within a pixel. Alpha is never touched, and samples past
//! the end of the frame keep their original values.

use crate::codec::bits::{bit_len, bits_lsb_first, pack_bits_lsb_first};
use crate::errors::{LinkError, Result};
use image::{Rgba, RgbaImage};

/// Frame magic, ASCII `UZS1`.
pub const MAGIC: [u8; 4] = [0x55, 0x5A, 0x53, 0x31];

/// Magic plus length prefix.
pub const HEADER_LEN: usize = 8;

const HEADER_BITS: u64 = (HEADER_LEN as u64) * 8;

/// Usable color samples per pixel (alpha excluded).
const SAMPLES_PER_PIXEL: u64 = 3;

/// Number of frame bits the carrier can hold.
pub fn capacity_bits(carrier: &RgbaImage) -> u64 {
    carrier.width() as u64 * carrier.height() as u64 * SAMPLES_PER_PIXEL
}

/// Largest payload, in bytes, that fits in `carrier` next to the header.
pub fn max_payload_len(carrier: &RgbaImage) -> usize {
    let frame_bytes = capacity_bits(carrier) / 8;
    frame_bytes.saturating_sub(HEADER_LEN as u64) as usize
}

/// Fail with [`LinkError::Capacity`] when `needed_bits` exceeds `capacity_bits`.
pub fn ensure_capacity(needed_bits: u64, capacity_bits: u64) -> Result<()> {
    if needed_bits > capacity_bits {
        return Err(LinkError::capacity(needed_bits, capacity_bits));
    }
    Ok(())
}

/// Embed `payload` into a copy of `carrier`.
///
/// The returned image has the carrier's dimensions and color depth; only the
/// low bits of the consumed samples differ.
pub fn encode(carrier: &RgbaImage, payload: &[u8]) -> Result<RgbaImage> {
    let capacity = capacity_bits(carrier);
    let needed = bit_len(HEADER_LEN + payload.len());

    let length = u32::try_from(payload.len()).map_err(|_| LinkError::capacity(needed, capacity))?;
    ensure_capacity(needed, capacity)?;

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(payload);

    let mut out = carrier.clone();
    embed_frame(&mut out, &frame);

    log::debug!(
        "Embedded {} payload bytes into {}x{} carrier ({} of {} bits)",
        payload.len(),
        carrier.width(),
        carrier.height(),
        needed,
        capacity
    );

    Ok(out)
}

/// Recover the payload from an image produced by [`encode`].
///
/// Validates the magic and the declared length against the carrier size; the
/// payload content itself is returned as-is.
pub fn decode(image: &RgbaImage) -> Result<Vec<u8>> {
    let capacity = capacity_bits(image);
    ensure_capacity(HEADER_BITS, capacity)?;

    let header = pack_bits_lsb_first(lsb_stream(image).take(HEADER_BITS as usize));
    if header[..4] != MAGIC {
        return Err(LinkError::InvalidHeader(format!(
            "expected magic {:02X?}, found {:02X?}",
            MAGIC,
            &header[..4]
        )));
    }

    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let total_bits = bit_len(HEADER_LEN + length);
    ensure_capacity(total_bits, capacity)?;

    let frame = pack_bits_lsb_first(lsb_stream(image).take(total_bits as usize));
    Ok(frame[HEADER_LEN..].to_vec())
}

/// Deterministic textured carrier for when no cover image is supplied.
///
/// Noise in the low bits keeps the embedded frame from standing out against
/// flat regions.
pub fn generate_carrier(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let mut h = (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F);
        h ^= h >> 29;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 32;

        let noise = (h & 0x0F) as u8;
        let r = ((x * 255) / width.max(1)) as u8;
        let g = ((y * 255) / height.max(1)) as u8;
        let b = (((x + y) * 127) / (width + height).max(1)) as u8;
        Rgba([r ^ noise, g ^ (noise >> 1), b ^ (noise >> 2), 255])
    })
}

/// Smallest square generated carrier that fits a payload of `payload_len` bytes.
pub fn carrier_for_payload(payload_len: usize) -> RgbaImage {
    let needed_pixels = bit_len(HEADER_LEN + payload_len).div_ceil(SAMPLES_PER_PIXEL);
    let mut side = (needed_pixels as f64).sqrt().ceil() as u64;
    while side * side < needed_pixels {
        side += 1;
    }
    let side = side.max(1) as u32;
    generate_carrier(side, side)
}

fn embed_frame(image: &mut RgbaImage, frame: &[u8]) {
    let mut bits = bits_lsb_first(frame);
    'pixels: for pixel in image.chunks_exact_mut(4) {
        for sample in &mut pixel[..3] {
            match bits.next() {
                Some(bit) => *sample = (*sample & 0xFE) | bit,
                None => break 'pixels,
            }
        }
    }
}

fn lsb_stream(image: &RgbaImage) -> impl Iterator<Item = u8> + '_ {
    image
        .chunks_exact(4)
        .flat_map(|pixel| pixel[..3].iter().map(|sample| sample & 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_carrier(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 77]))
    }

    #[test]
    fn test_roundtrip_small_payload() {
        let carrier = generate_carrier(32, 32);
        let payload = br#"{"offer":{"type":"offer","sdp":"v=0"},"candidates":[]}"#;

        let stego = encode(&carrier, payload).unwrap();
        assert_eq!(decode(&stego).unwrap(), payload.to_vec());
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let carrier = flat_carrier(8, 8);
        let stego = encode(&carrier, &[]).unwrap();
        assert!(decode(&stego).unwrap().is_empty());
    }

    #[test]
    fn test_exact_capacity_succeeds() {
        // 16 * 18 pixels * 3 samples = 864 bits = 108 bytes = header + 100
        let carrier = flat_carrier(16, 18);
        assert_eq!(capacity_bits(&carrier), 864);
        assert_eq!(max_payload_len(&carrier), 100);

        let payload = vec![0xA5; 100];
        let stego = encode(&carrier, &payload).unwrap();
        assert_eq!(decode(&stego).unwrap(), payload);
    }

    #[test]
    fn test_one_byte_short_fails() {
        // 15 * 19 pixels = 855 bits, less than 107 bytes
        let carrier = flat_carrier(15, 19);
        let payload = vec![0xA5; 100];

        match encode(&carrier, &payload) {
            Err(LinkError::Capacity {
                needed_bits,
                capacity_bits,
            }) => {
                assert_eq!(needed_bits, 864);
                assert_eq!(capacity_bits, 855);
            }
            other => panic!("expected capacity error, got {:?}", other),
        }
    }

    #[test]
    fn test_capacity_boundary_is_bit_exact() {
        assert!(ensure_capacity(864, 864).is_ok());
        assert!(matches!(
            ensure_capacity(865, 864),
            Err(LinkError::Capacity { .. })
        ));
    }

    #[test]
    fn test_alpha_and_dimensions_untouched() {
        let carrier = flat_carrier(10, 10);
        let stego = encode(&carrier, b"alpha stays").unwrap();

        assert_eq!(stego.dimensions(), carrier.dimensions());
        for (a, b) in carrier.pixels().zip(stego.pixels()) {
            assert_eq!(a.0[3], b.0[3]);
            for c in 0..3 {
                assert_eq!(a.0[c] & 0xFE, b.0[c] & 0xFE);
            }
        }
    }

    #[test]
    fn test_unconsumed_samples_untouched() {
        let carrier = generate_carrier(20, 20);
        let payload = b"xy";
        let stego = encode(&carrier, payload).unwrap();

        let used_samples = (HEADER_LEN + payload.len()) * 8;
        let original: Vec<u8> = carrier.chunks_exact(4).flat_map(|p| p[..3].to_vec()).collect();
        let written: Vec<u8> = stego.chunks_exact(4).flat_map(|p| p[..3].to_vec()).collect();
        assert_eq!(&original[used_samples..], &written[used_samples..]);
    }

    #[test]
    fn test_header_tamper_each_magic_byte() {
        let carrier = generate_carrier(24, 24);
        let stego = encode(&carrier, b"tamper target").unwrap();

        for byte in 0..4 {
            let mut tampered = stego.clone();
            // Bit 0 of magic byte `byte` lives in sample index 8 * byte.
            let sample = 8 * byte;
            let pixel = sample / 3;
            let channel = sample % 3;
            let raw: &mut [u8] = &mut tampered;
            raw[pixel * 4 + channel] ^= 1;

            assert!(
                matches!(decode(&tampered), Err(LinkError::InvalidHeader(_))),
                "magic byte {} flip was not detected",
                byte
            );
        }
    }

    #[test]
    fn test_plain_image_has_no_header() {
        let carrier = flat_carrier(16, 16);
        assert!(matches!(decode(&carrier), Err(LinkError::InvalidHeader(_))));
    }

    #[test]
    fn test_carrier_smaller_than_header() {
        // 4 pixels hold 12 bits, fewer than the 64 header bits
        let carrier = flat_carrier(2, 2);
        assert!(matches!(decode(&carrier), Err(LinkError::Capacity { .. })));
    }

    #[test]
    fn test_declared_length_beyond_capacity() {
        let mut image = flat_carrier(10, 10);
        let mut frame = MAGIC.to_vec();
        frame.extend_from_slice(&1000u32.to_le_bytes());
        embed_frame(&mut image, &frame);

        assert!(matches!(decode(&image), Err(LinkError::Capacity { .. })));
    }

    #[test]
    fn test_carrier_for_payload_fits() {
        for len in [0usize, 1, 100, 777, 5000] {
            let carrier = carrier_for_payload(len);
            assert!(max_payload_len(&carrier) >= len, "len {}", len);
        }
    }

    #[test]
    fn test_generated_carrier_is_deterministic() {
        assert_eq!(generate_carrier(13, 7), generate_carrier(13, 7));
    }
}
