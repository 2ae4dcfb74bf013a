//! Bit packing shared by the image codecs.
//!
//! Bytes are walked in source order and each byte is enumerated from bit 0
//! (least significant) up to bit 7. Encoder and decoder must agree on this
//! order exactly; changing it on one side breaks every image already made.

/// Number of bits needed to carry `byte_len` bytes.
pub fn bit_len(byte_len: usize) -> u64 {
    byte_len as u64 * 8
}

/// Enumerate the bits of `bytes`, least-significant bit of each byte first.
///
/// Each item is `0` or `1`.
pub fn bits_lsb_first(bytes: &[u8]) -> impl Iterator<Item = u8> + '_ {
    bytes
        .iter()
        .flat_map(|&byte| (0..8).map(move |bit| (byte >> bit) & 1))
}

/// Inverse of [`bits_lsb_first`].
///
/// Only the lowest bit of each item is used. A trailing partial byte is
/// zero-padded, so `n` bits yield `ceil(n / 8)` bytes.
pub fn pack_bits_lsb_first<I>(bits: I) -> Vec<u8>
where
    I: IntoIterator<Item = u8>,
{
    let mut bytes = Vec::new();
    for (i, bit) in bits.into_iter().enumerate() {
        let pos = i % 8;
        if pos == 0 {
            bytes.push(0);
        }
        if let Some(last) = bytes.last_mut() {
            *last |= (bit & 1) << pos;
        }
    }
    bytes
}
