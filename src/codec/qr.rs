//! Three QR symbols multiplexed into the color channels of one image.
//!
//! Text is deflated (zlib), base64-encoded and split into three near-equal
//! chunks. Chunk `c` becomes a QR symbol drawn into color channel `c` (red,
//! green, blue). Decoding scans each channel on its own and stitches the
//! results back together in channel order.

use crate::errors::{LinkError, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::write::ZlibEncoder;
use flate2::{Compression, Decompress, FlushDecompress, Status};
use image::{Rgba, RgbaImage};
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use std::io::Write;

const CHANNELS: usize = 3;
const DARK: u8 = 0;
const LIGHT: u8 = 255;

/// Largest rendered image edge.
pub const MAX_SIDE_PX: u32 = 16_384;

/// Rendering parameters for the multiplexed symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrOptions {
    /// Pixels per QR module edge.
    pub module_px: u32,
    /// Light border around the symbol, in modules.
    pub quiet_zone: u32,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            module_px: 4,
            quiet_zone: 4,
        }
    }
}

/// Split `text` into three contiguous chunks with `ceil(n / 3)` characters
/// in each of the first two and the remainder in the last.
///
/// For short inputs the trailing chunks may be empty.
pub fn split_three(text: &str) -> [&str; 3] {
    let n = text.chars().count();
    let chunk_len = n.div_ceil(CHANNELS);

    let offset = |chars: usize| -> usize {
        text.char_indices()
            .nth(chars)
            .map(|(byte, _)| byte)
            .unwrap_or(text.len())
    };

    let first = offset(chunk_len.min(n));
    let second = offset((2 * chunk_len).min(n));
    [&text[..first], &text[first..second], &text[second..]]
}

/// Encode `text` as an RGB composite of three QR symbols.
pub fn encode(text: &str, options: &QrOptions) -> Result<RgbaImage> {
    if options.module_px == 0 {
        return Err(LinkError::Qr("module size must be at least one pixel".to_string()));
    }

    let compressed = deflate(text.as_bytes())?;
    let encoded = STANDARD.encode(compressed);
    let chunks = split_three(&encoded);

    let symbols = render_symbols(&chunks)?;
    let modules = symbols[0].width() as u32;
    let side = options
        .quiet_zone
        .checked_mul(2)
        .and_then(|border| border.checked_add(modules))
        .and_then(|span| span.checked_mul(options.module_px))
        .filter(|side| *side <= MAX_SIDE_PX)
        .ok_or_else(|| {
            LinkError::Qr(format!(
                "{} modules with quiet zone {} at {}px per module exceeds {}px",
                modules, options.quiet_zone, options.module_px, MAX_SIDE_PX
            ))
        })?;

    log::debug!(
        "QR multiplex: {} text bytes -> {} base64 chars, {} modules per symbol, {}px image",
        text.len(),
        encoded.len(),
        modules,
        side
    );

    let image = RgbaImage::from_fn(side, side, |x, y| {
        let mx = (x / options.module_px) as i64 - options.quiet_zone as i64;
        let my = (y / options.module_px) as i64 - options.quiet_zone as i64;

        let mut pixel = [LIGHT, LIGHT, LIGHT, 255];
        if mx >= 0 && my >= 0 && (mx as u32) < modules && (my as u32) < modules {
            for (channel, symbol) in symbols.iter().enumerate() {
                if symbol[(mx as usize, my as usize)] == Color::Dark {
                    pixel[channel] = DARK;
                }
            }
        }
        Rgba(pixel)
    });

    Ok(image)
}

/// Decode an image produced by [`encode`] back into the original text.
///
/// A channel that does not scan contributes an empty string; the resulting
/// failure surfaces later as [`LinkError::Inflate`].
pub fn decode(image: &RgbaImage) -> Result<String> {
    let mut joined = String::new();
    for channel in 0..CHANNELS {
        match scan_channel(image, channel) {
            Some(text) => joined.push_str(&text),
            None => log::warn!("QR scan found no readable symbol in channel {}", channel),
        }
    }

    if joined.is_empty() {
        return Err(LinkError::Inflate("no QR data in any channel".to_string()));
    }

    let compressed = STANDARD
        .decode(joined.as_bytes())
        .map_err(|e| LinkError::Inflate(format!("base64: {}", e)))?;
    let bytes = inflate(&compressed)?;
    String::from_utf8(bytes).map_err(|e| LinkError::Inflate(format!("utf-8: {}", e)))
}

/// Render the chunks as symbols that all share the largest needed version.
fn render_symbols(chunks: &[&str; 3]) -> Result<Vec<QrCode>> {
    let minimal = chunks
        .iter()
        .map(|chunk| QrCode::with_error_correction_level(chunk.as_bytes(), EcLevel::H))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| LinkError::Qr(format!("payload does not fit a QR symbol: {}", e)))?;

    let widest = minimal
        .iter()
        .max_by_key(|code| code.width())
        .map(|code| code.version())
        .ok_or_else(|| LinkError::Qr("no symbols rendered".to_string()))?;

    chunks
        .iter()
        .map(|chunk| {
            QrCode::with_version(chunk.as_bytes(), widest, EcLevel::H)
                .map_err(|e| LinkError::Qr(e.to_string()))
        })
        .collect()
}

fn scan_channel(image: &RgbaImage, channel: usize) -> Option<String> {
    let (width, height) = image.dimensions();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
            image.get_pixel(x as u32, y as u32).0[channel]
        });

    prepared
        .detect_grids()
        .into_iter()
        .find_map(|grid| match grid.decode() {
            Ok((_, content)) => Some(content),
            Err(e) => {
                log::debug!("Channel {} grid failed to decode: {:?}", channel, e);
                None
            }
        })
}

/// Zlib-compress `data` at the best compression level.
pub fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a complete zlib stream; truncation is an error, not a short read.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut inflater = Decompress::new(true);
    let mut out: Vec<u8> = Vec::with_capacity(data.len().saturating_mul(4).max(64));

    loop {
        if out.len() == out.capacity() {
            out.reserve(out.capacity());
        }
        let consumed = inflater.total_in() as usize;
        let produced = inflater.total_out();
        let status = inflater
            .decompress_vec(&data[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| LinkError::Inflate(e.to_string()))?;

        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let stalled = inflater.total_in() as usize == consumed && inflater.total_out() == produced;
                if stalled && out.len() < out.capacity() {
                    return Err(LinkError::Inflate("truncated deflate stream".to_string()));
                }
            }
        }
    }
}
