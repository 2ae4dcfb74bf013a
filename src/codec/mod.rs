//! Negotiation bundles as still images.
//!
//! Two interchangeable codecs carry a bundle's JSON:
//! - [`qr`]: three QR symbols multiplexed into the R, G and B channels,
//!   readable from a photo or screenshot.
//! - [`stego`]: least-significant-bit embedding in a cover image, which
//!   survives only lossless transfer.
//!
//! Images travel as PNG; the helpers here pick the codec, do PNG I/O, and
//! offload the CPU-heavy work to the blocking pool when called from async code.

pub mod bits;
pub mod qr;
pub mod stego;

use crate::bundle::NegotiationBundle;
use crate::config::CodecConfig;
use crate::errors::{LinkError, Result};
use image::{ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

pub use qr::QrOptions;

/// Which codec turns a bundle into an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecMode {
    #[default]
    QrMultiplex,
    Stego,
}

impl fmt::Display for CodecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecMode::QrMultiplex => write!(f, "qr-multiplex"),
            CodecMode::Stego => write!(f, "stego"),
        }
    }
}

impl FromStr for CodecMode {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "qr" | "qr-multiplex" => Ok(CodecMode::QrMultiplex),
            "stego" | "lsb" => Ok(CodecMode::Stego),
            other => Err(LinkError::Config(format!("unknown codec mode '{}'", other))),
        }
    }
}

/// Settings for [`encode_bundle`].
#[derive(Debug, Clone, Default)]
pub struct BundleImageOptions {
    pub mode: CodecMode,
    pub qr: QrOptions,
    /// Cover image for the stego codec. A carrier is generated when absent.
    pub carrier: Option<RgbaImage>,
    /// Size of the generated carrier; fitted to the payload when absent.
    pub carrier_size: Option<[u32; 2]>,
}

impl BundleImageOptions {
    pub fn qr() -> Self {
        Self::default()
    }

    pub fn stego() -> Self {
        Self {
            mode: CodecMode::Stego,
            ..Self::default()
        }
    }

    pub fn with_carrier(mut self, carrier: RgbaImage) -> Self {
        self.carrier = Some(carrier);
        self
    }
}

impl From<&CodecConfig> for BundleImageOptions {
    fn from(config: &CodecConfig) -> Self {
        Self {
            mode: config.mode,
            qr: config.qr,
            carrier: None,
            carrier_size: config.carrier_size,
        }
    }
}

/// Render `bundle` as an image with the codec `options` selects.
pub fn encode_bundle(bundle: &NegotiationBundle, options: &BundleImageOptions) -> Result<RgbaImage> {
    match options.mode {
        CodecMode::QrMultiplex => qr::encode(&bundle.to_json()?, &options.qr),
        CodecMode::Stego => {
            let payload = bundle.to_bytes()?;
            match (&options.carrier, options.carrier_size) {
                (Some(carrier), _) => stego::encode(carrier, &payload),
                (None, Some([width, height])) => stego::encode(&stego::generate_carrier(width, height), &payload),
                (None, None) => stego::encode(&stego::carrier_for_payload(payload.len()), &payload),
            }
        }
    }
}

/// Recover a bundle from an image made by [`encode_bundle`] with `mode`.
pub fn decode_bundle(image: &RgbaImage, mode: CodecMode) -> Result<NegotiationBundle> {
    match mode {
        CodecMode::QrMultiplex => NegotiationBundle::from_json(&qr::decode(image)?),
        CodecMode::Stego => NegotiationBundle::from_bytes(&stego::decode(image)?),
    }
}

/// Decode without knowing the codec: a valid stego header wins, otherwise
/// the image is scanned for QR symbols.
pub fn decode_bundle_auto(image: &RgbaImage) -> Result<NegotiationBundle> {
    match stego::decode(image) {
        Ok(payload) => NegotiationBundle::from_bytes(&payload),
        Err(LinkError::InvalidHeader(_)) | Err(LinkError::Capacity { .. }) => {
            log::debug!("No stego frame found, scanning for QR symbols");
            decode_bundle(image, CodecMode::QrMultiplex)
        }
        Err(e) => Err(e),
    }
}

/// Encode as PNG bytes.
pub fn to_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Decode PNG bytes into 8-bit RGBA.
pub fn from_png(bytes: &[u8]) -> Result<RgbaImage> {
    Ok(image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8())
}

pub fn save_png<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<()> {
    let path = path.as_ref();
    image.save_with_format(path, ImageFormat::Png)?;
    log::info!("Wrote {}x{} image to {:?}", image.width(), image.height(), path);
    Ok(())
}

/// Load any supported image file as 8-bit RGBA.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<RgbaImage> {
    Ok(image::open(path.as_ref())?.to_rgba8())
}

/// [`encode_bundle`] plus PNG encoding on the blocking pool.
pub async fn encode_bundle_png_async(bundle: NegotiationBundle, options: BundleImageOptions) -> Result<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        let image = encode_bundle(&bundle, &options)?;
        to_png(&image)
    })
    .await
    .map_err(|e| LinkError::Image(format!("encode task failed: {}", e)))?
}

/// PNG decoding plus [`decode_bundle`] on the blocking pool.
pub async fn decode_bundle_png_async(png: Vec<u8>, mode: CodecMode) -> Result<NegotiationBundle> {
    tokio::task::spawn_blocking(move || {
        let image = from_png(&png)?;
        decode_bundle(&image, mode)
    })
    .await
    .map_err(|e| LinkError::Image(format!("decode task failed: {}", e)))?
}
