use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use pixelpair::codec::{self, qr, stego, BundleImageOptions, CodecMode, QrOptions};
use pixelpair::config::PixelPairConfig;
use pixelpair::session::{ChannelRole, NegotiationSession};
use pixelpair::status::StatusSnapshot;
use pixelpair::testing::LoopbackNetwork;
use pixelpair::{MediaKind, MediaTrack, NegotiationBundle};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const USAGE: &str = "Usage: pixelpair [--config <file>] <command> [args]

Commands:
  encode-qr <text-file> <out.png> [--module <px>] [--quiet <modules>]
  decode-qr <image> [--out <file>]
  embed <payload-file> <out.png> [--cover <image>] [--size <WxH>]
  extract <image> [--out <file>]
  capacity <image>
  demo [--mode qr|stego] [--out-dir <dir>]";

#[tokio::main]
async fn main() -> Result<()> {
    pixelpair::init_logging();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = load_config(&mut args)?;

    let Some(command) = args.first().cloned() else {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    };
    let rest = &args[1..];

    match command.as_str() {
        "encode-qr" => cmd_encode_qr(rest, &config),
        "decode-qr" => cmd_decode_qr(rest),
        "embed" => cmd_embed(rest, &config),
        "extract" => cmd_extract(rest),
        "capacity" => cmd_capacity(rest),
        "demo" => cmd_demo(rest, &config).await,
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

/// Strip `--config <file>` from `args` and load it, or the default file.
fn load_config(args: &mut Vec<String>) -> Result<PixelPairConfig> {
    let config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).cloned().ok_or_else(|| anyhow!("--config needs a path"))?;
            args.drain(i..=i + 1);
            PixelPairConfig::load_from_file(&path).with_context(|| format!("loading {}", path))?
        }
        None => PixelPairConfig::load_or_default(),
    };
    config.validate().map_err(|e| anyhow!("invalid configuration: {}", e))?;
    Ok(config)
}

/// Positional arguments and `--flag value` pairs.
struct Parsed {
    positional: Vec<String>,
    flags: Vec<(String, String)>,
}

impl Parsed {
    fn new(args: &[String]) -> Result<Self> {
        let mut positional = Vec::new();
        let mut flags = Vec::new();
        let mut i = 0;
        while i < args.len() {
            if let Some(name) = args[i].strip_prefix("--") {
                let value = args
                    .get(i + 1)
                    .cloned()
                    .ok_or_else(|| anyhow!("--{} needs a value", name))?;
                flags.push((name.to_string(), value));
                i += 2;
            } else {
                positional.push(args[i].clone());
                i += 1;
            }
        }
        Ok(Self { positional, flags })
    }

    fn arg(&self, index: usize, name: &str) -> Result<&str> {
        self.positional
            .get(index)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("missing <{}>", name))
    }

    fn flag(&self, name: &str) -> Option<&str> {
        self.flags.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
    }
}

fn cmd_encode_qr(args: &[String], config: &PixelPairConfig) -> Result<()> {
    let parsed = Parsed::new(args)?;
    let input = parsed.arg(0, "text-file")?;
    let output = parsed.arg(1, "out.png")?;
    let options = qr_options(&parsed, config)?;

    let image = encode_qr_file(Path::new(input), &options)?;
    codec::save_png(&image, output)?;
    println!("{}x{} QR multiplex image written to {}", image.width(), image.height(), output);
    Ok(())
}

/// Configured QR geometry with `--module` and `--quiet` applied and re-validated.
fn qr_options(parsed: &Parsed, config: &PixelPairConfig) -> Result<QrOptions> {
    let mut config = config.clone();
    if let Some(px) = parsed.flag("module") {
        config.codec.qr.module_px = px.parse().context("--module")?;
    }
    if let Some(quiet) = parsed.flag("quiet") {
        config.codec.qr.quiet_zone = quiet.parse().context("--quiet")?;
    }
    config.validate().map_err(|e| anyhow!("invalid QR options: {}", e))?;
    Ok(config.codec.qr)
}

/// The file's text is encoded byte for byte, trailing whitespace included.
fn encode_qr_file(input: &Path, options: &QrOptions) -> Result<RgbaImage> {
    let text = fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?;
    Ok(qr::encode(&text, options)?)
}

fn cmd_decode_qr(args: &[String]) -> Result<()> {
    let parsed = Parsed::new(args)?;
    let input = parsed.arg(0, "image")?;

    let image = codec::load_image(input)?;
    let text = qr::decode(&image)?;
    write_or_print(parsed.flag("out"), text.as_bytes())
}

fn cmd_embed(args: &[String], config: &PixelPairConfig) -> Result<()> {
    let parsed = Parsed::new(args)?;
    let input = parsed.arg(0, "payload-file")?;
    let output = parsed.arg(1, "out.png")?;

    let payload = fs::read(input).with_context(|| format!("reading {}", input))?;
    let carrier = match (parsed.flag("cover"), parsed.flag("size")) {
        (Some(cover), _) => codec::load_image(cover)?,
        (None, Some(size)) => {
            let [width, height] = parse_size(size)?;
            stego::generate_carrier(width, height)
        }
        (None, None) => match config.codec.carrier_size {
            Some([width, height]) => stego::generate_carrier(width, height),
            None => stego::carrier_for_payload(payload.len()),
        },
    };

    let image = stego::encode(&carrier, &payload)?;
    codec::save_png(&image, output)?;
    println!(
        "Embedded {} bytes into {}x{} image ({} bytes free)",
        payload.len(),
        image.width(),
        image.height(),
        stego::max_payload_len(&image) - payload.len()
    );
    Ok(())
}

fn cmd_extract(args: &[String]) -> Result<()> {
    let parsed = Parsed::new(args)?;
    let input = parsed.arg(0, "image")?;

    let image = codec::load_image(input)?;
    let payload = stego::decode(&image)?;
    write_or_print(parsed.flag("out"), &payload)
}

fn cmd_capacity(args: &[String]) -> Result<()> {
    let parsed = Parsed::new(args)?;
    let input = parsed.arg(0, "image")?;

    let image = codec::load_image(input)?;
    println!("{}x{} pixels", image.width(), image.height());
    println!("capacity: {} bits", stego::capacity_bits(&image));
    println!("max payload: {} bytes", stego::max_payload_len(&image));
    Ok(())
}

/// Run a full offer/answer exchange between two in-process peers, passing
/// every bundle through an image.
async fn cmd_demo(args: &[String], config: &PixelPairConfig) -> Result<()> {
    let parsed = Parsed::new(args)?;
    let mode = match parsed.flag("mode") {
        Some(mode) => mode.parse::<CodecMode>()?,
        None => config.codec.mode,
    };
    let out_dir = parsed.flag("out-dir").map(PathBuf::from);
    if let Some(dir) = &out_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let mut options = BundleImageOptions::from(&config.codec);
    options.mode = mode;

    let network = LoopbackNetwork::new();
    let alice = NegotiationSession::new(Arc::new(network.clone()), config.session.clone())
        .with_observer(Arc::new(|s: &StatusSnapshot| print_status("alice", s)));
    let bob = NegotiationSession::new(Arc::new(network), config.session.clone())
        .with_observer(Arc::new(|s: &StatusSnapshot| print_status("bob", s)));

    let offer = alice.create_offer_bundle().await?;
    let offer = through_image(&offer, &options, out_dir.as_deref(), "offer").await?;

    let answer = bob
        .accept_bundle(offer)
        .await?
        .ok_or_else(|| anyhow!("offer produced no answer"))?;
    let answer = through_image(&answer, &options, out_dir.as_deref(), "answer").await?;

    if alice.accept_bundle(answer).await?.is_some() {
        bail!("answer unexpectedly produced a reply");
    }

    let camera = MediaTrack::device(MediaKind::Video, "demo-camera", "Demo camera");
    alice.replace_channel_track(ChannelRole::Video, Some(camera.clone())).await?;

    for role in ChannelRole::ALL {
        let remote = bob.remote_track(role).await;
        println!(
            "bob {:<13} <- {}",
            role.as_str(),
            remote
                .as_ref()
                .and_then(|t| t.origin_id().map(str::to_string))
                .unwrap_or_else(|| "nothing".to_string())
        );
    }
    println!("alice camera track id: {}", camera.id());

    alice.close().await?;
    bob.close().await?;
    Ok(())
}

async fn through_image(
    bundle: &NegotiationBundle,
    options: &BundleImageOptions,
    out_dir: Option<&Path>,
    name: &str,
) -> Result<NegotiationBundle> {
    let png = codec::encode_bundle_png_async(bundle.clone(), options.clone()).await?;
    println!("{} -> {} byte {} PNG", name, png.len(), options.mode);

    if let Some(dir) = out_dir {
        let path = dir.join(format!("{}.png", name));
        fs::write(&path, &png).with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(codec::decode_bundle_png_async(png, options.mode).await?)
}

fn print_status(peer: &str, status: &StatusSnapshot) {
    println!(
        "[{}] signaling={} ice={} gathering={} connection={}",
        peer, status.signaling_state, status.ice_connection_state, status.ice_gathering_state, status.connection_state
    );
}

fn parse_size(size: &str) -> Result<[u32; 2]> {
    let (w, h) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("size must look like 640x480"))?;
    Ok([w.parse().context("width")?, h.parse().context("height")?])
}

fn write_or_print(out: Option<&str>, bytes: &[u8]) -> Result<()> {
    match out {
        Some(path) => {
            fs::write(path, bytes).with_context(|| format!("writing {}", path))?;
            println!("{} bytes written to {}", bytes.len(), path);
        }
        None => println!("{}", String::from_utf8_lossy(bytes)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_qr_overrides_are_validated() {
        let config = PixelPairConfig::default();

        let parsed = Parsed::new(&args(&["in.txt", "out.png", "--module", "6", "--quiet", "2"])).unwrap();
        let options = qr_options(&parsed, &config).unwrap();
        assert_eq!(options.module_px, 6);
        assert_eq!(options.quiet_zone, 2);

        for bad in [["--module", "100000000"], ["--module", "0"], ["--quiet", "4294967295"]] {
            let parsed = Parsed::new(&args(&["in.txt", "out.png", bad[0], bad[1]])).unwrap();
            assert!(qr_options(&parsed, &config).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_encode_qr_keeps_trailing_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("offer.sdp");
        let text = "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n\n  \t";
        fs::write(&path, text).unwrap();

        let image = encode_qr_file(&path, &QrOptions::default()).unwrap();
        assert_eq!(qr::decode(&image).unwrap(), text);
    }
}
