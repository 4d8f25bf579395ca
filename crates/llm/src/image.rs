//! Screenshot resize/recompress for the LLM Planner (spec.md 4.4).
//!
//! `image` is a pack addition rather than a teacher dependency — see
//! DESIGN.md — it is the standard idiomatic choice in the Rust
//! ecosystem for exactly this decode/resize/recompress operation.

use base64::Engine;
use gf_domain::config::ImageConfig;
use gf_domain::error::{Error, Result};

const TINY_INPUT_THRESHOLD: usize = 1024;

/// Resize a screenshot to the configured bounds and re-encode as JPEG
/// with adaptive quality (lower for larger originals). Inputs under
/// 1 KB are forwarded verbatim (spec.md 4.4: "tiny inputs (<1 KB) are
/// forwarded verbatim").
pub fn prepare_screenshot(raw: &[u8], cfg: &ImageConfig) -> Result<Vec<u8>> {
    if raw.len() < TINY_INPUT_THRESHOLD {
        return Ok(raw.to_vec());
    }

    let img = image::load_from_memory(raw)
        .map_err(|e| Error::Other(format!("decoding screenshot: {e}")))?;

    let resized = img.resize(
        cfg.image_max_width,
        cfg.image_max_height,
        image::imageops::FilterType::Lanczos3,
    );

    let quality = adaptive_quality(raw.len(), cfg.image_quality);

    let mut out = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut out);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
    resized
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| Error::Other(format!("encoding screenshot: {e}")))?;

    Ok(out)
}

/// Lower quality for larger originals, floored at 50 and capped at
/// the configured baseline.
fn adaptive_quality(original_len: usize, baseline: u8) -> u8 {
    let penalty = (original_len / (512 * 1024)) as u8;
    baseline.saturating_sub(penalty.saturating_mul(5)).max(50)
}

/// Decode a data-URL, file path, or raw base64 screenshot reference
/// into raw bytes (spec.md 4.4: "decoded from a data URL / file path /
/// raw base64").
pub fn decode_screenshot_source(source: &str) -> Result<Vec<u8>> {
    if let Some(comma) = source.find(',') {
        if source.starts_with("data:") {
            let b64 = &source[comma + 1..];
            return base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| Error::Other(format!("decoding data URL: {e}")));
        }
    }

    if let Ok(bytes) = std::fs::read(source) {
        return Ok(bytes);
    }

    base64::engine::general_purpose::STANDARD
        .decode(source)
        .map_err(|e| Error::Other(format!("decoding screenshot source: {e}")))
}

/// Encode bytes as a base64 string suitable for [`crate::client::ChatRequest::image_b64`].
pub fn to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
