use anyhow::Context as _;

use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Decode encoded image bytes into straight-alpha RGBA8.
pub fn decode_image(bytes: &[u8]) -> SkyloopResult<image::RgbaImage> {
    if bytes.is_empty() {
        return Err(SkyloopError::decode("image body is empty"));
    }
    let dyn_img = image::load_from_memory(bytes)
        .context("decode image from memory")
        .map_err(|e| SkyloopError::decode(format!("{e:#}")))?;
    Ok(dyn_img.to_rgba8())
}

#[cfg(test)]
#[path = "../../tests/unit/assets/decode.rs"]
mod tests;
