//! Picking the codec for an input file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use framekit_core::codec::RawCodec;
use framekit_core::{FormatCodec, ImageFormat, PalettePreset, PaletteTable, PixelFormat};

/// Resolves the input format: an explicit name wins, otherwise the header is
/// sniffed and the file extension is the fallback.
pub fn resolve_format(path: &Path, header: &[u8], requested: Option<&str>) -> Result<ImageFormat> {
    match requested {
        Some(name) if !name.eq_ignore_ascii_case("auto") => name
            .parse::<ImageFormat>()
            .with_context(|| format!("Invalid format '{}'", name)),
        _ => ImageFormat::detect(header)
            .or_else(|| ImageFormat::from_extension(path))
            .with_context(|| format!("Cannot detect the image format of {}", path.display())),
    }
}

/// Builds a codec from command-line or config options.
///
/// A palette preset turns pal256/pal16 input into headerless index dumps.
pub fn build_codec(
    format: ImageFormat,
    width: Option<u16>,
    height: Option<u16>,
    palette: Option<&str>,
    reduce: bool,
) -> Result<FormatCodec> {
    let dimensions = match (width, height) {
        (Some(w), Some(h)) => Some((w, h)),
        (None, None) => None,
        _ => bail!("Width and height must be given together"),
    };

    if let Some(name) = palette {
        let preset: PalettePreset = name
            .parse()
            .with_context(|| format!("Invalid palette preset '{}'", name))?;
        let pixel_format = match format {
            ImageFormat::Pal256 => PixelFormat::Pal256,
            ImageFormat::Pal16 => PixelFormat::Pal16,
            _ => bail!("A palette preset only applies to pal256 and pal16 input, not {}", format),
        };
        let table = PaletteTable::preset(preset);
        if pixel_format.palette_len() != Some(table.len()) {
            bail!(
                "Palette '{}' has {} entries, {} needs {}",
                preset,
                table.len(),
                pixel_format,
                pixel_format.palette_len().unwrap_or(0)
            );
        }
        let (w, h) = dimensions.context("Headerless palette input needs a width and height")?;
        return Ok(FormatCodec::Raw(RawCodec::headerless(
            pixel_format,
            w,
            h,
            Arc::new(table),
        )));
    }

    if format.needs_dimensions() && dimensions.is_none() {
        bail!("{} input needs a width and height", format);
    }
    if reduce {
        if format != ImageFormat::Jpeg {
            bail!("Reduced decoding is only available for JPEG");
        }
        return Ok(FormatCodec::jpeg_reduced());
    }
    FormatCodec::for_format(format, dimensions).context("Failed to create codec")
}
