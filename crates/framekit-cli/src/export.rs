//! PNG export of surfaces.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use framekit_core::PixelSurface;

/// Encodes `surface` as an 8-bit RGBA PNG into `writer`.
pub fn encode_png<W: Write>(surface: &PixelSurface, writer: W) -> Result<()> {
    let rgba = surface
        .to_rgba8()
        .context("Failed to convert surface to RGBA")?;
    let mut encoder = png::Encoder::new(writer, surface.width() as u32, surface.height() as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("Failed to write PNG header")?;
    writer
        .write_image_data(&rgba)
        .context("Failed to write PNG data")?;
    Ok(())
}

/// Writes `surface` to a PNG file.
pub fn save_png(surface: &PixelSurface, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    encode_png(surface, BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use framekit_core::PixelFormat;

    #[test]
    fn test_encode_png() {
        let mut surface = PixelSurface::new(3, 2, PixelFormat::Rgb565).unwrap();
        surface.set_pixel(2, 1, 0xFF0000).unwrap();
        let mut bytes = Vec::new();
        encode_png(&surface, &mut bytes).unwrap();

        let decoder = png::Decoder::new(&bytes[..]);
        let mut reader = decoder.read_info().unwrap();
        let mut buf = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut buf).unwrap();
        assert_eq!((info.width, info.height), (3, 2));
        let last = &buf[(info.buffer_size() - 4)..info.buffer_size()];
        assert_eq!(last, &[0xFF, 0x00, 0x00, 0xFF]);
    }

    #[test]
    fn test_palette_surface_needs_palette() {
        let surface = PixelSurface::new(2, 2, PixelFormat::Pal16).unwrap();
        assert!(encode_png(&surface, Vec::new()).is_err());
    }
}
