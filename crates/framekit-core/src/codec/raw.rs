//! Headerless RGB565 dumps and palette files.
//!
//! A PAL256/PAL16 file starts with its palette, 3 bytes (R, G, B) per entry,
//! followed by `stride * height` index bytes. Headerless palette dumps skip
//! the palette and are displayed with a preset instead.

use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::debug;

use super::reader::read_fully;
use super::{check_fit, check_target, ImageFormat, ImageInfo};
use crate::palette::PaletteTable;
use crate::surface::{PixelFormat, PixelSurface};
use crate::{Error, Result};

/// Where a palette codec takes its colors from.
#[derive(Debug, Clone)]
pub enum PaletteSource {
    /// Palette stored at the start of the stream.
    Header,
    /// No palette in the stream; this table is attached instead.
    Fixed(Arc<PaletteTable>),
}

/// Codec for the three raw dump formats.
#[derive(Debug)]
pub struct RawCodec {
    format: PixelFormat,
    width: u16,
    height: u16,
    palette: PaletteSource,
    row: Vec<u8>,
}

impl RawCodec {
    /// Codec for a dump with an in-stream palette (for palette formats).
    pub fn new(format: PixelFormat, width: u16, height: u16) -> Self {
        Self {
            format,
            width,
            height,
            palette: PaletteSource::Header,
            row: Vec::new(),
        }
    }

    /// Codec for a palette dump without a palette header.
    pub fn headerless(format: PixelFormat, width: u16, height: u16, palette: Arc<PaletteTable>) -> Self {
        Self {
            palette: PaletteSource::Fixed(palette),
            ..Self::new(format, width, height)
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self.format {
            PixelFormat::Rgb565 => ImageFormat::Raw565,
            PixelFormat::Pal256 => ImageFormat::Pal256,
            PixelFormat::Pal16 => ImageFormat::Pal16,
        }
    }

    fn header_len(&self) -> usize {
        match (&self.palette, self.format.palette_len()) {
            (PaletteSource::Header, Some(entries)) => entries * 3,
            _ => 0,
        }
    }

    fn data_len(&self) -> usize {
        self.format.stride(self.width) * self.height as usize
    }

    /// Exact stream length this codec accepts.
    pub fn expected_len(&self) -> usize {
        self.header_len() + self.data_len()
    }

    pub fn info(&self) -> ImageInfo {
        ImageInfo {
            format: self.image_format(),
            width: self.width as u32,
            height: self.height as u32,
            bits_per_pixel: self.format.bits_per_pixel(),
            surface_format: self.format,
            frames: 1,
        }
    }

    fn truncated(&self, actual: usize) -> Error {
        Error::TruncatedInput {
            expected: self.expected_len(),
            actual,
        }
    }

    fn read_palette<R: Read>(&self, reader: &mut R) -> Result<Option<Arc<PaletteTable>>> {
        match (&self.palette, self.format.is_indexed()) {
            (_, false) => Ok(None),
            (PaletteSource::Fixed(table), true) => {
                if Some(table.len()) != self.format.palette_len() {
                    return Err(Error::PaletteSize(table.len()));
                }
                Ok(Some(table.clone()))
            }
            (PaletteSource::Header, true) => {
                let mut bytes = vec![0u8; self.header_len()];
                let n = read_fully(reader, &mut bytes)?;
                if n < bytes.len() {
                    return Err(self.truncated(n));
                }
                Ok(Some(Arc::new(PaletteTable::from_rgb_bytes(&bytes)?)))
            }
        }
    }

    /// Fails if the stream continues past the declared length, reporting
    /// the full length of the stream.
    fn expect_end<R: Read>(&self, reader: &mut R) -> Result<()> {
        let mut next = [0u8; 1];
        if read_fully(reader, &mut next)? > 0 {
            let extra = 1 + io::copy(reader, &mut io::sink())? as usize;
            return Err(self.truncated(self.expected_len() + extra));
        }
        Ok(())
    }

    /// Reads a whole dump into a new surface.
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<PixelSurface> {
        let palette = self.read_palette(reader)?;
        let mut surface = PixelSurface::new(self.width, self.height, self.format)?;
        let n = read_fully(reader, surface.raw_bytes_mut())?;
        if n < self.data_len() {
            return Err(self.truncated(self.header_len() + n));
        }
        self.expect_end(reader)?;
        if let Some(palette) = palette {
            surface.set_palette(palette)?;
        }
        debug!(
            "Decoded {} {}x{} dump",
            self.image_format(),
            self.width,
            self.height
        );
        Ok(surface)
    }

    /// Reads a dump into `target`, which must share the dump's pixel format.
    ///
    /// The dump's palette replaces the target's palette before pixel data is
    /// read. A short stream leaves the rows read so far in place and fails
    /// with [`Error::TruncatedInput`].
    pub fn decode_into<R: Read>(
        &mut self,
        reader: &mut R,
        target: &mut PixelSurface,
        origin: (u16, u16),
    ) -> Result<()> {
        check_target(self.image_format(), self.format, target)?;
        check_fit(
            self.image_format(),
            self.width as u32,
            self.height as u32,
            target,
            origin,
        )?;
        if let Some(palette) = self.read_palette(reader)? {
            target.set_palette(palette)?;
        }

        let whole = origin == (0, 0)
            && self.width == target.width()
            && self.height == target.height();
        if whole {
            let n = read_fully(reader, target.raw_bytes_mut())?;
            if n < self.data_len() {
                return Err(self.truncated(self.header_len() + n));
            }
            return self.expect_end(reader);
        }

        let stride = self.format.stride(self.width);
        self.row.resize(stride, 0);
        let (ox, oy) = (origin.0 as usize, origin.1 as usize);
        let target_stride = target.stride();
        for y in 0..self.height as usize {
            let n = read_fully(reader, &mut self.row)?;
            if n < stride {
                return Err(self.truncated(self.header_len() + y * stride + n));
            }
            let base = (oy + y) * target_stride;
            match self.format {
                PixelFormat::Rgb565 => {
                    let start = base + ox * 2;
                    target.raw_bytes_mut()[start..start + stride].copy_from_slice(&self.row);
                }
                PixelFormat::Pal256 => {
                    let start = base + ox;
                    target.raw_bytes_mut()[start..start + stride].copy_from_slice(&self.row);
                }
                PixelFormat::Pal16 => {
                    for x in 0..self.width as usize {
                        let byte = self.row[x / 2];
                        let index = if x % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                        target.set_pixel((ox + x) as i32, (oy + y) as i32, index as u32)?;
                    }
                }
            }
        }
        self.expect_end(reader)
    }

    /// Writes `surface` in this codec's layout.
    pub fn encode<W: Write>(&self, surface: &PixelSurface, writer: &mut W) -> Result<()> {
        check_target(self.image_format(), self.format, surface)?;
        if surface.width() != self.width || surface.height() != self.height {
            return Err(Error::FramebufferSize {
                expected: self.data_len(),
                actual: surface.raw_bytes().len(),
            });
        }
        if matches!(self.palette, PaletteSource::Header) && self.format.is_indexed() {
            let palette = surface
                .palette()
                .ok_or(Error::MissingPalette(self.format))?;
            for &color in palette.entries() {
                writer.write_all(&[(color >> 16) as u8, (color >> 8) as u8, color as u8])?;
            }
        }
        writer.write_all(surface.raw_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::PalettePreset;

    fn gradient(width: u16, height: u16) -> PixelSurface {
        let mut s = PixelSurface::new(width, height, PixelFormat::Rgb565).unwrap();
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                s.set_pixel(x, y, ((x as u32 * 40) << 16) | ((y as u32 * 30) << 8) | 0x80)
                    .unwrap();
            }
        }
        s
    }

    #[test]
    fn test_raw565_round_trip() {
        let original = gradient(5, 3);
        let codec = RawCodec::new(PixelFormat::Rgb565, 5, 3);
        let mut bytes = Vec::new();
        codec.encode(&original, &mut bytes).unwrap();
        assert_eq!(bytes.len(), 30);

        let mut codec = RawCodec::new(PixelFormat::Rgb565, 5, 3);
        let decoded = codec.decode(&mut &bytes[..]).unwrap();
        assert_eq!(decoded.raw_bytes(), original.raw_bytes());
    }

    #[test]
    fn test_raw565_length_must_match() {
        let mut codec = RawCodec::new(PixelFormat::Rgb565, 4, 4);
        let short = vec![0u8; 31];
        assert!(matches!(
            codec.decode(&mut &short[..]),
            Err(Error::TruncatedInput {
                expected: 32,
                actual: 31
            })
        ));
        let long = vec![0u8; 40];
        assert!(matches!(
            codec.decode(&mut &long[..]),
            Err(Error::TruncatedInput {
                expected: 32,
                actual: 40
            })
        ));
    }

    #[test]
    fn test_pal16_header_and_packing() {
        let mut bytes = vec![0u8; 48];
        bytes[30..33].copy_from_slice(&[0x12, 0x34, 0x56]); // entry 10
        bytes[33..36].copy_from_slice(&[0xAB, 0xCD, 0xEF]); // entry 11
        bytes.extend_from_slice(&[0xAB, 0xBA]);

        let mut codec = RawCodec::new(PixelFormat::Pal16, 4, 1);
        let surface = codec.decode(&mut &bytes[..]).unwrap();
        assert_eq!(surface.get_index(0, 0).unwrap(), 10);
        assert_eq!(surface.get_index(1, 0).unwrap(), 11);
        assert_eq!(surface.get_pixel(0, 0).unwrap(), 0x123456);
        assert_eq!(surface.get_pixel(2, 0).unwrap(), 0xABCDEF);
    }

    #[test]
    fn test_pal256_truncated_palette() {
        let bytes = vec![0u8; 700];
        let mut codec = RawCodec::new(PixelFormat::Pal256, 2, 2);
        assert!(matches!(
            codec.decode(&mut &bytes[..]),
            Err(Error::TruncatedInput {
                expected: 772,
                actual: 700
            })
        ));
    }

    #[test]
    fn test_headerless_with_preset() {
        let palette = Arc::new(PaletteTable::preset(PalettePreset::Rgb884));
        let mut codec = RawCodec::headerless(PixelFormat::Pal256, 2, 1, palette);
        assert_eq!(codec.expected_len(), 2);
        let surface = codec.decode(&mut &[0u8, 255][..]).unwrap();
        assert_eq!(surface.get_pixel(1, 0).unwrap(), 0xFFFFFF);
    }

    #[test]
    fn test_decode_into_at_origin() {
        let mut target = PixelSurface::new(4, 4, PixelFormat::Pal256).unwrap();
        let palette = Arc::new(PaletteTable::preset(PalettePreset::Rgb676));
        let mut codec = RawCodec::headerless(PixelFormat::Pal256, 2, 2, palette);
        codec
            .decode_into(&mut &[1u8, 2, 3, 4][..], &mut target, (2, 1))
            .unwrap();
        assert_eq!(target.get_index(2, 1).unwrap(), 1);
        assert_eq!(target.get_index(3, 2).unwrap(), 4);
        assert_eq!(target.get_index(1, 1).unwrap(), 0);
        assert!(target.palette().is_some());
    }

    #[test]
    fn test_decode_into_short_leaves_partial_rows() {
        let mut target = PixelSurface::new(2, 2, PixelFormat::Rgb565).unwrap();
        let mut codec = RawCodec::new(PixelFormat::Rgb565, 2, 2);
        let err = codec
            .decode_into(&mut &[0xFFu8, 0xFF, 0xFF][..], &mut target, (0, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedInput {
                expected: 8,
                actual: 3
            }
        ));
        assert_eq!(target.get_index(0, 0).unwrap(), 0xFFFF);
        assert_eq!(target.get_index(1, 1).unwrap(), 0);
    }

    #[test]
    fn test_decode_into_checks_target_first() {
        let mut target = PixelSurface::new(2, 2, PixelFormat::Rgb565).unwrap();
        target.fill(0xFFFFFF).unwrap();
        let mut codec = RawCodec::new(PixelFormat::Rgb565, 3, 2);
        assert!(codec
            .decode_into(&mut &[0u8; 12][..], &mut target, (0, 0))
            .is_err());
        assert!(target.raw_bytes().iter().all(|&b| b == 0xFF));

        let mut pal = PixelSurface::new(2, 2, PixelFormat::Pal16).unwrap();
        let mut codec = RawCodec::new(PixelFormat::Rgb565, 2, 2);
        assert!(codec.decode_into(&mut &[0u8; 8][..], &mut pal, (0, 0)).is_err());
    }

    #[test]
    fn test_pal16_decode_into_odd_origin() {
        let mut target = PixelSurface::new(4, 1, PixelFormat::Pal16).unwrap();
        let palette = Arc::new(PaletteTable::preset(PalettePreset::Cga));
        let mut codec = RawCodec::headerless(PixelFormat::Pal16, 2, 1, palette);
        codec
            .decode_into(&mut &[0x9Cu8][..], &mut target, (1, 0))
            .unwrap();
        let got: Vec<u16> = (0..4).map(|x| target.get_index(x, 0).unwrap()).collect();
        assert_eq!(got, vec![0, 9, 12, 0]);
    }
}
