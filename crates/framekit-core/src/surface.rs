//! Addressable pixel surfaces in RGB565, PAL256 and PAL16 formats.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::color::{color_to_rgb565, rgb565_to_color, rgb565_to_rgb888, split_color};
use crate::palette::{PaletteTable, PAL16_ENTRIES, PAL256_ENTRIES};
use crate::{Error, Result};

/// Storage encoding of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 16-bit RGB565, stored big-endian (panel byte order).
    #[default]
    Rgb565,
    /// One byte per pixel, index into a 256-entry palette.
    Pal256,
    /// Two pixels per byte, high nibble first, index into a 16-entry palette.
    Pal16,
}

impl PixelFormat {
    /// Bytes per row for a surface of the given width.
    pub fn stride(&self, width: u16) -> usize {
        let width = width as usize;
        match self {
            PixelFormat::Rgb565 => width * 2,
            PixelFormat::Pal256 => width,
            PixelFormat::Pal16 => width.div_ceil(2),
        }
    }

    /// Stored bits per pixel.
    pub fn bits_per_pixel(&self) -> u8 {
        match self {
            PixelFormat::Rgb565 => 16,
            PixelFormat::Pal256 => 8,
            PixelFormat::Pal16 => 4,
        }
    }

    /// Palette entry count for palette formats.
    pub fn palette_len(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgb565 => None,
            PixelFormat::Pal256 => Some(PAL256_ENTRIES),
            PixelFormat::Pal16 => Some(PAL16_ENTRIES),
        }
    }

    /// Returns true for the indexed formats.
    pub fn is_indexed(&self) -> bool {
        self.palette_len().is_some()
    }
}

impl FromStr for PixelFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "rgb565" | "raw565" | "565" => Ok(PixelFormat::Rgb565),
            "pal256" | "p256" => Ok(PixelFormat::Pal256),
            "pal16" | "p16" => Ok(PixelFormat::Pal16),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelFormat::Rgb565 => write!(f, "RGB565"),
            PixelFormat::Pal256 => write!(f, "PAL256"),
            PixelFormat::Pal16 => write!(f, "PAL16"),
        }
    }
}

/// A fixed-size 2D pixel buffer.
///
/// Storage is allocated once at construction and never resized. Colors are
/// `0xRRGGBB` for RGB565 surfaces and plain indices for palette surfaces.
#[derive(Debug, Clone)]
pub struct PixelSurface {
    storage: Vec<u8>,
    width: u16,
    height: u16,
    stride: usize,
    format: PixelFormat,
    palette: Option<Arc<PaletteTable>>,
}

impl PixelSurface {
    /// Creates a zero-filled surface.
    pub fn new(width: u16, height: u16, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions {
                width: width as u32,
                height: height as u32,
            });
        }
        let stride = format.stride(width);
        Ok(Self {
            storage: vec![0; stride * height as usize],
            width,
            height,
            stride,
            format,
            palette: None,
        })
    }

    /// Creates a zero-filled palette surface with an attached palette.
    pub fn with_palette(
        width: u16,
        height: u16,
        format: PixelFormat,
        palette: Arc<PaletteTable>,
    ) -> Result<Self> {
        let mut surface = Self::new(width, height, format)?;
        surface.set_palette(palette)?;
        Ok(surface)
    }

    /// Wraps an existing buffer of exactly `stride * height` bytes.
    pub fn from_bytes(width: u16, height: u16, format: PixelFormat, bytes: Vec<u8>) -> Result<Self> {
        let mut surface = Self {
            storage: Vec::new(),
            width,
            height,
            stride: format.stride(width),
            format,
            palette: None,
        };
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions {
                width: width as u32,
                height: height as u32,
            });
        }
        let expected = surface.stride * height as usize;
        if bytes.len() != expected {
            return Err(Error::FramebufferSize {
                expected,
                actual: bytes.len(),
            });
        }
        surface.storage = bytes;
        Ok(surface)
    }

    /// Returns the width of the surface.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Returns the height of the surface.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Returns the storage format.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Returns the bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the attached palette, if any.
    pub fn palette(&self) -> Option<&Arc<PaletteTable>> {
        self.palette.as_ref()
    }

    /// Attaches a palette. Its size must match the format.
    pub fn set_palette(&mut self, palette: Arc<PaletteTable>) -> Result<()> {
        match self.format.palette_len() {
            Some(len) if len == palette.len() => {
                self.palette = Some(palette);
                Ok(())
            }
            Some(_) => Err(Error::PaletteSize(palette.len())),
            None => Err(Error::PaletteSize(palette.len())),
        }
    }

    /// Detaches the palette; indices are then reported raw.
    pub fn clear_palette(&mut self) {
        self.palette = None;
    }

    /// Borrowed view of the storage for bulk transfer.
    pub fn raw_bytes(&self) -> &[u8] {
        &self.storage
    }

    /// Mutable view of the storage, for filling straight from a stream.
    pub fn raw_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Bytes of row `y`, which must be below the height.
    pub(crate) fn row_bytes(&self, y: u16) -> &[u8] {
        let start = y as usize * self.stride;
        &self.storage[start..start + self.stride]
    }

    fn check_bounds(&self, x: i32, y: i32) -> Result<(usize, usize)> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return Err(Error::Bounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((x as usize, y as usize))
    }

    fn check_color(&self, color: u32) -> Result<()> {
        if let Some(len) = self.format.palette_len() {
            if color as usize >= len {
                return Err(Error::InvalidIndex {
                    index: color,
                    max: len as u32 - 1,
                });
            }
        }
        Ok(())
    }

    /// Reads the stored value at (x, y): the RGB565 word or the palette index.
    pub fn get_index(&self, x: i32, y: i32) -> Result<u16> {
        let (x, y) = self.check_bounds(x, y)?;
        Ok(self.raw_at(x, y))
    }

    #[inline]
    fn raw_at(&self, x: usize, y: usize) -> u16 {
        let row = y * self.stride;
        match self.format {
            PixelFormat::Rgb565 => {
                let i = row + x * 2;
                u16::from_be_bytes([self.storage[i], self.storage[i + 1]])
            }
            PixelFormat::Pal256 => self.storage[row + x] as u16,
            PixelFormat::Pal16 => {
                let byte = self.storage[row + x / 2];
                if x % 2 == 0 {
                    (byte >> 4) as u16
                } else {
                    (byte & 0x0F) as u16
                }
            }
        }
    }

    /// Reads the color at (x, y).
    ///
    /// RGB565 pixels come back as `0xRRGGBB` with the truncated low bits
    /// zeroed. Palette pixels resolve through the palette when one is
    /// attached and come back as the raw index otherwise.
    pub fn get_pixel(&self, x: i32, y: i32) -> Result<u32> {
        let raw = self.get_index(x, y)?;
        Ok(self.resolve(raw))
    }

    #[inline]
    fn resolve(&self, raw: u16) -> u32 {
        match (&self.format, &self.palette) {
            (PixelFormat::Rgb565, _) => rgb565_to_color(raw),
            (_, Some(palette)) => palette.get(raw as usize).unwrap_or(0),
            (_, None) => raw as u32,
        }
    }

    /// Writes a color at (x, y).
    ///
    /// RGB565 surfaces take `0xRRGGBB` and truncate it to 5-6-5 bits;
    /// palette surfaces take an index within the palette range.
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) -> Result<()> {
        let (x, y) = self.check_bounds(x, y)?;
        self.check_color(color)?;
        self.store(x, y, color);
        Ok(())
    }

    #[inline]
    fn store(&mut self, x: usize, y: usize, color: u32) {
        let row = y * self.stride;
        match self.format {
            PixelFormat::Rgb565 => {
                let i = row + x * 2;
                let px = color_to_rgb565(color).to_be_bytes();
                self.storage[i] = px[0];
                self.storage[i + 1] = px[1];
            }
            PixelFormat::Pal256 => self.storage[row + x] = color as u8,
            PixelFormat::Pal16 => {
                let byte = &mut self.storage[row + x / 2];
                let index = color as u8 & 0x0F;
                if x % 2 == 0 {
                    *byte = (*byte & 0x0F) | (index << 4);
                } else {
                    *byte = (*byte & 0xF0) | index;
                }
            }
        }
    }

    /// Sets every pixel to a color.
    pub fn fill(&mut self, color: u32) -> Result<()> {
        self.check_color(color)?;
        match self.format {
            PixelFormat::Rgb565 => {
                let px = color_to_rgb565(color).to_be_bytes();
                if px[0] == px[1] {
                    self.storage.fill(px[0]);
                } else {
                    for pair in self.storage.chunks_exact_mut(2) {
                        pair.copy_from_slice(&px);
                    }
                }
            }
            PixelFormat::Pal256 => self.storage.fill(color as u8),
            PixelFormat::Pal16 => {
                let index = color as u8;
                self.storage.fill((index << 4) | index);
            }
        }
        Ok(())
    }

    /// Fills a rectangle, clipped to the surface.
    ///
    /// A rectangle entirely outside the surface is a no-op.
    pub fn fill_rect(&mut self, x: i32, y: i32, width: i32, height: i32, color: u32) -> Result<()> {
        self.check_color(color)?;
        if width <= 0 || height <= 0 {
            return Ok(());
        }
        let x0 = (x as i64).max(0);
        let y0 = (y as i64).max(0);
        let x1 = (x as i64 + width as i64).min(self.width as i64);
        let y1 = (y as i64 + height as i64).min(self.height as i64);
        if x0 >= x1 || y0 >= y1 {
            return Ok(());
        }
        let (x0, x1) = (x0 as usize, x1 as usize);
        for row in y0 as usize..y1 as usize {
            let base = row * self.stride;
            match self.format {
                PixelFormat::Rgb565 => {
                    let px = color_to_rgb565(color).to_be_bytes();
                    for pair in self.storage[base + x0 * 2..base + x1 * 2].chunks_exact_mut(2) {
                        pair.copy_from_slice(&px);
                    }
                }
                PixelFormat::Pal256 => self.storage[base + x0..base + x1].fill(color as u8),
                PixelFormat::Pal16 => {
                    for col in x0..x1 {
                        self.store(col, row, color);
                    }
                }
            }
        }
        Ok(())
    }

    /// Expands the surface to RGBA8 bytes, e.g. for PNG export.
    pub fn to_rgba8(&self) -> Result<Vec<u8>> {
        if self.format.is_indexed() && self.palette.is_none() {
            return Err(Error::MissingPalette(self.format));
        }
        let mut rgba = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height as usize {
            for x in 0..self.width as usize {
                let raw = self.raw_at(x, y);
                let (r, g, b) = match self.format {
                    PixelFormat::Rgb565 => rgb565_to_rgb888(raw),
                    _ => split_color(self.resolve(raw)),
                };
                rgba.extend_from_slice(&[r, g, b, 255]);
            }
        }
        Ok(rgba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::truncate_to_rgb565;
    use crate::palette::PalettePreset;

    #[test]
    fn test_strides() {
        assert_eq!(PixelFormat::Rgb565.stride(160), 320);
        assert_eq!(PixelFormat::Pal256.stride(160), 160);
        assert_eq!(PixelFormat::Pal16.stride(160), 80);
        assert_eq!(PixelFormat::Pal16.stride(5), 3);

        let s = PixelSurface::new(5, 3, PixelFormat::Pal16).unwrap();
        assert_eq!(s.raw_bytes().len(), 9);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        assert!(matches!(
            PixelSurface::new(0, 10, PixelFormat::Rgb565),
            Err(Error::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_rgb565_set_get_truncates() {
        let mut s = PixelSurface::new(4, 4, PixelFormat::Rgb565).unwrap();
        for &c in &[0x447711u32, 0xFFFFFF, 0x010203, 0xF8FCF8] {
            s.set_pixel(2, 3, c).unwrap();
            assert_eq!(s.get_pixel(2, 3).unwrap(), truncate_to_rgb565(c));
        }
    }

    #[test]
    fn test_rgb565_stored_big_endian() {
        let mut s = PixelSurface::new(2, 1, PixelFormat::Rgb565).unwrap();
        s.set_pixel(1, 0, 0xFF0000).unwrap();
        assert_eq!(s.raw_bytes(), &[0x00, 0x00, 0xF8, 0x00]);
        assert_eq!(s.get_index(1, 0).unwrap(), 0xF800);
    }

    #[test]
    fn test_palette_set_get_exact() {
        let mut s = PixelSurface::new(3, 2, PixelFormat::Pal256).unwrap();
        s.set_pixel(0, 1, 200).unwrap();
        assert_eq!(s.get_pixel(0, 1).unwrap(), 200);

        let mut s = PixelSurface::new(3, 2, PixelFormat::Pal16).unwrap();
        s.set_pixel(2, 1, 9).unwrap();
        assert_eq!(s.get_pixel(2, 1).unwrap(), 9);
    }

    #[test]
    fn test_pal16_packs_high_nibble_first() {
        let mut s = PixelSurface::new(2, 1, PixelFormat::Pal16).unwrap();
        s.set_pixel(0, 0, 0xA).unwrap();
        s.set_pixel(1, 0, 0xB).unwrap();
        assert_eq!(s.raw_bytes(), &[0xAB]);

        let s = PixelSurface::from_bytes(2, 1, PixelFormat::Pal16, vec![0xAB]).unwrap();
        assert_eq!(s.get_pixel(0, 0).unwrap(), 10);
        assert_eq!(s.get_pixel(1, 0).unwrap(), 11);
    }

    #[test]
    fn test_out_of_bounds() {
        let mut s = PixelSurface::new(4, 4, PixelFormat::Rgb565).unwrap();
        assert!(matches!(s.get_pixel(4, 0), Err(Error::Bounds { x: 4, .. })));
        assert!(matches!(s.set_pixel(-1, 0, 0), Err(Error::Bounds { .. })));
        assert!(matches!(s.set_pixel(0, 4, 0), Err(Error::Bounds { .. })));
    }

    #[test]
    fn test_invalid_index() {
        let mut s = PixelSurface::new(4, 4, PixelFormat::Pal16).unwrap();
        assert!(matches!(
            s.set_pixel(0, 0, 16),
            Err(Error::InvalidIndex { index: 16, max: 15 })
        ));
        let mut s = PixelSurface::new(4, 4, PixelFormat::Pal256).unwrap();
        assert!(matches!(
            s.set_pixel(0, 0, 256),
            Err(Error::InvalidIndex { index: 256, max: 255 })
        ));
        assert!(s.fill(300).is_err());
    }

    #[test]
    fn test_fill_every_format() {
        let mut s = PixelSurface::new(5, 3, PixelFormat::Rgb565).unwrap();
        s.fill(0x447711).unwrap();
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(s.get_pixel(x, y).unwrap(), truncate_to_rgb565(0x447711));
            }
        }

        // 0x0000 and 0xFFFF take the single-byte path
        s.fill(0xFFFFFF).unwrap();
        assert!(s.raw_bytes().iter().all(|&b| b == 0xFF));

        let mut s = PixelSurface::new(5, 3, PixelFormat::Pal16).unwrap();
        s.fill(7).unwrap();
        for y in 0..3 {
            for x in 0..5 {
                assert_eq!(s.get_pixel(x, y).unwrap(), 7);
            }
        }
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut s = PixelSurface::new(4, 4, PixelFormat::Pal256).unwrap();
        s.fill_rect(2, 2, 10, 10, 5).unwrap();
        assert_eq!(s.get_pixel(1, 1).unwrap(), 0);
        assert_eq!(s.get_pixel(2, 2).unwrap(), 5);
        assert_eq!(s.get_pixel(3, 3).unwrap(), 5);
        assert_eq!(s.get_pixel(3, 1).unwrap(), 0);

        s.fill_rect(-3, -3, 4, 4, 9).unwrap();
        assert_eq!(s.get_pixel(0, 0).unwrap(), 9);
        assert_eq!(s.get_pixel(1, 0).unwrap(), 0);
    }

    #[test]
    fn test_fill_rect_outside_is_noop() {
        let mut s = PixelSurface::new(4, 4, PixelFormat::Rgb565).unwrap();
        s.fill(0x102030).unwrap();
        let before = s.raw_bytes().to_vec();
        s.fill_rect(4, 0, 3, 3, 0xFFFFFF).unwrap();
        s.fill_rect(-5, -5, 5, 5, 0xFFFFFF).unwrap();
        s.fill_rect(1, 1, 0, 3, 0xFFFFFF).unwrap();
        assert_eq!(s.raw_bytes(), &before[..]);
    }

    #[test]
    fn test_fill_rect_pal16_odd_edges() {
        let mut s = PixelSurface::new(5, 1, PixelFormat::Pal16).unwrap();
        s.fill_rect(1, 0, 3, 1, 0xC).unwrap();
        let got: Vec<u32> = (0..5).map(|x| s.get_pixel(x, 0).unwrap()).collect();
        assert_eq!(got, vec![0, 12, 12, 12, 0]);
    }

    #[test]
    fn test_palette_resolution() {
        let pal = Arc::new(PaletteTable::preset(PalettePreset::Cga));
        let mut s = PixelSurface::with_palette(2, 2, PixelFormat::Pal16, pal.clone()).unwrap();
        s.set_pixel(1, 1, 4).unwrap();
        assert_eq!(s.get_pixel(1, 1).unwrap(), 0xAA0000);
        assert_eq!(s.get_index(1, 1).unwrap(), 4);

        s.clear_palette();
        assert_eq!(s.get_pixel(1, 1).unwrap(), 4);

        let mut rgb = PixelSurface::new(2, 2, PixelFormat::Rgb565).unwrap();
        assert!(rgb.set_palette(pal.clone()).is_err());
        let mut p256 = PixelSurface::new(2, 2, PixelFormat::Pal256).unwrap();
        assert!(matches!(p256.set_palette(pal), Err(Error::PaletteSize(16))));
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        assert!(matches!(
            PixelSurface::from_bytes(4, 4, PixelFormat::Rgb565, vec![0; 31]),
            Err(Error::FramebufferSize {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn test_to_rgba8() {
        let mut s = PixelSurface::new(2, 1, PixelFormat::Rgb565).unwrap();
        s.set_pixel(0, 0, 0xFFFFFF).unwrap();
        assert_eq!(s.to_rgba8().unwrap(), vec![255, 255, 255, 255, 0, 0, 0, 255]);

        let p = PixelSurface::new(2, 1, PixelFormat::Pal256).unwrap();
        assert!(matches!(p.to_rgba8(), Err(Error::MissingPalette(PixelFormat::Pal256))));
    }
}
