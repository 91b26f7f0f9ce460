//! Windows/OS2 bitmap decoder.
//!
//! Supports uncompressed 1, 4, 8, 24 and 32 bits per pixel (32-bit alpha is
//! ignored, `BI_BITFIELDS` only with the standard BGRA masks), bottom-up and
//! top-down row order, and the 12, 40, 52, 56, 108 and 124 byte DIB headers.

use std::io::Read;
use std::sync::Arc;

use tracing::{debug, warn};

use super::reader::ByteReader;
use super::{check_fit, check_target, surface_dimensions, ImageFormat, ImageInfo};
use crate::color::join_color;
use crate::error::{DecodeReason, DecodeStage};
use crate::palette::{PaletteTable, PAL16_ENTRIES, PAL256_ENTRIES};
use crate::surface::{PixelFormat, PixelSurface};
use crate::Result;

const FILE_HEADER_LEN: u64 = 14;
const CORE_HEADER_LEN: u32 = 12;
const INFO_HEADER_LEN: u32 = 40;

const BI_RGB: u32 = 0;
const BI_BITFIELDS: u32 = 3;

/// Parsed file and DIB headers.
#[derive(Debug)]
struct BmpHeader {
    file_size: u32,
    data_offset: u32,
    width: u32,
    height: u32,
    top_down: bool,
    bpp: u16,
    /// Colors stored in the file, before padding.
    colors: Vec<u32>,
}

impl BmpHeader {
    fn row_len(&self) -> usize {
        (self.bpp as usize * self.width as usize).div_ceil(32) * 4
    }

    fn surface_format(&self) -> PixelFormat {
        match self.bpp {
            1 | 4 => PixelFormat::Pal16,
            8 => PixelFormat::Pal256,
            _ => PixelFormat::Rgb565,
        }
    }

    /// File palette padded with black to the surface palette size.
    fn palette(&self) -> Result<Option<PaletteTable>> {
        let len = match self.surface_format() {
            PixelFormat::Pal16 => PAL16_ENTRIES,
            PixelFormat::Pal256 => PAL256_ENTRIES,
            PixelFormat::Rgb565 => return Ok(None),
        };
        let colors = &self.colors[..self.colors.len().min(len)];
        Ok(Some(PaletteTable::padded(colors, len)?))
    }
}

/// BMP decoder with a reusable row buffer.
#[derive(Debug, Default)]
pub struct BmpCodec {
    row: Vec<u8>,
}

impl BmpCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_header<R: Read>(&mut self, r: &mut ByteReader<'_, R>) -> Result<BmpHeader> {
        r.set_stage(DecodeStage::Header);
        let mut magic = [0u8; 2];
        r.read_exact(&mut magic)?;
        if &magic != b"BM" {
            return Err(r.fail(DecodeReason::BadMagic));
        }
        let file_size = r.u32_le()?;
        let _reserved = r.u32_le()?;
        let data_offset = r.u32_le()?;

        let dib_len = r.u32_le()?;
        let (width, height, bpp, compression, clr_used) = match dib_len {
            CORE_HEADER_LEN => {
                let width = r.u16_le()? as i64;
                let height = r.u16_le()? as i64;
                let _planes = r.u16_le()?;
                let bpp = r.u16_le()?;
                (width, height, bpp, BI_RGB, 0)
            }
            40 | 52 | 56 | 108 | 124 => {
                let width = r.i32_le()? as i64;
                let height = r.i32_le()? as i64;
                let _planes = r.u16_le()?;
                let bpp = r.u16_le()?;
                let compression = r.u32_le()?;
                let _image_size = r.u32_le()?;
                let _x_ppm = r.u32_le()?;
                let _y_ppm = r.u32_le()?;
                let clr_used = r.u32_le()?;
                let _clr_important = r.u32_le()?;
                (width, height, bpp, compression, clr_used)
            }
            other => return Err(r.fail(DecodeReason::UnsupportedHeader(other))),
        };

        // Channel masks sit in the extended header, or right after a
        // 40-byte header when BI_BITFIELDS is set.
        let mut extra = vec![0u8; dib_len.saturating_sub(INFO_HEADER_LEN) as usize];
        r.read_exact(&mut extra)?;
        if compression == BI_BITFIELDS && dib_len == INFO_HEADER_LEN {
            extra.resize(12, 0);
            r.read_exact(&mut extra)?;
        }

        if !matches!(bpp, 1 | 4 | 8 | 24 | 32) {
            return Err(r.fail(DecodeReason::UnsupportedBitDepth(bpp)));
        }
        match compression {
            BI_RGB => {}
            BI_BITFIELDS if bpp == 32 && has_standard_masks(&extra) => {}
            other => return Err(r.fail(DecodeReason::UnsupportedCompression(other))),
        }
        if width <= 0 || height == 0 || width > u16::MAX as i64 || height.abs() > u16::MAX as i64 {
            return Err(r.fail(DecodeReason::BadDimensions { width, height }));
        }

        let mut colors = Vec::new();
        if bpp <= 8 {
            r.set_stage(DecodeStage::Palette);
            let max = 1u32 << bpp;
            let entry_len = if dib_len == CORE_HEADER_LEN { 3 } else { 4 };
            let declared = if clr_used == 0 { max } else { clr_used.min(max) };
            // Older core-header files imply the count from the data offset.
            let room = (data_offset as u64).saturating_sub(FILE_HEADER_LEN + dib_len as u64)
                / entry_len as u64;
            let count = if dib_len == CORE_HEADER_LEN {
                declared.min(room as u32)
            } else {
                declared
            };
            if count == 0 {
                return Err(r.fail(DecodeReason::MissingColorTable));
            }
            let mut entry = [0u8; 4];
            for _ in 0..count {
                r.read_exact(&mut entry[..entry_len])?;
                colors.push(join_color(entry[2], entry[1], entry[0]));
            }
        }

        let header = BmpHeader {
            file_size,
            data_offset,
            width: width as u32,
            height: height.unsigned_abs() as u32,
            top_down: height < 0,
            bpp,
            colors,
        };
        debug!(
            "BMP header: {}x{} {} bpp, {} colors, dib {} bytes, data at {}{}",
            header.width,
            header.height,
            header.bpp,
            header.colors.len(),
            dib_len,
            header.data_offset,
            if header.top_down { ", top-down" } else { "" }
        );
        Ok(header)
    }

    /// Skips to the pixel data and writes every row into `target`.
    ///
    /// `resolve` converts palette indices to colors for RGB565 targets.
    fn read_pixels<R: Read>(
        &mut self,
        r: &mut ByteReader<'_, R>,
        header: &BmpHeader,
        target: &mut PixelSurface,
        origin: (u16, u16),
        resolve: Option<&PaletteTable>,
    ) -> Result<()> {
        let position = r.position();
        if (header.data_offset as u64) < position {
            return Err(r.fail(DecodeReason::BadPixelOffset(header.data_offset)));
        }
        r.skip(header.data_offset as u64 - position)?;

        let row_len = header.row_len();
        let data_end = header.data_offset as u64 + (row_len * header.height as usize) as u64;
        if header.file_size != 0 && (header.file_size as u64) < data_end {
            warn!(
                "BMP file size field {} is smaller than the pixel data end {}",
                header.file_size, data_end
            );
        }

        r.set_stage(DecodeStage::PixelData);
        self.row.resize(row_len, 0);
        let (ox, oy) = (origin.0 as i32, origin.1 as i32);
        for i in 0..header.height {
            r.read_exact(&mut self.row)?;
            let row = if header.top_down {
                i
            } else {
                header.height - 1 - i
            };
            let y = row as i32;
            for x in 0..header.width as usize {
                let color = match header.bpp {
                    24 | 32 => {
                        let step = header.bpp as usize / 8;
                        let px = &self.row[x * step..x * step + 3];
                        join_color(px[2], px[1], px[0])
                    }
                    8 => self.row[x] as u32,
                    4 => {
                        let byte = self.row[x / 2];
                        (if x % 2 == 0 { byte >> 4 } else { byte & 0x0F }) as u32
                    }
                    _ => ((self.row[x / 8] >> (7 - x % 8)) & 1) as u32,
                };
                let color = match resolve {
                    Some(palette) => palette.get(color as usize).unwrap_or(0),
                    None => color,
                };
                target.set_pixel(ox + x as i32, oy + y, color)?;
            }
        }
        Ok(())
    }

    /// Decodes into a new surface: PAL16 for 1/4-bit, PAL256 for 8-bit,
    /// RGB565 otherwise.
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<PixelSurface> {
        let mut r = ByteReader::new(reader, ImageFormat::Bmp);
        let header = self.read_header(&mut r)?;
        let (width, height) = surface_dimensions(ImageFormat::Bmp, header.width, header.height)?;
        let mut surface = PixelSurface::new(width, height, header.surface_format())?;
        if let Some(palette) = header.palette()? {
            surface.set_palette(Arc::new(palette))?;
        }
        self.read_pixels(&mut r, &header, &mut surface, (0, 0), None)?;
        debug!("Decoded {}x{} BMP", width, height);
        Ok(surface)
    }

    /// Decodes into an RGB565 `target` at `origin`, resolving palettes.
    ///
    /// Rows are written as they are read, bottom row first for bottom-up
    /// files, so a truncated file leaves the rows read so far in place.
    pub fn decode_into<R: Read>(
        &mut self,
        reader: &mut R,
        target: &mut PixelSurface,
        origin: (u16, u16),
    ) -> Result<()> {
        check_target(ImageFormat::Bmp, PixelFormat::Rgb565, target)?;
        let mut r = ByteReader::new(reader, ImageFormat::Bmp);
        let header = self.read_header(&mut r)?;
        check_fit(ImageFormat::Bmp, header.width, header.height, target, origin)?;
        let palette = header.palette()?;
        self.read_pixels(&mut r, &header, target, origin, palette.as_ref())
    }

    pub fn info<R: Read>(&mut self, reader: &mut R) -> Result<ImageInfo> {
        let mut r = ByteReader::new(reader, ImageFormat::Bmp);
        let header = self.read_header(&mut r)?;
        Ok(ImageInfo {
            format: ImageFormat::Bmp,
            width: header.width,
            height: header.height,
            bits_per_pixel: header.bpp as u8,
            surface_format: header.surface_format(),
            frames: 1,
        })
    }
}

fn has_standard_masks(masks: &[u8]) -> bool {
    if masks.len() < 12 {
        return false;
    }
    let mask = |i: usize| u32::from_le_bytes([masks[i], masks[i + 1], masks[i + 2], masks[i + 3]]);
    mask(0) == 0x00FF_0000 && mask(4) == 0x0000_FF00 && mask(8) == 0x0000_00FF
}
