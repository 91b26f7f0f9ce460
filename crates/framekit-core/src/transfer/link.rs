//! Chunked streaming of surfaces over a [`PanelLink`].

use std::sync::Arc;

use tracing::debug;

use super::{DisplayTransfer, PanelLink, Window};
use crate::palette::PaletteTable;
use crate::surface::{PixelFormat, PixelSurface};
use crate::{Error, Result};

/// Bytes per `write_pixels` call unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// [`DisplayTransfer`] over a panel link.
///
/// RGB565 windows that cover whole rows go out as slices of the surface's
/// storage. Narrower RGB565 windows are sent row by row. Palette formats are
/// expanded through the palette's RGB565 lookup table into a reused chunk
/// buffer.
pub struct LinkPanel<L> {
    link: L,
    width: u16,
    height: u16,
    chunk_size: usize,
    chunk: Vec<u8>,
    lut: Vec<u16>,
    lut_source: Option<Arc<PaletteTable>>,
}

impl<L: PanelLink> LinkPanel<L> {
    /// Wraps `link` driving a `width` x `height` panel.
    pub fn new(link: L, width: u16, height: u16) -> Self {
        Self::with_chunk_size(link, width, height, DEFAULT_CHUNK_SIZE)
    }

    /// Like [`LinkPanel::new`] with a custom chunk size, rounded up to a
    /// whole number of pixels.
    pub fn with_chunk_size(link: L, width: u16, height: u16, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(2).next_multiple_of(2);
        Self {
            link,
            width,
            height,
            chunk_size,
            chunk: Vec::with_capacity(chunk_size),
            lut: Vec::new(),
            lut_source: None,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_inner(self) -> L {
        self.link
    }

    /// Rebuilds the lookup table when the surface carries a different palette.
    fn load_lut(&mut self, palette: &Arc<PaletteTable>) {
        let cached = self
            .lut_source
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, palette));
        if !cached {
            self.lut = palette.rgb565_lut();
            self.lut_source = Some(Arc::clone(palette));
            debug!("Loaded {}-entry palette lookup table", self.lut.len());
        }
    }

    fn send_direct(&mut self, surface: &PixelSurface, window: Window) -> Result<()> {
        let stride = surface.stride();
        if window.spans_rows(surface.width()) {
            let start = window.y as usize * stride;
            let end = start + window.height as usize * stride;
            for chunk in surface.raw_bytes()[start..end].chunks(self.chunk_size) {
                self.link.write_pixels(chunk)?;
            }
            return Ok(());
        }
        let (first, last) = (window.x as usize * 2, (window.x + window.width) as usize * 2);
        for y in window.y..window.y + window.height {
            let row = &surface.row_bytes(y)[first..last];
            for chunk in row.chunks(self.chunk_size) {
                self.link.write_pixels(chunk)?;
            }
        }
        Ok(())
    }

    fn send_indexed(&mut self, surface: &PixelSurface, window: Window) -> Result<()> {
        let palette = surface
            .palette()
            .ok_or(Error::MissingPalette(surface.format()))?;
        self.load_lut(palette);
        self.chunk.clear();
        let packed = surface.format() == PixelFormat::Pal16;
        for y in window.y..window.y + window.height {
            let row = surface.row_bytes(y);
            for x in window.x as usize..(window.x + window.width) as usize {
                let index = if packed {
                    let byte = row[x / 2];
                    if x % 2 == 0 {
                        byte >> 4
                    } else {
                        byte & 0x0F
                    }
                } else {
                    row[x]
                };
                let color = self.lut.get(index as usize).copied().unwrap_or(0);
                self.chunk.extend_from_slice(&color.to_be_bytes());
                if self.chunk.len() >= self.chunk_size {
                    self.link.write_pixels(&self.chunk)?;
                    self.chunk.clear();
                }
            }
        }
        if !self.chunk.is_empty() {
            self.link.write_pixels(&self.chunk)?;
            self.chunk.clear();
        }
        Ok(())
    }
}

impl<L: PanelLink> DisplayTransfer for LinkPanel<L> {
    fn transfer(&mut self, surface: &PixelSurface, window: Option<Window>) -> Result<()> {
        let window = window.unwrap_or_else(|| Window::full(surface));
        window.validate(surface.width(), surface.height())?;
        window.validate(self.width, self.height)?;
        // Resolve the palette before touching the link.
        if surface.format().is_indexed() && surface.palette().is_none() {
            return Err(Error::MissingPalette(surface.format()));
        }

        self.link.set_window(window)?;
        match surface.format() {
            PixelFormat::Rgb565 => self.send_direct(surface, window)?,
            PixelFormat::Pal256 | PixelFormat::Pal16 => self.send_indexed(surface, window)?,
        }
        debug!(
            "Transferred {} window {}x{} at ({}, {})",
            surface.format(),
            window.width,
            window.height,
            window.x,
            window.y
        );
        Ok(())
    }
}
