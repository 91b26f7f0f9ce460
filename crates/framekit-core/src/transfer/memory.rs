//! In-memory panel controller.

use tracing::debug;

use super::{PanelLink, Window};
use crate::surface::{PixelFormat, PixelSurface};
use crate::{Error, Result};

/// Emulated panel GRAM behind a [`PanelLink`].
///
/// Behaves like the controller's memory write: pixels land at a cursor that
/// advances along the current window and wraps back to its top-left corner
/// after the last pixel. A pixel split across two `write_pixels` calls is
/// carried over.
#[derive(Debug, Clone)]
pub struct MemoryPanel {
    width: u16,
    height: u16,
    gram: Vec<u16>,
    window: Window,
    cursor: (u16, u16),
    pending: Option<u8>,
    bytes_written: u64,
    writes: u64,
}

impl MemoryPanel {
    /// A blank `width` x `height` panel with the window covering all of it.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            gram: vec![0; width as usize * height as usize],
            window: Window::new(0, 0, width, height),
            cursor: (0, 0),
            pending: None,
            bytes_written: 0,
            writes: 0,
        }
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    /// Panel memory in row-major order, RGB565.
    pub fn gram(&self) -> &[u16] {
        &self.gram
    }

    pub fn pixel(&self, x: u16, y: u16) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.gram.get(y as usize * self.width as usize + x as usize).copied()
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Total pixel bytes received.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of `write_pixels` calls received.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Clears GRAM and statistics.
    pub fn reset(&mut self) {
        self.gram.fill(0);
        self.window = Window::new(0, 0, self.width, self.height);
        self.cursor = (0, 0);
        self.pending = None;
        self.bytes_written = 0;
        self.writes = 0;
    }

    /// Copies panel memory into an RGB565 surface.
    pub fn to_surface(&self) -> Result<PixelSurface> {
        let bytes = self.gram.iter().flat_map(|p| p.to_be_bytes()).collect();
        PixelSurface::from_bytes(self.width, self.height, PixelFormat::Rgb565, bytes)
    }

    fn store(&mut self, pixel: u16) {
        let (x, y) = self.cursor;
        self.gram[y as usize * self.width as usize + x as usize] = pixel;

        let right = self.window.x + self.window.width;
        let bottom = self.window.y + self.window.height;
        self.cursor = if x + 1 < right {
            (x + 1, y)
        } else if y + 1 < bottom {
            (self.window.x, y + 1)
        } else {
            (self.window.x, self.window.y)
        };
    }
}

impl PanelLink for MemoryPanel {
    fn set_window(&mut self, window: Window) -> Result<()> {
        window.validate(self.width, self.height)?;
        self.window = window;
        self.cursor = (window.x, window.y);
        if self.pending.take().is_some() {
            debug!("Dropped half pixel on window change");
        }
        Ok(())
    }

    fn write_pixels(&mut self, bytes: &[u8]) -> Result<()> {
        if self.gram.is_empty() {
            return Err(Error::InvalidDimensions {
                width: self.width as u32,
                height: self.height as u32,
            });
        }
        self.writes += 1;
        self.bytes_written += bytes.len() as u64;
        let mut bytes = bytes;
        if let Some(high) = self.pending.take() {
            match bytes.split_first() {
                Some((&low, rest)) => {
                    self.store(u16::from_be_bytes([high, low]));
                    bytes = rest;
                }
                None => {
                    self.pending = Some(high);
                    return Ok(());
                }
            }
        }
        let mut pairs = bytes.chunks_exact(2);
        for pair in &mut pairs {
            self.store(u16::from_be_bytes([pair[0], pair[1]]));
        }
        if let [last] = pairs.remainder() {
            self.pending = Some(*last);
        }
        Ok(())
    }
}
