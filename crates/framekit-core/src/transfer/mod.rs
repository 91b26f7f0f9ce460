//! Moving surfaces to a display.
//!
//! [`DisplayTransfer`] is the contract a panel backend honours: take a
//! surface and an optional window, stream the window's pixels to the panel
//! in its native order (big-endian RGB565), return when done. Palette
//! formats are resolved by the transfer itself; surfaces never convert their
//! storage on the way out.

mod link;
mod memory;

pub use link::{LinkPanel, DEFAULT_CHUNK_SIZE};
pub use memory::MemoryPanel;

use crate::surface::PixelSurface;
use crate::{Error, Result};

/// Rectangle within a surface or panel, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Window {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of `surface`.
    pub fn full(surface: &PixelSurface) -> Self {
        Self::new(0, 0, surface.width(), surface.height())
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Fails unless the window is non-empty and lies within
    /// `bound_width` x `bound_height`.
    pub fn validate(&self, bound_width: u16, bound_height: u16) -> Result<()> {
        let fits = self.width > 0
            && self.height > 0
            && self.x as u32 + self.width as u32 <= bound_width as u32
            && self.y as u32 + self.height as u32 <= bound_height as u32;
        if !fits {
            return Err(Error::InvalidWindow {
                x: self.x,
                y: self.y,
                width: self.width,
                height: self.height,
                bound_width,
                bound_height,
            });
        }
        Ok(())
    }

    /// Whether the window covers complete rows of a surface `width` wide.
    pub fn spans_rows(&self, width: u16) -> bool {
        self.x == 0 && self.width == width
    }
}

/// Streams a surface to a display.
pub trait DisplayTransfer {
    /// Sends `window` of `surface` (the whole surface when `None`) to the
    /// same coordinates on the panel. Blocks until the pixels are written.
    fn transfer(&mut self, surface: &PixelSurface, window: Option<Window>) -> Result<()>;
}

/// Bus-facing half of a panel controller.
///
/// Mirrors the column/row address set plus memory write sequence of
/// ST7735-class controllers: `set_window` selects the target rectangle and
/// resets the write cursor, `write_pixels` appends big-endian RGB565 bytes
/// that fill the window row by row.
pub trait PanelLink {
    fn set_window(&mut self, window: Window) -> Result<()>;

    fn write_pixels(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<L: PanelLink + ?Sized> PanelLink for &mut L {
    fn set_window(&mut self, window: Window) -> Result<()> {
        (**self).set_window(window)
    }

    fn write_pixels(&mut self, bytes: &[u8]) -> Result<()> {
        (**self).write_pixels(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::PixelFormat;

    #[test]
    fn test_window_full() {
        let surface = PixelSurface::new(16, 8, PixelFormat::Pal16).unwrap();
        let window = Window::full(&surface);
        assert_eq!(window, Window::new(0, 0, 16, 8));
        assert_eq!(window.area(), 128);
        assert!(window.spans_rows(16));
        assert!(!Window::new(1, 0, 15, 8).spans_rows(16));
    }

    #[test]
    fn test_window_validate() {
        assert!(Window::new(0, 0, 160, 128).validate(160, 128).is_ok());
        assert!(Window::new(159, 127, 1, 1).validate(160, 128).is_ok());

        let err = Window::new(150, 0, 11, 1).validate(160, 128).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidWindow {
                x: 150,
                width: 11,
                bound_width: 160,
                ..
            }
        ));
        assert!(Window::new(0, 0, 0, 4).validate(160, 128).is_err());
        assert!(Window::new(0, u16::MAX, 1, 1).validate(160, 128).is_err());
    }
}
