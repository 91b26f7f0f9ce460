//! Framekit Core Library
//!
//! Pixel surfaces in RGB565 and palette formats, image decoders that fill
//! them (raw dumps, BMP, GIF, baseline JPEG) and the transfer contract that
//! moves a surface onto an ST7735-class LCD panel.

pub mod codec;
pub mod color;
pub mod error;
pub mod palette;
pub mod surface;
pub mod transfer;

pub use codec::{FormatCodec, GifFrame, ImageFormat, ImageInfo};
pub use error::{DecodeReason, DecodeStage, Error, Result};
pub use palette::{PalettePreset, PaletteTable};
pub use surface::{PixelFormat, PixelSurface};
pub use transfer::{DisplayTransfer, LinkPanel, MemoryPanel, PanelLink, Window};

/// Default panel dimensions (ST7735 in landscape).
pub const PANEL_WIDTH: u16 = 160;
pub const PANEL_HEIGHT: u16 = 128;
