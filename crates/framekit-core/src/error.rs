//! Error types for the framekit core.

use thiserror::Error;

use crate::codec::ImageFormat;
use crate::surface::PixelFormat;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with surfaces, palettes and codecs.
#[derive(Error, Debug)]
pub enum Error {
    /// Pixel access outside the surface.
    #[error("pixel ({x}, {y}) out of bounds for {width}x{height} surface")]
    Bounds {
        x: i32,
        y: i32,
        width: u16,
        height: u16,
    },

    /// Palette index outside the range of the surface format.
    #[error("palette index {index} out of range (max {max})")]
    InvalidIndex { index: u32, max: u32 },

    /// Input length does not match what the format requires.
    #[error("input length mismatch: expected {expected} bytes, got {actual}")]
    TruncatedInput { expected: usize, actual: usize },

    /// Malformed or unsupported encoded image.
    #[error("{format} decode error: {reason}")]
    Decode {
        format: ImageFormat,
        reason: DecodeReason,
    },

    /// Buffer size mismatch when wrapping existing storage.
    #[error("framebuffer size mismatch: expected {expected}, got {actual}")]
    FramebufferSize { expected: usize, actual: usize },

    /// Palette with an entry count other than 16 or 256.
    #[error("invalid palette size {0} (must be 16 or 256 entries)")]
    PaletteSize(usize),

    /// Palette format surface has no palette to resolve indices with.
    #[error("{0} surface has no palette attached")]
    MissingPalette(PixelFormat),

    /// Zero or oversized surface dimensions.
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// Transfer window not contained in the surface or panel.
    #[error("window {width}x{height}+{x}+{y} outside {bound_width}x{bound_height}")]
    InvalidWindow {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        bound_width: u16,
        bound_height: u16,
    },

    /// Unknown image format name.
    #[error("unknown image format: {0}")]
    UnknownFormat(String),

    /// Unknown palette preset name.
    #[error("unknown palette: {0}")]
    UnknownPalette(String),

    /// Underlying stream error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for building a decode error.
    pub fn decode(format: ImageFormat, reason: DecodeReason) -> Self {
        Error::Decode { format, reason }
    }

    /// Returns the decode reason if this is a decode error.
    pub fn decode_reason(&self) -> Option<&DecodeReason> {
        match self {
            Error::Decode { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Pipeline stage a decoder was in when the input ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Header,
    Palette,
    Tables,
    PixelData,
    Entropy,
}

impl std::fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeStage::Header => write!(f, "header"),
            DecodeStage::Palette => write!(f, "palette"),
            DecodeStage::Tables => write!(f, "tables"),
            DecodeStage::PixelData => write!(f, "pixel data"),
            DecodeStage::Entropy => write!(f, "entropy-coded data"),
        }
    }
}

/// Why a decode failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeReason {
    #[error("bad magic bytes")]
    BadMagic,

    #[error("unexpected end of input in {stage}")]
    UnexpectedEof { stage: DecodeStage },

    #[error("invalid image dimensions {width}x{height}")]
    BadDimensions { width: i64, height: i64 },

    #[error("{width}x{height} image at ({x}, {y}) does not fit {target_width}x{target_height} target")]
    DimensionMismatch {
        width: u32,
        height: u32,
        x: u16,
        y: u16,
        target_width: u16,
        target_height: u16,
    },

    #[error("target surface is {actual}, decoder writes {expected}")]
    TargetFormat {
        expected: PixelFormat,
        actual: PixelFormat,
    },

    #[error("unsupported DIB header size {0}")]
    UnsupportedHeader(u32),

    #[error("unsupported bit depth {0}")]
    UnsupportedBitDepth(u16),

    #[error("unsupported compression {0}")]
    UnsupportedCompression(u32),

    #[error("pixel data offset {0} points inside the header")]
    BadPixelOffset(u32),

    #[error("no color table for indexed image")]
    MissingColorTable,

    #[error("color index {index} outside {len}-entry table")]
    ColorIndexOutOfRange { index: u16, len: u16 },

    #[error("invalid LZW minimum code size {0}")]
    BadCodeSize(u8),

    #[error("LZW stream does not start with a clear code")]
    MissingClearCode,

    #[error("invalid LZW code {0}")]
    InvalidCode(u16),

    #[error("LZW data ended before the frame was complete")]
    LzwUnderrun,

    #[error("unknown block introducer 0x{0:02X}")]
    BadBlock(u8),

    #[error("malformed extension block")]
    BadExtension,

    #[error("unsupported coding process (SOF 0x{0:02X})")]
    UnsupportedProcess(u8),

    #[error("unsupported sample precision {0}")]
    BadPrecision(u8),

    #[error("unsupported component count {0}")]
    BadComponentCount(u8),

    #[error("unsupported sampling factors")]
    UnsupportedSampling,

    #[error("scan does not cover all frame components")]
    UnsupportedScan,

    #[error("unexpected marker 0x{0:02X}")]
    UnexpectedMarker(u8),

    #[error("malformed {0} segment")]
    BadSegment(&'static str),

    #[error("missing {kind} table {id}")]
    MissingTable { kind: &'static str, id: u8 },

    #[error("invalid Huffman code")]
    InvalidHuffmanCode,

    #[error("coefficient index overflow")]
    CoefficientOverflow,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_reason_access() {
        let err = Error::decode(ImageFormat::Gif, DecodeReason::MissingClearCode);
        assert_eq!(err.decode_reason(), Some(&DecodeReason::MissingClearCode));
        assert!(err.to_string().contains("gif"));

        let err = Error::PaletteSize(12);
        assert_eq!(err.decode_reason(), None);
    }

    #[test]
    fn test_stage_in_message() {
        let err = Error::decode(
            ImageFormat::Bmp,
            DecodeReason::UnexpectedEof {
                stage: DecodeStage::Header,
            },
        );
        assert_eq!(
            err.to_string(),
            "bmp decode error: unexpected end of input in header"
        );
    }
}
