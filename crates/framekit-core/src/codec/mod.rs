//! Image decoders.
//!
//! Every format is a variant of [`FormatCodec`], selected by an explicit
//! [`ImageFormat`] tag. A codec is built once and reused: it keeps its
//! scratch buffers (row buffers, LZW dictionary, Huffman and quantization
//! tables) between calls.
//!
//! Two entry points exist for every codec:
//!
//! - [`FormatCodec::decode`] allocates a new surface and only returns it once
//!   the whole image decoded; on error nothing is returned.
//! - [`FormatCodec::decode_into`] writes into a caller-owned surface at an
//!   origin. The image must fit, which is checked before any pixel is
//!   written, but a stream that turns out to be corrupt halfway leaves the
//!   target partially written. Decode into a scratch surface first when
//!   that matters.

mod bmp;
mod gif;
mod jpeg;
mod lzw;
mod raw;
mod reader;

use std::fmt;
use std::io::Read;
use std::ops::ControlFlow;
use std::path::Path;
use std::str::FromStr;

pub use bmp::BmpCodec;
pub use gif::{GifCodec, GifFrame};
pub use jpeg::JpegCodec;
pub use raw::{PaletteSource, RawCodec};

use crate::error::DecodeReason;
use crate::surface::{PixelFormat, PixelSurface};
use crate::{Error, Result};

/// Encoded image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// Headerless RGB565 dump.
    Raw565,
    /// 256-entry palette header followed by one index byte per pixel.
    Pal256,
    /// 16-entry palette header followed by packed 4-bit indices.
    Pal16,
    Bmp,
    Gif,
    Jpeg,
}

impl ImageFormat {
    /// All formats.
    pub const ALL: [ImageFormat; 6] = [
        ImageFormat::Raw565,
        ImageFormat::Pal256,
        ImageFormat::Pal16,
        ImageFormat::Bmp,
        ImageFormat::Gif,
        ImageFormat::Jpeg,
    ];

    /// Sniffs a container format from the first bytes of a stream.
    ///
    /// Raw dumps carry no signature and are never detected.
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(b"BM") {
            Some(ImageFormat::Bmp)
        } else if header.starts_with(b"GIF87a") || header.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if header.starts_with(&[0xFF, 0xD8]) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    /// Maps a file extension to a format.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "r565" | "raw" | "rgb565" => Some(ImageFormat::Raw565),
            "p256" => Some(ImageFormat::Pal256),
            "p16" => Some(ImageFormat::Pal16),
            "bmp" => Some(ImageFormat::Bmp),
            "gif" => Some(ImageFormat::Gif),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }

    /// Returns true for the headerless formats that need explicit dimensions.
    pub fn needs_dimensions(&self) -> bool {
        matches!(
            self,
            ImageFormat::Raw565 | ImageFormat::Pal256 | ImageFormat::Pal16
        )
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "raw565" | "rgb565" | "r565" | "raw" => Ok(ImageFormat::Raw565),
            "pal256" | "p256" => Ok(ImageFormat::Pal256),
            "pal16" | "p16" => Ok(ImageFormat::Pal16),
            "bmp" => Ok(ImageFormat::Bmp),
            "gif" => Ok(ImageFormat::Gif),
            "jpeg" | "jpg" => Ok(ImageFormat::Jpeg),
            _ => Err(Error::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Raw565 => "raw565",
            ImageFormat::Pal256 => "pal256",
            ImageFormat::Pal16 => "pal16",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Gif => "gif",
            ImageFormat::Jpeg => "jpeg",
        };
        write!(f, "{}", name)
    }
}

/// Header summary of an encoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    /// Bits per pixel as encoded in the file.
    pub bits_per_pixel: u8,
    /// Surface format `decode` produces.
    pub surface_format: PixelFormat,
    /// Number of frames; 1 for still formats.
    pub frames: u32,
}

/// A decoder for one image format.
#[derive(Debug)]
pub enum FormatCodec {
    Raw(RawCodec),
    Bmp(BmpCodec),
    Gif(GifCodec),
    Jpeg(Box<JpegCodec>),
}

impl FormatCodec {
    /// RGB565 dump of the given dimensions.
    pub fn raw565(width: u16, height: u16) -> Self {
        FormatCodec::Raw(RawCodec::new(PixelFormat::Rgb565, width, height))
    }

    /// PAL256 file (palette header plus indices) of the given dimensions.
    pub fn pal256(width: u16, height: u16) -> Self {
        FormatCodec::Raw(RawCodec::new(PixelFormat::Pal256, width, height))
    }

    /// PAL16 file (palette header plus packed indices) of the given dimensions.
    pub fn pal16(width: u16, height: u16) -> Self {
        FormatCodec::Raw(RawCodec::new(PixelFormat::Pal16, width, height))
    }

    pub fn bmp() -> Self {
        FormatCodec::Bmp(BmpCodec::new())
    }

    pub fn gif() -> Self {
        FormatCodec::Gif(GifCodec::new())
    }

    pub fn jpeg() -> Self {
        FormatCodec::Jpeg(Box::new(JpegCodec::new()))
    }

    /// JPEG decoder producing a 1/8-scale image from DC coefficients.
    pub fn jpeg_reduced() -> Self {
        FormatCodec::Jpeg(Box::new(JpegCodec::reduced()))
    }

    /// Builds the codec for a format tag.
    ///
    /// Raw formats need `dimensions`; container formats ignore them.
    pub fn for_format(format: ImageFormat, dimensions: Option<(u16, u16)>) -> Result<Self> {
        if format.needs_dimensions() {
            let (width, height) = dimensions.ok_or(Error::InvalidDimensions {
                width: 0,
                height: 0,
            })?;
            if width == 0 || height == 0 {
                return Err(Error::InvalidDimensions {
                    width: width as u32,
                    height: height as u32,
                });
            }
            return Ok(match format {
                ImageFormat::Raw565 => FormatCodec::raw565(width, height),
                ImageFormat::Pal256 => FormatCodec::pal256(width, height),
                _ => FormatCodec::pal16(width, height),
            });
        }
        Ok(match format {
            ImageFormat::Bmp => FormatCodec::bmp(),
            ImageFormat::Gif => FormatCodec::gif(),
            _ => FormatCodec::jpeg(),
        })
    }

    /// Returns the format this codec decodes.
    pub fn format(&self) -> ImageFormat {
        match self {
            FormatCodec::Raw(c) => c.image_format(),
            FormatCodec::Bmp(_) => ImageFormat::Bmp,
            FormatCodec::Gif(_) => ImageFormat::Gif,
            FormatCodec::Jpeg(_) => ImageFormat::Jpeg,
        }
    }

    /// Decodes a stream into a newly allocated surface.
    ///
    /// GIF streams yield their first frame only.
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<PixelSurface> {
        match self {
            FormatCodec::Raw(c) => c.decode(reader),
            FormatCodec::Bmp(c) => c.decode(reader),
            FormatCodec::Gif(c) => c.decode(reader),
            FormatCodec::Jpeg(c) => c.decode(reader),
        }
    }

    /// Decodes a stream into `target` with the image's top-left corner at
    /// `origin`.
    ///
    /// Raw formats need a target of their own pixel format; BMP, GIF and
    /// JPEG write RGB565 targets. On error the target may be partially
    /// written.
    pub fn decode_into<R: Read>(
        &mut self,
        reader: &mut R,
        target: &mut PixelSurface,
        origin: (u16, u16),
    ) -> Result<()> {
        match self {
            FormatCodec::Raw(c) => c.decode_into(reader, target, origin),
            FormatCodec::Bmp(c) => c.decode_into(reader, target, origin),
            FormatCodec::Gif(c) => c.decode_into(reader, target, origin),
            FormatCodec::Jpeg(c) => c.decode_into(reader, target, origin),
        }
    }

    /// Decodes every frame, calling `visitor` after each one is drawn.
    ///
    /// Still formats produce a single frame. Returns the number of frames
    /// delivered to the visitor.
    pub fn decode_frames<R, F>(&mut self, reader: &mut R, mut visitor: F) -> Result<u32>
    where
        R: Read,
        F: FnMut(&GifFrame<'_>) -> ControlFlow<()>,
    {
        match self {
            FormatCodec::Gif(c) => c.decode_frames(reader, visitor),
            other => {
                let surface = other.decode(reader)?;
                let frame = GifFrame::still(&surface);
                let _ = visitor(&frame);
                Ok(1)
            }
        }
    }

    /// Reads the header without decoding pixel data.
    pub fn info<R: Read>(&mut self, reader: &mut R) -> Result<ImageInfo> {
        match self {
            FormatCodec::Raw(c) => Ok(c.info()),
            FormatCodec::Bmp(c) => c.info(reader),
            FormatCodec::Gif(c) => c.info(reader),
            FormatCodec::Jpeg(c) => c.info(reader),
        }
    }
}

/// Fails unless a `width` x `height` image at `origin` lies inside `target`.
pub(crate) fn check_fit(
    format: ImageFormat,
    width: u32,
    height: u32,
    target: &PixelSurface,
    origin: (u16, u16),
) -> Result<()> {
    let (x, y) = origin;
    if x as u32 + width > target.width() as u32 || y as u32 + height > target.height() as u32 {
        return Err(Error::decode(
            format,
            DecodeReason::DimensionMismatch {
                width,
                height,
                x,
                y,
                target_width: target.width(),
                target_height: target.height(),
            },
        ));
    }
    Ok(())
}

/// Fails unless `target` stores `expected` pixels.
pub(crate) fn check_target(
    format: ImageFormat,
    expected: PixelFormat,
    target: &PixelSurface,
) -> Result<()> {
    if target.format() != expected {
        return Err(Error::decode(
            format,
            DecodeReason::TargetFormat {
                expected,
                actual: target.format(),
            },
        ));
    }
    Ok(())
}

/// Converts decoded image dimensions to surface dimensions.
pub(crate) fn surface_dimensions(format: ImageFormat, width: u32, height: u32) -> Result<(u16, u16)> {
    if width == 0 || height == 0 || width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(Error::decode(
            format,
            DecodeReason::BadDimensions {
                width: width as i64,
                height: height as i64,
            },
        ));
    }
    Ok((width as u16, height as u16))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        assert_eq!(ImageFormat::detect(b"BM\x46\x00"), Some(ImageFormat::Bmp));
        assert_eq!(ImageFormat::detect(b"GIF89a..."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::detect(b"GIF87a"), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::detect(&[0xFF, 0xD8, 0xFF]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::detect(b"GIF90a"), None);
        assert_eq!(ImageFormat::detect(&[]), None);
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(
            ImageFormat::from_extension(Path::new("photo.JPG")),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(
            ImageFormat::from_extension(Path::new("img/logo.p16")),
            Some(ImageFormat::Pal16)
        );
        assert_eq!(
            ImageFormat::from_extension(Path::new("frame.r565")),
            Some(ImageFormat::Raw565)
        );
        assert_eq!(ImageFormat::from_extension(Path::new("notes.txt")), None);
        assert_eq!(ImageFormat::from_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_names_round_trip() {
        for format in ImageFormat::ALL {
            assert_eq!(format.to_string().parse::<ImageFormat>().unwrap(), format);
        }
        assert!(matches!(
            "tiff".parse::<ImageFormat>(),
            Err(Error::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_for_format_requires_dimensions() {
        assert!(FormatCodec::for_format(ImageFormat::Raw565, None).is_err());
        assert!(FormatCodec::for_format(ImageFormat::Pal16, Some((0, 4))).is_err());
        let codec = FormatCodec::for_format(ImageFormat::Pal256, Some((4, 4))).unwrap();
        assert_eq!(codec.format(), ImageFormat::Pal256);
        let codec = FormatCodec::for_format(ImageFormat::Gif, None).unwrap();
        assert_eq!(codec.format(), ImageFormat::Gif);
    }

    #[test]
    fn test_check_fit() {
        let target = PixelSurface::new(10, 8, PixelFormat::Rgb565).unwrap();
        assert!(check_fit(ImageFormat::Bmp, 10, 8, &target, (0, 0)).is_ok());
        assert!(check_fit(ImageFormat::Bmp, 4, 4, &target, (6, 4)).is_ok());
        let err = check_fit(ImageFormat::Bmp, 4, 4, &target, (7, 4)).unwrap_err();
        assert!(matches!(
            err.decode_reason(),
            Some(DecodeReason::DimensionMismatch { x: 7, .. })
        ));
    }

    #[test]
    fn test_still_formats_yield_one_frame() {
        let data = vec![0u8; 2 * 2 * 2];
        let mut codec = FormatCodec::raw565(2, 2);
        let mut seen = 0;
        let frames = codec
            .decode_frames(&mut &data[..], |frame| {
                seen += 1;
                assert_eq!(frame.index, 0);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(frames, 1);
        assert_eq!(seen, 1);
    }
}
