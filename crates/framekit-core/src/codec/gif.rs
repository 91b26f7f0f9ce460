//! GIF87a/GIF89a decoder with frame playback.
//!
//! Frames are drawn onto a canvas the size of the logical screen. The
//! Graphic Control Extension preceding a frame sets its delay, transparent
//! index and disposal method; disposal 2 restores the frame rectangle to the
//! background color before the next frame is drawn. A local color table
//! only applies to its own frame.

use std::io::Read;
use std::ops::ControlFlow;

use tracing::{debug, info, warn};

use super::lzw::LzwDecoder;
use super::reader::ByteReader;
use super::{check_fit, check_target, ImageFormat, ImageInfo};
use crate::color::join_color;
use crate::error::{DecodeReason, DecodeStage};
use crate::surface::{PixelFormat, PixelSurface};
use crate::transfer::Window;
use crate::{Error, Result};

const INTRO_EXTENSION: u8 = 0x21;
const INTRO_IMAGE: u8 = 0x2C;
const INTRO_TRAILER: u8 = 0x3B;

const EXT_PLAIN_TEXT: u8 = 0x01;
const EXT_GRAPHIC_CONTROL: u8 = 0xF9;
const EXT_COMMENT: u8 = 0xFE;
const EXT_APPLICATION: u8 = 0xFF;

const DISPOSE_BACKGROUND: u8 = 2;

/// Interlaced row order: (first row, step) for each of the four passes.
const INTERLACE_PASSES: [(u32, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];

/// A frame handed to a playback visitor.
#[derive(Debug)]
pub struct GifFrame<'a> {
    /// Canvas with the frame drawn.
    pub surface: &'a PixelSurface,
    /// Zero-based frame number.
    pub index: u32,
    /// Requested display time in hundredths of a second.
    pub delay_cs: u16,
    /// Area the frame touched, in surface coordinates.
    pub rect: Window,
}

impl<'a> GifFrame<'a> {
    /// Wraps a still image as frame 0.
    pub(crate) fn still(surface: &'a PixelSurface) -> Self {
        Self {
            surface,
            index: 0,
            delay_cs: 0,
            rect: Window::full(surface),
        }
    }
}

/// Logical screen descriptor.
#[derive(Debug, Clone, Copy)]
struct Screen {
    width: u16,
    height: u16,
    background: u8,
}

/// Graphic Control Extension state for the next frame.
#[derive(Debug, Clone, Copy, Default)]
struct Control {
    delay_cs: u16,
    transparent: Option<u8>,
    disposal: u8,
}

/// Image descriptor.
#[derive(Debug, Clone, Copy)]
struct Descriptor {
    left: u16,
    top: u16,
    width: u16,
    height: u16,
    flags: u8,
}

impl Descriptor {
    fn local_table_len(&self) -> Option<usize> {
        (self.flags & 0x80 != 0).then(|| 2usize << (self.flags & 0x07))
    }

    fn interlaced(&self) -> bool {
        self.flags & 0x40 != 0
    }
}

type Visitor<'v> = &'v mut dyn FnMut(&GifFrame<'_>) -> ControlFlow<()>;

/// GIF decoder holding the LZW dictionary and per-frame buffers.
#[derive(Debug, Default)]
pub struct GifCodec {
    lzw: LzwDecoder,
    data: Vec<u8>,
    indices: Vec<u8>,
    global: Vec<u32>,
    local: Vec<u32>,
}

impl GifCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_table<R: Read>(r: &mut ByteReader<'_, R>, len: usize, table: &mut Vec<u32>) -> Result<()> {
        r.set_stage(DecodeStage::Palette);
        table.clear();
        let mut rgb = [0u8; 3];
        for _ in 0..len {
            r.read_exact(&mut rgb)?;
            table.push(join_color(rgb[0], rgb[1], rgb[2]));
        }
        Ok(())
    }

    fn read_screen<R: Read>(&mut self, r: &mut ByteReader<'_, R>) -> Result<Screen> {
        r.set_stage(DecodeStage::Header);
        let mut magic = [0u8; 6];
        r.read_exact(&mut magic)?;
        if &magic != b"GIF87a" && &magic != b"GIF89a" {
            return Err(r.fail(DecodeReason::BadMagic));
        }
        let width = r.u16_le()?;
        let height = r.u16_le()?;
        let flags = r.u8()?;
        let background = r.u8()?;
        let _aspect = r.u8()?;
        if width == 0 || height == 0 {
            return Err(r.fail(DecodeReason::BadDimensions {
                width: width as i64,
                height: height as i64,
            }));
        }
        if flags & 0x80 != 0 {
            Self::read_table(r, 2usize << (flags & 0x07), &mut self.global)?;
        } else {
            self.global.clear();
        }
        debug!(
            "GIF screen {}x{}, {} global colors, background {}",
            width,
            height,
            self.global.len(),
            background
        );
        Ok(Screen {
            width,
            height,
            background,
        })
    }

    fn background(&self, screen: &Screen) -> u32 {
        self.global
            .get(screen.background as usize)
            .copied()
            .unwrap_or(0)
    }

    fn skip_sub_blocks<R: Read>(r: &mut ByteReader<'_, R>) -> Result<()> {
        loop {
            let len = r.u8()?;
            if len == 0 {
                return Ok(());
            }
            r.skip(len as u64)?;
        }
    }

    fn read_sub_blocks<R: Read>(r: &mut ByteReader<'_, R>, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        loop {
            let len = r.u8()? as usize;
            if len == 0 {
                return Ok(());
            }
            let start = out.len();
            out.resize(start + len, 0);
            r.read_exact(&mut out[start..])?;
        }
    }

    fn read_extension<R: Read>(r: &mut ByteReader<'_, R>, control: &mut Control) -> Result<()> {
        let label = r.u8()?;
        match label {
            EXT_GRAPHIC_CONTROL => {
                if r.u8()? != 4 {
                    return Err(r.fail(DecodeReason::BadExtension));
                }
                let packed = r.u8()?;
                let delay_cs = r.u16_le()?;
                let transparent = r.u8()?;
                if r.u8()? != 0 {
                    return Err(r.fail(DecodeReason::BadExtension));
                }
                *control = Control {
                    delay_cs,
                    transparent: (packed & 0x01 != 0).then_some(transparent),
                    disposal: (packed >> 2) & 0x07,
                };
                debug!("GIF graphic control: {:?}", control);
                Ok(())
            }
            EXT_COMMENT | EXT_APPLICATION | EXT_PLAIN_TEXT => {
                debug!("Skipping GIF extension 0x{:02X}", label);
                Self::skip_sub_blocks(r)
            }
            other => {
                warn!("Skipping unknown GIF extension 0x{:02X}", other);
                Self::skip_sub_blocks(r)
            }
        }
    }

    fn read_descriptor<R: Read>(r: &mut ByteReader<'_, R>) -> Result<Descriptor> {
        Ok(Descriptor {
            left: r.u16_le()?,
            top: r.u16_le()?,
            width: r.u16_le()?,
            height: r.u16_le()?,
            flags: r.u8()?,
        })
    }

    /// Decodes one frame's pixel data and draws it onto the canvas.
    fn draw_frame<R: Read>(
        &mut self,
        r: &mut ByteReader<'_, R>,
        screen: &Screen,
        desc: &Descriptor,
        control: &Control,
        target: &mut PixelSurface,
        origin: (u16, u16),
    ) -> Result<()> {
        r.set_stage(DecodeStage::PixelData);
        let min_code_size = r.u8()?;
        Self::read_sub_blocks(r, &mut self.data)?;

        let width = desc.width as usize;
        let height = desc.height as usize;
        self.lzw
            .decode(min_code_size, &self.data, width * height, &mut self.indices)
            .map_err(|reason| Error::decode(ImageFormat::Gif, reason))?;

        let table: &[u32] = if desc.local_table_len().is_some() {
            &self.local
        } else {
            &self.global
        };
        if table.is_empty() {
            return Err(Error::decode(ImageFormat::Gif, DecodeReason::MissingColorTable));
        }

        let rows: Box<dyn Iterator<Item = u32>> = if desc.interlaced() {
            let height = desc.height as u32;
            Box::new(
                INTERLACE_PASSES
                    .into_iter()
                    .flat_map(move |(start, step)| (start..height).step_by(step)),
            )
        } else {
            Box::new(0..desc.height as u32)
        };

        for (stream_row, row) in rows.enumerate() {
            let y = desc.top as u32 + row;
            if y >= screen.height as u32 {
                continue;
            }
            let line = &self.indices[stream_row * width..(stream_row + 1) * width];
            for (col, &index) in line.iter().enumerate() {
                let x = desc.left as u32 + col as u32;
                if x >= screen.width as u32 || control.transparent == Some(index) {
                    continue;
                }
                let color = *table.get(index as usize).ok_or_else(|| {
                    Error::decode(
                        ImageFormat::Gif,
                        DecodeReason::ColorIndexOutOfRange {
                            index: index as u16,
                            len: table.len() as u16,
                        },
                    )
                })?;
                target.set_pixel(
                    origin.0 as i32 + x as i32,
                    origin.1 as i32 + y as i32,
                    color,
                )?;
            }
        }
        Ok(())
    }

    /// Frame rectangle clipped to the logical screen, in target coordinates.
    fn frame_window(screen: &Screen, desc: &Descriptor, origin: (u16, u16)) -> Window {
        let left = desc.left.min(screen.width);
        let top = desc.top.min(screen.height);
        Window {
            x: origin.0 + left,
            y: origin.1 + top,
            width: desc.width.min(screen.width - left),
            height: desc.height.min(screen.height - top),
        }
    }

    /// Plays frames onto `target`. Without a visitor only the first frame is
    /// drawn. Returns the number of frames drawn.
    fn play<R: Read>(
        &mut self,
        r: &mut ByteReader<'_, R>,
        screen: &Screen,
        target: &mut PixelSurface,
        origin: (u16, u16),
        mut visitor: Option<Visitor<'_>>,
    ) -> Result<u32> {
        let background = self.background(screen);
        let mut control = Control::default();
        let mut dispose: Option<Window> = None;
        let mut frames = 0u32;

        loop {
            r.set_stage(DecodeStage::Header);
            let intro = r.u8()?;
            match intro {
                INTRO_EXTENSION => Self::read_extension(r, &mut control)?,
                INTRO_IMAGE => {
                    let desc = Self::read_descriptor(r)?;
                    if let Some(len) = desc.local_table_len() {
                        Self::read_table(r, len, &mut self.local)?;
                    }
                    if let Some(area) = dispose.take() {
                        target.fill_rect(
                            area.x as i32,
                            area.y as i32,
                            area.width as i32,
                            area.height as i32,
                            background,
                        )?;
                    }
                    debug!(
                        "GIF frame {}: {}x{} at ({}, {}), delay {} cs, disposal {}{}",
                        frames,
                        desc.width,
                        desc.height,
                        desc.left,
                        desc.top,
                        control.delay_cs,
                        control.disposal,
                        if desc.interlaced() { ", interlaced" } else { "" }
                    );
                    self.draw_frame(r, screen, &desc, &control, target, origin)?;

                    let rect = Self::frame_window(screen, &desc, origin);
                    if control.disposal == DISPOSE_BACKGROUND {
                        dispose = Some(rect);
                    }
                    let frame = GifFrame {
                        surface: &*target,
                        index: frames,
                        delay_cs: control.delay_cs,
                        rect,
                    };
                    frames += 1;
                    control = Control::default();
                    match visitor.as_mut() {
                        None => return Ok(frames),
                        Some(visit) => {
                            if visit(&frame).is_break() {
                                return Ok(frames);
                            }
                        }
                    }
                }
                INTRO_TRAILER => return Ok(frames),
                other => return Err(r.fail(DecodeReason::BadBlock(other))),
            }
        }
    }

    /// Decodes the first frame onto a new background-filled canvas.
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<PixelSurface> {
        let mut r = ByteReader::new(reader, ImageFormat::Gif);
        let screen = self.read_screen(&mut r)?;
        let mut surface = PixelSurface::new(screen.width, screen.height, PixelFormat::Rgb565)?;
        surface.fill(self.background(&screen))?;
        let frames = self.play(&mut r, &screen, &mut surface, (0, 0), None)?;
        if frames == 0 {
            warn!("GIF has no image data, returning background canvas");
        }
        info!("Decoded {}x{} GIF", screen.width, screen.height);
        Ok(surface)
    }

    /// Draws the first frame into an RGB565 `target` at `origin`.
    ///
    /// The canvas area is not cleared first, so transparent pixels keep the
    /// target's content. A corrupt frame leaves whatever rows were drawn.
    pub fn decode_into<R: Read>(
        &mut self,
        reader: &mut R,
        target: &mut PixelSurface,
        origin: (u16, u16),
    ) -> Result<()> {
        check_target(ImageFormat::Gif, PixelFormat::Rgb565, target)?;
        let mut r = ByteReader::new(reader, ImageFormat::Gif);
        let screen = self.read_screen(&mut r)?;
        check_fit(
            ImageFormat::Gif,
            screen.width as u32,
            screen.height as u32,
            target,
            origin,
        )?;
        self.play(&mut r, &screen, target, origin, None)?;
        Ok(())
    }

    /// Plays every frame on a fresh canvas, calling `visitor` after each.
    ///
    /// Playback is not paced; `GifFrame::delay_cs` tells the caller how long
    /// the frame wants to stay on screen.
    pub fn decode_frames<R, F>(&mut self, reader: &mut R, mut visitor: F) -> Result<u32>
    where
        R: Read,
        F: FnMut(&GifFrame<'_>) -> ControlFlow<()>,
    {
        let mut r = ByteReader::new(reader, ImageFormat::Gif);
        let screen = self.read_screen(&mut r)?;
        let mut canvas = PixelSurface::new(screen.width, screen.height, PixelFormat::Rgb565)?;
        canvas.fill(self.background(&screen))?;
        let frames = self.play(&mut r, &screen, &mut canvas, (0, 0), Some(&mut visitor))?;
        info!("Played {} GIF frames", frames);
        Ok(frames)
    }

    /// Reads the screen descriptor and counts frames without decoding them.
    pub fn info<R: Read>(&mut self, reader: &mut R) -> Result<ImageInfo> {
        let mut r = ByteReader::new(reader, ImageFormat::Gif);
        let screen = self.read_screen(&mut r)?;
        let mut frames = 0u32;
        let mut depth = 0u8;
        loop {
            r.set_stage(DecodeStage::Header);
            match r.u8()? {
                INTRO_EXTENSION => {
                    let _label = r.u8()?;
                    Self::skip_sub_blocks(&mut r)?;
                }
                INTRO_IMAGE => {
                    let desc = Self::read_descriptor(&mut r)?;
                    if let Some(len) = desc.local_table_len() {
                        r.skip(len as u64 * 3)?;
                    }
                    r.set_stage(DecodeStage::PixelData);
                    depth = depth.max(r.u8()?);
                    Self::skip_sub_blocks(&mut r)?;
                    frames += 1;
                }
                INTRO_TRAILER => break,
                other => return Err(r.fail(DecodeReason::BadBlock(other))),
            }
        }
        Ok(ImageInfo {
            format: ImageFormat::Gif,
            width: screen.width as u32,
            height: screen.height as u32,
            bits_per_pixel: depth.max(1),
            surface_format: PixelFormat::Rgb565,
            frames,
        })
    }
}
