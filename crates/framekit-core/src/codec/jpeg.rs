//! Baseline JPEG decoder.
//!
//! Handles Huffman-coded sequential frames (SOF0/SOF1) with 8-bit samples,
//! one grayscale component or three YCbCr components with H1V1, H2V1, H1V2
//! or H2V2 luma sampling, restart intervals and 8- or 16-bit quantization
//! tables. Everything after one interleaved scan is ignored.
//!
//! In reduced mode only DC coefficients are used: each 8x8 block becomes one
//! output pixel, giving a 1/8-scale image without running the IDCT.

use std::fmt;
use std::io::Read;

use tracing::{debug, info};

use super::reader::ByteReader;
use super::{check_fit, check_target, surface_dimensions, ImageFormat, ImageInfo};
use crate::color::join_color;
use crate::error::{DecodeReason, DecodeStage};
use crate::surface::{PixelFormat, PixelSurface};
use crate::{Error, Result};

// Markers
const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const DHT: u8 = 0xC4;
const RST0: u8 = 0xD0;
const RST7: u8 = 0xD7;
const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DRI: u8 = 0xDD;
const TEM: u8 = 0x01;

const MAX_COMPONENTS: usize = 3;
const MAX_TABLES: usize = 4;

/// Zero bytes fed past the end of the entropy-coded data before giving up.
const MAX_EOF_FILL: u8 = 2;

/// Zero bytes substituted after a marker or EOF within one interval.
/// A well-formed scan never needs more than the lookahead of one code.
const MAX_FILL: u32 = 4;

#[rustfmt::skip]
const ZIGZAG: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

// IJG "islow" fixed-point IDCT constants, CONST_BITS = 13.
const CONST_BITS: u32 = 13;
const PASS1_BITS: u32 = 2;
const FIX_0_298: i64 = 2446;
const FIX_0_390: i64 = 3196;
const FIX_0_541: i64 = 4433;
const FIX_0_765: i64 = 6270;
const FIX_0_899: i64 = 7373;
const FIX_1_175: i64 = 9633;
const FIX_1_501: i64 = 12299;
const FIX_1_847: i64 = 15137;
const FIX_1_961: i64 = 16069;
const FIX_2_053: i64 = 16819;
const FIX_2_562: i64 = 20995;
const FIX_3_072: i64 = 25172;

#[derive(Debug, Clone, Copy, Default)]
struct Component {
    id: u8,
    h: u8,
    v: u8,
    tq: u8,
    td: u8,
    ta: u8,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    width: u16,
    height: u16,
    count: usize,
    components: [Component; MAX_COMPONENTS],
    max_h: u8,
    max_v: u8,
}

/// Huffman table with an 8-bit fast lookup and the canonical code limits.
struct HuffTable {
    /// (symbol, code length) for every 8-bit prefix; length 0 means longer.
    lut: [(u8, u8); 256],
    mincode: [i32; 17],
    maxcode: [i32; 17],
    valptr: [usize; 17],
    values: [u8; 256],
}

impl Default for HuffTable {
    fn default() -> Self {
        Self {
            lut: [(0, 0); 256],
            mincode: [0; 17],
            maxcode: [-1; 17],
            valptr: [0; 17],
            values: [0; 256],
        }
    }
}

impl HuffTable {
    /// Rebuilds the table; returns false when the code lengths overflow.
    fn build(&mut self, counts: &[u8; 16], values: &[u8]) -> bool {
        self.values[..values.len()].copy_from_slice(values);
        self.lut.fill((0, 0));
        self.maxcode.fill(-1);
        let mut code: u32 = 0;
        let mut k = 0usize;
        for len in 1..=16usize {
            let n = counts[len - 1] as usize;
            if n > 0 {
                self.valptr[len] = k;
                self.mincode[len] = code as i32;
                for _ in 0..n {
                    if code >= (1 << len) {
                        return false;
                    }
                    if len <= 8 {
                        let prefix = (code << (8 - len)) as usize;
                        for slot in &mut self.lut[prefix..prefix + (1 << (8 - len))] {
                            *slot = (values[k], len as u8);
                        }
                    }
                    k += 1;
                    code += 1;
                }
                self.maxcode[len] = code as i32 - 1;
            }
            code <<= 1;
        }
        true
    }
}

/// Entropy-coded segment reader: byte stuffing, markers and EOF padding.
struct BitReader<'r, 'a, R> {
    r: &'r mut ByteReader<'a, R>,
    buf: u32,
    avail: u32,
    marker: Option<u8>,
    /// Zero bytes substituted after a marker or the end of input.
    fill: u32,
    eof_fill: u8,
}

impl<'r, 'a, R: Read> BitReader<'r, 'a, R> {
    fn new(r: &'r mut ByteReader<'a, R>) -> Self {
        Self {
            r,
            buf: 0,
            avail: 0,
            marker: None,
            fill: 0,
            eof_fill: 0,
        }
    }

    fn fail(&self, reason: DecodeReason) -> Error {
        self.r.fail(reason)
    }

    /// Next data byte; a marker ends the data and yields zero bits from then on.
    fn next_byte(&mut self) -> Result<u8> {
        if self.marker.is_some() {
            return self.zero();
        }
        match self.r.try_u8()? {
            None => self.pad(),
            Some(0xFF) => loop {
                match self.r.try_u8()? {
                    None => return self.pad(),
                    Some(0x00) => return Ok(0xFF),
                    Some(0xFF) => continue,
                    Some(m) => {
                        self.marker = Some(m);
                        return self.zero();
                    }
                }
            },
            Some(b) => Ok(b),
        }
    }

    fn zero(&mut self) -> Result<u8> {
        self.fill += 1;
        if self.fill > MAX_FILL {
            return Err(self.r.eof());
        }
        Ok(0)
    }

    fn pad(&mut self) -> Result<u8> {
        self.eof_fill += 1;
        if self.eof_fill > MAX_EOF_FILL {
            return Err(self.r.eof());
        }
        self.zero()
    }

    /// Fails if any substituted zero bits were consumed as data.
    fn finish(&self) -> Result<()> {
        if self.avail < self.fill.saturating_mul(8) {
            return Err(self.r.eof());
        }
        Ok(())
    }

    fn ensure(&mut self, n: u32) -> Result<()> {
        while self.avail < n {
            let b = self.next_byte()? as u32;
            self.buf |= b << (24 - self.avail);
            self.avail += 8;
        }
        Ok(())
    }

    fn peek(&mut self, n: u32) -> Result<u32> {
        self.ensure(n)?;
        Ok(self.buf >> (32 - n))
    }

    fn consume(&mut self, n: u32) {
        self.buf <<= n;
        self.avail -= n;
    }

    fn bits(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        let value = self.peek(n)?;
        self.consume(n);
        Ok(value)
    }

    fn decode(&mut self, table: &HuffTable) -> Result<u8> {
        let (symbol, len) = table.lut[self.peek(8)? as usize];
        if len > 0 {
            self.consume(len as u32);
            return Ok(symbol);
        }
        let code16 = self.peek(16)? as i32;
        for len in 9..=16usize {
            let code = code16 >> (16 - len);
            if table.maxcode[len] >= 0 && code <= table.maxcode[len] {
                self.consume(len as u32);
                let index = table.valptr[len] as i32 + code - table.mincode[len];
                return Ok(table.values[index as usize]);
            }
        }
        Err(self.fail(DecodeReason::InvalidHuffmanCode))
    }

    /// Drops buffered bits and steps over the expected RSTn marker.
    fn restart(&mut self) -> Result<()> {
        self.finish()?;
        self.buf = 0;
        self.avail = 0;
        self.fill = 0;
        let marker = match self.marker.take() {
            Some(m) => m,
            None => loop {
                let b = self.r.try_u8()?.ok_or_else(|| self.r.eof())?;
                if b != 0xFF {
                    continue;
                }
                let mut m = self.r.try_u8()?.ok_or_else(|| self.r.eof())?;
                while m == 0xFF {
                    m = self.r.try_u8()?.ok_or_else(|| self.r.eof())?;
                }
                if m != 0x00 {
                    break m;
                }
            },
        };
        if !(RST0..=RST7).contains(&marker) {
            return Err(self.fail(DecodeReason::UnexpectedMarker(marker)));
        }
        Ok(())
    }
}

/// Baseline JPEG decoder. Tables and component buffers persist across calls.
pub struct JpegCodec {
    reduce: bool,
    qt: [[u16; 64]; MAX_TABLES],
    qt_ok: [bool; MAX_TABLES],
    dc: [HuffTable; MAX_TABLES],
    ac: [HuffTable; MAX_TABLES],
    dc_ok: [bool; MAX_TABLES],
    ac_ok: [bool; MAX_TABLES],
    restart_interval: u16,
    planes: [Vec<u8>; MAX_COMPONENTS],
}

impl fmt::Debug for JpegCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JpegCodec")
            .field("reduce", &self.reduce)
            .field("restart_interval", &self.restart_interval)
            .finish_non_exhaustive()
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegCodec {
    /// Full-resolution decoder.
    pub fn new() -> Self {
        Self {
            reduce: false,
            qt: [[0; 64]; MAX_TABLES],
            qt_ok: [false; MAX_TABLES],
            dc: Default::default(),
            ac: Default::default(),
            dc_ok: [false; MAX_TABLES],
            ac_ok: [false; MAX_TABLES],
            restart_interval: 0,
            planes: Default::default(),
        }
    }

    /// 1/8-scale decoder using DC coefficients only.
    pub fn reduced() -> Self {
        Self {
            reduce: true,
            ..Self::new()
        }
    }

    pub fn is_reduced(&self) -> bool {
        self.reduce
    }

    fn output_size(&self, frame: &Frame) -> (u32, u32) {
        if self.reduce {
            (
                (frame.width as u32).div_ceil(8),
                (frame.height as u32).div_ceil(8),
            )
        } else {
            (frame.width as u32, frame.height as u32)
        }
    }

    fn next_marker<R: Read>(r: &mut ByteReader<'_, R>) -> Result<u8> {
        if r.u8()? != 0xFF {
            return Err(r.fail(DecodeReason::BadSegment("marker")));
        }
        let mut marker = r.u8()?;
        while marker == 0xFF {
            marker = r.u8()?;
        }
        Ok(marker)
    }

    /// Reads a segment length and returns the payload length.
    fn segment_len<R: Read>(r: &mut ByteReader<'_, R>, name: &'static str) -> Result<usize> {
        let len = r.u16_be()? as usize;
        if len < 2 {
            return Err(r.fail(DecodeReason::BadSegment(name)));
        }
        Ok(len - 2)
    }

    fn read_sof<R: Read>(r: &mut ByteReader<'_, R>) -> Result<Frame> {
        let len = Self::segment_len(r, "SOF")?;
        let precision = r.u8()?;
        if precision != 8 {
            return Err(r.fail(DecodeReason::BadPrecision(precision)));
        }
        let height = r.u16_be()?;
        let width = r.u16_be()?;
        let count = r.u8()?;
        if count != 1 && count != 3 {
            return Err(r.fail(DecodeReason::BadComponentCount(count)));
        }
        if len != 6 + 3 * count as usize {
            return Err(r.fail(DecodeReason::BadSegment("SOF")));
        }
        if width == 0 || height == 0 {
            return Err(r.fail(DecodeReason::BadDimensions {
                width: width as i64,
                height: height as i64,
            }));
        }

        let mut components = [Component::default(); MAX_COMPONENTS];
        for c in components.iter_mut().take(count as usize) {
            c.id = r.u8()?;
            let sampling = r.u8()?;
            c.h = sampling >> 4;
            c.v = sampling & 0x0F;
            c.tq = r.u8()?;
            if c.tq as usize >= MAX_TABLES {
                return Err(r.fail(DecodeReason::BadSegment("SOF")));
            }
        }

        if count == 1 {
            // A single-component scan is never interleaved: one block per MCU.
            components[0].h = 1;
            components[0].v = 1;
        } else {
            let luma = components[0];
            let chroma_ok = components[1..].iter().all(|c| c.h == 1 && c.v == 1);
            if !(1..=2).contains(&luma.h) || !(1..=2).contains(&luma.v) || !chroma_ok {
                return Err(r.fail(DecodeReason::UnsupportedSampling));
            }
        }

        let frame = Frame {
            width,
            height,
            count: count as usize,
            components,
            max_h: components[0].h,
            max_v: components[0].v,
        };
        debug!(
            "JPEG frame {}x{}, {} components, sampling {}x{}",
            width, height, count, frame.max_h, frame.max_v
        );
        Ok(frame)
    }

    fn read_dqt<R: Read>(&mut self, r: &mut ByteReader<'_, R>) -> Result<()> {
        let mut left = Self::segment_len(r, "DQT")?;
        while left > 0 {
            let info = r.u8()?;
            let precision = info >> 4;
            let id = (info & 0x0F) as usize;
            let size = match precision {
                0 => 65,
                1 => 129,
                _ => return Err(r.fail(DecodeReason::BadSegment("DQT"))),
            };
            if id >= MAX_TABLES || left < size {
                return Err(r.fail(DecodeReason::BadSegment("DQT")));
            }
            for k in 0..64 {
                self.qt[id][k] = if precision == 0 {
                    r.u8()? as u16
                } else {
                    r.u16_be()?
                };
            }
            self.qt_ok[id] = true;
            left -= size;
            debug!("JPEG quantization table {} ({}-bit)", id, 8 << precision);
        }
        Ok(())
    }

    fn read_dht<R: Read>(&mut self, r: &mut ByteReader<'_, R>) -> Result<()> {
        let mut left = Self::segment_len(r, "DHT")?;
        while left > 0 {
            if left < 17 {
                return Err(r.fail(DecodeReason::BadSegment("DHT")));
            }
            let info = r.u8()?;
            let class = info >> 4;
            let id = (info & 0x0F) as usize;
            if class > 1 || id >= MAX_TABLES {
                return Err(r.fail(DecodeReason::BadSegment("DHT")));
            }
            let mut counts = [0u8; 16];
            r.read_exact(&mut counts)?;
            let total: usize = counts.iter().map(|&n| n as usize).sum();
            if total > 256 || left < 17 + total {
                return Err(r.fail(DecodeReason::BadSegment("DHT")));
            }
            let mut values = [0u8; 256];
            r.read_exact(&mut values[..total])?;
            let (table, ok) = if class == 0 {
                (&mut self.dc[id], &mut self.dc_ok[id])
            } else {
                (&mut self.ac[id], &mut self.ac_ok[id])
            };
            if !table.build(&counts, &values[..total]) {
                return Err(r.fail(DecodeReason::BadSegment("DHT")));
            }
            *ok = true;
            left -= 17 + total;
            debug!(
                "JPEG {} Huffman table {}, {} codes",
                if class == 0 { "DC" } else { "AC" },
                id,
                total
            );
        }
        Ok(())
    }

    fn read_sos<R: Read>(&self, r: &mut ByteReader<'_, R>, frame: &mut Frame) -> Result<[usize; MAX_COMPONENTS]> {
        let len = Self::segment_len(r, "SOS")?;
        let count = r.u8()? as usize;
        if len != 1 + 2 * count + 3 {
            return Err(r.fail(DecodeReason::BadSegment("SOS")));
        }
        if count != frame.count {
            return Err(r.fail(DecodeReason::UnsupportedScan));
        }
        let mut order = [0usize; MAX_COMPONENTS];
        for slot in order.iter_mut().take(count) {
            let id = r.u8()?;
            let tables = r.u8()?;
            let index = frame.components[..frame.count]
                .iter()
                .position(|c| c.id == id)
                .ok_or_else(|| r.fail(DecodeReason::BadSegment("SOS")))?;
            let c = &mut frame.components[index];
            c.td = tables >> 4;
            c.ta = tables & 0x0F;
            if c.td as usize >= MAX_TABLES || c.ta as usize >= MAX_TABLES {
                return Err(r.fail(DecodeReason::BadSegment("SOS")));
            }
            *slot = index;
        }
        let start = r.u8()?;
        let end = r.u8()?;
        let approx = r.u8()?;
        if start != 0 || end != 63 || approx != 0 {
            return Err(r.fail(DecodeReason::UnsupportedScan));
        }

        for c in &frame.components[..frame.count] {
            if !self.qt_ok[c.tq as usize] {
                return Err(r.fail(DecodeReason::MissingTable {
                    kind: "quantization",
                    id: c.tq,
                }));
            }
            if !self.dc_ok[c.td as usize] {
                return Err(r.fail(DecodeReason::MissingTable {
                    kind: "DC Huffman",
                    id: c.td,
                }));
            }
            if !self.ac_ok[c.ta as usize] {
                return Err(r.fail(DecodeReason::MissingTable {
                    kind: "AC Huffman",
                    id: c.ta,
                }));
            }
        }
        Ok(order)
    }

    /// Parses markers up to the first scan (or only up to the frame header
    /// when `frame_only`).
    fn read_headers<R: Read>(
        &mut self,
        r: &mut ByteReader<'_, R>,
        frame_only: bool,
    ) -> Result<(Frame, [usize; MAX_COMPONENTS])> {
        self.qt_ok = [false; MAX_TABLES];
        self.dc_ok = [false; MAX_TABLES];
        self.ac_ok = [false; MAX_TABLES];
        self.restart_interval = 0;

        r.set_stage(DecodeStage::Header);
        let mut soi = [0u8; 2];
        r.read_exact(&mut soi)?;
        if soi != [0xFF, SOI] {
            return Err(r.fail(DecodeReason::BadMagic));
        }

        let mut frame: Option<Frame> = None;
        loop {
            let marker = Self::next_marker(r)?;
            match marker {
                SOF0 | SOF1 => {
                    r.set_stage(DecodeStage::Header);
                    let parsed = Self::read_sof(r)?;
                    if frame_only {
                        return Ok((parsed, [0, 1, 2]));
                    }
                    frame = Some(parsed);
                }
                0xC2 | 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                    return Err(r.fail(DecodeReason::UnsupportedProcess(marker)));
                }
                DHT => {
                    r.set_stage(DecodeStage::Tables);
                    self.read_dht(r)?;
                }
                DQT => {
                    r.set_stage(DecodeStage::Tables);
                    self.read_dqt(r)?;
                }
                DRI => {
                    if Self::segment_len(r, "DRI")? != 2 {
                        return Err(r.fail(DecodeReason::BadSegment("DRI")));
                    }
                    self.restart_interval = r.u16_be()?;
                    debug!("JPEG restart interval {}", self.restart_interval);
                }
                SOS => {
                    let mut frame = frame.ok_or_else(|| r.fail(DecodeReason::UnexpectedMarker(SOS)))?;
                    r.set_stage(DecodeStage::Header);
                    let order = self.read_sos(r, &mut frame)?;
                    return Ok((frame, order));
                }
                EOI | TEM | RST0..=RST7 | 0x00 => {
                    return Err(r.fail(DecodeReason::UnexpectedMarker(marker)));
                }
                _ => {
                    // APPn, COM and other segments we have no use for.
                    let len = Self::segment_len(r, "application")?;
                    r.skip(len as u64)?;
                }
            }
        }
    }

    /// Decodes the scan into `target` at `origin`, one MCU row at a time.
    fn read_scan<R: Read>(
        &mut self,
        r: &mut ByteReader<'_, R>,
        frame: &Frame,
        order: &[usize; MAX_COMPONENTS],
        target: &mut PixelSurface,
        origin: (u16, u16),
    ) -> Result<()> {
        r.set_stage(DecodeStage::Entropy);
        let (out_w, out_h) = self.output_size(frame);
        let block = if self.reduce { 1 } else { 8 };
        let mcu_w = frame.max_h as usize * 8;
        let mcu_h = frame.max_v as usize * 8;
        let mcus_x = (frame.width as usize).div_ceil(mcu_w);
        let mcus_y = (frame.height as usize).div_ceil(mcu_h);

        let mut widths = [0usize; MAX_COMPONENTS];
        for (ci, c) in frame.components[..frame.count].iter().enumerate() {
            widths[ci] = mcus_x * c.h as usize * block;
            self.planes[ci].resize(widths[ci] * c.v as usize * block, 0);
        }

        let mut bits = BitReader::new(r);
        let mut pred = [0i32; MAX_COMPONENTS];
        let mut coeffs = [0i32; 64];
        let mut pixels = [0u8; 64];
        let mut mcu = 0u32;
        let out_mcu_h = frame.max_v as usize * block;

        for my in 0..mcus_y {
            for mx in 0..mcus_x {
                if self.restart_interval > 0 && mcu > 0 && mcu % self.restart_interval as u32 == 0 {
                    bits.restart()?;
                    pred = [0; MAX_COMPONENTS];
                }
                for &ci in &order[..frame.count] {
                    let c = frame.components[ci];
                    for bv in 0..c.v as usize {
                        for bh in 0..c.h as usize {
                            decode_block(
                                &mut bits,
                                &self.dc[c.td as usize],
                                &self.ac[c.ta as usize],
                                &mut pred[ci],
                                &self.qt[c.tq as usize],
                                &mut coeffs,
                                self.reduce,
                            )?;
                            let bx = (mx * c.h as usize + bh) * block;
                            let by = bv * block;
                            let plane = &mut self.planes[ci];
                            if self.reduce {
                                plane[by * widths[ci] + bx] = dc_level(coeffs[0]);
                            } else {
                                idct(&coeffs, &mut pixels);
                                for row in 0..8 {
                                    let dst = (by + row) * widths[ci] + bx;
                                    plane[dst..dst + 8].copy_from_slice(&pixels[row * 8..row * 8 + 8]);
                                }
                            }
                        }
                    }
                }
                mcu += 1;
            }

            let y0 = my * out_mcu_h;
            let rows = out_mcu_h.min(out_h as usize - y0.min(out_h as usize));
            for py in 0..rows {
                for px in 0..out_w as usize {
                    let luma = self.planes[0][py * widths[0] + px];
                    let color = if frame.count == 3 {
                        let cx = px * frame.components[1].h as usize / frame.max_h as usize;
                        let cy = py * frame.components[1].v as usize / frame.max_v as usize;
                        let cb = self.planes[1][cy * widths[1] + cx];
                        let cx = px * frame.components[2].h as usize / frame.max_h as usize;
                        let cy = py * frame.components[2].v as usize / frame.max_v as usize;
                        let cr = self.planes[2][cy * widths[2] + cx];
                        ycbcr_to_color(luma, cb, cr)
                    } else {
                        join_color(luma, luma, luma)
                    };
                    target.set_pixel(
                        origin.0 as i32 + px as i32,
                        origin.1 as i32 + (y0 + py) as i32,
                        color,
                    )?;
                }
            }
        }
        bits.finish()
    }

    /// Decodes into a new RGB565 surface.
    pub fn decode<R: Read>(&mut self, reader: &mut R) -> Result<PixelSurface> {
        let mut r = ByteReader::new(reader, ImageFormat::Jpeg);
        let (frame, order) = self.read_headers(&mut r, false)?;
        let (w, h) = self.output_size(&frame);
        let (width, height) = surface_dimensions(ImageFormat::Jpeg, w, h)?;
        let mut surface = PixelSurface::new(width, height, PixelFormat::Rgb565)?;
        self.read_scan(&mut r, &frame, &order, &mut surface, (0, 0))?;
        info!(
            "Decoded {}x{} JPEG{}",
            width,
            height,
            if self.reduce { " at 1/8 scale" } else { "" }
        );
        Ok(surface)
    }

    /// Decodes into an RGB565 `target` at `origin`.
    ///
    /// Pixels are written one MCU row at a time, so corrupt entropy data
    /// leaves the rows above the failure in place.
    pub fn decode_into<R: Read>(
        &mut self,
        reader: &mut R,
        target: &mut PixelSurface,
        origin: (u16, u16),
    ) -> Result<()> {
        check_target(ImageFormat::Jpeg, PixelFormat::Rgb565, target)?;
        let mut r = ByteReader::new(reader, ImageFormat::Jpeg);
        let (frame, order) = self.read_headers(&mut r, false)?;
        let (w, h) = self.output_size(&frame);
        check_fit(ImageFormat::Jpeg, w, h, target, origin)?;
        self.read_scan(&mut r, &frame, &order, target, origin)
    }

    pub fn info<R: Read>(&mut self, reader: &mut R) -> Result<ImageInfo> {
        let mut r = ByteReader::new(reader, ImageFormat::Jpeg);
        let (frame, _) = self.read_headers(&mut r, true)?;
        let (width, height) = self.output_size(&frame);
        Ok(ImageInfo {
            format: ImageFormat::Jpeg,
            width,
            height,
            bits_per_pixel: 8 * frame.count as u8,
            surface_format: PixelFormat::Rgb565,
            frames: 1,
        })
    }
}

/// Huffman-decodes and dequantizes one 8x8 block into natural order.
///
/// With `dc_only` the AC coefficients are decoded but not stored.
fn decode_block<R: Read>(
    bits: &mut BitReader<'_, '_, R>,
    dc: &HuffTable,
    ac: &HuffTable,
    pred: &mut i32,
    qt: &[u16; 64],
    coeffs: &mut [i32; 64],
    dc_only: bool,
) -> Result<()> {
    coeffs.fill(0);
    let size = bits.decode(dc)? as u32;
    if size > 11 {
        return Err(bits.fail(DecodeReason::InvalidHuffmanCode));
    }
    let diff = extend(bits.bits(size)?, size);
    *pred = pred.wrapping_add(diff);
    coeffs[0] = dequantize(*pred, qt[0]);

    let mut k = 1usize;
    while k < 64 {
        let symbol = bits.decode(ac)?;
        let run = (symbol >> 4) as usize;
        let size = (symbol & 0x0F) as u32;
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            break;
        }
        k += run;
        if k > 63 {
            return Err(bits.fail(DecodeReason::CoefficientOverflow));
        }
        let value = extend(bits.bits(size)?, size);
        if !dc_only {
            coeffs[ZIGZAG[k]] = dequantize(value, qt[k]);
        }
        k += 1;
    }
    Ok(())
}

#[inline]
fn dequantize(value: i32, q: u16) -> i32 {
    value
        .saturating_mul(q as i32)
        .clamp(i16::MIN as i32, i16::MAX as i32)
}

/// Sign-extends a `size`-bit magnitude category value.
#[inline]
fn extend(bits: u32, size: u32) -> i32 {
    if size == 0 {
        return 0;
    }
    if bits < 1 << (size - 1) {
        bits as i32 - ((1 << size) - 1)
    } else {
        bits as i32
    }
}

#[inline]
fn descale(x: i64, n: u32) -> i64 {
    (x + (1 << (n - 1))) >> n
}

#[inline]
fn clamp_sample(x: i64) -> u8 {
    x.clamp(0, 255) as u8
}

/// Pixel value of a block from its dequantized DC coefficient alone.
#[inline]
fn dc_level(dc: i32) -> u8 {
    clamp_sample(descale(dc as i64, 3) + 128)
}

/// One 8-point pass of the islow IDCT, outputs scaled by 2^CONST_BITS.
fn idct_1d(d: [i64; 8]) -> [i64; 8] {
    let z1 = (d[2] + d[6]) * FIX_0_541;
    let tmp2 = z1 - d[6] * FIX_1_847;
    let tmp3 = z1 + d[2] * FIX_0_765;
    let tmp0 = (d[0] + d[4]) << CONST_BITS;
    let tmp1 = (d[0] - d[4]) << CONST_BITS;
    let (t10, t13) = (tmp0 + tmp3, tmp0 - tmp3);
    let (t11, t12) = (tmp1 + tmp2, tmp1 - tmp2);

    let (z1, z2, z3, z4) = (d[7] + d[1], d[5] + d[3], d[7] + d[3], d[5] + d[1]);
    let z5 = (z3 + z4) * FIX_1_175;
    let s1 = -z1 * FIX_0_899;
    let s2 = -z2 * FIX_2_562;
    let s3 = z5 - z3 * FIX_1_961;
    let s4 = z5 - z4 * FIX_0_390;
    let o0 = d[7] * FIX_0_298 + s1 + s3;
    let o1 = d[5] * FIX_2_053 + s2 + s4;
    let o2 = d[3] * FIX_3_072 + s2 + s3;
    let o3 = d[1] * FIX_1_501 + s1 + s4;

    [
        t10 + o3,
        t11 + o2,
        t12 + o1,
        t13 + o0,
        t13 - o0,
        t12 - o1,
        t11 - o2,
        t10 - o3,
    ]
}

/// Inverse DCT with level shift: rows, then columns.
fn idct(coeffs: &[i32; 64], out: &mut [u8; 64]) {
    let mut ws = [0i64; 64];
    for row in 0..8 {
        let b = row * 8;
        let d: [i64; 8] = std::array::from_fn(|i| coeffs[b + i] as i64);
        if d[1..].iter().all(|&v| v == 0) {
            ws[b..b + 8].fill(d[0] << PASS1_BITS);
            continue;
        }
        for (i, v) in idct_1d(d).into_iter().enumerate() {
            ws[b + i] = descale(v, CONST_BITS - PASS1_BITS);
        }
    }
    for col in 0..8 {
        let d: [i64; 8] = std::array::from_fn(|i| ws[col + i * 8]);
        if d[1..].iter().all(|&v| v == 0) {
            let v = clamp_sample(descale(d[0], PASS1_BITS + 3) + 128);
            for i in 0..8 {
                out[col + i * 8] = v;
            }
            continue;
        }
        for (i, v) in idct_1d(d).into_iter().enumerate() {
            out[col + i * 8] = clamp_sample(descale(v, CONST_BITS + PASS1_BITS + 3) + 128);
        }
    }
}

/// JFIF YCbCr to `0xRRGGBB`, 16-bit fixed point.
fn ycbcr_to_color(y: u8, cb: u8, cr: u8) -> u32 {
    let y = y as i64;
    let cb = cb as i64 - 128;
    let cr = cr as i64 - 128;
    let r = y + ((91_881 * cr + 32_768) >> 16);
    let g = y - ((22_554 * cb + 46_802 * cr + 32_768) >> 16);
    let b = y + ((116_130 * cb + 32_768) >> 16);
    join_color(clamp_sample(r), clamp_sample(g), clamp_sample(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(out: &mut Vec<u8>, marker: u8, payload: &[u8]) {
        out.extend_from_slice(&[0xFF, marker]);
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
    }

    fn dqt(out: &mut Vec<u8>) {
        let mut payload = vec![0x00, 8];
        payload.extend_from_slice(&[1; 63]);
        segment(out, DQT, &payload);
    }

    /// Huffman table with codes of length 1 for each value (at most 2).
    fn dht(out: &mut Vec<u8>, class_id: u8, values: &[u8]) {
        let mut payload = vec![class_id, values.len() as u8];
        payload.extend_from_slice(&[0; 15]);
        payload.extend_from_slice(values);
        segment(out, DHT, &payload);
    }

    /// 8x8 grayscale image whose DC decodes to level 200.
    fn gray_8x8() -> Vec<u8> {
        let mut out = vec![0xFF, SOI];
        dqt(&mut out);
        segment(&mut out, SOF0, &[8, 0, 8, 0, 8, 1, 1, 0x11, 0]);
        dht(&mut out, 0x00, &[0x07]);
        dht(&mut out, 0x10, &[0x00]);
        segment(&mut out, SOS, &[1, 1, 0x00, 0, 63, 0]);
        // DC code "0", diff 72 (1001000), EOB "0", pad with ones.
        out.extend_from_slice(&[0x48, 0x7F]);
        out.extend_from_slice(&[0xFF, EOI]);
        out
    }

    /// 16x16 H2V2 YCbCr image: gray level 200, neutral chroma.
    fn gray_16x16_420() -> Vec<u8> {
        let mut out = vec![0xFF, SOI];
        segment(&mut out, 0xE0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
        dqt(&mut out);
        segment(
            &mut out,
            SOF0,
            &[8, 0, 16, 0, 16, 3, 1, 0x22, 0, 2, 0x11, 0, 3, 0x11, 0],
        );
        dht(&mut out, 0x00, &[0x00, 0x07]);
        dht(&mut out, 0x10, &[0x00]);
        segment(&mut out, 0xFE, b"comment");
        segment(&mut out, SOS, &[3, 1, 0x00, 2, 0x00, 3, 0x00, 0, 63, 0]);
        // Y0: DC "1" + 1001000 + EOB, Y1-Y3, Cb, Cr: DC "0" + EOB.
        out.extend_from_slice(&[0xC8, 0x00, 0x1F]);
        out.extend_from_slice(&[0xFF, EOI]);
        out
    }

    #[test]
    fn test_gray_8x8() {
        let surface = JpegCodec::new().decode(&mut &gray_8x8()[..]).unwrap();
        assert_eq!((surface.width(), surface.height()), (8, 8));
        // 200 survives RGB565 truncation exactly.
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(surface.get_pixel(x, y).unwrap(), 0xC8C8C8);
            }
        }
    }

    #[test]
    fn test_420_upsampled_gray() {
        let surface = JpegCodec::new().decode(&mut &gray_16x16_420()[..]).unwrap();
        assert_eq!((surface.width(), surface.height()), (16, 16));
        assert_eq!(surface.get_pixel(0, 0).unwrap(), 0xC8C8C8);
        assert_eq!(surface.get_pixel(7, 7).unwrap(), 0xC8C8C8);
        // Blocks Y1..Y3 carry a zero DC difference, so they keep level 200.
        assert_eq!(surface.get_pixel(15, 15).unwrap(), 0xC8C8C8);
        assert_eq!(surface.get_pixel(12, 3).unwrap(), 0xC8C8C8);
    }

    #[test]
    fn test_reduced_scale() {
        let mut codec = JpegCodec::reduced();
        let surface = codec.decode(&mut &gray_16x16_420()[..]).unwrap();
        assert_eq!((surface.width(), surface.height()), (2, 2));
        assert_eq!(surface.get_pixel(1, 1).unwrap(), 0xC8C8C8);

        let surface = codec.decode(&mut &gray_8x8()[..]).unwrap();
        assert_eq!((surface.width(), surface.height()), (1, 1));
        assert_eq!(surface.get_pixel(0, 0).unwrap(), 0xC8C8C8);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = gray_8x8();
        data[1] = 0xD9;
        let err = JpegCodec::new().decode(&mut &data[..]).unwrap_err();
        assert_eq!(err.decode_reason(), Some(&DecodeReason::BadMagic));

        let err = JpegCodec::new().decode(&mut &b"BM"[..]).unwrap_err();
        assert_eq!(err.decode_reason(), Some(&DecodeReason::BadMagic));
    }

    #[test]
    fn test_progressive_unsupported() {
        let mut out = vec![0xFF, SOI];
        segment(&mut out, 0xC2, &[8, 0, 8, 0, 8, 1, 1, 0x11, 0]);
        let err = JpegCodec::new().decode(&mut &out[..]).unwrap_err();
        assert_eq!(err.decode_reason(), Some(&DecodeReason::UnsupportedProcess(0xC2)));
    }

    #[test]
    fn test_missing_tables() {
        let mut out = vec![0xFF, SOI];
        dqt(&mut out);
        segment(&mut out, SOF0, &[8, 0, 8, 0, 8, 1, 1, 0x11, 0]);
        segment(&mut out, SOS, &[1, 1, 0x00, 0, 63, 0]);
        let err = JpegCodec::new().decode(&mut &out[..]).unwrap_err();
        assert_eq!(
            err.decode_reason(),
            Some(&DecodeReason::MissingTable {
                kind: "DC Huffman",
                id: 0
            })
        );
    }

    #[test]
    fn test_unsupported_precision_and_sampling() {
        let mut out = vec![0xFF, SOI];
        segment(&mut out, SOF0, &[12, 0, 8, 0, 8, 1, 1, 0x11, 0]);
        let err = JpegCodec::new().decode(&mut &out[..]).unwrap_err();
        assert_eq!(err.decode_reason(), Some(&DecodeReason::BadPrecision(12)));

        let mut out = vec![0xFF, SOI];
        segment(
            &mut out,
            SOF0,
            &[8, 0, 16, 0, 16, 3, 1, 0x41, 0, 2, 0x11, 0, 3, 0x11, 0],
        );
        let err = JpegCodec::new().decode(&mut &out[..]).unwrap_err();
        assert_eq!(err.decode_reason(), Some(&DecodeReason::UnsupportedSampling));
    }

    #[test]
    fn test_truncated_headers() {
        let data = gray_8x8();
        let err = JpegCodec::new().decode(&mut &data[..10]).unwrap_err();
        assert!(matches!(
            err.decode_reason(),
            Some(DecodeReason::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn test_truncated_entropy_data() {
        let mut data = gray_8x8();
        data.truncate(data.len() - 4);
        let err = JpegCodec::new().decode(&mut &data[..]).unwrap_err();
        assert_eq!(
            err.decode_reason(),
            Some(&DecodeReason::UnexpectedEof {
                stage: DecodeStage::Entropy
            })
        );
    }

    #[test]
    fn test_decode_into_origin() {
        let mut target = PixelSurface::new(12, 12, PixelFormat::Rgb565).unwrap();
        JpegCodec::new()
            .decode_into(&mut &gray_8x8()[..], &mut target, (4, 4))
            .unwrap();
        assert_eq!(target.get_pixel(4, 4).unwrap(), 0xC8C8C8);
        assert_eq!(target.get_pixel(11, 11).unwrap(), 0xC8C8C8);
        assert_eq!(target.get_pixel(3, 3).unwrap(), 0);

        let err = JpegCodec::new()
            .decode_into(&mut &gray_8x8()[..], &mut target, (5, 0))
            .unwrap_err();
        assert!(matches!(
            err.decode_reason(),
            Some(DecodeReason::DimensionMismatch { .. })
        ));
    }

    /// Grayscale `width`x`height` stream whose scan is empty.
    fn gray_without_scan_data(width: u16, height: u16) -> Vec<u8> {
        let mut out = vec![0xFF, SOI];
        dqt(&mut out);
        let [hh, hl] = height.to_be_bytes();
        let [wh, wl] = width.to_be_bytes();
        segment(&mut out, SOF0, &[8, hh, hl, wh, wl, 1, 1, 0x11, 0]);
        dht(&mut out, 0x00, &[0x07]);
        dht(&mut out, 0x10, &[0x00]);
        segment(&mut out, SOS, &[1, 1, 0x00, 0, 63, 0]);
        out.extend_from_slice(&[0xFF, EOI]);
        out
    }

    #[test]
    fn test_empty_scan_fails_before_first_row() {
        let eof = DecodeReason::UnexpectedEof {
            stage: DecodeStage::Entropy,
        };
        let mut target = PixelSurface::new(256, 256, PixelFormat::Rgb565).unwrap();
        target.fill(0xF800F8).unwrap();
        let err = JpegCodec::new()
            .decode_into(&mut &gray_without_scan_data(256, 256)[..], &mut target, (0, 0))
            .unwrap_err();
        assert_eq!(err.decode_reason(), Some(&eof));
        for y in 0..256 {
            for x in 0..256 {
                assert_eq!(target.get_pixel(x, y).unwrap(), 0xF800F8);
            }
        }

        let err = JpegCodec::new()
            .decode(&mut &gray_without_scan_data(2048, 2048)[..])
            .unwrap_err();
        assert_eq!(err.decode_reason(), Some(&eof));
    }

    #[test]
    fn test_decode_into_keeps_rows_above_corruption() {
        // Same data as gray_8x8 but two MCU rows tall; the second block
        // starts on the trailing one bits and has no valid code.
        let mut data = vec![0xFF, SOI];
        dqt(&mut data);
        segment(&mut data, SOF0, &[8, 0, 16, 0, 8, 1, 1, 0x11, 0]);
        dht(&mut data, 0x00, &[0x07]);
        dht(&mut data, 0x10, &[0x00]);
        segment(&mut data, SOS, &[1, 1, 0x00, 0, 63, 0]);
        data.extend_from_slice(&[0x48, 0x7F, 0xFF, EOI]);

        let mut target = PixelSurface::new(8, 16, PixelFormat::Rgb565).unwrap();
        target.fill(0xF800F8).unwrap();
        let err = JpegCodec::new()
            .decode_into(&mut &data[..], &mut target, (0, 0))
            .unwrap_err();
        assert_eq!(err.decode_reason(), Some(&DecodeReason::InvalidHuffmanCode));
        for y in 0..16 {
            let expected = if y < 8 { 0xC8C8C8 } else { 0xF800F8 };
            for x in 0..8 {
                assert_eq!(target.get_pixel(x, y).unwrap(), expected);
            }
        }
    }

    #[test]
    fn test_codec_reuse() {
        let mut codec = JpegCodec::new();
        let a = codec.decode(&mut &gray_16x16_420()[..]).unwrap();
        let b = codec.decode(&mut &gray_8x8()[..]).unwrap();
        assert_eq!(a.get_pixel(0, 0).unwrap(), b.get_pixel(0, 0).unwrap());
    }

    #[test]
    fn test_info() {
        let info = JpegCodec::new().info(&mut &gray_16x16_420()[..]).unwrap();
        assert_eq!((info.width, info.height), (16, 16));
        assert_eq!(info.bits_per_pixel, 24);
    }

    #[test]
    fn test_extend() {
        assert_eq!(extend(0, 0), 0);
        assert_eq!(extend(0b0, 1), -1);
        assert_eq!(extend(0b1, 1), 1);
        assert_eq!(extend(0b000, 3), -7);
        assert_eq!(extend(0b1001000, 7), 72);
    }

    #[test]
    fn test_ycbcr_neutral_and_red() {
        assert_eq!(ycbcr_to_color(200, 128, 128), 0xC8C8C8);
        let (r, g, b) = crate::color::split_color(ycbcr_to_color(76, 85, 255));
        assert!(r > 250 && g < 5 && b < 5);
    }
}
