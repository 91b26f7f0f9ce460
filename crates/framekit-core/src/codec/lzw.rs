//! Variable-width LZW decompression for GIF image data.
//!
//! The string table lives in fixed arrays owned by the decoder and is reused
//! for every frame, so decoding allocates nothing beyond the output buffer.

use crate::error::DecodeReason;

/// 12-bit codes give at most 4096 table entries.
const MAX_CODES: usize = 4096;
const MAX_CODE_SIZE: u8 = 12;

/// LSB-first bit reader over concatenated sub-block payload.
struct Bits<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    count: u8,
}

impl<'a> Bits<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            count: 0,
        }
    }

    fn read(&mut self, size: u8) -> Option<u16> {
        while self.count < size {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            self.acc |= (byte as u32) << self.count;
            self.count += 8;
        }
        let code = (self.acc & ((1u32 << size) - 1)) as u16;
        self.acc >>= size;
        self.count -= size;
        Some(code)
    }
}

/// Reusable LZW string table.
pub(crate) struct LzwDecoder {
    prefix: Box<[u16; MAX_CODES]>,
    suffix: Box<[u8; MAX_CODES]>,
    stack: Vec<u8>,
}

impl std::fmt::Debug for LzwDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzwDecoder").finish_non_exhaustive()
    }
}

impl Default for LzwDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl LzwDecoder {
    pub fn new() -> Self {
        Self {
            prefix: Box::new([0; MAX_CODES]),
            suffix: Box::new([0; MAX_CODES]),
            stack: Vec::with_capacity(MAX_CODES),
        }
    }

    /// Decodes `data` into `out` until `out.len() == expected`.
    ///
    /// The stream must open with a clear code and must yield at least
    /// `expected` indices; extra output past `expected` is discarded.
    pub fn decode(
        &mut self,
        min_code_size: u8,
        data: &[u8],
        expected: usize,
        out: &mut Vec<u8>,
    ) -> Result<(), DecodeReason> {
        if !(2..=8).contains(&min_code_size) {
            return Err(DecodeReason::BadCodeSize(min_code_size));
        }
        out.clear();
        let clear = 1u16 << min_code_size;
        let end = clear + 1;
        let mut bits = Bits::new(data);
        let mut code_size = min_code_size + 1;
        let mut next = clear + 2;
        let mut prev: Option<u16> = None;

        match bits.read(code_size) {
            Some(code) if code == clear => {}
            Some(_) => return Err(DecodeReason::MissingClearCode),
            None => return Err(DecodeReason::LzwUnderrun),
        }

        while out.len() < expected {
            let code = bits.read(code_size).ok_or(DecodeReason::LzwUnderrun)?;
            if code == clear {
                code_size = min_code_size + 1;
                next = clear + 2;
                prev = None;
                continue;
            }
            if code == end {
                break;
            }

            let Some(last) = prev else {
                if code > clear {
                    return Err(DecodeReason::InvalidCode(code));
                }
                out.push(code as u8);
                prev = Some(code);
                continue;
            };

            let first = if code < next {
                self.emit(code, clear, out, expected)
            } else if code == next {
                let first = self.emit(last, clear, out, expected);
                if out.len() < expected {
                    out.push(first);
                }
                first
            } else {
                return Err(DecodeReason::InvalidCode(code));
            };

            if (next as usize) < MAX_CODES {
                self.prefix[next as usize] = last;
                self.suffix[next as usize] = first;
                next += 1;
                if next == (1 << code_size) && code_size < MAX_CODE_SIZE {
                    code_size += 1;
                }
            }
            prev = Some(code);
        }

        if out.len() < expected {
            return Err(DecodeReason::LzwUnderrun);
        }
        Ok(())
    }

    /// Appends the string for `code` and returns its first byte.
    fn emit(&mut self, mut code: u16, clear: u16, out: &mut Vec<u8>, expected: usize) -> u8 {
        self.stack.clear();
        while code > clear {
            self.stack.push(self.suffix[code as usize]);
            code = self.prefix[code as usize];
        }
        let first = code as u8;
        self.stack.push(first);
        for &byte in self.stack.iter().rev() {
            if out.len() >= expected {
                break;
            }
            out.push(byte);
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_color_stream() {
        // CLEAR, 1, 6, 1, END with 3-bit codes growing to 4 bits.
        let mut lzw = LzwDecoder::new();
        let mut out = Vec::new();
        lzw.decode(2, &[0x8C, 0x53], 4, &mut out).unwrap();
        assert_eq!(out, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_missing_clear_code() {
        let mut lzw = LzwDecoder::new();
        let mut out = Vec::new();
        assert_eq!(
            lzw.decode(2, &[0x01], 4, &mut out),
            Err(DecodeReason::MissingClearCode)
        );
    }

    #[test]
    fn test_underrun() {
        let mut lzw = LzwDecoder::new();
        let mut out = Vec::new();
        // Same stream but the frame needs more pixels than it encodes.
        assert_eq!(
            lzw.decode(2, &[0x8C, 0x53], 9, &mut out),
            Err(DecodeReason::LzwUnderrun)
        );
        assert_eq!(lzw.decode(2, &[], 1, &mut out), Err(DecodeReason::LzwUnderrun));
    }

    #[test]
    fn test_code_past_table_is_invalid() {
        // CLEAR (4), then 7 which is beyond the next free code 6.
        let mut lzw = LzwDecoder::new();
        let mut out = Vec::new();
        assert!(matches!(
            lzw.decode(2, &[0x3C, 0x00], 4, &mut out),
            Err(DecodeReason::InvalidCode(_))
        ));
    }

    #[test]
    fn test_rejects_bad_code_size() {
        let mut lzw = LzwDecoder::new();
        let mut out = Vec::new();
        assert_eq!(
            lzw.decode(12, &[0], 1, &mut out),
            Err(DecodeReason::BadCodeSize(12))
        );
    }

    #[test]
    fn test_truncates_excess_output() {
        let mut lzw = LzwDecoder::new();
        let mut out = Vec::new();
        lzw.decode(2, &[0x8C, 0x53], 3, &mut out).unwrap();
        assert_eq!(out, vec![1, 1, 1]);
    }
}
