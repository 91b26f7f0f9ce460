//! Sequential byte reader shared by the container codecs.

use std::io::{self, Read};

use super::ImageFormat;
use crate::error::{DecodeReason, DecodeStage};
use crate::{Error, Result};

/// Wraps a stream and tags end-of-input failures with the decoder stage.
pub(crate) struct ByteReader<'a, R> {
    inner: &'a mut R,
    format: ImageFormat,
    stage: DecodeStage,
    position: u64,
}

impl<'a, R: Read> ByteReader<'a, R> {
    pub fn new(inner: &'a mut R, format: ImageFormat) -> Self {
        Self {
            inner,
            format,
            stage: DecodeStage::Header,
            position: 0,
        }
    }

    pub fn set_stage(&mut self, stage: DecodeStage) {
        self.stage = stage;
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Builds a decode error for this reader's format.
    pub fn fail(&self, reason: DecodeReason) -> Error {
        Error::decode(self.format, reason)
    }

    /// Builds the end-of-input error for the current stage.
    pub fn eof(&self) -> Error {
        self.fail(DecodeReason::UnexpectedEof { stage: self.stage })
    }

    fn map(&self, err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            self.eof()
        } else {
            Error::Io(err)
        }
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(|e| self.map(e))?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Reads one byte, or `None` at end of input.
    pub fn try_u8(&mut self) -> Result<Option<u8>> {
        let mut b = [0u8; 1];
        loop {
            match self.inner.read(&mut b) {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    self.position += 1;
                    return Ok(Some(b[0]));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    pub fn u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_exact(&mut b)?;
        Ok(b[0])
    }

    pub fn u16_le(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    pub fn u16_be(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        self.read_exact(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    pub fn u32_le(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(u32::from_le_bytes(b))
    }

    pub fn i32_le(&mut self) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_exact(&mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    /// Discards `n` bytes.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let mut limited = (&mut *self.inner).take(n);
        let copied = io::copy(&mut limited, &mut io::sink())?;
        self.position += copied;
        if copied < n {
            return Err(self.eof());
        }
        Ok(())
    }
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
pub(crate) fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}
