use std::io::{self, Read, Write};

use thiserror::Error;

const LENGTH_BYTES: usize = 8;
const CRC_BYTES: usize = 4;
const CRC_MASK_DELTA: u32 = 0xa282_ead8;

/// crc32c rotated and offset so a checksum stored alongside its own input
/// cannot collide with a checksum of that combined block.
fn masked_crc32c(bytes: &[u8]) -> u32 {
    let crc = crc32c::crc32c(bytes);
    ((crc >> 15) | (crc << 17)).wrapping_add(CRC_MASK_DELTA)
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("truncated frame at byte {offset}")]
    Truncated { offset: u64 },
    #[error("length checksum mismatch at byte {offset}")]
    LengthChecksum { offset: u64 },
    #[error("payload checksum mismatch at byte {offset}")]
    PayloadChecksum { offset: u64 },
}

/// Writes length-delimited, checksummed record frames.
///
/// Frame layout: `u64-le` payload length, `u32-le` masked crc32c of the
/// length bytes, payload, `u32-le` masked crc32c of the payload.
#[derive(Debug)]
pub struct RecordWriter<W: Write> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_record(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let length = (payload.len() as u64).to_le_bytes();
        self.inner.write_all(&length)?;
        self.inner.write_all(&masked_crc32c(&length).to_le_bytes())?;
        self.inner.write_all(payload)?;
        self.inner.write_all(&masked_crc32c(payload).to_le_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), FrameError> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Reads frames written by [`RecordWriter`].
///
/// Distinguishes a clean end of stream (EOF at a frame boundary, `Ok(None)`)
/// from truncation or corruption mid-frame (an error naming the byte offset
/// of the bad frame).
#[derive(Debug)]
pub struct RecordReader<R: Read> {
    inner: R,
    offset: u64,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Byte offset of the next unread frame.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Reads the next record payload; `Ok(None)` at clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut length_bytes = [0u8; LENGTH_BYTES];
        match self.fill(&mut length_bytes)? {
            0 => return Ok(None),
            n if n < LENGTH_BYTES => {
                return Err(FrameError::Truncated {
                    offset: self.offset,
                })
            }
            _ => {}
        }

        let mut crc_bytes = [0u8; CRC_BYTES];
        if self.fill(&mut crc_bytes)? < CRC_BYTES {
            return Err(FrameError::Truncated {
                offset: self.offset,
            });
        }
        if u32::from_le_bytes(crc_bytes) != masked_crc32c(&length_bytes) {
            return Err(FrameError::LengthChecksum {
                offset: self.offset,
            });
        }

        // The length checksum passed, so the allocation is writer-bounded.
        let length = u64::from_le_bytes(length_bytes);
        let mut payload = vec![0u8; length as usize];
        if (self.fill(&mut payload)? as u64) < length {
            return Err(FrameError::Truncated {
                offset: self.offset,
            });
        }

        if self.fill(&mut crc_bytes)? < CRC_BYTES {
            return Err(FrameError::Truncated {
                offset: self.offset,
            });
        }
        if u32::from_le_bytes(crc_bytes) != masked_crc32c(&payload) {
            return Err(FrameError::PayloadChecksum {
                offset: self.offset,
            });
        }

        self.offset += (LENGTH_BYTES + CRC_BYTES + CRC_BYTES) as u64 + length;
        Ok(Some(payload))
    }

    /// Reads until `buf` is full or the stream ends; returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        let mut read = 0;
        while read < buf.len() {
            match self.inner.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(read)
    }
}
