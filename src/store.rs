use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use anyhow::Context as _;

use crate::{
    error::{RawmError, RawmResult},
    format::PixelFormat,
};

/// Byte size of one frame in the raw stream. No padding, no header. `None` on overflow.
pub fn frame_size(width: u32, height: u32, pixel_format: PixelFormat) -> Option<u64> {
    u64::from(width)
        .checked_mul(u64::from(height))?
        .checked_mul(u64::from(pixel_format.bytes_per_pixel()))
}

/// Byte offset of frame `index` in the raw stream. `None` on overflow.
pub fn frame_offset(index: u64, frame_size: u64) -> Option<u64> {
    index.checked_mul(frame_size)
}

/// Read frame `index` into `buf`; `buf.len()` is the frame size.
pub fn read_frame_into<R: Read + Seek>(
    stream: &mut R,
    index: u64,
    buf: &mut [u8],
) -> RawmResult<()> {
    let frame_size = buf.len() as u64;
    let offset = frame_offset(index, frame_size).ok_or_else(|| {
        RawmError::selection(format!("frame {index} lies beyond any addressable offset"))
    })?;
    stream
        .seek(SeekFrom::Start(offset))
        .with_context(|| format!("seek to frame {index}"))?;
    stream.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => RawmError::TruncatedStream { index, frame_size },
        _ => RawmError::Other(anyhow::Error::new(e).context(format!("read frame {index}"))),
    })
}

pub fn read_frame<R: Read + Seek>(
    stream: &mut R,
    index: u64,
    frame_size: u64,
) -> RawmResult<Vec<u8>> {
    let mut buf = vec![0u8; frame_size as usize];
    read_frame_into(stream, index, &mut buf)?;
    Ok(buf)
}

/// Write one frame at the current cursor.
pub fn append_frame<W: Write>(stream: &mut W, bytes: &[u8]) -> RawmResult<()> {
    stream.write_all(bytes).context("append frame to raw stream")?;
    Ok(())
}

/// Appends fixed-size frames and counts them.
///
/// Every frame must be exactly `frame_size` bytes, so the finished stream always holds
/// `frames_written() * frame_size` bytes.
pub struct FrameWriter<W: Write> {
    inner: W,
    frame_size: u64,
    written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W, frame_size: u64) -> Self {
        Self {
            inner,
            frame_size,
            written: 0,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> RawmResult<()> {
        if bytes.len() as u64 != self.frame_size {
            return Err(RawmError::SizeMismatch {
                expected: self.frame_size,
                actual: bytes.len() as u64,
            });
        }
        append_frame(&mut self.inner, bytes)?;
        self.written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> RawmResult<W> {
        self.inner.flush().context("flush raw stream")?;
        Ok(self.inner)
    }
}
