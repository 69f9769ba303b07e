//! A streaming raw-DEFLATE decoder.
//!
//! [`InflateReader`] pulls compressed bytes from an upstream reader
//! through a small fixed buffer and hands back the original bytes.
//! ZIP stores entries as raw DEFLATE (no zlib or gzip wrapper), so the
//! codec runs header-less. The filter stops at the compressed stream's
//! end marker; checking the result against the central directory's CRC
//! and length is the job of the CRC-checking reader wrapped around it.

use std::io::{self, Read};

use flate2::{Decompress, FlushDecompress, Status};

use crate::result::ZipError;

/// Compressed input is pulled upstream this many bytes at a time.
const BUFFER_SIZE: usize = 1024;

/// A `Read` adapter that inflates a raw DEFLATE stream
pub struct InflateReader<R> {
    inner: R,
    decompress: Decompress,
    in_buf: Box<[u8; BUFFER_SIZE]>,
    in_pos: usize,
    in_cap: usize,
    upstream_eof: bool,
    done: bool,
}

impl<R: Read> InflateReader<R> {
    pub fn new(inner: R) -> Self {
        InflateReader {
            inner,
            // false: raw stream, no zlib header
            decompress: Decompress::new(false),
            in_buf: Box::new([0; BUFFER_SIZE]),
            in_pos: 0,
            in_cap: 0,
            upstream_eof: false,
            done: false,
        }
    }

    /// Reinitializes the codec and swaps in a new upstream source,
    /// so one filter can decode entry after entry.
    /// Returns the old source.
    pub fn reset(&mut self, inner: R) -> R {
        self.decompress.reset(false);
        self.in_pos = 0;
        self.in_cap = 0;
        self.upstream_eof = false;
        self.done = false;
        std::mem::replace(&mut self.inner, inner)
    }

    /// Decompressed bytes produced so far
    pub fn total_out(&self) -> u64 {
        self.decompress.total_out()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for InflateReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.done {
            return Ok(0);
        }
        loop {
            if self.in_pos == self.in_cap && !self.upstream_eof {
                self.in_pos = 0;
                self.in_cap = self.inner.read(&mut self.in_buf[..])?;
                if self.in_cap == 0 {
                    self.upstream_eof = true;
                }
            }

            let flush = if self.upstream_eof {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self
                .decompress
                .decompress(&self.in_buf[self.in_pos..self.in_cap], buf, flush)
                .map_err(|e| ZipError::Corrupt(format!("inflate failed: {e}")).into_io())?;
            self.in_pos += (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;

            if status == Status::StreamEnd {
                self.done = true;
                return Ok(produced);
            }
            if produced > 0 {
                return Ok(produced);
            }
            if self.upstream_eof {
                return Err(
                    ZipError::Corrupt("DEFLATE stream ended without its end marker".into())
                        .into_io(),
                );
            }
            if self.in_pos < self.in_cap {
                // Input and output space both available, yet nothing
                // moved: the codec is wedged.
                return Err(ZipError::Corrupt("inflate made no progress".into()).into_io());
            }
            // Buffer drained; loop around to refill.
        }
    }
}
