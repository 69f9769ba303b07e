//! A streaming raw-DEFLATE encoder.
//!
//! [`DeflateWriter`] is the write-side counterpart of
//! [`InflateReader`](crate::inflate::InflateReader): bytes written to it
//! are compressed and passed downstream, while a CRC-32 and a running
//! total of the uncompressed bytes accumulate for the archive writer to
//! stamp into headers.

use std::io::{self, Write};

use crc32fast::Hasher;
use flate2::{Compress, FlushCompress, Status};
use log::trace;

use crate::entry::CompressionLevel;
use crate::result::*;

/// Input is buffered and fed to the codec this many bytes at a time.
const BUFFER_SIZE: usize = 1024;

/// What came out of the filter, reported once the stream is finished
#[derive(Debug, Clone, Copy)]
pub struct DeflateSummary {
    /// CRC-32 of the uncompressed bytes
    pub crc32: u32,
    /// Total uncompressed bytes written to the filter
    pub size: u64,
    /// Total compressed bytes passed downstream
    pub compressed_size: u64,
}

/// A `Write` adapter that deflates into a raw DEFLATE stream
pub struct DeflateWriter<W: Write> {
    inner: W,
    compress: Compress,
    in_buf: Vec<u8>,
    crc: Hasher,
    size: u64,
    compressed_size: u64,
    /// Leading codec output bytes to drop. Compressing at zlib level 0
    /// frames the data in stored blocks, and the first block's 5-byte
    /// header must not reach a stream that's meant to be bare bytes.
    bytes_to_skip: usize,
    summary: Option<DeflateSummary>,
}

impl<W: Write> DeflateWriter<W> {
    pub fn new(inner: W, level: CompressionLevel) -> Self {
        let zlevel = level.to_zlib();
        let bytes_to_skip = if zlevel.level() == 0 { 5 } else { 0 };
        DeflateWriter {
            inner,
            // false: raw stream, no zlib header
            compress: Compress::new(zlevel, false),
            in_buf: Vec::with_capacity(BUFFER_SIZE),
            crc: Hasher::new(),
            size: 0,
            compressed_size: 0,
            bytes_to_skip,
            summary: None,
        }
    }

    /// Runs the buffered input through the codec, draining codec output
    /// downstream as it appears. With `finish`, also drives the codec to
    /// its end-of-stream marker.
    fn feed_codec(&mut self, finish: bool) -> ZipResult<()> {
        let input = std::mem::take(&mut self.in_buf);
        self.crc.update(&input);
        self.size += input.len() as u64;

        let flush = if finish {
            FlushCompress::Finish
        } else {
            FlushCompress::None
        };
        let mut out = [0u8; BUFFER_SIZE];
        let mut consumed = 0;
        loop {
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            let status = self
                .compress
                .compress(&input[consumed..], &mut out, flush)
                .map_err(|e| ZipError::Corrupt(format!("deflate failed: {e}")))?;
            consumed += (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;
            self.emit(&out[..produced])?;

            match status {
                Status::StreamEnd => break,
                _ if !finish && consumed == input.len() => break,
                _ => {}
            }
        }
        Ok(())
    }

    /// Passes codec output downstream, less any leading bytes to skip.
    fn emit(&mut self, mut data: &[u8]) -> ZipResult<()> {
        if self.bytes_to_skip > 0 {
            let n = self.bytes_to_skip.min(data.len());
            data = &data[n..];
            self.bytes_to_skip -= n;
        }
        if !data.is_empty() {
            self.inner.write_all(data)?;
            self.compressed_size += data.len() as u64;
        }
        Ok(())
    }

    /// Drives the codec to its end-of-stream marker, flushes downstream,
    /// and reports the stream totals.
    ///
    /// An entry that never received a byte produces no output at all:
    /// zlib would emit a 2-byte empty-stream marker (`03 00`), which a
    /// zero-length entry must not carry.
    ///
    /// Idempotent; repeat calls return the same summary.
    pub fn finish(&mut self) -> ZipResult<DeflateSummary> {
        if let Some(summary) = self.summary {
            return Ok(summary);
        }
        if self.size > 0 || !self.in_buf.is_empty() {
            self.feed_codec(true)?;
        }
        self.inner.flush()?;
        let summary = DeflateSummary {
            crc32: self.crc.clone().finalize(),
            size: self.size,
            compressed_size: self.compressed_size,
        };
        trace!("{:?}", summary);
        self.summary = Some(summary);
        Ok(summary)
    }

    /// Finishes the stream (if nothing has yet) and returns the
    /// downstream writer with the stream totals.
    pub fn into_inner(mut self) -> ZipResult<(W, DeflateSummary)> {
        let summary = self.finish()?;
        Ok((self.inner, summary))
    }
}

impl<W: Write> Write for DeflateWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.summary.is_some() {
            return Err(ZipError::StateError("write to a finished deflate stream").into_io());
        }
        let room = BUFFER_SIZE - self.in_buf.len();
        let take = room.min(buf.len());
        self.in_buf.extend_from_slice(&buf[..take]);
        if self.in_buf.len() == BUFFER_SIZE {
            self.feed_codec(false).map_err(ZipError::into_io)?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Forward buffered input, but don't disturb the codec's framing;
        // only a full stream end flushes compressed state.
        if self.summary.is_none() {
            self.feed_codec(false).map_err(ZipError::into_io)?;
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inflate::InflateReader;
    use std::io::Read;

    fn crc_of(data: &[u8]) -> u32 {
        let mut hasher = Hasher::new();
        hasher.update(data);
        hasher.finalize()
    }

    #[test]
    fn deflated_bytes_inflate_back() {
        let data = b"compress me, compress me, compress me again".repeat(40);
        let mut writer = DeflateWriter::new(Vec::new(), CompressionLevel::Default);
        writer.write_all(&data).unwrap();
        let (compressed, summary) = writer.into_inner().unwrap();

        assert_eq!(summary.size, data.len() as u64);
        assert_eq!(summary.compressed_size, compressed.len() as u64);
        assert_eq!(summary.crc32, crc_of(&data));
        assert!(compressed.len() < data.len());

        let mut out = Vec::new();
        InflateReader::new(&compressed[..])
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn level_none_drops_the_stored_block_header() {
        let data = b"exactly these bytes, framed by nothing";
        let mut writer = DeflateWriter::new(Vec::new(), CompressionLevel::None);
        writer.write_all(data).unwrap();
        let (out, summary) = writer.into_inner().unwrap();

        assert_eq!(out, data);
        assert_eq!(summary.compressed_size, data.len() as u64);
        assert_eq!(summary.crc32, crc_of(data));
    }

    #[test]
    fn empty_stream_emits_nothing() {
        let mut writer = DeflateWriter::new(Vec::new(), CompressionLevel::Default);
        let summary = writer.finish().unwrap();
        assert_eq!(summary.crc32, 0);
        assert_eq!(summary.size, 0);
        assert_eq!(summary.compressed_size, 0);

        let (out, _) = writer.into_inner().unwrap();
        assert!(out.is_empty(), "suppressed empty stream still wrote {out:?}");
    }

    #[test]
    fn finish_is_idempotent_and_fences_writes() {
        let mut writer = DeflateWriter::new(Vec::new(), CompressionLevel::Fastest);
        writer.write_all(b"some bytes").unwrap();
        let first = writer.finish().unwrap();
        let second = writer.finish().unwrap();
        assert_eq!(first.crc32, second.crc32);
        assert_eq!(first.compressed_size, second.compressed_size);

        let err = writer.write(b"more").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
    }

    #[test]
    fn every_level_round_trips() {
        let data = b"all the levels of the world".repeat(10);
        for level in [
            CompressionLevel::Default,
            CompressionLevel::Smallest,
            CompressionLevel::Fastest,
            CompressionLevel::precise(1).unwrap(),
            CompressionLevel::precise(50).unwrap(),
            CompressionLevel::precise(100).unwrap(),
        ] {
            let mut writer = DeflateWriter::new(Vec::new(), level);
            writer.write_all(&data).unwrap();
            let (compressed, summary) = writer.into_inner().unwrap();
            assert_eq!(summary.crc32, crc_of(&data), "crc at {level:?}");

            let mut out = Vec::new();
            InflateReader::new(&compressed[..])
                .read_to_end(&mut out)
                .unwrap();
            assert_eq!(out, data, "round trip at {level:?}");
        }
    }
}
