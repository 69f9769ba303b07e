//! A windowed view over a seekable byte source, and a helper for
//! scanning it backwards.
//!
//! ZIP metadata lives at the *back* of the file, and an archive is often
//! embedded in a larger file (a self-extracting executable, an asset
//! bundle). [`VirtualSeeker`] pins a `[start, end]` window onto any
//! `Read + Seek` source so the parser can treat an embedded archive
//! exactly like a standalone one: `SeekFrom::Start(0)` is the window
//! start, `SeekFrom::End(0)` is the window end, and reads stop at the
//! window boundary.

use std::io::{self, Read, Seek, SeekFrom};

use crate::result::*;
use crate::spec::read_exact_or_short;

/// A `[start, end]` window over a seekable byte source.
///
/// All positions reported and accepted are relative to the window start.
/// Everything in this crate that touches an archive source goes through
/// one of these; nothing seeks the underlying source directly.
#[derive(Debug)]
pub struct VirtualSeeker<S> {
    source: S,
    /// Window bounds, absolute positions in `source`
    start: u64,
    end: u64,
    /// Current position, absolute. May sit past `end` after a seek;
    /// reads there return 0.
    pos: u64,
}

impl<S: Seek> VirtualSeeker<S> {
    /// Wraps `source` with a window spanning the whole thing.
    pub fn new(source: S) -> io::Result<Self> {
        Self::with_window(source, 0, 0)
    }

    /// Wraps `source` with a window from `start` to `end_offset`.
    ///
    /// A positive `end_offset` is an absolute position in `source`;
    /// zero or negative counts back from the physical end, so `0` means
    /// "through the end of the source".
    pub fn with_window(mut source: S, start: u64, end_offset: i64) -> io::Result<Self> {
        let physical_end = source.seek(SeekFrom::End(0))?;
        let end = if end_offset > 0 {
            end_offset as u64
        } else {
            let e = physical_end as i128 + end_offset as i128;
            if e < 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "window end precedes start of source",
                ));
            }
            e as u64
        };
        if end < start || end > physical_end {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "window does not fit in source",
            ));
        }
        source.seek(SeekFrom::Start(start))?;
        Ok(VirtualSeeker {
            source,
            start,
            end,
            pos: start,
        })
    }

    /// The window's length in bytes
    pub fn window_len(&self) -> u64 {
        self.end - self.start
    }

    /// The window's start, as an absolute position in the source
    pub fn window_start(&self) -> u64 {
        self.start
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: Read> Read for VirtualSeeker<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.end.saturating_sub(self.pos);
        if available == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(available) as usize;
        let count = self.source.read(&mut buf[..want])?;
        self.pos += count as u64;
        Ok(count)
    }
}

impl<S: Seek> Seek for VirtualSeeker<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target: i128 = match pos {
            SeekFrom::Start(p) => self.start as i128 + p as i128,
            SeekFrom::End(d) => self.end as i128 + d as i128,
            SeekFrom::Current(d) => self.pos as i128 + d as i128,
        };
        if target < self.start as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of window",
            ));
        }
        let target = target as u64;
        self.source.seek(SeekFrom::Start(target))?;
        self.pos = target;
        Ok(target - self.start)
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.pos - self.start)
    }
}

/// Default chunk size for [`BackBuffer`] reads
pub(crate) const BACK_BUFFER_CHUNK: usize = 1024;

/// Fills itself with the tail of a window by reading chunks backwards.
///
/// Useful when we know a record is near the end of the file but not how
/// far back it starts. Each [`read_chunk()`](BackBuffer::read_chunk)
/// prepends another chunk to the front of the buffer, working towards
/// the window start. Callers keep a `read_pointer` naming a position in
/// the buffer; the prepend shifts buffer contents, so `read_chunk`
/// bumps the pointer to keep it naming the same byte of the file.
pub(crate) struct BackBuffer {
    buf: Vec<u8>,
    chunk_size: usize,
    /// Window-relative position of `buf[0]`
    file_pos: u64,
}

impl BackBuffer {
    pub fn new<S: Read + Seek>(
        src: &mut VirtualSeeker<S>,
        chunk_size: usize,
    ) -> ZipResult<BackBuffer> {
        let len = src.seek(SeekFrom::End(0))?;
        Ok(BackBuffer {
            buf: Vec::new(),
            chunk_size,
            file_pos: len,
        })
    }

    /// Reads the next chunk back from the window, prepending it to the
    /// buffer. Returns the number of bytes read: less than the chunk
    /// size once the window start is near, and 0 at the window start.
    pub fn read_chunk<S: Read + Seek>(
        &mut self,
        src: &mut VirtualSeeker<S>,
        read_pointer: &mut usize,
    ) -> ZipResult<usize> {
        let chunk = (self.chunk_size as u64).min(self.file_pos) as usize;
        if chunk == 0 {
            return Ok(0);
        }
        self.file_pos -= chunk as u64;
        src.seek(SeekFrom::Start(self.file_pos))?;
        let mut head = vec![0u8; chunk];
        read_exact_or_short(src, &mut head)?;
        self.buf.splice(0..0, head);
        *read_pointer += chunk;
        Ok(chunk)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Window-relative position of the first buffered byte
    pub fn file_pos(&self) -> u64 {
        self.file_pos
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn counting_source(len: u8) -> Cursor<Vec<u8>> {
        Cursor::new((0..len).collect())
    }

    #[test]
    fn whole_source_window() {
        let mut v = VirtualSeeker::new(counting_source(10)).unwrap();
        let mut buf = [0u8; 4];
        v.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(v.seek(SeekFrom::End(0)).unwrap(), 10);
        assert_eq!(v.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn window_repositions_origin_and_end() {
        let mut v = VirtualSeeker::with_window(counting_source(10), 2, -3).unwrap();
        assert_eq!(v.window_len(), 5);

        assert_eq!(v.seek(SeekFrom::Start(0)).unwrap(), 0);
        let mut byte = [0u8; 1];
        v.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 2);

        assert_eq!(v.seek(SeekFrom::End(-1)).unwrap(), 4);
        v.read_exact(&mut byte).unwrap();
        assert_eq!(byte[0], 6);
    }

    #[test]
    fn reads_clamp_at_window_end() {
        let mut v = VirtualSeeker::with_window(counting_source(10), 0, 4).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(v.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf[..4], &[0, 1, 2, 3]);
        assert_eq!(v.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn seeking_before_window_start_fails() {
        let mut v = VirtualSeeker::with_window(counting_source(10), 4, 0).unwrap();
        assert!(v.seek(SeekFrom::Current(-1)).is_err());
        assert!(v.seek(SeekFrom::End(-7)).is_err());
    }

    #[test]
    fn back_buffer_prepends_chunks() {
        let mut v = VirtualSeeker::new(counting_source(10)).unwrap();
        let mut back = BackBuffer::new(&mut v, 4).unwrap();
        let mut read_pointer = 0;

        assert_eq!(back.read_chunk(&mut v, &mut read_pointer).unwrap(), 4);
        assert_eq!(back.bytes(), &[6, 7, 8, 9]);
        assert_eq!(read_pointer, 4);

        assert_eq!(back.read_chunk(&mut v, &mut read_pointer).unwrap(), 4);
        assert_eq!(back.bytes(), &[2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(read_pointer, 8);

        // Only two bytes left before the window start.
        assert_eq!(back.read_chunk(&mut v, &mut read_pointer).unwrap(), 2);
        assert_eq!(back.bytes()[..4], [0, 1, 2, 3]);
        assert_eq!(back.file_pos(), 0);

        assert_eq!(back.read_chunk(&mut v, &mut read_pointer).unwrap(), 0);
    }
}
