//! Tools for writing a ZIP archive.
//!
//! A [`ZipWriter`] wraps any `Write + Seek` sink. Open an entry with
//! [`start_entry()`](ZipWriter::start_entry), write the entry's bytes
//! into the writer (it implements [`Write`]), and
//! [`finish()`](ZipWriter::finish) once every entry is in:
//!
//! ```no_run
//! # use std::fs::File;
//! # use std::io::Write;
//! # use satchel::entry::FileEntry;
//! # use satchel::write::ZipWriter;
//! let mut writer = ZipWriter::new(File::create("out.zip")?)?;
//! writer.start_entry(FileEntry::new("hello.txt"))?;
//! writer.write_all(b"Hello, World!\n")?;
//! writer.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Each entry gets a placeholder local header, its (possibly deflated)
//! bytes, and then a header rewrite once the CRC and sizes are known;
//! the central directory and end record follow the last entry. All
//! offsets are relative to the sink's position when the writer was
//! created, so an archive can be appended to an existing file and still
//! read back through a window.

use std::io::{self, Seek, SeekFrom, Write};

use crc32fast::Hasher;
use log::*;

use crate::deflate::DeflateWriter;
use crate::entry::{FileEntry, StorageMethod};
use crate::result::*;
use crate::spec;

/// Where an open entry's bytes go
enum EntrySink<W: Write> {
    Deflated(DeflateWriter<W>),
    Stored { sink: W, crc: Hasher, written: u64 },
}

/// A ZIP archive being written
pub struct ZipWriter<W: Write + Seek> {
    /// The sink; `None` while an open entry's filter owns it
    sink: Option<W>,
    /// Absolute sink position where the archive begins
    base: u64,
    entries: Vec<FileEntry>,
    current: Option<(FileEntry, EntrySink<W>)>,
    comment: String,
    finished: bool,
}

impl<W: Write + Seek> ZipWriter<W> {
    /// Starts an archive at the sink's current position.
    pub fn new(mut sink: W) -> ZipResult<Self> {
        let base = sink.stream_position()?;
        Ok(ZipWriter {
            sink: Some(sink),
            base,
            entries: Vec::new(),
            current: None,
            comment: String::new(),
            finished: false,
        })
    }

    /// Sets the archive-wide comment emitted with the end record.
    pub fn set_comment(&mut self, comment: impl Into<String>) -> ZipResult<()> {
        let comment = comment.into();
        if comment.len() > spec::MAX_COMMENT_LENGTH {
            return Err(ZipError::Unsupported("comment longer than 65535 bytes"));
        }
        self.comment = comment;
        Ok(())
    }

    /// Begins writing `entry`; subsequent writes carry its data.
    ///
    /// A still-open previous entry is closed first. The entry's CRC and
    /// sizes needn't be filled in; they're stamped when the entry is
    /// closed and the local header rewritten.
    pub fn start_entry(&mut self, entry: FileEntry) -> ZipResult<()> {
        if self.finished {
            return Err(ZipError::StateError("entry added to a finished archive"));
        }
        if self.current.is_some() {
            self.close_entry()?;
        }
        if let StorageMethod::Unsupported(v) = entry.method() {
            return Err(ZipError::UnsupportedMethod(v));
        }
        // 0xFFFF in the entry-count field is the ZIP64 sentinel,
        // so the last usable count is one less.
        if self.entries.len() >= u16::MAX as usize - 1 {
            return Err(ZipError::Unsupported("too many entries without ZIP64"));
        }

        let mut entry = entry;
        let mut sink = self.sink.take().expect("sink missing with no open entry");
        let offset = sink.stream_position()? - self.base;
        if offset > u32::MAX as u64 {
            self.sink = Some(sink);
            return Err(ZipError::Unsupported("archive too large without ZIP64"));
        }
        entry.entry_offset = offset;
        debug!("Writing {} at offset {}", entry.name(), offset);

        // Placeholder header; the real CRC and sizes land on close.
        let mut local = entry.to_local_header();
        local.crc32 = 0;
        local.compressed_size = 0;
        local.uncompressed_size = 0;
        entry.header_size = local.size_in_file();
        if let Err(e) = local.write(&mut sink) {
            self.sink = Some(sink);
            return Err(e);
        }

        let entry_sink = match entry.method() {
            StorageMethod::Deflated => EntrySink::Deflated(DeflateWriter::new(sink, entry.level())),
            _ => EntrySink::Stored {
                sink,
                crc: Hasher::new(),
                written: 0,
            },
        };
        self.current = Some((entry, entry_sink));
        Ok(())
    }

    /// Finishes the open entry: flushes its filter, rewrites its local
    /// header with the final CRC and sizes, and seeks back to the tail.
    ///
    /// A no-op when no entry is open.
    pub fn close_entry(&mut self) -> ZipResult<()> {
        let (mut entry, entry_sink) = match self.current.take() {
            Some(current) => current,
            None => return Ok(()),
        };

        let (mut sink, crc32, size, compressed_size) = match entry_sink {
            EntrySink::Deflated(filter) => {
                let (sink, summary) = filter.into_inner()?;
                (sink, summary.crc32, summary.size, summary.compressed_size)
            }
            EntrySink::Stored { sink, crc, written } => (sink, crc.finalize(), written, written),
        };
        if size > u32::MAX as u64 || compressed_size > u32::MAX as u64 {
            self.sink = Some(sink);
            return Err(ZipError::Unsupported("entry too large without ZIP64"));
        }
        entry.stamp_written(crc32, compressed_size as u32, size as u32);
        trace!(
            "{}: {} bytes -> {} compressed, CRC {:#010x}",
            entry.name(),
            size,
            compressed_size,
            crc32
        );

        let tail = sink.stream_position()?;
        sink.seek(SeekFrom::Start(self.base + entry.entry_offset))?;
        entry.to_local_header().write(&mut sink)?;
        sink.seek(SeekFrom::Start(tail))?;

        self.entries.push(entry);
        self.sink = Some(sink);
        Ok(())
    }

    /// The entries written so far, in the order they were supplied
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Closes any open entry, then emits the central directory and the
    /// End of central directory record.
    ///
    /// Idempotent; a second call does nothing.
    pub fn finish(&mut self) -> ZipResult<()> {
        if self.finished {
            return Ok(());
        }
        self.close_entry()?;

        let mut sink = self.sink.take().expect("sink missing with no open entry");
        let result = Self::write_directory(&mut sink, self.base, &self.entries, &self.comment);
        self.sink = Some(sink);
        result?;
        self.finished = true;
        Ok(())
    }

    fn write_directory(
        sink: &mut W,
        base: u64,
        entries: &[FileEntry],
        comment: &str,
    ) -> ZipResult<()> {
        let directory_start = sink.stream_position()? - base;
        for entry in entries {
            entry.to_central_record().write(sink)?;
        }
        let directory_size = (sink.stream_position()? - base) - directory_start;
        if directory_start > u32::MAX as u64 || directory_size > u32::MAX as u64 {
            return Err(ZipError::Unsupported("archive too large without ZIP64"));
        }
        debug!(
            "central directory: {} entries, {} bytes at offset {}",
            entries.len(),
            directory_size,
            directory_start
        );

        let eocdr = spec::EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entries.len() as u16,
            entries: entries.len() as u16,
            central_directory_size: directory_size as u32,
            central_directory_offset: directory_start as u32,
            comment: comment.as_bytes().to_vec(),
        };
        eocdr.write(sink)?;
        sink.flush()?;
        Ok(())
    }

    /// Finishes the archive (if nothing has yet) and returns the sink.
    pub fn into_inner(mut self) -> ZipResult<W> {
        self.finish()?;
        Ok(self.sink.take().expect("sink missing after finish"))
    }
}

impl<W: Write + Seek> Write for ZipWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.current {
            None => Err(ZipError::StateError("no open entry to write to").into_io()),
            Some((entry, _)) if entry.is_directory() => {
                Err(ZipError::StateError("data written to a directory entry").into_io())
            }
            Some((_, EntrySink::Deflated(filter))) => filter.write(buf),
            Some((_, EntrySink::Stored { sink, crc, written })) => {
                let count = sink.write(buf)?;
                crc.update(&buf[..count]);
                *written += count as u64;
                Ok(count)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.current {
            Some((_, EntrySink::Deflated(filter))) => filter.flush(),
            Some((_, EntrySink::Stored { sink, .. })) => sink.flush(),
            None => match &mut self.sink {
                Some(sink) => sink.flush(),
                None => Ok(()),
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::entry::MatchPath;
    use crate::read::ZipArchive;
    use std::io::{Cursor, Read};

    #[test]
    fn no_entries_is_just_an_end_record() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.finish().unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();
        assert_eq!(bytes.len(), spec::EOCDR_SIZE);

        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.entries().is_empty());
    }

    #[test]
    fn writes_outside_an_entry_are_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new())).unwrap();
        assert!(writer.write(b"where does this go?").is_err());

        writer.start_entry(FileEntry::new("dir/")).unwrap();
        assert!(
            writer.write(b"dirs hold no data").is_err(),
            "directory entries must reject data"
        );
    }

    #[test]
    fn next_entry_closes_the_previous_one() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.start_entry(FileEntry::new("one.txt")).unwrap();
        writer.write_all(b"first").unwrap();
        // No close_entry() here.
        writer.start_entry(FileEntry::new("two.txt")).unwrap();
        writer.write_all(b"second").unwrap();
        let bytes = writer.into_inner().unwrap().into_inner();

        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = archive.entries().iter().map(|e| e.name().to_owned()).collect();
        assert_eq!(names, ["one.txt", "two.txt"]);

        let mut contents = String::new();
        archive
            .get_input_stream("one.txt", MatchPath::Match)
            .unwrap()
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "first");
    }

    #[test]
    fn finishing_twice_is_fine_but_writing_after_is_not() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        match writer.start_entry(FileEntry::new("late.txt")) {
            Err(ZipError::StateError(_)) => {}
            other => panic!("expected a state error, got {:?}", other),
        }
    }
}
