//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, first create a [`ZipArchive`] from any
//! seekable byte source: a [`File`](std::fs::File), a
//! [`Cursor`](std::io::Cursor) over bytes in memory, whatever implements
//! `Read + Seek`. An archive embedded in a larger file (say, behind a
//! self-extracting stub) is opened with
//! [`ZipArchive::with_window()`] and reads identically to a standalone one.
//!
//! [`ZipArchive`]: struct.ZipArchive.html
//! [`ZipArchive::with_window()`]: struct.ZipArchive.html#method.with_window

use std::io::{self, Read, Seek, SeekFrom};

use log::*;
use memchr::memmem;

use crate::arch::usize;
use crate::crc_reader::Crc32Reader;
use crate::entry::{FileEntry, MatchPath, StorageMethod};
use crate::inflate::InflateReader;
use crate::result::*;
use crate::seek::{BackBuffer, VirtualSeeker, BACK_BUFFER_CHUNK};
use crate::spec;

/// A ZIP archive to be read
pub struct ZipArchive<R: Read + Seek> {
    /// The archive source, windowed so position 0 is the archive start
    source: VirtualSeeker<R>,
    /// A list of entries from the ZIP's central directory
    entries: Vec<FileEntry>,
    /// The archive-wide comment from the End of central directory record
    comment: String,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Reads a ZIP archive that spans the whole source.
    ///
    /// ```no_run
    /// # use std::fs::File;
    /// # use satchel::read::ZipArchive;
    /// let archive = ZipArchive::new(File::open("foo.zip")?)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(source: R) -> ZipResult<Self> {
        Self::with_window(source, 0, 0)
    }

    /// Reads a ZIP archive occupying `[start, end_offset]` of the source.
    ///
    /// Since a ZIP archive's metadata sits at the back of the file and
    /// refers to offsets from its front, many formats consist of ZIP
    /// archives embedded in some larger file; a self-extracting archive
    /// is one with an executable up front. The window makes the embedded
    /// archive indistinguishable from a standalone one.
    ///
    /// A positive `end_offset` is an absolute position in the source;
    /// zero or negative counts back from the source's physical end.
    pub fn with_window(source: R, start: u64, end_offset: i64) -> ZipResult<Self> {
        let mut source = VirtualSeeker::with_window(source, start, end_offset)?;
        let (eocdr, eocdr_pos) = find_eocdr(&mut source)?;
        trace!("{:?} at virtual offset {}", eocdr, eocdr_pos);

        if eocdr.is_zip64() {
            return Err(ZipError::Unsupported("ZIP64 archives"));
        }
        if eocdr.disk_number != eocdr.disk_with_central_directory
            || eocdr.entries != eocdr.entries_on_this_disk
        {
            return Err(ZipError::Unsupported("multi-disk archives"));
        }

        let cd_offset = eocdr.central_directory_offset as u64;
        let cd_size = eocdr.central_directory_size as u64;
        if cd_offset + cd_size > eocdr_pos {
            return Err(ZipError::Malformed(
                "central directory runs past its end record",
            ));
        }

        source.seek(SeekFrom::Start(cd_offset))?;
        let mut cd_bytes = vec![0u8; usize(cd_size)?];
        spec::read_exact_or_short(&mut source, &mut cd_bytes)?;

        let mut remaining = &cd_bytes[..];
        let mut entries = Vec::with_capacity(eocdr.entries as usize);
        for _ in 0..eocdr.entries {
            let record = spec::CentralDirectoryRecord::parse_and_consume(&mut remaining)?;
            trace!("{:?}", record);
            if record.disk_number != 0 {
                return Err(ZipError::Unsupported("multi-disk archives"));
            }
            let entry = FileEntry::from_central_record(&record)?;
            debug!("{:?}", entry);
            entries.push(entry);
        }

        let comment = spec::decode_text(&eocdr.comment, false)?;
        Ok(ZipArchive {
            source,
            entries,
            comment,
        })
    }

    /// Returns the entries found in the ZIP archive's central directory,
    /// in central-directory order.
    ///
    /// No effort is made to deduplicate or otherwise validate them.
    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// The archive-wide comment; empty if there wasn't one
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Looks an entry up by name.
    /// Ties go to the entry earliest in the central directory.
    pub fn get_entry(&self, name: &str, matching: MatchPath) -> Option<&FileEntry> {
        self.entries.iter().find(|e| matching.matches(e, name))
    }

    /// Returns a decompressing stream for the named entry,
    /// or `None` if no entry matches.
    ///
    /// The stream checks the bytes it yields against the central
    /// directory's CRC-32 and length, failing at end of stream if either
    /// disagrees.
    pub fn get_input_stream(
        &mut self,
        name: &str,
        matching: MatchPath,
    ) -> ZipResult<Option<Box<dyn Read + '_>>> {
        let index = match self.entries.iter().position(|e| matching.matches(e, name)) {
            Some(i) => i,
            None => return Ok(None),
        };
        let entry = self.entries[index].clone();
        debug!("Reading {:?}", entry);
        let (stream, header_size) = open_entry_stream(&mut self.source, &entry)?;
        self.entries[index].header_size = header_size;
        Ok(Some(stream))
    }

    /// Reads the given entry.
    ///
    /// The entry was usually cloned out of [`entries()`](Self::entries);
    /// since the stream borrows the archive, a reference into that list
    /// can't be held across this call.
    pub fn read(&mut self, entry: &FileEntry) -> ZipResult<Box<dyn Read + '_>> {
        debug!("Reading {:?}", entry);
        let (stream, _) = open_entry_stream(&mut self.source, entry)?;
        Ok(stream)
    }

    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }
}

/// Seeks to an entry's local header, validates it, and returns a
/// decompressing stream over the entry's data plus the header's size.
///
/// The source is anything positioned in archive coordinates: the
/// reader's own window (by `&mut`), or a freshly opened window when the
/// stream must own its source.
pub(crate) fn open_entry_stream<'a, V: Read + Seek + 'a>(
    mut source: V,
    entry: &FileEntry,
) -> ZipResult<(Box<dyn Read + 'a>, u64)> {
    if entry.is_encrypted() {
        return Err(ZipError::Unsupported("encrypted entries"));
    }
    source.seek(SeekFrom::Start(entry.entry_offset()))?;
    let local = spec::LocalFileHeader::read_from(&mut source)?;
    trace!("{:?}", local);
    if local.method != entry.method().as_u16() {
        warn!(
            "local header method disagrees with the central directory for {}",
            entry.name()
        );
    }

    // The header read leaves us at the entry's first data byte.
    let header_size = local.size_in_file();

    // Directories and zero-byte files carry no payload at all, not even
    // a DEFLATE empty-stream marker, so don't ask the codec to find one.
    if entry.compressed_size() == 0 {
        let empty = Crc32Reader::new(io::empty(), entry.crc32(), entry.size() as u64);
        return Ok((Box::new(empty), header_size));
    }

    let limited = source.take(entry.compressed_size() as u64);
    let reader = make_reader(entry.method(), entry.crc32(), entry.size() as u64, limited)?;
    Ok((reader, header_size))
}

/// Returns a boxed read trait for a compressed stream, given its
/// storage method, expected CRC, and expected decompressed length.
fn make_reader<'a, R: Read + 'a>(
    method: StorageMethod,
    crc32: u32,
    size: u64,
    reader: R,
) -> ZipResult<Box<dyn Read + 'a>> {
    match method {
        StorageMethod::Stored => Ok(Box::new(Crc32Reader::new(reader, crc32, size))),
        StorageMethod::Deflated => Ok(Box::new(Crc32Reader::new(
            InflateReader::new(reader),
            crc32,
            size,
        ))),
        StorageMethod::Unsupported(v) => Err(ZipError::UnsupportedMethod(v)),
    }
}

/// Searches backward from the window's end for the End of central
/// directory record.
///
/// It should be right at the end of the file, but its variable-length
/// comment means we can't jump to a known offset. And a stray copy of
/// its signature can appear *inside* a comment, so every candidate's
/// declared central directory location is checked before we commit.
/// The last candidate that holds up wins.
fn find_eocdr<S: Read + Seek>(
    source: &mut VirtualSeeker<S>,
) -> ZipResult<(spec::EndOfCentralDirectory, u64)> {
    let mut back = BackBuffer::new(source, BACK_BUFFER_CHUNK)?;
    let mut read_pointer = 0usize;
    loop {
        let got = back.read_chunk(source, &mut read_pointer)?;
        if got == 0 {
            // Reached the window start without a match.
            return Err(ZipError::NotAZip);
        }

        // Scan the fresh chunk, plus enough overlap that a signature
        // straddling the chunk boundary is seen.
        let buf = back.bytes();
        let scan_end = (got + spec::EOCDR_MAGIC.len() - 1).min(buf.len());
        for pos in memmem::rfind_iter(&buf[..scan_end], &spec::EOCDR_MAGIC) {
            let eocdr = match spec::EndOfCentralDirectory::parse(&buf[pos..]) {
                Ok(eocdr) => eocdr,
                // Truncated or nonsense: a false signature.
                Err(_) => continue,
            };
            let eocdr_pos = back.file_pos() + pos as u64;
            if candidate_checks_out(source, &eocdr, eocdr_pos)? {
                return Ok((eocdr, eocdr_pos));
            }
            trace!("rejecting EOCDR candidate at {}", eocdr_pos);
        }

        // An EOCDR can't start farther back than its fixed size plus the
        // longest possible comment.
        if back.bytes().len() >= spec::EOCDR_SIZE + spec::MAX_COMMENT_LENGTH {
            return Err(ZipError::NotAZip);
        }
    }
}

/// True if the candidate looks like the archive's real end record:
/// its comment runs exactly to the window's end, and the central
/// directory it declares sits inside the window, ends at the candidate,
/// and starts with a central directory signature (unless the archive is
/// empty). A signature embedded in a comment fails one of these.
fn candidate_checks_out<S: Read + Seek>(
    source: &mut VirtualSeeker<S>,
    eocdr: &spec::EndOfCentralDirectory,
    eocdr_pos: u64,
) -> ZipResult<bool> {
    let record_end = eocdr_pos + (spec::EOCDR_SIZE + eocdr.comment.len()) as u64;
    if record_end != source.window_len() {
        return Ok(false);
    }
    let cd_offset = eocdr.central_directory_offset as u64;
    let cd_size = eocdr.central_directory_size as u64;
    if cd_offset + cd_size > eocdr_pos {
        return Ok(false);
    }
    if eocdr.entries == 0 {
        return Ok(cd_size == 0);
    }
    source.seek(SeekFrom::Start(cd_offset))?;
    let mut magic = [0u8; 4];
    if spec::read_exact_or_short(source, &mut magic).is_err() {
        return Ok(false);
    }
    Ok(magic == spec::CENTRAL_DIRECTORY_MAGIC)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    fn empty_archive_with_comment(comment: &[u8]) -> Vec<u8> {
        let eocdr = spec::EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: 0,
            entries: 0,
            central_directory_size: 0,
            central_directory_offset: 0,
            comment: comment.to_vec(),
        };
        let mut bytes = Vec::new();
        eocdr.write(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn empty_archive_parses() {
        let bytes = empty_archive_with_comment(b"nothing to see here");
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert!(archive.entries().is_empty());
        assert_eq!(archive.comment(), "nothing to see here");
    }

    #[test]
    fn garbage_is_not_a_zip() {
        let bytes = vec![0x2a; 4096];
        match ZipArchive::new(Cursor::new(bytes)) {
            Err(ZipError::NotAZip) => {}
            other => panic!("expected NotAZip, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn empty_source_is_not_a_zip() {
        match ZipArchive::new(Cursor::new(Vec::new())) {
            Err(ZipError::NotAZip) => {}
            other => panic!("expected NotAZip, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn eocdr_found_across_chunk_boundaries() {
        // Pad the comment so the signature straddles the 1 KiB chunks
        // the back buffer reads.
        for comment_length in [BACK_BUFFER_CHUNK - 2, BACK_BUFFER_CHUNK + 2] {
            let bytes = empty_archive_with_comment(&vec![b'x'; comment_length]);
            let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
            assert!(archive.entries().is_empty());
        }
    }
}
