//! Metadata for the files and directories inside an archive or collection.
//!
//! A [`FileEntry`] is created three ways: by hand for archives being
//! written, by probing the filesystem, or by parsing a central directory
//! record. The writer stamps sizes, offsets, and the CRC back into the
//! entry once the data has gone through compression.

use std::time::{SystemTime, UNIX_EPOCH};

use camino::Utf8Path;
use flate2::Compression;

use crate::dostime;
use crate::result::*;
use crate::spec::{self, CentralDirectoryRecord, LocalFileHeader};

/// How an entry's bytes are stored in a ZIP archive
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StorageMethod {
    /// The bytes are uncompressed
    Stored,
    /// The bytes are [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflated,
    /// Some yet-unsupported method.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl StorageMethod {
    pub(crate) fn from_u16(u: u16) -> Self {
        match u {
            0 => StorageMethod::Stored,
            8 => StorageMethod::Deflated,
            v => StorageMethod::Unsupported(v),
        }
    }

    pub(crate) fn as_u16(self) -> u16 {
        match self {
            StorageMethod::Stored => 0,
            StorageMethod::Deflated => 8,
            StorageMethod::Unsupported(v) => v,
        }
    }
}

/// How hard the deflate filter should squeeze an entry.
///
/// The named levels plus a percentage-ish scale from 1 (fastest)
/// to 100 (smallest), mapped linearly onto zlib's 1 to 9.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Whatever the codec library considers a good tradeoff
    Default,
    /// Best compression, most CPU
    Smallest,
    /// Least CPU, still a DEFLATE stream
    Fastest,
    /// No compression at all
    None,
    /// A specific setting on the 1..=100 scale.
    /// Build with [`CompressionLevel::precise()`] to keep it in range.
    Precise(u8),
}

impl CompressionLevel {
    /// Checks a 1..=100 compression level
    pub fn precise(level: i32) -> ZipResult<Self> {
        match level {
            1..=100 => Ok(CompressionLevel::Precise(level as u8)),
            bad => Err(ZipError::InvalidLevel(bad)),
        }
    }

    /// Converts from the numeric encoding:
    /// -1 is default, -2 smallest, -3 fastest, 0 none, 1..=100 precise.
    pub fn from_raw(level: i32) -> ZipResult<Self> {
        match level {
            -1 => Ok(CompressionLevel::Default),
            -2 => Ok(CompressionLevel::Smallest),
            -3 => Ok(CompressionLevel::Fastest),
            0 => Ok(CompressionLevel::None),
            other => Self::precise(other),
        }
    }

    /// The zlib level this maps to
    pub(crate) fn to_zlib(self) -> Compression {
        match self {
            CompressionLevel::Default => Compression::default(),
            CompressionLevel::Smallest => Compression::best(),
            CompressionLevel::Fastest => Compression::new(1),
            CompressionLevel::None => Compression::none(),
            // 1..=100 onto 1..=9, linearly
            CompressionLevel::Precise(n) => Compression::new(((n as u32 - 1) * 8 + 5) / 99 + 1),
        }
    }
}

/// How entry names are compared during lookups
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchPath {
    /// Compare the full logical path: `c.txt` does not match `a/c.txt`
    Match,
    /// Strip leading directories and compare basenames:
    /// `c.txt` matches `a/c.txt`
    Ignore,
}

impl MatchPath {
    pub(crate) fn matches(self, entry: &FileEntry, name: &str) -> bool {
        match self {
            MatchPath::Match => entry.name == name,
            MatchPath::Ignore => entry.file_name() == name,
        }
    }
}

/// Metadata for one member of an archive or collection
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub(crate) name: String,
    pub(crate) comment: String,
    pub(crate) size: u32,
    pub(crate) compressed_size: u32,
    pub(crate) crc32: u32,
    pub(crate) has_crc: bool,
    pub(crate) method: StorageMethod,
    pub(crate) level: CompressionLevel,
    pub(crate) dos_time: u32,
    pub(crate) extra: Vec<u8>,
    /// Offset of the local file header, relative to the archive window
    pub(crate) entry_offset: u64,
    /// Size of the local header, cached when it's parsed
    pub(crate) header_size: u64,
    /// True for entries enumerated from a directory on disk,
    /// whose stat-derived attributes shouldn't be overwritten
    pub(crate) from_directory: bool,
    pub(crate) encrypted: bool,
}

impl FileEntry {
    /// Creates an entry with the given archive path.
    ///
    /// A trailing `/` makes it a directory entry.
    /// The timestamp starts as "now"; everything else starts empty.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let method = if name.ends_with('/') {
            StorageMethod::Stored
        } else {
            StorageMethod::Deflated
        };
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        FileEntry {
            name,
            comment: String::new(),
            size: 0,
            compressed_size: 0,
            crc32: 0,
            has_crc: false,
            method,
            level: CompressionLevel::Default,
            dos_time: dostime::unix_to_dos(now),
            extra: Vec::new(),
            entry_offset: 0,
            header_size: 0,
            from_directory: false,
            encrypted: false,
        }
    }

    /// Creates an entry by probing the filesystem,
    /// using the path itself as the entry name.
    pub fn from_path(path: &Utf8Path) -> ZipResult<Self> {
        Self::from_path_as(path, path.as_str())
    }

    /// Creates an entry by probing the filesystem,
    /// named `name` instead of the path probed.
    pub fn from_path_as(path: &Utf8Path, name: impl Into<String>) -> ZipResult<Self> {
        let metadata = std::fs::metadata(path)?;
        let mut name = name.into();
        if metadata.is_dir() && !name.ends_with('/') {
            name.push('/');
        }

        let size = if metadata.is_dir() {
            0
        } else if metadata.len() > u32::MAX as u64 {
            return Err(ZipError::Unsupported("file too large without ZIP64"));
        } else {
            metadata.len() as u32
        };

        let mtime = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut entry = FileEntry::new(name);
        entry.size = size;
        entry.compressed_size = size;
        entry.method = StorageMethod::Stored;
        entry.dos_time = dostime::unix_to_dos(mtime);
        entry.from_directory = true;
        Ok(entry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last component of the entry's path,
    /// e.g. `c.txt` for `a/b/c.txt` and `b` for `a/b/`
    pub fn file_name(&self) -> &str {
        self.name
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Uncompressed size in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Compressed size in bytes; same as [`size()`](Self::size) for STORED
    pub fn compressed_size(&self) -> u32 {
        self.compressed_size
    }

    /// CRC-32 of the uncompressed bytes.
    /// Only authoritative once [`has_crc()`](Self::has_crc) says so.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn has_crc(&self) -> bool {
        self.has_crc
    }

    pub fn method(&self) -> StorageMethod {
        self.method
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// The packed MS-DOS modification timestamp
    pub fn dos_time(&self) -> u32 {
        self.dos_time
    }

    /// The modification time in Unix seconds,
    /// or `None` if the packed fields are nonsense
    pub fn unix_time(&self) -> Option<i64> {
        dostime::dos_to_unix(self.dos_time)
    }

    pub fn extra(&self) -> &[u8] {
        &self.extra
    }

    /// True iff the name ends in `/`
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }

    pub(crate) fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Offset of this entry's local header within the archive
    pub fn entry_offset(&self) -> u64 {
        self.entry_offset
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    /// Entries probed from a directory on disk keep their stat-derived
    /// attributes: for those, and for directory entries themselves, this
    /// is silently ignored.
    pub fn set_size(&mut self, size: u32) {
        if self.attributes_frozen() {
            return;
        }
        self.size = size;
    }

    /// Same caveats as [`set_size()`](Self::set_size)
    pub fn set_compressed_size(&mut self, size: u32) {
        if self.attributes_frozen() {
            return;
        }
        self.compressed_size = size;
    }

    /// Same caveats as [`set_size()`](Self::set_size)
    pub fn set_crc32(&mut self, crc: u32) {
        if self.attributes_frozen() {
            return;
        }
        self.crc32 = crc;
        self.has_crc = true;
    }

    /// Same caveats as [`set_size()`](Self::set_size)
    pub fn set_method(&mut self, method: StorageMethod) {
        if self.attributes_frozen() {
            return;
        }
        self.method = method;
    }

    /// The extra field isn't pinned by the directory invariant, so this
    /// is ignored only for entries probed from a directory on disk.
    pub fn set_extra(&mut self, extra: Vec<u8>) {
        if self.from_directory {
            return;
        }
        self.extra = extra;
    }

    pub fn set_level(&mut self, level: CompressionLevel) {
        self.level = level;
    }

    pub fn set_dos_time(&mut self, dos_time: u32) {
        self.dos_time = dos_time;
    }

    pub fn set_unix_time(&mut self, t: i64) {
        self.dos_time = dostime::unix_to_dos(t);
    }

    /// Sizes, CRC, and method are pinned both for directory entries
    /// (which must stay empty and STORED) and for entries probed from a
    /// directory on disk (whose values come from stat).
    fn attributes_frozen(&self) -> bool {
        self.from_directory || self.is_directory()
    }

    /// The writer's back-door for recording what actually got written;
    /// user-level setters stay guarded.
    pub(crate) fn stamp_written(&mut self, crc: u32, compressed_size: u32, size: u32) {
        self.crc32 = crc;
        self.has_crc = true;
        self.compressed_size = compressed_size;
        self.size = size;
    }

    /// Builds an entry from a central directory record.
    pub(crate) fn from_central_record(cdr: &CentralDirectoryRecord) -> ZipResult<Self> {
        // 0xFFFFFFFF here means "look in the Zip64 extra field".
        if cdr.compressed_size == u32::MAX
            || cdr.uncompressed_size == u32::MAX
            || cdr.header_offset == u32::MAX
        {
            return Err(ZipError::Unsupported("ZIP64 archives"));
        }
        let utf8 = spec::is_utf8(cdr.flags);
        Ok(FileEntry {
            name: spec::decode_text(&cdr.name, utf8)?,
            comment: spec::decode_text(&cdr.comment, utf8)?,
            size: cdr.uncompressed_size,
            compressed_size: cdr.compressed_size,
            crc32: cdr.crc32,
            has_crc: true,
            method: StorageMethod::from_u16(cdr.method),
            level: CompressionLevel::Default,
            dos_time: cdr.dos_time,
            extra: cdr.extra.clone(),
            entry_offset: cdr.header_offset as u64,
            header_size: 0,
            from_directory: false,
            encrypted: spec::is_encrypted(cdr.flags),
        })
    }

    pub(crate) fn to_central_record(&self) -> CentralDirectoryRecord {
        CentralDirectoryRecord {
            source_version: spec::VERSION_MADE_BY,
            minimum_extract_version: spec::VERSION_NEEDED,
            flags: spec::flags_for(&self.name, &self.comment),
            method: self.method.as_u16(),
            dos_time: self.dos_time,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.size,
            disk_number: 0,
            internal_attributes: 0,
            external_attributes: if self.is_directory() {
                spec::DIRECTORY_ATTRIBUTES
            } else {
                spec::FILE_ATTRIBUTES
            },
            header_offset: self.entry_offset as u32,
            name: self.name.as_bytes().to_vec(),
            extra: self.extra.clone(),
            comment: self.comment.as_bytes().to_vec(),
        }
    }

    pub(crate) fn to_local_header(&self) -> LocalFileHeader {
        LocalFileHeader {
            minimum_extract_version: spec::VERSION_NEEDED,
            flags: spec::flags_for(&self.name, &self.comment),
            method: self.method.as_u16(),
            dos_time: self.dos_time,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.size,
            name: self.name.as_bytes().to_vec(),
            extra: self.extra.clone(),
        }
    }
}

/// Entries compare by what they describe (name, comment, sizes, CRC,
/// method, timestamp, extra field), not by where they came from or how
/// they'll be compressed.
impl PartialEq for FileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.comment == other.comment
            && self.size == other.size
            && self.compressed_size == other.compressed_size
            && self.crc32 == other.crc32
            && self.method == other.method
            && self.dos_time == other.dos_time
            && self.extra == other.extra
    }
}

impl Eq for FileEntry {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn level_range_is_enforced() {
        assert!(CompressionLevel::precise(1).is_ok());
        assert!(CompressionLevel::precise(100).is_ok());
        for bad in [-4, -5, 101, 1000] {
            match CompressionLevel::from_raw(bad) {
                Err(ZipError::InvalidLevel(l)) => assert_eq!(l, bad),
                other => panic!("level {} gave {:?}", bad, other),
            }
        }
    }

    #[test]
    fn precise_levels_map_onto_zlib() {
        let zlib = |l: i32| CompressionLevel::precise(l).unwrap().to_zlib().level();
        assert_eq!(zlib(1), 1);
        assert_eq!(zlib(50), 5);
        assert_eq!(zlib(100), 9);
        assert_eq!(CompressionLevel::None.to_zlib().level(), 0);
        assert_eq!(CompressionLevel::Smallest.to_zlib().level(), 9);
        assert_eq!(CompressionLevel::Fastest.to_zlib().level(), 1);
    }

    #[test]
    fn equality_ignores_bookkeeping() {
        let mut a = FileEntry::new("a.txt");
        a.set_dos_time(0x0021_0000);
        let mut b = a.clone();
        assert_eq!(a, b);

        b.level = CompressionLevel::Smallest;
        b.entry_offset = 42;
        b.has_crc = true;
        assert_eq!(a, b);

        b.set_comment("changed");
        assert_ne!(a, b);
    }

    #[test]
    fn clones_share_no_state() {
        let mut original = FileEntry::new("data.bin");
        original.set_extra(vec![1, 2, 3]);
        let mut copy = original.clone();
        copy.set_name("other.bin");
        copy.set_extra(vec![9]);
        assert_eq!(original.name(), "data.bin");
        assert_eq!(original.extra(), [1, 2, 3]);
    }

    #[test]
    fn directory_entries_pin_their_attributes() {
        let mut dir = FileEntry::new("assets/");
        assert!(dir.is_directory());
        assert_eq!(dir.method(), StorageMethod::Stored);

        dir.set_size(10);
        dir.set_crc32(0xBAD);
        dir.set_method(StorageMethod::Deflated);
        assert_eq!(dir.size(), 0);
        assert_eq!(dir.crc32(), 0);
        assert!(!dir.has_crc());
        assert_eq!(dir.method(), StorageMethod::Stored);

        // The extra field isn't part of the directory invariant,
        // so on a hand-built entry it mutates like the comment does.
        dir.set_extra(vec![1]);
        assert_eq!(dir.extra(), [1]);

        // Comment and time stay mutable.
        dir.set_comment("art goes here");
        dir.set_unix_time(crate::dostime::MIN_UNIX_TIME);
        assert_eq!(dir.comment(), "art goes here");
        assert_eq!(dir.dos_time(), 0x0021_0000);
    }

    #[test]
    fn probed_entries_keep_stat_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probed.txt");
        std::fs::write(&path, "12345").unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(path).unwrap();

        let mut entry = FileEntry::from_path_as(&path, "probed.txt").unwrap();
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.method(), StorageMethod::Stored);

        entry.set_size(99);
        entry.set_compressed_size(99);
        entry.set_crc32(0xBAD);
        entry.set_method(StorageMethod::Deflated);
        entry.set_extra(vec![7]);
        assert_eq!(entry.size(), 5);
        assert_eq!(entry.compressed_size(), 5);
        assert!(!entry.has_crc());
        assert_eq!(entry.method(), StorageMethod::Stored);
        assert!(entry.extra().is_empty());

        entry.set_comment("still mutable");
        assert_eq!(entry.comment(), "still mutable");
    }

    #[test]
    fn file_names_strip_parent_directories() {
        assert_eq!(FileEntry::new("a/b/c.txt").file_name(), "c.txt");
        assert_eq!(FileEntry::new("a/b/").file_name(), "b");
        assert_eq!(FileEntry::new("top.txt").file_name(), "top.txt");
    }
}
