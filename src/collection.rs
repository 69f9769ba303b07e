//! A uniform view over "a bunch of files you can stream out by name".
//!
//! [`FileCollection`] is the seam: look entries up by full path or by
//! basename, open a decompressing stream for any of them, and don't care
//! whether the bytes come out of a ZIP archive ([`ZipCollection`]), a
//! directory on disk ([`DirectoryCollection`]), or several of those
//! stacked together ([`CompositeCollection`]).

use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use log::*;

use crate::entry::{CompressionLevel, FileEntry, MatchPath, StorageMethod};
use crate::read::{self, ZipArchive};
use crate::result::*;
use crate::seek::VirtualSeeker;

/// An ordered collection of file entries that can be streamed out by name.
///
/// Lookups are linear; when several entries match, the first wins.
/// Entries handed out are references; clone what you keep, so it
/// outlives the collection.
pub trait FileCollection: fmt::Display {
    /// Every entry, in collection order
    fn entries(&self) -> Vec<&FileEntry>;

    /// Every entry, mutably; for attribute sweeps like
    /// [`set_method()`](Self::set_method)
    fn entries_mut(&mut self) -> Vec<&mut FileEntry>;

    /// Looks up an entry by name. Ties go to the first match.
    fn get_entry(&self, name: &str, matching: MatchPath) -> Option<&FileEntry> {
        self.entries()
            .into_iter()
            .find(|e| matching.matches(e, name))
    }

    /// Returns a stream of the named entry's (decompressed) bytes,
    /// or `None` if no entry matches.
    ///
    /// Streams are independent: each holds its own source and cursor,
    /// so several can be read side by side.
    fn get_input_stream(
        &self,
        name: &str,
        matching: MatchPath,
    ) -> ZipResult<Option<Box<dyn Read>>>;

    /// The number of entries
    fn size(&self) -> usize {
        self.entries().len()
    }

    /// The collection's source: a file name, a directory path, or a label
    fn name(&self) -> &str;

    /// False once the collection has been closed
    fn is_valid(&self) -> bool;

    fn must_be_valid(&self) -> ZipResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ZipError::StateError("collection is closed"))
        }
    }

    /// Releases the collection's source. A second close is a no-op.
    fn close(&mut self);

    /// A deep, independent copy behind a fresh box
    fn clone_collection(&self) -> Box<dyn FileCollection>;

    /// Sets every entry's storage method by size threshold: entries
    /// smaller than `limit` get `small_method`, the rest `large_method`.
    /// Directories always stay STORED.
    fn set_method(&mut self, limit: u32, small_method: StorageMethod, large_method: StorageMethod) {
        for entry in self.entries_mut() {
            if entry.is_directory() {
                continue;
            }
            let method = if entry.size() < limit {
                small_method
            } else {
                large_method
            };
            entry.set_method(method);
        }
    }

    /// Sets every entry's compression level by size threshold, like
    /// [`set_method()`](Self::set_method).
    /// Directories always get no compression.
    fn set_level(&mut self, limit: u32, small_level: CompressionLevel, large_level: CompressionLevel) {
        for entry in self.entries_mut() {
            if entry.is_directory() {
                entry.set_level(CompressionLevel::None);
                continue;
            }
            let level = if entry.size() < limit {
                small_level
            } else {
                large_level
            };
            entry.set_level(level);
        }
    }
}

/// A collection backed by a ZIP archive on disk.
///
/// The archive's central directory is parsed once at open. Each call to
/// [`get_input_stream()`](FileCollection::get_input_stream) reopens the
/// file, so every stream gets an independent cursor and inflate state.
#[derive(Clone)]
pub struct ZipCollection {
    path: Utf8PathBuf,
    start: u64,
    end_offset: i64,
    comment: String,
    entries: Vec<FileEntry>,
    valid: bool,
}

impl ZipCollection {
    /// Opens the ZIP archive at `path`.
    pub fn open(path: impl AsRef<Utf8Path>) -> ZipResult<Self> {
        Self::open_window(path, 0, 0)
    }

    /// Opens a ZIP archive embedded at `[start, end_offset]` of the file
    /// at `path`, with window bounds as in
    /// [`ZipArchive::with_window()`](crate::read::ZipArchive::with_window).
    pub fn open_window(
        path: impl AsRef<Utf8Path>,
        start: u64,
        end_offset: i64,
    ) -> ZipResult<Self> {
        let path = path.as_ref().to_owned();
        let archive = ZipArchive::with_window(File::open(&path)?, start, end_offset)?;
        let entries = archive.entries().to_vec();
        let comment = archive.comment().to_owned();
        debug!("opened {} with {} entries", path, entries.len());
        Ok(ZipCollection {
            path,
            start,
            end_offset,
            comment,
            entries,
            valid: true,
        })
    }

    /// The archive-wide comment
    pub fn comment(&self) -> &str {
        &self.comment
    }
}

impl FileCollection for ZipCollection {
    fn entries(&self) -> Vec<&FileEntry> {
        self.entries.iter().collect()
    }

    fn entries_mut(&mut self) -> Vec<&mut FileEntry> {
        self.entries.iter_mut().collect()
    }

    fn get_input_stream(
        &self,
        name: &str,
        matching: MatchPath,
    ) -> ZipResult<Option<Box<dyn Read>>> {
        self.must_be_valid()?;
        let entry = match self.entries.iter().find(|e| matching.matches(e, name)) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        let source =
            VirtualSeeker::with_window(File::open(&self.path)?, self.start, self.end_offset)?;
        let (stream, _) = read::open_entry_stream(source, &entry)?;
        Ok(Some(stream))
    }

    fn name(&self) -> &str {
        self.path.as_str()
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn close(&mut self) {
        self.valid = false;
    }

    fn clone_collection(&self) -> Box<dyn FileCollection> {
        Box::new(self.clone())
    }
}

impl fmt::Display for ZipCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZIP collection {} ({} entries)", self.path, self.entries.len())
    }
}

/// A collection backed by a directory tree on disk.
///
/// Entries are enumerated breadth-first at open: each directory's
/// children (sorted by name) are listed in full before any subdirectory
/// is descended into. Entry names are relative to the root, `/`-separated,
/// with directories carrying a trailing `/`.
///
/// Sizes, times, and methods come from the filesystem, so mutating them
/// on these entries is silently ignored; comments and timestamps stick.
#[derive(Clone)]
pub struct DirectoryCollection {
    root: Utf8PathBuf,
    entries: Vec<FileEntry>,
    valid: bool,
}

impl DirectoryCollection {
    /// Enumerates `root` and everything below it.
    pub fn new(root: impl AsRef<Utf8Path>) -> ZipResult<Self> {
        Self::with_recursion(root, true)
    }

    /// Enumerates `root`; descends into subdirectories only if `recursive`.
    /// (Subdirectories themselves get entries either way.)
    pub fn with_recursion(root: impl AsRef<Utf8Path>, recursive: bool) -> ZipResult<Self> {
        let root = root.as_ref().to_owned();
        if !root.is_dir() {
            return Err(ZipError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{root} is not a directory"),
            )));
        }
        let entries = enumerate(&root, recursive)?;
        debug!("enumerated {} entries under {}", entries.len(), root);
        Ok(DirectoryCollection {
            root,
            entries,
            valid: true,
        })
    }
}

/// Breadth-first enumeration: a queue of directories to list,
/// each listed in name order before the next is popped.
fn enumerate(root: &Utf8Path, recursive: bool) -> ZipResult<Vec<FileEntry>> {
    let mut entries = Vec::new();
    let mut frontier: VecDeque<(Utf8PathBuf, String)> =
        VecDeque::from([(root.to_owned(), String::new())]);

    while let Some((dir, prefix)) = frontier.pop_front() {
        let mut children = Vec::new();
        for child in dir.read_dir_utf8()? {
            children.push(child?.into_path());
        }
        children.sort();

        for child in children {
            let child_name = match child.file_name() {
                Some(name) => name,
                None => continue,
            };
            let metadata = std::fs::metadata(&child)?;
            if metadata.is_dir() {
                let name = format!("{prefix}{child_name}/");
                entries.push(FileEntry::from_path_as(&child, name.as_str())?);
                if recursive {
                    frontier.push_back((child, name));
                }
            } else if metadata.is_file() {
                entries.push(FileEntry::from_path_as(&child, format!("{prefix}{child_name}"))?);
            } else {
                warn!("skipping {child}: neither a file nor a directory");
            }
        }
    }
    Ok(entries)
}

impl FileCollection for DirectoryCollection {
    fn entries(&self) -> Vec<&FileEntry> {
        self.entries.iter().collect()
    }

    fn entries_mut(&mut self) -> Vec<&mut FileEntry> {
        self.entries.iter_mut().collect()
    }

    fn get_input_stream(
        &self,
        name: &str,
        matching: MatchPath,
    ) -> ZipResult<Option<Box<dyn Read>>> {
        self.must_be_valid()?;
        let entry = match self.entries.iter().find(|e| matching.matches(e, name)) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if entry.is_directory() {
            return Ok(Some(Box::new(io::empty())));
        }
        let file = File::open(self.root.join(entry.name()))?;
        Ok(Some(Box::new(file)))
    }

    fn name(&self) -> &str {
        self.root.as_str()
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn close(&mut self) {
        self.valid = false;
    }

    fn clone_collection(&self) -> Box<dyn FileCollection> {
        Box::new(self.clone())
    }
}

impl fmt::Display for DirectoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "directory collection {} ({} entries)",
            self.root,
            self.entries.len()
        )
    }
}

/// An ordered stack of collections presented as one.
///
/// `entries()` concatenates the children's entries in order; lookups
/// return the first hit across children, so an earlier collection
/// shadows a later one for overlapping names.
pub struct CompositeCollection {
    name: String,
    children: Vec<Box<dyn FileCollection>>,
    valid: bool,
}

impl CompositeCollection {
    pub fn new() -> Self {
        Self::named("")
    }

    pub fn named(name: impl Into<String>) -> Self {
        CompositeCollection {
            name: name.into(),
            children: Vec::new(),
            valid: true,
        }
    }

    /// Appends a collection to the stack.
    pub fn push(&mut self, child: Box<dyn FileCollection>) {
        self.children.push(child);
    }
}

impl Default for CompositeCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for CompositeCollection {
    fn clone(&self) -> Self {
        CompositeCollection {
            name: self.name.clone(),
            children: self.children.iter().map(|c| c.clone_collection()).collect(),
            valid: self.valid,
        }
    }
}

impl FileCollection for CompositeCollection {
    fn entries(&self) -> Vec<&FileEntry> {
        self.children.iter().flat_map(|c| c.entries()).collect()
    }

    fn entries_mut(&mut self) -> Vec<&mut FileEntry> {
        self.children
            .iter_mut()
            .flat_map(|c| c.entries_mut())
            .collect()
    }

    fn get_input_stream(
        &self,
        name: &str,
        matching: MatchPath,
    ) -> ZipResult<Option<Box<dyn Read>>> {
        self.must_be_valid()?;
        for child in &self.children {
            if child.get_entry(name, matching).is_some() {
                return child.get_input_stream(name, matching);
            }
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn close(&mut self) {
        for child in &mut self.children {
            child.close();
        }
        self.valid = false;
    }

    fn clone_collection(&self) -> Box<dyn FileCollection> {
        Box::new(self.clone())
    }
}

impl fmt::Display for CompositeCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stack of {} collections", self.children.len())?;
        for child in &self.children {
            write!(f, "\n  {child}")?;
        }
        Ok(())
    }
}
