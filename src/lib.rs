//! satchel reads and writes ZIP archives, and offers one "collection of
//! files" view over ZIP archives, directories on disk, and stacks of
//! either:
//!
//! ```no_run
//! # use std::io::Read;
//! # use satchel::{FileCollection, MatchPath, ZipCollection};
//! let archive = ZipCollection::open("foo.zip")?;
//! for entry in archive.entries() {
//!     println!("{}: {} bytes", entry.name(), entry.size());
//! }
//!
//! // Streams decompress as they're read, and verify the CRC-32 and
//! // length against the archive's central directory at end of stream.
//! let mut hello = String::new();
//! archive
//!     .get_input_stream("hello.txt", MatchPath::Match)?
//!     .expect("no such entry")
//!     .read_to_string(&mut hello)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Writing goes through [`ZipWriter`], entry by entry:
//!
//! ```no_run
//! # use std::fs::File;
//! # use std::io::Write;
//! # use satchel::{FileEntry, ZipWriter};
//! let mut writer = ZipWriter::new(File::create("out.zip")?)?;
//! writer.start_entry(FileEntry::new("hello.txt"))?;
//! writer.write_all(b"Hello, World!\n")?;
//! writer.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Zip is an interesting archive format: unlike compressed tarballs often
//! seen in Linux land (`*.tar.gz`, `*.tar.zst`, ...), each file in a Zip
//! archive is compressed independently, with a central directory at the
//! *back* of the file telling us where to find each one. Offsets in that
//! directory are relative to the archive's start, not the file's, which
//! is why a ZIP archive embedded in some larger file (a self-extracting
//! executable, say) still reads fine: give
//! [`ZipArchive::with_window()`](read::ZipArchive::with_window) the
//! embedded archive's bounds and it behaves exactly like a standalone
//! file.
//!
//! Everything works through plain `Read + Seek` byte sources; nothing
//! here memory-maps or spawns threads. Streams handed out by a
//! collection each own an independent cursor, so decompressing several
//! entries side by side is fine.

pub mod collection;
pub mod deflate;
pub mod dostime;
pub mod entry;
pub mod inflate;
pub mod read;
pub mod result;
pub mod seek;
pub mod write;

pub use collection::{CompositeCollection, DirectoryCollection, FileCollection, ZipCollection};
pub use entry::{CompressionLevel, FileEntry, MatchPath, StorageMethod};
pub use read::ZipArchive;
pub use result::{ZipError, ZipResult};
pub use write::ZipWriter;

mod arch;
mod crc_reader;
mod spec;
