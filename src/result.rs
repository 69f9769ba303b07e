//! Error types and the related `Result<T>`

use std::io;

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[from] io::Error),

    /// An underlying read returned fewer bytes than the record needed.
    #[error("Short read: needed {expected} bytes, got {actual}")]
    IoShort { expected: usize, actual: usize },

    /// No End of Central Directory Record was found in the trailing window
    /// of the file, so it isn't a ZIP archive.
    #[error("Not a ZIP archive: no End Of Central Directory Record")]
    NotAZip,

    /// The archive contained invalid data per the spec:
    /// a signature mismatch, inconsistent field lengths, or a truncated record.
    #[error("Malformed ZIP archive: {0}")]
    Malformed(&'static str),

    /// An entry's decompressed bytes don't match the central directory's
    /// CRC-32 or length.
    #[error("Corrupt entry: {0}")]
    Corrupt(String),

    /// A per-entry storage method other than STORED or DEFLATED
    #[error("Unsupported storage method {0}")]
    UnsupportedMethod(u16),

    /// A compression level outside {-1, -2, -3, 0} ∪ [1, 100]
    #[error("Invalid compression level {0}")]
    InvalidLevel(i32),

    /// An operation was issued against an object in the wrong state,
    /// e.g. writing entry data after the writer was finished.
    #[error("Invalid state: {0}")]
    StateError(&'static str),

    /// The archive uses a feature this library doesn't support
    /// (ZIP64, encryption, multi-volume archives).
    #[error("Unsupported ZIP archive: {0}")]
    Unsupported(&'static str),

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// A cast from a 64-bit int to a usize failed while sizing a buffer,
    /// probably on a 32-bit system.
    #[error("ZIP record too large for address space")]
    InsufficientAddressSpace,
}

impl ZipError {
    /// Wraps the error in an `std::io::Error` so it can cross a
    /// `Read`/`Write` trait boundary. Callers on the far side can
    /// downcast `io::Error::get_ref()` back to a `ZipError`.
    pub(crate) fn into_io(self) -> io::Error {
        match self {
            ZipError::Io(e) => e,
            other => {
                let kind = match other {
                    ZipError::Corrupt(_) | ZipError::Malformed(_) => io::ErrorKind::InvalidData,
                    ZipError::IoShort { .. } => io::ErrorKind::UnexpectedEof,
                    _ => io::ErrorKind::Other,
                };
                io::Error::new(kind, other)
            }
        }
    }
}
